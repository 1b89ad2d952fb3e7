// # Page Frame Metadata
//
// One record per page frame in a zone. Frames are owned by the zone and
// addressed by their offset from the zone base; free-list membership is kept
// as intrusive prev/next offsets into the same arena. All fields are guarded
// by the zone lock.

/// Metadata for a single page frame.
///
/// Only the head frame of a free block carries meaningful state: `buddy`
/// marks free-list membership, `order` is the block's free-list order
/// (page-private storage, preserved across isolation so the block can be
/// returned to the same list), and `reported` marks blocks that have already
/// been handed to the reporting backend.
#[derive(Debug, Clone, Default)]
pub(crate) struct PageFrame {
    /// Frame heads a block on a free list
    pub(crate) buddy: bool,
    /// Block has been reported and not reallocated since
    pub(crate) reported: bool,
    /// Free-list order of the block headed by this frame
    pub(crate) order: u8,
    /// Previous block on the same free list, as a zone offset
    pub(crate) prev: Option<u32>,
    /// Next block on the same free list, as a zone offset
    pub(crate) next: Option<u32>,
}

impl PageFrame {
    /// Detach the frame from any free list without touching its flags.
    pub(crate) fn clear_links(&mut self) {
        self.prev = None;
        self.next = None;
    }
}
