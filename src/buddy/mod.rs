// # Buddy Allocator Model
//
// Zone-backed free-list management for the reporting engine: a contiguous
// PFN range per zone, one free list per `(order, migratetype)` pair, and the
// narrow isolation/return primitives the reporting scanner drives.
//
// This module owns everything the allocator side of the system needs:
// - Per-frame metadata and intrusive free-list links
// - Zones with alloc/free/isolate/return operations under a single lock
// - The facade routing block traffic to zones and firing the free-path hook

pub mod allocator;
pub mod page;
pub mod types;
pub mod zone;

pub use allocator::BuddyAllocator;
pub use types::{
    order_bytes, order_pages, AllocatorConfig, Migratetype, OrderStats, ZoneConfig, ZoneStats,
    MAX_ORDER, PAGEBLOCK_ORDER, PAGEBLOCK_PAGES, PAGE_SIZE,
};
pub use zone::Zone;
