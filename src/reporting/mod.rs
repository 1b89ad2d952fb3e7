// # Free Page Reporting Engine
//
// Reports large runs of free guest memory to an external backend, typically
// a paravirtual balloon driver on the other side of a hypercall.
//
// ## Architecture Overview
//
// ```text
// free path ──▶ notify_free ──▶ request flag + refcnt ──▶ worker (delayed)
//                                                            │
//                          ┌─────────────────────────────────┘
//                          ▼
//                 per zone, under the zone lock:
//                   fill batch (isolate unreported blocks)
//                   unlock ─▶ backend react(batch) ─▶ relock
//                   drain batch (return blocks as Reported)
//                 repeat until a fill runs dry
// ```
//
// Reported blocks stay allocatable: they are parked on the reported suffix
// of their free list behind a per-(order, migratetype) boundary, and the
// allocation path pulls the boundary back when it takes one.

pub mod batch;
pub(crate) mod boundary;
pub mod controller;
pub mod device;
mod scanner;
pub mod stats;

pub use batch::{Batch, BatchEntry};
pub use controller::{
    PageReportingCore, ReportingConfig, DEFAULT_COALESCE_DELAY, DEFAULT_HIGH_WATER_MARK,
    DEFAULT_MIN_ORDER,
};
pub use device::{Reporter, ReporterDevice};
pub use stats::ReportingStatsSnapshot;
