// # Reporter Device
//
// The contract between the reporting core and an external backend, plus the
// registration state the core keeps alive while a backend is installed.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::reporting::batch::Batch;

/// A reporting backend.
///
/// `react` consumes one batch of isolated extents. It is always invoked
/// outside any zone lock and may block (a hypercall round-trip, typically);
/// it must not call back into the allocator in a way that waits on the zone
/// the batch came from.
pub trait Reporter: Send + Sync {
    fn react(&self, batch: &Batch);
}

impl<F> Reporter for F
where
    F: Fn(&Batch) + Send + Sync,
{
    fn react(&self, batch: &Batch) {
        self(batch)
    }
}

/// Descriptor a backend hands to [`startup`].
///
/// [`startup`]: crate::reporting::controller::PageReportingCore::startup
pub struct ReporterDevice {
    reporter: Box<dyn Reporter>,
    capacity: usize,
}

impl ReporterDevice {
    /// `capacity` is the largest number of extents delivered per `react`
    /// call; registration rejects zero.
    pub fn new(reporter: impl Reporter + 'static, capacity: usize) -> Self {
        Self {
            reporter: Box::new(reporter),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn react(&self, batch: &Batch) {
        self.reporter.react(batch);
    }
}

/// Registration state owned by the core for the lifetime of one backend.
pub(crate) struct DeviceState {
    pub(crate) device: Arc<ReporterDevice>,
    /// Requested zones plus one while the worker holds a pass open
    pub(crate) refcnt: AtomicU64,
    /// Batch storage, owned by the scanner during a cycle
    pub(crate) batch: Mutex<Batch>,
}

impl DeviceState {
    pub(crate) fn try_new(device: Arc<ReporterDevice>) -> Result<Self> {
        let batch = Batch::try_with_capacity(device.capacity())?;
        Ok(Self {
            device,
            refcnt: AtomicU64::new(0),
            batch: Mutex::new(batch),
        })
    }
}
