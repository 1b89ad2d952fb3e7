// # Reporting Lifecycle Controller
//
// Registration and scheduling for the reporting engine. A single worker
// thread services every zone; work is requested from the allocator's free
// path when a zone crosses its high-water mark and coalesced behind a short
// delay so bursts of frees turn into one pass.
//
// ## Reference counting
//
// The device reference count is the number of zones with a pending request,
// plus one while the worker holds a pass open. A zone increments it when its
// request flag is raised; the scanner decrements it on the fill that finds
// the zone empty. The worker only goes idle by swapping the count from one
// (its own reference) to zero, so a request that races a finishing pass
// either joins the current pass or schedules the next one.
//
// ## Publication
//
// `startup` installs the device behind a read-write lock and flips the
// enable flag last; `shutdown` clears the flag first, then waits for the
// count to drain before the worker is stopped and zone state is torn down.
// The free-path hook therefore observes either no device or a fully
// constructed one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::buddy::types::{MAX_ORDER, PAGEBLOCK_ORDER};
use crate::buddy::zone::{Zone, ZoneState};
use crate::error::{AerationError, Result};
use crate::reporting::device::{DeviceState, ReporterDevice};
use crate::reporting::stats::{ReportingStats, ReportingStatsSnapshot};

/// Smallest order eligible for reporting by default.
pub const DEFAULT_MIN_ORDER: usize = PAGEBLOCK_ORDER;

/// Default per-order unreported-block threshold that raises a request.
pub const DEFAULT_HIGH_WATER_MARK: u64 = 32;

/// Default delay between the first request and the worker pass.
pub const DEFAULT_COALESCE_DELAY: Duration = Duration::from_millis(100);

/// Tunables for the reporting engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportingConfig {
    /// Smallest block order handed to the backend
    pub min_order: usize,
    /// Unreported blocks at a single order needed to raise a request
    pub high_water_mark: u64,
    /// How long to let requests accumulate before the worker runs
    pub coalesce_delay: Duration,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            min_order: DEFAULT_MIN_ORDER,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            coalesce_delay: DEFAULT_COALESCE_DELAY,
        }
    }
}

impl ReportingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_order >= MAX_ORDER {
            return Err(AerationError::Configuration(format!(
                "Minimum reporting order {} must be below {MAX_ORDER}",
                self.min_order
            )));
        }
        if self.high_water_mark == 0 {
            return Err(AerationError::Configuration(
                "High-water mark must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

struct WorkState {
    scheduled: bool,
    stop: bool,
}

/// The reporting engine: device registration, free-path screening, and the
/// worker that cycles fill → react → drain across zones.
pub struct PageReportingCore {
    pub(crate) config: ReportingConfig,
    zones: Vec<Arc<Zone>>,
    /// Free-path hooks are inert while this is clear
    enabled: AtomicBool,
    device: RwLock<Option<Arc<DeviceState>>>,
    /// Serializes startup against shutdown
    registration: Mutex<()>,
    work: Mutex<WorkState>,
    work_cv: Condvar,
    worker: Mutex<Option<JoinHandle<()>>>,
    pub(crate) stats: ReportingStats,
}

impl PageReportingCore {
    pub(crate) fn new(zones: Vec<Arc<Zone>>, config: ReportingConfig) -> Self {
        Self {
            config,
            zones,
            enabled: AtomicBool::new(false),
            device: RwLock::new(None),
            registration: Mutex::new(()),
            work: Mutex::new(WorkState {
                scheduled: false,
                stop: false,
            }),
            work_cv: Condvar::new(),
            worker: Mutex::new(None),
            stats: ReportingStats::new(),
        }
    }

    pub fn config(&self) -> &ReportingConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Pending zone requests plus the worker's own reference, or zero when
    /// no backend is registered.
    pub fn active_refs(&self) -> u64 {
        self.device
            .read()
            .as_ref()
            .map_or(0, |state| state.refcnt.load(Ordering::Acquire))
    }

    pub fn get_stats(&self) -> ReportingStatsSnapshot {
        self.stats.snapshot()
    }

    /// Register a backend and enable reporting.
    ///
    /// Fails with [`AerationError::Busy`] when a backend is already
    /// installed and with [`AerationError::InvalidArgument`] when the
    /// device advertises a zero batch capacity. Zones that already hold
    /// eligible unreported blocks are requested immediately, so memory
    /// freed before registration is still reported.
    pub fn startup(self: &Arc<Self>, device: Arc<ReporterDevice>) -> Result<()> {
        let _registration = self.registration.lock();

        if device.capacity() == 0 {
            return Err(AerationError::InvalidArgument(
                "Reporter batch capacity must be positive".to_string(),
            ));
        }
        if self.device.read().is_some() {
            return Err(AerationError::Busy);
        }

        let state = Arc::new(DeviceState::try_new(device)?);

        {
            let mut work = self.work.lock();
            work.scheduled = false;
            work.stop = false;
        }
        *self.device.write() = Some(Arc::clone(&state));

        let core = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("aeration-report".to_string())
            .spawn(move || core.run_worker())
            .map_err(|e| {
                *self.device.write() = None;
                AerationError::Internal(format!("Failed to spawn reporting worker: {e}"))
            })?;
        *self.worker.lock() = Some(handle);

        for zone in &self.zones {
            let mut zone_state = zone.lock();
            if zone_state.has_unreported_eligible(self.config.min_order) {
                self.request_zone(&state, zone, &mut zone_state);
            }
        }

        self.enabled.store(true, Ordering::Release);
        info!(
            capacity = state.device.capacity(),
            zones = self.zones.len(),
            "page reporting enabled"
        );
        Ok(())
    }

    /// Disable reporting and unregister `device`.
    ///
    /// A no-op when `device` is not the installed backend. Blocks until
    /// every pending request has drained and the worker has gone idle, then
    /// clears the Reported flags and boundaries of every zone.
    pub fn shutdown(&self, device: &Arc<ReporterDevice>) {
        let _registration = self.registration.lock();

        let state = { self.device.read().clone() };
        let Some(state) = state else {
            return;
        };
        if !Arc::ptr_eq(&state.device, device) {
            warn!("ignoring shutdown for a reporter that is not registered");
            return;
        }

        self.enabled.store(false, Ordering::Release);

        while state.refcnt.load(Ordering::Acquire) > 0 {
            thread::sleep(Duration::from_millis(1));
        }

        {
            let mut work = self.work.lock();
            work.stop = true;
            self.work_cv.notify_one();
        }
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }

        *self.device.write() = None;

        for zone in &self.zones {
            zone.lock().teardown_reporting();
        }
        info!("page reporting disabled");
    }

    /// Free-path screening hook. Called with the zone lock held, after the
    /// freed block has been inserted.
    pub(crate) fn notify_free(&self, zone: &Arc<Zone>, state: &mut ZoneState, order: usize) {
        if !self.enabled.load(Ordering::Acquire) {
            return;
        }
        if order < self.config.min_order {
            return;
        }
        if state.reporting_requested {
            return;
        }
        if state.unreported_blocks(order) < self.config.high_water_mark {
            return;
        }
        let device = { self.device.read().clone() };
        let Some(device) = device else {
            return;
        };
        self.request_zone(&device, zone, state);
    }

    fn request_zone(&self, device: &DeviceState, zone: &Zone, state: &mut ZoneState) {
        if state.reporting_requested {
            return;
        }
        state.reporting_requested = true;
        self.stats.record_request();
        if device.refcnt.fetch_add(1, Ordering::AcqRel) == 0 {
            debug!(zone = zone.name(), "scheduling reporting worker");
            self.schedule();
        }
    }

    fn schedule(&self) {
        let mut work = self.work.lock();
        work.scheduled = true;
        self.work_cv.notify_one();
    }

    fn run_worker(self: Arc<Self>) {
        loop {
            {
                let mut work = self.work.lock();
                loop {
                    if work.scheduled {
                        work.scheduled = false;
                        break;
                    }
                    if work.stop {
                        return;
                    }
                    self.work_cv.wait(&mut work);
                }
            }
            // let a burst of requests build into one pass
            thread::sleep(self.config.coalesce_delay);
            self.cycle();
        }
    }

    /// One worker pass: scrub requested zones round-robin until the
    /// reference count collapses to the pass's own reference.
    fn cycle(&self) {
        let device = { self.device.read().clone() };
        let Some(device) = device else {
            return;
        };

        // Hold one reference for the duration of the pass; the request that
        // woke us is cleared zone by zone as fills run dry.
        device.refcnt.fetch_add(1, Ordering::AcqRel);
        self.stats.record_cycle();

        loop {
            for zone in &self.zones {
                self.scrub_zone(&device, zone);
            }

            let refs = device.refcnt.load(Ordering::Acquire);
            if refs == 1
                && device
                    .refcnt
                    .compare_exchange(1, 0, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                break;
            }
        }
    }

}
