// # Zone Scanner
//
// The fill → react → drain cycle for one zone. Fills pull unreported blocks
// highest order first, isolating each through the allocator primitive; the
// zone lock is dropped only while the backend consumes the batch; drains
// put every block back as Reported at its list's boundary.

use std::sync::atomic::Ordering;

use tracing::trace;

use crate::buddy::types::{Migratetype, MAX_ORDER};
use crate::buddy::zone::{Zone, ZoneState};
use crate::reporting::batch::Batch;
use crate::reporting::controller::PageReportingCore;
use crate::reporting::device::DeviceState;

impl PageReportingCore {
    /// Run the reporting cycle for one zone until its fills run dry.
    ///
    /// The request flag is cleared, and the zone's reference dropped, on
    /// the fill that comes back empty; a request raised while the backend
    /// holds the batch keeps the loop going instead.
    pub(crate) fn scrub_zone(&self, device: &DeviceState, zone: &Zone) {
        let mut state = zone.lock();
        if !state.reporting_requested {
            return;
        }
        state.reporting_active = true;

        let mut batch = device.batch.lock();
        debug_assert!(batch.is_empty());

        loop {
            let count = self.fill_batch(zone, &mut state, &mut batch);
            if count == 0 {
                state.reporting_requested = false;
                device.refcnt.fetch_sub(1, Ordering::AcqRel);
                break;
            }

            drop(state);
            trace!(zone = zone.name(), count, "delivering batch");
            device.device.react(&batch);
            self.stats.record_react(&batch);
            state = zone.lock();

            self.drain_batch(zone, &mut state, &mut batch);

            if !state.reporting_requested {
                break;
            }
        }

        state.reporting_active = false;
    }

    /// Pull up to a batch of unreported free blocks out of the zone,
    /// highest order first, skipping quarantined migratetypes.
    fn fill_batch(&self, zone: &Zone, state: &mut ZoneState, batch: &mut Batch) -> usize {
        let mut count = 0;

        for order in (self.config.min_order..MAX_ORDER).rev() {
            for mt in Migratetype::DESCENDING {
                if mt.is_isolate() {
                    continue;
                }
                while let Some(idx) = state.peek_unreported(order, mt) {
                    if !state.isolate_block(idx, order) {
                        // watermark pressure; leave the block and move on
                        self.stats.record_isolation_skip();
                        break;
                    }
                    batch.push(zone.pfn_of(idx), order, mt);
                    count += 1;
                    if batch.is_full() {
                        return count;
                    }
                }
            }
        }

        count
    }

    /// Reinsert every batched block as Reported at its list's boundary.
    fn drain_batch(&self, zone: &Zone, state: &mut ZoneState, batch: &mut Batch) {
        for entry in batch.entries() {
            let idx = zone.offset_of(entry.pfn);
            state.put_reported_block(idx, entry.order, entry.migratetype);
        }
        batch.clear();
    }
}
