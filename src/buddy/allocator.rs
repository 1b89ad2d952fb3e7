// # Buddy Allocator Facade
//
// Routes block-granular alloc/free traffic to the owning zone and fires the
// reporting engine's free-path hook. The facade owns the zones and the
// reporting core; the two share zone references only.
//
// Splitting and merging of blocks is intentionally absent: callers free and
// allocate whole blocks of a given order, which is the narrow interface the
// reporting engine consumes.

use std::sync::Arc;

use tracing::info;

use crate::buddy::types::{order_pages, AllocatorConfig, Migratetype, ZoneStats, MAX_ORDER};
use crate::buddy::zone::Zone;
use crate::error::{AerationError, Result};
use crate::reporting::controller::{PageReportingCore, ReportingConfig};

pub struct BuddyAllocator {
    zones: Vec<Arc<Zone>>,
    reporting: Arc<PageReportingCore>,
}

impl BuddyAllocator {
    /// Build the zones described by `config` and wire up a reporting core.
    ///
    /// The core starts disabled; nothing is reported until a backend is
    /// registered through [`PageReportingCore::startup`].
    pub fn new(config: AllocatorConfig, reporting_config: ReportingConfig) -> Result<Self> {
        config.validate()?;
        reporting_config.validate()?;

        let zones: Vec<Arc<Zone>> = config
            .zones
            .iter()
            .enumerate()
            .map(|(id, zone_config)| {
                Arc::new(Zone::new(
                    id,
                    zone_config,
                    reporting_config.min_order,
                    config.watermark_min,
                ))
            })
            .collect();

        let reporting = Arc::new(PageReportingCore::new(zones.clone(), reporting_config));

        info!(zones = zones.len(), "buddy allocator initialized");
        Ok(Self { zones, reporting })
    }

    pub fn zones(&self) -> &[Arc<Zone>] {
        &self.zones
    }

    /// The reporting core servicing this allocator's zones.
    pub fn reporting(&self) -> &Arc<PageReportingCore> {
        &self.reporting
    }

    /// Zone owning `pfn`, if any.
    pub fn zone_for(&self, pfn: u64) -> Option<&Arc<Zone>> {
        self.zones.iter().find(|zone| zone.contains(pfn))
    }

    /// Free one naturally aligned block of `order` starting at `pfn`.
    pub fn free_block(&self, pfn: u64, order: usize) -> Result<()> {
        let zone = self.checked_zone(pfn, order)?;
        let idx = zone.offset_of(pfn);
        let mut state = zone.lock();
        state.insert_free_block(idx, order)?;
        self.reporting.notify_free(zone, &mut state, order);
        Ok(())
    }

    /// Allocate a block of exactly `order` from the given migratetype,
    /// scanning zones in order. Returns the block's base PFN.
    pub fn alloc_block(&self, order: usize, mt: Migratetype) -> Option<u64> {
        if order >= MAX_ORDER {
            return None;
        }
        for zone in &self.zones {
            let mut state = zone.lock();
            if let Some(idx) = state.take_free_block(order, mt) {
                return Some(zone.pfn_of(idx));
            }
        }
        None
    }

    /// Reclassify the pageblock containing `pfn`.
    pub fn set_pageblock_migratetype(&self, pfn: u64, mt: Migratetype) -> Result<()> {
        let zone = self.zone_for(pfn).ok_or_else(|| {
            AerationError::InvalidArgument(format!("PFN {pfn:#x} is outside every zone"))
        })?;
        let idx = zone.offset_of(pfn);
        zone.lock().set_pageblock_migratetype_at(idx, mt);
        Ok(())
    }

    /// Total free pages across all zones.
    pub fn free_pages(&self) -> u64 {
        self.zones
            .iter()
            .map(|zone| zone.get_stats().free_pages)
            .sum()
    }

    pub fn get_stats(&self) -> Vec<ZoneStats> {
        self.zones.iter().map(|zone| zone.get_stats()).collect()
    }

    fn checked_zone(&self, pfn: u64, order: usize) -> Result<&Arc<Zone>> {
        if order >= MAX_ORDER {
            return Err(AerationError::InvalidArgument(format!(
                "Order {order} exceeds the maximum of {}",
                MAX_ORDER - 1
            )));
        }
        if pfn % order_pages(order) != 0 {
            return Err(AerationError::InvalidArgument(format!(
                "PFN {pfn:#x} is not aligned to order {order}"
            )));
        }
        let zone = self.zone_for(pfn).ok_or_else(|| {
            AerationError::InvalidArgument(format!("PFN {pfn:#x} is outside every zone"))
        })?;
        if pfn + order_pages(order) > zone.end_pfn() {
            return Err(AerationError::InvalidArgument(format!(
                "Block at PFN {pfn:#x} order {order} crosses the end of zone '{}'",
                zone.name()
            )));
        }
        Ok(zone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buddy::types::ZoneConfig;

    fn two_zone_allocator() -> BuddyAllocator {
        let config = AllocatorConfig {
            zones: vec![
                ZoneConfig::new("DMA32", 0, 4096),
                ZoneConfig::new("Normal", 4096, 8000),
            ],
            watermark_min: 0,
        };
        BuddyAllocator::new(config, ReportingConfig::default()).unwrap()
    }

    #[test]
    fn test_free_routes_to_owning_zone() {
        let alloc = two_zone_allocator();
        alloc.free_block(0, 9).unwrap();
        alloc.free_block(4096, 9).unwrap();

        assert_eq!(alloc.zones()[0].get_stats().free_blocks(9), 1);
        assert_eq!(alloc.zones()[1].get_stats().free_blocks(9), 1);
        assert_eq!(alloc.free_pages(), 1024);
    }

    #[test]
    fn test_alloc_scans_zones_in_order() {
        let alloc = two_zone_allocator();
        alloc.free_block(4096, 9).unwrap();
        alloc.free_block(0, 9).unwrap();

        assert_eq!(alloc.alloc_block(9, Migratetype::Movable), Some(0));
        assert_eq!(alloc.alloc_block(9, Migratetype::Movable), Some(4096));
        assert_eq!(alloc.alloc_block(9, Migratetype::Movable), None);
    }

    #[test]
    fn test_free_rejects_bad_arguments() {
        let alloc = two_zone_allocator();
        // misaligned
        assert!(alloc.free_block(7, 9).is_err());
        // outside every zone
        assert!(alloc.free_block(1 << 20, 9).is_err());
        // order out of range
        assert!(alloc.free_block(0, MAX_ORDER).is_err());
        // aligned but crosses the zone end (zone ends at PFN 12096)
        assert!(alloc.free_block(11264, 10).is_err());
    }

    #[test]
    fn test_zone_boundaries() {
        let alloc = two_zone_allocator();
        assert_eq!(alloc.zone_for(0).unwrap().name(), "DMA32");
        assert_eq!(alloc.zone_for(4095).unwrap().name(), "DMA32");
        assert_eq!(alloc.zone_for(4096).unwrap().name(), "Normal");
        assert!(alloc.zone_for(4096 + 8000).is_none());
    }
}
