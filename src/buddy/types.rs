// # Buddy Model Core Types
//
// Fundamental types, constants, and configuration structures shared by the
// zone model and the reporting engine.
//
// ## Key Features
//
// - **Strong Typing**: Migratetype enum instead of raw list indices
// - **Configuration Types**: Validated config structures for zones and the
//   allocator facade
// - **Statistics Types**: Serializable per-zone and per-order snapshots

use serde::{Deserialize, Serialize};

use crate::error::{AerationError, Result};
use std::fmt;

/// Number of block orders tracked by the allocator (orders `0..MAX_ORDER`).
pub const MAX_ORDER: usize = 11;

/// Size of a single page frame in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Granularity at which migratetype metadata is kept, as an order.
pub const PAGEBLOCK_ORDER: usize = 9;

/// Pages covered by one pageblock.
pub const PAGEBLOCK_PAGES: u64 = 1 << PAGEBLOCK_ORDER;

/// Free-list classification of a pageblock.
///
/// Free lists are segregated per migratetype; `Isolate` blocks are
/// quarantined and never handed to a reporting backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Migratetype {
    Unmovable,
    Movable,
    Reclaimable,
    Isolate,
}

impl Migratetype {
    /// Number of migratetypes (and free lists per order).
    pub const COUNT: usize = 4;

    /// All migratetypes in descending scan order.
    pub const DESCENDING: [Migratetype; Self::COUNT] = [
        Migratetype::Isolate,
        Migratetype::Reclaimable,
        Migratetype::Movable,
        Migratetype::Unmovable,
    ];

    pub fn index(self) -> usize {
        match self {
            Migratetype::Unmovable => 0,
            Migratetype::Movable => 1,
            Migratetype::Reclaimable => 2,
            Migratetype::Isolate => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Migratetype::Unmovable),
            1 => Some(Migratetype::Movable),
            2 => Some(Migratetype::Reclaimable),
            3 => Some(Migratetype::Isolate),
            _ => None,
        }
    }

    pub fn is_isolate(self) -> bool {
        matches!(self, Migratetype::Isolate)
    }
}

impl fmt::Display for Migratetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Migratetype::Unmovable => write!(f, "UNMOVABLE"),
            Migratetype::Movable => write!(f, "MOVABLE"),
            Migratetype::Reclaimable => write!(f, "RECLAIMABLE"),
            Migratetype::Isolate => write!(f, "ISOLATE"),
        }
    }
}

/// Pages contained in one block of the given order.
pub fn order_pages(order: usize) -> u64 {
    1u64 << order
}

/// Bytes contained in one block of the given order.
pub fn order_bytes(order: usize) -> usize {
    PAGE_SIZE << order
}

/// Configuration for a single zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneConfig {
    /// Zone name, used for logging and statistics
    pub name: String,
    /// First page frame number covered by the zone
    pub base_pfn: u64,
    /// Number of page frames spanned by the zone
    pub pages: u64,
}

impl ZoneConfig {
    pub fn new(name: impl Into<String>, base_pfn: u64, pages: u64) -> Self {
        Self {
            name: name.into(),
            base_pfn,
            pages,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.pages == 0 {
            return Err(AerationError::Configuration(format!(
                "Zone '{}' spans no pages",
                self.name
            )));
        }
        if self.base_pfn.checked_add(self.pages).is_none() {
            return Err(AerationError::Configuration(format!(
                "Zone '{}' wraps the PFN space",
                self.name
            )));
        }
        Ok(())
    }
}

/// Configuration for the allocator facade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocatorConfig {
    /// Zones to construct, in ascending PFN order
    pub zones: Vec<ZoneConfig>,
    /// Minimum number of free pages a zone must retain; isolation requests
    /// that would drop a zone below this are refused
    pub watermark_min: u64,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            zones: vec![ZoneConfig::new("Normal", 0, 1 << 14)],
            watermark_min: 64,
        }
    }
}

impl AllocatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.zones.is_empty() {
            return Err(AerationError::Configuration(
                "At least one zone is required".to_string(),
            ));
        }
        let mut prev_end = 0u64;
        for (i, zone) in self.zones.iter().enumerate() {
            zone.validate()?;
            if i > 0 && zone.base_pfn < prev_end {
                return Err(AerationError::Configuration(format!(
                    "Zone '{}' overlaps its predecessor",
                    zone.name
                )));
            }
            prev_end = zone.base_pfn + zone.pages;
        }
        Ok(())
    }
}

/// Per-order occupancy of a zone's free lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStats {
    pub order: usize,
    /// Free blocks at this order across all migratetypes
    pub free_blocks: u64,
    /// Blocks at this order currently carrying the Reported flag
    pub reported_blocks: u64,
}

/// Point-in-time snapshot of a zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneStats {
    pub name: String,
    pub base_pfn: u64,
    pub end_pfn: u64,
    pub free_pages: u64,
    pub orders: Vec<OrderStats>,
    pub reporting_requested: bool,
    pub reporting_active: bool,
}

impl ZoneStats {
    /// Free blocks at `order` across all migratetypes.
    pub fn free_blocks(&self, order: usize) -> u64 {
        self.orders.get(order).map_or(0, |o| o.free_blocks)
    }

    /// Reported blocks at `order` across all migratetypes.
    pub fn reported_blocks(&self, order: usize) -> u64 {
        self.orders.get(order).map_or(0, |o| o.reported_blocks)
    }

    /// Total blocks carrying the Reported flag.
    pub fn total_reported_blocks(&self) -> u64 {
        self.orders.iter().map(|o| o.reported_blocks).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migratetype_round_trip() {
        for i in 0..Migratetype::COUNT {
            let mt = Migratetype::from_index(i).unwrap();
            assert_eq!(mt.index(), i);
        }
        assert!(Migratetype::from_index(Migratetype::COUNT).is_none());
    }

    #[test]
    fn test_descending_covers_all_types() {
        let mut seen = [false; Migratetype::COUNT];
        for mt in Migratetype::DESCENDING {
            seen[mt.index()] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_order_sizes() {
        assert_eq!(order_pages(0), 1);
        assert_eq!(order_pages(9), 512);
        assert_eq!(order_bytes(9), 512 * PAGE_SIZE);
    }

    #[test]
    fn test_zone_config_validation() {
        assert!(ZoneConfig::new("ok", 0, 1024).validate().is_ok());
        assert!(ZoneConfig::new("empty", 0, 0).validate().is_err());
        assert!(ZoneConfig::new("wrap", u64::MAX, 2).validate().is_err());
    }

    #[test]
    fn test_allocator_config_overlap() {
        let config = AllocatorConfig {
            zones: vec![
                ZoneConfig::new("a", 0, 1024),
                ZoneConfig::new("b", 512, 1024),
            ],
            watermark_min: 0,
        };
        assert!(config.validate().is_err());

        let config = AllocatorConfig {
            zones: vec![
                ZoneConfig::new("a", 0, 1024),
                ZoneConfig::new("b", 1024, 1024),
            ],
            watermark_min: 0,
        };
        assert!(config.validate().is_ok());
    }
}
