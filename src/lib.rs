// Aeration - Guest-to-host free page reporting engine
// Core library module

pub mod buddy;
pub mod error;
pub mod reporting;

pub use buddy::{
    AllocatorConfig, BuddyAllocator, Migratetype, OrderStats, Zone, ZoneConfig, ZoneStats,
};
pub use error::{AerationError, Result};
pub use reporting::{
    Batch, BatchEntry, PageReportingCore, Reporter, ReporterDevice, ReportingConfig,
    ReportingStatsSnapshot,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Top-level configuration
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Config {
    pub allocator: AllocatorConfig,
    pub reporting: ReportingConfig,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        self.allocator.validate()?;
        self.reporting.validate()
    }
}
