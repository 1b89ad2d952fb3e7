// # Aeration Demo
//
// Builds a zone-backed allocator, registers a latency-simulating reporting
// backend, and drives a synthetic free/alloc workload so the full
// fill/react/drain cycle can be watched through the logs.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing::info;

use aeration::{
    AllocatorConfig, Batch, BuddyAllocator, Config, Migratetype, Reporter, ReporterDevice,
    ReportingConfig, Result, ZoneConfig, VERSION,
};

/// Pretend hypervisor transport: logs each batch and sleeps for a
/// round-trip's worth of time.
struct HypercallReporter {
    latency: Duration,
}

impl Reporter for HypercallReporter {
    fn react(&self, batch: &Batch) {
        info!(
            extents = batch.len(),
            bytes = batch.total_bytes(),
            "reporting batch to hypervisor"
        );
        thread::sleep(self.latency);
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    info!("Aeration demo v{VERSION}");

    let config = Config {
        allocator: AllocatorConfig {
            zones: vec![
                ZoneConfig::new("DMA32", 0, 1 << 14),
                ZoneConfig::new("Normal", 1 << 14, 1 << 15),
            ],
            watermark_min: 256,
        },
        reporting: ReportingConfig {
            coalesce_delay: Duration::from_millis(50),
            ..ReportingConfig::default()
        },
    };
    config.validate()?;

    let allocator = BuddyAllocator::new(config.allocator, config.reporting)?;

    let device = Arc::new(ReporterDevice::new(
        HypercallReporter {
            latency: Duration::from_millis(5),
        },
        16,
    ));
    allocator.reporting().startup(Arc::clone(&device))?;

    // Guest boot: large runs of memory come back to the allocator.
    let min_order = allocator.reporting().config().min_order;
    let block = 1u64 << min_order;
    for i in 0..(1 << 14) / block {
        allocator.free_block(i * block, min_order)?;
    }
    for i in 0..(1 << 15) / block {
        allocator.free_block((1 << 14) + i * block, min_order)?;
    }

    // Steady state: some of that memory is taken back and re-freed while
    // the worker reports behind it.
    let mut rng = rand::rng();
    for _ in 0..200 {
        if rng.random_range(0..4) == 0 {
            if let Some(pfn) = allocator.alloc_block(min_order, Migratetype::Movable) {
                thread::sleep(Duration::from_millis(1));
                allocator.free_block(pfn, min_order)?;
            }
        } else {
            thread::sleep(Duration::from_millis(1));
        }
    }

    // Let the last pass settle.
    while allocator.reporting().active_refs() > 0 {
        thread::sleep(Duration::from_millis(10));
    }

    let stats = allocator.reporting().get_stats();
    println!(
        "{}",
        serde_json::to_string_pretty(&stats).unwrap_or_default()
    );
    for zone in allocator.get_stats() {
        info!(
            zone = %zone.name,
            free_pages = zone.free_pages,
            reported_blocks = zone.total_reported_blocks(),
            "zone state"
        );
    }

    allocator.reporting().shutdown(&device);
    info!("demo complete");
    Ok(())
}
