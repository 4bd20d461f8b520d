// ============================================
// Resource Monitor
// ============================================
//
// Coarse device-load estimate driving tier evolution:
//   cpu     - wall-clock duration of a fixed pseudo-random busy loop
//   memory  - /proc/meminfo when readable
//   storage - local store usage against a fixed quota
//
// Sampling never fails; every unreadable signal reports FALLBACK_PERCENT.

use crate::config::Config;
use crate::models::ResourceSnapshot;
use crate::storage::LocalStore;
use crate::utils::clamp_percent;
use async_trait::async_trait;
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Reported for any signal that cannot be measured
pub const FALLBACK_PERCENT: f32 = 50.0;

const PROC_MEMINFO: &str = "/proc/meminfo";

#[async_trait]
pub trait ResourceSampler: Send + Sync {
    async fn sample(&self) -> ResourceSnapshot;
}

pub struct ResourceMonitor {
    store: Option<Arc<dyn LocalStore>>,
    cpu_probe_iterations: u64,
    cpu_probe_reference_ms: f64,
    storage_quota_bytes: u64,
    meminfo_path: PathBuf,
}

impl ResourceMonitor {
    pub fn new(config: &Config) -> Self {
        Self {
            store: None,
            cpu_probe_iterations: config.cpu_probe_iterations,
            cpu_probe_reference_ms: config.cpu_probe_reference_ms,
            storage_quota_bytes: config.storage_quota_bytes,
            meminfo_path: PathBuf::from(PROC_MEMINFO),
        }
    }

    /// Measure storage against the given local store
    pub fn with_store(mut self, store: Arc<dyn LocalStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_meminfo_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.meminfo_path = path.into();
        self
    }

    async fn check_cpu(&self) -> f32 {
        let iterations = self.cpu_probe_iterations;
        let probe = tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            let mut rng = rand::thread_rng();
            let mut total = 0.0f64;
            for _ in 0..iterations {
                total += rng.gen::<f64>();
            }
            std::hint::black_box(total);
            started.elapsed()
        })
        .await;

        match probe {
            Ok(elapsed) => {
                cpu_percent_from_duration(elapsed.as_secs_f64() * 1000.0, self.cpu_probe_reference_ms)
            }
            Err(e) => {
                warn!(error = %e, "CPU probe failed, using fallback estimate");
                FALLBACK_PERCENT
            }
        }
    }

    async fn check_memory(&self) -> f32 {
        match tokio::fs::read_to_string(&self.meminfo_path).await {
            Ok(text) => parse_meminfo(&text).unwrap_or_else(|| {
                debug!("meminfo missing expected fields, using fallback estimate");
                FALLBACK_PERCENT
            }),
            Err(_) => FALLBACK_PERCENT,
        }
    }

    async fn check_storage(&self) -> f32 {
        let Some(store) = &self.store else {
            return FALLBACK_PERCENT;
        };

        match store.usage_bytes().await {
            Ok(used) => clamp_percent(
                used as f32 / self.storage_quota_bytes as f32 * 100.0,
                FALLBACK_PERCENT,
            ),
            Err(e) => {
                warn!(error = %e, "Storage usage unavailable, using fallback estimate");
                FALLBACK_PERCENT
            }
        }
    }
}

#[async_trait]
impl ResourceSampler for ResourceMonitor {
    async fn sample(&self) -> ResourceSnapshot {
        let memory = self.check_memory().await;
        let cpu = self.check_cpu().await;
        let storage = self.check_storage().await;

        let snapshot = ResourceSnapshot::new(cpu, memory, storage);
        debug!(
            cpu = snapshot.cpu,
            memory = snapshot.memory,
            storage = snapshot.storage,
            "Resource snapshot sampled"
        );
        snapshot
    }
}

/// Linear map of probe duration onto 0..=100, saturating at the reference duration
pub fn cpu_percent_from_duration(duration_ms: f64, reference_ms: f64) -> f32 {
    if reference_ms <= 0.0 {
        return FALLBACK_PERCENT;
    }
    clamp_percent((duration_ms / reference_ms * 100.0) as f32, FALLBACK_PERCENT)
}

/// Used-memory percentage from `/proc/meminfo` contents
pub fn parse_meminfo(text: &str) -> Option<f32> {
    let field = |name: &str| -> Option<f64> {
        text.lines()
            .find(|line| line.starts_with(name))
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|value| value.parse::<f64>().ok())
    };

    let total = field("MemTotal:")?;
    let available = field("MemAvailable:")?;
    if total <= 0.0 {
        return None;
    }

    Some(clamp_percent(
        ((total - available) / total * 100.0) as f32,
        FALLBACK_PERCENT,
    ))
}

/// Sampler that always reports the same snapshot
#[derive(Debug, Clone, Copy)]
pub struct FixedSampler(pub ResourceSnapshot);

#[async_trait]
impl ResourceSampler for FixedSampler {
    async fn sample(&self) -> ResourceSnapshot {
        self.0
    }
}
