use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use chrono::Local;
use gpudash_core::{
    CpuFrequency, CpuUsage, DiskUsage, GpuRecord, MemoryUsage, MetricsConfig, NetworkCounters,
    SystemSnapshot,
};
use sysinfo::{CpuRefreshKind, Disks, MemoryRefreshKind, Networks, RefreshKind, System};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::GpuSource;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Metrics read failed: {0}")]
    ReadFailed(String),
}

/// Produces one snapshot per call. Blocking: callers on an async runtime
/// should use `spawn_blocking`.
pub trait MetricsSource: Send + Sync {
    fn read_snapshot(&self) -> Result<SystemSnapshot, MetricsError>;
}

/// Host metrics from sysinfo plus an optional GPU source.
///
/// A failing GPU query or a missing disk never fails the snapshot: the GPU
/// list comes back empty and the disk section is zeroed. State left behind by
/// a reader that panicked mid-refresh is reused; the next refresh overwrites
/// it.
pub struct SystemMetricsReader {
    system: Mutex<System>,
    disks: Mutex<Disks>,
    networks: Mutex<Networks>,
    gpu: Option<Arc<dyn GpuSource>>,
    sample_window: Duration,
    disk_mount: PathBuf,
}

impl SystemMetricsReader {
    pub fn new(config: &MetricsConfig, gpu: Option<Arc<dyn GpuSource>>) -> Self {
        let refresh = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::everything())
            .with_memory(MemoryRefreshKind::everything());

        Self {
            system: Mutex::new(System::new_with_specifics(refresh)),
            disks: Mutex::new(Disks::new_with_refreshed_list()),
            networks: Mutex::new(Networks::new_with_refreshed_list()),
            gpu,
            sample_window: config
                .cpu_sample_window()
                .max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL),
            disk_mount: config.disk_mount.clone(),
        }
    }

    fn read_cpu_and_memory(&self) -> (CpuUsage, MemoryUsage) {
        // Usage is a delta between two refreshes. The lock is not held over
        // the sample window, so a concurrent read only shortens this window.
        lock(&self.system).refresh_cpu_usage();
        thread::sleep(self.sample_window);

        let mut system = lock(&self.system);
        system.refresh_cpu_usage();
        system.refresh_cpu_frequency();
        system.refresh_memory();

        let cpus = system.cpus();
        let freq = cpus
            .first()
            .map(|cpu| cpu.frequency())
            .filter(|mhz| *mhz > 0)
            .map(|current_mhz| CpuFrequency { current_mhz });

        let cpu = CpuUsage {
            usage_percent: system.global_cpu_usage(),
            count: cpus.len(),
            freq,
        };
        let memory = MemoryUsage::new(
            system.total_memory(),
            system.available_memory(),
            system.used_memory(),
        );

        (cpu, memory)
    }

    fn read_disk(&self) -> DiskUsage {
        let mut disks = lock(&self.disks);
        disks.refresh(true);

        let entries = disks
            .list()
            .iter()
            .map(|d| (d.mount_point(), d.total_space(), d.available_space()));

        select_disk(entries, &self.disk_mount)
    }

    fn read_network(&self) -> NetworkCounters {
        let mut networks = lock(&self.networks);
        networks.refresh(true);

        networks
            .values()
            .fold(NetworkCounters::default(), |mut acc, data| {
                acc.bytes_sent += data.total_transmitted();
                acc.bytes_recv += data.total_received();
                acc.packets_sent += data.total_packets_transmitted();
                acc.packets_recv += data.total_packets_received();
                acc
            })
    }

    fn read_gpus(&self) -> Vec<GpuRecord> {
        let Some(gpu) = &self.gpu else {
            return Vec::new();
        };

        match gpu.gpus() {
            Ok(records) => records,
            Err(e) => {
                warn!("Error getting GPU info: {}", e);
                Vec::new()
            }
        }
    }
}

impl MetricsSource for SystemMetricsReader {
    #[instrument(skip(self))]
    fn read_snapshot(&self) -> Result<SystemSnapshot, MetricsError> {
        let (cpu, memory) = self.read_cpu_and_memory();
        let disk = self.read_disk();
        let network = self.read_network();
        let gpu = self.read_gpus();

        debug!(
            cpu = cpu.usage_percent,
            mem = memory.percent,
            gpus = gpu.len(),
            "snapshot read"
        );

        Ok(SystemSnapshot {
            timestamp: Local::now(),
            cpu,
            memory,
            disk,
            network,
            gpu,
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Usage of the filesystem mounted at `mount`, falling back to the largest
/// filesystem, or a zeroed section when there are none.
fn select_disk<'a>(
    entries: impl Iterator<Item = (&'a Path, u64, u64)>,
    mount: &Path,
) -> DiskUsage {
    let entries: Vec<_> = entries.collect();

    let chosen = entries
        .iter()
        .find(|(path, _, _)| *path == mount)
        .or_else(|| entries.iter().max_by_key(|(_, total, _)| *total));

    match chosen {
        Some((_, total, available)) => DiskUsage::new(*total, *available),
        None => DiskUsage::default(),
    }
}
