//! System-level types for host monitoring

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// One point-in-time capture of host resource metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub timestamp: DateTime<Local>,
    pub cpu: CpuUsage,
    pub memory: MemoryUsage,
    pub disk: DiskUsage,
    pub network: NetworkCounters,
    pub gpu: Vec<GpuRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CpuUsage {
    pub usage_percent: f32,
    pub count: usize,
    pub freq: Option<CpuFrequency>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CpuFrequency {
    pub current_mhz: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub percent: f64,
}

impl MemoryUsage {
    pub fn new(total: u64, available: u64, used: u64) -> Self {
        Self {
            total,
            available,
            used,
            percent: percent_of(used, total),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiskUsage {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f64,
}

impl DiskUsage {
    /// Builds the section from filesystem totals. `percent` is `used/total*100`
    /// and an empty filesystem reports zero.
    pub fn new(total: u64, free: u64) -> Self {
        let free = free.min(total);
        let used = total - free;
        Self {
            total,
            used,
            free,
            percent: percent_of(used, total),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkCounters {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
}

/// A single GPU as reported by the device driver. Memory values are bytes and
/// `load` is a fraction in `0.0..=1.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuRecord {
    pub id: u32,
    pub name: String,
    pub load: f64,
    pub memory_total: u64,
    pub memory_used: u64,
    pub memory_free: u64,
    pub temperature: u32,
    pub uuid: String,
}

fn percent_of(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    ((part as f64 / whole as f64) * 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_percent_is_used_over_total() {
        let disk = DiskUsage::new(1_000, 250);
        assert_eq!(disk.used, 750);
        assert_eq!(disk.free, 250);
        assert!((disk.percent - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_disk_percent_stays_in_range() {
        let cases = [(0, 0), (10, 0), (10, 10), (10, 50), (u64::MAX, 1), (4096, 4095)];
        for (total, free) in cases {
            let disk = DiskUsage::new(total, free);
            assert!((0.0..=100.0).contains(&disk.percent), "{total}/{free}");
            assert_eq!(disk.used + disk.free, disk.total);
        }
    }

    #[test]
    fn test_empty_disk_reports_zero() {
        let disk = DiskUsage::new(0, 0);
        assert_eq!(disk.percent, 0.0);
    }

    #[test]
    fn test_memory_percent() {
        let mem = MemoryUsage::new(8, 2, 6);
        assert!((mem.percent - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_gpu_record_wire_names() {
        let record = GpuRecord {
            id: 0,
            name: "Test GPU".into(),
            load: 0.5,
            memory_total: 2048,
            memory_used: 1024,
            memory_free: 1024,
            temperature: 60,
            uuid: "GPU-1234".into(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["memoryTotal"], 2048);
        assert_eq!(value["memoryFree"], 1024);
        assert_eq!(value["uuid"], "GPU-1234");
    }
}
