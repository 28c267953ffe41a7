use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::metrics::DEFAULT_BENCHMARK_SIZE;
use crate::{GpuDashError, Result};

const ENV_PREFIX: &str = "GPUDASH_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GpuDashConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub benchmarks: BenchmarkDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            static_dir: PathBuf::from("./static"),
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    pub interval_ms: u64,
    pub backoff_ms: u64,
    pub capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            backoff_ms: 5000,
            capacity: 16,
        }
    }
}

impl BroadcastConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub cpu_sample_ms: u64,
    pub disk_mount: PathBuf,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            cpu_sample_ms: 1000,
            disk_mount: PathBuf::from("/"),
        }
    }
}

impl MetricsConfig {
    pub fn cpu_sample_window(&self) -> Duration {
        Duration::from_millis(self.cpu_sample_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkDefaults {
    pub enabled: bool,
    pub default_size: usize,
    pub max_size: usize,
}

impl Default for BenchmarkDefaults {
    fn default() -> Self {
        Self {
            enabled: true,
            default_size: DEFAULT_BENCHMARK_SIZE,
            max_size: 8192,
        }
    }
}

impl GpuDashConfig {
    /// Defaults overridden by `GPUDASH_*` variables (and `HOST`/`PORT`/`STATIC_DIR`), after
    /// loading `.env` if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Yields (key read, value)
        let var = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key).map(|value| (key, value))
        };
        let with_alias = |name: &str| {
            var(name).or_else(|| lookup(name).map(|value| (name.to_string(), value)))
        };
        let mut config = Self::default();

        if let Some((_, host)) = with_alias("HOST") {
            config.server.host = host;
        }
        if let Some((key, v)) = with_alias("PORT") {
            config.server.port = parse(&key, &v)?;
        }
        if let Some((_, dir)) = with_alias("STATIC_DIR") {
            config.server.static_dir = PathBuf::from(dir);
        }

        if let Some((key, v)) = var("BROADCAST_INTERVAL_MS") {
            config.broadcast.interval_ms = parse(&key, &v)?;
        }
        if let Some((key, v)) = var("BROADCAST_BACKOFF_MS") {
            config.broadcast.backoff_ms = parse(&key, &v)?;
        }
        if let Some((key, v)) = var("BROADCAST_CAPACITY") {
            config.broadcast.capacity = parse(&key, &v)?;
        }

        if let Some((key, v)) = var("CPU_SAMPLE_MS") {
            config.metrics.cpu_sample_ms = parse(&key, &v)?;
        }
        if let Some((_, v)) = var("DISK_MOUNT") {
            config.metrics.disk_mount = PathBuf::from(v);
        }

        if let Some((key, v)) = var("BENCHMARKS_ENABLED") {
            config.benchmarks.enabled = parse_bool(&key, &v)?;
        }
        if let Some((key, v)) = var("BENCHMARK_DEFAULT_SIZE") {
            config.benchmarks.default_size = parse(&key, &v)?;
        }
        if let Some((key, v)) = var("BENCHMARK_MAX_SIZE") {
            config.benchmarks.max_size = parse(&key, &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.broadcast.interval_ms == 0 {
            return Err(GpuDashError::Config("broadcast interval must be > 0".into()));
        }
        if self.broadcast.capacity == 0 {
            return Err(GpuDashError::Config("broadcast capacity must be > 0".into()));
        }
        let b = &self.benchmarks;
        if b.default_size == 0 || b.default_size > b.max_size {
            return Err(GpuDashError::Config(format!(
                "default benchmark size {} must be within 1..={}",
                b.default_size, b.max_size
            )));
        }
        Ok(())
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

fn invalid(key: &str, value: &str) -> GpuDashError {
    GpuDashError::Config(format!("{key}: invalid value '{value}'"))
}
