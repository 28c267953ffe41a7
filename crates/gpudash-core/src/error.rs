use thiserror::Error;

#[derive(Error, Debug)]
pub enum GpuDashError {
    #[error("Unknown benchmark type: {0}")]
    UnknownBenchmark(String),

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, GpuDashError>;
