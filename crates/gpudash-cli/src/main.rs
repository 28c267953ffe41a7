use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gpudash_benchmark::{detect_gpu_backend, BenchmarkRunner};
use gpudash_core::{
    BenchmarkComparison, BenchmarkResult, BenchmarkType, Capabilities, ExecutionTarget,
    GpuDashConfig, SystemSnapshot,
};
use gpudash_services::{GpuMonitor, MetricsSource, SystemMetricsReader};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gpudash")]
#[command(about = "gpudash - system monitor and GPU/CPU benchmarks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print one system metrics snapshot
    Snapshot {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Output::Table)]
        output: Output,
    },

    /// Run a single benchmark
    Bench {
        /// matrix_multiply, image_processing, ml_inference or linear_regression
        #[arg(short, long, default_value = "matrix_multiply")]
        kind: BenchmarkType,

        /// Problem size (defaults to GPUDASH_BENCHMARK_DEFAULT_SIZE)
        #[arg(short, long)]
        size: Option<usize>,

        /// gpu or cpu
        #[arg(short, long, default_value = "gpu")]
        target: ExecutionTarget,

        #[arg(short, long, value_enum, default_value_t = Output::Table)]
        output: Output,
    },

    /// Matrix multiply on GPU and CPU with the speedup
    Compare {
        #[arg(short, long)]
        size: Option<usize>,

        #[arg(short, long, value_enum, default_value_t = Output::Table)]
        output: Output,
    },

    /// Show which optional backends loaded
    Health,
}

#[derive(Clone, Copy, ValueEnum)]
enum Output {
    Table,
    Json,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = GpuDashConfig::from_env()?;

    match cli.command {
        Commands::Snapshot { output } => cmd_snapshot(&config, output),
        Commands::Bench {
            kind,
            size,
            target,
            output,
        } => cmd_bench(&config, kind, size, target, output),
        Commands::Compare { size, output } => cmd_compare(&config, size, output),
        Commands::Health => cmd_health(&config),
    }
}

fn runner(config: &GpuDashConfig) -> Result<BenchmarkRunner> {
    BenchmarkRunner::new(&config.benchmarks, detect_gpu_backend())
        .context("benchmarks unavailable")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_snapshot(config: &GpuDashConfig, output: Output) -> Result<()> {
    let reader = SystemMetricsReader::new(&config.metrics, GpuMonitor::detect());
    let snapshot = reader.read_snapshot()?;

    match output {
        Output::Json => print_json(&snapshot),
        Output::Table => {
            print_snapshot(&snapshot);
            Ok(())
        }
    }
}

fn print_snapshot(s: &SystemSnapshot) {
    println!();
    println!("System Snapshot ({})", s.timestamp.format("%Y-%m-%d %H:%M:%S"));
    println!("{:-<50}", "");
    println!("  CPU:       {:.1}% of {} cores", s.cpu.usage_percent, s.cpu.count);
    if let Some(freq) = s.cpu.freq {
        println!("  CPU freq:  {} MHz", freq.current_mhz);
    }
    println!(
        "  Memory:    {:.1}% ({} / {})",
        s.memory.percent,
        gib(s.memory.used),
        gib(s.memory.total)
    );
    println!(
        "  Disk:      {:.1}% ({} / {})",
        s.disk.percent,
        gib(s.disk.used),
        gib(s.disk.total)
    );
    println!(
        "  Network:   {} sent, {} received",
        gib(s.network.bytes_sent),
        gib(s.network.bytes_recv)
    );

    if s.gpu.is_empty() {
        println!("  GPU:       none");
    }
    for gpu in &s.gpu {
        println!(
            "  GPU {}:     {} {:.0}% load, {} / {}, {}°C",
            gpu.id,
            gpu.name,
            gpu.load * 100.0,
            gib(gpu.memory_used),
            gib(gpu.memory_total),
            gpu.temperature
        );
    }
    println!();
}

fn gib(bytes: u64) -> String {
    format!("{:.2} GiB", bytes as f64 / (1u64 << 30) as f64)
}

fn cmd_bench(
    config: &GpuDashConfig,
    kind: BenchmarkType,
    size: Option<usize>,
    target: ExecutionTarget,
    output: Output,
) -> Result<()> {
    let result = runner(config)?.run(kind, target, size);

    match output {
        Output::Json => print_json(&result)?,
        Output::Table => {
            println!();
            print_result(&result);
            println!();
        }
    }

    match &result.error {
        Some(e) => anyhow::bail!("{} failed: {}", kind.label(), e),
        None => Ok(()),
    }
}

fn print_result(r: &BenchmarkResult) {
    println!("{} on {} (size {})", r.kind.label(), r.target, r.size);
    println!("{:-<50}", "");
    if let Some(e) = &r.error {
        println!("  Error:         {}", e);
        return;
    }
    println!("  Compute time:  {:.6} s", r.compute_time);
    println!("  Total time:    {:.6} s", r.total_time);
    println!("  Throughput:    {:.2} {}", r.throughput, r.throughput_unit);
    if let Some(cpu) = r.cpu_time {
        println!("  CPU time:      {:.6} s", cpu);
    }
    if let Some(speedup) = r.speedup {
        println!("  Speedup:       {:.2}x", speedup);
    }
    if let Some(r2) = r.r2_score {
        println!("  R²:            {:.4}", r2);
    }
}

fn cmd_compare(config: &GpuDashConfig, size: Option<usize>, output: Output) -> Result<()> {
    let comparison = runner(config)?.compare_matrix_multiply(size);

    match output {
        Output::Json => print_json(&comparison),
        Output::Table => {
            print_comparison(&comparison);
            Ok(())
        }
    }
}

fn print_comparison(c: &BenchmarkComparison) {
    println!();
    print_result(&c.gpu_result);
    println!();
    print_result(&c.cpu_result);
    println!();
    match c.speedup {
        Some(speedup) => println!("GPU speedup: {:.2}x", speedup),
        None => println!("GPU speedup: n/a"),
    }
    println!();
}

fn cmd_health(config: &GpuDashConfig) -> Result<()> {
    let gpu = GpuMonitor::detect();
    let runner = runner(config).ok();
    let caps = Capabilities::new(
        gpu.is_some(),
        runner.is_some(),
        runner.as_ref().is_some_and(|r| r.has_gpu()),
    );

    println!("Capabilities:");
    println!("{:-<40}", "");
    println!("  GPU metrics:   {}", yes_no(caps.gpu_metrics));
    println!("  Benchmarks:    {}", yes_no(caps.benchmarks));
    println!("  GPU demos:     {}", yes_no(caps.benchmarks && caps.gpu_compute));
    println!("  GPU compute:   {}", yes_no(caps.gpu_compute));
    Ok(())
}

fn yes_no(v: bool) -> &'static str {
    if v {
        "available"
    } else {
        "unavailable"
    }
}
