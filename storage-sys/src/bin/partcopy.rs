// SPDX-License-Identifier: GPL-3.0-only

//! partcopy - back up, restore and move partition data sector by sector

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use storage_sys::copy::{CopyJob, logical_sector_size};
use storage_sys::{
    BlkidProbe, CancelFlag, Collaborators, CopyEngine, CopySource, DeviceSource, DeviceTarget,
    EngineConfig, FileSource, FileTarget, LvmCli, MountSnapshot, ProgressSink, ProgressTracker,
    scan_volume_group, spawn_copy_job,
};
use storage_types::{SectorRange, bytes_to_pretty};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Parser)]
#[command(name = "partcopy")]
#[command(about = "Sector-accurate partition backup, restore and move")]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Chunk size, e.g. "8 MB" (overrides the configuration)
    #[arg(long)]
    chunk_size: Option<String>,

    /// Do not flush the target when the copy finishes
    #[arg(long)]
    no_sync: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Copy a sector range of a device into an image file
    Backup {
        device: PathBuf,
        image: PathBuf,
        #[arg(long)]
        first: i64,
        #[arg(long)]
        last: i64,
        #[arg(long)]
        sector_size: Option<u32>,
    },
    /// Write an image file to a device starting at a sector
    Restore {
        image: PathBuf,
        device: PathBuf,
        #[arg(long)]
        first: i64,
        #[arg(long)]
        sector_size: Option<u32>,
    },
    /// Move a sector range to a new start on the same device
    Move {
        device: PathBuf,
        #[arg(long)]
        first: i64,
        #[arg(long)]
        last: i64,
        #[arg(long)]
        to: i64,
        #[arg(long)]
        sector_size: Option<u32>,
    },
    /// Show a volume group as a partition table
    VgScan {
        group: String,
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("partcopy=info,storage_sys=info,warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let job = match args.command {
        Command::Backup {
            device,
            image,
            first,
            last,
            sector_size,
        } => {
            let sector_size = resolve_sector_size(&device, sector_size)?;
            CopyJob {
                source: Box::new(DeviceSource::new(
                    &device,
                    sector_size,
                    sector_range(first, last)?,
                )),
                target: Box::new(
                    FileTarget::new(&image, sector_size).with_sync_on_close(config.sync_on_close),
                ),
                sectors: None,
                engine: CopyEngine::from_config(&config)?,
            }
        }
        Command::Restore {
            image,
            device,
            first,
            sector_size,
        } => {
            let sector_size = resolve_sector_size(&device, sector_size)?;
            let mut source = FileSource::new(&image, sector_size);
            source.open()?;
            let range = SectorRange::with_length(first, source.length())
                .with_context(|| format!("cannot restore to sector {first}"))?;
            CopyJob {
                source: Box::new(source),
                target: Box::new(
                    DeviceTarget::new(&device, sector_size, range)
                        .with_sync_on_close(config.sync_on_close),
                ),
                sectors: None,
                engine: CopyEngine::from_config(&config)?,
            }
        }
        Command::Move {
            device,
            first,
            last,
            to,
            sector_size,
        } => {
            let sector_size = resolve_sector_size(&device, sector_size)?;
            let range = sector_range(first, last)?;
            CopyJob {
                source: Box::new(DeviceSource::new(&device, sector_size, range)),
                target: Box::new(
                    DeviceTarget::new(&device, sector_size, range.moved_to(to))
                        .with_sync_on_close(config.sync_on_close),
                ),
                sectors: None,
                engine: CopyEngine::from_config(&config)?,
            }
        }
        Command::VgScan { group, json } => return vg_scan(&config, &group, json),
    };

    run_job(job).await
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(chunk_size) = &args.chunk_size {
        config.chunk_size = chunk_size.clone();
        config.chunk_bytes()?;
    }
    if args.no_sync {
        config.sync_on_close = false;
    }
    Ok(config)
}

fn resolve_sector_size(device: &Path, requested: Option<u32>) -> Result<u32> {
    match requested {
        Some(size) => Ok(size),
        None => logical_sector_size(device)
            .with_context(|| format!("cannot read the sector size of {}", device.display())),
    }
}

fn sector_range(first: i64, last: i64) -> Result<SectorRange> {
    SectorRange::new(first, last).with_context(|| format!("invalid sector range {first}..={last}"))
}

async fn run_job(job: CopyJob) -> Result<()> {
    let sector_size = job.source.sector_size();
    let mut handle = spawn_copy_job(job, CancelFlag::new());

    let mut tracker = ProgressTracker::new(sector_size);
    let render_interval = Duration::from_millis(250);
    let mut last_render = Instant::now() - render_interval;
    while let Some(update) = handle.progress().recv().await {
        tracker.progress(update.sectors_done, update.sectors_total);
        if last_render.elapsed() >= render_interval {
            print_progress_line(&tracker);
            last_render = Instant::now();
        }
    }

    let outcome = handle.wait().await?;
    if tracker.updates() > 0 {
        print_progress_line(&tracker);
        eprintln!();
    }

    let report = outcome.into_result()?;
    tracing::info!(
        "Copied {} sectors ({}) in {} chunks, {}",
        report.sectors_transferred,
        bytes_to_pretty(report.bytes_transferred, true),
        report.chunks,
        report.direction
    );
    Ok(())
}

fn print_progress_line(tracker: &ProgressTracker) {
    eprint!("\r{}", tracker.render());
    let _ = std::io::Write::flush(&mut std::io::stderr());
}

fn vg_scan(config: &EngineConfig, group: &str, json: bool) -> Result<()> {
    let volumes = LvmCli::from_config(config);
    if !volumes.is_available() {
        anyhow::bail!("{} not found", config.lvm_command);
    }
    let filesystems = BlkidProbe::from_config(config);
    let mounts = MountSnapshot::load()?;

    let device = scan_volume_group(
        group,
        &Collaborators {
            volumes: &volumes,
            filesystems: &filesystems,
            mounts: &mounts,
        },
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&device)?);
        return Ok(());
    }

    let extent = device.logical_sector_size().unwrap_or(0);
    println!(
        "{} ({}) uuid={} extent_size={} extents={} free={} used={}%",
        device.group.name,
        device.group.device_node,
        device.group.uuid,
        extent,
        device.table.last_usable + 1,
        device.table.free_sectors(),
        device.group.usage_percent()
    );
    println!();
    println!("PATH                     FIRST       LAST        FS           MOUNT");
    println!("--------------------------------------------------------------------------");
    for partition in device.table.partitions() {
        let path = if partition.is_unallocated() {
            "(free)"
        } else {
            partition.path.as_str()
        };
        println!(
            "{:<24} {:>11} {:>11}  {:<12} {}",
            path,
            partition.range.first,
            partition.range.last,
            partition.filesystem.fs_type.name(),
            partition.mount_point.as_deref().unwrap_or("")
        );
    }

    Ok(())
}
