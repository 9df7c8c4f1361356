// SPDX-License-Identifier: GPL-3.0-only

//! Chunked, overlap-safe transfer between a `CopySource` and a `CopyTarget`
//!
//! When both ends live on the same storage and their byte spans intersect,
//! chunks are processed high-to-low if the target starts after the source
//! and low-to-high otherwise, so no chunk overwrites source data that has not
//! been read yet. Chunks are processed strictly one after another in that
//! order.

use std::fmt;

use storage_types::sectors_to_bytes;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{CancelFlag, CopySource, CopyTarget, ProgressSink};
use crate::error::SysError;

/// Default upper bound on bytes moved per chunk
pub const DEFAULT_CHUNK_BYTES: usize = 4 * 1024 * 1024;

/// Order in which chunks are processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyDirection {
    /// Lowest chunk first
    Forward,
    /// Highest chunk first
    Backward,
}

impl fmt::Display for CopyDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forward => f.write_str("forward"),
            Self::Backward => f.write_str("backward"),
        }
    }
}

/// What a finished (or stopped) copy did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyReport {
    /// Source sectors transferred
    pub sectors_transferred: i64,
    pub bytes_transferred: u64,
    /// Chunks completed
    pub chunks: usize,
    pub direction: CopyDirection,
}

/// Non-failing end states of a copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    Completed(CopyReport),
    /// Cancellation was observed between chunks; the target holds the
    /// chunks completed so far.
    Cancelled(CopyReport),
}

impl CopyOutcome {
    pub fn report(&self) -> &CopyReport {
        match self {
            Self::Completed(report) | Self::Cancelled(report) => report,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Treat cancellation as an error
    pub fn into_result(self) -> crate::Result<CopyReport> {
        match self {
            Self::Completed(report) => Ok(report),
            Self::Cancelled(report) => Err(SysError::Cancelled {
                sectors_transferred: report.sectors_transferred,
            }),
        }
    }
}

/// A copy that stopped on an error.
///
/// Chunks processed before `chunk_index` are on the target; nothing is
/// rolled back. Offsets are relative to each side's own range, in that
/// side's sectors.
#[derive(Debug, Error)]
#[error(
    "copy failed at chunk {chunk_index} of {chunk_count} (source offset {source_offset}, \
     target offset {target_offset}) after {sectors_transferred} sectors"
)]
pub struct CopyFailure {
    #[source]
    pub error: SysError,
    /// 1-based position in processing order; 0 when nothing was attempted
    pub chunk_index: usize,
    pub chunk_count: usize,
    pub source_offset: i64,
    pub target_offset: i64,
    pub sectors_transferred: i64,
    pub direction: CopyDirection,
}

impl CopyFailure {
    /// Failure raised before the first chunk (validation, open)
    pub fn before_start(error: SysError) -> Self {
        Self {
            error,
            chunk_index: 0,
            chunk_count: 0,
            source_offset: 0,
            target_offset: 0,
            sectors_transferred: 0,
            direction: CopyDirection::Forward,
        }
    }
}

/// Byte window of one chunk
#[derive(Debug, Clone, Copy)]
struct Chunk {
    start: u64,
    len: u64,
}

/// Stateless copy driver; the only setting is the chunk size
#[derive(Debug, Clone, Copy)]
pub struct CopyEngine {
    chunk_bytes: usize,
}

impl Default for CopyEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_BYTES)
    }
}

impl CopyEngine {
    pub fn new(chunk_bytes: usize) -> Self {
        Self {
            chunk_bytes: chunk_bytes.max(1),
        }
    }

    pub fn from_config(config: &crate::config::EngineConfig) -> crate::Result<Self> {
        Ok(Self::new(config.chunk_bytes()?))
    }

    pub fn chunk_bytes(&self) -> usize {
        self.chunk_bytes
    }

    /// Copy the whole source
    pub fn copy_all(
        &self,
        source: &mut dyn CopySource,
        target: &mut dyn CopyTarget,
        progress: &mut dyn ProgressSink,
        cancel: &CancelFlag,
    ) -> Result<CopyOutcome, CopyFailure> {
        let sectors = source.length();
        self.copy(source, target, sectors, progress, cancel)
    }

    /// Copy the first `sectors` source sectors to the start of the target.
    ///
    /// Both ends must already be open. Progress is reported in source
    /// sectors after every chunk.
    pub fn copy(
        &self,
        source: &mut dyn CopySource,
        target: &mut dyn CopyTarget,
        sectors: i64,
        progress: &mut dyn ProgressSink,
        cancel: &CancelFlag,
    ) -> Result<CopyOutcome, CopyFailure> {
        if sectors < 0 {
            return Err(CopyFailure::before_start(SysError::InvalidArgument(
                format!("cannot copy {sectors} sectors"),
            )));
        }
        if sectors == 0 {
            return Ok(CopyOutcome::Completed(CopyReport {
                sectors_transferred: 0,
                bytes_transferred: 0,
                chunks: 0,
                direction: CopyDirection::Forward,
            }));
        }

        let total_bytes = validate(source, target, sectors).map_err(CopyFailure::before_start)?;
        let direction = plan_direction(source, target);

        if is_identity(source, target) {
            info!(
                backend = %source.describe(),
                first_sector = source.first_sector(),
                "Source and target are the same range, nothing to copy"
            );
            progress.progress(sectors, sectors);
            return Ok(CopyOutcome::Completed(CopyReport {
                sectors_transferred: sectors,
                bytes_transferred: total_bytes,
                chunks: 0,
                direction,
            }));
        }

        self.run(source, target, total_bytes, direction, progress, cancel)
    }

    fn run(
        &self,
        source: &mut dyn CopySource,
        target: &mut dyn CopyTarget,
        total_bytes: u64,
        direction: CopyDirection,
        progress: &mut dyn ProgressSink,
        cancel: &CancelFlag,
    ) -> Result<CopyOutcome, CopyFailure> {
        let source_size = u64::from(source.sector_size());
        let target_size = u64::from(target.sector_size());
        let unit = lcm(source_size, target_size);
        let chunk_bytes = ((self.chunk_bytes as u64 / unit) * unit)
            .max(unit)
            .min(total_bytes);
        let chunk_count = total_bytes.div_ceil(chunk_bytes) as usize;
        let total_sectors = (total_bytes / source_size) as i64;

        info!(
            source = %source.describe(),
            target = %target.describe(),
            sectors = total_sectors,
            chunks = chunk_count,
            %direction,
            "Starting copy"
        );

        target.prepare().map_err(CopyFailure::before_start)?;

        let mut buffer = vec![0u8; chunk_bytes as usize];
        let mut bytes_done: u64 = 0;
        let mut last = Chunk { start: 0, len: 0 };

        for step in 0..chunk_count {
            let index = match direction {
                CopyDirection::Forward => step,
                CopyDirection::Backward => chunk_count - 1 - step,
            };
            let start = index as u64 * chunk_bytes;
            let chunk = Chunk {
                start,
                len: chunk_bytes.min(total_bytes - start),
            };

            if cancel.is_cancelled() {
                info!(
                    sectors_transferred = (bytes_done / source_size) as i64,
                    "Copy cancelled"
                );
                return Ok(CopyOutcome::Cancelled(CopyReport {
                    sectors_transferred: (bytes_done / source_size) as i64,
                    bytes_transferred: bytes_done,
                    chunks: step,
                    direction,
                }));
            }

            let failure = |error: SysError| CopyFailure {
                error,
                chunk_index: step + 1,
                chunk_count,
                source_offset: (chunk.start / source_size) as i64,
                target_offset: (chunk.start / target_size) as i64,
                sectors_transferred: (bytes_done / source_size) as i64,
                direction,
            };

            let data = &mut buffer[..chunk.len as usize];
            source
                .read_sectors(
                    data,
                    (chunk.start / source_size) as i64,
                    (chunk.len / source_size) as i64,
                )
                .map_err(failure)?;
            target
                .write_sectors(
                    data,
                    (chunk.start / target_size) as i64,
                    (chunk.len / target_size) as i64,
                )
                .map_err(failure)?;

            bytes_done += chunk.len;
            last = chunk;
            debug!(
                chunk = step + 1,
                of = chunk_count,
                byte_offset = chunk.start,
                bytes = chunk.len,
                "Copied chunk"
            );
            progress.progress((bytes_done / source_size) as i64, total_sectors);
        }

        target.sync().map_err(|error| {
            warn!("Syncing {} failed: {}", target.describe(), error);
            CopyFailure {
                error,
                chunk_index: chunk_count,
                chunk_count,
                source_offset: (last.start / source_size) as i64,
                target_offset: (last.start / target_size) as i64,
                sectors_transferred: total_sectors,
                direction,
            }
        })?;

        info!(sectors = total_sectors, "Copy finished");
        Ok(CopyOutcome::Completed(CopyReport {
            sectors_transferred: total_sectors,
            bytes_transferred: total_bytes,
            chunks: chunk_count,
            direction,
        }))
    }
}

/// Choose the chunk order for copying `source` onto `target`.
///
/// Backward only when the two share storage, their spans intersect and the
/// target starts at a higher byte address than the source.
pub fn plan_direction(source: &dyn CopySource, target: &dyn CopyTarget) -> CopyDirection {
    if source.overlaps(target) && start_byte_of_target(target) > start_byte_of_source(source) {
        CopyDirection::Backward
    } else {
        CopyDirection::Forward
    }
}

fn start_byte_of_source(source: &dyn CopySource) -> i128 {
    sectors_to_bytes(source.first_sector(), source.sector_size())
}

fn start_byte_of_target(target: &dyn CopyTarget) -> i128 {
    sectors_to_bytes(target.first_sector(), target.sector_size())
}

fn shares_storage(source: &dyn CopySource, target: &dyn CopyTarget) -> bool {
    matches!(
        (source.backend_id(), target.backend_id()),
        (Some(ours), Some(theirs)) if ours == theirs
    )
}

fn is_identity(source: &dyn CopySource, target: &dyn CopyTarget) -> bool {
    shares_storage(source, target) && start_byte_of_source(source) == start_byte_of_target(target)
}

/// Check preconditions and return the number of bytes to move.
fn validate(source: &dyn CopySource, target: &dyn CopyTarget, sectors: i64) -> crate::Result<u64> {
    if !source.is_open() {
        return Err(SysError::NotOpen {
            backend: source.describe(),
        });
    }
    if !target.is_open() {
        return Err(SysError::NotOpen {
            backend: target.describe(),
        });
    }

    if target.replaces_contents() && shares_storage(source, target) {
        return Err(SysError::InvalidArgument(format!(
            "{} would be emptied before {} is read",
            target.describe(),
            source.describe()
        )));
    }

    let available = source.length();
    if sectors > available {
        warn!(
            "{} holds {} sectors, {} requested",
            source.describe(),
            available,
            sectors
        );
        return Err(SysError::LengthMismatch {
            requested: sectors,
            available,
        });
    }

    let source_size = u64::from(source.sector_size());
    let target_size = u64::from(target.sector_size());
    if source_size == 0 || target_size == 0 {
        return Err(SysError::InvalidArgument(
            "sector size must be positive".to_string(),
        ));
    }

    let total_bytes = (sectors as u64).checked_mul(source_size).ok_or_else(|| {
        SysError::InvalidArgument(format!("{sectors} sectors overflow a byte count"))
    })?;
    if total_bytes % target_size != 0 {
        return Err(SysError::InvalidArgument(format!(
            "{total_bytes} bytes are not a whole number of {target_size} byte sectors of {}",
            target.describe()
        )));
    }

    let capacity = sectors_to_bytes(target.writable_range().len(), target.sector_size());
    if i128::from(total_bytes) > capacity {
        return Err(SysError::BoundsViolation {
            backend: target.describe(),
            offset: 0,
            count: (total_bytes / target_size) as i64,
            length: target.writable_range().len(),
        });
    }

    Ok(total_bytes)
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn lcm(a: u64, b: u64) -> u64 {
    a / gcd(a, b) * b
}
