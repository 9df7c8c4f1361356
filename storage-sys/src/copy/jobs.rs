// SPDX-License-Identifier: GPL-3.0-only

//! Partition-level operations built on the copy engine
//!
//! Each job opens its own source and target, runs one copy and releases both
//! handles before returning, whatever the outcome.

use std::path::Path;

use storage_types::SectorRange;
use tracing::info;

use super::{
    CancelFlag, CopyEngine, CopyFailure, CopyOutcome, CopySource, CopyTarget, DeviceSource,
    DeviceTarget, FileSource, FileTarget, ProgressSink,
};
use crate::config::EngineConfig;

/// Write `range` of `device` to a flat image file.
pub fn backup_to_file(
    device: &Path,
    sector_size: u32,
    range: SectorRange,
    image: &Path,
    config: &EngineConfig,
    progress: &mut dyn ProgressSink,
    cancel: &CancelFlag,
) -> Result<CopyOutcome, CopyFailure> {
    info!(
        "Backing up sectors {}..={} of {} to {}",
        range.first,
        range.last,
        device.display(),
        image.display()
    );
    let engine = CopyEngine::from_config(config).map_err(CopyFailure::before_start)?;

    let mut source = DeviceSource::new(device, sector_size, range);
    let mut target =
        FileTarget::new(image, sector_size).with_sync_on_close(config.sync_on_close);
    open_both(&mut source, &mut target)?;

    engine.copy_all(&mut source, &mut target, progress, cancel)
}

/// Write an image file to `device`, starting at `first_sector`.
///
/// The restored range is as long as the image holds whole sectors.
pub fn restore_from_file(
    image: &Path,
    device: &Path,
    sector_size: u32,
    first_sector: i64,
    config: &EngineConfig,
    progress: &mut dyn ProgressSink,
    cancel: &CancelFlag,
) -> Result<CopyOutcome, CopyFailure> {
    let engine = CopyEngine::from_config(config).map_err(CopyFailure::before_start)?;

    let mut source = FileSource::new(image, sector_size);
    source.open().map_err(CopyFailure::before_start)?;

    let range = SectorRange::with_length(first_sector, source.length()).ok_or_else(|| {
        CopyFailure::before_start(crate::SysError::InvalidArgument(format!(
            "cannot restore to sector {first_sector}"
        )))
    })?;
    info!(
        "Restoring {} to sectors {}..={} of {}",
        image.display(),
        range.first,
        range.last,
        device.display()
    );

    let mut target = DeviceTarget::new(device, sector_size, range)
        .with_sync_on_close(config.sync_on_close);
    target.open().map_err(CopyFailure::before_start)?;

    engine.copy_all(&mut source, &mut target, progress, cancel)
}

/// Move the data in `range` of `device` so that it starts at `new_first`.
///
/// Old and new ranges may overlap.
pub fn move_within_device(
    device: &Path,
    sector_size: u32,
    range: SectorRange,
    new_first: i64,
    config: &EngineConfig,
    progress: &mut dyn ProgressSink,
    cancel: &CancelFlag,
) -> Result<CopyOutcome, CopyFailure> {
    info!(
        "Moving sectors {}..={} of {} to start at {}",
        range.first,
        range.last,
        device.display(),
        new_first
    );
    let engine = CopyEngine::from_config(config).map_err(CopyFailure::before_start)?;

    let mut source = DeviceSource::new(device, sector_size, range);
    let mut target = DeviceTarget::new(device, sector_size, range.moved_to(new_first))
        .with_sync_on_close(config.sync_on_close);
    open_both(&mut source, &mut target)?;

    engine.copy_all(&mut source, &mut target, progress, cancel)
}

fn open_both(source: &mut dyn CopySource, target: &mut dyn CopyTarget) -> Result<(), CopyFailure> {
    source.open().map_err(CopyFailure::before_start)?;
    target.open().map_err(CopyFailure::before_start)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::copy::NoProgress;
    use crate::copy::memory::ScratchFile;
    use crate::error::ErrorClass;

    fn config() -> EngineConfig {
        EngineConfig {
            chunk_size: "8 KB".to_string(),
            sync_on_close: false,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn backup_then_restore_reproduces_the_range() {
        let disk = ScratchFile::with_pattern(128, 512);
        let image = ScratchFile::zeroed(0, 512);
        let restored = ScratchFile::zeroed(128, 512);

        let outcome = backup_to_file(
            disk.path(),
            512,
            SectorRange::new(32, 95).unwrap(),
            image.path(),
            &config(),
            &mut NoProgress,
            &CancelFlag::new(),
        )
        .unwrap();
        assert_eq!(outcome.report().sectors_transferred, 64);
        assert_eq!(std::fs::metadata(image.path()).unwrap().len(), 64 * 512);

        restore_from_file(
            image.path(),
            restored.path(),
            512,
            10,
            &config(),
            &mut NoProgress,
            &CancelFlag::new(),
        )
        .unwrap();
        assert_eq!(restored.sectors(10, 64), disk.sectors(32, 64));
        assert_eq!(restored.sectors(0, 10), vec![0u8; 10 * 512]);
    }

    #[test]
    fn moving_a_range_onto_itself_shifted_keeps_its_contents() {
        let disk = ScratchFile::with_pattern(256, 512);
        let original = disk.sectors(40, 100);

        let outcome = move_within_device(
            disk.path(),
            512,
            SectorRange::new(40, 139).unwrap(),
            90,
            &config(),
            &mut NoProgress,
            &CancelFlag::new(),
        )
        .unwrap();
        assert_eq!(
            outcome.report().direction,
            crate::copy::CopyDirection::Backward
        );
        assert_eq!(disk.sectors(90, 100), original);

        move_within_device(
            disk.path(),
            512,
            SectorRange::new(90, 189).unwrap(),
            5,
            &config(),
            &mut NoProgress,
            &CancelFlag::new(),
        )
        .unwrap();
        assert_eq!(disk.sectors(5, 100), original);
    }

    #[test]
    fn restore_past_end_of_device_fails_before_writing() {
        let image = ScratchFile::with_pattern(16, 512);
        let device = ScratchFile::zeroed(20, 512);

        let failure = restore_from_file(
            image.path(),
            device.path(),
            512,
            8,
            &config(),
            &mut NoProgress,
            &CancelFlag::new(),
        )
        .unwrap_err();
        assert_eq!(failure.error.class(), ErrorClass::BoundsViolation);
        assert_eq!(failure.chunk_index, 0);
        assert_eq!(device.sectors(0, 20), vec![0u8; 20 * 512]);
    }

    #[test]
    fn backup_into_its_own_device_is_refused_untouched() {
        let disk = ScratchFile::with_pattern(64, 512);
        let before = disk.sectors(0, 64);

        for range in [SectorRange::new(0, 63).unwrap(), SectorRange::new(16, 47).unwrap()] {
            let failure = backup_to_file(
                disk.path(),
                512,
                range,
                disk.path(),
                &config(),
                &mut NoProgress,
                &CancelFlag::new(),
            )
            .unwrap_err();
            assert!(matches!(failure.error, crate::SysError::InvalidArgument(_)));
            assert_eq!(failure.chunk_index, 0);
            assert_eq!(std::fs::metadata(disk.path()).unwrap().len(), 64 * 512);
            assert_eq!(disk.sectors(0, 64), before);
        }
    }

    #[test]
    fn missing_device_is_reported_as_open_failure() {
        let image = ScratchFile::zeroed(0, 512);
        let failure = backup_to_file(
            Path::new("/nonexistent/disk"),
            512,
            SectorRange::new(0, 7).unwrap(),
            image.path(),
            &config(),
            &mut NoProgress,
            &CancelFlag::new(),
        )
        .unwrap_err();
        assert_eq!(failure.error.class(), ErrorClass::OpenFailure);
    }
}
