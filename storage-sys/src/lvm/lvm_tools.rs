// SPDX-License-Identifier: GPL-3.0-only

//! `VolumeManager` backed by the `lvm` command-line tool

use std::process::Command;

use tracing::{debug, info, warn};

use super::VolumeManager;
use crate::{Result, SysError};

/// Runs `lvm <subcommand> ...`; query failures become unknown values
#[derive(Debug, Clone)]
pub struct LvmCli {
    command: String,
}

impl Default for LvmCli {
    fn default() -> Self {
        Self::new("lvm")
    }
}

impl LvmCli {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn from_config(config: &crate::config::EngineConfig) -> Self {
        Self::new(config.lvm_command.clone())
    }

    /// Whether the tool can be found on `PATH` (or at its configured path)
    pub fn is_available(&self) -> bool {
        cfg!(feature = "lvm-tools") && which::which(&self.command).is_ok()
    }

    /// One `vgs` report field for `group`, trimmed
    fn group_field(&self, field: &str, group: &str) -> Option<String> {
        let output = self
            .run(&[
                "vgs",
                "--foreign",
                "--readonly",
                "--noheadings",
                "--units",
                "B",
                "--nosuffix",
                "--options",
                field,
                group,
            ])
            .map_err(|e| warn!("Reading {} of volume group {} failed: {}", field, group, e))
            .ok()?;
        let value = output.trim();
        (!value.is_empty()).then(|| value.to_string())
    }

    fn group_number(&self, field: &str, group: &str) -> Option<i64> {
        self.group_field(field, group)
            .and_then(|value| parse_number(&value))
    }

    /// Create a logical volume of `extents` extents in `group`
    pub fn create_volume(&self, group: &str, name: &str, extents: i64) -> Result<()> {
        info!("Creating logical volume {} ({} extents) in {}", name, extents, group);
        self.run(&[
            "lvcreate",
            "--yes",
            "--extents",
            &extents.to_string(),
            "--name",
            name,
            group,
        ])
        .map(drop)
    }

    pub fn remove_volume(&self, path: &str) -> Result<()> {
        info!("Removing logical volume {}", path);
        self.run(&["lvremove", "--yes", path]).map(drop)
    }

    /// Resize a logical volume to `extents` extents. Its filesystem is left
    /// untouched.
    pub fn resize_volume(&self, path: &str, extents: i64) -> Result<()> {
        info!("Resizing logical volume {} to {} extents", path, extents);
        self.run(&["lvresize", "--extents", &extents.to_string(), path])
            .map(drop)
    }

    pub fn add_physical_volume(&self, group: &str, physical_volume: &str) -> Result<()> {
        info!("Adding {} to volume group {}", physical_volume, group);
        self.run(&["vgextend", group, physical_volume]).map(drop)
    }

    pub fn remove_physical_volume(&self, group: &str, physical_volume: &str) -> Result<()> {
        info!("Removing {} from volume group {}", physical_volume, group);
        self.run(&["vgreduce", group, physical_volume]).map(drop)
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        if !cfg!(feature = "lvm-tools") {
            return Err(SysError::ToolMissing(self.command.clone()));
        }
        debug!("Running {} {}", self.command, args.join(" "));
        let output = Command::new(&self.command)
            .args(args)
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => SysError::ToolMissing(self.command.clone()),
                _ => SysError::Io(e),
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SysError::CommandFailed {
                command: format!("{} {}", self.command, args.first().unwrap_or(&"")),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl VolumeManager for LvmCli {
    fn list_volume_paths(&self, group: &str) -> Vec<String> {
        self.group_field("lv_path", group)
            .map(|output| parse_lines(&output))
            .unwrap_or_default()
    }

    fn volume_extent_count(&self, path: &str) -> Option<i64> {
        let output = self
            .run(&["lvdisplay", path])
            .map_err(|e| warn!("lvdisplay {} failed: {}", path, e))
            .ok()?;
        parse_current_le(&output)
    }

    fn group_extent_size(&self, group: &str) -> Option<i64> {
        self.group_number("vg_extent_size", group)
    }

    fn group_total_extents(&self, group: &str) -> Option<i64> {
        self.group_number("vg_extent_count", group)
    }

    fn group_free_extents(&self, group: &str) -> Option<i64> {
        self.group_number("vg_free_count", group)
    }

    fn group_uuid(&self, group: &str) -> Option<String> {
        self.group_field("vg_uuid", group)
    }

    fn physical_volume_paths(&self, group: &str) -> Vec<String> {
        self.group_field("pv_name", group)
            .map(|output| parse_lines(&output))
            .unwrap_or_default()
    }
}

/// Non-empty trimmed lines of a report
fn parse_lines(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Integer report value; byte sizes may carry a fractional part
fn parse_number(value: &str) -> Option<i64> {
    let value = value.trim();
    value
        .parse::<i64>()
        .ok()
        .or_else(|| value.parse::<f64>().ok().map(|v| v as i64))
        .filter(|v| *v >= 0)
}

/// Extent count from `lvdisplay` output
fn parse_current_le(output: &str) -> Option<i64> {
    output.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("Current LE")?;
        rest.split_whitespace().next()?.parse().ok()
    })
}
