// SPDX-License-Identifier: GPL-3.0-only

//! Size helpers shared by the CLI and configuration parsing

use anyhow::Result;
use num_format::{Locale, ToFormattedString};

const UNITS: [&str; 9] = ["B", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

/// Convert bytes to human-readable format (e.g., "1.50 GB")
pub fn bytes_to_pretty(bytes: u64, add_bytes: bool) -> String {
    let mut steps = 0;
    let mut val = bytes as f64;

    while val > 1024. && steps < UNITS.len() - 1 {
        val /= 1024.;
        steps += 1;
    }

    if add_bytes {
        format!(
            "{:.2} {} ({} bytes)",
            val,
            UNITS[steps],
            bytes.to_formatted_string(&Locale::en)
        )
    } else {
        format!("{:.2} {}", val, UNITS[steps])
    }
}

/// Parse human-readable format to bytes (e.g., "1.5 GB" -> bytes)
///
/// A bare number is taken as bytes.
pub fn pretty_to_bytes(pretty: &str) -> Result<u64> {
    let mut parts = pretty.split_whitespace();
    let number = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("Invalid input: {pretty:?}"))?;
    let unit = parts.next().unwrap_or("B");
    if parts.next().is_some() {
        anyhow::bail!("Invalid input: {pretty:?}");
    }

    let value: f64 = number.parse()?;
    if !value.is_finite() || value < 0. {
        anyhow::bail!("Invalid size: {number}");
    }

    let steps = UNITS
        .iter()
        .position(|candidate| *candidate == unit)
        .ok_or_else(|| anyhow::anyhow!("Invalid unit: {}", unit))?;

    Ok((value * 1024_f64.powi(steps as i32)) as u64)
}

/// Byte count of `sectors` sectors of `sector_size` bytes
pub fn sectors_to_bytes(sectors: i64, sector_size: u32) -> i128 {
    i128::from(sectors) * i128::from(sector_size)
}
