//! Human-readable upload size limits ("10MB", "512k", "1.5GB").

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

/// Fallback ceiling when `MAX_FILE_SIZE` is missing or unparseable.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

static SIZE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(\d+(?:\.\d+)?)\s*(KB|MB|GB|K|M|G|B)?$").unwrap());

/// Parse a size string into bytes. A bare number is taken as bytes.
pub fn parse_file_size(input: &str) -> u64 {
    let input = input.trim();

    if let Ok(bytes) = input.parse::<f64>() {
        if bytes.is_finite() && bytes >= 0.0 {
            return bytes as u64;
        }
    }

    let Some(caps) = SIZE_RE.captures(input) else {
        warn!("Invalid file size format: {:?}, defaulting to 10MB", input);
        return DEFAULT_MAX_FILE_SIZE;
    };

    let size: f64 = caps[1].parse().unwrap_or(0.0);
    let multiplier = match caps
        .get(2)
        .map(|m| m.as_str().to_ascii_uppercase())
        .as_deref()
    {
        Some("KB") | Some("K") => 1024.0,
        Some("MB") | Some("M") => 1024.0 * 1024.0,
        Some("GB") | Some("G") => 1024.0 * 1024.0 * 1024.0,
        _ => 1.0,
    };

    (size * multiplier) as u64
}

/// Render a byte count as megabytes with two decimals, e.g. `"10.00"`.
pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.2}", bytes as f64 / (1024.0 * 1024.0))
}
