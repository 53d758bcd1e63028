const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Format a number of bytes with binary prefixes.
///
/// The largest unit keeping the value at or above 1 is selected,
/// and the value is written with up to 3 decimals, always below 1024.
/// e.g. `1536` gives `"1.5 KB"`
pub fn human_size(bytes: u64) -> String {
    let mut unit = 0;
    while unit + 1 < SIZE_UNITS.len() && bytes >= 1u64 << (10 * (unit + 1)) {
        unit += 1;
    }

    let mut value = bytes as f64 / (1u64 << (10 * unit)) as f64;
    // Values rounding up to 1024 belong to the next unit
    if unit + 1 < SIZE_UNITS.len() && (value * 1000.0).round() >= 1024.0 * 1000.0 {
        unit += 1;
        value /= 1024.0;
    }
    let mut s = format!("{value:.3}");
    if s.contains('.') {
        let trimmed = s.trim_end_matches('0').trim_end_matches('.').len();
        s.truncate(trimmed);
    }

    format!("{s} {}", SIZE_UNITS[unit])
}

/// Format a duration given in milliseconds as `H:MM:SS`.
///
/// Milliseconds are rounded to the nearest second.
pub fn human_duration(msec: u64) -> String {
    let secs = (msec + 500) / 1000;
    format!("{}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
}
