//! Operator subcommands, one module per command.

pub mod cert;
pub mod edit;
pub mod list;
pub mod news;
pub mod remove;
pub mod render;
pub mod sign;
pub mod sync;
pub mod upload;

/// Render a byte count for humans.
pub(crate) fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// Render a unix-millisecond timestamp as a short local-agnostic date.
pub(crate) fn short_date(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .unwrap_or_default()
        .format("%Y-%m-%d %H:%M")
        .to_string()
}
