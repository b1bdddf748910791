//! Progress reporting for long-running store units.
//!
//! Thumbnail transfers and vector upserts can take minutes for large
//! catalogs; reporters let the CLI show how far each store has got.
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::{IsTerminal, Write};
use std::sync::Arc;

use crate::traits::StoreKind;

/// A single progress event: `n` of `total` items handled for one store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgressEvent {
    pub store: StoreKind,
    pub n: u64,
    pub total: u64,
}

/// Receives progress events. Called concurrently from worker tasks.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: `[object-store] 1,234 / 5,000 (24%)`.
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{}", human_line(&event));
    }
}

fn human_line(event: &ProgressEvent) -> String {
    let pct = if event.total == 0 {
        100
    } else {
        event.n.saturating_mul(100) / event.total
    };
    format!(
        "[{}] {} / {} ({}%)",
        event.store,
        format_number(event.n),
        format_number(event.total),
        pct
    )
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let line = serde_json::json!({
            "event": "progress",
            "store": event.store,
            "n": event.n,
            "total": event.total
        });
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{}", line);
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Digits grouped in threes: `1234567` -> `1,234,567`.
fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let head = digits.len() % 3;
    let mut groups: Vec<&str> = Vec::new();
    if head > 0 {
        groups.push(&digits[..head]);
    }
    groups.extend(
        digits.as_bytes()[head..]
            .chunks(3)
            .filter_map(|c| std::str::from_utf8(c).ok()),
    );
    groups.join(",")
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    #[value(alias = "none")]
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if std::io::stderr().is_terminal() {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Arc<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Arc::new(NoProgress),
            ProgressMode::Human => Arc::new(StderrProgress),
            ProgressMode::Json => Arc::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number_groups_thousands() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(12_345), "12,345");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn test_human_line() {
        let event = ProgressEvent {
            store: StoreKind::ObjectStore,
            n: 1234,
            total: 5000,
        };
        assert_eq!(human_line(&event), "[object-store] 1,234 / 5,000 (24%)");

        let empty = ProgressEvent {
            store: StoreKind::VectorIndex,
            n: 0,
            total: 0,
        };
        assert_eq!(human_line(&empty), "[vector-index] 0 / 0 (100%)");
    }
}
