//! In-page routines. Each file is a single function expression whose first
//! line is a marker comment naming it.

use serde_json::Value;
use std::time::Duration;

pub const SNAPSHOT: &str = include_str!("snapshot.js");
pub const SCROLL: &str = include_str!("scroll.js");
pub const SESSION_PROBE: &str = include_str!("session_probe.js");

pub const SNAPSHOT_MARKER: &str = "harvester:snapshot";
pub const SCROLL_MARKER: &str = "harvester:scroll";
pub const SESSION_MARKER: &str = "harvester:session";

/// Builds an expression that calls `source` with JSON-encoded arguments.
pub fn invoke(source: &str, args: &[Value]) -> String {
    let args = args
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("({})({})", source.trim().trim_end_matches(';'), args)
}

pub fn snapshot() -> String {
    invoke(SNAPSHOT, &[])
}

pub fn scroll(settle: Duration) -> String {
    invoke(SCROLL, &[Value::from(settle.as_millis() as u64)])
}

pub fn session_probe() -> String {
    invoke(SESSION_PROBE, &[])
}
