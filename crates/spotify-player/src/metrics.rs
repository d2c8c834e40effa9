//! Command counters
//!
//! - `spotify_player_commands_total` (counter): labels `operation`, `outcome`
//!
//! No recorder is installed here; without one these calls are no-ops.

/// Record a finished command with its outcome label (or `error`).
pub fn record_command(operation: &'static str, outcome: &'static str) {
    metrics::counter!("spotify_player_commands_total", "operation" => operation, "outcome" => outcome)
        .increment(1);
}
