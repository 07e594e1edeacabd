//! Owns the current time position of the dashboard.
//!
//! Replay and live are modeled as one tagged variant with two transition
//! sources (the replay tick and inbound push messages) funneling into a
//! single `set_position` entry point, so downstream consumers cannot tell a
//! scrub, a tick, and a push apart.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum Mode {
    Replay { start_ms: i64, end_ms: i64 },
    Live,
}

#[derive(Debug, Clone, Copy)]
pub struct CursorController {
    position_ms: i64,
    mode: Mode,
}

impl CursorController {
    /// Replay cursor; starts at the beginning of the dataset.
    pub fn replay(start_ms: i64, end_ms: i64) -> Self {
        Self { position_ms: start_ms, mode: Mode::Replay { start_ms, end_ms } }
    }

    /// Live cursor; position stays 0 until the first push arrives.
    pub fn live() -> Self {
        Self { position_ms: 0, mode: Mode::Live }
    }

    pub fn position_ms(&self) -> i64 {
        self.position_ms
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn bounds(&self) -> Option<(i64, i64)> {
        match self.mode {
            Mode::Replay { start_ms, end_ms } => Some((start_ms, end_ms)),
            Mode::Live => None,
        }
    }

    /// Move the cursor. Replay positions clamp to the dataset bounds; live
    /// positions are taken verbatim from the push timestamp.
    pub fn set_position(&mut self, ms: i64) {
        self.position_ms = match self.mode {
            Mode::Replay { start_ms, end_ms } => ms.clamp(start_ms, end_ms),
            Mode::Live => ms,
        };
    }

    /// Advance by one replay tick, wrapping past the end of the dataset back
    /// to the start. No-op in live mode.
    pub fn tick(&mut self, advance_ms: i64) {
        if let Mode::Replay { start_ms, end_ms } = self.mode {
            let next = self.position_ms + advance_ms;
            self.position_ms = if next > end_ms { start_ms } else { next };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_starts_at_dataset_start() {
        let c = CursorController::replay(1000, 9000);
        assert_eq!(c.position_ms(), 1000);
        assert_eq!(c.bounds(), Some((1000, 9000)));
    }

    #[test]
    fn test_tick_wraps_to_start() {
        let mut c = CursorController::replay(1000, 9000);
        c.set_position(8_500);
        c.tick(1000);
        assert_eq!(c.position_ms(), 1000);
    }

    #[test]
    fn test_loop_invariant_never_out_of_bounds() {
        let mut c = CursorController::replay(0, 10_000);
        for _ in 0..100 {
            c.tick(700);
            assert!(c.position_ms() >= 0 && c.position_ms() <= 10_000);
        }
    }

    #[test]
    fn test_replay_set_position_clamps() {
        let mut c = CursorController::replay(1000, 9000);
        c.set_position(50);
        assert_eq!(c.position_ms(), 1000);
        c.set_position(99_999);
        assert_eq!(c.position_ms(), 9000);
    }

    #[test]
    fn test_live_takes_push_timestamp_verbatim() {
        let mut c = CursorController::live();
        c.set_position(1_735_689_600_000);
        assert_eq!(c.position_ms(), 1_735_689_600_000);
        // tick is a replay-only source
        c.tick(1000);
        assert_eq!(c.position_ms(), 1_735_689_600_000);
    }
}
