//! Session-wide constants, resolved once from the environment at startup.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    Replay,
    Live,
}

#[derive(Clone)]
pub struct Config {
    pub mode: EngineMode,
    pub backend_base: String,
    pub push_ws_url: String,
    /// Trailing window length in milliseconds.
    pub window_ms: i64,
    /// Metric bucket granularity in milliseconds.
    pub bucket_ms: i64,
    /// Replay speed: minutes of dataset time per real second.
    pub replay_rate_min_per_sec: f64,
    /// Replay tick period in milliseconds of real time.
    pub tick_ms: u64,
    /// Minimum simulated-time delta between executed fetches (replay only).
    pub fetch_min_delta_ms: i64,
    /// Scatter point budget after downsampling.
    pub scatter_max_points: usize,
    /// Lookback for the per-gate overlay query, in seconds.
    pub overlay_lookback_secs: i64,
    pub gate_count: u32,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            mode: match std::env::var("MODE").as_deref() {
                Ok("live") => EngineMode::Live,
                _ => EngineMode::Replay,
            },
            backend_base: std::env::var("BACKEND_BASE")
                .unwrap_or_else(|_| "http://127.0.0.1:5001".to_string()),
            push_ws_url: std::env::var("PUSH_WS_URL")
                .unwrap_or_else(|_| "ws://127.0.0.1:5001/ws/gates".to_string()),
            window_ms: std::env::var("WINDOW_SECS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(600)
                * 1000,
            bucket_ms: std::env::var("BUCKET_SECS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60)
                * 1000,
            replay_rate_min_per_sec: std::env::var("REPLAY_RATE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1.0),
            tick_ms: std::env::var("TICK_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(1000),
            fetch_min_delta_ms: std::env::var("FETCH_MIN_DELTA_SECS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(30)
                * 1000,
            scatter_max_points: std::env::var("SCATTER_MAX_POINTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(400),
            overlay_lookback_secs: std::env::var("OVERLAY_LOOKBACK_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            gate_count: std::env::var("GATE_COUNT").ok().and_then(|v| v.parse().ok()).unwrap_or(8),
        }
    }

    /// Dataset milliseconds the cursor advances per replay tick.
    pub fn replay_advance_ms(&self) -> i64 {
        let per_sec = self.replay_rate_min_per_sec * 60_000.0;
        (per_sec * self.tick_ms as f64 / 1000.0) as i64
    }

    pub fn mode_str(&self) -> &'static str {
        match self.mode {
            EngineMode::Replay => "replay",
            EngineMode::Live => "live",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_advance_scales_with_rate() {
        let mut cfg = Config::from_env();
        cfg.replay_rate_min_per_sec = 2.0;
        cfg.tick_ms = 1000;
        // 2 minutes of dataset time per second, one tick per second
        assert_eq!(cfg.replay_advance_ms(), 120_000);

        cfg.tick_ms = 500;
        assert_eq!(cfg.replay_advance_ms(), 60_000);
    }
}
