//! The engine's read-only output contract for the rendering layer.
//!
//! A snapshot is replaced wholesale on every committed cycle and on every
//! live overlay push; consumers never observe a half-updated set of series.

use std::collections::HashMap;

use serde::Serialize;

use crate::cursor::Mode;
use crate::kpi::{GateAssignment, GateOverlay, ScatterPoint};
use crate::normalize::Normalized;
use crate::palette::ColorMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Replay bounds could not be resolved; nothing else is populated.
    NotReady,
    /// No cycle has committed yet.
    Pending,
    Ready,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub status: Status,
    pub cursor_ms: i64,
    pub mode: Mode,
    pub colors: HashMap<String, String>,
    pub total_color: Option<String>,
    pub assignment: Vec<GateAssignment>,
    pub overlay: Vec<GateOverlay>,
    pub normalized: Normalized,
    pub scatter: Vec<ScatterPoint>,
}

impl EngineSnapshot {
    pub fn not_ready() -> Self {
        Self::empty(Status::NotReady, Mode::Live)
    }

    pub fn pending(mode: Mode) -> Self {
        Self::empty(Status::Pending, mode)
    }

    fn empty(status: Status, mode: Mode) -> Self {
        Self {
            status,
            cursor_ms: 0,
            mode,
            colors: HashMap::new(),
            total_color: None,
            assignment: Vec::new(),
            overlay: Vec::new(),
            normalized: Normalized::default(),
            scatter: Vec::new(),
        }
    }

    pub fn apply_colors(&mut self, map: ColorMap) {
        self.colors = map.entities;
        self.total_color = map.total;
    }
}
