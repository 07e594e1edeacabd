//! Window fetch orchestration: trailing-window computation, the replay
//! throttle, the single-in-flight overlap guard, and the query batch itself.
//!
//! The guard is a synchronous state machine consulted by the engine loop.
//! Every fetch attempt gets a monotonically increasing cycle id; a completion
//! whose id is no longer the latest wanted one is a ghost and must be
//! discarded instead of published.

use anyhow::Result;

use crate::kpi::{GateAssignment, GateOverlay, KpiService, MetricRows, PieSlice, ScatterPoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub from_ms: i64,
    pub to_ms: i64,
}

impl Window {
    pub fn trailing(position_ms: i64, window_ms: i64) -> Self {
        Self { from_ms: position_ms - window_ms, to_ms: position_ms }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchDecision {
    /// No cycle in flight and throttle satisfied: run this one.
    Start { cycle_id: u64 },
    /// Simulated-time delta since the last executed fetch is too small.
    Throttled,
    /// A cycle is in flight; this cursor is remembered last-write-wins.
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Latest cycle finished with no newer cursor waiting: publish.
    Commit,
    /// Superseded while in flight: drop the result, optionally start the
    /// deferred cursor's cycle right away.
    Ghost { resume: Option<(u64, i64)> },
}

#[derive(Debug)]
pub struct CycleGuard {
    /// 0 disables the throttle (live mode).
    throttle_ms: i64,
    next_cycle_id: u64,
    in_flight: Option<u64>,
    pending_cursor: Option<i64>,
    last_executed_cursor: Option<i64>,
}

impl CycleGuard {
    pub fn new(throttle_ms: i64) -> Self {
        Self {
            throttle_ms,
            next_cycle_id: 0,
            in_flight: None,
            pending_cursor: None,
            last_executed_cursor: None,
        }
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// A cursor change arrived.
    pub fn on_cursor(&mut self, cursor_ms: i64) -> FetchDecision {
        if self.in_flight.is_some() {
            self.pending_cursor = Some(cursor_ms);
            return FetchDecision::Deferred;
        }
        if self.throttled(cursor_ms) {
            return FetchDecision::Throttled;
        }
        FetchDecision::Start { cycle_id: self.start(cursor_ms) }
    }

    /// The in-flight cycle finished (success or failure; the guard only
    /// tracks occupancy; the engine decides what a failed commit means).
    pub fn on_complete(&mut self, cycle_id: u64) -> Completion {
        debug_assert_eq!(self.in_flight, Some(cycle_id));
        self.in_flight = None;
        match self.pending_cursor.take() {
            None => Completion::Commit,
            Some(cursor_ms) => {
                let resume = if self.throttled(cursor_ms) {
                    None
                } else {
                    Some((self.start(cursor_ms), cursor_ms))
                };
                Completion::Ghost { resume }
            }
        }
    }

    fn start(&mut self, cursor_ms: i64) -> u64 {
        self.next_cycle_id += 1;
        self.in_flight = Some(self.next_cycle_id);
        self.last_executed_cursor = Some(cursor_ms);
        self.next_cycle_id
    }

    /// Skip only for small forward deltas; a backwards jump (scrub or replay
    /// wrap-around) always executes.
    fn throttled(&self, cursor_ms: i64) -> bool {
        if self.throttle_ms <= 0 {
            return false;
        }
        match self.last_executed_cursor {
            Some(last) => cursor_ms >= last && cursor_ms - last < self.throttle_ms,
            None => false,
        }
    }
}

/// Raw payload of one fetch cycle, before normalization.
#[derive(Debug, Clone)]
pub struct KpiBatch {
    pub window: Window,
    pub assignment: Vec<GateAssignment>,
    pub rows: MetricRows,
    pub scatter: Vec<ScatterPoint>,
    pub pie: Vec<PieSlice>,
    pub overlay: Vec<GateOverlay>,
}

/// Issue the five independent queries concurrently and wait for all of them.
/// Any single failure fails the whole batch; the caller leaves the previous
/// snapshot standing.
pub async fn run_batch(
    service: &dyn KpiService,
    window: Window,
    bucket_ms: i64,
    overlay_lookback_secs: i64,
) -> Result<KpiBatch> {
    let (assignment, rows, scatter, pie, overlay) = tokio::join!(
        service.assignments_at(window.to_ms),
        service.windowed_metrics(window.from_ms, window.to_ms, bucket_ms),
        service.scatter_weights(window.from_ms, window.to_ms),
        service.pie_breakdown(window.from_ms, window.to_ms),
        service.gate_overlay(window.to_ms, overlay_lookback_secs),
    );
    Ok(KpiBatch {
        window,
        assignment: assignment?,
        rows: rows?,
        scatter: scatter?,
        pie: pie?,
        overlay: overlay?,
    })
}
