//! Session wiring: one event loop serializing the replay tick, inbound
//! pushes, and fetch completions into cursor changes and snapshot publishes.
//!
//! The fetch batch is the only suspension point and runs on a spawned task;
//! everything else is a synchronous transform. The color allocator needs no
//! locking because commits cannot interleave while the `CycleGuard` holds
//! the single in-flight slot.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration};

use crate::config::{Config, EngineMode};
use crate::cursor::CursorController;
use crate::downsample::downsample;
use crate::feed::GatePush;
use crate::kpi::{active_recipes, GateOverlay, KpiService};
use crate::logging::{json_log, log, obj, v_int, v_num, v_str, Level};
use crate::normalize::normalize;
use crate::orchestrator::{run_batch, Completion, CycleGuard, FetchDecision, KpiBatch, Window};
use crate::palette::ColorAllocator;
use crate::snapshot::{EngineSnapshot, Status};

struct CycleOutcome {
    cycle_id: u64,
    result: Result<KpiBatch>,
}

pub struct Engine {
    cfg: Config,
    service: Arc<dyn KpiService>,
    allocator: ColorAllocator,
    snapshot_tx: watch::Sender<EngineSnapshot>,
}

impl Engine {
    pub fn new(
        cfg: Config,
        service: Arc<dyn KpiService>,
    ) -> (Self, watch::Receiver<EngineSnapshot>) {
        let (snapshot_tx, snapshot_rx) = watch::channel(EngineSnapshot::not_ready());
        let engine = Self { cfg, service, allocator: ColorAllocator::new(), snapshot_tx };
        (engine, snapshot_rx)
    }

    /// Run until `shutdown` flips or, in live mode, the push channel closes
    /// with no other input source.
    pub async fn run(
        mut self,
        mut push_rx: mpsc::Receiver<GatePush>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut cursor = match self.cfg.mode {
            EngineMode::Replay => {
                let (start_ms, end_ms) = match self.service.dataset_bounds().await {
                    Ok(bounds) => bounds,
                    Err(err) => {
                        // Distinct not-ready state; no timer starts.
                        self.snapshot_tx.send_replace(EngineSnapshot::not_ready());
                        log(
                            Level::Error,
                            "system",
                            obj(&[
                                ("event", v_str("bounds_resolution_failed")),
                                ("error", v_str(&err.to_string())),
                            ]),
                        );
                        return Err(err).context("resolving replay dataset bounds");
                    }
                };
                json_log(
                    "cursor",
                    obj(&[
                        ("event", v_str("bounds_resolved")),
                        ("start_ms", v_int(start_ms)),
                        ("end_ms", v_int(end_ms)),
                    ]),
                );
                CursorController::replay(start_ms, end_ms)
            }
            EngineMode::Live => CursorController::live(),
        };

        self.snapshot_tx.send_replace(EngineSnapshot::pending(cursor.mode()));

        let is_replay = self.cfg.mode == EngineMode::Replay;
        let mut guard = CycleGuard::new(if is_replay { self.cfg.fetch_min_delta_ms } else { 0 });
        let (outcome_tx, mut outcome_rx) = mpsc::channel::<CycleOutcome>(4);
        let mut tick = interval(Duration::from_millis(self.cfg.tick_ms));
        let advance_ms = self.cfg.replay_advance_ms();
        let mut push_open = true;

        // Replay shows the first window immediately instead of waiting a tick.
        if is_replay {
            self.on_cursor(&mut guard, cursor.position_ms(), &outcome_tx);
        }

        loop {
            tokio::select! {
                _ = tick.tick(), if is_replay => {
                    cursor.tick(advance_ms);
                    self.on_cursor(&mut guard, cursor.position_ms(), &outcome_tx);
                }
                maybe_push = push_rx.recv(), if push_open => {
                    match maybe_push {
                        Some(push) => {
                            cursor.set_position(push.ts_ms);
                            self.apply_overlay(&push);
                            self.on_cursor(&mut guard, cursor.position_ms(), &outcome_tx);
                        }
                        None => {
                            push_open = false;
                            json_log("live", obj(&[("event", v_str("push_channel_closed"))]));
                        }
                    }
                }
                Some(outcome) = outcome_rx.recv() => {
                    self.on_outcome(&mut guard, outcome, &cursor, &outcome_tx);
                }
                _ = shutdown.changed() => {
                    break;
                }
            }
        }

        json_log("system", obj(&[("event", v_str("engine_stopped"))]));
        Ok(())
    }

    fn on_cursor(
        &mut self,
        guard: &mut CycleGuard,
        position_ms: i64,
        outcome_tx: &mpsc::Sender<CycleOutcome>,
    ) {
        match guard.on_cursor(position_ms) {
            FetchDecision::Start { cycle_id } => {
                self.spawn_fetch(cycle_id, position_ms, outcome_tx);
            }
            FetchDecision::Throttled => {
                log(
                    Level::Debug,
                    "fetch",
                    obj(&[("event", v_str("throttled")), ("cursor_ms", v_int(position_ms))]),
                );
            }
            FetchDecision::Deferred => {
                log(
                    Level::Debug,
                    "fetch",
                    obj(&[("event", v_str("deferred")), ("cursor_ms", v_int(position_ms))]),
                );
            }
        }
    }

    fn spawn_fetch(
        &self,
        cycle_id: u64,
        position_ms: i64,
        outcome_tx: &mpsc::Sender<CycleOutcome>,
    ) {
        let window = Window::trailing(position_ms, self.cfg.window_ms);
        let service = Arc::clone(&self.service);
        let tx = outcome_tx.clone();
        let bucket_ms = self.cfg.bucket_ms;
        let lookback = self.cfg.overlay_lookback_secs;
        tokio::spawn(async move {
            let result = run_batch(service.as_ref(), window, bucket_ms, lookback).await;
            let _ = tx.send(CycleOutcome { cycle_id, result }).await;
        });
    }

    fn on_outcome(
        &mut self,
        guard: &mut CycleGuard,
        outcome: CycleOutcome,
        cursor: &CursorController,
        outcome_tx: &mpsc::Sender<CycleOutcome>,
    ) {
        match guard.on_complete(outcome.cycle_id) {
            Completion::Ghost { resume } => {
                log(
                    Level::Debug,
                    "fetch",
                    obj(&[
                        ("event", v_str("ghost_discarded")),
                        ("cycle_id", v_int(outcome.cycle_id as i64)),
                    ]),
                );
                if let Some((cycle_id, cursor_ms)) = resume {
                    self.spawn_fetch(cycle_id, cursor_ms, outcome_tx);
                }
            }
            Completion::Commit => match outcome.result {
                Ok(batch) => self.commit(batch, cursor),
                Err(err) => {
                    // Prior snapshot stands; the next cursor change retries.
                    log(
                        Level::Error,
                        "fetch",
                        obj(&[
                            ("event", v_str("batch_failed")),
                            ("cycle_id", v_int(outcome.cycle_id as i64)),
                            ("error", v_str(&err.to_string())),
                        ]),
                    );
                }
            },
        }
    }

    fn commit(&mut self, batch: KpiBatch, cursor: &CursorController) {
        let active = active_recipes(&batch.assignment);
        let colors = self.allocator.assign(&active);
        let normalized = normalize(&batch.rows, &batch.assignment, &batch.pie);
        let scatter = downsample(&batch.scatter, self.cfg.scatter_max_points);

        let mut snapshot = EngineSnapshot {
            status: Status::Ready,
            cursor_ms: batch.window.to_ms,
            mode: cursor.mode(),
            colors: Default::default(),
            total_color: None,
            assignment: batch.assignment,
            overlay: self.filter_overlay(batch.overlay),
            normalized,
            scatter,
        };
        snapshot.apply_colors(colors);

        json_log(
            "snapshot",
            obj(&[
                ("event", v_str("committed")),
                ("cursor_ms", v_int(snapshot.cursor_ms)),
                ("recipes", v_num(active.len() as f64)),
                ("timeline_len", v_num(snapshot.normalized.timeline.len() as f64)),
                ("scatter_len", v_num(snapshot.scatter.len() as f64)),
            ]),
        );
        self.snapshot_tx.send_replace(snapshot);
    }

    /// Fast-path live update: replace only the overlay and cursor without
    /// waiting for the windowed cycle.
    fn apply_overlay(&mut self, push: &GatePush) {
        let mut snapshot = self.snapshot_tx.borrow().clone();
        snapshot.cursor_ms = push.ts_ms;
        snapshot.overlay = self.filter_overlay(push.overlay.clone());
        self.snapshot_tx.send_replace(snapshot);
    }

    /// Overlay rows name physical gates; rows for gates beyond the
    /// configured line never reach a snapshot.
    fn filter_overlay(&self, overlay: Vec<GateOverlay>) -> Vec<GateOverlay> {
        overlay.into_iter().filter(|row| row.gate < self.cfg.gate_count).collect()
    }
}
