use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, watch};

use batchline::config::{Config, EngineMode};
use batchline::engine::Engine;
use batchline::feed;
use batchline::kpi::HttpKpiService;
use batchline::logging::{json_log, log, obj, v_num, v_str, Level};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    json_log(
        "system",
        obj(&[
            ("event", v_str("startup")),
            ("mode", v_str(cfg.mode_str())),
            ("backend", v_str(&cfg.backend_base)),
            ("window_ms", v_num(cfg.window_ms as f64)),
            ("bucket_ms", v_num(cfg.bucket_ms as f64)),
        ]),
    );

    let service = Arc::new(HttpKpiService::new(cfg.backend_base.clone()));
    let (engine, mut snapshot_rx) = Engine::new(cfg.clone(), service);

    let (push_tx, push_rx) = mpsc::channel(256);
    let listener = match cfg.mode {
        EngineMode::Live => {
            let ws_url = cfg.push_ws_url.clone();
            Some(tokio::spawn(async move {
                // Surface a dead feed; the engine only sees the channel close.
                if let Err(err) = feed::start_ws_listener(ws_url, push_tx).await {
                    log(
                        Level::Error,
                        "live",
                        obj(&[
                            ("event", v_str("push_listener_failed")),
                            ("error", v_str(&err.to_string())),
                        ]),
                    );
                }
            }))
        }
        EngineMode::Replay => None,
    };

    // Keep a subscriber alive so the rendering layer can attach at any time.
    tokio::spawn(async move {
        while snapshot_rx.changed().await.is_ok() {
            let (status, cursor_ms) = {
                let snap = snapshot_rx.borrow_and_update();
                (format!("{:?}", snap.status).to_lowercase(), snap.cursor_ms)
            };
            json_log(
                "snapshot",
                obj(&[
                    ("event", v_str("published")),
                    ("status", v_str(&status)),
                    ("cursor_ms", v_num(cursor_ms as f64)),
                ]),
            );
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_tx.send(true);
    });

    let result = engine.run(push_rx, shutdown_rx).await;

    if let Some(handle) = listener {
        handle.abort();
    }
    json_log("system", obj(&[("event", v_str("shutdown"))]));
    result
}
