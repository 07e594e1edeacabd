//! Live update channel: the push transport feeding cursor advances and the
//! fast-path gate overlay.
//!
//! The engine core only ever sees parsed `GatePush` values on an mpsc
//! channel, so it can be driven by tests without a socket. The websocket
//! reader below is the production transport; it subscribes once per session
//! and stops when the receiving side goes away.

use anyhow::{Context, Result};
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::kpi::GateOverlay;
use crate::logging::{json_log, log, obj, v_int, v_str, Level};

/// One inbound push message, already validated.
#[derive(Debug, Clone, PartialEq)]
pub struct GatePush {
    pub ts_ms: i64,
    pub overlay: Vec<GateOverlay>,
}

#[derive(Debug, Deserialize)]
struct RawPush {
    timestamp: Option<i64>,
    overlay: Option<Vec<RawOverlayRow>>,
}

#[derive(Debug, Deserialize)]
struct RawOverlayRow {
    gate: u32,
    pieces: u64,
    grams: f64,
}

/// Validate one transport frame. `None` means the frame is malformed and
/// must not touch cursor state; the caller logs and drops it.
pub fn parse_push(text: &str) -> Option<GatePush> {
    let raw: RawPush = serde_json::from_str(text).ok()?;
    let ts_ms = raw.timestamp?;
    let overlay = raw
        .overlay?
        .into_iter()
        .map(|r| GateOverlay { gate: r.gate, pieces: r.pieces, grams: r.grams })
        .collect();
    Some(GatePush { ts_ms, overlay })
}

/// Subscribe to the backend's gate push stream and forward parsed messages.
/// Returns when the stream closes or the engine drops its receiver.
pub async fn start_ws_listener(ws_url: String, sender: mpsc::Sender<GatePush>) -> Result<()> {
    let url = url::Url::parse(&ws_url).context("invalid push transport url")?;
    let (ws, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
    let (_write, mut read) = ws.split();
    json_log("live", obj(&[("event", v_str("subscribed")), ("url", v_str(&ws_url))]));

    while let Some(msg) = read.next().await {
        let Ok(msg) = msg else { continue };
        let Ok(text) = msg.into_text() else { continue };
        match parse_push(&text) {
            Some(push) => {
                if sender.send(push).await.is_err() {
                    // Engine has torn down; stop delivering callbacks.
                    break;
                }
            }
            None => {
                log(
                    Level::Warn,
                    "live",
                    obj(&[
                        ("event", v_str("malformed_push")),
                        ("bytes", v_int(text.len() as i64)),
                    ]),
                );
            }
        }
    }
    json_log("live", obj(&[("event", v_str("unsubscribed"))]));
    Ok(())
}
