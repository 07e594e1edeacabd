//! Data orchestration engine for the batching-line dashboard.
//!
//! The engine reconciles two mutually exclusive temporal modes (historical
//! replay and live push) into a single cursor, fetches the KPI window batch
//! without overlap or flooding, keeps per-recipe colors stable, and publishes
//! an atomic snapshot for the rendering layer.

pub mod config;
pub mod cursor;
pub mod downsample;
pub mod engine;
pub mod feed;
pub mod kpi;
pub mod logging;
pub mod normalize;
pub mod orchestrator;
pub mod palette;
pub mod snapshot;
