//! Background Jobs for the billvault API
//!
//! - `archival`: runs the archival migrator on a fixed schedule
//! - `hot_expiry`: physically removes retired hot copies whose expiry passed
//!
//! # Usage
//!
//! ```ignore
//! use billvault_api::jobs::{archival_task, hot_expiry_task, ArchivalJobConfig};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! tokio::spawn(archival_task(migrator, ArchivalJobConfig::default(), shutdown_rx.clone()));
//! tokio::spawn(hot_expiry_task(hot, Duration::from_secs(60), shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod archival;
pub mod hot_expiry;

pub use archival::{archival_task, ArchivalJobConfig, ArchivalJobMetrics, ArchivalJobSnapshot};
pub use hot_expiry::{hot_expiry_task, HotExpiryMetrics, HotExpirySnapshot};
