//! # Rastro-DB: Transactional Metadata Store for Experiment Tracking
//!
//! **Version**: 0.1.0
//!
//! Rastro-DB is an embedded, SQLite-backed store for ML experiment tracking
//! metadata: experiments, runs, metrics, params, and tags, with lifecycle
//! soft-deletion, append-only metric history alongside a maintained
//! latest-value view, and in-memory search with filtering, multi-key
//! ordering, and paginated results.
//!
//! ## Design Principles (Toyota Way Aligned)
//!
//! - **Jidoka**: every operation runs in exactly one `BEGIN IMMEDIATE`
//!   transaction; partial writes never become visible
//! - **Poka-Yoke safety**: lifecycle guards and write-once params stop
//!   invalid mutations before they reach storage
//! - **Genchi Genbutsu**: conflict reconciliation re-reads the actual row
//!   under the same transaction that saw the constraint fire
//! - **Heijunka**: short per-item transactions in batch logging keep write
//!   lock hold times level under concurrent run logging
//!
//! ## Example Usage
//!
//! ```rust
//! use rastro_db::entities::{Metric, Param, ViewType};
//! use rastro_db::SqliteStore;
//!
//! # fn main() -> rastro_db::Result<()> {
//! let store = SqliteStore::open_in_memory()?;
//!
//! let exp_id = store.create_experiment("churn-model", None)?;
//! let run = store.create_run(&exp_id, "ada", 1_700_000_000_000, vec![])?;
//!
//! store.log_param(&run.info.run_id, Param::new("lr", "0.001"))?;
//! store.log_metric(&run.info.run_id, Metric::new("loss", 0.42, 1_700_000_000_100, 0))?;
//!
//! let page = store.search_runs(
//!     &[&exp_id],
//!     Some("metrics.loss < 1.0"),
//!     ViewType::ActiveOnly,
//!     100,
//!     &["metrics.loss ASC"],
//!     None,
//! )?;
//! assert_eq!(page.runs.len(), 1);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod entities;
pub mod error;
pub mod schema;
pub mod search;
pub mod store;
pub mod validation;

mod session;

pub use error::{Error, Result};
pub use store::SqliteStore;
