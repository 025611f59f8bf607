// SPDX-License-Identifier: MIT OR Apache-2.0

//! # JoinWait Rust
//!
//! Event correlation engine implementing the join/wait pattern: events that
//! share a correlation key are queued until a configured set of required
//! paths has been observed (in any order or in strict order, with
//! multiplicities), then merged into a single output event. Items that
//! cannot contribute to completion within the timeout, or that match an
//! expire pattern, are evicted to a secondary output instead.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use crossbeam_channel::unbounded;
//! use joinwait_rust::core::config::JoinWaitConfig;
//! use joinwait_rust::core::engine::JoinWaitEngine;
//!
//! let config = JoinWaitConfig::parse(serde_json::json!({
//!     "paths": ["path_1", "path_2", "path_3"],
//!     "pathTopic": "paths",
//!     "timeout": 15000,
//! }))?;
//!
//! let (primary_tx, primary_rx) = unbounded();
//! let (secondary_tx, secondary_rx) = unbounded();
//! let engine = JoinWaitEngine::new(config, primary_tx, secondary_tx)?;
//!
//! engine.process(serde_json::json!({ "paths": "path_1", "payload": 1 }).into())?;
//! ```

pub mod core;
