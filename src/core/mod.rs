// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core modules of the join-wait correlation engine.

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod group;
pub mod matcher;
pub mod pattern;
pub mod scheduler;

pub use error::{JoinWaitError, JoinWaitResult};
