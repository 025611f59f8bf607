// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Join-Wait Configuration
//!
//! Typed configuration for the correlation engine. Accepts the host
//! runtime's camelCase key names via serde, plus a flat string-properties
//! factory for programmatic construction.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let config = JoinWaitConfig::parse(serde_json::json!({
//!     "paths": ["path_1", "path_2", "path_3"],
//!     "pathsToExpire": ["cancel"],
//!     "pathTopic": "paths",
//!     "timeout": 15, "timeoutUnits": 1000,
//! }))?;
//! ```

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::core::error::{JoinWaitError, JoinWaitResult};
use crate::core::pattern;

fn default_timeout() -> u64 {
    15000
}

fn default_units() -> u64 {
    1
}

fn default_true() -> bool {
    true
}

fn default_path_topic() -> String {
    "topic".to_string()
}

/// Configuration surface of the join-wait engine
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JoinWaitConfig {
    /// Required wait-path list; duplicates express required multiplicities
    pub paths: Vec<String>,

    /// Expire-path list; any match flushes the whole group. No duplicates.
    #[serde(default)]
    pub paths_to_expire: Vec<String>,

    /// Enforce the wait-path sequence instead of multiset matching
    #[serde(default)]
    pub exact_order: bool,

    /// Timeout value, multiplied by `timeout_units` to get milliseconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Unit multiplier for `timeout` (1 = ms, 1000 = s, ...)
    #[serde(default = "default_units")]
    pub timeout_units: u64,

    /// Representative-event selection: oldest when true, newest otherwise
    #[serde(default = "default_true")]
    pub first_msg: bool,

    /// Rewrite each path key to the event's payload value at ingestion
    #[serde(default)]
    pub map_payload: bool,

    /// Treat wait/expire entries as regular expressions
    #[serde(default)]
    pub use_regex: bool,

    /// Warn when an event carries keys matching neither spec
    #[serde(default)]
    pub warn_unmatched: bool,

    /// Ignore the per-event force-complete marker
    #[serde(default)]
    pub disable_complete: bool,

    /// Property path evaluated for the correlation key; placeholder key
    /// when absent
    #[serde(default)]
    pub correlation_topic: Option<String>,

    /// Event field holding the per-event path set
    #[serde(default = "default_path_topic")]
    pub path_topic: String,
}

impl JoinWaitConfig {
    /// Minimal configuration: a wait list, everything else defaulted
    pub fn with_paths(paths: Vec<String>) -> Self {
        Self {
            paths,
            paths_to_expire: Vec::new(),
            exact_order: false,
            timeout: default_timeout(),
            timeout_units: default_units(),
            first_msg: true,
            map_payload: false,
            use_regex: false,
            warn_unmatched: false,
            disable_complete: false,
            correlation_topic: None,
            path_topic: default_path_topic(),
        }
    }

    /// Deserialize and validate a JSON configuration object
    pub fn parse(value: Value) -> JoinWaitResult<Self> {
        let config: Self = serde_json::from_value(value)
            .map_err(|e| JoinWaitError::configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Create a configuration from flat string properties.
    ///
    /// List-valued properties (`paths`, `paths.to-expire`) are JSON arrays;
    /// boolean properties accept `"true"`/`"false"`.
    pub fn from_properties(properties: &HashMap<String, String>) -> JoinWaitResult<Self> {
        let paths = parse_string_list(
            properties
                .get("paths")
                .ok_or_else(|| JoinWaitError::configuration("Missing required property: paths"))?,
            "paths",
        )?;
        let mut config = Self::with_paths(paths);

        if let Some(raw) = properties.get("paths.to-expire") {
            config.paths_to_expire = parse_string_list(raw, "paths.to-expire")?;
        }
        if let Some(raw) = properties.get("timeout") {
            config.timeout = parse_number(raw, "timeout")?;
        }
        if let Some(raw) = properties.get("timeout.units") {
            config.timeout_units = parse_number(raw, "timeout.units")?;
        }
        config.exact_order = parse_flag(properties, "exact-order", config.exact_order);
        config.first_msg = parse_flag(properties, "first-msg", config.first_msg);
        config.map_payload = parse_flag(properties, "map-payload", config.map_payload);
        config.use_regex = parse_flag(properties, "use-regex", config.use_regex);
        config.warn_unmatched = parse_flag(properties, "warn-unmatched", config.warn_unmatched);
        config.disable_complete =
            parse_flag(properties, "disable-complete", config.disable_complete);
        if let Some(topic) = properties.get("correlation.topic") {
            config.correlation_topic = Some(topic.clone());
        }
        if let Some(topic) = properties.get("path.topic") {
            config.path_topic = topic.clone();
        }

        config.validate()?;
        Ok(config)
    }

    /// Load-time validation: non-empty wait list, duplicate-free expire
    /// list, and (in regex mode) syntactically valid patterns.
    pub fn validate(&self) -> JoinWaitResult<()> {
        if self.paths.is_empty() {
            return Err(JoinWaitError::configuration(
                "pathsToWait must be a non-empty array",
            ));
        }
        pattern::validate_no_duplicates(&self.paths_to_expire)?;
        if self.use_regex {
            pattern::compile(&self.paths, true)?;
            pattern::compile(&self.paths_to_expire, true)?;
        }
        if self.path_topic.is_empty() {
            return Err(JoinWaitError::configuration("pathTopic must not be empty"));
        }
        Ok(())
    }

    /// Effective per-item timeout
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout.saturating_mul(self.timeout_units))
    }
}

fn parse_string_list(raw: &str, key: &str) -> JoinWaitResult<Vec<String>> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| JoinWaitError::configuration(format!("Invalid {key} value: {e}")))?;
    match value {
        Value::Array(entries) => entries
            .into_iter()
            .map(|v| match v {
                Value::String(s) => Ok(s),
                other => Err(JoinWaitError::configuration(format!(
                    "{key} entries must be strings, found {other}"
                ))),
            })
            .collect(),
        other => Err(JoinWaitError::configuration(format!(
            "{key} must be a JSON array, found {other}"
        ))),
    }
}

fn parse_number(raw: &str, key: &str) -> JoinWaitResult<u64> {
    raw.parse::<u64>()
        .map_err(|e| JoinWaitError::configuration(format!("Invalid {key} value: {e}")))
}

fn parse_flag(properties: &HashMap<String, String>, key: &str, default: bool) -> bool {
    properties
        .get(key)
        .map(|v| v == "true")
        .unwrap_or(default)
}
