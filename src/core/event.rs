// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Event Model and Extraction Seams
//!
//! Events are JSON-shaped messages. The engine itself only reads three
//! things out of an event: the path set under the configured path-topic
//! field, the correlation key, and a handful of control fields
//! (`complete`, `pathsToWait`, `pathsToExpire`, `useRegex`). Everything
//! else is opaque payload carried through to the outputs untouched.
//!
//! Correlation-key extraction sits behind the [`KeyExtractor`] trait so a
//! host runtime can plug in its own expression evaluator; the built-in
//! [`PropertyKeyExtractor`] reads a dotted property path.

use serde_json::{Map, Value};

use crate::core::error::{JoinWaitError, JoinWaitResult};

/// Correlation key used when no key expression is configured
pub const PLACEHOLDER_KEY: &str = "_join-wait-node";

/// Marker field requesting force-completion of the event's group
pub const COMPLETE_FIELD: &str = "complete";

/// Mapping from observed path key to its associated value
pub type PathSet = Map<String, Value>;

/// A single message flowing through the engine.
///
/// Always a JSON object at the top level; non-object values are rejected at
/// the extraction seams rather than at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Event(Value);

impl Event {
    pub fn new(value: Value) -> Self {
        Event(value)
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Top-level field lookup
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.as_object().and_then(|obj| obj.get(field))
    }

    /// Set (or replace) a top-level field
    pub fn set(&mut self, field: &str, value: Value) {
        if let Some(obj) = self.0.as_object_mut() {
            obj.insert(field.to_string(), value);
        }
    }

    pub fn payload(&self) -> Option<&Value> {
        self.get("payload")
    }

    /// Presence of the force-complete marker field
    pub fn has_complete_signal(&self) -> bool {
        self.get(COMPLETE_FIELD).is_some()
    }

    /// Extract the path set from the configured path-topic field.
    ///
    /// A plain string is shorthand for a single-key mapping to `true`;
    /// an object is taken as-is. Anything else is an extraction error and
    /// the event is dropped without touching group state.
    pub fn path_set(&self, path_topic: &str) -> JoinWaitResult<PathSet> {
        match self.get(path_topic) {
            None | Some(Value::Null) => Err(JoinWaitError::extraction(format!(
                "\"msg.{path_topic}\" is undefined, must be msg.{path_topic}[\"path\"]=value"
            ))),
            Some(Value::String(path)) => {
                let mut set = PathSet::new();
                set.insert(path.clone(), Value::Bool(true));
                Ok(set)
            }
            Some(Value::Object(map)) => Ok(map.clone()),
            Some(_) => Err(JoinWaitError::extraction(format!(
                "\"msg.{path_topic}\" must be a string or an object, e.g., msg.{path_topic}[\"path\"] = value"
            ))),
        }
    }

    /// Per-event wait-list override, if present.
    ///
    /// Must be an array of strings; any other shape is a configuration
    /// error attributed to this event.
    pub fn paths_to_wait_override(&self) -> JoinWaitResult<Option<Vec<String>>> {
        self.string_list_override("pathsToWait")
    }

    /// Per-event expire-list override, if present
    pub fn paths_to_expire_override(&self) -> JoinWaitResult<Option<Vec<String>>> {
        self.string_list_override("pathsToExpire")
    }

    /// Per-event regex-mode override, if present
    pub fn use_regex_override(&self) -> Option<bool> {
        self.get("useRegex").map(|v| v == &Value::Bool(true))
    }

    fn string_list_override(&self, field: &str) -> JoinWaitResult<Option<Vec<String>>> {
        match self.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(entries)) => entries
                .iter()
                .map(|v| match v {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(JoinWaitError::configuration(format!(
                        "{field} entries must be strings, found {other}"
                    ))),
                })
                .collect::<JoinWaitResult<Vec<String>>>()
                .map(Some),
            Some(other) => Err(JoinWaitError::configuration(format!(
                "{field} must be undefined or an array, found {other}"
            ))),
        }
    }
}

impl From<Value> for Event {
    fn from(value: Value) -> Self {
        Event::new(value)
    }
}

/// Correlation-key extraction seam.
///
/// The engine computes the key once per event; a failure drops the event
/// with a reported error and no group mutation.
pub trait KeyExtractor: Send + Sync {
    fn correlation_key(&self, event: &Event) -> JoinWaitResult<String>;
}

/// Always returns the constant placeholder key
#[derive(Debug, Default)]
pub struct ConstantKeyExtractor;

impl KeyExtractor for ConstantKeyExtractor {
    fn correlation_key(&self, _event: &Event) -> JoinWaitResult<String> {
        Ok(PLACEHOLDER_KEY.to_string())
    }
}

/// Reads a dotted property path from the event (e.g. `"meta.request_id"`).
///
/// String values are used verbatim; numbers and booleans are stringified.
#[derive(Debug, Clone)]
pub struct PropertyKeyExtractor {
    property: String,
}

impl PropertyKeyExtractor {
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
        }
    }
}

impl KeyExtractor for PropertyKeyExtractor {
    fn correlation_key(&self, event: &Event) -> JoinWaitResult<String> {
        let mut current = event.as_value();
        for segment in self.property.split('.') {
            current = current.get(segment).ok_or_else(|| {
                JoinWaitError::extraction(format!(
                    "correlation property \"msg.{}\" is undefined",
                    self.property
                ))
            })?;
        }
        match current {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(JoinWaitError::extraction(format!(
                "correlation property \"msg.{}\" must be a scalar, found {other}",
                self.property
            ))),
        }
    }
}
