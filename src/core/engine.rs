// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Join-Wait Engine
//!
//! Dispatch and emission logic. Every accepted event is appended to its
//! correlation group and then, in order: expire-pattern flush, time-based
//! sweep, completion/redundancy matching, merged primary emission or queue
//! trim, and finally the force-complete signal. All of that happens as one
//! atomic step under the group lock; the group's own timer firing is the
//! only other party that can mutate the queue, serialized by the same lock.
//!
//! Outputs are two channels: **primary** carries one merged event per
//! completed group, **secondary** carries one event per evicted item.

use crossbeam_channel::Sender;
use log::{debug, error, warn};
use serde_json::Value;
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::config::JoinWaitConfig;
use crate::core::error::{JoinWaitError, JoinWaitResult};
use crate::core::event::{
    ConstantKeyExtractor, Event, KeyExtractor, PathSet, PropertyKeyExtractor,
};
use crate::core::group::{CorrelationGroup, GroupRegistry, ReceivedItem};
use crate::core::matcher::{self, AnyOrderOutcome, ExactOrderOutcome};
use crate::core::pattern::{self, PathPattern};
use crate::core::scheduler::ExpiryTimer;

/// Whether evicted items are reported on the secondary output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Report {
    Secondary,
    Silent,
}

/// Event-correlation engine implementing the join/wait pattern
pub struct JoinWaitEngine {
    shared: Arc<EngineShared>,
}

struct EngineShared {
    config: JoinWaitConfig,
    wait_spec: Vec<PathPattern>,
    expire_spec: Vec<PathPattern>,
    registry: GroupRegistry,
    key_extractor: Box<dyn KeyExtractor>,
    primary: Sender<Event>,
    secondary: Sender<Event>,
    shutdown: AtomicBool,
}

impl JoinWaitEngine {
    /// Create an engine with the configuration's own correlation-key
    /// evaluation: the configured property path, or the constant
    /// placeholder key when none is set.
    pub fn new(
        config: JoinWaitConfig,
        primary: Sender<Event>,
        secondary: Sender<Event>,
    ) -> JoinWaitResult<Self> {
        let extractor: Box<dyn KeyExtractor> = match &config.correlation_topic {
            Some(property) => Box::new(PropertyKeyExtractor::new(property.clone())),
            None => Box::new(ConstantKeyExtractor),
        };
        Self::with_key_extractor(config, primary, secondary, extractor)
    }

    /// Create an engine with a caller-supplied correlation-key evaluator
    pub fn with_key_extractor(
        config: JoinWaitConfig,
        primary: Sender<Event>,
        secondary: Sender<Event>,
        key_extractor: Box<dyn KeyExtractor>,
    ) -> JoinWaitResult<Self> {
        config.validate()?;
        let wait_spec = pattern::compile(&config.paths, config.use_regex)?;
        let expire_spec = pattern::compile(&config.paths_to_expire, config.use_regex)?;

        Ok(Self {
            shared: Arc::new(EngineShared {
                config,
                wait_spec,
                expire_spec,
                registry: GroupRegistry::new(),
                key_extractor,
                primary,
                secondary,
                shutdown: AtomicBool::new(false),
            }),
        })
    }

    /// Feed one event through the correlation pipeline.
    ///
    /// Errors are fatal to this event only: it is dropped, the condition is
    /// reported, and no group state is touched.
    pub fn process(&self, event: impl Into<Event>) -> JoinWaitResult<()> {
        let event = event.into();
        let result = self.shared.dispatch(&event);
        if let Err(e) = &result {
            error!("join-wait dropped event {}: {}", event.as_value(), e);
        }
        result
    }

    /// Number of live correlation groups
    pub fn active_groups(&self) -> usize {
        self.shared.registry.len()
    }

    /// Cancel every outstanding timer and release every group without
    /// emitting further events. Idempotent.
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }
}

impl Drop for JoinWaitEngine {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

impl EngineShared {
    fn dispatch(self: &Arc<Self>, event: &Event) -> JoinWaitResult<()> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Ok(());
        }

        let path_set = event.path_set(&self.config.path_topic)?;

        // Per-event overrides replace the static configuration for this
        // call only, validated with the same rules.
        let use_regex = event.use_regex_override().unwrap_or(self.config.use_regex);
        let wait_override = event.paths_to_wait_override()?;
        let expire_override = event.paths_to_expire_override()?;
        if let Some(list) = &wait_override {
            if list.is_empty() {
                return Err(JoinWaitError::configuration(
                    "pathsToWait must be a non-empty array",
                ));
            }
        }
        if let Some(list) = &expire_override {
            pattern::validate_no_duplicates(list)?;
        }

        let overridden = use_regex != self.config.use_regex
            || wait_override.is_some()
            || expire_override.is_some();
        let (wait_spec, expire_spec): (Cow<'_, [PathPattern]>, Cow<'_, [PathPattern]>) =
            if overridden {
                let wait = pattern::compile(
                    wait_override.as_deref().unwrap_or(&self.config.paths),
                    use_regex,
                )?;
                let expire = pattern::compile(
                    expire_override
                        .as_deref()
                        .unwrap_or(&self.config.paths_to_expire),
                    use_regex,
                )?;
                (Cow::Owned(wait), Cow::Owned(expire))
            } else {
                (
                    Cow::Borrowed(self.wait_spec.as_slice()),
                    Cow::Borrowed(self.expire_spec.as_slice()),
                )
            };

        let path_keys: Vec<String> = path_set.keys().cloned().collect();
        let has_expire = pattern::any_match(&path_keys, &expire_spec);

        if !has_expire {
            let mut matched_any = false;
            for key in &path_keys {
                if wait_spec.iter().any(|p| p.matches(key)) {
                    matched_any = true;
                } else if self.config.warn_unmatched {
                    warn!(
                        "join-wait msg.{}[\"{}\"] doesn't exist in pathsToWait or pathsToExpire",
                        self.config.path_topic, key
                    );
                }
            }
            if !matched_any {
                debug!(
                    "join-wait event matched no wait or expire path, dropping: {}",
                    event.as_value()
                );
                return Ok(());
            }
        }

        let key = self.key_extractor.correlation_key(event)?;

        // mapPayload is applied once, at ingestion, never retroactively
        let path_set: PathSet = if self.config.map_payload {
            let payload = event.payload().cloned().unwrap_or(Value::Null);
            path_set
                .keys()
                .map(|k| (k.clone(), payload.clone()))
                .collect()
        } else {
            path_set
        };

        let force_complete = !self.config.disable_complete && event.has_complete_signal();
        let item = ReceivedItem {
            arrival: Instant::now(),
            event: event.clone(),
            path_set,
        };

        self.run_group_step(&key, item, has_expire, force_complete, &wait_spec);
        Ok(())
    }

    /// Resolve the group for `key` and run one atomic mutation step.
    ///
    /// Retries when the resolved group was closed between lookup and lock
    /// (its timer drained it); the retry sees a fresh registry entry.
    fn run_group_step(
        self: &Arc<Self>,
        key: &str,
        item: ReceivedItem,
        has_expire: bool,
        force_complete: bool,
        wait_spec: &[PathPattern],
    ) {
        let mut item = Some(item);
        loop {
            let (arc, created) = self.registry.resolve(key);
            let mut group = match arc.lock() {
                Ok(group) => group,
                Err(e) => {
                    error!("correlation group mutex poisoned, dropping event: {}", e);
                    return;
                }
            };
            if group.is_closed() {
                continue;
            }
            if created {
                debug!("join-wait group created for key '{}'", key);
                group.set_timer(self.spawn_timer(key));
            }
            if let Some(item) = item.take() {
                group.queue.push_back(item);
            }
            self.mutation_step(&mut group, has_expire, force_complete, wait_spec);
            return;
        }
    }

    /// The ordered pipeline run after each append, under the group lock
    fn mutation_step(
        &self,
        group: &mut CorrelationGroup,
        has_expire: bool,
        force_complete: bool,
        wait_spec: &[PathPattern],
    ) {
        if has_expire {
            self.trim_to(group, 0, Report::Secondary);
            return;
        }
        if self.sweep_expired(group) {
            // every queued item aged out before this event could help
            self.registry.remove(group);
            return;
        }

        let key_lists: Vec<Vec<String>> = group.queue.iter().map(|i| i.path_keys()).collect();

        let completed = if self.config.exact_order {
            match matcher::match_exact_order(&key_lists, wait_spec) {
                ExactOrderOutcome::Completed => true,
                ExactOrderOutcome::Incomplete { keep_newest } => {
                    if self.trim_to(group, keep_newest, Report::Secondary) {
                        return;
                    }
                    false
                }
            }
        } else {
            match matcher::match_any_order(&key_lists, wait_spec) {
                AnyOrderOutcome::Completed => true,
                AnyOrderOutcome::Incomplete { redundant_prefix } => {
                    let keep = group.queue.len() - redundant_prefix;
                    if self.trim_to(group, keep, Report::Secondary) {
                        return;
                    }
                    false
                }
            }
        };

        if completed {
            self.emit_merged(group);
            self.trim_to(group, 0, Report::Silent);
        } else if force_complete {
            self.trim_to(group, 0, Report::Secondary);
        }
    }

    /// Merge all queued path sets (later items overwrite earlier), attach
    /// the mapping to the representative event and emit it on the primary
    /// output.
    fn emit_merged(&self, group: &CorrelationGroup) {
        let mut merged = PathSet::new();
        for item in &group.queue {
            for (k, v) in &item.path_set {
                merged.insert(k.clone(), v.clone());
            }
        }

        let representative = if self.config.first_msg {
            group.queue.front()
        } else {
            group.queue.back()
        };
        if let Some(item) = representative {
            let mut out = item.event.clone();
            out.set(&self.config.path_topic, Value::Object(merged));
            self.send_primary(out);
        }
    }

    /// Evict queued items from the front until `keep` remain. Returns true
    /// when the group drained and was removed from the registry.
    fn trim_to(&self, group: &mut CorrelationGroup, keep: usize, report: Report) -> bool {
        while group.queue.len() > keep {
            if let Some(evicted) = group.queue.pop_front() {
                if report == Report::Secondary {
                    self.send_secondary(self.annotate(evicted));
                }
            }
        }
        if group.queue.is_empty() {
            debug!("join-wait group '{}' drained, removing", group.key);
            self.registry.remove(group);
            true
        } else {
            false
        }
    }

    /// Evict every item older than the timeout, in arrival order. Returns
    /// true when the queue drained.
    fn sweep_expired(&self, group: &mut CorrelationGroup) -> bool {
        let timeout = self.config.timeout_duration();
        let now = Instant::now();
        while group
            .queue
            .front()
            .is_some_and(|front| now.duration_since(front.arrival) > timeout)
        {
            if let Some(expired) = group.queue.pop_front() {
                self.send_secondary(self.annotate(expired));
            }
        }
        group.queue.is_empty()
    }

    /// Evicted items carry their captured path set on the secondary output
    fn annotate(&self, item: ReceivedItem) -> Event {
        let mut out = item.event;
        out.set(&self.config.path_topic, Value::Object(item.path_set));
        out
    }

    fn spawn_timer(self: &Arc<Self>, key: &str) -> ExpiryTimer {
        let weak = Arc::downgrade(self);
        let key = key.to_string();
        ExpiryTimer::spawn(self.config.timeout_duration(), move || {
            weak.upgrade().and_then(|shared| shared.on_timer(&key))
        })
    }

    /// Timer callback: time-based sweep plus rescheduling arithmetic.
    /// Returns the next delay, or `None` once the group is gone.
    fn on_timer(&self, key: &str) -> Option<Duration> {
        if self.shutdown.load(Ordering::SeqCst) {
            return None;
        }
        let arc = self.registry.get(key)?;
        let mut group = match arc.lock() {
            Ok(group) => group,
            Err(e) => {
                error!("correlation group mutex poisoned in timer: {}", e);
                return None;
            }
        };
        if group.is_closed() {
            return None;
        }

        if self.sweep_expired(&mut group) {
            self.registry.remove(&mut group);
            return None;
        }

        // re-arm for the oldest survivor's deadline
        let timeout = self.config.timeout_duration();
        let front_arrival = group.queue.front().map(|item| item.arrival)?;
        Some(timeout.saturating_sub(front_arrival.elapsed()))
    }

    fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        for key in self.registry.keys() {
            if let Some(arc) = self.registry.get(&key) {
                match arc.lock() {
                    Ok(mut group) => self.registry.remove(&mut group),
                    Err(e) => error!("correlation group mutex poisoned in shutdown: {}", e),
                }
            }
        }
        debug!("join-wait engine shut down");
    }

    fn send_primary(&self, event: Event) {
        if self.primary.send(event).is_err() {
            warn!("join-wait primary output disconnected, completed group lost");
        }
    }

    fn send_secondary(&self, event: Event) {
        if self.secondary.send(event).is_err() {
            warn!("join-wait secondary output disconnected, expired item lost");
        }
    }
}
