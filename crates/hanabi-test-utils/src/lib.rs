//! Test utilities and mock types for Hanabi development.
//!
//! Provides a configurable [`ScriptedCommand`] with a shared execution
//! log, a [`MemoryService`] mock of the stateful-service contract, a
//! [`CountingBackend`] mock of the resource backend, and a
//! [`CancelWatch`] for observing cancellation tokens handed to
//! commands. Everything here is built on the `hanabi-core` contracts
//! alone, so the engine's own unit tests can depend on this crate.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use smallvec::SmallVec;

use hanabi_core::{
    CancelToken, Command, CommandEffect, CommandError, ExecuteContext, PlaybackSpot, Preloadable,
    PreloadError, ResourceBackend, ResourceKey, ServiceRegistry, StateError, StatefulService,
};

// ── Execution log ────────────────────────────────────────────────────

/// Shared record of every spot executed by [`ScriptedCommand`]s.
///
/// Clone it into each command builder; all clones share one log.
#[derive(Clone, Debug, Default)]
pub struct ScriptLog {
    spots: Arc<Mutex<Vec<PlaybackSpot>>>,
}

impl ScriptLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, spot: &PlaybackSpot) {
        self.spots.lock().unwrap().push(spot.clone());
    }

    /// Every executed spot, in execution order.
    pub fn spots(&self) -> Vec<PlaybackSpot> {
        self.spots.lock().unwrap().clone()
    }

    /// `(line, inline)` pairs in execution order.
    pub fn positions(&self) -> Vec<(u32, u32)> {
        self.spots.lock().unwrap().iter().map(|s| s.position()).collect()
    }

    /// How many times the given spot executed.
    pub fn count_of(&self, spot: &PlaybackSpot) -> usize {
        self.spots.lock().unwrap().iter().filter(|s| *s == spot).count()
    }

    pub fn clear(&self) {
        self.spots.lock().unwrap().clear();
    }
}

// ── Scripted command ─────────────────────────────────────────────────

/// Start building a [`ScriptedCommand`] at the given position.
pub fn scripted(
    script_id: &str,
    line_index: u32,
    inline_index: u32,
    log: &ScriptLog,
) -> ScriptedCommandBuilder {
    ScriptedCommandBuilder {
        spot: PlaybackSpot::new(script_id.to_owned(), line_index, inline_index),
        log: log.clone(),
        effect: CommandEffect::None,
        blocking: true,
        gate: None,
        fail_reason: None,
        resources: SmallVec::new(),
        releasable: true,
        sets_memory: None,
        cancel_watch: None,
    }
}

pub struct ScriptedCommandBuilder {
    spot: PlaybackSpot,
    log: ScriptLog,
    effect: CommandEffect,
    blocking: bool,
    gate: Option<Arc<AtomicBool>>,
    fail_reason: Option<String>,
    resources: SmallVec<[ResourceKey; 2]>,
    releasable: bool,
    sets_memory: Option<(MemoryHandle, u64)>,
    cancel_watch: Option<CancelWatch>,
}

impl ScriptedCommandBuilder {
    /// The effect the command reports after executing.
    pub fn effect(mut self, effect: CommandEffect) -> Self {
        self.effect = effect;
        self
    }

    /// Mark the command non-blocking.
    pub fn non_blocking(mut self) -> Self {
        self.blocking = false;
        self
    }

    /// Gate the conditional check on a shared flag.
    pub fn runs_if(mut self, flag: Arc<AtomicBool>) -> Self {
        self.gate = Some(flag);
        self
    }

    /// Make execution fail with the given reason.
    pub fn fails(mut self, reason: &str) -> Self {
        self.fail_reason = Some(reason.to_owned());
        self
    }

    /// Declare preloadable resources.
    pub fn resources(mut self, keys: &[&str]) -> Self {
        self.resources = keys.iter().map(|k| ResourceKey::from(*k)).collect();
        self
    }

    /// Declare the resources non-releasable.
    pub fn keep_resources_loaded(mut self) -> Self {
        self.releasable = false;
        self
    }

    /// Write `value` into a [`MemoryService`] on execution.
    pub fn sets_memory(mut self, handle: &MemoryHandle, value: u64) -> Self {
        self.sets_memory = Some((handle.clone(), value));
        self
    }

    /// Hand the execution token to a [`CancelWatch`].
    pub fn watches_cancel(mut self, watch: &CancelWatch) -> Self {
        self.cancel_watch = Some(watch.clone());
        self
    }

    pub fn build(self) -> ScriptedCommand {
        ScriptedCommand {
            spot: self.spot,
            log: self.log,
            effect: self.effect,
            blocking: self.blocking,
            gate: self.gate,
            fail_reason: self.fail_reason,
            resources: self.resources,
            releasable: self.releasable,
            sets_memory: self.sets_memory,
            cancel_watch: self.cancel_watch,
        }
    }

    pub fn build_arc(self) -> Arc<dyn Command> {
        Arc::new(self.build())
    }
}

/// Configurable command descriptor recording its executions.
pub struct ScriptedCommand {
    spot: PlaybackSpot,
    log: ScriptLog,
    effect: CommandEffect,
    blocking: bool,
    gate: Option<Arc<AtomicBool>>,
    fail_reason: Option<String>,
    resources: SmallVec<[ResourceKey; 2]>,
    releasable: bool,
    sets_memory: Option<(MemoryHandle, u64)>,
    cancel_watch: Option<CancelWatch>,
}

impl Command for ScriptedCommand {
    fn spot(&self) -> &PlaybackSpot {
        &self.spot
    }

    fn should_execute(&self, _services: &ServiceRegistry) -> bool {
        self.gate
            .as_ref()
            .map_or(true, |flag| flag.load(Ordering::Acquire))
    }

    fn blocking(&self) -> bool {
        self.blocking
    }

    fn execute(
        &self,
        _ctx: &mut ExecuteContext<'_>,
        cancel: &CancelToken,
    ) -> Result<CommandEffect, CommandError> {
        if let Some(watch) = &self.cancel_watch {
            watch.record(cancel);
        }
        if cancel.is_cancelled() {
            return Ok(CommandEffect::None);
        }
        if let Some(reason) = &self.fail_reason {
            return Err(CommandError::ExecutionFailed {
                reason: reason.clone(),
            });
        }
        if let Some((handle, value)) = &self.sets_memory {
            handle.set(*value);
        }
        self.log.record(&self.spot);
        Ok(self.effect)
    }

    fn preloadable(&self) -> Option<&dyn Preloadable> {
        if self.resources.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

impl Preloadable for ScriptedCommand {
    fn resources(&self) -> SmallVec<[ResourceKey; 2]> {
        self.resources.clone()
    }

    fn releasable(&self) -> bool {
        self.releasable
    }
}

// ── Cancellation watch ───────────────────────────────────────────────

/// Records the cancellation token a [`ScriptedCommand`] executes with,
/// so tests can check whether it fired afterwards.
#[derive(Clone, Debug, Default)]
pub struct CancelWatch {
    token: Arc<Mutex<Option<CancelToken>>>,
}

impl CancelWatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a command has executed and handed its token over.
    pub fn observed(&self) -> bool {
        self.token.lock().unwrap().is_some()
    }

    /// Whether the recorded token has been cancelled.
    pub fn cancelled(&self) -> bool {
        self.token
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|t| t.is_cancelled())
    }

    fn record(&self, token: &CancelToken) {
        *self.token.lock().unwrap() = Some(token.clone());
    }
}

// ── Memory service ───────────────────────────────────────────────────

/// Handle for reading and writing a [`MemoryService`]'s value from
/// tests or scripted commands.
#[derive(Clone, Debug, Default)]
pub struct MemoryHandle {
    value: Arc<Mutex<u64>>,
}

impl MemoryHandle {
    pub fn get(&self) -> u64 {
        *self.value.lock().unwrap()
    }

    pub fn set(&self, value: u64) {
        *self.value.lock().unwrap() = value;
    }
}

/// Mock stateful service holding a single `u64`.
///
/// The value lives behind a shared handle, mirroring how production
/// services are mutated by commands and captured by the registry.
pub struct MemoryService {
    name: String,
    value: Arc<Mutex<u64>>,
}

impl MemoryService {
    pub fn new(name: &str) -> (Box<Self>, MemoryHandle) {
        let handle = MemoryHandle::default();
        let service = Box::new(Self {
            name: name.to_owned(),
            value: Arc::clone(&handle.value),
        });
        (service, handle)
    }
}

impl StatefulService for MemoryService {
    fn name(&self) -> &str {
        &self.name
    }

    fn save_state(&self) -> Vec<u8> {
        self.value.lock().unwrap().to_le_bytes().to_vec()
    }

    fn load_state(&mut self, fragment: &[u8]) -> Result<(), StateError> {
        let bytes: [u8; 8] = fragment.try_into().map_err(|_| StateError::Corrupt {
            service: self.name.clone(),
            detail: format!("expected 8 bytes, got {}", fragment.len()),
        })?;
        *self.value.lock().unwrap() = u64::from_le_bytes(bytes);
        Ok(())
    }
}

// ── Counting backend ─────────────────────────────────────────────────

#[derive(Debug, Default)]
struct BackendState {
    loaded: Vec<String>,
    freed: Vec<String>,
    attempts: HashMap<String, usize>,
}

/// Observer handle onto a [`CountingBackend`]'s recorded activity.
#[derive(Clone, Debug, Default)]
pub struct BackendProbe {
    state: Arc<Mutex<BackendState>>,
}

impl BackendProbe {
    /// Keys successfully loaded, in load order.
    pub fn loaded(&self) -> Vec<String> {
        self.state.lock().unwrap().loaded.clone()
    }

    /// Keys freed, in free order.
    pub fn freed(&self) -> Vec<String> {
        self.state.lock().unwrap().freed.clone()
    }

    /// Load attempts (successful or not) for one key.
    pub fn load_attempts(&self, key: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .attempts
            .get(key)
            .copied()
            .unwrap_or(0)
    }
}

/// Mock resource backend recording loads and frees.
#[derive(Debug, Default)]
pub struct CountingBackend {
    state: Arc<Mutex<BackendState>>,
    fail_keys: Vec<String>,
}

impl CountingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observer handle sharing this backend's records.
    pub fn probe(&self) -> BackendProbe {
        BackendProbe {
            state: Arc::clone(&self.state),
        }
    }

    /// Make loads of the given key fail.
    pub fn fail_on(&mut self, key: &str) {
        self.fail_keys.push(key.to_owned());
    }
}

impl ResourceBackend for CountingBackend {
    fn load(&mut self, key: &ResourceKey) -> Result<(), PreloadError> {
        let mut state = self.state.lock().unwrap();
        *state.attempts.entry(key.as_str().to_owned()).or_insert(0) += 1;
        if self.fail_keys.iter().any(|k| k == key.as_str()) {
            return Err(PreloadError::MissingResource {
                key: key.as_str().to_owned(),
            });
        }
        state.loaded.push(key.as_str().to_owned());
        Ok(())
    }

    fn free(&mut self, key: &ResourceKey) {
        self.state.lock().unwrap().freed.push(key.as_str().to_owned());
    }
}
