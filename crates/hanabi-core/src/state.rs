//! Stateful services and whole-engine state snapshots.
//!
//! Every subsystem whose state must survive rollback and save/load
//! implements [`StatefulService`] and registers with the engine's
//! [`ServiceRegistry`]. A capture asks every service for an opaque
//! fragment and bundles them into an immutable [`StateSnapshot`]; a
//! restore hands each fragment back to the service that produced it.

use indexmap::IndexMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::StateError;
use crate::spot::PlaybackSpot;

// ── Service contract ─────────────────────────────────────────────────

/// A subsystem whose state participates in rollback and persistence.
///
/// Fragments are opaque bytes; the registry never interprets them. The
/// only requirement is that `load_state(save_state())` reproduces the
/// observable state the service had at capture time.
pub trait StatefulService: Send {
    /// Stable identifier used to route fragments back on restore.
    /// Must be unique within a registry.
    fn name(&self) -> &str;

    /// Serialize the service's current state.
    fn save_state(&self) -> Vec<u8>;

    /// Replace the service's state with a previously captured fragment.
    fn load_state(&mut self, fragment: &[u8]) -> Result<(), StateError>;
}

// ── Snapshot ─────────────────────────────────────────────────────────

/// An immutable capture of every registered service's state at one spot.
///
/// Snapshots are taken before a command executes, so restoring one puts
/// the engine exactly where it was when that command was about to run.
/// Fragments keep registration order so captures are byte-stable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateSnapshot {
    fragments: IndexMap<String, Vec<u8>>,
    captured_at: PlaybackSpot,
    created_at_ms: u64,
}

impl StateSnapshot {
    /// Assemble a snapshot from already-captured fragments.
    ///
    /// Normally produced by [`ServiceRegistry::capture`]; exposed for
    /// decoding persisted snapshots.
    pub fn from_parts(
        fragments: IndexMap<String, Vec<u8>>,
        captured_at: PlaybackSpot,
        created_at_ms: u64,
    ) -> Self {
        Self {
            fragments,
            captured_at,
            created_at_ms,
        }
    }

    /// The spot of the command this snapshot was taken before.
    pub fn captured_at(&self) -> &PlaybackSpot {
        &self.captured_at
    }

    /// Wall-clock capture time, milliseconds since the Unix epoch.
    /// Diagnostic only; restore semantics never depend on it.
    pub fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }

    /// The per-service fragments, in registration order.
    pub fn fragments(&self) -> &IndexMap<String, Vec<u8>> {
        &self.fragments
    }

    /// The fragment captured for one service, if present.
    pub fn fragment(&self, service: &str) -> Option<&[u8]> {
        self.fragments.get(service).map(Vec::as_slice)
    }
}

// ── Registry ─────────────────────────────────────────────────────────

/// The set of stateful services registered with an engine.
///
/// Commands mutate services through shared handles they captured at
/// construction; the registry's job is capture and restore, plus giving
/// conditional gates read access at evaluation time.
#[derive(Default)]
pub struct ServiceRegistry {
    services: Vec<Box<dyn StatefulService>>,
}

impl ServiceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service. Later captures include it; registration
    /// order fixes fragment order in every snapshot.
    pub fn register(&mut self, service: Box<dyn StatefulService>) {
        debug_assert!(
            !self.services.iter().any(|s| s.name() == service.name()),
            "duplicate service name '{}'",
            service.name()
        );
        self.services.push(service);
    }

    /// Number of registered services.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Whether no services are registered.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Capture every service's state into an immutable snapshot tagged
    /// with the spot of the command about to execute.
    pub fn capture(&self, at: &PlaybackSpot) -> StateSnapshot {
        let fragments = self
            .services
            .iter()
            .map(|s| (s.name().to_owned(), s.save_state()))
            .collect();
        StateSnapshot {
            fragments,
            captured_at: at.clone(),
            created_at_ms: unix_millis(),
        }
    }

    /// Restore every service from its fragment in `snapshot`.
    ///
    /// Fails on the first fragment naming an unregistered service or
    /// rejected by its service. Services restored before the failure
    /// keep the snapshot state; the caller decides whether that is
    /// recoverable.
    pub fn restore(&mut self, snapshot: &StateSnapshot) -> Result<(), StateError> {
        for (name, fragment) in snapshot.fragments() {
            let service = self
                .services
                .iter_mut()
                .find(|s| s.name() == name)
                .ok_or_else(|| StateError::UnknownService { name: name.clone() })?;
            service.load_state(fragment)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field(
                "services",
                &self.services.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Cheaply shareable snapshot handle.
///
/// Snapshots are immutable after capture, so the rollback stack and
/// persistence layer pass them around by `Arc`.
pub type SharedSnapshot = Arc<StateSnapshot>;
