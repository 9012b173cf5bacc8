//! The playback state machine.
//!
//! [`PlaybackEngine`] owns the cursor into a [`Playlist`] and decides
//! when to execute, suspend, skip, fast-forward, or roll back. It is
//! synchronous and single-threaded by design: one call to [`step`]
//! performs one run-loop iteration. The threaded wrapper that races
//! input against the auto-play timer lives in [`session`].
//!
//! [`step`]: PlaybackEngine::step
//! [`session`]: crate::session

use std::collections::HashSet;
use std::time::Duration;

use hanabi_core::{
    CancelSource, CancelToken, CommandEffect, ExecuteContext, PlayError, PlaybackSpot,
    RewindError, ServiceRegistry, SharedSnapshot, StateSnapshot, StepError,
};
use log::{debug, warn};

use crate::playlist::Playlist;
use crate::preload::{PreloadMode, PreloadPolicy, ResourceBackend};
use crate::rollback::RollbackStack;

// ── Configuration ────────────────────────────────────────────────────

/// Tunables fixed at engine construction.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Rollback history depth. Clamped to at least 1.
    pub rollback_capacity: usize,
    /// Resource preload strategy.
    pub preload_mode: PreloadMode,
    /// Delay before auto-play releases a wait.
    pub auto_play_delay: Duration,
    /// Allow skipping positions never played before.
    pub skip_everything: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rollback_capacity: 64,
            preload_mode: PreloadMode::Dynamic { lookahead_steps: 2 },
            auto_play_delay: Duration::from_secs(2),
            skip_everything: false,
        }
    }
}

// ── States and outcomes ──────────────────────────────────────────────

/// The engine's lifecycle state.
///
/// `SkipActive`, `AutoPlayActive` and the transient rewind sub-modes
/// are orthogonal flags layered on `Running`, not states of their own.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlaybackState {
    /// No playback started.
    #[default]
    Idle,
    /// The run loop is executing commands.
    Running,
    /// A command requested an input gate; the cursor already points at
    /// the next command.
    WaitingForInput,
    /// Playback halted: explicit stop, terminator, exhaustion, or a
    /// fatal command error.
    Stopped,
}

/// What one run-loop step did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// The command executed and the cursor advanced.
    Executed,
    /// The conditional gate was false; advanced with no side effects
    /// and no snapshot.
    ConditionSkipped,
    /// The command executed and requested an input gate.
    AwaitingInput,
    /// The playlist ran out without a stop command.
    Finished,
    /// A stop terminator executed.
    Stopped,
}

// ── Engine ───────────────────────────────────────────────────────────

/// The script playback state machine.
///
/// Collaborators are injected at construction: the stateful services
/// commands mutate, and the resource backend the preload policy loads
/// through. The engine never looks services up ambiently.
pub struct PlaybackEngine {
    config: EngineConfig,
    playlist: Option<Playlist>,
    cursor: usize,
    state: PlaybackState,
    skip_active: bool,
    auto_play_active: bool,
    fast_forwarding: bool,
    rolling_back: bool,
    services: ServiceRegistry,
    rollback: RollbackStack,
    preload: PreloadPolicy,
    play_history: HashSet<PlaybackSpot>,
    command_cancel: CancelSource,
    /// Set when a non-blocking command launches; a hard stop must then
    /// fire the cancellation source.
    background_work: bool,
}

impl PlaybackEngine {
    /// Create an engine with no playlist loaded.
    pub fn new(
        config: EngineConfig,
        services: ServiceRegistry,
        backend: Box<dyn ResourceBackend>,
    ) -> Self {
        let rollback = RollbackStack::new(config.rollback_capacity);
        let preload = PreloadPolicy::new(config.preload_mode, backend);
        Self {
            config,
            playlist: None,
            cursor: 0,
            state: PlaybackState::Idle,
            skip_active: false,
            auto_play_active: false,
            fast_forwarding: false,
            rolling_back: false,
            services,
            rollback,
            preload,
            play_history: HashSet::new(),
            command_cancel: CancelSource::new(),
            background_work: false,
        }
    }

    // ── Accessors ────────────────────────────────────────────────

    /// The current lifecycle state.
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// The cursor index into the playlist.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The spot under the cursor, if a playlist is loaded and the
    /// cursor is in range.
    pub fn current_spot(&self) -> Option<&PlaybackSpot> {
        self.playlist.as_ref()?.spot_at(self.cursor)
    }

    /// Whether skip mode is engaged.
    pub fn skip_active(&self) -> bool {
        self.skip_active
    }

    /// Whether auto-play is engaged.
    pub fn auto_play_active(&self) -> bool {
        self.auto_play_active
    }

    /// Whether a fast-forward is in flight.
    pub fn fast_forwarding(&self) -> bool {
        self.fast_forwarding
    }

    /// Whether a rollback is in flight.
    pub fn rolling_back(&self) -> bool {
        self.rolling_back
    }

    /// The configured auto-play delay.
    pub fn auto_play_delay(&self) -> Duration {
        self.config.auto_play_delay
    }

    /// The loaded playlist, if any.
    pub fn playlist(&self) -> Option<&Playlist> {
        self.playlist.as_ref()
    }

    /// The rollback history.
    pub fn rollback(&self) -> &RollbackStack {
        &self.rollback
    }

    /// The preload policy, for diagnostics and tests.
    pub fn preload(&self) -> &PreloadPolicy {
        &self.preload
    }

    /// The registered services.
    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    /// Mutable access to the registered services.
    pub fn services_mut(&mut self) -> &mut ServiceRegistry {
        &mut self.services
    }

    /// Spots executed at least once in this persisted play history.
    pub fn play_history(&self) -> &HashSet<PlaybackSpot> {
        &self.play_history
    }

    /// Replace the play history, typically with a persisted set.
    pub fn restore_play_history(&mut self, history: HashSet<PlaybackSpot>) {
        self.play_history = history;
    }

    // ── Playlist lifecycle ───────────────────────────────────────

    /// Load a playlist, discarding any previous one and releasing its
    /// resource holds. The engine returns to `Idle` with the cursor at
    /// the start; the rollback history is kept so cross-script saves
    /// can still roll back.
    pub fn load_playlist(&mut self, playlist: Playlist) {
        self.preload.finish();
        self.playlist = Some(playlist);
        self.cursor = 0;
        self.state = PlaybackState::Idle;
        self.skip_active = false;
        self.fast_forwarding = false;
        self.rolling_back = false;
    }

    /// Discard the playlist and release every resource hold.
    pub fn unload_playlist(&mut self) {
        self.preload.finish();
        self.playlist = None;
        self.cursor = 0;
        self.state = PlaybackState::Idle;
        self.skip_active = false;
    }

    /// Begin playback at `index`.
    ///
    /// Establishes resource holds for the starting cursor and enters
    /// `Running`. The caller drives the run loop via [`step`] (or the
    /// session thread does).
    ///
    /// [`step`]: Self::step
    pub fn play(&mut self, index: usize) -> Result<(), PlayError> {
        let playlist = self.playlist.as_ref().ok_or(PlayError::NoPlaylist)?;
        if playlist.is_empty() {
            return Err(PlayError::EmptyPlaylist);
        }
        if index >= playlist.len() {
            return Err(PlayError::OutOfRange {
                index,
                len: playlist.len(),
            });
        }
        self.cursor = index;
        self.preload.begin(playlist, index, None);
        self.state = PlaybackState::Running;
        debug!("playback started at index {index}");
        Ok(())
    }

    /// Halt playback.
    ///
    /// With `cancel_commands` set, and when a non-blocking command has
    /// launched work since the last hard stop, the shared cancellation
    /// source fires so that work abandons itself; the source is then
    /// re-armed for the next play. Blocking commands complete inside
    /// [`step`](Self::step), so without background work there is
    /// nothing to cancel and the source stays live.
    pub fn stop(&mut self, cancel_commands: bool) {
        if cancel_commands && self.background_work {
            self.command_cancel.cancel();
            self.command_cancel = CancelSource::new();
            self.background_work = false;
        }
        self.state = PlaybackState::Stopped;
    }

    // ── Run loop ─────────────────────────────────────────────────

    /// Perform one run-loop iteration.
    ///
    /// Requires `Running`. A command failure stops the engine; every
    /// other outcome leaves it in a consistent state described by the
    /// returned [`StepOutcome`].
    pub fn step(&mut self) -> Result<StepOutcome, StepError> {
        if self.state != PlaybackState::Running {
            return Err(StepError::NotRunning);
        }
        let Some(playlist) = self.playlist.as_ref() else {
            return Err(StepError::NotRunning);
        };

        // 1. Resolve the descriptor under the cursor. A missing
        //    descriptor means the playlist was exhausted earlier.
        let Some(command) = playlist.get(self.cursor).cloned() else {
            return Ok(self.finish_exhausted());
        };
        let spot = command.spot().clone();

        // 2. Re-check the conditional gate; it may read mutable
        //    variables, so the compile-time answer is not trusted.
        if !command.should_execute(&self.services) {
            debug!("condition false at {spot}, skipping");
            return Ok(self.advance(StepOutcome::ConditionSkipped));
        }

        // 3. Snapshot before executing, so restoring reproduces the
        //    state this command was about to run against.
        let snapshot = self.services.capture(&spot);
        self.rollback.push(SharedSnapshot::new(snapshot));

        // 4. Execute. Blocking commands complete inside this call;
        //    non-blocking ones return promptly with their own work in
        //    flight, tied to the shared cancellation source.
        let token = self.command_cancel.token();
        let mut ctx = ExecuteContext {
            services: &mut self.services,
        };
        let effect = match command.execute(&mut ctx, &token) {
            Ok(effect) => effect,
            Err(reason) => {
                self.state = PlaybackState::Stopped;
                return Err(StepError::CommandFailed { spot, reason });
            }
        };
        self.play_history.insert(spot.clone());
        if !command.blocking() {
            self.background_work = true;
        }

        // 5. Apply the command's requested effect.
        match effect {
            CommandEffect::StopPlayback => {
                self.state = PlaybackState::Stopped;
                Ok(StepOutcome::Stopped)
            }
            CommandEffect::WaitForInput if !self.skip_active => {
                self.state = PlaybackState::WaitingForInput;
                Ok(self.advance(StepOutcome::AwaitingInput))
            }
            // Waits are suppressed while skipping.
            CommandEffect::WaitForInput | CommandEffect::None => {
                Ok(self.advance(StepOutcome::Executed))
            }
        }
    }

    /// Move the cursor to the next descriptor, advancing the preload
    /// window and re-evaluating skip eligibility.
    fn advance(&mut self, outcome: StepOutcome) -> StepOutcome {
        let playlist = self.playlist.as_ref().expect("advance without playlist");
        let next = self.cursor + 1;
        if next >= playlist.len() {
            if self.state == PlaybackState::WaitingForInput {
                // A wait on the final descriptor is honored; exhaustion
                // is reported by the step after the wait is released.
                self.cursor = next;
                return outcome;
            }
            return self.finish_exhausted();
        }
        self.preload.advance(playlist, next);
        self.cursor = next;

        // Skip may not cross into content never played. Fast-forward
        // overrides eligibility for its duration.
        if self.skip_active && !self.fast_forwarding {
            let spot = playlist.spot_at(next).expect("cursor in range");
            if !self.skip_eligible(spot) {
                debug!("skip cleared: {spot} not previously played");
                self.skip_active = false;
            }
        }
        outcome
    }

    fn finish_exhausted(&mut self) -> StepOutcome {
        warn!("playlist exhausted without a stop command, likely a missing terminator");
        self.state = PlaybackState::Stopped;
        StepOutcome::Finished
    }

    fn skip_eligible(&self, spot: &PlaybackSpot) -> bool {
        self.config.skip_everything || self.play_history.contains(spot)
    }

    // ── Input-side controls ──────────────────────────────────────

    /// Release an active input wait. No-op in any other state.
    pub fn release_wait(&mut self) {
        if self.state == PlaybackState::WaitingForInput {
            self.state = PlaybackState::Running;
        }
    }

    /// Engage or disengage skip mode.
    ///
    /// Engaging requires the current position to be previously played
    /// (or the global override). Returns whether the flag is now set.
    /// Engaging while waiting for input releases the wait.
    pub fn set_skip(&mut self, on: bool) -> bool {
        if !on {
            self.skip_active = false;
            return false;
        }
        let eligible = self
            .current_spot()
            .is_some_and(|spot| self.config.skip_everything || self.play_history.contains(spot));
        if eligible {
            self.skip_active = true;
            self.release_wait();
        }
        self.skip_active
    }

    /// Engage or disengage auto-play. Engaging releases any active
    /// input wait immediately.
    pub fn set_auto_play(&mut self, on: bool) {
        self.auto_play_active = on;
        if on {
            self.release_wait();
        }
    }

    // ── Rewind ───────────────────────────────────────────────────

    /// Move playback to the first descriptor at or after the given
    /// position, fast-forwarding or rolling back as needed.
    ///
    /// Navigation failures leave the cursor, the rollback stack, and
    /// resource holds untouched. Fast-forward interruption (terminator,
    /// exhaustion, cancellation) leaves the engine at the position it
    /// legitimately reached. `resume_after` picks `Running` or
    /// `Stopped` when the rewind reaches its target, and applies after
    /// a cancellation as well; a terminator or exhaustion interruption
    /// leaves the engine `Stopped` regardless, since there is nothing
    /// left to resume into.
    pub fn rewind(
        &mut self,
        line_index: u32,
        inline_index: u32,
        resume_after: bool,
        cancel: &CancelToken,
    ) -> Result<(), RewindError> {
        let playlist = self.playlist.as_ref().ok_or(RewindError::NoPlaylist)?;
        let target = playlist
            .first_at_or_after(line_index, inline_index)
            .ok_or(RewindError::TargetNotFound {
                line_index,
                inline_index,
            })?;

        if target == self.cursor {
            // Already there. Apply the resume choice and report success.
            self.settle(resume_after);
            return Ok(());
        }
        if target > self.cursor {
            self.fast_forward_to(target, resume_after, cancel)
        } else {
            self.roll_back_to(target, resume_after)
        }
    }

    /// Re-execute every descriptor from the cursor through `target`.
    fn fast_forward_to(
        &mut self,
        target: usize,
        resume_after: bool,
        cancel: &CancelToken,
    ) -> Result<(), RewindError> {
        let prior_skip = self.skip_active;
        self.fast_forwarding = true;
        // Waits and reveal pacing are suppressed for the duration.
        self.skip_active = true;
        self.release_wait();
        if self.state != PlaybackState::Running {
            self.state = PlaybackState::Running;
        }

        let result = loop {
            if cancel.is_cancelled() {
                break Err(RewindError::Cancelled);
            }
            let executing = self.cursor;
            let outcome = match self.step() {
                Ok(outcome) => outcome,
                Err(e) => break Err(RewindError::Step(e)),
            };
            match outcome {
                StepOutcome::Stopped => {
                    if executing == target {
                        // The target itself was the terminator.
                        break Ok(());
                    }
                    let spot = self
                        .playlist
                        .as_ref()
                        .and_then(|p| p.spot_at(executing))
                        .cloned()
                        .unwrap_or_else(|| PlaybackSpot::new("", 0, 0));
                    break Err(RewindError::TerminatorReached { spot });
                }
                StepOutcome::Finished => {
                    if executing == target {
                        break Ok(());
                    }
                    break Err(RewindError::PlaylistExhausted { target });
                }
                _ if executing == target => break Ok(()),
                _ => continue,
            }
        };

        self.fast_forwarding = false;
        self.skip_active = prior_skip;
        if self.state != PlaybackState::Stopped {
            self.settle(resume_after);
        }
        result
    }

    /// Restore the snapshot captured for the descriptor at `target`.
    fn roll_back_to(&mut self, target: usize, resume_after: bool) -> Result<(), RewindError> {
        self.rolling_back = true;
        let result: Result<(), RewindError> = (|| {
            let playlist = self.playlist.as_ref().ok_or(RewindError::NoPlaylist)?;
            // target < cursor, so it is always in range.
            let spot = playlist
                .spot_at(target)
                .cloned()
                .expect("rollback target in range");
            let snapshot = self
                .rollback
                .pop_to(&spot)
                .ok_or(RewindError::SnapshotMissing { spot })?;
            self.services.restore(&snapshot)?;
            self.cursor = target;
            let playlist = self.playlist.as_ref().expect("playlist still loaded");
            self.preload.advance(playlist, target);
            Ok(())
        })();
        self.rolling_back = false;
        if result.is_ok() {
            self.settle(resume_after);
        }
        result
    }

    fn settle(&mut self, resume_after: bool) {
        self.state = if resume_after {
            PlaybackState::Running
        } else {
            PlaybackState::Stopped
        };
    }

    // ── Persistence boundary ─────────────────────────────────────

    /// The snapshot a save game should embed: the most recent capture.
    pub fn save_snapshot(&self) -> Option<SharedSnapshot> {
        self.rollback.peek().cloned()
    }

    /// Snapshots eligible for save-game embedding, newest first.
    pub fn persistable_rollback(&self, max_count: usize) -> Vec<SharedSnapshot> {
        self.rollback.to_persistable(max_count)
    }

    /// Resume a saved game: rebuild the rollback history, restore the
    /// snapshot captured at `spot`, and point the cursor there.
    ///
    /// The snapshot and everything newer leave the stack, exactly as a
    /// rollback would; re-execution pushes them afresh. The engine ends
    /// up `Running`.
    pub fn load_and_resume(
        &mut self,
        spot: &PlaybackSpot,
        persisted: Vec<StateSnapshot>,
    ) -> Result<(), RewindError> {
        let playlist = self.playlist.as_ref().ok_or(RewindError::NoPlaylist)?;
        let target = playlist
            .index_of_spot(spot)
            .ok_or(RewindError::TargetNotFound {
                line_index: spot.line_index(),
                inline_index: spot.inline_index(),
            })?;

        let mut stack = RollbackStack::restore_from(self.config.rollback_capacity, persisted);
        // Same contract as a rollback: the save-point snapshot and
        // everything newer leave the stack, and re-execution pushes the
        // save point back afresh.
        let snapshot = stack
            .pop_to(spot)
            .ok_or_else(|| RewindError::SnapshotMissing { spot: spot.clone() })?;
        self.services.restore(&snapshot)?;

        self.rollback = stack;
        self.cursor = target;
        self.preload.finish();
        let playlist = self.playlist.as_ref().expect("playlist still loaded");
        self.preload.begin(playlist, target, None);
        self.state = PlaybackState::Running;
        Ok(())
    }
}

impl std::fmt::Debug for PlaybackEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackEngine")
            .field("state", &self.state)
            .field("cursor", &self.cursor)
            .field("skip_active", &self.skip_active)
            .field("auto_play_active", &self.auto_play_active)
            .field("rollback_len", &self.rollback.len())
            .finish_non_exhaustive()
    }
}
