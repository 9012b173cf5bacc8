//! Threaded playback session.
//!
//! [`PlaybackSession`] moves a [`PlaybackEngine`] onto a dedicated
//! thread and exposes a channel-backed control surface. The thread owns
//! the engine outright; control requests are serialized through a FIFO
//! channel, so two rewinds issued concurrently never interleave their
//! restores. The auto-play timer is a receive deadline on the control
//! channel: input and timer race, whichever arrives first releases the
//! wait, and the loser simply ceases to exist with the wait state.

use std::error::Error;
use std::fmt;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use hanabi_core::{CancelToken, PlayError, RewindError, SharedSnapshot};
use log::{debug, error};

use crate::engine::{PlaybackEngine, PlaybackState};

// ── Control surface ──────────────────────────────────────────────────

/// Edge-triggered signals from the input source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputEvent {
    /// The player asked to continue past the current wait.
    Continue,
    /// The player asked to toggle skip mode.
    Skip,
}

/// Errors from the session's control surface.
#[derive(Debug)]
pub enum SessionError {
    /// The session thread is gone; no further control is possible.
    Disconnected,
    /// Starting playback failed.
    Play(PlayError),
    /// A rewind failed.
    Rewind(RewindError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "playback session thread is gone"),
            Self::Play(e) => write!(f, "play failed: {e}"),
            Self::Rewind(e) => write!(f, "rewind failed: {e}"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Play(e) => Some(e),
            Self::Rewind(e) => Some(e),
            Self::Disconnected => None,
        }
    }
}

enum Control {
    Play {
        index: usize,
        reply: Sender<Result<(), PlayError>>,
    },
    Stop {
        cancel_commands: bool,
    },
    Rewind {
        line_index: u32,
        inline_index: u32,
        resume_after: bool,
        cancel: CancelToken,
        reply: Sender<Result<(), RewindError>>,
    },
    SetSkip {
        on: bool,
        reply: Sender<bool>,
    },
    SetAutoPlay {
        on: bool,
    },
    Input(InputEvent),
    SaveSnapshot {
        reply: Sender<Option<SharedSnapshot>>,
    },
    Shutdown,
}

// ── Session ──────────────────────────────────────────────────────────

/// Handle to an engine running on its own thread.
///
/// Dropping the handle shuts the thread down; [`shutdown`] does the
/// same and hands the engine back for inspection or persistence.
///
/// [`shutdown`]: PlaybackSession::shutdown
pub struct PlaybackSession {
    ctl: Sender<Control>,
    handle: Option<JoinHandle<PlaybackEngine>>,
}

impl PlaybackSession {
    /// Spawn the session thread around an engine.
    pub fn spawn(engine: PlaybackEngine) -> Self {
        let (ctl, ctl_rx) = unbounded();
        let handle = thread::Builder::new()
            .name("hanabi-playback".to_owned())
            .spawn(move || run_loop(engine, ctl_rx))
            .expect("failed to spawn playback thread");
        Self {
            ctl,
            handle: Some(handle),
        }
    }

    /// Begin playback at `index`.
    pub fn play(&self, index: usize) -> Result<(), SessionError> {
        let (reply, rx) = bounded(1);
        self.send(Control::Play { index, reply })?;
        rx.recv()
            .map_err(|_| SessionError::Disconnected)?
            .map_err(SessionError::Play)
    }

    /// Halt playback, optionally cancelling in-flight command work.
    pub fn stop(&self, cancel_commands: bool) -> Result<(), SessionError> {
        self.send(Control::Stop { cancel_commands })
    }

    /// Rewind to the first descriptor at or after the given position.
    /// Blocks until the rewind completes; concurrent requests queue in
    /// FIFO order behind it.
    pub fn rewind(
        &self,
        line_index: u32,
        inline_index: u32,
        resume_after: bool,
    ) -> Result<(), SessionError> {
        self.rewind_with_cancel(line_index, inline_index, resume_after, CancelToken::never())
    }

    /// [`rewind`](Self::rewind) with a caller-supplied cancellation
    /// token, typically for abandoning long fast-forwards.
    pub fn rewind_with_cancel(
        &self,
        line_index: u32,
        inline_index: u32,
        resume_after: bool,
        cancel: CancelToken,
    ) -> Result<(), SessionError> {
        let (reply, rx) = bounded(1);
        self.send(Control::Rewind {
            line_index,
            inline_index,
            resume_after,
            cancel,
            reply,
        })?;
        rx.recv()
            .map_err(|_| SessionError::Disconnected)?
            .map_err(SessionError::Rewind)
    }

    /// Engage or disengage skip mode; returns the resulting flag.
    pub fn set_skip(&self, on: bool) -> Result<bool, SessionError> {
        let (reply, rx) = bounded(1);
        self.send(Control::SetSkip { on, reply })?;
        rx.recv().map_err(|_| SessionError::Disconnected)
    }

    /// Engage or disengage auto-play.
    pub fn set_auto_play(&self, on: bool) -> Result<(), SessionError> {
        self.send(Control::SetAutoPlay { on })
    }

    /// Deliver an input-source signal.
    pub fn input(&self, event: InputEvent) -> Result<(), SessionError> {
        self.send(Control::Input(event))
    }

    /// The most recent snapshot, for save-game embedding.
    pub fn save_snapshot(&self) -> Result<Option<SharedSnapshot>, SessionError> {
        let (reply, rx) = bounded(1);
        self.send(Control::SaveSnapshot { reply })?;
        rx.recv().map_err(|_| SessionError::Disconnected)
    }

    /// Stop the thread and take the engine back.
    pub fn shutdown(mut self) -> PlaybackEngine {
        let _ = self.ctl.send(Control::Shutdown);
        let handle = self.handle.take().expect("session already shut down");
        match handle.join() {
            Ok(engine) => engine,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }

    fn send(&self, msg: Control) -> Result<(), SessionError> {
        self.ctl.send(msg).map_err(|_| SessionError::Disconnected)
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.ctl.send(Control::Shutdown);
            let _ = handle.join();
        }
    }
}

// ── Thread body ──────────────────────────────────────────────────────

fn run_loop(mut engine: PlaybackEngine, ctl: Receiver<Control>) -> PlaybackEngine {
    // Deadline for the auto-play timer, armed once per wait entry.
    let mut wait_deadline: Option<Instant> = None;

    loop {
        if engine.state() != PlaybackState::WaitingForInput {
            wait_deadline = None;
        }

        // 1. Take the next control message. While running we only
        //    drain what is already queued; otherwise we block (with the
        //    auto-play deadline while waiting for input).
        let msg = match engine.state() {
            PlaybackState::Running => match ctl.try_recv() {
                Ok(msg) => Some(msg),
                Err(crossbeam_channel::TryRecvError::Empty) => None,
                Err(crossbeam_channel::TryRecvError::Disconnected) => break,
            },
            PlaybackState::WaitingForInput => {
                let deadline = *wait_deadline
                    .get_or_insert_with(|| Instant::now() + engine.auto_play_delay());
                if engine.auto_play_active() {
                    match ctl.recv_deadline(deadline) {
                        Ok(msg) => Some(msg),
                        Err(RecvTimeoutError::Timeout) => {
                            debug!("auto-play delay elapsed, releasing wait");
                            engine.release_wait();
                            wait_deadline = None;
                            None
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                } else {
                    match ctl.recv() {
                        Ok(msg) => Some(msg),
                        Err(_) => break,
                    }
                }
            }
            PlaybackState::Idle | PlaybackState::Stopped => match ctl.recv() {
                Ok(msg) => Some(msg),
                Err(_) => break,
            },
        };

        // 2. Apply it.
        if let Some(msg) = msg {
            match msg {
                Control::Play { index, reply } => {
                    let _ = reply.send(engine.play(index));
                }
                Control::Stop { cancel_commands } => engine.stop(cancel_commands),
                Control::Rewind {
                    line_index,
                    inline_index,
                    resume_after,
                    cancel,
                    reply,
                } => {
                    let result = engine.rewind(line_index, inline_index, resume_after, &cancel);
                    let _ = reply.send(result);
                }
                Control::SetSkip { on, reply } => {
                    let _ = reply.send(engine.set_skip(on));
                }
                Control::SetAutoPlay { on } => engine.set_auto_play(on),
                Control::Input(InputEvent::Continue) => engine.release_wait(),
                Control::Input(InputEvent::Skip) => {
                    let on = !engine.skip_active();
                    engine.set_skip(on);
                }
                Control::SaveSnapshot { reply } => {
                    let _ = reply.send(engine.save_snapshot());
                }
                Control::Shutdown => break,
            }
            continue;
        }

        // 3. No pending control and the engine is running: one step.
        if engine.state() == PlaybackState::Running {
            if let Err(e) = engine.step() {
                error!("playback stopped on command failure: {e}");
            }
        }
    }
    engine
}
