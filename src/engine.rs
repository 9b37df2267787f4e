//! Macro record/replay, advanced one frame per game tick.
//!
//! Recording and running are mutually exclusive. Both stop only through their
//! [`CancelToken`], which is checked once per tick; a cancelled replay always
//! releases every movement key before it reports back.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::geometry::Direction;
use crate::host::PlayerControl;
use crate::store::MacroStore;
use crate::trace::{Frame, InputTrace};

#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MacroOutcome {
    Saved {
        map: String,
        direction: Direction,
        frames: usize,
        path: PathBuf,
    },
    SaveFailed {
        map: String,
        direction: Direction,
        error: String,
    },
    Completed {
        map: String,
        direction: Direction,
        frames: usize,
    },
    Terminated {
        map: String,
        direction: Direction,
        at_frame: usize,
    },
}

#[derive(Debug)]
struct RecordingSession {
    map: String,
    direction: Direction,
    trace: InputTrace,
    token: CancelToken,
}

#[derive(Debug)]
struct ReplaySession {
    map: String,
    direction: Direction,
    trace: InputTrace,
    cursor: usize,
    token: CancelToken,
}

#[derive(Debug, Default)]
enum EngineState {
    #[default]
    Idle,
    Recording(RecordingSession),
    Running(ReplaySession),
}

#[derive(Debug, Default)]
pub struct MacroEngine {
    state: EngineState,
    suppress_look_input: bool,
}

impl MacroEngine {
    pub fn new(suppress_look_input: bool) -> Self {
        Self {
            state: EngineState::Idle,
            suppress_look_input,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, EngineState::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, EngineState::Recording(_))
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, EngineState::Running(_))
    }

    /// Token of the active session, if any.
    pub fn token(&self) -> Option<CancelToken> {
        match &self.state {
            EngineState::Idle => None,
            EngineState::Recording(session) => Some(session.token.clone()),
            EngineState::Running(session) => Some(session.token.clone()),
        }
    }

    pub fn stop_recording(&self) {
        if let EngineState::Recording(session) = &self.state {
            session.token.cancel();
        }
    }

    pub fn stop_running(&self) {
        if let EngineState::Running(session) = &self.state {
            session.token.cancel();
        }
    }

    pub fn stop(&self) {
        if let Some(token) = self.token() {
            token.cancel();
        }
    }

    pub fn begin_record<H: PlayerControl + ?Sized>(
        &mut self,
        host: &mut H,
        store: &MacroStore,
        map: &str,
        direction: Direction,
    ) -> CancelToken {
        self.interrupt(host, store);
        let token = CancelToken::new();
        tracing::info!(map, %direction, "recording macro");
        self.state = EngineState::Recording(RecordingSession {
            map: map.to_string(),
            direction,
            trace: InputTrace::new(),
            token: token.clone(),
        });
        token
    }

    pub fn begin_run<H: PlayerControl + ?Sized>(
        &mut self,
        host: &mut H,
        store: &MacroStore,
        map: &str,
        direction: Direction,
        trace: InputTrace,
    ) -> CancelToken {
        self.interrupt(host, store);
        let token = CancelToken::new();
        if self.suppress_look_input {
            host.set_look_input_locked(true);
        }
        tracing::info!(map, %direction, frames = trace.len(), "running macro");
        self.state = EngineState::Running(ReplaySession {
            map: map.to_string(),
            direction,
            trace,
            cursor: 0,
            token: token.clone(),
        });
        token
    }

    /// Cancels whatever is active and settles it immediately rather than on the
    /// next tick. An interrupted recording is still saved.
    pub fn interrupt<H: PlayerControl + ?Sized>(
        &mut self,
        host: &mut H,
        store: &MacroStore,
    ) -> Option<MacroOutcome> {
        self.stop();
        let outcome = self.tick(host, store);
        if let Some(outcome) = &outcome {
            tracing::debug!(?outcome, "interrupted active macro");
        }
        outcome
    }

    /// Advances the active session by one tick.
    pub fn tick<H: PlayerControl + ?Sized>(
        &mut self,
        host: &mut H,
        store: &MacroStore,
    ) -> Option<MacroOutcome> {
        match &mut self.state {
            EngineState::Idle => None,
            EngineState::Recording(session) => {
                if !session.token.is_cancelled() {
                    session.trace.push(Frame::new(host.held_keys(), host.look()));
                    return None;
                }
                let EngineState::Recording(session) = std::mem::take(&mut self.state) else {
                    return None;
                };
                Some(save_recording(session, store))
            }
            EngineState::Running(session) => {
                host.release_all_keys();

                if session.token.is_cancelled() {
                    let outcome = MacroOutcome::Terminated {
                        map: session.map.clone(),
                        direction: session.direction,
                        at_frame: session.cursor,
                    };
                    self.finish_run(host);
                    tracing::info!("terminated macro execution");
                    return Some(outcome);
                }

                match session.trace.get(session.cursor).copied() {
                    Some(frame) => {
                        host.set_look(frame.look);
                        for key in frame.keys.iter() {
                            host.set_key(key, true);
                        }
                        session.cursor += 1;
                        None
                    }
                    None => {
                        let outcome = MacroOutcome::Completed {
                            map: session.map.clone(),
                            direction: session.direction,
                            frames: session.cursor,
                        };
                        self.finish_run(host);
                        Some(outcome)
                    }
                }
            }
        }
    }

    fn finish_run<H: PlayerControl + ?Sized>(&mut self, host: &mut H) {
        host.release_all_keys();
        if self.suppress_look_input {
            host.set_look_input_locked(false);
        }
        self.state = EngineState::Idle;
    }
}

fn save_recording(session: RecordingSession, store: &MacroStore) -> MacroOutcome {
    let trimmed = session.trace.trimmed();
    match store.save(&session.map, session.direction, &trimmed) {
        Ok(path) => {
            tracing::info!(
                map = %session.map,
                direction = %session.direction,
                sampled = session.trace.len(),
                kept = trimmed.len(),
                "saved macro"
            );
            MacroOutcome::Saved {
                map: session.map,
                direction: session.direction,
                frames: trimmed.len(),
                path,
            }
        }
        Err(err) => {
            tracing::warn!(map = %session.map, "failed saving macro: {err:#}");
            MacroOutcome::SaveFailed {
                map: session.map,
                direction: session.direction,
                error: format!("{err:#}"),
            }
        }
    }
}
