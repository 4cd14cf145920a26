//! Client-side race session: the room/game lifecycle state machine, the
//! reducer over inbound room-channel events, and the projection that combines
//! the authoritative snapshot with the optimistic local slice.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use typerace_common::error::RaceError;
use typerace_common::metrics::{self, RaceResult};
use typerace_common::protocol::{
    ClientCommand, FinishReport, ProgressReport, RestartRequest, ServerEvent, StartRequest,
};
use typerace_common::room::{GameState, Room};

use crate::typing::{InputMode, Keystroke, Reconciler};

/// Delay between the server-announced start and actual typing, absorbed
/// client-side from `game_started_at`.
pub const COUNTDOWN_SECS: i64 = 5;
pub const DEFAULT_ROUND_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceMode {
    /// Round ends when the timer runs out.
    Time,
    /// Round ends when the typed text reaches the passage length.
    Words,
}

#[derive(Debug, Clone, Copy)]
pub struct RaceConfig {
    pub mode: RaceMode,
    pub input: InputMode,
    pub round_secs: i64,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            mode: RaceMode::Words,
            input: InputMode::CharStream,
            round_secs: DEFAULT_ROUND_SECS,
        }
    }
}

/// Client-side lifecycle. `Countdown` is derived locally from the server's
/// start timestamp; the server only knows WAITING / IN_PROGRESS / FINISHED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RacePhase {
    Waiting,
    Countdown,
    Typing,
    Finished,
}

/// One row of the combined standings view.
#[derive(Debug, Clone, PartialEq)]
pub struct Standing {
    pub player_id: Uuid,
    pub nickname: String,
    pub position: usize,
    pub wpm: u16,
    pub accuracy: f64,
    pub is_finished: bool,
    pub is_self: bool,
}

pub struct RaceSession {
    player_id: Uuid,
    config: RaceConfig,
    /// Authoritative remote view; mutated only by the reducer.
    room: Room,
    phase: RacePhase,
    ready_at: Option<DateTime<Utc>>,
    round_ends_at: Option<DateTime<Utc>>,
    reconciler: Reconciler,
    result: Option<RaceResult>,
}

impl RaceSession {
    pub fn new(player_id: Uuid, room: Room, config: RaceConfig, now: DateTime<Utc>) -> Self {
        let mut session = Self {
            player_id,
            config,
            room,
            phase: RacePhase::Waiting,
            ready_at: None,
            round_ends_at: None,
            reconciler: Reconciler::new(config.input),
            result: None,
        };
        // joining an already-finished room settles the phase without
        // publishing anything
        session.sync_phase(now);
        session
    }

    pub fn phase(&self) -> RacePhase {
        self.phase
    }

    pub fn room(&self) -> &Room {
        &self.room
    }

    pub fn result(&self) -> Option<&RaceResult> {
        self.result.as_ref()
    }

    pub fn is_owner(&self) -> bool {
        self.room.is_owner(self.player_id)
    }

    pub fn typed(&self) -> &str {
        self.reconciler.typed()
    }

    pub fn is_idle(&self) -> bool {
        self.reconciler.is_idle()
    }

    /// Whole seconds left on the countdown, rounded up for display.
    pub fn countdown_remaining(&self, now: DateTime<Utc>) -> Option<i64> {
        let ready_at = self.ready_at?;
        if self.phase != RacePhase::Countdown {
            return None;
        }
        let millis = (ready_at - now).num_milliseconds().max(0);
        Some((millis + 999) / 1000)
    }

    /// Reduce one inbound event into the session. Returns the commands the
    /// change requires (at most a finish report today).
    pub fn apply(&mut self, event: ServerEvent, now: DateTime<Utc>) -> Vec<ClientCommand> {
        match event {
            ServerEvent::RoomUpdate(room)
            | ServerEvent::GameStarted(room)
            | ServerEvent::PlayerJoined(room)
            | ServerEvent::PlayerLeft(room) => {
                // full snapshot: last-writer-wins, no merge
                self.room = room;
                self.sync_phase(now).into_iter().collect()
            }

            ServerEvent::PlayerProgress(progress) => {
                if progress.player_id == self.player_id {
                    // local state is authoritative for self; a stale echo
                    // must never clobber optimistic progress
                    debug!(player = %progress.player_id, "dropping self progress echo");
                    return Vec::new();
                }
                match self.room.player_mut(progress.player_id) {
                    Some(player) => {
                        player.current_position = progress.current_position;
                        player.wpm = progress.wpm;
                        player.accuracy = progress.accuracy;
                    }
                    None => {
                        debug!(player = %progress.player_id, "progress for unknown player");
                    }
                }
                Vec::new()
            }

            ServerEvent::PlayerFinished(finished) => {
                if finished.id == self.player_id {
                    return self.finish(now).into_iter().collect();
                }
                if let Some(player) = self.room.player_mut(finished.id) {
                    *player = finished;
                }
                Vec::new()
            }

            ServerEvent::GameOver => self.finish(now).into_iter().collect(),

            ServerEvent::GameRestart(room) => {
                info!(code = %room.code, "round restarted");
                self.room = room;
                self.reconciler.reset();
                self.result = None;
                self.ready_at = None;
                self.round_ends_at = None;
                self.phase = RacePhase::Waiting;
                self.sync_phase(now).into_iter().collect()
            }
        }
    }

    /// Feed one local keystroke. Ignored outside the typing phase.
    pub fn on_key(&mut self, key: Keystroke, now: DateTime<Utc>) -> Vec<ClientCommand> {
        if self.phase != RacePhase::Typing {
            return Vec::new();
        }
        let accepted = self.reconciler.on_key(key, &self.room.text, now);
        if !accepted {
            return Vec::new();
        }
        if self.config.mode == RaceMode::Words
            && self.reconciler.typed().chars().count() == self.room.text.chars().count()
        {
            return self.finish(now).into_iter().collect();
        }
        Vec::new()
    }

    /// Advance clocks: countdown expiry, round deadline, publish debounce and
    /// idle tracking.
    pub fn on_tick(&mut self, now: DateTime<Utc>) -> Vec<ClientCommand> {
        match self.phase {
            RacePhase::Countdown => {
                if self.ready_at.is_some_and(|ready| now >= ready) {
                    self.begin_typing(now);
                }
                Vec::new()
            }
            RacePhase::Typing => {
                if self.round_ends_at.is_some_and(|end| now >= end) {
                    return self.finish(now).into_iter().collect();
                }
                self.reconciler.poll_idle(now);
                if self.reconciler.poll_publish(now) {
                    return vec![self.progress_report(now)];
                }
                Vec::new()
            }
            RacePhase::Waiting | RacePhase::Finished => Vec::new(),
        }
    }

    /// Owner-only: ask the server to start the round.
    pub fn request_start(&self) -> Result<ClientCommand, RaceError> {
        if !self.is_owner() {
            return Err(RaceError::NotRoomOwner);
        }
        if self.phase != RacePhase::Waiting {
            return Err(RaceError::AlreadyStarted);
        }
        Ok(ClientCommand::StartGame(StartRequest {
            room_id: self.room.id,
            player_id: self.player_id,
        }))
    }

    /// Owner-only: request a fresh round with a new passage.
    pub fn request_restart(&self, new_text: String) -> Result<ClientCommand, RaceError> {
        if !self.is_owner() {
            return Err(RaceError::NotRoomOwner);
        }
        if self.phase != RacePhase::Finished {
            return Err(RaceError::NotFinished);
        }
        Ok(ClientCommand::Restart(RestartRequest {
            room_id: self.room.id,
            new_text,
        }))
    }

    /// Combined view: the roster as the server last reported it, with the
    /// local player's row overridden by the optimistic local slice.
    pub fn standings(&self, now: DateTime<Utc>) -> Vec<Standing> {
        let mut rows: Vec<Standing> = self
            .room
            .players
            .iter()
            .map(|p| {
                if p.id == self.player_id {
                    self.local_standing(p.nickname.clone(), now)
                } else {
                    Standing {
                        player_id: p.id,
                        nickname: p.nickname.clone(),
                        position: p.current_position,
                        wpm: p.wpm,
                        accuracy: p.accuracy,
                        is_finished: p.is_finished,
                        is_self: false,
                    }
                }
            })
            .collect();
        rows.sort_by(|a, b| b.position.cmp(&a.position));
        rows
    }

    fn local_standing(&self, nickname: String, now: DateTime<Utc>) -> Standing {
        let (wpm, accuracy) = match self.result {
            Some(result) => (result.wpm, result.accuracy),
            None => {
                let counts = metrics::char_counts(self.reconciler.typed(), &self.room.text);
                let elapsed = self.reconciler.elapsed(now);
                (metrics::wpm(counts.correct, elapsed), metrics::accuracy(counts))
            }
        };
        Standing {
            player_id: self.player_id,
            nickname,
            position: self.reconciler.position(),
            wpm,
            accuracy,
            is_finished: self.phase == RacePhase::Finished,
            is_self: true,
        }
    }

    fn progress_report(&self, now: DateTime<Utc>) -> ClientCommand {
        let counts = metrics::char_counts(self.reconciler.typed(), &self.room.text);
        let elapsed = self.reconciler.elapsed(now);
        ClientCommand::Progress(ProgressReport {
            room_id: self.room.id,
            player_id: self.player_id,
            current_position: self.reconciler.position(),
            wpm: metrics::wpm(counts.correct, elapsed),
            accuracy: metrics::accuracy(counts),
        })
    }

    /// Re-derive the phase after a snapshot replace. Finished is terminal
    /// until an explicit restart; a snapshot that ends the round drives the
    /// same idempotent finish as a GAME_OVER message.
    fn sync_phase(&mut self, now: DateTime<Utc>) -> Option<ClientCommand> {
        match self.phase {
            RacePhase::Finished => None,
            RacePhase::Typing => {
                if self.room.game_state == GameState::Finished {
                    return self.finish(now);
                }
                None
            }
            RacePhase::Waiting | RacePhase::Countdown => match self.room.game_state {
                GameState::InProgress => {
                    if let Some(started_at) = self.room.game_started_at {
                        let ready_at = started_at + Duration::seconds(COUNTDOWN_SECS);
                        if now >= ready_at {
                            // joined late: skip the countdown entirely
                            self.begin_typing(now);
                        } else {
                            self.phase = RacePhase::Countdown;
                            self.ready_at = Some(ready_at);
                        }
                    }
                    None
                }
                GameState::Waiting => {
                    self.phase = RacePhase::Waiting;
                    self.ready_at = None;
                    None
                }
                GameState::Finished => self.finish(now),
            },
        }
    }

    fn begin_typing(&mut self, now: DateTime<Utc>) {
        self.phase = RacePhase::Typing;
        self.ready_at = None;
        if self.config.mode == RaceMode::Time {
            self.round_ends_at = Some(now + Duration::seconds(self.config.round_secs));
        }
        info!("race started");
    }

    /// Terminal transition. The first caller computes the result and emits
    /// the finish report; every later call is a no-op.
    fn finish(&mut self, now: DateTime<Utc>) -> Option<ClientCommand> {
        if self.phase == RacePhase::Finished {
            return None;
        }
        self.phase = RacePhase::Finished;
        self.ready_at = None;
        self.round_ends_at = None;
        self.reconciler.cancel_timers();

        let elapsed = self.reconciler.elapsed(now);
        let result = metrics::race_result(self.reconciler.typed(), &self.room.text, elapsed);
        self.result = Some(result);

        if let Some(me) = self.room.player_mut(self.player_id) {
            me.current_position = self.reconciler.position();
            me.wpm = result.wpm;
            me.accuracy = result.accuracy;
            me.is_finished = true;
            me.finished_at = Some(now);
        }

        Some(ClientCommand::Finish(FinishReport {
            room_id: self.room.id,
            player_id: self.player_id,
            wpm: result.wpm,
            accuracy: result.accuracy,
        }))
    }
}
