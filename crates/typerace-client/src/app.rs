//! Multiplayer wiring: bootstrap the session, connect the room channel and
//! drive the race state machine from the merged event stream.

use anyhow::Context;
use chrono::{DateTime, Utc};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use typerace_common::protocol::ServerEvent;
use typerace_common::words;

use crate::api::RoomApi;
use crate::event::{self, AppEvent};
use crate::network::{self, ChannelHandle};
use crate::race::{RaceConfig, RacePhase, RaceSession};
use crate::session::{self, RoomEntry, SessionStore};
use crate::timer::{Clock, SystemClock};
use crate::typing;

pub async fn run<A: RoomApi, S: SessionStore>(
    api: &A,
    store: &mut S,
    channel_addr: &str,
    nickname: &str,
    entry: RoomEntry,
    config: RaceConfig,
) -> anyhow::Result<()> {
    let clock = SystemClock;
    let mut rng = StdRng::from_entropy();

    // fetch failure here is fatal: no state machine is started
    let ctx = session::establish(api, store, nickname, entry)
        .await
        .context("could not load the game room")?;
    info!(
        code = %ctx.room.code,
        players = ctx.room.players.len(),
        "joined room"
    );
    info!(text = %ctx.room.text, "passage");

    let (channel, inbound_rx) = network::connect(channel_addr.to_string(), ctx.room.id);
    let mut session = RaceSession::new(ctx.player_id, ctx.room, config, clock.now());

    let (event_tx, mut event_rx) = mpsc::channel::<AppEvent>(64);
    tokio::spawn(event::event_loop(inbound_rx, event_tx));

    let mut was_connected = channel.is_connected();
    let mut was_idle = session.is_idle();
    let mut last_countdown: Option<i64> = None;
    let mut result_reported = false;

    while let Some(event) = event_rx.recv().await {
        let now = clock.now();
        let commands = match event {
            AppEvent::Key(key) => {
                if is_quit(&key) {
                    break;
                }
                if key.code == KeyCode::Enter {
                    handle_enter(api, &channel, &mut session, now, &mut rng).await;
                    Vec::new()
                } else {
                    match typing::map_key(key) {
                        Some(keystroke) => session.on_key(keystroke, now),
                        None => Vec::new(),
                    }
                }
            }
            AppEvent::Network(envelope) => match envelope.decode() {
                Ok(Some(server_event)) => session.apply(server_event, now),
                Ok(None) => {
                    debug!(kind = %envelope.kind, "ignoring unknown room message");
                    Vec::new()
                }
                Err(e) => {
                    warn!("dropping undecodable room message: {}", e);
                    Vec::new()
                }
            },
            AppEvent::Tick => session.on_tick(now),
        };

        for command in commands {
            channel.publish(command).await;
        }

        let connected = channel.is_connected();
        if connected != was_connected {
            if connected {
                info!("room channel restored");
            } else {
                warn!("room channel lost, racing on local state only");
            }
            was_connected = connected;
        }

        if session.is_idle() != was_idle {
            was_idle = session.is_idle();
            debug!(idle = was_idle, "cursor idle state changed");
        }

        let countdown = session.countdown_remaining(now);
        if countdown != last_countdown {
            if let Some(seconds) = countdown {
                info!("race starts in {}", seconds);
            }
            last_countdown = countdown;
        }

        match session.result() {
            Some(result) if !result_reported => {
                info!(
                    wpm = result.wpm,
                    raw_wpm = result.raw_wpm,
                    accuracy = result.accuracy,
                    "round finished"
                );
                for standing in session.standings(now) {
                    info!(
                        nickname = %standing.nickname,
                        position = standing.position,
                        wpm = standing.wpm,
                        me = standing.is_self,
                        "standing"
                    );
                }
                if session.is_owner() {
                    info!("press Enter to start a new round");
                }
                result_reported = true;
            }
            None => result_reported = false,
            _ => {}
        }
    }

    Ok(())
}

pub(crate) fn is_quit(key: &KeyEvent) -> bool {
    key.code == KeyCode::Esc
        || (key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c'))
}

/// Enter starts the round from the waiting phase and restarts it from the
/// finished phase; both are owner-only. Start prefers the room channel and
/// falls back to the request/response interface while the channel is down.
async fn handle_enter<A: RoomApi>(
    api: &A,
    channel: &ChannelHandle,
    session: &mut RaceSession,
    now: DateTime<Utc>,
    rng: &mut StdRng,
) {
    match session.phase() {
        RacePhase::Waiting => match session.request_start() {
            Ok(command) => {
                if channel.is_connected() {
                    channel.publish(command).await;
                } else {
                    match api.start_game(session.room().id).await {
                        Ok(room) => {
                            session.apply(ServerEvent::GameStarted(room), now);
                        }
                        Err(e) => warn!("start request failed: {}", e),
                    }
                }
            }
            Err(e) => info!("{}", e),
        },
        RacePhase::Finished => {
            let word_count = session.room().text.split_whitespace().count().max(1);
            let new_text = words::generate_words(word_count, rng);
            match session.request_restart(new_text) {
                Ok(command) => channel.publish(command).await,
                Err(e) => info!("{}", e),
            }
        }
        _ => {}
    }
}
