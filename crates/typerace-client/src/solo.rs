//! Practice mode: the same race engine without a server. Commands the
//! session emits have nowhere to go and are dropped.

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use typerace_common::room::{GameState, Player, Room};
use typerace_common::words;

use crate::event::{self, AppEvent};
use crate::race::{RaceConfig, RacePhase, RaceSession};
use crate::timer::{Clock, SystemClock};
use crate::typing;

pub async fn run_solo(nickname: String, config: RaceConfig, word_count: usize) -> anyhow::Result<()> {
    let clock = SystemClock;
    let mut rng = StdRng::from_entropy();

    let now = clock.now();
    let player_id = Uuid::new_v4();
    let room = Room {
        id: Uuid::new_v4(),
        code: "SOLO".into(),
        game_state: GameState::InProgress,
        text: words::generate_words(word_count.max(1), &mut rng),
        players: vec![Player::new(player_id, nickname, now)],
        max_players: 1,
        created_by: player_id,
        game_started_at: Some(now),
        created_at: now,
    };
    info!(text = %room.text, "passage");

    let mut session = RaceSession::new(player_id, room, config, now);

    // no room channel in practice mode; keep the sender alive so the event
    // loop just never sees a network event
    let (network_tx, network_rx) = mpsc::channel(1);
    let (event_tx, mut event_rx) = mpsc::channel::<AppEvent>(64);
    tokio::spawn(event::event_loop(network_rx, event_tx));

    let mut last_countdown: Option<i64> = None;

    while let Some(event) = event_rx.recv().await {
        let now = clock.now();
        let commands = match event {
            AppEvent::Key(key) => {
                if crate::app::is_quit(&key) {
                    break;
                }
                match typing::map_key(key) {
                    Some(keystroke) => session.on_key(keystroke, now),
                    None => Vec::new(),
                }
            }
            AppEvent::Network(_) => Vec::new(),
            AppEvent::Tick => session.on_tick(now),
        };
        for command in commands {
            debug!(destination = command.destination(), "dropping offline publish");
        }

        let countdown = session.countdown_remaining(now);
        if countdown != last_countdown {
            if let Some(seconds) = countdown {
                info!("race starts in {}", seconds);
            }
            last_countdown = countdown;
        }

        if session.phase() == RacePhase::Finished {
            if let Some(result) = session.result() {
                info!(
                    wpm = result.wpm,
                    raw_wpm = result.raw_wpm,
                    accuracy = result.accuracy,
                    "practice round finished"
                );
                info!(typed = %session.typed(), "you typed");
            }
            break;
        }
    }

    drop(network_tx);
    Ok(())
}
