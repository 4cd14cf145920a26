use std::time::Duration;

use crossterm::event::{Event, EventStream, KeyEvent};
use futures::StreamExt;
use tokio::sync::mpsc;

use typerace_common::protocol::Envelope;

/// Tick granularity for the countdown, round deadline, debounce and idle
/// timers.
pub const TICK_MS: u64 = 50;

#[derive(Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Network(Envelope),
    Tick,
}

pub async fn event_loop(
    mut network_rx: mpsc::Receiver<Envelope>,
    event_tx: mpsc::Sender<AppEvent>,
) {
    let mut key_stream = EventStream::new();
    let mut tick_interval = tokio::time::interval(Duration::from_millis(TICK_MS));

    loop {
        let event = tokio::select! {
            Some(Ok(Event::Key(key))) = key_stream.next() => {
                AppEvent::Key(key)
            }
            Some(envelope) = network_rx.recv() => {
                AppEvent::Network(envelope)
            }
            _ = tick_interval.tick() => {
                AppEvent::Tick
            }
        };

        if event_tx.send(event).await.is_err() {
            break;
        }
    }
}
