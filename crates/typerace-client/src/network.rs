//! Room-channel transport: one persistent framed connection per active room,
//! subscribed to the room topic, with automatic reconnection on a fixed
//! delay. Publishing while disconnected drops the frame with a warning; the
//! race continues on local state either way.

use std::time::Duration;

use futures::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use typerace_common::protocol::{
    deserialize_message, framed_transport, room_topic, send_message, ChannelFrame, ClientCommand,
    Envelope,
};

pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Handle to the room channel. Cheap to clone; dropping every handle (and the
/// inbound receiver) tears the connection task down.
#[derive(Clone)]
pub struct ChannelHandle {
    publish_tx: mpsc::Sender<ChannelFrame>,
    connected: watch::Receiver<bool>,
}

impl ChannelHandle {
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Publish a command to its destination. A no-op with a warning while the
    /// channel is down; callers must not assume delivery.
    pub async fn publish(&self, command: ClientCommand) {
        if !self.is_connected() {
            tracing::warn!(
                destination = command.destination(),
                "room channel not connected, dropping publish"
            );
            return;
        }
        let frame = match command.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("failed to encode publish frame: {}", e);
                return;
            }
        };
        if self.publish_tx.send(frame).await.is_err() {
            tracing::warn!("room channel task is gone, dropping publish");
        }
    }
}

/// Connect to the room channel and return a publish handle plus the inbound
/// message stream. Spawns a supervisor task that keeps reconnecting and
/// re-subscribing until the consumer goes away.
pub fn connect(addr: String, room_id: Uuid) -> (ChannelHandle, mpsc::Receiver<Envelope>) {
    let (publish_tx, publish_rx) = mpsc::channel::<ChannelFrame>(64);
    let (inbound_tx, inbound_rx) = mpsc::channel::<Envelope>(64);
    let (connected_tx, connected_rx) = watch::channel(false);

    tokio::spawn(supervise(addr, room_id, publish_rx, inbound_tx, connected_tx));

    (
        ChannelHandle {
            publish_tx,
            connected: connected_rx,
        },
        inbound_rx,
    )
}

async fn supervise(
    addr: String,
    room_id: Uuid,
    mut publish_rx: mpsc::Receiver<ChannelFrame>,
    inbound_tx: mpsc::Sender<Envelope>,
    connected_tx: watch::Sender<bool>,
) {
    let topic = room_topic(room_id);
    loop {
        match TcpStream::connect(&addr).await {
            Ok(stream) => {
                let mut transport = framed_transport(stream);
                let subscribe = ChannelFrame::Subscribe {
                    destination: topic.clone(),
                };
                if let Err(e) = send_message(&mut transport, &subscribe).await {
                    tracing::warn!("room channel subscribe failed: {}", e);
                } else {
                    tracing::info!(topic = %topic, "room channel connected");
                    let _ = connected_tx.send(true);
                    pump(&mut transport, &mut publish_rx, &inbound_tx).await;
                    let _ = connected_tx.send(false);
                    tracing::warn!("room channel disconnected, reconnecting");
                }
            }
            Err(e) => {
                tracing::warn!("room channel connect failed: {}", e);
            }
        }

        if inbound_tx.is_closed() {
            // consumer went away; no point reconnecting
            return;
        }
        // anything queued while down is abandoned, not flushed on reconnect
        while publish_rx.try_recv().is_ok() {}
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

/// Shovel frames in both directions until the connection drops or the
/// consumer disappears. Inbound envelopes are forwarded in arrival order;
/// malformed frames are dropped, not fatal.
async fn pump(
    transport: &mut typerace_common::protocol::Transport,
    publish_rx: &mut mpsc::Receiver<ChannelFrame>,
    inbound_tx: &mpsc::Sender<Envelope>,
) {
    loop {
        tokio::select! {
            frame = transport.next() => match frame {
                Some(Ok(bytes)) => match deserialize_message::<Envelope>(&bytes) {
                    Ok(envelope) => {
                        if inbound_tx.send(envelope).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("dropping malformed room message: {}", e);
                    }
                },
                Some(Err(e)) => {
                    tracing::warn!("room channel read error: {}", e);
                    return;
                }
                None => {
                    return;
                }
            },
            frame = publish_rx.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = send_message(transport, &frame).await {
                        tracing::warn!("room channel publish failed: {}", e);
                        return;
                    }
                }
                None => {
                    // every publish handle dropped
                    return;
                }
            },
        }
    }
}
