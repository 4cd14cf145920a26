use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use uuid::Uuid;

use crate::room::{Player, Room};

// -- Framing --

pub type Transport = Framed<TcpStream, LengthDelimitedCodec>;

pub fn framed_transport(stream: TcpStream) -> Transport {
    LengthDelimitedCodec::builder()
        .max_frame_length(64 * 1024)
        .new_framed(stream)
}

// -- Room channel: inbound messages --

/// Message kinds published on a room topic. Kinds this client does not know
/// parse to `Unknown` and are ignored rather than treated as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    RoomUpdate,
    GameStarted,
    PlayerProgress,
    PlayerJoined,
    PlayerLeft,
    PlayerFinished,
    GameOver,
    GameRestart,
    Unknown,
}

impl MessageKind {
    pub fn parse(kind: &str) -> Self {
        match kind {
            "ROOM_UPDATE" => MessageKind::RoomUpdate,
            "GAME_STARTED" => MessageKind::GameStarted,
            "PLAYER_PROGRESS" => MessageKind::PlayerProgress,
            "PLAYER_JOINED" => MessageKind::PlayerJoined,
            "PLAYER_LEFT" => MessageKind::PlayerLeft,
            "PLAYER_FINISHED" => MessageKind::PlayerFinished,
            "GAME_OVER" => MessageKind::GameOver,
            "GAME_RESTART" => MessageKind::GameRestart,
            _ => MessageKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::RoomUpdate => "ROOM_UPDATE",
            MessageKind::GameStarted => "GAME_STARTED",
            MessageKind::PlayerProgress => "PLAYER_PROGRESS",
            MessageKind::PlayerJoined => "PLAYER_JOINED",
            MessageKind::PlayerLeft => "PLAYER_LEFT",
            MessageKind::PlayerFinished => "PLAYER_FINISHED",
            MessageKind::GameOver => "GAME_OVER",
            MessageKind::GameRestart => "GAME_RESTART",
            MessageKind::Unknown => "UNKNOWN",
        }
    }
}

/// Wire envelope for every message on a room topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Value,
    pub room_id: Uuid,
    /// The player who initiated the action, if applicable.
    #[serde(default)]
    pub player_id: Option<Uuid>,
}

/// Progress fields relayed for one player mid-round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub player_id: Uuid,
    pub current_position: usize,
    pub wpm: u16,
    pub accuracy: f64,
}

/// Typed view of an inbound envelope.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    RoomUpdate(Room),
    GameStarted(Room),
    PlayerProgress(ProgressUpdate),
    PlayerJoined(Room),
    PlayerLeft(Room),
    PlayerFinished(Player),
    GameOver,
    GameRestart(Room),
}

impl Envelope {
    pub fn message_kind(&self) -> MessageKind {
        MessageKind::parse(&self.kind)
    }

    /// Decode the typed event. `Ok(None)` for kinds this client does not
    /// recognize.
    pub fn decode(&self) -> Result<Option<ServerEvent>, ProtocolError> {
        let kind = self.message_kind();
        let event = match kind {
            MessageKind::RoomUpdate => ServerEvent::RoomUpdate(self.payload_as(kind)?),
            MessageKind::GameStarted => ServerEvent::GameStarted(self.payload_as(kind)?),
            MessageKind::PlayerProgress => ServerEvent::PlayerProgress(self.payload_as(kind)?),
            MessageKind::PlayerJoined => ServerEvent::PlayerJoined(self.payload_as(kind)?),
            MessageKind::PlayerLeft => ServerEvent::PlayerLeft(self.payload_as(kind)?),
            MessageKind::PlayerFinished => ServerEvent::PlayerFinished(self.payload_as(kind)?),
            MessageKind::GameOver => ServerEvent::GameOver,
            MessageKind::GameRestart => ServerEvent::GameRestart(self.payload_as(kind)?),
            MessageKind::Unknown => return Ok(None),
        };
        Ok(Some(event))
    }

    fn payload_as<T: DeserializeOwned>(&self, kind: MessageKind) -> Result<T, ProtocolError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|source| ProtocolError::BadPayload { kind, source })
    }
}

// -- Room channel: outbound frames --

pub fn room_topic(room_id: Uuid) -> String {
    format!("/topic/room/{room_id}")
}

/// Client -> server frames on the room channel connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChannelFrame {
    Subscribe { destination: String },
    Publish { destination: String, body: Value },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub room_id: Uuid,
    pub player_id: Uuid,
    pub current_position: usize,
    pub wpm: u16,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub room_id: Uuid,
    pub player_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartRequest {
    pub room_id: Uuid,
    pub new_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishReport {
    pub room_id: Uuid,
    pub player_id: Uuid,
    pub wpm: u16,
    pub accuracy: f64,
}

/// Everything the client publishes during a session, with its destination.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    Progress(ProgressReport),
    StartGame(StartRequest),
    Restart(RestartRequest),
    Finish(FinishReport),
}

impl ClientCommand {
    pub fn destination(&self) -> &'static str {
        match self {
            ClientCommand::Progress(_) => "/app/game/progress",
            ClientCommand::StartGame(_) => "/app/game/start",
            ClientCommand::Restart(_) => "/app/game/restart",
            ClientCommand::Finish(_) => "/app/game/finish",
        }
    }

    pub fn to_frame(&self) -> Result<ChannelFrame, serde_json::Error> {
        let body = match self {
            ClientCommand::Progress(report) => serde_json::to_value(report)?,
            ClientCommand::StartGame(request) => serde_json::to_value(request)?,
            ClientCommand::Restart(request) => serde_json::to_value(request)?,
            ClientCommand::Finish(report) => serde_json::to_value(report)?,
        };
        Ok(ChannelFrame::Publish {
            destination: self.destination().to_string(),
            body,
        })
    }
}

// -- Request/response interface --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ApiRequest {
    CreateRoom {
        nickname: String,
        /// Omitted means the server (or caller) generates a passage.
        text: Option<String>,
    },
    JoinRoom {
        nickname: String,
        code: String,
    },
    RoomByCode {
        code: String,
    },
    StartGame {
        room_id: Uuid,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ApiResponse {
    Room(Room),
    Player(Player),
    Error { code: ApiErrorCode, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiErrorCode {
    RoomNotFound,
    RoomFull,
    GameAlreadyStarted,
    NameTaken,
    InternalError,
}

// -- Serialization helpers --

pub fn serialize_message<T: Serialize>(msg: &T) -> Result<Bytes, serde_json::Error> {
    let json = serde_json::to_vec(msg)?;
    Ok(Bytes::from(json))
}

pub fn deserialize_message<T: DeserializeOwned>(data: &[u8]) -> Result<T, serde_json::Error> {
    serde_json::from_slice(data)
}

// -- Transport helpers --

pub async fn send_message<T: Serialize>(transport: &mut Transport, msg: &T) -> anyhow::Result<()> {
    let bytes = serialize_message(msg).map_err(|e| anyhow::anyhow!("serialize error: {}", e))?;
    transport
        .send(bytes)
        .await
        .map_err(|e| anyhow::anyhow!("send error: {}", e))
}

pub async fn recv_message<T: DeserializeOwned>(
    transport: &mut Transport,
) -> anyhow::Result<Option<T>> {
    match transport.next().await {
        Some(Ok(frame)) => {
            let msg = deserialize_message(&frame)
                .map_err(|e| anyhow::anyhow!("deserialize error: {}", e))?;
            Ok(Some(msg))
        }
        Some(Err(e)) => Err(anyhow::anyhow!("recv error: {}", e)),
        None => Ok(None),
    }
}

// -- Errors --

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed {kind:?} payload: {source}")]
    BadPayload {
        kind: MessageKind,
        #[source]
        source: serde_json::Error,
    },
}
