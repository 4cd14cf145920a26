//! Request/response interface to the backend: room creation, joining, lookup
//! and game start. One short-lived connection per request; any transport or
//! decode failure surfaces as `FetchFailed`.

use tokio::net::TcpStream;
use uuid::Uuid;

use typerace_common::error::RaceError;
use typerace_common::protocol::{
    framed_transport, recv_message, send_message, ApiRequest, ApiResponse,
};
use typerace_common::room::{Player, Room};

/// The backend operations the client consumes. Implemented over the wire in
/// production and by fakes in tests. Only used with static dispatch.
#[allow(async_fn_in_trait)]
pub trait RoomApi {
    async fn create_room(&self, nickname: &str, text: Option<String>) -> Result<Room, RaceError>;
    async fn join_room(&self, nickname: &str, code: &str) -> Result<Player, RaceError>;
    async fn room_by_code(&self, code: &str) -> Result<Room, RaceError>;
    async fn start_game(&self, room_id: Uuid) -> Result<Room, RaceError>;
}

pub struct TcpRoomApi {
    addr: String,
}

impl TcpRoomApi {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    async fn request(&self, request: &ApiRequest) -> Result<ApiResponse, RaceError> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| RaceError::FetchFailed(e.to_string()))?;
        let mut transport = framed_transport(stream);
        send_message(&mut transport, request)
            .await
            .map_err(|e| RaceError::FetchFailed(e.to_string()))?;
        match recv_message::<ApiResponse>(&mut transport).await {
            Ok(Some(response)) => Ok(response),
            Ok(None) => Err(RaceError::FetchFailed(
                "connection closed before response".into(),
            )),
            Err(e) => Err(RaceError::FetchFailed(e.to_string())),
        }
    }

    async fn expect_room(&self, request: &ApiRequest) -> Result<Room, RaceError> {
        match self.request(request).await? {
            ApiResponse::Room(room) => Ok(room),
            ApiResponse::Error { message, .. } => Err(RaceError::Backend(message)),
            other => Err(RaceError::FetchFailed(format!(
                "unexpected response: {:?}",
                other
            ))),
        }
    }
}

impl RoomApi for TcpRoomApi {
    async fn create_room(&self, nickname: &str, text: Option<String>) -> Result<Room, RaceError> {
        self.expect_room(&ApiRequest::CreateRoom {
            nickname: nickname.to_string(),
            text,
        })
        .await
    }

    async fn join_room(&self, nickname: &str, code: &str) -> Result<Player, RaceError> {
        let request = ApiRequest::JoinRoom {
            nickname: nickname.to_string(),
            code: code.to_string(),
        };
        match self.request(&request).await? {
            ApiResponse::Player(player) => Ok(player),
            ApiResponse::Error { message, .. } => Err(RaceError::Backend(message)),
            other => Err(RaceError::FetchFailed(format!(
                "unexpected response: {:?}",
                other
            ))),
        }
    }

    async fn room_by_code(&self, code: &str) -> Result<Room, RaceError> {
        self.expect_room(&ApiRequest::RoomByCode {
            code: code.to_string(),
        })
        .await
    }

    async fn start_game(&self, room_id: Uuid) -> Result<Room, RaceError> {
        self.expect_room(&ApiRequest::StartGame { room_id }).await
    }
}
