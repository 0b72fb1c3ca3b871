//! REST client for room lists and message history.

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use spotter_proto::{
    ProtocolError,
    payloads::{ApiChatRoom, InboundMessage, ListResponse},
};

use crate::{error::ChatError, transform::sort_by_timestamp};

/// Chat room REST endpoints.
#[derive(Debug, Clone)]
pub struct HistoryApi {
    client: Client,
    base_url: String,
}

impl HistoryApi {
    /// Client for the endpoints under `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Client reusing an existing `reqwest` client.
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// Base URL without trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Rooms the user takes part in.
    pub async fn list_rooms(&self, token: &str) -> Result<Vec<ApiChatRoom>, ChatError> {
        let body = execute(self.client.get(self.url("/chat-rooms/list")).bearer_auth(token)).await?;
        parse_list(&body)
    }

    /// Message history of `room_id`, oldest first.
    pub async fn room_messages(
        &self,
        token: &str,
        room_id: &str,
    ) -> Result<Vec<InboundMessage>, ChatError> {
        let request = self
            .client
            .get(self.url("/chat-rooms/message"))
            .query(&[("roomId", room_id)])
            .bearer_auth(token);
        let mut messages: Vec<InboundMessage> = parse_list(&execute(request).await?)?;
        sort_by_timestamp(&mut messages);
        Ok(messages)
    }

    /// Create (or fetch) the direct room with `other_member_id`.
    pub async fn create_room(
        &self,
        token: &str,
        other_member_id: i64,
    ) -> Result<ApiChatRoom, ChatError> {
        let request = self
            .client
            .post(self.url("/chat-rooms/create"))
            .query(&[("otherMemberId", other_member_id)])
            .bearer_auth(token);
        parse_json(&execute(request).await?)
    }

    /// Leave `room_id`.
    pub async fn leave_room(&self, token: &str, room_id: &str) -> Result<(), ChatError> {
        let url = self.url(&format!("/chat-rooms/leave/{room_id}"));
        execute(self.client.post(url).bearer_auth(token)).await?;
        Ok(())
    }

    /// Mark every message in `room_id` as read.
    pub async fn mark_all_read(&self, token: &str, room_id: &str) -> Result<(), ChatError> {
        let url = self.url(&format!("/chat-rooms/read-all/{room_id}"));
        execute(self.client.post(url).bearer_auth(token)).await?;
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

/// Send `request` and return the body of a successful response.
async fn execute(request: RequestBuilder) -> Result<String, ChatError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        tracing::warn!(status = status.as_u16(), "chat api request failed");
        return Err(ChatError::Http { status: status.as_u16(), body });
    }
    Ok(body)
}

fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T, ChatError> {
    serde_json::from_str(body).map_err(|e| ChatError::Protocol(ProtocolError::from(e)))
}

/// Items of a paged or bare-array list response.
fn parse_list<T: DeserializeOwned>(body: &str) -> Result<Vec<T>, ChatError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    parse_json::<ListResponse<T>>(body).map(ListResponse::into_items)
}
