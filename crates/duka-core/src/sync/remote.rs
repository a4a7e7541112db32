//! Remote API boundary: the trait the engine pushes through and its HTTP client.

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::RemoteConfig;
use crate::models::{EntityPayload, EntityType, LocalId, ServerId};

/// Server acknowledgement of a create or update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteAck {
    pub server_id: ServerId,
    /// Server-side last modification (Unix ms)
    pub last_modified_at: i64,
}

/// Current server representation of an entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSnapshot {
    pub server_id: ServerId,
    pub payload: EntityPayload,
    pub last_modified_at: i64,
}

/// How the engine should treat a failed call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Keep the entry queued and try again later
    Retryable,
    /// Drop the entry; retrying cannot help
    Permanent,
    /// The server holds a diverging version
    Conflict,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("{message}")]
    Status { status: u16, message: String },
    #[error("invalid response: {0}")]
    Decode(String),
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

impl RemoteError {
    /// Non-success HTTP status with a message.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn classify(&self) -> FailureClass {
        match self {
            Self::Timeout | Self::Network(_) => FailureClass::Retryable,
            Self::Decode(_) => FailureClass::Permanent,
            Self::Status { status, .. } => match *status {
                409 => FailureClass::Conflict,
                429 | 500..=599 => FailureClass::Retryable,
                _ => FailureClass::Permanent,
            },
        }
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.classify(), FailureClass::Retryable)
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Network(error.to_string())
        }
    }
}

/// Header carrying the record's local id on creates
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// The four calls the engine needs per entity type.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Create the entity remotely.
    ///
    /// `local_id` is an idempotency key: a create repeated with the same key
    /// must return the first acknowledgement instead of a second entity.
    async fn create(&self, local_id: &LocalId, payload: &EntityPayload)
        -> RemoteResult<RemoteAck>;

    async fn update(&self, server_id: ServerId, payload: &EntityPayload)
        -> RemoteResult<RemoteAck>;

    async fn delete(&self, entity_type: EntityType, server_id: ServerId) -> RemoteResult<()>;

    async fn get(&self, entity_type: EntityType, server_id: ServerId)
        -> RemoteResult<RemoteSnapshot>;
}

/// JSON-over-HTTP implementation of [`RemoteApi`].
#[derive(Clone)]
pub struct HttpRemoteApi {
    base_url: String,
    api_token: Option<String>,
    client: reqwest::Client,
}

impl HttpRemoteApi {
    pub fn new(config: &RemoteConfig) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(RemoteError::from)?;
        Ok(Self {
            base_url: config.base_url.clone(),
            api_token: config.api_token.clone(),
            client,
        })
    }

    fn collection_url(&self, entity_type: EntityType) -> String {
        format!("{}/{}", self.base_url, entity_type.collection())
    }

    fn item_url(&self, entity_type: EntityType, server_id: ServerId) -> String {
        format!("{}/{}", self.collection_url(entity_type), server_id.0)
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<Response> {
        let request = match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.header("Accept", "application/json").send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::status(
                status.as_u16(),
                parse_api_error(status, &body),
            ));
        }
        Ok(response)
    }

    async fn read_ack(response: Response) -> RemoteResult<RemoteAck> {
        let body = response.bytes().await?;
        let ack: AckBody =
            serde_json::from_slice(&body).map_err(|error| RemoteError::Decode(error.to_string()))?;
        Ok(RemoteAck {
            server_id: ServerId(ack.id),
            last_modified_at: ack.last_modified_at,
        })
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn create(
        &self,
        local_id: &LocalId,
        payload: &EntityPayload,
    ) -> RemoteResult<RemoteAck> {
        let body = encode(payload)?;
        let response = self
            .send(
                self.client
                    .post(self.collection_url(payload.entity_type()))
                    .header(IDEMPOTENCY_HEADER, local_id.to_string())
                    .json(&body),
            )
            .await?;
        Self::read_ack(response).await
    }

    async fn update(
        &self,
        server_id: ServerId,
        payload: &EntityPayload,
    ) -> RemoteResult<RemoteAck> {
        let body = encode(payload)?;
        let response = self
            .send(
                self.client
                    .put(self.item_url(payload.entity_type(), server_id))
                    .json(&body),
            )
            .await?;
        Self::read_ack(response).await
    }

    async fn delete(&self, entity_type: EntityType, server_id: ServerId) -> RemoteResult<()> {
        self.send(self.client.delete(self.item_url(entity_type, server_id)))
            .await?;
        Ok(())
    }

    async fn get(
        &self,
        entity_type: EntityType,
        server_id: ServerId,
    ) -> RemoteResult<RemoteSnapshot> {
        let response = self
            .send(self.client.get(self.item_url(entity_type, server_id)))
            .await?;
        let body = response.bytes().await?;
        let value: Value =
            serde_json::from_slice(&body).map_err(|error| RemoteError::Decode(error.to_string()))?;
        decode_snapshot(entity_type, value)
    }
}

#[derive(Debug, Deserialize)]
struct AckBody {
    id: i64,
    #[serde(alias = "updated_at")]
    last_modified_at: i64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn encode(payload: &EntityPayload) -> RemoteResult<Value> {
    payload
        .to_value()
        .map_err(|error| RemoteError::Decode(error.to_string()))
}

/// Split a `GET` body into identifier, timestamp and the typed payload.
fn decode_snapshot(entity_type: EntityType, value: Value) -> RemoteResult<RemoteSnapshot> {
    let Value::Object(mut fields) = value else {
        return Err(RemoteError::Decode("expected a JSON object".into()));
    };

    let server_id = fields
        .remove("id")
        .and_then(|id| id.as_i64())
        .ok_or_else(|| RemoteError::Decode("response did not include id".into()))?;
    let last_modified_at = fields
        .remove("last_modified_at")
        .or_else(|| fields.remove("updated_at"))
        .and_then(|timestamp| timestamp.as_i64())
        .ok_or_else(|| {
            RemoteError::Decode("response did not include last_modified_at/updated_at".into())
        })?;

    let payload = EntityPayload::from_value(entity_type, Value::Object(fields))
        .map_err(|error| RemoteError::Decode(error.to_string()))?;

    Ok(RemoteSnapshot {
        server_id: ServerId(server_id),
        payload,
        last_modified_at,
    })
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", crate::util::compact_text(trimmed), status.as_u16())
    }
}
