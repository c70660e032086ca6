//! Demo endpoints served behind the rate limiter.

use std::fmt;
use std::time::Duration;

use axum::{
    body::{self, Body},
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use rand::Rng;
use serde::de::{Deserializer, IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use tracing::trace;

use super::jsonapi::{self, Document, Resource};
use super::GatewayState;
use crate::config::HandlerConfig;
use crate::error::HandlerError;

/// Content type of the JSON echo endpoint.
pub const JSON_MEDIA_TYPE: &str = "application/json";

/// Payload accepted by `/api3`.
///
/// Field names are matched case-insensitively; missing or `null` fields are
/// empty and unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Message {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Text")]
    pub text: String,
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct MessageVisitor;

        impl<'de> Visitor<'de> for MessageVisitor {
            type Value = Message;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a message object")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Message, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut message = Message::default();
                while let Some(key) = map.next_key::<String>()? {
                    let field = if key.eq_ignore_ascii_case("name") {
                        &mut message.name
                    } else if key.eq_ignore_ascii_case("text") {
                        &mut message.text
                    } else {
                        map.next_value::<IgnoredAny>()?;
                        continue;
                    };
                    if let Some(value) = map.next_value::<Option<String>>()? {
                        *field = value;
                    }
                }
                Ok(message)
            }
        }

        deserializer.deserialize_map(MessageVisitor)
    }
}

impl Resource for Message {
    const TYPE: &'static str = "messages";
}

/// `GET /api1`: wait, then answer `done`.
pub async fn api1(State(state): State<GatewayState>) -> &'static str {
    simulate_work(&state.config.handlers).await;
    "done"
}

/// `POST /api2`: echo the JSON body back, re-indented.
pub async fn api2(
    State(state): State<GatewayState>,
    body: Body,
) -> Result<Response, HandlerError> {
    simulate_work(&state.config.handlers).await;

    let bytes = body::to_bytes(body, state.config.server.max_body_bytes).await?;
    let value: serde_json::Value = serde_json::from_slice(&bytes)?;
    let encoded = indent_json(&value)?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, JSON_MEDIA_TYPE)],
        encoded,
    )
        .into_response())
}

/// `POST /api3`: decode a [`Message`] and return it as a JSON:API document.
pub async fn api3(
    State(state): State<GatewayState>,
    body: Body,
) -> Result<Response, HandlerError> {
    simulate_work(&state.config.handlers).await;

    let bytes = body::to_bytes(body, state.config.server.max_body_bytes).await?;
    let message: Message = serde_json::from_slice(&bytes)?;
    let encoded = Document::new(message).to_vec()?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, jsonapi::MEDIA_TYPE)],
        encoded,
    )
        .into_response())
}

/// Fallback for unknown paths.
pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}

async fn simulate_work(config: &HandlerConfig) {
    let delay = processing_delay(config);
    if !delay.is_zero() {
        trace!(delay_ms = delay.as_millis() as u64, "simulating work");
        tokio::time::sleep(delay).await;
    }
}

/// Random delay in `[min_delay_ms, max_delay_ms)`, or the minimum when the range is empty.
fn processing_delay(config: &HandlerConfig) -> Duration {
    if config.max_delay_ms <= config.min_delay_ms {
        return Duration::from_millis(config.min_delay_ms);
    }
    let millis = rand::thread_rng().gen_range(config.min_delay_ms..config.max_delay_ms);
    Duration::from_millis(millis)
}

/// Tab-indented JSON with every line after the first prefixed by one space.
fn indent_json(value: &serde_json::Value) -> Result<Vec<u8>, serde_json::Error> {
    let mut out = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"\t"));
    value.serialize(&mut serializer)?;

    // Raw newlines only appear between tokens; string contents are escaped.
    let mut prefixed = Vec::with_capacity(out.len() + out.len() / 8);
    for byte in out {
        prefixed.push(byte);
        if byte == b'\n' {
            prefixed.push(b' ');
        }
    }
    Ok(prefixed)
}
