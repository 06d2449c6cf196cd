use serde::{Deserialize, Deserializer, Serialize};

use crate::types::{Model, Turn};

/// Parameters for a streaming chat completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// The model that will complete the conversation.
    pub model: Model,

    /// The full ordered conversation, system turn first.
    pub messages: Vec<Turn>,

    /// Sampling temperature.
    pub temperature: f32,

    /// Always true for requests issued by the session.
    pub stream: bool,
}

impl ChatCompletionRequest {
    /// Create a streaming request for the given conversation.
    pub fn new(model: Model, messages: Vec<Turn>, temperature: f32) -> Self {
        Self {
            model,
            messages,
            temperature,
            stream: true,
        }
    }
}

/// One `data:` frame of a streamed chat completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    /// Identifier shared by every chunk of one completion.
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,

    /// Object type, normally `chat.completion.chunk`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub object: String,

    /// Unix timestamp of creation.
    #[serde(default, deserialize_with = "null_as_default")]
    pub created: u64,

    /// The model that produced the chunk.
    #[serde(default, deserialize_with = "null_as_default")]
    pub model: String,

    /// Incremental choices; the session only reads the first.
    #[serde(default, deserialize_with = "null_as_default")]
    pub choices: Vec<ChunkChoice>,
}

impl ChatCompletionChunk {
    /// Returns the text delta carried by the first choice, if any.
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.content.as_deref())
    }

    /// Consumes the chunk and returns the first choice's text delta, if any.
    pub fn into_content(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
    }
}

/// Deserializes a missing or `null` field as the type's default.
///
/// Some compatible servers send `null` for metadata they do not track.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A single choice within a chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    /// Index of the choice.
    #[serde(default, deserialize_with = "null_as_default")]
    pub index: u32,

    /// Incremental content.
    #[serde(default, deserialize_with = "null_as_default")]
    pub delta: ChunkDelta,

    /// Set on the final chunk of the choice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Incremental message content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkDelta {
    /// Present on the first chunk only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Text fragment, possibly empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Error object reported by the provider, either as an HTTP error body or
/// in-band within the event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderErrorDetail {
    /// Human-readable error message.
    #[serde(default)]
    pub message: Option<String>,

    /// Error type string.
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,

    /// Parameter that caused the error.
    #[serde(default)]
    pub param: Option<String>,

    /// Machine-readable error code.
    #[serde(default)]
    pub code: Option<serde_json::Value>,
}

/// The `{"error": {...}}` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderErrorBody {
    /// The error detail.
    pub error: ProviderErrorDetail,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KnownModel;
    use serde_json::{json, to_value};

    #[test]
    fn request_wire_shape() {
        let request = ChatCompletionRequest::new(
            Model::Known(KnownModel::Gpt4oMini),
            vec![Turn::system("Seja objetivo."), Turn::user("O que é CBS?")],
            0.2,
        );
        assert_eq!(
            to_value(&request).unwrap(),
            json!({
                "model": "gpt-4o-mini",
                "messages": [
                    {"role": "system", "content": "Seja objetivo."},
                    {"role": "user", "content": "O que é CBS?"}
                ],
                "temperature": 0.2f32,
                "stream": true
            })
        );
    }

    #[test]
    fn chunk_with_content() {
        let chunk: ChatCompletionChunk = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 1718000000,
            "model": "gpt-4o-mini",
            "choices": [{"index": 0, "delta": {"content": "Ol"}, "finish_reason": null}]
        }))
        .unwrap();
        assert_eq!(chunk.content(), Some("Ol"));
        assert_eq!(chunk.into_content().as_deref(), Some("Ol"));
    }

    #[test]
    fn chunk_without_content() {
        let role_only: ChatCompletionChunk = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "delta": {"role": "assistant"}}]
        }))
        .unwrap();
        assert_eq!(role_only.content(), None);

        let finished: ChatCompletionChunk = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]
        }))
        .unwrap();
        assert_eq!(finished.content(), None);
        assert_eq!(finished.choices[0].finish_reason.as_deref(), Some("stop"));

        let usage_only: ChatCompletionChunk = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "choices": []
        }))
        .unwrap();
        assert_eq!(usage_only.into_content(), None);
    }

    #[test]
    fn chunk_with_null_metadata() {
        let chunk: ChatCompletionChunk = serde_json::from_value(json!({
            "id": null,
            "object": null,
            "created": null,
            "model": null,
            "choices": [{"index": null, "delta": {"content": "Ol"}}]
        }))
        .unwrap();
        assert_eq!(chunk.id, "");
        assert_eq!(chunk.model, "");
        assert_eq!(chunk.content(), Some("Ol"));

        let null_delta: ChatCompletionChunk = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "delta": null, "finish_reason": "stop"}]
        }))
        .unwrap();
        assert_eq!(null_delta.content(), None);

        let null_choices: ChatCompletionChunk =
            serde_json::from_value(json!({"id": "chatcmpl-1", "choices": null})).unwrap();
        assert!(null_choices.choices.is_empty());
    }

    #[test]
    fn provider_error_body() {
        let body: ProviderErrorBody = serde_json::from_value(json!({
            "error": {
                "message": "Incorrect API key provided",
                "type": "invalid_request_error",
                "param": null,
                "code": "invalid_api_key"
            }
        }))
        .unwrap();
        assert_eq!(
            body.error.message.as_deref(),
            Some("Incorrect API key provided")
        );
        assert_eq!(body.error.error_type.as_deref(), Some("invalid_request_error"));
    }
}
