//! The boundary between a chat session and the completion service.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;

use crate::error::Result;
use crate::types::ChatCompletionRequest;

/// An ordered stream of assistant text fragments.
///
/// The stream ends on the provider's end marker or when the connection closes.
/// An `Err` item means the exchange failed; nothing after it is meaningful.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A provider credential.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wraps a raw credential.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Reads the credential from an environment variable.
    ///
    /// Unset and blank variables both yield `None`.
    pub fn from_env(var: &str) -> Option<Self> {
        std::env::var(var)
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .map(Self)
    }

    /// The raw secret, for the transport layer.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns true when the credential is blank.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

impl From<String> for ApiKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for ApiKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

/// A streaming chat completion service.
#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Opens a streaming completion for `request`.
    ///
    /// Errors returned here happen before any delta was produced, for example
    /// a refused connection or a non-success HTTP status.
    async fn stream_chat(
        &self,
        api_key: &ApiKey,
        request: ChatCompletionRequest,
    ) -> Result<DeltaStream>;
}

#[async_trait::async_trait]
impl<P: CompletionProvider + ?Sized> CompletionProvider for Arc<P> {
    async fn stream_chat(
        &self,
        api_key: &ApiKey,
        request: ChatCompletionRequest,
    ) -> Result<DeltaStream> {
        (**self).stream_chat(api_key, request).await
    }
}
