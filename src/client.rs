use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::StreamExt;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response};
use url::Url;

use crate::client_logger::ClientLogger;
use crate::error::{Error, Result};
use crate::observability::{
    CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS, STREAM_BYTES,
};
use crate::provider::{ApiKey, CompletionProvider, DeltaStream};
use crate::sse::process_sse;
use crate::types::{ChatCompletionRequest, ProviderErrorBody};

/// Default endpoint root for OpenAI-compatible chat completions.
pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/";

/// Client for OpenAI-compatible streaming chat completion endpoints.
///
/// No request timeout is set unless one is given to [`OpenAi::with_options`];
/// streams run for as long as the transport keeps them open.
#[derive(Clone)]
pub struct OpenAi {
    client: ReqwestClient,
    base_url: Url,
    timeout: Option<Duration>,
    logger: Option<Arc<dyn ClientLogger>>,
}

impl OpenAi {
    /// Create a new client for the default endpoint.
    pub fn new() -> Result<Self> {
        Self::with_options(None, None)
    }

    /// Create a new client with custom settings.
    ///
    /// `base_url` must be an absolute URL; a trailing slash is added when
    /// missing so that relative endpoint paths resolve beneath it.
    pub fn with_options(base_url: Option<&str>, timeout: Option<Duration>) -> Result<Self> {
        let base_url = parse_base_url(base_url.unwrap_or(DEFAULT_API_URL))?;

        let mut builder = ReqwestClient::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            Error::http_client(
                format!("Failed to build HTTP client: {e}"),
                Some(Box::new(e)),
            )
        })?;

        Ok(Self {
            client,
            base_url,
            timeout,
            logger: None,
        })
    }

    /// Attaches a logger that observes every request and stream chunk.
    pub fn with_logger(mut self, logger: Arc<dyn ClientLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// The endpoint root.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn completions_url(&self) -> Result<Url> {
        Ok(self.base_url.join("chat/completions")?)
    }

    /// Create and return default headers for streaming requests.
    fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );
        headers
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();

        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|val| val.to_str().ok())
            .map(String::from);

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {e}"),
                    Some(Box::new(e)),
                );
            }
        };

        let detail = serde_json::from_str::<ProviderErrorBody>(&error_body)
            .ok()
            .map(|body| body.error);
        let error_type = detail.as_ref().and_then(|d| d.error_type.clone());
        let error_param = detail.as_ref().and_then(|d| d.param.clone());
        let error_message = detail
            .and_then(|d| d.message)
            .unwrap_or_else(|| error_body.clone());

        match status_code {
            400 => Error::bad_request(error_message, error_param),
            401 => Error::authentication(error_message),
            403 => Error::permission(error_message),
            404 => Error::not_found(error_message, None, None),
            408 => Error::timeout(error_message, None),
            429 => Error::rate_limit(error_message, retry_after),
            500 => Error::internal_server(error_message, request_id),
            502..=504 => Error::service_unavailable(error_message, retry_after),
            _ => Error::api(status_code, error_type, error_message, request_id),
        }
    }

    async fn open_stream(
        &self,
        api_key: &ApiKey,
        request: &ChatCompletionRequest,
    ) -> Result<Response> {
        let url = self.completions_url()?;
        let response = self
            .client
            .post(url)
            .headers(Self::default_headers())
            .bearer_auth(api_key.expose())
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::timeout(
                        format!("Request timed out: {e}"),
                        self.timeout.map(|t| t.as_secs_f64()),
                    )
                } else if e.is_connect() {
                    Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
                } else {
                    Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
                }
            })?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl CompletionProvider for OpenAi {
    /// Send a streaming chat completion request.
    ///
    /// Returns the text deltas of the first choice in arrival order. Chunks
    /// without content (the role preamble, the finish chunk) yield nothing.
    async fn stream_chat(
        &self,
        api_key: &ApiKey,
        request: ChatCompletionRequest,
    ) -> Result<DeltaStream> {
        let mut request = request;
        request.stream = true;

        CLIENT_REQUESTS.click();
        if let Some(logger) = &self.logger {
            logger.log_request(&request);
        }

        let start = Instant::now();
        let response = match self.open_stream(api_key, &request).await {
            Ok(response) => response,
            Err(err) => {
                CLIENT_REQUEST_ERRORS.click();
                if let Some(logger) = &self.logger {
                    logger.log_stream_error(&err);
                }
                return Err(err);
            }
        };
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());

        let bytes = response.bytes_stream().inspect(|chunk| {
            if let Ok(bytes) = chunk {
                STREAM_BYTES.count(bytes.len() as u64);
            }
        });

        let logger = self.logger.clone();
        let deltas = process_sse(bytes).filter_map(move |event| {
            let delta = match event {
                Ok(chunk) => {
                    if let Some(logger) = &logger {
                        logger.log_stream_chunk(&chunk);
                    }
                    chunk.into_content().map(Ok)
                }
                Err(err) => {
                    if let Some(logger) = &logger {
                        logger.log_stream_error(&err);
                    }
                    Some(Err(err))
                }
            };
            futures::future::ready(delta)
        });

        Ok(Box::pin(deltas))
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let mut raw = raw.trim().to_string();
    if !raw.ends_with('/') {
        raw.push('/');
    }
    let url = Url::parse(&raw)?;
    if url.cannot_be_a_base() {
        return Err(Error::url(
            format!("base URL cannot be a base: {raw}"),
            None,
        ));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client_logger::JsonLinesLogger;
    use crate::types::{KnownModel, Model, Turn};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn client_creation() {
        let client = OpenAi::new().unwrap();
        assert_eq!(client.base_url.as_str(), DEFAULT_API_URL);
        assert_eq!(client.timeout, None);

        let client = OpenAi::with_options(
            Some("https://llm.example.com/openai/v1"),
            Some(Duration::from_secs(30)),
        )
        .unwrap();
        assert_eq!(client.base_url.as_str(), "https://llm.example.com/openai/v1/");
        assert_eq!(
            client.completions_url().unwrap().as_str(),
            "https://llm.example.com/openai/v1/chat/completions"
        );
        assert_eq!(client.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn invalid_base_url() {
        let err = OpenAi::with_options(Some("not a url"), None).err().unwrap();
        assert!(matches!(err, Error::Url { .. }));
    }

    fn request() -> ChatCompletionRequest {
        ChatCompletionRequest::new(
            Model::Known(KnownModel::Gpt4oMini),
            vec![Turn::system("Seja breve."), Turn::user("Oi")],
            0.2,
        )
    }

    /// Serves exactly one HTTP exchange with a canned response and hands back
    /// the raw request it received.
    async fn serve_once(response: String) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
                if request_complete(&received) {
                    break;
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8(received).unwrap()
        });
        (format!("http://{addr}/v1/"), handle)
    }

    fn request_complete(received: &[u8]) -> bool {
        let text = String::from_utf8_lossy(received);
        let Some((head, body)) = text.split_once("\r\n\r\n") else {
            return false;
        };
        let length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                if name.eq_ignore_ascii_case("content-length") {
                    value.trim().parse::<usize>().ok()
                } else {
                    None
                }
            })
            .unwrap_or(0);
        body.len() >= length
    }

    fn sse_response(body: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    }

    #[tokio::test]
    async fn streams_deltas_from_server() {
        let body = concat!(
            "data: {\"id\":\"c\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"id\":\"c\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Ol\"}}]}\n\n",
            "data: {\"id\":\"c\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"á, \"}}]}\n\n",
            "data: {\"id\":\"c\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"mundo\"}}]}\n\n",
            "data: {\"id\":\"c\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        );
        let (base_url, server) = serve_once(sse_response(body)).await;

        let logger = Arc::new(JsonLinesLogger::new(Vec::new()));
        let client = OpenAi::with_options(Some(&base_url), None)
            .unwrap()
            .with_logger(logger.clone());
        let deltas: Vec<String> = client
            .stream_chat(&ApiKey::new("sk-test"), request())
            .await
            .unwrap()
            .map(|delta| delta.unwrap())
            .collect()
            .await;
        assert_eq!(deltas, vec!["Ol", "á, ", "mundo"]);

        let received = server.await.unwrap();
        assert!(received.starts_with("POST /v1/chat/completions "));
        let lowered = received.to_lowercase();
        assert!(lowered.contains("authorization: bearer sk-test"));
        assert!(lowered.contains("accept: text/event-stream"));
        let (_, body) = received.split_once("\r\n\r\n").unwrap();
        let sent: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(sent["model"], "gpt-4o-mini");
        assert_eq!(sent["stream"], true);
        assert_eq!(sent["messages"][0]["role"], "system");
        assert_eq!(sent["messages"][1]["content"], "Oi");

        drop(client);
        let logger = Arc::try_unwrap(logger).ok().unwrap();
        let log = String::from_utf8(logger.into_inner()).unwrap();
        assert!(!log.contains("sk-test"));
        assert_eq!(log.lines().count(), 6);
    }

    #[tokio::test]
    async fn maps_http_errors() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error","param":null,"code":"invalid_api_key"}}"#;
        let response = format!(
            "HTTP/1.1 401 Unauthorized\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let (base_url, server) = serve_once(response).await;

        let client = OpenAi::with_options(Some(&base_url), None).unwrap();
        let err = client
            .stream_chat(&ApiKey::new("sk-wrong"), request())
            .await
            .err()
            .unwrap();
        assert!(err.is_authentication());
        assert_eq!(
            err.to_string(),
            "Authentication error: Incorrect API key provided"
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn connection_refused_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = OpenAi::with_options(Some(&format!("http://{addr}/v1/")), None).unwrap();
        let err = client
            .stream_chat(&ApiKey::new("sk-test"), request())
            .await
            .err()
            .unwrap();
        assert!(err.is_connection());
    }
}
