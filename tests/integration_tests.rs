//! Integration tests for the lavo library.
//!
//! The `live_*` tests require OPENAI_API_KEY in the environment and are
//! skipped otherwise. The rest run a full session against a local server
//! speaking the streaming chat completion protocol.

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use lavo::chat::{API_KEY_ENV, ChatSession, SessionConfig};
    use lavo::{ApiKey, Role, Turn, TurnOutcome};

    fn chunk(content: &str) -> String {
        let body = serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 1,
            "model": "gpt-4o-mini",
            "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}],
        });
        format!("data: {body}\n\n")
    }

    /// Serves one HTTP response with the given SSE body and returns the base URL.
    async fn serve_sse(body: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 8192];
            let mut received = Vec::new();
            while !String::from_utf8_lossy(&received).contains("\"stream\":true") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n{body}"
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{addr}/v1/")
    }

    fn local_config(base_url: String) -> SessionConfig {
        SessionConfig::new()
            .with_api_key("sk-local")
            .with_base_url(base_url)
    }

    #[tokio::test]
    async fn session_streams_from_local_server() {
        let body = format!(
            "{}{}{}data: [DONE]\n\n",
            chunk("Ol"),
            chunk("á, "),
            chunk("mundo")
        );
        let base_url = serve_sse(body).await;
        let mut session = ChatSession::new(local_config(base_url)).unwrap();

        let mut turn = session.submit_user_message("Oi").await.unwrap().unwrap();
        let mut snapshots = Vec::new();
        while let Some(buffer) = turn.next().await {
            snapshots.push(buffer);
        }
        let outcome = turn.finish().await;

        assert_eq!(snapshots, vec!["Ol", "Olá, ", "Olá, mundo"]);
        assert!(outcome.is_completed());
        assert_eq!(session.message_count(), 3);
        assert_eq!(session.log().last(), Some(&Turn::assistant("Olá, mundo")));
    }

    #[tokio::test]
    async fn provider_error_keeps_partial_answer() {
        let body = format!(
            "{}{}data: {{\"error\": {{\"message\": \"The server had an error\", \"type\": \"server_error\"}}}}\n\n",
            chunk("Par"),
            chunk("ci"),
        );
        let base_url = serve_sse(body).await;
        let mut session = ChatSession::new(local_config(base_url)).unwrap();

        let outcome = session
            .submit_user_message("Oi")
            .await
            .unwrap()
            .unwrap()
            .finish()
            .await;
        match outcome {
            TurnOutcome::Failed { partial, cause } => {
                assert_eq!(partial, "Parci");
                assert!(cause.is_streaming());
            }
            TurnOutcome::Completed(text) => panic!("expected a failure, got {text:?}"),
        }
        let roles: Vec<Role> = session.log().turns().iter().map(|turn| turn.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
        assert_eq!(session.log().last(), Some(&Turn::assistant("Parci")));
    }

    #[tokio::test]
    async fn unreachable_provider_is_stream_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut session = ChatSession::new(local_config(format!("http://{addr}/v1/"))).unwrap();
        let outcome = session
            .submit_user_message("Oi")
            .await
            .unwrap()
            .unwrap()
            .finish()
            .await;
        assert!(!outcome.is_completed());
        assert_eq!(outcome.text(), "");
        assert_eq!(session.message_count(), 3);
    }

    #[tokio::test]
    async fn live_streaming_response() {
        let Some(api_key) = ApiKey::from_env(API_KEY_ENV) else {
            eprintln!("Skipping test: {API_KEY_ENV} not set");
            return;
        };

        let config = SessionConfig::new().with_api_key(api_key);
        let mut session = ChatSession::new(config).expect("Failed to create session");

        let outcome = session
            .submit_user_message("Responda apenas: ok")
            .await
            .expect("credential is configured")
            .expect("input is not empty")
            .finish()
            .await;
        assert!(outcome.is_completed(), "Stream should complete");
        assert!(!outcome.text().is_empty());
        assert_eq!(session.message_count(), 3);
    }
}
