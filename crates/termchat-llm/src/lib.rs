use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::RETRY_AFTER;
use serde_json::{Value, json};
use std::error::Error as StdError;
use std::io::BufRead;
use std::thread;
use std::time::Duration;
use termchat_core::{
    ChatRequest, LlmConfig, Message, MessageContent, PartKind, StreamCallback, StreamChunk,
};

/// Base delay for network/transport error retries (1s, 2s, 4s exponential backoff).
const NETWORK_RETRY_BASE_MS: u64 = 1000;
/// Upper bound on any single wait between attempts, server hints included.
const MAX_RETRY_DELAY_MS: u64 = 30_000;

/// A source of streamed assistant replies.
pub trait ChatTransport: Send + Sync {
    /// Stream a reply for `req`, invoking `cb` once per content fragment in
    /// arrival order. Returns the concatenated text once the stream ends.
    /// An error after some fragments were delivered means the reply is partial.
    fn stream_chat(&self, req: &ChatRequest, cb: StreamCallback) -> Result<String>;
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    cfg: LlmConfig,
    api_key: String,
    client: Client,
}

impl OpenAiClient {
    pub fn new(cfg: LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .build()?;
        Ok(Self {
            cfg,
            api_key: api_key.into(),
            client,
        })
    }

    fn build_payload(&self, req: &ChatRequest) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(wire_message).collect();
        let mut payload = json!({
            "model": req.model,
            "messages": messages,
            "stream": true,
        });
        if let Some(temp) = self.cfg.temperature {
            payload["temperature"] = json!(temp);
        }
        payload
    }

    fn stream_inner(&self, req: &ChatRequest, cb: StreamCallback) -> Result<String> {
        let payload = self.build_payload(req);

        let mut last_err: Option<anyhow::Error> = None;
        let mut attempt: u8 = 0;
        while attempt <= self.cfg.max_retries {
            let response = self
                .client
                .post(&self.cfg.endpoint)
                .bearer_auth(&self.api_key)
                .json(&payload)
                .send();

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    let retry_after = parse_retry_after_seconds(resp.headers().get(RETRY_AFTER));

                    if status.is_success() {
                        // Once a fragment is out, a failure cannot be retried
                        // without duplicating text on screen.
                        return read_event_stream(std::io::BufReader::new(resp), &cb);
                    }

                    let body = resp.text().unwrap_or_default();
                    last_err = Some(format_api_error(
                        status,
                        &body,
                        attempt,
                        self.cfg.max_retries,
                        &self.cfg.api_key_env,
                    ));
                    if should_retry_status(status) && attempt < self.cfg.max_retries {
                        thread::sleep(retry_delay_ms(self.cfg.retry_base_ms, attempt, retry_after));
                        attempt = attempt.saturating_add(1);
                        continue;
                    }
                    break;
                }
                Err(e) => {
                    last_err = Some(format_transport_error(&e));
                    if should_retry_transport_error(&e) && attempt < self.cfg.max_retries {
                        thread::sleep(retry_delay_ms(NETWORK_RETRY_BASE_MS, attempt, None));
                        attempt = attempt.saturating_add(1);
                        continue;
                    }
                    break;
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow!("chat streaming request failed")))
    }
}

impl ChatTransport for OpenAiClient {
    fn stream_chat(&self, req: &ChatRequest, cb: StreamCallback) -> Result<String> {
        self.stream_inner(req, cb)
    }
}

fn wire_message(message: &Message) -> Value {
    let role = message.role.as_str();
    match &message.content {
        MessageContent::Text(text) => json!({"role": role, "content": text}),
        MessageContent::Parts(parts) => {
            let content: Vec<Value> = parts
                .iter()
                .filter_map(|part| match part.kind {
                    PartKind::Text => part
                        .text
                        .as_ref()
                        .map(|text| json!({"type": "text", "text": text})),
                    PartKind::Image => part
                        .data_uri()
                        .map(|url| json!({"type": "image_url", "image_url": {"url": url}})),
                })
                .collect();
            json!({"role": role, "content": content})
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SseFrame {
    /// Comment, keep-alive, blank line, malformed JSON, or a frame without text.
    Skip,
    Delta(String),
    Done,
    Error(String),
}

fn parse_sse_line(line: &str) -> SseFrame {
    let trimmed = line.trim();
    let Some(chunk) = trimmed.strip_prefix("data:") else {
        return SseFrame::Skip;
    };
    let chunk = chunk.trim();
    if chunk == "[DONE]" {
        return SseFrame::Done;
    }
    let value: Value = match serde_json::from_str(chunk) {
        Ok(v) => v,
        Err(_) => return SseFrame::Skip,
    };
    if let Some(err) = value.get("error") {
        let detail = err
            .get("message")
            .and_then(|m| m.as_str())
            .map(ToString::to_string)
            .unwrap_or_else(|| err.to_string());
        return SseFrame::Error(detail);
    }
    value
        .get("choices")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|choice| choice.get("delta"))
        .and_then(|delta| delta.get("content"))
        .and_then(|content| content.as_str())
        .filter(|content| !content.is_empty())
        .map(|content| SseFrame::Delta(content.to_string()))
        .unwrap_or(SseFrame::Skip)
}

/// Reads `data:` frames until `[DONE]` or end of body.
fn read_event_stream<R: BufRead>(reader: R, cb: &StreamCallback) -> Result<String> {
    let mut content_out = String::new();
    for line_result in reader.lines() {
        let line = line_result.map_err(|e| anyhow!("stream read error: {e}"))?;
        match parse_sse_line(&line) {
            SseFrame::Skip => continue,
            SseFrame::Delta(text) => {
                content_out.push_str(&text);
                cb(StreamChunk::ContentDelta(text));
            }
            SseFrame::Done => {
                cb(StreamChunk::Done);
                break;
            }
            SseFrame::Error(detail) => {
                return Err(anyhow!("stream aborted by server: {detail}"));
            }
        }
    }
    Ok(content_out)
}

/// Produce a user-friendly error from an HTTP error response.
fn format_api_error(
    status: StatusCode,
    body: &str,
    attempt: u8,
    max_retries: u8,
    api_key_env: &str,
) -> anyhow::Error {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(|m| m.as_str().map(ToString::to_string))
        })
        .unwrap_or_else(|| body.chars().take(200).collect());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => anyhow!(
            "Invalid or missing API key (HTTP {}).\n\
             Set {api_key_env} in the environment or .env, or configure llm.api_key in settings.",
            status.as_u16()
        ),
        StatusCode::TOO_MANY_REQUESTS => anyhow!(
            "Rate limited (HTTP 429). Exhausted {}/{} retries. Try again shortly. Detail: {}",
            attempt + 1,
            max_retries + 1,
            detail
        ),
        StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE => anyhow!(
            "Server error (HTTP {}). Exhausted {}/{} retries. The service may be temporarily unavailable. Detail: {}",
            status.as_u16(),
            attempt + 1,
            max_retries + 1,
            detail
        ),
        _ => anyhow!("API error (HTTP {}): {}", status.as_u16(), detail),
    }
}

/// Produce a user-friendly error from a transport/network failure.
fn format_transport_error(err: &reqwest::Error) -> anyhow::Error {
    let inner_msg = err
        .source()
        .map(|e| e.to_string())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let is_dns = inner_msg.contains("dns")
        || inner_msg.contains("resolve")
        || inner_msg.contains("name or service not known")
        || inner_msg.contains("no such host")
        || inner_msg.contains("getaddrinfo");

    if err.is_timeout() {
        anyhow!(
            "Request timed out. The API did not respond in time.\n\
             If this persists, increase llm.timeout_seconds in your settings."
        )
    } else if is_dns {
        anyhow!(
            "DNS resolution failed. Could not resolve the API hostname.\n\
             Check your internet connection and DNS settings."
        )
    } else if err.is_connect() {
        anyhow!(
            "Connection refused. Could not reach the API at the configured endpoint.\n\
             Check your network connection and llm.endpoint."
        )
    } else {
        anyhow!("Network error: {err}")
    }
}

fn should_retry_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
    )
}

fn should_retry_transport_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

fn parse_retry_after_seconds(header: Option<&reqwest::header::HeaderValue>) -> Option<u64> {
    let value = header?.to_str().ok()?.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(seconds);
    }
    parse_retry_after_http_date(value)
}

fn parse_retry_after_http_date(value: &str) -> Option<u64> {
    let retry_at = DateTime::parse_from_rfc2822(value)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(value, "%a, %d %b %Y %H:%M:%S GMT")
                .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
        })
        .ok()?;
    let delta = retry_at.signed_duration_since(Utc::now()).num_seconds();
    Some(delta.max(0) as u64)
}

fn retry_delay_ms(base_ms: u64, attempt: u8, retry_after_seconds: Option<u64>) -> Duration {
    if let Some(seconds) = retry_after_seconds {
        return Duration::from_millis(seconds.saturating_mul(1000).min(MAX_RETRY_DELAY_MS));
    }
    let exponent = u32::from(attempt);
    let exponential = base_ms.saturating_mul(2_u64.saturating_pow(exponent));
    Duration::from_millis(exponential.max(base_ms.max(100)).min(MAX_RETRY_DELAY_MS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, mpsc};
    use std::time::Duration as StdDuration;
    use termchat_core::ContentPart;

    fn collecting_callback() -> (StreamCallback, Arc<Mutex<Vec<StreamChunk>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cb: StreamCallback = Arc::new(move |chunk| {
            sink.lock().expect("test lock").push(chunk);
        });
        (cb, seen)
    }

    fn request(text: &str) -> ChatRequest {
        ChatRequest {
            model: "openai/gpt-5.1".to_string(),
            messages: vec![Message::user(text)],
        }
    }

    #[test]
    fn sse_lines_are_classified() {
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"hi"}}]}"#),
            SseFrame::Delta("hi".to_string())
        );
        assert_eq!(parse_sse_line("data: [DONE]"), SseFrame::Done);
        assert_eq!(parse_sse_line(": keep-alive"), SseFrame::Skip);
        assert_eq!(parse_sse_line("data: {not json"), SseFrame::Skip);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            SseFrame::Skip
        );
        assert_eq!(
            parse_sse_line(r#"data: {"error":{"message":"overloaded"}}"#),
            SseFrame::Error("overloaded".to_string())
        );
    }

    #[test]
    fn event_stream_skips_malformed_frames_and_stops_at_done() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\
                    data: garbage\n\
                    \n\
                    data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\
                    data: [DONE]\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n";
        let (cb, seen) = collecting_callback();
        let text = read_event_stream(body.as_bytes(), &cb).expect("stream");
        assert_eq!(text, "Hello");
        let seen = seen.lock().expect("test lock");
        assert_eq!(
            *seen,
            vec![
                StreamChunk::ContentDelta("Hel".to_string()),
                StreamChunk::ContentDelta("lo".to_string()),
                StreamChunk::Done,
            ]
        );
    }

    #[test]
    fn event_stream_error_frame_fails_after_partial_output() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"par\"}}]}\n\
                    data: {\"error\":{\"message\":\"upstream reset\"}}\n";
        let (cb, seen) = collecting_callback();
        let err = read_event_stream(body.as_bytes(), &cb).expect_err("should fail");
        assert!(err.to_string().contains("upstream reset"));
        assert_eq!(seen.lock().expect("test lock").len(), 1);
    }

    #[test]
    fn multipart_messages_use_image_url_parts() {
        let client = OpenAiClient::new(
            LlmConfig {
                temperature: Some(0.5),
                ..LlmConfig::default()
            },
            "k",
        )
        .expect("client");
        let req = ChatRequest {
            model: "m".to_string(),
            messages: vec![
                Message {
                    role: termchat_core::Role::User,
                    content: MessageContent::Parts(vec![
                        ContentPart::text("what is this"),
                        ContentPart::image("image/png", "QUJD"),
                    ]),
                },
                Message::assistant("a cat"),
            ],
        };
        let payload = client.build_payload(&req);
        assert_eq!(payload["stream"], json!(true));
        assert_eq!(payload["model"], json!("m"));
        assert_eq!(payload["temperature"], json!(0.5));
        assert_eq!(
            payload["messages"][0]["content"],
            json!([
                {"type": "text", "text": "what is this"},
                {"type": "image_url", "image_url": {"url": "data:image/png;base64,QUJD"}}
            ])
        );
        assert_eq!(
            payload["messages"][1],
            json!({"role": "assistant", "content": "a cat"})
        );
    }

    #[test]
    fn temperature_is_omitted_by_default() {
        let client = OpenAiClient::new(LlmConfig::default(), "k").expect("client");
        let payload = client.build_payload(&request("hi"));
        assert!(payload.get("temperature").is_none());
    }

    #[test]
    fn retry_status_classification() {
        assert!(should_retry_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(should_retry_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(should_retry_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!should_retry_status(StatusCode::UNAUTHORIZED));
        assert!(!should_retry_status(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn format_api_error_401_names_the_key_variable() {
        let msg = format_api_error(
            StatusCode::UNAUTHORIZED,
            r#"{"error":"invalid_api_key"}"#,
            0,
            3,
            "API_KEY",
        )
        .to_string();
        assert!(msg.contains("Invalid or missing API key"), "{msg}");
        assert!(msg.contains("API_KEY"), "{msg}");
        assert!(msg.contains("llm.api_key"), "{msg}");
    }

    #[test]
    fn network_retry_base_uses_one_second_delays() {
        assert_eq!(NETWORK_RETRY_BASE_MS, 1000);
        assert_eq!(
            retry_delay_ms(NETWORK_RETRY_BASE_MS, 0, None),
            Duration::from_millis(1000)
        );
        assert_eq!(
            retry_delay_ms(NETWORK_RETRY_BASE_MS, 2, None),
            Duration::from_millis(4000)
        );
        assert_eq!(retry_delay_ms(400, 1, Some(0)), Duration::from_millis(0));
    }

    #[test]
    fn long_retry_after_is_capped() {
        let day = reqwest::header::HeaderValue::from_static("86400");
        assert_eq!(
            retry_delay_ms(400, 0, parse_retry_after_seconds(Some(&day))),
            Duration::from_millis(MAX_RETRY_DELAY_MS)
        );
        assert_eq!(
            retry_delay_ms(NETWORK_RETRY_BASE_MS, 10, None),
            Duration::from_millis(MAX_RETRY_DELAY_MS)
        );
        assert_eq!(retry_delay_ms(400, 0, Some(3)), Duration::from_millis(3000));
    }

    #[test]
    fn retry_after_parses_seconds_and_http_date() {
        let seconds_header = reqwest::header::HeaderValue::from_static("7");
        assert_eq!(parse_retry_after_seconds(Some(&seconds_header)), Some(7));

        let future = Utc::now() + chrono::Duration::seconds(5);
        let http_date = future.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let date_header = reqwest::header::HeaderValue::from_str(&http_date).expect("header");
        let parsed = parse_retry_after_seconds(Some(&date_header)).expect("parsed");
        assert!(parsed <= 10);
    }

    #[test]
    fn streams_fragments_from_server() {
        let sse_body = "data: {\"choices\":[{\"delta\":{\"content\":\"hel\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\ndata: [DONE]\n";
        let server = start_mock_server(vec![MockHttpResponse {
            status: 200,
            body: sse_body.to_string(),
            retry_after: None,
        }]);
        let client = OpenAiClient::new(
            LlmConfig {
                endpoint: server.endpoint.clone(),
                max_retries: 0,
                ..LlmConfig::default()
            },
            "test-key",
        )
        .expect("client");

        let (cb, seen) = collecting_callback();
        let text = client.stream_chat(&request("hello"), cb).expect("stream");
        assert_eq!(text, "hello");
        assert_eq!(seen.lock().expect("test lock").len(), 3);
        let captured = server.last_request().to_ascii_lowercase();
        assert!(captured.contains("authorization: bearer test-key"));
        assert!(captured.contains("\"stream\":true"));
    }

    #[test]
    fn retries_transient_status_before_streaming() {
        let server = start_mock_server(vec![
            MockHttpResponse {
                status: 503,
                body: r#"{"error":"temporarily_unavailable"}"#.to_string(),
                retry_after: Some("0".to_string()),
            },
            MockHttpResponse {
                status: 200,
                body: "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\ndata: [DONE]\n"
                    .to_string(),
                retry_after: None,
            },
        ]);
        let client = OpenAiClient::new(
            LlmConfig {
                endpoint: server.endpoint.clone(),
                max_retries: 2,
                retry_base_ms: 1,
                ..LlmConfig::default()
            },
            "test-key",
        )
        .expect("client");
        let (cb, _) = collecting_callback();
        let text = client.stream_chat(&request("hi"), cb).expect("stream");
        assert_eq!(text, "ok");
        assert_eq!(server.request_count(), 2);
    }

    #[test]
    fn unauthorized_is_not_retried() {
        let server = start_mock_server(vec![MockHttpResponse {
            status: 401,
            body: r#"{"error":{"message":"bad key"}}"#.to_string(),
            retry_after: None,
        }]);
        let client = OpenAiClient::new(
            LlmConfig {
                endpoint: server.endpoint.clone(),
                max_retries: 3,
                retry_base_ms: 1,
                ..LlmConfig::default()
            },
            "wrong",
        )
        .expect("client");
        let (cb, seen) = collecting_callback();
        let err = client.stream_chat(&request("hi"), cb).expect_err("401");
        assert!(err.to_string().contains("HTTP 401"));
        assert_eq!(server.request_count(), 1);
        assert!(seen.lock().expect("test lock").is_empty());
    }

    #[test]
    fn unreachable_endpoint_reports_connection_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        let client = OpenAiClient::new(
            LlmConfig {
                endpoint: format!("http://{addr}/chat/completions"),
                max_retries: 0,
                timeout_seconds: 2,
                ..LlmConfig::default()
            },
            "k",
        )
        .expect("client");
        let (cb, _) = collecting_callback();
        assert!(client.stream_chat(&request("hi"), cb).is_err());
    }

    #[derive(Clone)]
    struct MockHttpResponse {
        status: u16,
        body: String,
        retry_after: Option<String>,
    }

    struct MockServer {
        endpoint: String,
        request_count: Arc<AtomicUsize>,
        requests: Arc<Mutex<Vec<String>>>,
        stop_tx: Option<mpsc::Sender<()>>,
        handle: Option<thread::JoinHandle<()>>,
    }

    impl MockServer {
        fn request_count(&self) -> usize {
            self.request_count.load(Ordering::SeqCst)
        }

        fn last_request(&self) -> String {
            self.requests
                .lock()
                .expect("test lock")
                .last()
                .cloned()
                .unwrap_or_default()
        }
    }

    impl Drop for MockServer {
        fn drop(&mut self) {
            if let Some(tx) = self.stop_tx.take() {
                let _ = tx.send(());
            }
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        }
    }

    fn start_mock_server(responses: Vec<MockHttpResponse>) -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        listener
            .set_nonblocking(true)
            .expect("set nonblocking listener");
        let addr = listener.local_addr().expect("addr");
        let request_count = Arc::new(AtomicUsize::new(0));
        let request_count_thread = Arc::clone(&request_count);
        let requests = Arc::new(Mutex::new(Vec::new()));
        let requests_thread = Arc::clone(&requests);
        let (tx, rx) = mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            loop {
                if rx.try_recv().is_ok() {
                    break;
                }
                match listener.accept() {
                    Ok((mut stream, _)) => {
                        let _ = stream.set_nonblocking(false);
                        let raw = consume_http_request(&mut stream).unwrap_or_default();
                        requests_thread.lock().expect("test lock").push(raw);
                        let idx = request_count_thread.fetch_add(1, Ordering::SeqCst);
                        let selected = responses
                            .get(idx)
                            .cloned()
                            .or_else(|| responses.last().cloned())
                            .expect("scripted response");
                        let status_text = match selected.status {
                            200 => "OK",
                            401 => "Unauthorized",
                            429 => "Too Many Requests",
                            500 => "Internal Server Error",
                            503 => "Service Unavailable",
                            _ => "Error",
                        };
                        let content_type = if selected.status == 200 {
                            "text/event-stream"
                        } else {
                            "application/json"
                        };
                        let mut headers = format!(
                            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n",
                            selected.status,
                            status_text,
                            content_type,
                            selected.body.len()
                        );
                        if let Some(retry_after) = selected.retry_after {
                            headers.push_str(&format!("Retry-After: {retry_after}\r\n"));
                        }
                        headers.push_str("\r\n");
                        let response = format!("{headers}{}", selected.body);
                        let _ = stream.write_all(response.as_bytes());
                        let _ = stream.flush();
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(StdDuration::from_millis(2));
                    }
                    Err(_) => break,
                }
            }
        });
        MockServer {
            endpoint: format!("http://{addr}/chat/completions"),
            request_count,
            requests,
            stop_tx: Some(tx),
            handle: Some(handle),
        }
    }

    fn consume_http_request(stream: &mut std::net::TcpStream) -> std::io::Result<String> {
        let mut buffer = Vec::new();
        let mut chunk = [0_u8; 1024];
        let mut header_end = None;
        while header_end.is_none() {
            let read = stream.read(&mut chunk)?;
            if read == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..read]);
            header_end = find_subsequence(&buffer, b"\r\n\r\n").map(|idx| idx + 4);
            if buffer.len() > 1_048_576 {
                break;
            }
        }
        let header_len = header_end.unwrap_or(buffer.len());
        let content_length = parse_content_length(&buffer[..header_len]);
        while buffer.len() < header_len + content_length {
            let read = stream.read(&mut chunk)?;
            if read == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..read]);
        }
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }

    fn parse_content_length(headers: &[u8]) -> usize {
        let raw = String::from_utf8_lossy(headers);
        for line in raw.lines() {
            let mut parts = line.splitn(2, ':');
            let key = parts.next().unwrap_or_default().trim();
            if key.eq_ignore_ascii_case("content-length")
                && let Some(value) = parts.next()
                && let Ok(parsed) = value.trim().parse::<usize>()
            {
                return parsed;
            }
        }
        0
    }

    fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        if needle.is_empty() || haystack.len() < needle.len() {
            return None;
        }
        haystack
            .windows(needle.len())
            .position(|window| window == needle)
    }
}
