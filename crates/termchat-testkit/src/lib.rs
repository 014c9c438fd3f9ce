use anyhow::{Result, anyhow};
use std::collections::VecDeque;
use std::sync::Mutex;
use termchat_core::{ChatRequest, Message, StreamCallback, StreamChunk};
use termchat_llm::ChatTransport;
use termchat_store::ConversationStore;

/// What the next call to [`ScriptedTransport::stream_chat`] does.
#[derive(Debug, Clone)]
pub enum Script {
    /// Deliver each fragment, then end the stream normally.
    Reply(Vec<String>),
    /// Deliver the fragments, then fail with `error`.
    FailAfter { fragments: Vec<String>, error: String },
}

impl Script {
    pub fn reply(fragments: &[&str]) -> Self {
        Script::Reply(fragments.iter().map(ToString::to_string).collect())
    }

    pub fn fail_after(fragments: &[&str], error: &str) -> Self {
        Script::FailAfter {
            fragments: fragments.iter().map(ToString::to_string).collect(),
            error: error.to_string(),
        }
    }
}

/// A transport that plays back queued scripts and records every request.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedTransport {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.requests().pop()
    }
}

impl ChatTransport for ScriptedTransport {
    fn stream_chat(&self, req: &ChatRequest, cb: StreamCallback) -> Result<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(req.clone());
        }
        let script = self
            .scripts
            .lock()
            .map_err(|_| anyhow!("script queue poisoned"))?
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted reply left"))?;
        match script {
            Script::Reply(fragments) => {
                for fragment in &fragments {
                    cb(StreamChunk::ContentDelta(fragment.clone()));
                }
                cb(StreamChunk::Done);
                Ok(fragments.concat())
            }
            Script::FailAfter { fragments, error } => {
                for fragment in fragments {
                    cb(StreamChunk::ContentDelta(fragment));
                }
                Err(anyhow!(error))
            }
        }
    }
}

/// A store backed by a file in a fresh temporary directory.
pub fn temp_store() -> Result<(tempfile::TempDir, ConversationStore)> {
    let dir = tempfile::tempdir()?;
    let store = ConversationStore::open(dir.path().join("conversations.json"));
    Ok((dir, store))
}

/// Alternating user/assistant messages from `(user, reply)` pairs.
pub fn exchange(pairs: &[(&str, &str)]) -> Vec<Message> {
    pairs
        .iter()
        .flat_map(|(user, reply)| [Message::user(*user), Message::assistant(*reply)])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    #[test]
    fn scripts_play_in_order_and_requests_are_recorded() {
        let transport = ScriptedTransport::new(vec![
            Script::reply(&["a", "b"]),
            Script::fail_after(&["c"], "boom"),
        ]);
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cb: StreamCallback = Arc::new(move |chunk| {
            sink.lock().expect("test lock").push(chunk);
        });
        let req = ChatRequest {
            model: "m".to_string(),
            messages: vec![Message::user("hi")],
        };

        assert_eq!(transport.stream_chat(&req, cb.clone()).expect("reply"), "ab");
        let err = transport.stream_chat(&req, cb.clone()).expect_err("fail");
        assert_eq!(err.to_string(), "boom");
        assert!(transport.stream_chat(&req, cb).is_err());
        assert_eq!(transport.requests().len(), 3);
        assert_eq!(seen.lock().expect("test lock").len(), 4);
    }

    #[test]
    fn exchange_alternates_roles() {
        let messages = exchange(&[("q1", "a1"), ("q2", "a2")]);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[3].text_content(), "a2");
    }
}
