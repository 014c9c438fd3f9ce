//! Line-oriented fallback for pipes and dumb terminals: `You: ` prompts,
//! streamed `AI: ` replies, and the `quit`, `exit` and `clear` words.

use crate::pipeline::{ReplyOutcome, stream_reply};
use anyhow::Result;
use serde_json::json;
use std::io::{BufRead, Write};
use std::sync::Arc;
use termchat_core::{ChatRequest, Message};
use termchat_errors::{ChatError, ErrorHandler};
use termchat_llm::ChatTransport;
use termchat_observe::Observer;
use termchat_store::ConversationStore;

pub struct PlainSession<'a> {
    pub store: &'a mut ConversationStore,
    pub transport: Arc<dyn ChatTransport>,
    pub observer: &'a Observer,
    pub model: String,
}

impl PlainSession<'_> {
    /// Read lines from `input` until EOF or a quit word. Replies stream to `out`.
    pub fn run<R: BufRead, W: Write>(&mut self, mut input: R, mut out: W) -> Result<()> {
        let errors = ErrorHandler::new();
        let mut messages = self.store.current().messages.clone();
        let reason = loop {
            write!(out, "You: ")?;
            out.flush()?;
            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                writeln!(out)?;
                break "eof";
            }
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            match text.to_ascii_lowercase().as_str() {
                "quit" | "exit" => break "quit",
                "clear" => {
                    messages.clear();
                    self.store.clear_current();
                    self.note_persistence();
                    writeln!(out, "Conversation cleared.")?;
                    continue;
                }
                _ => {}
            }

            messages.push(Message::user(text));
            let request = ChatRequest {
                model: self.model.clone(),
                messages: messages.clone(),
            };
            write!(out, "AI: ")?;
            out.flush()?;
            let outcome = stream_reply(Arc::clone(&self.transport), request, |fragment| {
                let _ = write!(out, "{fragment}");
                let _ = out.flush();
            });
            writeln!(out)?;
            match outcome {
                ReplyOutcome::Completed { text, fragments } => {
                    self.observer.record(
                        "stream.completed",
                        json!({ "model": self.model, "fragments": fragments, "chars": text.chars().count() }),
                    );
                    messages.push(Message::assistant(text));
                }
                ReplyOutcome::TransportFailed { reason, partial } => {
                    self.observer.record(
                        "stream.failed",
                        json!({
                            "model": self.model,
                            "reason": reason,
                            "partial_chars": partial.chars().count(),
                        }),
                    );
                    if !partial.is_empty() {
                        writeln!(out, "[partial reply above was not saved]")?;
                    }
                    writeln!(out, "{}", errors.status_line(&ChatError::Transport(reason)))?;
                }
            }
            self.store.commit(messages.clone());
            self.note_persistence();
        };
        self.observer.record(
            "session.ended",
            json!({ "reason": reason, "conversations": self.store.len() }),
        );
        Ok(())
    }

    fn note_persistence(&mut self) {
        if let Some(err) = self.store.take_persistence_error() {
            self.observer
                .record("persistence.failed", json!({ "error": err.to_string() }));
            self.observer.warn_log(&err.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use termchat_testkit::{Script, ScriptedTransport};

    fn run(store: &mut ConversationStore, scripts: Vec<Script>, input: &str) -> String {
        let observer = Observer::disabled();
        let mut session = PlainSession {
            store,
            transport: Arc::new(ScriptedTransport::new(scripts)),
            observer: &observer,
            model: "m".to_string(),
        };
        let mut out = Vec::new();
        session
            .run(Cursor::new(input.to_string()), &mut out)
            .expect("plain session");
        String::from_utf8(out).expect("utf8")
    }

    #[test]
    fn streams_replies_and_stops_on_quit() {
        let mut store = ConversationStore::in_memory();
        let out = run(
            &mut store,
            vec![Script::reply(&["Hel", "lo!"])],
            "hi\n\nquit\nnever read\n",
        );
        assert_eq!(out, "You: AI: Hello!\nYou: You: ");
        assert_eq!(store.current().messages.len(), 2);
    }

    #[test]
    fn clear_empties_the_conversation_and_eof_exits() {
        let mut store = ConversationStore::in_memory();
        store.commit(vec![Message::user("old")]);
        let out = run(&mut store, vec![], "clear\n");
        assert!(out.contains("Conversation cleared."));
        assert!(out.ends_with("You: \n"));
        assert!(store.current().messages.is_empty());
    }

    #[test]
    fn failure_keeps_the_question_only() {
        let mut store = ConversationStore::in_memory();
        let out = run(
            &mut store,
            vec![Script::fail_after(&["par"], "timed out")],
            "hi\nexit\n",
        );
        assert!(out.contains("AI: par\n[partial reply above was not saved]"));
        assert!(out.contains("[network] transport failure: timed out"));
        assert_eq!(store.current().messages.len(), 1);
    }
}
