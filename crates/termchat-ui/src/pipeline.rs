//! Runs a transport stream on a producer thread and hands fragments to the
//! caller's thread in order, followed by exactly one terminal outcome.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, sync_channel};
use std::thread;
use termchat_core::{ChatRequest, StreamCallback, StreamChunk};
use termchat_llm::ChatTransport;

const CHANNEL_CAPACITY: usize = 64;

enum PumpEvent {
    Fragment(String),
    Finished(Result<(), String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// End of stream. `text` is every fragment concatenated.
    Completed { text: String, fragments: usize },
    /// The stream broke. `partial` is what was shown before the failure.
    TransportFailed { reason: String, partial: String },
}

/// Stream `request` and call `on_fragment` for each fragment on this thread.
/// Blocks until the stream completes or fails.
pub fn stream_reply<F>(
    transport: Arc<dyn ChatTransport>,
    request: ChatRequest,
    mut on_fragment: F,
) -> ReplyOutcome
where
    F: FnMut(&str),
{
    let (tx, rx) = sync_channel::<PumpEvent>(CHANNEL_CAPACITY);
    let fragment_tx = tx.clone();
    let cb: StreamCallback = Arc::new(move |chunk| {
        if let StreamChunk::ContentDelta(text) = chunk {
            let _ = fragment_tx.send(PumpEvent::Fragment(text));
        }
    });

    let spawned = thread::Builder::new()
        .name("reply-stream".to_string())
        .spawn(move || {
            let result = transport
                .stream_chat(&request, cb)
                .map(|_| ())
                .map_err(|e| e.to_string());
            let _ = tx.send(PumpEvent::Finished(result));
        });
    let handle = match spawned {
        Ok(handle) => handle,
        Err(err) => {
            return ReplyOutcome::TransportFailed {
                reason: format!("could not start stream: {err}"),
                partial: String::new(),
            };
        }
    };

    let outcome = drain(&rx, &mut on_fragment);
    let _ = handle.join();
    outcome
}

fn drain<F: FnMut(&str)>(rx: &Receiver<PumpEvent>, on_fragment: &mut F) -> ReplyOutcome {
    let mut text = String::new();
    let mut fragments = 0;
    loop {
        match rx.recv() {
            Ok(PumpEvent::Fragment(fragment)) => {
                text.push_str(&fragment);
                fragments += 1;
                on_fragment(&fragment);
            }
            Ok(PumpEvent::Finished(Ok(()))) => {
                return ReplyOutcome::Completed { text, fragments };
            }
            Ok(PumpEvent::Finished(Err(reason))) => {
                return ReplyOutcome::TransportFailed {
                    reason,
                    partial: text,
                };
            }
            Err(_) => {
                return ReplyOutcome::TransportFailed {
                    reason: "stream ended without a result".to_string(),
                    partial: text,
                };
            }
        }
    }
}
