//! Case-insensitive search across conversation titles and message bodies.

use termchat_core::Conversation;

const SNIPPET_BEFORE: usize = 20;
const SNIPPET_AFTER: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitSource {
    Title,
    /// Index of the matching message within the conversation.
    Message(usize),
}

/// At most one hit per conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub index: usize,
    pub title: String,
    pub snippet: String,
    pub source: HitSource,
}

/// Title matches win over message matches; hits come back in list order.
pub fn search(query: &str, conversations: &[Conversation]) -> Vec<SearchHit> {
    let needle = fold(query);
    if needle.is_empty() {
        return Vec::new();
    }

    let mut hits = Vec::new();
    for (index, conversation) in conversations.iter().enumerate() {
        let title_chars: Vec<char> = conversation.title.chars().collect();
        if find_folded(&title_chars, &needle).is_some() {
            hits.push(SearchHit {
                index,
                title: conversation.title.clone(),
                snippet: conversation.title.clone(),
                source: HitSource::Title,
            });
            continue;
        }

        for (msg_index, message) in conversation.messages.iter().enumerate() {
            let chars: Vec<char> = message.text_content().chars().collect();
            if let Some(pos) = find_folded(&chars, &needle) {
                let start = pos.saturating_sub(SNIPPET_BEFORE);
                let end = (pos + SNIPPET_AFTER).min(chars.len());
                hits.push(SearchHit {
                    index,
                    title: conversation.title.clone(),
                    snippet: chars[start..end].iter().collect(),
                    source: HitSource::Message(msg_index),
                });
                break;
            }
        }
    }
    hits
}

/// One lower-case char per input char, so positions line up with the input.
fn fold(text: &str) -> Vec<char> {
    text.chars().map(fold_char).collect()
}

fn fold_char(ch: char) -> char {
    ch.to_lowercase().next().unwrap_or(ch)
}

fn find_folded(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window.iter().map(|c| fold_char(*c)).eq(needle.iter().copied()))
}
