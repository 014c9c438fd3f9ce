use termchat_core::{Message, Role};

/// Position in the assistant replies of the current conversation.
/// `None` is live: the newest reply, or the one being streamed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryCursor {
    pos: Option<usize>,
}

impl HistoryCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> Option<usize> {
        self.pos
    }

    pub fn is_live(&self) -> bool {
        self.pos.is_none()
    }

    pub fn reset(&mut self) {
        self.pos = None;
    }

    /// Older reply. From live this jumps to the newest one; clamps at the oldest.
    pub fn step_up(&mut self, count: usize) {
        if count == 0 {
            self.pos = None;
            return;
        }
        self.pos = Some(match self.pos {
            None => count - 1,
            Some(pos) => pos.min(count - 1).saturating_sub(1),
        });
    }

    /// Newer reply. Stepping past the newest returns to live.
    pub fn step_down(&mut self, count: usize) {
        self.pos = match self.pos {
            Some(pos) if pos + 1 < count => Some(pos + 1),
            _ => None,
        };
    }

    /// The browsed reply as `(index among replies, message)`, or the newest when live.
    pub fn select<'a>(&self, messages: &'a [Message]) -> Option<(usize, &'a Message)> {
        let replies: Vec<&Message> = messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .collect();
        let index = match self.pos {
            Some(pos) if pos < replies.len() => pos,
            _ => replies.len().checked_sub(1)?,
        };
        Some((index, replies[index]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn up_from_live_jumps_to_newest_then_walks_back() {
        let mut cursor = HistoryCursor::new();
        cursor.step_up(3);
        assert_eq!(cursor.position(), Some(2));
        cursor.step_up(3);
        cursor.step_up(3);
        cursor.step_up(3);
        assert_eq!(cursor.position(), Some(0));
        cursor.step_down(3);
        cursor.step_down(3);
        assert_eq!(cursor.position(), Some(2));
        cursor.step_down(3);
        assert!(cursor.is_live());
    }

    #[test]
    fn no_replies_keeps_cursor_live() {
        let mut cursor = HistoryCursor::new();
        cursor.step_up(0);
        assert!(cursor.is_live());
        cursor.step_down(0);
        assert!(cursor.is_live());
    }

    #[test]
    fn select_skips_user_messages() {
        let messages = vec![
            Message::user("q1"),
            Message::assistant("a1"),
            Message::user("q2"),
            Message::assistant("a2"),
        ];
        let mut cursor = HistoryCursor::new();
        let (idx, msg) = cursor.select(&messages).expect("live");
        assert_eq!((idx, msg.text_content().as_str()), (1, "a2"));
        cursor.step_up(2);
        cursor.step_up(2);
        let (idx, msg) = cursor.select(&messages).expect("browsed");
        assert_eq!((idx, msg.text_content().as_str()), (0, "a1"));
        assert!(HistoryCursor::new().select(&[Message::user("q")]).is_none());
    }

    proptest! {
        #[test]
        fn full_cycle_returns_to_live(n in 1usize..50) {
            let mut cursor = HistoryCursor::new();
            for _ in 0..=n {
                cursor.step_up(n);
            }
            prop_assert_eq!(cursor.position(), Some(0));
            for _ in 0..n {
                cursor.step_down(n);
            }
            prop_assert!(cursor.is_live());
        }
    }
}
