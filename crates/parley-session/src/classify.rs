//! Message classification for compaction.

use parley_core::Message;

/// A conversation's active messages split by what compaction may do with them.
///
/// All three lists keep the input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifiedMessages {
    /// System messages, never archived
    pub protected: Vec<Message>,
    /// Non-system messages older than the recent window
    pub old: Vec<Message>,
    /// The last `keep_recent` non-system messages
    pub recent: Vec<Message>,
}

impl ClassifiedMessages {
    /// Number of non-system messages.
    pub fn non_system_count(&self) -> usize {
        self.old.len() + self.recent.len()
    }

    /// Whether there is anything to compact.
    pub fn needs_compaction(&self) -> bool {
        !self.old.is_empty()
    }

    /// The active set once `old` has been replaced by `summary`.
    pub fn active_after(&self, summary: &Message) -> Vec<Message> {
        let mut active: Vec<Message> = self
            .protected
            .iter()
            .chain(std::iter::once(summary))
            .chain(self.recent.iter())
            .cloned()
            .collect();
        active.sort_by(|a, b| (a.sequence, a.created_at).cmp(&(b.sequence, b.created_at)));
        active
    }
}

/// Partition an ordered message list into protected, old and recent.
///
/// `keep_recent` of zero makes every non-system message old.
pub fn classify(messages: Vec<Message>, keep_recent: usize) -> ClassifiedMessages {
    let (protected, others): (Vec<Message>, Vec<Message>) =
        messages.into_iter().partition(Message::is_protected);

    let split = others.len().saturating_sub(keep_recent);
    let mut old = others;
    let recent = old.split_off(split);

    ClassifiedMessages {
        protected,
        old,
        recent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation(system: usize, others: usize) -> Vec<Message> {
        let mut messages = Vec::new();
        let mut sequence = 0;
        for i in 0..system {
            sequence += 1;
            let mut m = Message::system("c", format!("rule {}", i));
            m.sequence = sequence;
            messages.push(m);
        }
        for i in 0..others {
            sequence += 1;
            let mut m = if i % 2 == 0 {
                Message::user("c", format!("question {}", i))
            } else {
                Message::assistant("c", format!("answer {}", i))
            };
            m.sequence = sequence;
            messages.push(m);
        }
        messages
    }

    #[test]
    fn test_classify_splits_old_and_recent() {
        let classified = classify(conversation(1, 12), 2);

        assert_eq!(classified.protected.len(), 1);
        assert_eq!(classified.old.len(), 10);
        assert_eq!(classified.recent.len(), 2);
        assert_eq!(classified.recent[0].content, "question 10");
        assert_eq!(classified.recent[1].content, "answer 11");
        assert!(classified.needs_compaction());
    }

    #[test]
    fn test_classify_short_conversation_has_no_old() {
        let classified = classify(conversation(1, 2), 2);

        assert!(classified.old.is_empty());
        assert_eq!(classified.recent.len(), 2);
        assert!(!classified.needs_compaction());
    }

    #[test]
    fn test_system_messages_are_never_old() {
        let mut messages = conversation(0, 6);
        let mut late_system = Message::system("c", "new rule");
        late_system.sequence = 3;
        messages.insert(2, late_system);

        let classified = classify(messages, 1);

        assert_eq!(classified.protected.len(), 1);
        assert!(classified.old.iter().all(|m| !m.is_protected()));
        assert_eq!(classified.old.len(), 5);
    }

    #[test]
    fn test_keep_recent_zero_archives_everything() {
        let classified = classify(conversation(1, 4), 0);

        assert_eq!(classified.old.len(), 4);
        assert!(classified.recent.is_empty());
    }

    #[test]
    fn test_active_after_keeps_order() {
        let classified = classify(conversation(1, 6), 2);
        let last_old = classified.old.last().unwrap().sequence;
        let summary = Message::summary("c", "- digest", 3, last_old);

        let active = classified.active_after(&summary);

        assert_eq!(active.len(), 4);
        assert_eq!(active[0], classified.protected[0]);
        assert_eq!(active[1], summary);
        assert_eq!(&active[2..], &classified.recent[..]);
    }
}
