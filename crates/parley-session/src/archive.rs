//! Archive planning.
//!
//! Turns the old block of a conversation and its summary into the rows a
//! compaction commit writes.

use chrono::{DateTime, Utc};

use parley_core::{Message, MessageArchive};

use crate::summarizer::SummaryOutcome;

/// Summary message plus one archive record per replaced message.
#[derive(Debug, Clone)]
pub struct ArchivePlan {
    pub summary: Message,
    pub archives: Vec<MessageArchive>,
}

impl ArchivePlan {
    pub fn archived_count(&self) -> usize {
        self.archives.len()
    }
}

/// Builds archive plans.
#[derive(Debug, Clone, Copy, Default)]
pub struct Archiver;

impl Archiver {
    pub fn new() -> Self {
        Self
    }

    /// Plan the replacement of `old` by a summary.
    ///
    /// The summary takes the position of the last archived message, so it
    /// sorts between the protected messages before it and the recent window
    /// after it. Returns `None` when `old` is empty.
    pub fn plan(
        &self,
        conversation_id: &str,
        old: &[Message],
        outcome: &SummaryOutcome,
        archived_at: DateTime<Utc>,
    ) -> Option<ArchivePlan> {
        let last = old.last()?;

        let mut summary = Message::summary(
            conversation_id,
            outcome.text.clone(),
            outcome.token_count,
            last.sequence,
        );
        summary.created_at = archived_at;

        let archives = old
            .iter()
            .map(|message| MessageArchive::from_message(message, &summary.id, archived_at))
            .collect();

        Some(ArchivePlan { summary, archives })
    }
}
