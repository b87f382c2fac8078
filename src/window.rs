use chrono::{DateTime, Duration, Utc};

/// Zulip refuses edits of messages older than a configurable limit
/// (60 minutes on default server settings). The dispatcher checks this
/// locally and never calls the API for an expired edit.
#[derive(Debug, Clone, Copy)]
pub struct EditWindow {
    limit: Duration,
}

impl EditWindow {
    pub fn from_minutes(minutes: i64) -> Self {
        Self {
            limit: Duration::minutes(minutes),
        }
    }

    /// True iff `now` is still within the window after the original
    /// posting time. The boundary instant itself is allowed.
    pub fn can_edit(&self, original: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now <= original + self.limit
    }
}
