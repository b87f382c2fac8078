use chrono::{DateTime, Utc};

/// Kinds of Telegram media the bridge can forward. Anything else
/// (polls, stickers, locations, ...) is unsupported content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Document,
    Video,
    VideoNote,
    Audio,
    Voice,
}

/// Opaque reference to a media file on the source platform,
/// resolvable to a download URL via an `AttachmentResolver`.
#[derive(Debug, Clone)]
pub struct MediaRef {
    pub file_id: String,
    pub kind: MediaKind,
}

/// Read-only snapshot of the message a reply points at. A reply always
/// points strictly backward in time, so this is never cyclic.
#[derive(Debug, Clone)]
pub struct QuotedMessage {
    pub sender_name: String,
    pub timestamp: DateTime<Utc>,
    /// Text or caption of the quoted message, if any.
    pub text: Option<String>,
}

/// A source-platform message normalized for the bridge core.
///
/// For an edited message, `id` and `timestamp` are those of the original
/// message (Telegram keeps the creation date on edits), so the edit window
/// check and the topic derivation see the original posting time.
#[derive(Debug, Clone)]
pub struct NormalizedMessage {
    pub id: i64,
    /// Source chat the message came from; used for replies back to the sender.
    pub chat_id: i64,
    pub timestamp: DateTime<Utc>,
    pub sender_name: String,
    /// Plain text for a text message, caption for a media message.
    pub text: Option<String>,
    pub media: Option<MediaRef>,
    pub reply_to: Option<QuotedMessage>,
    /// Resolved destination-platform handles, in first-seen order.
    pub mentions: Vec<String>,
}

impl NormalizedMessage {
    /// A message with neither text, caption, nor recognized media cannot
    /// be forwarded; the sender gets notified instead.
    pub fn is_supported(&self) -> bool {
        self.text.is_some() || self.media.is_some()
    }
}

/// The formatted destination message, immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPayload {
    pub stream: String,
    pub topic: String,
    pub content: String,
}
