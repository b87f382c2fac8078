use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatId, FileId, MessageEntityKind, MessageId, ReplyParameters};
use tracing::{debug, error, info, warn};

use crate::dispatch::{AttachmentResolver, SourceNotifier};
use crate::mentions::MentionDirectory;
use crate::message::{MediaKind, MediaRef, NormalizedMessage, QuotedMessage};
use crate::platform::BridgeState;

/// Resolves Telegram file references into direct download URLs via getFile.
/// Telegram file URLs embed the bot token; the forwarded link is only
/// visible inside the destination stream.
pub struct TelegramFileResolver {
    bot: Bot,
}

impl TelegramFileResolver {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl AttachmentResolver for TelegramFileResolver {
    async fn resolve(&self, media: &MediaRef) -> Result<String> {
        let file = self
            .bot
            .get_file(FileId(media.file_id.clone()))
            .await
            .context("getFile request failed")?;
        Ok(format!(
            "https://api.telegram.org/file/bot{}/{}",
            self.bot.token(),
            file.path
        ))
    }
}

/// Replies on Telegram when a message cannot be forwarded.
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl SourceNotifier for TelegramNotifier {
    async fn notify_unsupported(&self, msg: &NormalizedMessage) -> Result<()> {
        let text = format!(
            "Sorry {}, I cannot forward a message with this content to Zulip \u{1f61e}",
            msg.sender_name
        );
        self.bot
            .send_message(ChatId(msg.chat_id), text)
            .reply_parameters(ReplyParameters::new(MessageId(msg.id as i32)))
            .disable_notification(true)
            .await
            .context("Failed to send unsupported-content notice")?;
        Ok(())
    }
}

/// Run the Telegram long-polling loop until ctrl-c.
pub async fn run(state: Arc<BridgeState>, bot: Bot) -> Result<()> {
    info!("Starting Telegram platform...");

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_edited_message().endpoint(handle_edited_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_message(bot: Bot, msg: Message, state: Arc<BridgeState>) -> ResponseResult<()> {
    if msg.from.is_none() {
        return Ok(());
    }

    if let Some(text) = msg.text() {
        if text == "/start" {
            let name = msg
                .from
                .as_ref()
                .map(|u| u.first_name.as_str())
                .unwrap_or("there");
            bot.send_message(
                msg.chat.id,
                format!("Hi {name}! I forward messages from this chat to Zulip."),
            )
            .await?;
            return Ok(());
        }
        if text == "/help" {
            bot.send_message(
                msg.chat.id,
                "Send any message and I'll forward it to the configured Zulip stream.\n\
                 Edits within the edit window are forwarded too.",
            )
            .await?;
            return Ok(());
        }
        // Other commands are not forwarded.
        if text.starts_with('/') {
            debug!("Ignoring command: {}", text);
            return Ok(());
        }
    }

    let normalized = normalize(&msg, &state.mentions);
    if let Err(e) = state.dispatcher.dispatch_message(&normalized).await {
        error!("Error dispatching message {}: {:#}", normalized.id, e);
    }

    Ok(())
}

async fn handle_edited_message(
    _bot: Bot,
    msg: Message,
    state: Arc<BridgeState>,
) -> ResponseResult<()> {
    if msg.from.is_none() {
        return Ok(());
    }

    // Telegram keeps the original posting date on edited messages, so the
    // normalized timestamp is the one the edit window must be checked against.
    let normalized = normalize(&msg, &state.mentions);
    if let Err(e) = state.dispatcher.dispatch_edit(&normalized).await {
        error!("Error dispatching edit of message {}: {:#}", normalized.id, e);
    }

    Ok(())
}

/// Convert a Telegram message into the bridge's normalized form.
fn normalize(msg: &Message, directory: &MentionDirectory) -> NormalizedMessage {
    let sender_name = msg
        .from
        .as_ref()
        .map(|u| u.first_name.clone())
        .unwrap_or_default();

    let reply_to = msg.reply_to_message().map(|orig| QuotedMessage {
        sender_name: orig
            .from
            .as_ref()
            .map(|u| u.first_name.clone())
            .unwrap_or_default(),
        timestamp: orig.date,
        text: orig.text().or_else(|| orig.caption()).map(str::to_string),
    });

    NormalizedMessage {
        id: msg.id.0 as i64,
        chat_id: msg.chat.id.0,
        timestamp: msg.date,
        sender_name,
        text: msg.text().or_else(|| msg.caption()).map(str::to_string),
        media: extract_media(msg),
        reply_to,
        mentions: extract_mentions(msg, directory),
    }
}

/// Pick the forwardable media out of a message, if any. For photos,
/// Telegram lists sizes smallest first; the last entry is the original.
fn extract_media(msg: &Message) -> Option<MediaRef> {
    if let Some(sizes) = msg.photo() {
        return sizes.last().map(|photo| MediaRef {
            file_id: photo.file.id.0.clone(),
            kind: MediaKind::Photo,
        });
    }
    if let Some(document) = msg.document() {
        return Some(MediaRef {
            file_id: document.file.id.0.clone(),
            kind: MediaKind::Document,
        });
    }
    if let Some(video) = msg.video() {
        return Some(MediaRef {
            file_id: video.file.id.0.clone(),
            kind: MediaKind::Video,
        });
    }
    if let Some(note) = msg.video_note() {
        return Some(MediaRef {
            file_id: note.file.id.0.clone(),
            kind: MediaKind::VideoNote,
        });
    }
    if let Some(audio) = msg.audio() {
        return Some(MediaRef {
            file_id: audio.file.id.0.clone(),
            kind: MediaKind::Audio,
        });
    }
    if let Some(voice) = msg.voice() {
        return Some(MediaRef {
            file_id: voice.file.id.0.clone(),
            kind: MediaKind::Voice,
        });
    }
    None
}

/// Collect the Zulip handles mentioned in a message, in first-seen order.
/// Mentions with no entry in the directory are dropped silently.
fn extract_mentions(msg: &Message, directory: &MentionDirectory) -> Vec<String> {
    let entities = msg
        .entities()
        .or_else(|| msg.caption_entities())
        .unwrap_or(&[]);
    let text = msg.text().or_else(|| msg.caption()).unwrap_or("");

    let mut handles: Vec<String> = Vec::new();

    for entity in entities {
        // A full-name mention carries the mentioned User directly.
        if let MessageEntityKind::TextMention { user } = &entity.kind {
            if let Some(handle) = directory.resolve(&user.first_name) {
                push_unique(&mut handles, handle);
            }
        }
    }

    // @username mentions carry no User object; resolve them from the text.
    if entities
        .iter()
        .any(|e| matches!(e.kind, MessageEntityKind::Mention))
    {
        for handle in scan_username_mentions(text, directory) {
            push_unique(&mut handles, &handle);
        }
    }

    handles
}

/// Find `@username` tokens in the text and resolve them via the directory.
fn scan_username_mentions(text: &str, directory: &MentionDirectory) -> Vec<String> {
    let mut handles = Vec::new();
    for token in text.split_whitespace() {
        if let Some(raw) = token.strip_prefix('@') {
            let username = raw.trim_end_matches(|c: char| !c.is_alphanumeric() && c != '_');
            if let Some(handle) = directory.resolve(username) {
                push_unique(&mut handles, handle);
            }
        }
    }
    handles
}

fn push_unique(list: &mut Vec<String>, handle: &str) {
    if !list.iter().any(|existing| existing == handle) {
        list.push(handle.to_string());
    }
}
