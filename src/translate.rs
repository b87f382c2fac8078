use chrono_tz::Tz;

use crate::message::{NormalizedMessage, OutboundPayload};

/// Which Zulip topic forwarded messages land in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicRule {
    /// Every message goes to this topic.
    Fixed(String),
    /// No topic configured: use the message's local calendar date.
    MessageDate,
}

/// Read-only translation settings, fixed for the process lifetime.
#[derive(Debug, Clone)]
pub struct TranslateContext {
    pub stream: String,
    pub topic_rule: TopicRule,
    pub tz: Tz,
}

// Zulip-side rendering formats. Changing these changes the wire contract.
const DATE_FMT: &str = "%d %B %Y";
const TIME_FMT: &str = "%H:%M";

/// Build the Zulip payload for a normalized message.
///
/// Pure function: same message, context and attachment URL always produce
/// the same payload. Callers must not pass unsupported content here; the
/// dispatcher notifies the sender instead of translating.
pub fn translate(
    msg: &NormalizedMessage,
    ctx: &TranslateContext,
    attachment_url: Option<&str>,
) -> OutboundPayload {
    let local = msg.timestamp.with_timezone(&ctx.tz);

    let topic = match &ctx.topic_rule {
        TopicRule::Fixed(topic) => topic.clone(),
        TopicRule::MessageDate => local.format(DATE_FMT).to_string(),
    };

    let mut content = String::new();

    // Mentions go first, bolded the way Zulip expects them.
    if !msg.mentions.is_empty() {
        let tokens: Vec<String> = msg
            .mentions
            .iter()
            .map(|handle| format!("@_**{handle}**"))
            .collect();
        content.push_str(&tokens.join(" "));
        content.push(' ');
    }

    let text = msg.text.as_deref().unwrap_or("");

    match &msg.reply_to {
        None => {
            content.push_str(&format!("*{}:*\n{}", msg.sender_name, text));
        }
        Some(orig) => {
            let orig_local = orig.timestamp.with_timezone(&ctx.tz);
            // Same local day: the time alone is enough context for the quote.
            let reply_date_print = if orig_local.date_naive() == local.date_naive() {
                orig_local.format(TIME_FMT).to_string()
            } else {
                orig_local.format(&format!("{DATE_FMT}, {TIME_FMT}")).to_string()
            };
            let orig_text = orig.text.as_deref().unwrap_or("");
            content.push_str(&format!(
                "> *{} wrote ({}):*\n> {}\n\n*{}:*\n{}",
                orig.sender_name, reply_date_print, orig_text, msg.sender_name, text
            ));
        }
    }

    if let Some(url) = attachment_url {
        content.push_str(&format!("\n[Link to file]({url})"));
    }

    OutboundPayload {
        stream: ctx.stream.clone(),
        topic,
        content,
    }
}
