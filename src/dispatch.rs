use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, warn};

use crate::message::{MediaRef, NormalizedMessage, OutboundPayload};
use crate::store::MappingStore;
use crate::translate::{self, TranslateContext};
use crate::window::EditWindow;
use crate::zulip::{SendResponse, UpdateResponse};

/// Destination-platform client: create a message, or edit one in place.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    async fn send(&self, payload: &OutboundPayload) -> Result<SendResponse>;
    async fn update(&self, zulip_id: i64, content: &str) -> Result<UpdateResponse>;
}

/// Turns a source-platform media reference into a downloadable URL.
#[async_trait]
pub trait AttachmentResolver: Send + Sync {
    async fn resolve(&self, media: &MediaRef) -> Result<String>;
}

/// Tells the sender, on the source platform, that their message could
/// not be forwarded.
#[async_trait]
pub trait SourceNotifier: Send + Sync {
    async fn notify_unsupported(&self, msg: &NormalizedMessage) -> Result<()>;
}

/// Terminal state of one dispatch. None of these are process-fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Sent to Zulip and the id mapping recorded.
    Delivered,
    /// Sender notified, nothing delivered.
    Unsupported,
    /// Send (or attachment resolution) failed; no mapping written.
    DeliveryRejected,
    /// Edit forwarded to the existing Zulip message.
    Updated,
    /// Zulip rejected the update, or the update request failed.
    UpdateRejected,
    /// Edit arrived after the edit window; no API call made.
    EditWindowExpired,
    /// Edit for a message we never mapped; dropped.
    MappingMissing,
}

/// Orchestrates one inbound event end to end: translate, deliver, and
/// keep the Telegram-id → Zulip-id mapping consistent.
pub struct BridgeDispatcher<C, R, N> {
    client: C,
    resolver: R,
    notifier: N,
    store: MappingStore,
    window: EditWindow,
    ctx: TranslateContext,
}

impl<C, R, N> BridgeDispatcher<C, R, N>
where
    C: DeliveryClient,
    R: AttachmentResolver,
    N: SourceNotifier,
{
    pub fn new(
        client: C,
        resolver: R,
        notifier: N,
        store: MappingStore,
        window: EditWindow,
        ctx: TranslateContext,
    ) -> Self {
        Self {
            client,
            resolver,
            notifier,
            store,
            window,
            ctx,
        }
    }

    /// Forward a new message. The id mapping is written only after Zulip
    /// has confirmed the send, so a failed send leaves no trace and the
    /// whole dispatch is safe to repeat.
    pub async fn dispatch_message(&self, msg: &NormalizedMessage) -> Result<DispatchOutcome> {
        if !msg.is_supported() {
            warn!(
                "User {} sent a message with an unsupported content",
                msg.sender_name
            );
            if let Err(e) = self.notifier.notify_unsupported(msg).await {
                error!("Failed to notify sender about unsupported content: {:#}", e);
            }
            return Ok(DispatchOutcome::Unsupported);
        }

        let attachment_url = match &msg.media {
            Some(media) => match self.resolver.resolve(media).await {
                Ok(url) => Some(url),
                Err(e) => {
                    error!("Failed to resolve attachment for message {}: {:#}", msg.id, e);
                    return Ok(DispatchOutcome::DeliveryRejected);
                }
            },
            None => None,
        };

        let payload = translate::translate(msg, &self.ctx, attachment_url.as_deref());

        let response = match self.client.send(&payload).await {
            Ok(response) => response,
            Err(e) => {
                error!("Zulip send failed for message {}: {:#}", msg.id, e);
                return Ok(DispatchOutcome::DeliveryRejected);
            }
        };

        if !response.is_success() {
            error!(
                "Zulip API returned '{}': {}",
                response.code.as_deref().unwrap_or("unknown"),
                response.msg.as_deref().unwrap_or("")
            );
            return Ok(DispatchOutcome::DeliveryRejected);
        }

        let Some(zulip_id) = response.id else {
            error!(
                "Zulip reported success for message {} but returned no id",
                msg.id
            );
            return Ok(DispatchOutcome::DeliveryRejected);
        };

        // The message exists on Zulip now; a mapping write failure must
        // surface to the caller rather than claim success.
        self.store
            .insert(msg.id, zulip_id)
            .await
            .with_context(|| format!("Delivered message {} but failed to record mapping", msg.id))?;

        info!("Forwarded message {} as Zulip message {}", msg.id, zulip_id);
        Ok(DispatchOutcome::Delivered)
    }

    /// Forward an edit to the already-delivered Zulip message. The topic
    /// is recomputed from the original posting time, so an edit never
    /// retargets a different topic.
    pub async fn dispatch_edit(&self, msg: &NormalizedMessage) -> Result<DispatchOutcome> {
        if !self.window.can_edit(msg.timestamp, Utc::now()) {
            warn!(
                "User {} tried to edit a message older than the edit window. Zulip doesn't allow such edits.",
                msg.sender_name
            );
            return Ok(DispatchOutcome::EditWindowExpired);
        }

        let zulip_id = match self.store.lookup(msg.id).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                warn!(
                    "No Zulip message recorded for edited message {}; dropping edit",
                    msg.id
                );
                return Ok(DispatchOutcome::MappingMissing);
            }
            Err(e) => {
                // A broken read is indistinguishable from a lost row here.
                error!("Mapping lookup failed for edited message {}: {:#}", msg.id, e);
                return Ok(DispatchOutcome::MappingMissing);
            }
        };

        let attachment_url = match &msg.media {
            Some(media) => match self.resolver.resolve(media).await {
                Ok(url) => Some(url),
                Err(e) => {
                    error!(
                        "Failed to resolve attachment for edited message {}: {:#}",
                        msg.id, e
                    );
                    return Ok(DispatchOutcome::UpdateRejected);
                }
            },
            None => None,
        };

        let payload = translate::translate(msg, &self.ctx, attachment_url.as_deref());

        match self.client.update(zulip_id, &payload.content).await {
            Ok(response) if response.is_success() => {
                info!("Propagated edit of message {} to Zulip message {}", msg.id, zulip_id);
                Ok(DispatchOutcome::Updated)
            }
            Ok(response) => {
                error!(
                    "Zulip API returned '{}': {}",
                    response.code.as_deref().unwrap_or("unknown"),
                    response.msg.as_deref().unwrap_or("")
                );
                Ok(DispatchOutcome::UpdateRejected)
            }
            Err(e) => {
                error!("Zulip update failed for message {}: {:#}", msg.id, e);
                Ok(DispatchOutcome::UpdateRejected)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MediaKind, QuotedMessage};
    use crate::translate::TopicRule;
    use chrono::Duration;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockDelivery {
        sent: Mutex<Vec<OutboundPayload>>,
        updates: Mutex<Vec<(i64, String)>>,
        reject_send: bool,
        reject_update: bool,
    }

    #[async_trait]
    impl DeliveryClient for MockDelivery {
        async fn send(&self, payload: &OutboundPayload) -> Result<SendResponse> {
            self.sent.lock().unwrap().push(payload.clone());
            if self.reject_send {
                Ok(SendResponse {
                    result: "error".to_string(),
                    id: None,
                    code: Some("BAD_REQUEST".to_string()),
                    msg: Some("Invalid stream".to_string()),
                })
            } else {
                Ok(SendResponse {
                    result: "success".to_string(),
                    id: Some(42),
                    code: None,
                    msg: None,
                })
            }
        }

        async fn update(&self, zulip_id: i64, content: &str) -> Result<UpdateResponse> {
            self.updates
                .lock()
                .unwrap()
                .push((zulip_id, content.to_string()));
            if self.reject_update {
                Ok(UpdateResponse {
                    result: "error".to_string(),
                    code: Some("BAD_REQUEST".to_string()),
                    msg: Some("Message edit window has passed".to_string()),
                })
            } else {
                Ok(UpdateResponse {
                    result: "success".to_string(),
                    code: None,
                    msg: None,
                })
            }
        }
    }

    struct MockResolver {
        fail: bool,
    }

    #[async_trait]
    impl AttachmentResolver for MockResolver {
        async fn resolve(&self, media: &MediaRef) -> Result<String> {
            if self.fail {
                anyhow::bail!("file unavailable");
            }
            Ok(format!("https://files.example/{}", media.file_id))
        }
    }

    #[derive(Default)]
    struct MockNotifier {
        notified: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl SourceNotifier for MockNotifier {
        async fn notify_unsupported(&self, msg: &NormalizedMessage) -> Result<()> {
            self.notified.lock().unwrap().push(msg.id);
            Ok(())
        }
    }

    fn ctx() -> TranslateContext {
        TranslateContext {
            stream: "From Telegram".to_string(),
            topic_rule: TopicRule::Fixed("General".to_string()),
            tz: chrono_tz::Europe::Zurich,
        }
    }

    fn dispatcher(
        delivery: MockDelivery,
        resolver: MockResolver,
    ) -> BridgeDispatcher<MockDelivery, MockResolver, MockNotifier> {
        BridgeDispatcher::new(
            delivery,
            resolver,
            MockNotifier::default(),
            MappingStore::open_in_memory().unwrap(),
            EditWindow::from_minutes(60),
            ctx(),
        )
    }

    fn msg(id: i64, text: &str) -> NormalizedMessage {
        NormalizedMessage {
            id,
            chat_id: -100,
            timestamp: Utc::now(),
            sender_name: "Alice".to_string(),
            text: Some(text.to_string()),
            media: None,
            reply_to: None,
            mentions: Vec::new(),
        }
    }

    #[tokio::test]
    async fn delivered_message_records_mapping() {
        let d = dispatcher(MockDelivery::default(), MockResolver { fail: false });
        let outcome = d.dispatch_message(&msg(1, "hello")).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Delivered);

        let sent = d.client.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].topic, "General");
        assert_eq!(sent[0].content, "*Alice:*\nhello");
        assert_eq!(d.store.lookup(1).await.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn rejected_send_leaves_no_mapping() {
        let d = dispatcher(
            MockDelivery {
                reject_send: true,
                ..Default::default()
            },
            MockResolver { fail: false },
        );
        let outcome = d.dispatch_message(&msg(2, "hello")).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::DeliveryRejected);
        assert_eq!(d.store.lookup(2).await.unwrap(), None);
    }

    #[tokio::test]
    async fn unsupported_content_notifies_sender_without_delivery() {
        let d = dispatcher(MockDelivery::default(), MockResolver { fail: false });
        let mut unsupported = msg(3, "");
        unsupported.text = None;
        let outcome = d.dispatch_message(&unsupported).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Unsupported);
        assert_eq!(d.notifier.notified.lock().unwrap().as_slice(), &[3]);
        assert!(d.client.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn attachment_failure_skips_send_and_mapping() {
        let d = dispatcher(MockDelivery::default(), MockResolver { fail: true });
        let mut with_media = msg(4, "caption");
        with_media.media = Some(MediaRef {
            file_id: "f1".to_string(),
            kind: MediaKind::Photo,
        });
        let outcome = d.dispatch_message(&with_media).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::DeliveryRejected);
        assert!(d.client.sent.lock().unwrap().is_empty());
        assert_eq!(d.store.lookup(4).await.unwrap(), None);
    }

    #[tokio::test]
    async fn media_message_carries_file_link() {
        let d = dispatcher(MockDelivery::default(), MockResolver { fail: false });
        let mut with_media = msg(5, "caption");
        with_media.media = Some(MediaRef {
            file_id: "f2".to_string(),
            kind: MediaKind::Document,
        });
        d.dispatch_message(&with_media).await.unwrap();
        let sent = d.client.sent.lock().unwrap().clone();
        assert!(sent[0]
            .content
            .ends_with("\n[Link to file](https://files.example/f2)"));
    }

    #[tokio::test]
    async fn edit_updates_mapped_message() {
        let d = dispatcher(MockDelivery::default(), MockResolver { fail: false });
        d.dispatch_message(&msg(6, "hello")).await.unwrap();

        let outcome = d.dispatch_edit(&msg(6, "hello world")).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Updated);

        let updates = d.client.updates.lock().unwrap().clone();
        assert_eq!(updates, vec![(42, "*Alice:*\nhello world".to_string())]);
    }

    #[tokio::test]
    async fn edit_without_mapping_makes_no_api_call() {
        let d = dispatcher(MockDelivery::default(), MockResolver { fail: false });
        let outcome = d.dispatch_edit(&msg(7, "never sent")).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::MappingMissing);
        assert!(d.client.sent.lock().unwrap().is_empty());
        assert!(d.client.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn expired_edit_makes_no_api_call() {
        let d = dispatcher(MockDelivery::default(), MockResolver { fail: false });
        d.dispatch_message(&msg(8, "hello")).await.unwrap();

        let mut stale = msg(8, "hello world");
        stale.timestamp = Utc::now() - Duration::minutes(61);
        let outcome = d.dispatch_edit(&stale).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::EditWindowExpired);
        assert!(d.client.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejected_update_is_local_error() {
        let d = dispatcher(
            MockDelivery {
                reject_update: true,
                ..Default::default()
            },
            MockResolver { fail: false },
        );
        d.dispatch_message(&msg(9, "hello")).await.unwrap();
        // reject_update only affects the update path, the send succeeded
        let outcome = d.dispatch_edit(&msg(9, "hello again")).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::UpdateRejected);
    }

    #[tokio::test]
    async fn edit_of_reply_keeps_quoted_header() {
        let d = dispatcher(MockDelivery::default(), MockResolver { fail: false });
        let mut reply = msg(10, "sure");
        reply.reply_to = Some(QuotedMessage {
            sender_name: "Bob".to_string(),
            timestamp: reply.timestamp - Duration::minutes(5),
            text: Some("lunch?".to_string()),
        });
        d.dispatch_message(&reply).await.unwrap();

        reply.text = Some("sure!".to_string());
        d.dispatch_edit(&reply).await.unwrap();

        let updates = d.client.updates.lock().unwrap().clone();
        assert!(updates[0].1.starts_with("> *Bob wrote ("));
        assert!(updates[0].1.ends_with("*Alice:*\nsure!"));
    }
}
