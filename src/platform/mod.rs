pub mod telegram;

use crate::dispatch::BridgeDispatcher;
use crate::mentions::MentionDirectory;
use crate::platform::telegram::{TelegramFileResolver, TelegramNotifier};
use crate::zulip::ZulipClient;

/// Shared bridge state. Read-only after startup, apart from the mapping
/// store inside the dispatcher.
pub struct BridgeState {
    pub dispatcher: BridgeDispatcher<ZulipClient, TelegramFileResolver, TelegramNotifier>,
    pub mentions: MentionDirectory,
}
