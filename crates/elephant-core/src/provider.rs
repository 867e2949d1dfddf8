use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::item::Item;
use crate::request::ProviderStateResponse;

/// Sink through which a provider pushes asynchronous item updates onto the
/// client connection it was queried or activated from. Implementations
/// serialize writes; a vanished client silently stops receiving.
#[async_trait]
pub trait UpdateSink: Send + Sync {
    async fn push_item(&self, query: &str, item: Item);
}

/// Broadcast channel for provider-level change notifications. Providers
/// publish tokens of the form `"<provider>:<what>"` (e.g. `"bluetooth:find"`);
/// the server relays them to connections subscribed to provider-state
/// updates. Handed to providers at construction, never ambient.
#[derive(Clone)]
pub struct ProviderUpdates {
    tx: broadcast::Sender<String>,
}

impl ProviderUpdates {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    /// Lossy: tokens published with no subscriber are dropped.
    pub fn publish(&self, token: &str) {
        let _ = self.tx.send(token.to_string());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

impl Default for ProviderUpdates {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a provider receives for one query fan-out task.
pub struct QueryContext {
    /// The query string, already rewritten for menu routing.
    pub query: String,
    /// True when this provider is the only one in the request.
    pub single: bool,
    pub exact: bool,
    /// Cooperative cancel signal; check at I/O boundaries. Output produced
    /// after cancellation is discarded by the dispatcher.
    pub cancel: CancellationToken,
    pub sink: Arc<dyn UpdateSink>,
}

/// Everything a provider receives for one activation.
pub struct ActivateContext {
    /// Opaque to the core; the provider looks the item up itself.
    pub identifier: String,
    /// Empty selects the provider's default action.
    pub action: String,
    pub query: String,
    pub arguments: String,
    pub sink: Arc<dyn UpdateSink>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("unknown item: {0}")]
    UnknownItem(String),
    #[error("command failed: {0}")]
    CommandFailed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A pluggable data source. One implementation per provider name; the
/// registry owns them behind `Arc<dyn Provider>`.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    fn pretty_name(&self) -> &str {
        self.name()
    }

    fn icon(&self) -> &str {
        ""
    }

    /// Probed once at startup. Unavailable providers stay registered but are
    /// never dispatched to.
    fn available(&self) -> bool {
        true
    }

    fn hidden_from_list(&self) -> bool {
        false
    }

    /// Markdown documentation for the doc generator.
    fn doc(&self) -> &str {
        ""
    }

    async fn query(&self, ctx: QueryContext) -> Vec<Item>;

    async fn activate(&self, ctx: ActivateContext) -> Result<(), ProviderError>;

    fn state(&self) -> ProviderStateResponse {
        ProviderStateResponse::default()
    }
}
