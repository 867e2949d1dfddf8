//! Query dispatch: supersession per connection, provider fan-out with a
//! cooperative cancel signal, merge, rank, web-search suppression, and frame
//! emission.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use elephant_core::config::Settings;
use elephant_core::{QueryContext, QueryRequest, QueryResponse};
use elephant_proto::{encode, ResponseOp, WireFormat};

use crate::rank::rank;
use crate::registry::ProviderRegistry;
use crate::updates::{AsyncItemSink, ConnectionHandle};

/// When to hide web-search filler from a multi-provider result set.
#[derive(Clone, Debug, Default)]
pub struct SuppressionPolicy {
    /// Number of default search engines competing for display slots.
    pub max_global_slots: usize,
    pub always_show: bool,
    /// Query prefix to engine display text, e.g. `"g "` to `"Google"`. A
    /// prefix-matched engine survives suppression.
    pub prefixes: HashMap<String, String>,
}

impl SuppressionPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        let mut policy = Self {
            always_show: settings.websearch.always_show_default,
            ..Default::default()
        };
        for engine in &settings.websearch.engines {
            if engine.default {
                policy.max_global_slots += 1;
            }
            if !engine.prefix.is_empty() {
                policy
                    .prefixes
                    .insert(engine.prefix.clone(), engine.name.clone());
            }
        }
        policy
    }

    /// The engine text to spare from suppression for this query, if the
    /// query starts with a registered prefix.
    fn hint_for(&self, query: &str) -> String {
        self.prefixes
            .iter()
            .find(|(prefix, _)| query.starts_with(prefix.as_str()))
            .map(|(_, name)| name.clone())
            .unwrap_or_default()
    }
}

struct ActiveQuery {
    generation: u64,
    cancel: CancellationToken,
}

/// Fan-out engine. One instance per daemon; all connections share it.
///
/// There is deliberately no per-provider timeout: a stalled provider delays
/// only the barrier of its own query, and a newer query from the same
/// connection cancels past it.
pub struct Dispatcher {
    registry: Arc<ProviderRegistry>,
    policy: SuppressionPolicy,
    qid: AtomicU32,
    generation: AtomicU64,
    /// Cancel handle of the in-flight query per connection. Guarded by one
    /// mutex held only across the cancel-and-install swap and the
    /// generation-checked clear.
    active: Mutex<HashMap<u32, ActiveQuery>>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ProviderRegistry>, policy: SuppressionPolicy) -> Self {
        Self {
            registry,
            policy,
            qid: AtomicU32::new(0),
            generation: AtomicU64::new(0),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Run one query to completion: supersede the connection's previous
    /// query, fan out, and stream the ranked results back.
    pub async fn dispatch(
        &self,
        cid: u32,
        handle: Arc<ConnectionHandle>,
        format: WireFormat,
        req: QueryRequest,
    ) {
        let start = Instant::now();
        let qid = self.qid.fetch_add(1, Ordering::Relaxed) + 1;

        let hint = if req.providers.iter().any(|p| p == "websearch") {
            self.policy.hint_for(&req.query)
        } else {
            String::new()
        };

        let cancel = CancellationToken::new();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        {
            let mut active = self.active.lock();
            if let Some(previous) = active.remove(&cid) {
                previous.cancel.cancel();
            }
            active.insert(
                cid,
                ActiveQuery {
                    generation,
                    cancel: cancel.clone(),
                },
            );
        }

        let single = req.providers.len() == 1;
        let mut tasks = Vec::new();
        for name in &req.providers {
            let (effective, query) = rewrite_menu_route(name, &req.query);
            let Some(provider) = self.registry.dispatchable(&effective) else {
                tracing::debug!(provider = %effective, "Unknown provider skipped");
                continue;
            };
            let ctx = QueryContext {
                query,
                single,
                exact: req.exactsearch,
                cancel: cancel.clone(),
                sink: AsyncItemSink::new(Arc::clone(&handle), format),
            };
            tasks.push((
                effective,
                tokio::spawn(async move { provider.query(ctx).await }),
            ));
        }

        // barrier: every provider finishes or the query is superseded
        let mut entries = Vec::new();
        for (name, task) in tasks {
            match task.await {
                Ok(mut items) => {
                    for item in &mut items {
                        if item.provider.is_empty() {
                            item.provider = name.clone();
                        }
                    }
                    entries.append(&mut items);
                }
                Err(e) => {
                    tracing::error!(provider = %name, error = %e, "Provider query task failed")
                }
            }
        }

        if cancel.is_cancelled() {
            // the superseding query emits its own terminator
            self.clear_slot(cid, generation);
            return;
        }

        if entries.is_empty() {
            let _ = handle.write_status(ResponseOp::QueryNoResults).await;
            let _ = handle.write_status(ResponseOp::QueryDone).await;
            tracing::info!(
                providers = %req.providers.join(","),
                qid,
                results = 0,
                elapsed = ?start.elapsed(),
                "Query finished"
            );
            self.clear_slot(cid, generation);
            return;
        }

        let cap = req.maxresults.max(0) as usize;
        let entries = rank(entries, cap);

        // suppression runs at emission time so cancellation stays responsive
        let hide_websearch = req.providers.len() > 1
            && entries.len() > self.policy.max_global_slots
            && !self.policy.always_show;

        let mut emitted = 0usize;
        for item in &entries {
            if cancel.is_cancelled() {
                self.clear_slot(cid, generation);
                return;
            }
            if hide_websearch && item.provider == "websearch" && item.text != hint {
                continue;
            }

            let resp = QueryResponse {
                qid,
                query: req.query.clone(),
                item: item.clone(),
            };
            let payload = match encode(format, &resp) {
                Ok(p) => p,
                Err(e) => {
                    tracing::error!(error = %e, item = %item.text, "Response encode failed");
                    continue;
                }
            };
            if let Err(e) = handle.write_frame(ResponseOp::QueryItem, &payload).await {
                tracing::error!(cid, error = %e, item = %item.text, "Emission failed, dropping remaining items");
                self.clear_slot(cid, generation);
                return;
            }
            emitted += 1;
        }

        let _ = handle.write_status(ResponseOp::QueryDone).await;
        tracing::info!(
            providers = %req.providers.join(","),
            qid,
            results = emitted,
            elapsed = ?start.elapsed(),
            "Query finished"
        );
        self.clear_slot(cid, generation);
    }

    /// Cancel whatever query the connection still has in flight. Called when
    /// the connection goes away.
    pub fn drop_connection(&self, cid: u32) {
        let mut active = self.active.lock();
        if let Some(query) = active.remove(&cid) {
            query.cancel.cancel();
        }
    }

    /// Clear our own slot only while it still holds our cancel handle; a
    /// newer query may have already replaced it.
    fn clear_slot(&self, cid: u32, generation: u64) {
        let mut active = self.active.lock();
        if active.get(&cid).is_some_and(|q| q.generation == generation) {
            active.remove(&cid);
        }
    }
}

/// `menus:<menu>` routes to the `menus` provider with the query prefixed as
/// `<menu>:<query>`. The sole routing transform.
fn rewrite_menu_route(provider: &str, query: &str) -> (String, String) {
    if let Some(menu) = provider.strip_prefix("menus:") {
        return ("menus".to_string(), format!("{menu}:{query}"));
    }
    (provider.to_string(), query.to_string())
}
