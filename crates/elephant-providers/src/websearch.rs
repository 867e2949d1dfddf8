//! Web-search engines defined in the daemon settings. When queried together
//! with other providers only the default (or prefix-matched) engines
//! surface; the dispatcher's suppression policy may hide even those. With
//! `engines_as_actions` the provider offers a single search item instead and
//! the client picks the engine through the action channel.

use async_trait::async_trait;

use elephant_core::config::{EngineSettings, WebsearchSettings};
use elephant_core::{ActivateContext, FuzzyInfo, Item, Provider, ProviderError, QueryContext};
use elephant_history::History;

use crate::exec::{clipboard_text, sh_quote, spawn_detached};
use crate::fuzzy;

pub const ACTION_SEARCH: &str = "search";

pub struct WebsearchProvider {
    cfg: WebsearchSettings,
    /// Sorted default-first; item identifiers are indexes into this order.
    engines: Vec<EngineSettings>,
    history: History,
}

impl WebsearchProvider {
    pub fn new(cfg: WebsearchSettings, history: History) -> Self {
        let mut engines = cfg.engines.clone();
        engines.sort_by_key(|e| !e.default);
        Self {
            cfg,
            engines,
            history,
        }
    }

    fn matched_prefix(&self, query: &str) -> Option<&EngineSettings> {
        self.engines
            .iter()
            .find(|e| !e.prefix.is_empty() && query.starts_with(&e.prefix))
    }

    fn engine_item(&self, idx: usize, engine: &EngineSettings, score: i32) -> Item {
        Item {
            identifier: idx.to_string(),
            text: engine.name.clone(),
            icon: if engine.icon.is_empty() {
                self.cfg.icon.clone()
            } else {
                engine.icon.clone()
            },
            provider: "websearch".into(),
            score,
            actions: vec![ACTION_SEARCH.into()],
            ..Default::default()
        }
    }

    fn engine_by_identifier(&self, identifier: &str) -> Result<&EngineSettings, ProviderError> {
        identifier
            .parse::<usize>()
            .ok()
            .and_then(|i| self.engines.get(i))
            .ok_or_else(|| ProviderError::UnknownItem(identifier.into()))
    }

    fn engine_by_name(&self, name: &str) -> Option<&EngineSettings> {
        self.engines.iter().find(|e| e.name == name)
    }

    /// The query with any registered engine prefix removed.
    fn stripped_query<'a>(&self, query: &'a str) -> &'a str {
        if let Some(engine) = self.matched_prefix(query) {
            if let Some(stripped) = query.strip_prefix(&engine.prefix) {
                return stripped;
            }
        }
        query
    }

    /// Expand an engine URL and wrap it in the opener command. A URL asking
    /// for `%CLIPBOARD%` is fed the clipboard instead of the typed term and
    /// refuses to launch when the clipboard is empty.
    fn build_command(
        &self,
        engine: &EngineSettings,
        term: &str,
        clipboard: Option<&str>,
    ) -> Result<String, ProviderError> {
        let target = if engine.url.contains("%CLIPBOARD%") {
            let clipboard = clipboard.unwrap_or_default();
            if clipboard.is_empty() {
                return Err(ProviderError::CommandFailed("empty clipboard".into()));
            }
            engine.url.replace("%CLIPBOARD%", &escape(clipboard))
        } else {
            engine.url.replace("%TERM%", &escape(term.trim()))
        };
        Ok(format!("{} {}", self.cfg.command, sh_quote(&target)))
    }

    /// Build the opener command line for an indexed-engine search.
    fn resolve_search(
        &self,
        identifier: &str,
        query: &str,
        arguments: &str,
        clipboard: Option<&str>,
    ) -> Result<String, ProviderError> {
        let engine = self.engine_by_identifier(identifier)?;
        let mut term = self.stripped_query(query);
        if !arguments.is_empty() {
            term = arguments;
        }
        self.build_command(engine, term, clipboard)
    }

    /// Engines-as-actions activation: the action name picks the engine and
    /// the typed query is the term.
    fn resolve_engine_action(
        &self,
        action: &str,
        query: &str,
        clipboard: Option<&str>,
    ) -> Result<String, ProviderError> {
        let engine = self
            .engine_by_name(action)
            .ok_or_else(|| ProviderError::UnknownAction(action.into()))?;
        self.build_command(engine, query, clipboard)
    }

    /// Read the clipboard only when the engine's URL asks for it.
    async fn clipboard_for(&self, engine: &EngineSettings) -> Option<String> {
        if engine.url.contains("%CLIPBOARD%") {
            Some(clipboard_text().await)
        } else {
            None
        }
    }
}

fn escape(term: &str) -> String {
    url::form_urlencoded::byte_serialize(term.as_bytes()).collect()
}

#[async_trait]
impl Provider for WebsearchProvider {
    fn name(&self) -> &'static str {
        "websearch"
    }

    fn pretty_name(&self) -> &str {
        "Websearch"
    }

    fn icon(&self) -> &str {
        &self.cfg.icon
    }

    async fn query(&self, ctx: QueryContext) -> Vec<Item> {
        if self.cfg.engines_as_actions {
            return vec![Item {
                identifier: "websearch".into(),
                text: format!("{}{}", self.cfg.text_prefix, ctx.query),
                icon: self.cfg.icon.clone(),
                provider: "websearch".into(),
                score: 1,
                actions: self.engines.iter().map(|e| e.name.clone()).collect(),
                ..Default::default()
            }];
        }

        let mut items = Vec::new();

        if ctx.single {
            for (idx, engine) in self.engines.iter().enumerate() {
                let mut item = self.engine_item(idx, engine, 100 - idx as i32);

                if !ctx.query.is_empty() {
                    match fuzzy::score(&ctx.query, &engine.name, ctx.exact) {
                        Some(m) => {
                            item.score = m.score;
                            item.fuzzy_info = Some(FuzzyInfo::text(m.positions, m.start));
                        }
                        None => item.score = 0,
                    }
                }

                if self.cfg.history && item.score > self.cfg.min_score {
                    let usage = self.history.usage_score(&ctx.query, &item.identifier);
                    if usage != 0 {
                        item.state.push("history".into());
                        item.actions.push(elephant_history::ACTION_DELETE.into());
                        item.score += usage;
                    }
                }

                if item.score > self.cfg.min_score || ctx.query.is_empty() {
                    items.push(item);
                }
            }
        }

        if items.is_empty() || !ctx.single {
            let prefix = self.matched_prefix(&ctx.query).map(|e| e.prefix.clone());
            for (idx, engine) in self.engines.iter().enumerate() {
                let by_prefix = prefix.as_deref().is_some_and(|p| engine.prefix == p);
                if engine.default || by_prefix {
                    items.push(self.engine_item(idx, engine, 15 - idx as i32));
                }
            }
        }

        items
    }

    async fn activate(&self, ctx: ActivateContext) -> Result<(), ProviderError> {
        match ctx.action.as_str() {
            elephant_history::ACTION_DELETE => {
                self.history.remove(&ctx.identifier);
                Ok(())
            }
            "" | ACTION_SEARCH => {
                let engine = self.engine_by_identifier(&ctx.identifier)?;
                let clipboard = self.clipboard_for(engine).await;
                let command = self.resolve_search(
                    &ctx.identifier,
                    &ctx.query,
                    &ctx.arguments,
                    clipboard.as_deref(),
                )?;
                spawn_detached(&command)?;
                if self.cfg.history {
                    self.history
                        .save(self.stripped_query(&ctx.query), &ctx.identifier);
                }
                Ok(())
            }
            action if self.cfg.engines_as_actions => {
                let Some(engine) = self.engine_by_name(action) else {
                    return Err(ProviderError::UnknownAction(action.into()));
                };
                let clipboard = self.clipboard_for(engine).await;
                let command = self.resolve_engine_action(action, &ctx.query, clipboard.as_deref())?;
                spawn_detached(&command)?;
                if self.cfg.history {
                    self.history.save(&ctx.query, &ctx.identifier);
                }
                Ok(())
            }
            other => Err(ProviderError::UnknownAction(other.into())),
        }
    }
}
