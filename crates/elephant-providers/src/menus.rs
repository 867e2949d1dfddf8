//! Named menus loaded from declarative definitions on disk. The provider
//! appears once in the registry; a query addresses a specific menu through
//! the `<menu>:<query>` routing prefix. Entries can chain into submenus:
//! their identifiers carry a `menus:<submenu>:` prefix that the client
//! follows by issuing the next routed query.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use elephant_core::config::Settings;
use elephant_core::{ActivateContext, FuzzyInfo, Item, Provider, ProviderError, QueryContext};
use elephant_history::History;

use crate::exec::{sh_quote, spawn_detached, spawn_in_terminal};
use crate::fuzzy;

/// One menu definition (`menus/*.toml`).
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MenuDef {
    pub name: String,
    pub name_pretty: String,
    /// Used as the subtext of entries that have none.
    pub description: String,
    pub icon: String,
    /// Default action template; `%VALUE%` expands to the entry value.
    pub action: String,
    /// Run actions inside the user's terminal emulator.
    pub terminal: bool,
    /// Keep declaration order instead of sorting alphabetically.
    pub fixed_order: bool,
    pub hide_from_providerlist: bool,
    /// Submenu every entry of this menu opens on activation.
    pub submenu: String,
    /// Bias scores with recorded usage.
    pub history: bool,
    /// Apply the usage bias even when the query is empty.
    pub history_when_empty: bool,
    pub min_score: i32,
    pub entries: Vec<MenuEntry>,
}

impl Default for MenuDef {
    fn default() -> Self {
        Self {
            name: String::new(),
            name_pretty: String::new(),
            description: String::new(),
            icon: String::new(),
            action: String::new(),
            terminal: false,
            fixed_order: false,
            hide_from_providerlist: false,
            submenu: String::new(),
            history: false,
            history_when_empty: false,
            min_score: 10,
            entries: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct MenuEntry {
    pub text: String,
    pub subtext: String,
    /// Value handed to the action template; falls back to `text`.
    pub value: String,
    pub icon: String,
    /// Overrides the menu's default action template.
    pub action: String,
    /// Overrides the menu's terminal flag.
    pub terminal: bool,
    /// Submenu this entry opens instead of running an action. A `dmenu:`
    /// prefix launches that command as an external picker.
    pub submenu: String,
    /// Extra searchable terms.
    pub keywords: Vec<String>,
    /// State tokens forwarded on the item, e.g. to mark the current choice.
    pub state: Vec<String>,
}

impl MenuEntry {
    fn value(&self) -> &str {
        if self.value.is_empty() {
            &self.text
        } else {
            &self.value
        }
    }
}

/// What activating an identifier amounts to.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Activation {
    Run {
        command: String,
        terminal: bool,
        record_history: bool,
    },
    /// External picker (`dmenu:`-prefixed submenu).
    Picker { command: String },
    /// Client-side submenu navigation; nothing runs server-side.
    Navigate,
}

pub struct MenusProvider {
    menus: Vec<MenuDef>,
    by_name: HashMap<String, usize>,
    history: History,
}

impl MenusProvider {
    pub fn new(defs: Vec<MenuDef>, history: History) -> Self {
        let mut by_name = HashMap::new();
        for (i, def) in defs.iter().enumerate() {
            if by_name.insert(def.name.clone(), i).is_some() {
                tracing::warn!(menu = %def.name, "Duplicate menu name, later definition wins");
            }
        }
        Self {
            menus: defs,
            by_name,
            history,
        }
    }

    /// Scan `<config>/menus` plus any configured extra paths for `*.toml`
    /// definitions. Malformed files are logged and skipped.
    pub fn load(settings: &Settings, config_dir: &Path) -> Self {
        let mut dirs = vec![config_dir.join("menus")];
        dirs.extend(settings.menus.paths.iter().cloned());

        let mut defs = Vec::new();
        for dir in dirs {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().map_or(true, |e| e != "toml") {
                    continue;
                }
                match std::fs::read_to_string(&path)
                    .map_err(|e| e.to_string())
                    .and_then(|raw| toml::from_str::<MenuDef>(&raw).map_err(|e| e.to_string()))
                {
                    Ok(def) if !def.name.is_empty() => defs.push(def),
                    Ok(_) => {
                        tracing::warn!(path = %path.display(), "Menu definition without a name, skipping")
                    }
                    Err(e) => {
                        tracing::error!(path = %path.display(), error = %e, "Unreadable menu definition")
                    }
                }
            }
        }

        tracing::info!(menus = defs.len(), "Menus loaded");
        Self::new(defs, History::load("menus"))
    }

    /// `(name, pretty_name, hidden)` per menu, for provider listings.
    pub fn menu_list(&self) -> Vec<(String, String, bool)> {
        self.menus
            .iter()
            .map(|m| {
                let pretty = if m.name_pretty.is_empty() {
                    m.name.clone()
                } else {
                    m.name_pretty.clone()
                };
                (m.name.clone(), pretty, m.hide_from_providerlist)
            })
            .collect()
    }

    fn menu(&self, name: &str) -> Option<&MenuDef> {
        self.by_name.get(name).map(|&i| &self.menus[i])
    }

    /// Resolve an activation: run an action, launch a picker, or recognize a
    /// submenu hop the client performs itself.
    fn resolve_activation(
        &self,
        identifier: &str,
        action: &str,
    ) -> Result<Activation, ProviderError> {
        let target = parse_identifier(identifier)
            .ok_or_else(|| ProviderError::UnknownItem(identifier.into()))?;
        let menu = self
            .menu(target.menu)
            .ok_or_else(|| ProviderError::UnknownItem(identifier.into()))?;
        let entry = menu
            .entries
            .get(target.index)
            .ok_or_else(|| ProviderError::UnknownItem(identifier.into()))?;

        if let Some(submenu) = target.submenu {
            if let Some(picker) = submenu.strip_prefix("dmenu:") {
                return Ok(Activation::Picker {
                    command: picker.to_string(),
                });
            }
            return Ok(Activation::Navigate);
        }

        if !action.is_empty() && action != "default" {
            return Err(ProviderError::UnknownAction(action.into()));
        }

        let template = if entry.action.is_empty() {
            &menu.action
        } else {
            &entry.action
        };
        if template.is_empty() {
            return Err(ProviderError::UnknownAction("default".into()));
        }

        Ok(Activation::Run {
            command: template.replace("%VALUE%", &sh_quote(entry.value())),
            terminal: entry.terminal || menu.terminal,
            record_history: menu.history,
        })
    }
}

/// `menus:<submenu>:<menu>:<index>` for submenu entries, `<menu>:<index>`
/// otherwise.
fn entry_identifier(menu: &MenuDef, index: usize, entry: &MenuEntry) -> String {
    let submenu = if !entry.submenu.is_empty() {
        &entry.submenu
    } else {
        &menu.submenu
    };
    if submenu.is_empty() {
        format!("{}:{}", menu.name, index)
    } else {
        format!("menus:{}:{}:{}", submenu, menu.name, index)
    }
}

struct Target<'a> {
    submenu: Option<&'a str>,
    menu: &'a str,
    index: usize,
}

/// Parse both identifier shapes. The submenu segment may itself contain
/// colons (`dmenu:<command>`), so the tail is parsed from the right.
fn parse_identifier(identifier: &str) -> Option<Target<'_>> {
    if let Some(rest) = identifier.strip_prefix("menus:") {
        let mut parts = rest.rsplitn(3, ':');
        let index = parts.next()?.parse().ok()?;
        let menu = parts.next()?;
        let submenu = parts.next()?;
        return Some(Target {
            submenu: Some(submenu),
            menu,
            index,
        });
    }
    let (menu, index) = identifier.split_once(':')?;
    Some(Target {
        submenu: None,
        menu,
        index: index.parse().ok()?,
    })
}

#[async_trait]
impl Provider for MenusProvider {
    fn name(&self) -> &'static str {
        "menus"
    }

    fn pretty_name(&self) -> &str {
        "Menus"
    }

    fn icon(&self) -> &str {
        "open-menu-symbolic"
    }

    async fn query(&self, ctx: QueryContext) -> Vec<Item> {
        // the dispatcher routes `menus:<menu>` requests as `<menu>:<query>`
        let Some((menu_name, rest)) = ctx.query.split_once(':') else {
            return Vec::new();
        };
        let Some(menu) = self.menu(menu_name) else {
            tracing::debug!(menu = menu_name, "Query for unknown menu");
            return Vec::new();
        };

        let mut items = Vec::new();
        for (idx, entry) in menu.entries.iter().enumerate() {
            let mut item = Item {
                identifier: entry_identifier(menu, idx, entry),
                text: entry.text.clone(),
                subtext: if entry.subtext.is_empty() {
                    menu.description.clone()
                } else {
                    entry.subtext.clone()
                },
                icon: if entry.icon.is_empty() {
                    menu.icon.clone()
                } else {
                    entry.icon.clone()
                },
                provider: "menus".into(),
                score: if menu.fixed_order {
                    (menu.entries.len() - idx) as i32
                } else {
                    0
                },
                state: entry.state.clone(),
                ..Default::default()
            };

            if !rest.is_empty() {
                let text_match = fuzzy::score(rest, &entry.text, ctx.exact);
                let keyword_match = entry
                    .keywords
                    .iter()
                    .filter_map(|k| fuzzy::score(rest, k, ctx.exact))
                    .max_by_key(|m| m.score);

                match (text_match, keyword_match) {
                    (Some(m), k) if k.as_ref().map_or(true, |k| m.score >= k.score) => {
                        item.score = m.score;
                        item.fuzzy_info = Some(FuzzyInfo::text(m.positions, m.start));
                    }
                    (Some(m), None) => {
                        item.score = m.score;
                        item.fuzzy_info = Some(FuzzyInfo::text(m.positions, m.start));
                    }
                    (_, Some(k)) => item.score = k.score,
                    (None, None) => continue,
                }
                if item.score <= menu.min_score {
                    continue;
                }
            }

            if menu.history && (!rest.is_empty() || menu.history_when_empty) {
                let usage = self.history.usage_score(rest, &item.identifier);
                if usage != 0 {
                    item.state.push("history".into());
                    item.actions.push(elephant_history::ACTION_DELETE.into());
                    item.score += usage;
                }
            }

            items.push(item);
        }
        items
    }

    async fn activate(&self, ctx: ActivateContext) -> Result<(), ProviderError> {
        if ctx.action == elephant_history::ACTION_DELETE {
            self.history.remove(&ctx.identifier);
            return Ok(());
        }

        match self.resolve_activation(&ctx.identifier, &ctx.action)? {
            Activation::Run {
                command,
                terminal,
                record_history,
            } => {
                if terminal {
                    spawn_in_terminal(&command)?;
                } else {
                    spawn_detached(&command)?;
                }
                if record_history {
                    self.history.save(&ctx.query, &ctx.identifier);
                }
                Ok(())
            }
            Activation::Picker { command } => {
                spawn_detached(&command)?;
                Ok(())
            }
            Activation::Navigate => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    struct NullSink;

    #[async_trait]
    impl elephant_core::UpdateSink for NullSink {
        async fn push_item(&self, _query: &str, _item: Item) {}
    }

    fn ctx(query: &str) -> QueryContext {
        QueryContext {
            query: query.into(),
            single: true,
            exact: false,
            cancel: CancellationToken::new(),
            sink: Arc::new(NullSink),
        }
    }

    fn provider(defs: Vec<MenuDef>) -> MenusProvider {
        MenusProvider::new(defs, History::in_memory())
    }

    fn networks_menu() -> MenuDef {
        toml::from_str(
            r#"
            name = "networks"
            name_pretty = "Networks"
            icon = "network-wireless"
            action = "nmcli connection up %VALUE%"

            [[entries]]
            text = "Home Wifi"
            value = "home"
            state = ["current"]

            [[entries]]
            text = "Office"
            value = "office"
            keywords = ["work"]
            action = "nmcli connection up %VALUE% --ask"
            "#,
        )
        .unwrap()
    }

    fn power_menu() -> MenuDef {
        toml::from_str(
            r#"
            name = "power"
            name_pretty = "Power"
            action = "systemctl %VALUE%"

            [[entries]]
            text = "Monitor"
            value = "status"
            terminal = true

            [[entries]]
            text = "Wifi Networks"
            submenu = "networks"

            [[entries]]
            text = "Pick session"
            submenu = "dmenu:fuzzel --dmenu"
            "#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn routed_query_reaches_named_menu() {
        let p = provider(vec![networks_menu()]);
        let items = p.query(ctx("networks:wifi")).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].text, "Home Wifi");
        assert_eq!(items[0].provider, "menus");
        assert!(items[0].fuzzy_info.is_some());
    }

    #[tokio::test]
    async fn empty_rest_lists_every_entry() {
        let p = provider(vec![networks_menu()]);
        let items = p.query(ctx("networks:")).await;
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn entry_state_tokens_are_forwarded() {
        let p = provider(vec![networks_menu()]);
        let items = p.query(ctx("networks:")).await;
        assert_eq!(items[0].state, vec!["current"]);
        assert!(items[1].state.is_empty());
    }

    #[tokio::test]
    async fn keywords_match_without_fuzzy_info() {
        let p = provider(vec![networks_menu()]);
        let items = p.query(ctx("networks:work")).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].text, "Office");
        assert!(items[0].fuzzy_info.is_none());
    }

    #[tokio::test]
    async fn unknown_menu_yields_nothing() {
        let p = provider(vec![networks_menu()]);
        assert!(p.query(ctx("ghosts:boo")).await.is_empty());
    }

    #[tokio::test]
    async fn fixed_order_scores_by_position() {
        let mut def = networks_menu();
        def.fixed_order = true;
        let p = provider(vec![def]);
        let items = p.query(ctx("networks:")).await;
        assert!(items[0].score > items[1].score);
    }

    #[tokio::test]
    async fn submenu_entries_carry_routing_identifiers() {
        let p = provider(vec![power_menu()]);
        let items = p.query(ctx("power:")).await;
        assert_eq!(items[0].identifier, "power:0");
        assert_eq!(items[1].identifier, "menus:networks:power:1");
        assert_eq!(items[2].identifier, "menus:dmenu:fuzzel --dmenu:power:2");
    }

    #[tokio::test]
    async fn menu_level_submenu_applies_to_all_entries() {
        let mut def = networks_menu();
        def.submenu = "details".into();
        let p = provider(vec![def]);
        let items = p.query(ctx("networks:")).await;
        assert!(items
            .iter()
            .all(|i| i.identifier.starts_with("menus:details:networks:")));
    }

    #[tokio::test]
    async fn history_biases_and_tags_entries() {
        let mut def = networks_menu();
        def.history = true;
        let p = provider(vec![def]);
        p.history.save("wif", "networks:0");

        let items = p.query(ctx("networks:wif")).await;
        let home = items.iter().find(|i| i.text == "Home Wifi").unwrap();
        assert!(home.state.contains(&"history".to_string()));
        assert!(home
            .actions
            .contains(&elephant_history::ACTION_DELETE.to_string()));
    }

    #[tokio::test]
    async fn history_when_empty_biases_unfiltered_listing() {
        let mut def = networks_menu();
        def.history = true;
        def.history_when_empty = true;
        let p = provider(vec![def]);
        p.history.save("", "networks:1");

        let items = p.query(ctx("networks:")).await;
        let office = items.iter().find(|i| i.text == "Office").unwrap();
        let home = items.iter().find(|i| i.text == "Home Wifi").unwrap();
        assert!(office.score > home.score);

        // without the flag the empty-query listing stays unbiased
        let mut def = networks_menu();
        def.history = true;
        let p = provider(vec![def]);
        p.history.save("", "networks:1");
        let items = p.query(ctx("networks:")).await;
        assert!(items.iter().all(|i| !i.state.contains(&"history".to_string())));
    }

    #[tokio::test]
    async fn delete_action_clears_menu_history() {
        let mut def = networks_menu();
        def.history = true;
        let p = provider(vec![def]);
        p.history.save("wif", "networks:0");

        p.activate(ActivateContext {
            identifier: "networks:0".into(),
            action: elephant_history::ACTION_DELETE.into(),
            query: String::new(),
            arguments: String::new(),
            sink: Arc::new(NullSink),
        })
        .await
        .unwrap();
        assert_eq!(p.history.usage_score("wif", "networks:0"), 0);
    }

    #[test]
    fn entry_action_overrides_menu_action() {
        let p = provider(vec![networks_menu()]);
        match p.resolve_activation("networks:1", "").unwrap() {
            Activation::Run { command, .. } => {
                assert_eq!(command, "nmcli connection up office --ask")
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn default_action_expands_value() {
        let p = provider(vec![networks_menu()]);
        match p.resolve_activation("networks:0", "default").unwrap() {
            Activation::Run { command, terminal, .. } => {
                assert_eq!(command, "nmcli connection up home");
                assert!(!terminal);
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn value_is_shell_quoted() {
        let mut def = networks_menu();
        def.entries[0].value = "home network; rm -rf".into();
        let p = provider(vec![def]);
        match p.resolve_activation("networks:0", "").unwrap() {
            Activation::Run { command, .. } => {
                assert_eq!(command, "nmcli connection up 'home network; rm -rf'")
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn terminal_flag_comes_from_entry_or_menu() {
        let p = provider(vec![power_menu()]);
        match p.resolve_activation("power:0", "").unwrap() {
            Activation::Run { terminal, .. } => assert!(terminal),
            other => panic!("expected run, got {other:?}"),
        }

        let mut def = networks_menu();
        def.terminal = true;
        let p = provider(vec![def]);
        match p.resolve_activation("networks:0", "").unwrap() {
            Activation::Run { terminal, .. } => assert!(terminal),
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn submenu_identifier_resolves_to_navigation() {
        let p = provider(vec![power_menu()]);
        assert_eq!(
            p.resolve_activation("menus:networks:power:1", "").unwrap(),
            Activation::Navigate
        );
    }

    #[test]
    fn dmenu_submenu_resolves_to_picker() {
        let p = provider(vec![power_menu()]);
        match p
            .resolve_activation("menus:dmenu:fuzzel --dmenu:power:2", "")
            .unwrap()
        {
            Activation::Picker { command } => assert_eq!(command, "fuzzel --dmenu"),
            other => panic!("expected picker, got {other:?}"),
        }
    }

    #[test]
    fn bad_identifier_is_unknown_item() {
        let p = provider(vec![networks_menu()]);
        assert!(matches!(
            p.resolve_activation("networks:99", ""),
            Err(ProviderError::UnknownItem(_))
        ));
        assert!(matches!(
            p.resolve_activation("noseparator", ""),
            Err(ProviderError::UnknownItem(_))
        ));
    }

    #[test]
    fn menu_list_prefers_pretty_names() {
        let p = provider(vec![networks_menu()]);
        let list = p.menu_list();
        assert_eq!(list, vec![("networks".into(), "Networks".into(), false)]);
    }
}
