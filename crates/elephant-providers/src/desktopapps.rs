//! Desktop application launcher entries, indexed once at startup from the
//! XDG data directories.

use async_trait::async_trait;
use freedesktop_desktop_entry::DesktopEntry;
use walkdir::WalkDir;

use elephant_core::config::SectionSettings;
use elephant_core::{ActivateContext, FuzzyInfo, Item, Provider, ProviderError, QueryContext};
use elephant_history::History;

use crate::exec::spawn_detached;
use crate::fuzzy;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct App {
    /// Desktop file id, e.g. `org.mozilla.firefox.desktop`.
    pub id: String,
    pub name: String,
    pub comment: String,
    pub exec: String,
    pub icon: String,
}

pub struct DesktopAppsProvider {
    apps: Vec<App>,
    cfg: SectionSettings,
    history: History,
}

impl DesktopAppsProvider {
    pub fn new(apps: Vec<App>, cfg: SectionSettings, history: History) -> Self {
        Self { apps, cfg, history }
    }

    pub fn load(cfg: SectionSettings, history: History) -> Self {
        let apps = index_applications();
        tracing::info!(apps = apps.len(), "Desktop applications indexed");
        Self::new(apps, cfg, history)
    }

    fn items(&self, query: &str, exact: bool) -> Vec<Item> {
        let mut items = Vec::new();
        for app in &self.apps {
            let mut item = Item {
                identifier: app.id.clone(),
                text: app.name.clone(),
                subtext: app.comment.clone(),
                icon: if app.icon.is_empty() {
                    self.cfg.icon.clone().unwrap_or_default()
                } else {
                    app.icon.clone()
                },
                provider: "desktopapps".into(),
                ..Default::default()
            };

            if !query.is_empty() {
                let Some(m) = fuzzy::score(query, &app.name, exact) else {
                    continue;
                };
                item.score = m.score;
                item.fuzzy_info = Some(FuzzyInfo::text(m.positions, m.start));
                if item.score <= self.cfg.min_score {
                    continue;
                }
            }

            let usage = self.history.usage_score(query, &item.identifier);
            if usage != 0 {
                item.state.push("history".into());
                item.actions.push(elephant_history::ACTION_DELETE.into());
                item.score += usage;
            }

            items.push(item);
        }
        items
    }

    fn app(&self, identifier: &str) -> Option<&App> {
        self.apps.iter().find(|a| a.id == identifier)
    }
}

#[async_trait]
impl Provider for DesktopAppsProvider {
    fn name(&self) -> &'static str {
        "desktopapps"
    }

    fn pretty_name(&self) -> &str {
        "Applications"
    }

    fn icon(&self) -> &str {
        self.cfg.icon.as_deref().unwrap_or("applications-other")
    }

    fn hidden_from_list(&self) -> bool {
        self.cfg.hide_from_providerlist
    }

    async fn query(&self, ctx: QueryContext) -> Vec<Item> {
        self.items(&ctx.query, ctx.exact)
    }

    async fn activate(&self, ctx: ActivateContext) -> Result<(), ProviderError> {
        match ctx.action.as_str() {
            elephant_history::ACTION_DELETE => {
                self.history.remove(&ctx.identifier);
                Ok(())
            }
            "" | "open" => {
                let app = self
                    .app(&ctx.identifier)
                    .ok_or_else(|| ProviderError::UnknownItem(ctx.identifier.clone()))?;
                spawn_detached(&strip_field_codes(&app.exec))?;
                self.history.save(&ctx.query, &ctx.identifier);
                Ok(())
            }
            other => Err(ProviderError::UnknownAction(other.into())),
        }
    }
}

/// Remove `%f`-style field codes from an Exec line; the daemon never passes
/// files or URLs along.
fn strip_field_codes(exec: &str) -> String {
    exec.split_whitespace()
        .filter(|tok| !(tok.len() == 2 && tok.starts_with('%')))
        .collect::<Vec<_>>()
        .join(" ")
}

fn index_applications() -> Vec<App> {
    let Ok(xdg_dirs) = xdg::BaseDirectories::new() else {
        return Vec::new();
    };

    let mut dirs = vec![xdg_dirs.get_data_home()];
    dirs.extend(xdg_dirs.get_data_dirs());

    let mut apps = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for dir in dirs {
        let app_dir = dir.join("applications");
        for entry in WalkDir::new(&app_dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "desktop"))
        {
            let Some(app) = parse_desktop_file(entry.path()) else {
                continue;
            };
            if seen.insert(app.id.clone()) {
                apps.push(app);
            }
        }
    }
    apps
}

fn parse_desktop_file(path: &std::path::Path) -> Option<App> {
    let content = std::fs::read_to_string(path).ok()?;
    let entry = DesktopEntry::decode(path, &content).ok()?;

    if entry.no_display() || entry.type_() != Some("Application") {
        return None;
    }

    Some(App {
        id: path.file_name()?.to_string_lossy().into_owned(),
        name: entry.name(None)?.to_string(),
        comment: entry.comment(None).unwrap_or_default().to_string(),
        exec: entry.exec()?.to_string(),
        icon: entry.icon().unwrap_or_default().to_string(),
    })
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

    fn apps() -> Vec<App> {
        vec![
            App {
                id: "firefox.desktop".into(),
                name: "Firefox".into(),
                comment: "Browse the web".into(),
                exec: "firefox %u".into(),
                icon: "firefox".into(),
            },
            App {
                id: "files.desktop".into(),
                name: "Files".into(),
                comment: "File manager".into(),
                exec: "nautilus --new-window %U".into(),
                icon: "system-file-manager".into(),
            },
        ]
    }

    fn provider() -> DesktopAppsProvider {
        DesktopAppsProvider::new(apps(), SectionSettings::default(), History::in_memory())
    }

    #[test]
    fn empty_query_lists_everything() {
        let items = provider().items("", false);
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.provider == "desktopapps"));
    }

    #[test]
    fn fuzzy_query_filters_and_annotates() {
        let items = provider().items("fire", false);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].text, "Firefox");
        assert!(items[0].fuzzy_info.is_some());
        assert!(items[0].score > 0);
    }

    #[test]
    fn history_biases_and_tags_items() {
        let p = provider();
        p.history.save("fi", "files.desktop");

        let items = p.items("fi", false);
        let files = items.iter().find(|i| i.text == "Files").unwrap();
        let firefox = items.iter().find(|i| i.text == "Firefox").unwrap();
        assert!(files.state.contains(&"history".to_string()));
        assert!(files
            .actions
            .contains(&elephant_history::ACTION_DELETE.to_string()));
        assert!(!firefox.state.contains(&"history".to_string()));
    }

    #[test]
    fn field_codes_are_stripped() {
        assert_eq!(strip_field_codes("firefox %u"), "firefox");
        assert_eq!(
            strip_field_codes("nautilus --new-window %U"),
            "nautilus --new-window"
        );
        assert_eq!(strip_field_codes("app"), "app");
    }

    #[tokio::test]
    async fn delete_action_clears_history() {
        let p = provider();
        p.history.save("fi", "files.desktop");
        p.activate(ActivateContext {
            identifier: "files.desktop".into(),
            action: elephant_history::ACTION_DELETE.into(),
            query: String::new(),
            arguments: String::new(),
            sink: Arc::new(NullSink),
        })
        .await
        .unwrap();
        assert_eq!(p.history.usage_score("fi", "files.desktop"), 0);
    }

    #[tokio::test]
    async fn activating_unknown_item_errors() {
        let p = provider();
        let err = p
            .activate(ActivateContext {
                identifier: "ghost.desktop".into(),
                action: String::new(),
                query: String::new(),
                arguments: String::new(),
                sink: Arc::new(NullSink),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnknownItem(_)));
    }

    #[tokio::test]
    async fn query_respects_provider_contract() {
        let p = provider();
        let items = p
            .query(QueryContext {
                query: "files".into(),
                single: true,
                exact: false,
                cancel: CancellationToken::new(),
                sink: Arc::new(NullSink),
            })
            .await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].identifier, "files.desktop");
    }
}
