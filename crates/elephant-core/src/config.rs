use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Resolve the configuration directory: explicit override, then
/// `$XDG_CONFIG_HOME/elephant`, then `~/.config/elephant`.
pub fn config_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg.is_empty() {
            return PathBuf::from(xdg).join("elephant");
        }
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home).join(".config").join("elephant")
}

/// Daemon settings, read from `elephant.toml` in the config directory.
/// A missing file yields defaults; a malformed file is logged and skipped.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub websearch: WebsearchSettings,
    pub menus: MenusSettings,
    pub bluetooth: SectionSettings,
    pub desktopapps: SectionSettings,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct WebsearchSettings {
    pub engines: Vec<EngineSettings>,
    /// Keep the default engine visible even when multi-provider results
    /// overflow the display budget.
    pub always_show_default: bool,
    pub history: bool,
    /// Offer one search item whose actions are the engine names, instead of
    /// one item per engine.
    pub engines_as_actions: bool,
    /// Display prefix for the synthesized item in engines-as-actions mode.
    pub text_prefix: String,
    /// Opener command; the expanded URL is appended.
    pub command: String,
    pub icon: String,
    pub min_score: i32,
}

impl Default for WebsearchSettings {
    fn default() -> Self {
        Self {
            engines: Vec::new(),
            always_show_default: true,
            history: true,
            engines_as_actions: false,
            text_prefix: "Search: ".into(),
            command: "xdg-open".into(),
            icon: "applications-internet".into(),
            min_score: 20,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub name: String,
    /// Search URL; `%TERM%` is replaced with the escaped query.
    pub url: String,
    /// Typing this prefix actively routes to the engine (e.g. `"g "`).
    pub prefix: String,
    /// Shown when querying multiple providers.
    pub default: bool,
    pub icon: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct MenusSettings {
    /// Additional directories to scan for menu definitions, on top of
    /// `<config>/menus`.
    pub paths: Vec<PathBuf>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SectionSettings {
    pub icon: Option<String>,
    pub min_score: i32,
    pub hide_from_providerlist: bool,
}

impl Default for SectionSettings {
    fn default() -> Self {
        Self {
            icon: None,
            min_score: 20,
            hide_from_providerlist: false,
        }
    }
}

impl Settings {
    /// Load from `<dir>/elephant.toml` and apply fallbacks.
    pub fn load(dir: &Path) -> Self {
        let path = dir.join("elephant.toml");
        let mut settings = match std::fs::read_to_string(&path) {
            Ok(raw) => match toml::from_str::<Settings>(&raw) {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Malformed settings file, using defaults");
                    Settings::default()
                }
            },
            Err(_) => Settings::default(),
        };
        settings.normalize();
        settings
    }

    /// A websearch setup always has at least one engine; a sole engine is
    /// the default engine.
    fn normalize(&mut self) {
        if self.websearch.engines.is_empty() {
            self.websearch.engines.push(EngineSettings {
                name: "Google".into(),
                url: "https://www.google.com/search?q=%TERM%".into(),
                default: true,
                ..Default::default()
            });
        }
        if self.websearch.engines.len() == 1 {
            self.websearch.engines[0].default = true;
        }
    }
}
