//! Built-in providers. Each one implements `elephant_core::Provider`; the
//! daemon registers them at startup and talks to them only through the trait.

pub mod bluetooth;
pub mod desktopapps;
mod exec;
pub mod fuzzy;
pub mod menus;
pub mod websearch;

use std::path::Path;
use std::sync::Arc;

use elephant_core::config::Settings;
use elephant_core::{Provider, ProviderUpdates};
use elephant_history::History;

pub use bluetooth::BluetoothProvider;
pub use desktopapps::DesktopAppsProvider;
pub use menus::MenusProvider;
pub use websearch::WebsearchProvider;

/// Construct the built-in provider set. The menus provider is returned
/// separately as well, so callers can expand its named menus in listings.
pub fn builtins(
    settings: &Settings,
    config_dir: &Path,
    updates: ProviderUpdates,
) -> (Arc<MenusProvider>, Vec<Arc<dyn Provider>>) {
    let menus = Arc::new(MenusProvider::load(settings, config_dir));
    let all: Vec<Arc<dyn Provider>> = vec![
        Arc::clone(&menus) as Arc<dyn Provider>,
        Arc::new(WebsearchProvider::new(
            settings.websearch.clone(),
            History::load("websearch"),
        )),
        Arc::new(BluetoothProvider::new(settings.bluetooth.clone(), updates)),
        Arc::new(DesktopAppsProvider::load(
            settings.desktopapps.clone(),
            History::load("desktopapps"),
        )),
    ];
    (menus, all)
}
