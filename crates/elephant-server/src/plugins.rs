//! User-installed provider discovery. Each shared object in the provider
//! search path exports a single constructor symbol; binding it yields a
//! `Provider` trait object that joins the built-in set in the registry.

use std::path::Path;
use std::sync::Arc;

use libloading::{Library, Symbol};

use elephant_core::Provider;

use crate::registry::ProviderRegistry;

/// Symbol every provider shared object must export.
pub const ENTRYPOINT: &[u8] = b"_elephant_init";

/// Keeps the loaded libraries alive for as long as their providers are
/// registered. Dropping this while the registry still holds bound providers
/// would unmap their code.
#[derive(Default)]
pub struct PluginLoader {
    _libraries: Vec<Library>,
}

impl PluginLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind every `*.so` in `dir` and register the provider it constructs.
    /// A missing directory is fine; a candidate that fails to bind is
    /// logged and skipped.
    ///
    /// # Safety
    ///
    /// Loads and runs arbitrary code from the provider search path. The
    /// constructor must return a heap pointer to a `dyn Provider` built by
    /// the same toolchain.
    pub unsafe fn load_dir(&mut self, registry: &mut ProviderRegistry, dir: &Path) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || path.extension().map_or(true, |e| e != "so") {
                continue;
            }
            match unsafe { self.bind(&path) } {
                Ok(provider) => {
                    tracing::info!(path = %path.display(), provider = provider.name(), "Provider plugin loaded");
                    registry.register(Arc::from(provider));
                }
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Provider plugin rejected");
                }
            }
        }
    }

    unsafe fn bind(&mut self, path: &Path) -> Result<Box<dyn Provider>, libloading::Error> {
        let library = unsafe { Library::new(path) }?;
        let constructor: Symbol<unsafe extern "C" fn() -> *mut dyn Provider> =
            unsafe { library.get(ENTRYPOINT) }?;
        let provider = unsafe { Box::from_raw(constructor()) };
        self._libraries.push(library);
        Ok(provider)
    }
}
