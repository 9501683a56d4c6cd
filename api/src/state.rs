//! Application state module.
//!
//! Holds the current datasource instance. Settings changes swap in a new
//! instance; the previous one is disposed once no request still uses it.

use shared::datasource::Datasource;
use std::ops::Deref;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A datasource instance that disposes itself when its last holder lets go.
pub struct Instance(Arc<Datasource>);

impl Deref for Instance {
    type Target = Datasource;

    fn deref(&self) -> &Datasource {
        &self.0
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        let datasource = Arc::clone(&self.0);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { datasource.dispose().await });
            }
            Err(_) => tracing::warn!("No runtime to dispose datasource on"),
        }
    }
}

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    datasource: Arc<RwLock<Arc<Instance>>>,
}

impl AppState {
    /// Creates a new application state around a live datasource.
    #[must_use]
    pub fn new(datasource: Datasource) -> Self {
        Self {
            datasource: Arc::new(RwLock::new(Arc::new(Instance(Arc::new(datasource))))),
        }
    }

    /// Returns the current datasource instance.
    ///
    /// The instance stays usable for as long as the caller holds it, even if
    /// settings replace it in the meantime.
    pub async fn datasource(&self) -> Arc<Instance> {
        Arc::clone(&*self.datasource.read().await)
    }

    /// Makes `next` the current instance.
    ///
    /// The previous instance is disposed here when nothing else holds it,
    /// otherwise by whichever in-flight request releases it last.
    pub async fn replace(&self, next: Datasource) {
        let previous = {
            let mut current = self.datasource.write().await;
            std::mem::replace(&mut *current, Arc::new(Instance(Arc::new(next))))
        };
        match Arc::try_unwrap(previous) {
            Ok(instance) => instance.dispose().await,
            Err(_) => tracing::debug!("Previous datasource still in use, disposal deferred"),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
