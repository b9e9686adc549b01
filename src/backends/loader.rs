/// Lazy, single-shot loading of vendor client libraries
use crate::error::VendorError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Host-side script injection (a webview, a browser bridge, ...)
#[async_trait]
pub trait ScriptHost: Send + Sync {
    /// Inject the script at `src` and resolve once it has been evaluated
    async fn inject_script(&self, src: &str) -> Result<(), VendorError>;
}

/// A vendor library that is injected the first time it is needed.
///
/// Concurrent callers share one injection; a failed injection may be retried.
pub struct LazyLibrary {
    src: String,
    host: Arc<dyn ScriptHost>,
    loaded: OnceCell<()>,
}

impl LazyLibrary {
    pub fn new(src: impl Into<String>, host: Arc<dyn ScriptHost>) -> Self {
        Self {
            src: src.into(),
            host,
            loaded: OnceCell::new(),
        }
    }

    pub async fn ensure_loaded(&self) -> Result<(), VendorError> {
        self.loaded
            .get_or_try_init(|| async {
                tracing::info!("Injecting vendor library {}", self.src);
                self.host.inject_script(&self.src).await
            })
            .await
            .map(|_| ())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.initialized()
    }

    pub fn src(&self) -> &str {
        &self.src
    }
}
