//! Execution context threaded through commands and the tool installer.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Carries the environment name and version through the call chain and
/// supports cooperative cancellation.
///
/// The name selects the per-environment cache directory, the version selects
/// the directory holding the stable, `PATH`-visible binary links. Cloning is
/// cheap; all clones observe the same cancellation flag.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    version: String,
    cache_root: Option<PathBuf>,
    cancelled: AtomicBool,
}

impl Context {
    /// Create a context for the environment `name` at `version`.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                version: version.into(),
                cache_root: None,
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    /// Override the cache root used instead of the user cache directory.
    pub fn with_cache_root(self, root: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: self.inner.name.clone(),
                version: self.inner.version.clone(),
                cache_root: Some(root.into()),
                cancelled: AtomicBool::new(self.inner.cancelled.load(Ordering::Relaxed)),
            }),
        }
    }

    /// Environment name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Environment version.
    pub fn version(&self) -> &str {
        &self.inner.version
    }

    pub(crate) fn cache_root(&self) -> Option<&PathBuf> {
        self.inner.cache_root.as_ref()
    }

    /// Request cancellation. May be called from any thread; the executor
    /// observes the flag between commands.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Return the cancellation cause if cancellation has been requested.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carries_name_and_version() {
        let ctx = Context::new("env", "1.2.3");
        assert_eq!(ctx.name(), "env");
        assert_eq!(ctx.version(), "1.2.3");
    }

    #[test]
    fn cancellation_is_shared_between_clones() {
        let ctx = Context::new("env", "1.0.0");
        let clone = ctx.clone();
        assert!(ctx.check_cancelled().is_ok());
        clone.cancel();
        assert!(ctx.is_cancelled());
        assert!(matches!(ctx.check_cancelled(), Err(Error::Cancelled)));
    }
}
