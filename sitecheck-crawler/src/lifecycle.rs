use crate::engine::BrowserEngine;
use crate::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Cooperative cancellation flag shared by the crawl loop and its
/// sub-passes. Cloning is cheap; all clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Flips `token` when the process receives an interrupt signal. The crawl
/// loop picks the flag up at its next iteration boundary and stops cleanly.
pub fn cancel_on_ctrl_c(token: CancelToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping crawl");
            token.cancel();
        }
    });
}

/// Owns the engine handle and guarantees it is closed at most once, even if
/// shutdown is requested from more than one path.
pub struct EngineGuard<E: BrowserEngine> {
    engine: Option<E>,
}

impl<E: BrowserEngine> EngineGuard<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine: Some(engine),
        }
    }

    /// The live engine, or `None` once shut down.
    pub fn engine_mut(&mut self) -> Option<&mut E> {
        self.engine.as_mut()
    }

    /// Closes the engine. Subsequent calls are no-ops.
    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(mut engine) = self.engine.take() {
            engine.close().await?;
        }
        Ok(())
    }
}
