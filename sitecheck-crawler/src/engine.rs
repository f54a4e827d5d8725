use crate::error::Result;
use sitecheck_core::SourceLocation;
use std::time::Duration;
use url::Url;

/// Console message severity as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLevel {
    Log,
    Warning,
    Error,
}

/// A raw observation captured by the engine during one navigation.
#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    /// A console message written by page scripts.
    Console {
        level: ConsoleLevel,
        text: String,
        location: Option<SourceLocation>,
    },
    /// An exception that escaped the page's own scripts.
    PageError { message: String },
    /// The page or its renderer died.
    Crash { message: String },
    /// A network response for the main document or any sub-resource.
    Response { url: String, status: i32 },
}

/// The page-rendering capability the crawl driver is written against.
///
/// Implementations wrap a real browser-automation stack; the bundled
/// [`HttpEngine`](crate::http_engine::HttpEngine) covers static sites
/// without running scripts.
pub trait BrowserEngine {
    type Page: BrowserPage;

    async fn new_page(&mut self) -> Result<Self::Page>;

    async fn close(&mut self) -> Result<()>;
}

/// A single page (tab). The driver performs one navigation at a time, so
/// event attribution to the in-flight navigation needs no synchronization.
pub trait BrowserPage {
    /// Installs a script evaluated before page scripts on every subsequent
    /// navigation.
    async fn install_startup_script(&mut self, source: &str) -> Result<()>;

    /// Loads `url`, waiting until the network is idle or `timeout` elapses,
    /// and returns the final resolved status of the document.
    ///
    /// Must perform a full load even when only the fragment differs from
    /// the previous navigation.
    async fn navigate(&mut self, url: &Url, timeout: Duration) -> Result<i32>;

    /// Href targets of every anchor on the loaded page, resolved against
    /// the document base.
    async fn anchor_hrefs(&mut self) -> Result<Vec<String>>;

    /// Observations captured since the last call, in firing order.
    fn drain_events(&mut self) -> Vec<PageEvent>;
}

/// Startup script batching `requestAnimationFrame` callbacks.
///
/// Pages with tight animation loops keep the network permanently busy from
/// the engine's point of view, so navigation never reports idle and every
/// load times out. Coalescing every fourth frame into one real frame and
/// deferring callbacks through `setTimeout` (so a callback's exception
/// cannot propagate into navigation machinery) keeps such pages loadable.
/// Script-running engines must install this on every navigation.
pub const FRAME_BATCH_SCRIPT: &str = r#"
(function() {
  'use strict';
  var realRaf = window.requestAnimationFrame.bind(window);
  var nextId = 0;
  var registered = new Map();
  var pending = new Map();
  var framesPerTick = 4;
  var frameCount = 0;

  function pump(time) {
    frameCount += 1;
    if (frameCount === framesPerTick) {
      frameCount = 0;
      var batch = pending;
      pending = new Map();
      batch.forEach(function(entry, id) {
        registered.delete(id);
        setTimeout(function() {
          if (!entry.cancelled) {
            entry.callback(time);
          }
        }, 0);
      });
    }
    realRaf(pump);
  }
  realRaf(pump);

  window.requestAnimationFrame = function(callback) {
    var id = nextId++;
    var entry = {callback: callback, cancelled: false};
    registered.set(id, entry);
    pending.set(id, entry);
    return id;
  };

  window.cancelAnimationFrame = function(id) {
    var entry = registered.get(id);
    if (entry) {
      entry.cancelled = true;
    }
  };
})();
"#;
