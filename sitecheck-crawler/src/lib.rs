pub mod engine;
pub mod error;
pub mod http_engine;
pub mod lifecycle;
pub mod tester;

pub use engine::{BrowserEngine, BrowserPage, ConsoleLevel, PageEvent, FRAME_BATCH_SCRIPT};
pub use error::{CrawlError, Result};
pub use http_engine::{HttpEngine, HttpPage};
pub use lifecycle::{cancel_on_ctrl_c, CancelToken, EngineGuard};
pub use tester::{FollowLinks, TestOptions, Tester};
