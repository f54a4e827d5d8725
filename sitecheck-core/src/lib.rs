pub mod event;
pub mod registry;
pub mod report;
pub mod rules;

pub use event::{CrawlEvent, ErrorDetail, ErrorEvent, ErrorKind, SourceLocation};
pub use registry::{IdentityPolicy, UrlRecord, UrlRegistry, STATUS_UNSET};
pub use report::{Aggregator, PageResult, Report, ResponseRecord, RunOutcome};
pub use rules::{is_expected, ExpectedErrorRule, RuleError, TextMatcher};
