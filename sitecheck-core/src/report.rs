use crate::event::{CrawlEvent, ErrorDetail, ErrorEvent, ErrorKind};
use crate::rules::{is_expected, ExpectedErrorRule};
use crate::registry::STATUS_UNSET;
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, warn};

/// Per-page outcome: last navigation status and the errors charged to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageResult {
    pub status: i32,
    pub errors: Vec<ErrorDetail>,
}

impl PageResult {
    fn new() -> Self {
        Self {
            status: STATUS_UNSET,
            errors: Vec::new(),
        }
    }
}

/// One observed network response, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRecord {
    pub href: String,
    pub resource_href: String,
    pub status: i32,
}

/// The final report of one crawl run. Produced once, immutable thereafter.
///
/// Serialization is deterministic: pages are keyed by identity in a sorted
/// map and both error and response lists preserve emission order, so the
/// same event log always yields byte-identical JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub num_errors: u32,
    pub pages: BTreeMap<String, PageResult>,
    pub responses: Vec<ResponseRecord>,
}

impl Report {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// How a run ended. A cancelled run still carries the partial report, but
/// its accounting only covers what ran before the interrupt.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(Report),
    Cancelled(Report),
}

impl RunOutcome {
    pub fn report(&self) -> &Report {
        match self {
            RunOutcome::Completed(report) | RunOutcome::Cancelled(report) => report,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }
}

/// Event-stream consumer producing the final [`Report`].
///
/// Works against any source emitting [`CrawlEvent`]s in order; it knows
/// nothing about the driver. Later events amend earlier records by identity
/// key, so no single event fully determines final state.
#[derive(Debug)]
pub struct Aggregator {
    rules: Vec<ExpectedErrorRule>,
    pages: BTreeMap<String, PageResult>,
    responses: Vec<ResponseRecord>,
    num_errors: u32,
}

impl Aggregator {
    pub fn new(rules: Vec<ExpectedErrorRule>) -> Self {
        Self {
            rules,
            pages: BTreeMap::new(),
            responses: Vec::new(),
            num_errors: 0,
        }
    }

    fn page_entry(&mut self, href: &str) -> &mut PageResult {
        self.pages
            .entry(href.to_string())
            .or_insert_with(PageResult::new)
    }

    /// Feeds one event. Returns true when it was the finish sentinel.
    pub fn observe(&mut self, event: CrawlEvent) -> bool {
        match event {
            CrawlEvent::Load { href } => {
                debug!(%href, "load");
                self.page_entry(&href);
            }
            CrawlEvent::LoadRemote { href } => {
                debug!(%href, "load remote");
            }
            CrawlEvent::Status { href, status } => {
                debug!(%href, status, "status");
                self.page_entry(&href).status = status;
            }
            CrawlEvent::Response {
                href,
                resource_href,
                status,
            } => {
                debug!(%href, resource = %resource_href, status, "response");
                if resource_href == href {
                    // The main document's own failure surfaces through
                    // status and badlink, not badResponse.
                    if let Some(entry) = self.pages.get_mut(&href) {
                        entry.status = status;
                    }
                } else if !(200..=299).contains(&status) {
                    let text = format!("{} {}", resource_href, status);
                    if is_expected(&href, ErrorKind::BadResponse, &text, &self.rules) {
                        debug!(%href, resource = %resource_href, status, "expected bad response");
                    } else {
                        warn!(%href, resource = %resource_href, status, "bad response");
                        self.num_errors += 1;
                        self.page_entry(&href).errors.push(ErrorDetail::BadResponse {
                            resource: resource_href.clone(),
                            status,
                        });
                    }
                }
                self.responses.push(ResponseRecord {
                    href,
                    resource_href,
                    status,
                });
            }
            CrawlEvent::Error(ErrorEvent { href, detail }) => {
                let kind = detail.kind();
                if is_expected(&href, kind, &detail.matchable_text(), &self.rules) {
                    debug!(%href, %kind, "expected error suppressed");
                    return false;
                }
                self.log_error(&href, &detail);
                self.num_errors += 1;
                self.page_entry(&href).errors.push(detail);
            }
            CrawlEvent::Finish => {
                debug!("finish");
                return true;
            }
        }
        false
    }

    // The taxonomy is closed; a new variant here is a compile error in
    // every match below, never a silently mishandled event.
    fn log_error(&self, href: &str, detail: &ErrorDetail) {
        match detail {
            ErrorDetail::Exception { error } => warn!(%href, %error, "navigation exception"),
            ErrorDetail::Msg { text, .. } => warn!(%href, %text, "console error"),
            ErrorDetail::PageError { error } => warn!(%href, %error, "uncaught page exception"),
            ErrorDetail::EngineError { error } => warn!(%href, %error, "page error"),
            ErrorDetail::BadLink { link, status } => {
                warn!(target_href = %href, referenced_by = %link, status, "missing link")
            }
            ErrorDetail::BadResponse { resource, status } => {
                warn!(%href, %resource, status, "bad response")
            }
        }
    }

    pub fn into_report(self) -> Report {
        Report {
            num_errors: self.num_errors,
            pages: self.pages,
            responses: self.responses,
        }
    }

    /// Drains `rx` until the finish sentinel or until the stream closes.
    /// A closed stream without `Finish` means the run was cancelled.
    pub async fn collect(mut self, mut rx: UnboundedReceiver<CrawlEvent>) -> RunOutcome {
        while let Some(event) = rx.recv().await {
            if self.observe(event) {
                return RunOutcome::Completed(self.into_report());
            }
        }
        RunOutcome::Cancelled(self.into_report())
    }
}
