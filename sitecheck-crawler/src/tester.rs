use crate::engine::{BrowserPage, ConsoleLevel, PageEvent, FRAME_BATCH_SCRIPT};
use crate::error::Result;
use crate::lifecycle::CancelToken;
use reqwest::Client;
use sitecheck_core::{
    CrawlEvent, ErrorDetail, ErrorEvent, IdentityPolicy, UrlRegistry, STATUS_UNSET,
};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};
use url::Url;

/// Which discovered links get validated beyond the seed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FollowLinks {
    /// Seeds only.
    None,
    /// Crawl same-origin links.
    #[default]
    Local,
    /// Existence-check cross-origin links.
    Remote,
    /// Both of the above.
    Both,
}

impl FollowLinks {
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(FollowLinks::None),
            "local" => Some(FollowLinks::Local),
            "remote" => Some(FollowLinks::Remote),
            "both" => Some(FollowLinks::Both),
            _ => None,
        }
    }

    pub fn local(&self) -> bool {
        matches!(self, FollowLinks::Local | FollowLinks::Both)
    }

    pub fn remote(&self) -> bool {
        matches!(self, FollowLinks::Remote | FollowLinks::Both)
    }
}

/// Options for one validation run.
#[derive(Debug, Clone)]
pub struct TestOptions {
    /// Per-navigation bound; also the remote check timeout.
    pub timeout: Duration,
    pub follow_links: FollowLinks,
    pub identity: IdentityPolicy,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            follow_links: FollowLinks::default(),
            identity: IdentityPolicy::default(),
        }
    }
}

/// The crawl driver: breadth-first traversal over every reachable local
/// page, normalizing engine observations into the crawl event stream.
///
/// One navigation is in flight at a time, so every page event drained after
/// a navigation belongs to that navigation's href.
pub struct Tester {
    options: TestOptions,
    events: UnboundedSender<CrawlEvent>,
    cancel: CancelToken,
    client: Client,
}

impl Tester {
    pub fn new(
        options: TestOptions,
        events: UnboundedSender<CrawlEvent>,
        cancel: CancelToken,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent("Sitecheck/0.2 (https://github.com/trapdoorsec/sitecheck)")
            .timeout(options.timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self {
            options,
            events,
            cancel,
            client,
        })
    }

    /// Runs the full validation: BFS crawl, missing-link passes, optional
    /// remote checks. Consumes the tester so the event channel closes when
    /// the run ends; a cancelled run closes it without a finish sentinel.
    pub async fn run<P: BrowserPage>(self, page: &mut P, seeds: &[Url]) -> Result<()> {
        let mut local = UrlRegistry::new(self.options.identity);
        let mut remote = UrlRegistry::new(self.options.identity);
        let mut found = UrlRegistry::new(self.options.identity);
        let mut queue: VecDeque<Url> = VecDeque::new();

        // Seeds are registered without referencers: nothing "links" to them,
        // so they can never produce badlink records themselves.
        for seed in seeds {
            let (_, is_new) = local.get_or_create(seed);
            if is_new {
                queue.push_back(seed.clone());
            }
        }
        info!("starting crawl of {} seed URL(s)", queue.len());

        page.install_startup_script(FRAME_BATCH_SCRIPT).await?;

        while let Some(url) = queue.pop_front() {
            if self.cancel.is_cancelled() {
                break;
            }
            let href = url.as_str().to_string();
            self.emit(CrawlEvent::Load { href: href.clone() });

            match page.navigate(&url, self.options.timeout).await {
                Ok(status) => {
                    self.forward_page_events(&href, page.drain_events(), &mut found);
                    self.emit(CrawlEvent::Status {
                        href: href.clone(),
                        status,
                    });
                    if (200..=299).contains(&status)
                        && self.options.follow_links != FollowLinks::None
                    {
                        match page.anchor_hrefs().await {
                            Ok(anchors) => {
                                for candidate in &anchors {
                                    self.classify_and_record(
                                        &url, candidate, &mut local, &mut remote, &mut queue,
                                    );
                                }
                            }
                            Err(e) => self.emit_error(
                                href,
                                ErrorDetail::Exception {
                                    error: e.to_string(),
                                },
                            ),
                        }
                    }
                }
                Err(e) => {
                    // A single page's failure never aborts the crawl.
                    self.forward_page_events(&href, page.drain_events(), &mut found);
                    self.emit_error(
                        href,
                        ErrorDetail::Exception {
                            error: e.to_string(),
                        },
                    );
                }
            }
        }

        self.report_missing_links(&local, &found);

        if self.options.follow_links.remote() && !self.cancel.is_cancelled() {
            self.check_remote_links(&remote, &mut found).await;
            self.report_missing_links(&remote, &found);
        }

        if self.cancel.is_cancelled() {
            info!("crawl cancelled");
        } else {
            info!(
                "crawl complete: {} local, {} remote, {} resources found",
                local.len(),
                remote.len(),
                found.len()
            );
            self.emit(CrawlEvent::Finish);
        }
        Ok(())
    }

    /// Resolves one anchor target and records it in the matching registry,
    /// scheduling newly seen local targets for crawling.
    fn classify_and_record(
        &self,
        page_url: &Url,
        candidate: &str,
        local: &mut UrlRegistry,
        remote: &mut UrlRegistry,
        queue: &mut VecDeque<Url>,
    ) {
        if candidate.is_empty() {
            return;
        }
        let Ok(resolved) = page_url.join(candidate) else {
            debug!(candidate, page = %page_url, "unresolvable link target");
            return;
        };

        if resolved.origin() == page_url.origin() {
            if !self.options.follow_links.local() {
                return;
            }
            // A page referencing itself must not end up in its own
            // referencer set, or it would badlink itself on failure.
            let self_link = local.key_for(page_url) == local.key_for(&resolved);
            let (record, is_new) = local.get_or_create(&resolved);
            if is_new {
                debug!(href = %resolved, "queueing local link");
                queue.push_back(resolved.clone());
            }
            if !self_link {
                record.add_referencer(page_url.as_str());
            }
        } else {
            let (record, _) = remote.get_or_create(&resolved);
            record.add_referencer(page_url.as_str());
        }
    }

    /// Maps raw page events for the in-flight navigation onto the event
    /// taxonomy and records responses in the found-registry (first response
    /// per identity wins).
    fn forward_page_events(
        &self,
        current_href: &str,
        events: Vec<PageEvent>,
        found: &mut UrlRegistry,
    ) {
        for event in events {
            match event {
                PageEvent::Console {
                    level,
                    text,
                    location,
                } => {
                    if level == ConsoleLevel::Error {
                        self.emit_error(current_href, ErrorDetail::Msg { text, location });
                    } else {
                        debug!(href = %current_href, %text, "console");
                    }
                }
                PageEvent::PageError { message } => {
                    self.emit_error(current_href, ErrorDetail::PageError { error: message });
                }
                PageEvent::Crash { message } => {
                    self.emit_error(current_href, ErrorDetail::EngineError { error: message });
                }
                PageEvent::Response { url, status } => {
                    let Ok(resource) = Url::parse(&url) else {
                        debug!(%url, "skipping unparseable response url");
                        continue;
                    };
                    let (record, _) = found.get_or_create(&resource);
                    if record.record_status(status) {
                        self.emit(CrawlEvent::Response {
                            href: current_href.to_string(),
                            resource_href: url,
                            status,
                        });
                    }
                }
            }
        }
    }

    /// Emits one badlink per (broken target, referencing page) pair: a
    /// referenced target counts as found only if some response anywhere in
    /// the run came back 2xx for its identity.
    fn report_missing_links(&self, registry: &UrlRegistry, found: &UrlRegistry) {
        if self.cancel.is_cancelled() {
            return;
        }
        for (key, record) in registry.iter() {
            if self.cancel.is_cancelled() {
                return;
            }
            if !record.has_referencers() {
                continue;
            }
            let hit = found.lookup(key);
            if hit.map(|r| r.is_ok()).unwrap_or(false) {
                continue;
            }
            let status = hit.map(|r| r.status()).unwrap_or(STATUS_UNSET);
            for referencer in record.referencers() {
                self.emit(CrawlEvent::Error(ErrorEvent {
                    href: record.href().to_string(),
                    detail: ErrorDetail::BadLink {
                        link: referencer.to_string(),
                        status,
                    },
                }));
            }
        }
    }

    /// Best-effort existence check for remote targets: one GET each, no
    /// retries, sequential to bound load on the remote hosts.
    async fn check_remote_links(&self, remote: &UrlRegistry, found: &mut UrlRegistry) {
        for (key, record) in remote.iter() {
            if self.cancel.is_cancelled() {
                return;
            }
            let href = record.href().to_string();
            self.emit(CrawlEvent::LoadRemote { href: href.clone() });
            if found.lookup(key).map(|r| r.is_status_set()).unwrap_or(false) {
                continue;
            }
            // GET, not HEAD: plenty of servers reject HEAD.
            match self.client.get(record.url().clone()).send().await {
                Ok(response) => {
                    let status = i32::from(response.status().as_u16());
                    let (hit, _) = found.get_or_create(record.url());
                    if hit.record_status(status) {
                        self.emit(CrawlEvent::Response {
                            href: href.clone(),
                            resource_href: href,
                            status,
                        });
                    }
                }
                Err(e) => {
                    // Network-level failure, not an HTTP status. The status
                    // stays unset and the missing-link pass reports the
                    // target as never found.
                    debug!(%href, error = %e, "remote check failed");
                }
            }
        }
    }

    fn emit(&self, event: CrawlEvent) {
        // The consumer may already be gone on cancellation; dropped events
        // are acceptable then.
        let _ = self.events.send(event);
    }

    fn emit_error(&self, href: impl Into<String>, detail: ErrorDetail) {
        self.emit(CrawlEvent::Error(ErrorEvent {
            href: href.into(),
            detail,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn tester(follow: FollowLinks) -> Tester {
        let (tx, _rx) = mpsc::unbounded_channel();
        Tester::new(
            TestOptions {
                follow_links: follow,
                ..TestOptions::default()
            },
            tx,
            CancelToken::new(),
        )
        .unwrap()
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_follow_links_from_name() {
        assert_eq!(FollowLinks::from_name("none"), Some(FollowLinks::None));
        assert_eq!(FollowLinks::from_name("local"), Some(FollowLinks::Local));
        assert_eq!(FollowLinks::from_name("remote"), Some(FollowLinks::Remote));
        assert_eq!(FollowLinks::from_name("Both"), Some(FollowLinks::Both));
        assert_eq!(FollowLinks::from_name("all"), None);
    }

    #[test]
    fn test_follow_links_flags() {
        assert!(FollowLinks::Local.local() && !FollowLinks::Local.remote());
        assert!(!FollowLinks::Remote.local() && FollowLinks::Remote.remote());
        assert!(FollowLinks::Both.local() && FollowLinks::Both.remote());
        assert!(!FollowLinks::None.local() && !FollowLinks::None.remote());
    }

    #[test]
    fn test_classify_local_link_is_queued_once() {
        let t = tester(FollowLinks::Local);
        let mut local = UrlRegistry::new(IdentityPolicy::FullHref);
        let mut remote = UrlRegistry::new(IdentityPolicy::FullHref);
        let mut queue = VecDeque::new();
        let page = url("http://example.com/a.html");

        t.classify_and_record(&page, "b.html", &mut local, &mut remote, &mut queue);
        t.classify_and_record(&page, "b.html", &mut local, &mut remote, &mut queue);

        assert_eq!(queue.len(), 1);
        assert_eq!(local.len(), 1);
        assert!(remote.is_empty());
    }

    #[test]
    fn test_classify_remote_link_is_recorded_not_queued() {
        let t = tester(FollowLinks::Local);
        let mut local = UrlRegistry::new(IdentityPolicy::FullHref);
        let mut remote = UrlRegistry::new(IdentityPolicy::FullHref);
        let mut queue = VecDeque::new();
        let page = url("http://example.com/a.html");

        t.classify_and_record(
            &page,
            "https://other.example/x",
            &mut local,
            &mut remote,
            &mut queue,
        );

        assert!(queue.is_empty());
        assert!(local.is_empty());
        let record = remote.lookup("https://other.example/x").unwrap();
        assert_eq!(record.referencer_count(), 1);
    }

    #[test]
    fn test_classify_skips_local_when_not_following() {
        let t = tester(FollowLinks::Remote);
        let mut local = UrlRegistry::new(IdentityPolicy::FullHref);
        let mut remote = UrlRegistry::new(IdentityPolicy::FullHref);
        let mut queue = VecDeque::new();
        let page = url("http://example.com/a.html");

        t.classify_and_record(&page, "b.html", &mut local, &mut remote, &mut queue);

        assert!(local.is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_self_link_adds_no_referencer() {
        let t = tester(FollowLinks::Local);
        let mut local = UrlRegistry::new(IdentityPolicy::FullHref);
        let mut remote = UrlRegistry::new(IdentityPolicy::FullHref);
        let mut queue = VecDeque::new();
        let page = url("http://example.com/a.html");

        t.classify_and_record(&page, "a.html", &mut local, &mut remote, &mut queue);

        let record = local.lookup("http://example.com/a.html").unwrap();
        assert!(!record.has_referencers());
    }

    #[test]
    fn test_referencers_accumulate_across_pages() {
        let t = tester(FollowLinks::Local);
        let mut local = UrlRegistry::new(IdentityPolicy::FullHref);
        let mut remote = UrlRegistry::new(IdentityPolicy::FullHref);
        let mut queue = VecDeque::new();

        for page in ["http://example.com/a.html", "http://example.com/b.html"] {
            t.classify_and_record(
                &url(page),
                "/target.html",
                &mut local,
                &mut remote,
                &mut queue,
            );
        }

        let record = local.lookup("http://example.com/target.html").unwrap();
        assert_eq!(record.referencer_count(), 2);
        assert_eq!(queue.len(), 1);
    }
}
