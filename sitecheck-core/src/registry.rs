use std::collections::{BTreeMap, BTreeSet};
use url::Url;

/// Sentinel for "no response observed yet", distinct from every real HTTP status.
pub const STATUS_UNSET: i32 = -1;

/// How a URL is folded into a registry key.
///
/// The default keeps the full href, so `/page`, `/page?a=b` and `/page#top`
/// are tracked separately - each variant can produce its own failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentityPolicy {
    /// Full normalized href string.
    #[default]
    FullHref,
    /// Origin plus path only; query and fragment variants collapse.
    OriginAndPath,
}

impl IdentityPolicy {
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "href" | "full" => Some(IdentityPolicy::FullHref),
            "origin-path" | "path" => Some(IdentityPolicy::OriginAndPath),
            _ => None,
        }
    }

    pub fn key(&self, url: &Url) -> String {
        match self {
            IdentityPolicy::FullHref => url.as_str().to_string(),
            IdentityPolicy::OriginAndPath => {
                format!("{}{}", url.origin().ascii_serialization(), url.path())
            }
        }
    }
}

/// One distinct link target or visited resource.
///
/// Created on first reference or first visit, mutated by link discovery and
/// response observation, never deleted within a run.
#[derive(Debug, Clone)]
pub struct UrlRecord {
    url: Url,
    linked_from: BTreeSet<String>,
    status: i32,
}

impl UrlRecord {
    fn new(url: Url) -> Self {
        Self {
            url,
            linked_from: BTreeSet::new(),
            status: STATUS_UNSET,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn href(&self) -> &str {
        self.url.as_str()
    }

    /// Records that `href` links to this target. Duplicates collapse.
    pub fn add_referencer(&mut self, href: &str) {
        self.linked_from.insert(href.to_string());
    }

    pub fn referencers(&self) -> impl Iterator<Item = &str> {
        self.linked_from.iter().map(|s| s.as_str())
    }

    pub fn has_referencers(&self) -> bool {
        !self.linked_from.is_empty()
    }

    pub fn referencer_count(&self) -> usize {
        self.linked_from.len()
    }

    pub fn status(&self) -> i32 {
        self.status
    }

    pub fn is_status_set(&self) -> bool {
        self.status != STATUS_UNSET
    }

    /// First write wins: redirect chains and duplicate resource loads must not
    /// overwrite the status already observed. Returns whether the write took.
    pub fn record_status(&mut self, status: i32) -> bool {
        if self.is_status_set() {
            return false;
        }
        self.status = status;
        true
    }

    pub fn is_ok(&self) -> bool {
        (200..=299).contains(&self.status)
    }
}

/// A map from identity key to [`UrlRecord`].
///
/// Three of these exist per crawl run: local targets (crawlable), remote
/// targets (existence-checked only) and found resources (everything a
/// network response was observed for).
#[derive(Debug)]
pub struct UrlRegistry {
    identity: IdentityPolicy,
    records: BTreeMap<String, UrlRecord>,
}

impl UrlRegistry {
    pub fn new(identity: IdentityPolicy) -> Self {
        Self {
            identity,
            records: BTreeMap::new(),
        }
    }

    pub fn identity(&self) -> IdentityPolicy {
        self.identity
    }

    pub fn key_for(&self, url: &Url) -> String {
        self.identity.key(url)
    }

    /// Returns the record for `url`'s identity, creating it on first sight.
    /// The flag reports whether the record is new.
    pub fn get_or_create(&mut self, url: &Url) -> (&mut UrlRecord, bool) {
        let key = self.key_for(url);
        let mut is_new = false;
        let record = self.records.entry(key).or_insert_with(|| {
            is_new = true;
            UrlRecord::new(url.clone())
        });
        (record, is_new)
    }

    pub fn lookup(&self, key: &str) -> Option<&UrlRecord> {
        self.records.get(key)
    }

    pub fn lookup_url(&self, url: &Url) -> Option<&UrlRecord> {
        self.records.get(&self.key_for(url))
    }

    /// Records in deterministic key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &UrlRecord)> {
        self.records.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let mut registry = UrlRegistry::new(IdentityPolicy::FullHref);
        let target = url("http://example.com/page");

        let (_, is_new) = registry.get_or_create(&target);
        assert!(is_new);
        let (_, is_new) = registry.get_or_create(&target);
        assert!(!is_new);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_full_href_keeps_query_variants_distinct() {
        let mut registry = UrlRegistry::new(IdentityPolicy::FullHref);
        registry.get_or_create(&url("http://example.com/page"));
        registry.get_or_create(&url("http://example.com/page?a=b"));
        registry.get_or_create(&url("http://example.com/page#top"));

        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_origin_path_folds_query_and_fragment() {
        let mut registry = UrlRegistry::new(IdentityPolicy::OriginAndPath);
        let (_, first) = registry.get_or_create(&url("http://example.com/page"));
        assert!(first);
        let (_, second) = registry.get_or_create(&url("http://example.com/page?a=b"));
        assert!(!second);
        let (_, third) = registry.get_or_create(&url("http://example.com/page#top"));
        assert!(!third);

        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_referencers_collapse_duplicates() {
        let mut registry = UrlRegistry::new(IdentityPolicy::FullHref);
        let (record, _) = registry.get_or_create(&url("http://example.com/target"));

        record.add_referencer("http://example.com/a");
        record.add_referencer("http://example.com/b");
        record.add_referencer("http://example.com/a");

        assert_eq!(record.referencer_count(), 2);
        let refs: Vec<&str> = record.referencers().collect();
        assert_eq!(refs, vec!["http://example.com/a", "http://example.com/b"]);
    }

    #[test]
    fn test_status_first_write_wins() {
        let mut registry = UrlRegistry::new(IdentityPolicy::FullHref);
        let (record, _) = registry.get_or_create(&url("http://example.com/img.png"));

        assert!(!record.is_status_set());
        assert!(record.record_status(200));
        assert!(!record.record_status(404));
        assert_eq!(record.status(), 200);
        assert!(record.is_ok());
    }

    #[test]
    fn test_ok_predicate_bounds() {
        let mut registry = UrlRegistry::new(IdentityPolicy::FullHref);
        let (record, _) = registry.get_or_create(&url("http://example.com/x"));
        assert!(!record.is_ok());

        record.record_status(299);
        assert!(record.is_ok());

        let (record, _) = registry.get_or_create(&url("http://example.com/y"));
        record.record_status(301);
        assert!(!record.is_ok());
    }

    #[test]
    fn test_identity_policy_from_name() {
        assert_eq!(
            IdentityPolicy::from_name("href"),
            Some(IdentityPolicy::FullHref)
        );
        assert_eq!(
            IdentityPolicy::from_name("origin-path"),
            Some(IdentityPolicy::OriginAndPath)
        );
        assert_eq!(IdentityPolicy::from_name("bogus"), None);
    }
}
