use crate::event::ErrorKind;
use regex::Regex;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("invalid rule file: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type TextPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// A test against free text. Substring, regex and predicate variants all
/// answer the same `matches` question.
#[derive(Clone)]
pub enum TextMatcher {
    Substring(String),
    Pattern(Regex),
    Predicate(TextPredicate),
}

impl TextMatcher {
    pub fn substring(s: impl Into<String>) -> Self {
        TextMatcher::Substring(s.into())
    }

    pub fn pattern(re: &str) -> Result<Self, RuleError> {
        Ok(TextMatcher::Pattern(Regex::new(re)?))
    }

    pub fn predicate(f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        TextMatcher::Predicate(Arc::new(f))
    }

    pub fn matches(&self, text: &str) -> bool {
        match self {
            TextMatcher::Substring(needle) => text.contains(needle.as_str()),
            TextMatcher::Pattern(re) => re.is_match(text),
            TextMatcher::Predicate(f) => f(text),
        }
    }
}

impl fmt::Debug for TextMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextMatcher::Substring(s) => f.debug_tuple("Substring").field(s).finish(),
            TextMatcher::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
            TextMatcher::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Pre-declared noise to suppress: which pages it may occur on, and which
/// error kinds with which text are expected there.
#[derive(Debug, Clone)]
pub struct ExpectedErrorRule {
    pub href: TextMatcher,
    pub errors: Vec<(ErrorKind, TextMatcher)>,
}

/// Tests whether an error is covered by the expectation rules.
///
/// The first rule whose href matcher hits the event's href is authoritative:
/// if none of that rule's error matchers cover the event, the error is not
/// suppressed, even when a later rule would have matched. This
/// first-match-commits policy is deliberate - a page with a rule has its
/// expected noise enumerated exhaustively by that one rule.
pub fn is_expected(href: &str, kind: ErrorKind, text: &str, rules: &[ExpectedErrorRule]) -> bool {
    for rule in rules {
        if rule.href.matches(href) {
            return rule
                .errors
                .iter()
                .any(|(expected_kind, matcher)| *expected_kind == kind && matcher.matches(text));
        }
    }
    false
}

// --- rule files ---------------------------------------------------------
//
// Rules come from JSON configuration; predicates exist only for callers
// constructing rules in code. Matchers are compiled once at load time.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatcherSpec {
    Substring(String),
    Pattern(String),
}

impl MatcherSpec {
    pub fn compile(&self) -> Result<TextMatcher, RuleError> {
        match self {
            MatcherSpec::Substring(s) => Ok(TextMatcher::substring(s.clone())),
            MatcherSpec::Pattern(re) => TextMatcher::pattern(re),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ErrorMatcherSpec {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    #[serde(rename = "match")]
    pub matcher: MatcherSpec,
}

#[derive(Debug, Deserialize)]
pub struct RuleSpec {
    pub href: MatcherSpec,
    pub errors: Vec<ErrorMatcherSpec>,
}

impl RuleSpec {
    pub fn compile(&self) -> Result<ExpectedErrorRule, RuleError> {
        let errors = self
            .errors
            .iter()
            .map(|e| Ok((e.kind, e.matcher.compile()?)))
            .collect::<Result<Vec<_>, RuleError>>()?;
        Ok(ExpectedErrorRule {
            href: self.href.compile()?,
            errors,
        })
    }
}

/// Parses a JSON rule file and compiles every matcher.
pub fn load_rules(json: &str) -> Result<Vec<ExpectedErrorRule>, RuleError> {
    let specs: Vec<RuleSpec> = serde_json::from_str(json)?;
    specs.iter().map(RuleSpec::compile).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(href: TextMatcher, errors: Vec<(ErrorKind, TextMatcher)>) -> ExpectedErrorRule {
        ExpectedErrorRule { href, errors }
    }

    #[test]
    fn test_substring_matcher() {
        let m = TextMatcher::substring("Deprecated");
        assert!(m.matches("Deprecated API used"));
        assert!(!m.matches("deprecated api used"));
    }

    #[test]
    fn test_pattern_matcher() {
        let m = TextMatcher::pattern(r"(?i)deprecated").unwrap();
        assert!(m.matches("DEPRECATED api"));
        assert!(!m.matches("obsolete api"));
    }

    #[test]
    fn test_predicate_matcher() {
        let m = TextMatcher::predicate(|text| text.len() > 10);
        assert!(m.matches("a longer message"));
        assert!(!m.matches("short"));
    }

    #[test]
    fn test_matching_rule_suppresses() {
        let rules = vec![rule(
            TextMatcher::substring("a.html"),
            vec![(ErrorKind::Msg, TextMatcher::pattern("Deprecated").unwrap())],
        )];
        assert!(is_expected(
            "http://example.com/a.html",
            ErrorKind::Msg,
            "Deprecated API",
            &rules
        ));
    }

    #[test]
    fn test_kind_must_match_too() {
        let rules = vec![rule(
            TextMatcher::substring("a.html"),
            vec![(ErrorKind::Msg, TextMatcher::substring("Deprecated"))],
        )];
        assert!(!is_expected(
            "http://example.com/a.html",
            ErrorKind::PageError,
            "Deprecated API",
            &rules
        ));
    }

    #[test]
    fn test_first_match_commits_no_fallthrough() {
        // Rule A matches the href but not the error; rule B would have
        // matched both. A's miss is final.
        let rules = vec![
            rule(
                TextMatcher::substring("a.html"),
                vec![(ErrorKind::Msg, TextMatcher::substring("something else"))],
            ),
            rule(
                TextMatcher::substring("a.html"),
                vec![(ErrorKind::Msg, TextMatcher::substring("Deprecated"))],
            ),
        ];
        assert!(!is_expected(
            "http://example.com/a.html",
            ErrorKind::Msg,
            "Deprecated API",
            &rules
        ));
    }

    #[test]
    fn test_no_href_match_means_not_expected() {
        let rules = vec![rule(
            TextMatcher::substring("other.html"),
            vec![(ErrorKind::Msg, TextMatcher::substring("Deprecated"))],
        )];
        assert!(!is_expected(
            "http://example.com/a.html",
            ErrorKind::Msg,
            "Deprecated API",
            &rules
        ));
    }

    #[test]
    fn test_load_rules_from_json() {
        let json = r#"[
            {
                "href": {"substring": "a.html"},
                "errors": [
                    {"type": "msg", "match": {"pattern": "Deprecated"}},
                    {"type": "badlink", "match": {"substring": "flaky.example"}}
                ]
            }
        ]"#;
        let rules = load_rules(json).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].errors.len(), 2);
        assert!(is_expected(
            "http://example.com/a.html",
            ErrorKind::BadLink,
            "https://flaky.example/x 503",
            &rules
        ));
    }

    #[test]
    fn test_load_rules_rejects_bad_pattern() {
        let json = r#"[{"href": {"pattern": "("}, "errors": []}]"#;
        assert!(matches!(load_rules(json), Err(RuleError::Pattern(_))));
    }
}
