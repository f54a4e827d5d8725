use serde::{Deserialize, Serialize};
use std::fmt;

/// Source position of a console message inside the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

/// The closed vocabulary of error kinds a crawl can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Navigation-level failure: timeout, DNS, engine crash mid-load.
    #[serde(rename = "exception")]
    Exception,
    /// Error-level console message.
    #[serde(rename = "msg")]
    Msg,
    /// Uncaught in-page exception.
    #[serde(rename = "pageerror")]
    PageError,
    /// Fatal page or engine error.
    #[serde(rename = "error")]
    Error,
    /// Declared link target never returned 2xx.
    #[serde(rename = "badlink")]
    BadLink,
    /// Sub-resource never returned 2xx.
    #[serde(rename = "badResponse")]
    BadResponse,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Exception => "exception",
            ErrorKind::Msg => "msg",
            ErrorKind::PageError => "pageerror",
            ErrorKind::Error => "error",
            ErrorKind::BadLink => "badlink",
            ErrorKind::BadResponse => "badResponse",
        };
        f.write_str(name)
    }
}

/// Kind-specific error payload, without the owning href.
///
/// This is the shape stored in the report: the href is the page map key, so
/// carrying it inside every record would be redundant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ErrorDetail {
    #[serde(rename = "exception")]
    Exception { error: String },
    #[serde(rename = "msg")]
    Msg {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        location: Option<SourceLocation>,
    },
    #[serde(rename = "pageerror")]
    PageError { error: String },
    #[serde(rename = "error")]
    EngineError { error: String },
    #[serde(rename = "badlink")]
    BadLink { link: String, status: i32 },
    #[serde(rename = "badResponse")]
    BadResponse { resource: String, status: i32 },
}

impl ErrorDetail {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ErrorDetail::Exception { .. } => ErrorKind::Exception,
            ErrorDetail::Msg { .. } => ErrorKind::Msg,
            ErrorDetail::PageError { .. } => ErrorKind::PageError,
            ErrorDetail::EngineError { .. } => ErrorKind::Error,
            ErrorDetail::BadLink { .. } => ErrorKind::BadLink,
            ErrorDetail::BadResponse { .. } => ErrorKind::BadResponse,
        }
    }

    /// Free-text fields joined into one string for expected-error matching.
    pub fn matchable_text(&self) -> String {
        match self {
            ErrorDetail::Exception { error } => error.clone(),
            ErrorDetail::Msg { text, location } => match location.as_ref().and_then(|l| l.url.as_ref()) {
                Some(url) => format!("{} {}", text, url),
                None => text.clone(),
            },
            ErrorDetail::PageError { error } => error.clone(),
            ErrorDetail::EngineError { error } => error.clone(),
            ErrorDetail::BadLink { link, status } => format!("{} {}", link, status),
            ErrorDetail::BadResponse { resource, status } => format!("{} {}", resource, status),
        }
    }
}

/// An error event as emitted by the crawl driver, attributed to a page.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEvent {
    pub href: String,
    pub detail: ErrorDetail,
}

/// One entry in the normalized crawl event stream.
///
/// Ordering within a run is causally meaningful and consumers must process
/// events in emission order. `Finish` is a sentinel: a stream that closes
/// without it was cancelled mid-run.
#[derive(Debug, Clone, PartialEq)]
pub enum CrawlEvent {
    /// About to load a local page.
    Load { href: String },
    /// About to existence-check a remote target.
    LoadRemote { href: String },
    /// Final status of a page navigation.
    Status { href: String, status: i32 },
    /// First observed network response for a resource, attributed to the
    /// page whose load produced it.
    Response {
        href: String,
        resource_href: String,
        status: i32,
    },
    Error(ErrorEvent),
    Finish,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_detail_serializes_with_type_tag() {
        let detail = ErrorDetail::BadLink {
            link: "http://example.com/a".to_string(),
            status: 404,
        };
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["type"], "badlink");
        assert_eq!(json["link"], "http://example.com/a");
        assert_eq!(json["status"], 404);
    }

    #[test]
    fn test_bad_response_wire_name() {
        let detail = ErrorDetail::BadResponse {
            resource: "http://example.com/style.css".to_string(),
            status: 500,
        };
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["type"], "badResponse");
    }

    #[test]
    fn test_msg_omits_absent_location() {
        let detail = ErrorDetail::Msg {
            text: "Uncaught TypeError".to_string(),
            location: None,
        };
        let json = serde_json::to_value(&detail).unwrap();
        assert!(json.get("location").is_none());
    }

    #[test]
    fn test_matchable_text_includes_link_and_status() {
        let detail = ErrorDetail::BadLink {
            link: "http://example.com/a".to_string(),
            status: 404,
        };
        assert_eq!(detail.matchable_text(), "http://example.com/a 404");
    }

    #[test]
    fn test_kind_round_trip() {
        let kinds = [
            ErrorKind::Exception,
            ErrorKind::Msg,
            ErrorKind::PageError,
            ErrorKind::Error,
            ErrorKind::BadLink,
            ErrorKind::BadResponse,
        ];
        for kind in kinds {
            let name = serde_json::to_string(&kind).unwrap();
            let back: ErrorKind = serde_json::from_str(&name).unwrap();
            assert_eq!(back, kind);
        }
    }
}
