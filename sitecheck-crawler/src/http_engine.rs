use crate::engine::{BrowserEngine, BrowserPage, PageEvent};
use crate::error::{CrawlError, Result};
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Static-HTML rendering engine over plain HTTP.
///
/// Navigations are single GETs and anchors come from parsing the response
/// body; no scripts run, so console and page-error events never fire. A
/// browser-automation engine plugs in at the same trait seam when script
/// coverage is needed.
pub struct HttpEngine {
    client: Client,
}

impl HttpEngine {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent("Sitecheck/0.2 (https://github.com/trapdoorsec/sitecheck)")
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self { client })
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }
}

impl BrowserEngine for HttpEngine {
    type Page = HttpPage;

    async fn new_page(&mut self) -> Result<HttpPage> {
        Ok(HttpPage {
            client: self.client.clone(),
            base: None,
            body: None,
            pending: Vec::new(),
        })
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

pub struct HttpPage {
    client: Client,
    base: Option<Url>,
    body: Option<String>,
    pending: Vec<PageEvent>,
}

impl BrowserPage for HttpPage {
    async fn install_startup_script(&mut self, _source: &str) -> Result<()> {
        // No script runtime to install into.
        Ok(())
    }

    async fn navigate(&mut self, url: &Url, timeout: Duration) -> Result<i32> {
        self.base = None;
        self.body = None;

        let response = tokio::time::timeout(timeout, self.client.get(url.clone()).send())
            .await
            .map_err(|_| CrawlError::NavigationTimeout(timeout))??;

        // Redirects were already followed; this is the final resolved status
        // of the document, recorded against the requested URL.
        let status = i32::from(response.status().as_u16());
        let is_html = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("text/html"))
            .unwrap_or(false);

        let body = tokio::time::timeout(timeout, response.text())
            .await
            .map_err(|_| CrawlError::NavigationTimeout(timeout))??;

        self.pending.push(PageEvent::Response {
            url: url.as_str().to_string(),
            status,
        });
        self.base = Some(url.clone());
        if is_html {
            self.body = Some(body);
        }
        Ok(status)
    }

    async fn anchor_hrefs(&mut self) -> Result<Vec<String>> {
        let (Some(base), Some(body)) = (self.base.as_ref(), self.body.as_deref()) else {
            return Ok(Vec::new());
        };
        Ok(extract_anchor_hrefs(body, base))
    }

    fn drain_events(&mut self) -> Vec<PageEvent> {
        std::mem::take(&mut self.pending)
    }
}

fn extract_anchor_hrefs(html: &str, base: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]").expect("static selector");

    let mut hrefs = Vec::new();
    for element in document.select(&selector) {
        if let Some(href) = element.value().attr("href")
            && let Some(resolved) = resolve_href(base, href)
        {
            debug!(href = %resolved, "found anchor");
            hrefs.push(resolved);
        }
    }
    hrefs
}

fn resolve_href(base: &Url, href: &str) -> Option<String> {
    // Skip non-navigable schemes and bare fragments.
    if href.is_empty()
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with('#')
    {
        return None;
    }
    base.join(href).ok().map(|url| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://example.com/dir/page.html").unwrap()
    }

    #[test]
    fn test_resolve_href_relative() {
        assert_eq!(
            resolve_href(&base(), "other.html"),
            Some("http://example.com/dir/other.html".to_string())
        );
    }

    #[test]
    fn test_resolve_href_absolute() {
        assert_eq!(
            resolve_href(&base(), "https://other.example/x"),
            Some("https://other.example/x".to_string())
        );
    }

    #[test]
    fn test_resolve_href_skips_non_navigable() {
        assert_eq!(resolve_href(&base(), ""), None);
        assert_eq!(resolve_href(&base(), "javascript:void(0)"), None);
        assert_eq!(resolve_href(&base(), "mailto:someone@example.com"), None);
        assert_eq!(resolve_href(&base(), "tel:+15551234"), None);
        assert_eq!(resolve_href(&base(), "#section"), None);
    }

    #[test]
    fn test_extract_anchor_hrefs_resolves_against_base() {
        let html = r##"<html><body>
            <a href="/top.html">Top</a>
            <a href="sibling.html">Sibling</a>
            <a href="#frag">Fragment</a>
            <a name="anchor-without-href">Named</a>
        </body></html>"##;
        let hrefs = extract_anchor_hrefs(html, &base());
        assert_eq!(
            hrefs,
            vec![
                "http://example.com/top.html".to_string(),
                "http://example.com/dir/sibling.html".to_string(),
            ]
        );
    }
}
