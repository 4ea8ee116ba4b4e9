use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use scraper::Html;

use crate::error::{ScrapeError, ScrapeResult};

/// Retrieves one markup page. Network faults and non-markup responses are
/// both reported as `ScrapeError::Fetch`.
pub trait PageFetcher {
    fn fetch(&self, url: &str) -> ScrapeResult<String>;

    fn fetch_document(&self, url: &str) -> ScrapeResult<Html> {
        let html = self.fetch(url)?;
        Ok(Html::parse_document(&html))
    }
}

pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> ScrapeResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|err| ScrapeError::fetch("<client>", format!("build http client: {err}")))?;
        Ok(Self { client })
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> ScrapeResult<String> {
        tracing::debug!(%url, "GET");
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, concat!("ficbookify/", env!("CARGO_PKG_VERSION")))
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .send()
            .map_err(|err| ScrapeError::fetch(url, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::fetch(url, format!("http status {status}")));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if !is_markup_content_type(&content_type) {
            return Err(ScrapeError::fetch(
                url,
                format!("not a markup document (content-type {content_type:?})"),
            ));
        }

        response.text().map_err(|err| ScrapeError::fetch(url, err))
    }
}

fn is_markup_content_type(content_type: &str) -> bool {
    content_type.starts_with("text/html") || content_type.starts_with("application/xhtml+xml")
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use super::*;

    /// Serves pages from memory and records the requested urls in order.
    #[derive(Default)]
    pub struct StaticFetcher {
        pages: HashMap<String, String>,
        pub requested: RefCell<Vec<String>>,
    }

    impl StaticFetcher {
        pub fn with_page(mut self, url: &str, html: &str) -> Self {
            self.pages.insert(url.to_owned(), html.to_owned());
            self
        }
    }

    impl PageFetcher for StaticFetcher {
        fn fetch(&self, url: &str) -> ScrapeResult<String> {
            self.requested.borrow_mut().push(url.to_owned());
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| ScrapeError::fetch(url, "http status 404 Not Found"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markup_content_types_are_accepted() {
        assert!(is_markup_content_type("text/html; charset=utf-8"));
        assert!(is_markup_content_type("application/xhtml+xml"));
        assert!(!is_markup_content_type("image/png"));
        assert!(!is_markup_content_type(""));
    }
}
