use thiserror::Error;

/// Failures of the scrape pipeline. Every variant aborts the run.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("malformed work url {url:?}: {reason}")]
    MalformedUrl { url: String, reason: String },

    #[error("story content container not found: {url}")]
    ContainerNotFound { url: String },

    #[error("profile container not found: {url}")]
    ProfileContainerNotFound { url: String },

    #[error("unexpected stats line shape at segment {segment:?}: {line:?}")]
    UnexpectedStatsShape { segment: String, line: String },

    #[error("stats line {selector:?} not found in profile: {url}")]
    StatsLineNotFound { selector: String, url: String },

    #[error("invalid selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },
}

pub type ScrapeResult<T> = Result<T, ScrapeError>;

impl ScrapeError {
    pub fn fetch(url: &str, reason: impl std::fmt::Display) -> Self {
        Self::Fetch {
            url: url.to_owned(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed_url(url: &str, reason: impl std::fmt::Display) -> Self {
        Self::MalformedUrl {
            url: url.to_owned(),
            reason: reason.to_string(),
        }
    }
}
