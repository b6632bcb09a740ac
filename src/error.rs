use thiserror::Error;

/// Failure of a single fetch. Every variant is treated the same way by the
/// orchestrator: the resource is recorded as failed and the run continues.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("failed to read body of {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Errors that abort the whole run.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("invalid target URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("target URL {0} has no host")]
    MissingHost(String),

    #[error("entry document {url} is unreachable: {source}")]
    EntryUnreachable {
        url: String,
        #[source]
        source: FetchError,
    },
}
