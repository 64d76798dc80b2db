use thiserror::Error;

/// Failure of a single streaming round-trip. The partial content read before
/// the failure is never handed back to the caller.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("endpoint returned {code}: {body}")] Status { code: u16, body: String },
    #[error("request timed out")] Timeout,
    #[error("connection failed: {0}")] Connect(String),
    #[error("malformed event stream: {0}")] MalformedStream(String),
    #[error("request failed: {0}")] Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if e.is_decode() || e.is_body() {
            TransportError::MalformedStream(e.to_string())
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("syntax oracle unavailable: {0}")] Unavailable(String),
    #[error("syntax oracle timed out after {0}s")] Timeout(u64),
    #[error("syntax oracle io: {0}")] Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("cannot parse {path}: {message}")]
    Parse { path: String, message: String },
    #[error("cookie file {path} is not a JSON object of strings: {message}")]
    Cookie { path: String, message: String },
    #[error("invalid config: {0}")] Invalid(String),
}
