use bytes::Bytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 401/403: invalid or expired credentials.
    Auth,
    /// 429.
    RateLimit,
    /// 5xx.
    UpstreamServer,
    /// Any other non-2xx.
    UpstreamClient,
    /// No HTTP response was obtained.
    Transport,
    /// A response body that should be JSON was not.
    Decode,
}

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// Transport-level failure (no HTTP response).
    #[error("transport error: {0}")]
    Transport(String),
    /// Terminal HTTP failure; status and payload are upstream's, verbatim.
    #[error("upstream returned status {status}")]
    Http { status: u16, body: Bytes },
    #[error("invalid JSON payload: {0}")]
    Decode(String),
}

impl UpstreamError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UpstreamError::Transport(_) => ErrorKind::Transport,
            UpstreamError::Decode(_) => ErrorKind::Decode,
            UpstreamError::Http { status, .. } => match *status {
                401 | 403 => ErrorKind::Auth,
                429 => ErrorKind::RateLimit,
                500..=599 => ErrorKind::UpstreamServer,
                _ => ErrorKind::UpstreamClient,
            },
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
