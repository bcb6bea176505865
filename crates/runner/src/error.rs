/// Errors from the outbound runner and page-directory clients.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// No webhook URL was configured for the workflow runner.
    #[error("Runner webhook URL is not configured")]
    NotConfigured,

    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote side answered with a non-2xx status. `message` is the
    /// best human-readable explanation extracted from the body.
    #[error("{message}")]
    Rejected { status: u16, message: String },
}

impl RunnerError {
    /// Short variant name, surfaced in non-production error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotConfigured => "NotConfigured",
            Self::Request(_) => "RequestError",
            Self::Rejected { .. } => "Rejected",
        }
    }
}
