use thiserror::Error;

/// Error taxonomy for calls against the remote catalog
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CatalogError {
    /// The catalog rejected a request parameter (typically the page size)
    #[error("Request rejected by catalog: {0}")]
    Validation(String),

    /// The requested endpoint or resource does not exist for this query shape
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Request exceeded its deadline
    #[error("Request timed out after {1}s: {0}")]
    Timeout(String, u64),

    /// Connection could not be established or was dropped
    #[error("Network failure: {0}")]
    Network(String),

    /// Catalog returned an unexpected status
    #[error("Catalog returned {0}: {1}")]
    Server(u16, String),

    /// Body could not be decoded
    #[error("Failed to parse response: {0}")]
    Parse(String),
}

impl CatalogError {
    /// Map a non-success HTTP status to the matching error class
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            400 | 422 => CatalogError::Validation(message),
            404 | 410 => CatalogError::NotFound(message),
            _ => CatalogError::Server(status, message),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, CatalogError::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CatalogError::NotFound(_))
    }

    /// Get detailed diagnostic information about the error
    pub fn diagnostics(&self) -> String {
        match self {
            CatalogError::Validation(reason) => {
                format!("Validation Error\nReason: {}\nSuggestion: Request parameters were adjusted automatically; try again", reason)
            }
            CatalogError::NotFound(what) => {
                format!("Not Found\nResource: {}\nSuggestion: The catalog does not support this query shape", what)
            }
            CatalogError::Timeout(target, secs) => {
                format!("Timeout\nTarget: {}\nDeadline: {} seconds\nSuggestion: Catalog is slow or offline", target, secs)
            }
            CatalogError::Network(source) => {
                format!("Network Failure\nError: {}\nSuggestion: Check your internet connection", source)
            }
            CatalogError::Server(status, message) => {
                format!("Server Error\nStatus: {}\nMessage: {}\nSuggestion: Try again later", status, message)
            }
            CatalogError::Parse(source) => {
                format!("Parse Error\nError: {}\nSuggestion: Catalog response is invalid", source)
            }
        }
    }
}

impl From<reqwest::Error> for CatalogError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            let target = err.url().map(|u| u.path().to_string()).unwrap_or_default();
            CatalogError::Timeout(target, 0)
        } else if err.is_decode() {
            CatalogError::Parse(err.to_string())
        } else if let Some(status) = err.status() {
            CatalogError::from_status(status.as_u16(), err.to_string())
        } else {
            CatalogError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        CatalogError::Parse(err.to_string())
    }
}
