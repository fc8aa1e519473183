//! Search client error types.

/// Errors from a single fetch against the search API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
  /// Connection failure, timeout or non-success status.
  #[error("network error{}: {message}", fmt_status(.status))]
  Network {
    status: Option<u16>,
    message: String,
  },

  /// Payload did not match the expected schema.
  #[error("decode error: {0}")]
  Decode(String),
}

fn fmt_status(status: &Option<u16>) -> String {
  status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

impl FetchError {
  /// Status code reported by the server, if the request got that far.
  pub fn status(&self) -> Option<u16> {
    match self {
      FetchError::Network { status, .. } => *status,
      FetchError::Decode(_) => None,
    }
  }

  pub fn is_decode(&self) -> bool {
    matches!(self, FetchError::Decode(_))
  }

  /// Reason suitable for showing to the user.
  pub fn user_message(&self) -> &'static str {
    match self {
      FetchError::Network { .. } => "Unable to refresh data. Please check your connection.",
      FetchError::Decode(_) => "Unable to refresh data. The server sent an unexpected response.",
    }
  }
}

impl From<reqwest::Error> for FetchError {
  fn from(err: reqwest::Error) -> Self {
    let message = if err.is_timeout() {
      "request timed out".to_string()
    } else {
      err.to_string()
    };
    FetchError::Network {
      status: err.status().map(|s| s.as_u16()),
      message,
    }
  }
}
