use thiserror::Error;

/// Ways a send can end without a reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// The session's token fired while the request was in flight. Not a failure.
    #[error("request was cancelled")]
    Cancelled,

    #[error("HTTP error! status: {status}")]
    Status { status: u16 },

    /// Network failure or a body that could not be parsed.
    #[error("{message}")]
    Transport { message: String },

    #[error("unexpected failure: {message}")]
    Unexpected { message: String },
}

impl SendError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        SendError::Transport {
            message: err.to_string(),
        }
    }

    /// True for status and network/parse failures, which render as a connection apology.
    pub fn is_transport(&self) -> bool {
        matches!(self, SendError::Status { .. } | SendError::Transport { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            SendError::Status { status: 502 }.to_string(),
            "HTTP error! status: 502"
        );
        assert_eq!(
            SendError::transport("connection refused").to_string(),
            "connection refused"
        );
    }

    #[test]
    fn test_is_transport() {
        assert!(SendError::Status { status: 404 }.is_transport());
        assert!(SendError::transport("boom").is_transport());
        assert!(!SendError::Cancelled.is_transport());
        assert!(!SendError::Unexpected { message: "x".into() }.is_transport());
    }
}
