use thiserror::Error;

/// Structured errors surfaced by the transfer engine.
///
/// Every variant is cheap to clone so a failure can travel inside a
/// [`crate::transfer::TransferEvent`] and still be returned from the worker thread.
#[derive(Debug, Clone, Error)]
pub enum TransferError {
    /// Local path missing, permission denied, disk write failure.
    #[error("file system error: {0}")]
    FileSystem(String),
    /// Any remote call failure, including a part that exhausted its retries.
    #[error("api error: {message}")]
    Api { message: String, status: Option<u16> },
    /// Nothing to transfer, or an argument the engine refuses before touching the network.
    #[error("validation error: {0}")]
    Validation(String),
    #[error("transfer cancelled by user")]
    UserCancelled,
}

impl TransferError {
    pub fn fs(context: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        TransferError::FileSystem(format!("{}: {}", context, err))
    }

    pub fn api(message: impl Into<String>) -> Self {
        TransferError::Api { message: message.into(), status: None }
    }

    pub fn api_status(status: u16, message: impl Into<String>) -> Self {
        TransferError::Api { message: message.into(), status: Some(status) }
    }

    /// Prefix the message with where it happened (file name, part number).
    pub fn context(self, ctx: impl std::fmt::Display) -> Self {
        use TransferError::*;
        match self {
            FileSystem(m) => FileSystem(format!("{}: {}", ctx, m)),
            Api { message, status } => Api { message: format!("{}: {}", ctx, message), status },
            Validation(m) => Validation(format!("{}: {}", ctx, m)),
            UserCancelled => UserCancelled,
        }
    }

    pub fn is_user_cancelled(&self) -> bool {
        matches!(self, TransferError::UserCancelled)
    }

    /// Whether another attempt of the same remote call could succeed.
    /// Client errors are permanent except request timeout and throttling.
    pub fn is_retriable(&self) -> bool {
        match self {
            TransferError::Api { status: Some(code), .. } => {
                !(400..500).contains(code) || *code == 408 || *code == 429
            }
            TransferError::Api { status: None, .. } => true,
            TransferError::FileSystem(_) => true,
            TransferError::Validation(_) | TransferError::UserCancelled => false,
        }
    }
}

impl From<reqwest::Error> for TransferError {
    fn from(e: reqwest::Error) -> Self {
        TransferError::Api { message: e.to_string(), status: e.status().map(|s| s.as_u16()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_permanent() {
        assert!(!TransferError::api_status(403, "forbidden").is_retriable());
        assert!(!TransferError::api_status(404, "missing").is_retriable());
        assert!(TransferError::api_status(429, "slow down").is_retriable());
        assert!(TransferError::api_status(503, "unavailable").is_retriable());
        assert!(TransferError::api("connection reset").is_retriable());
    }

    #[test]
    fn cancel_and_validation_never_retry() {
        assert!(!TransferError::UserCancelled.is_retriable());
        assert!(!TransferError::Validation("empty".into()).is_retriable());
    }

    #[test]
    fn context_keeps_variant_and_status() {
        let e = TransferError::api_status(500, "boom").context("part 3");
        match e {
            TransferError::Api { message, status } => {
                assert_eq!(message, "part 3: boom");
                assert_eq!(status, Some(500));
            }
            other => panic!("unexpected variant: {:?}", other),
        }
        assert!(TransferError::UserCancelled.context("x").is_user_cancelled());
    }
}
