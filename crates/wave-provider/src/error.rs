use thiserror::Error;

/// EIP-1193 provider codes and the JSON-RPC codes wallets and nodes reuse.
pub mod codes {
    pub const USER_REJECTED: i64 = 4001;
    pub const UNAUTHORIZED: i64 = 4100;
    pub const UNSUPPORTED_METHOD: i64 = 4200;
    pub const DISCONNECTED: i64 = 4900;
    pub const CHAIN_DISCONNECTED: i64 = 4901;
    pub const EXECUTION_REVERTED: i64 = 3;
    pub const REQUEST_PENDING: i64 = -32002;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INTERNAL: i64 = -32603;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("no wallet provider is available")]
    NotInstalled,
    #[error("wallet provider is not ready")]
    NotReady,
    #[error("rpc error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        revert_reason: Option<String>,
    },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Decode(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

impl ProviderError {
    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        Self::Rpc {
            code,
            message: message.into(),
            revert_reason: None,
        }
    }

    pub fn reverted(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::Rpc {
            code: codes::EXECUTION_REVERTED,
            message: format!("execution reverted: {reason}"),
            revert_reason: Some(reason),
        }
    }

    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_user_rejected(&self) -> bool {
        self.code() == Some(codes::USER_REJECTED)
    }

    pub fn is_request_pending(&self) -> bool {
        self.code() == Some(codes::REQUEST_PENDING)
    }

    pub fn is_method_not_found(&self) -> bool {
        matches!(
            self.code(),
            Some(codes::METHOD_NOT_FOUND) | Some(codes::UNSUPPORTED_METHOD)
        )
    }

    /// The contract's revert reason, when the error is an execution revert.
    ///
    /// Nodes report reverts either with code 3 and ABI-encoded data, or as an
    /// internal error whose message starts with `execution reverted`.
    pub fn revert_reason(&self) -> Option<String> {
        let Self::Rpc {
            code,
            message,
            revert_reason,
        } = self
        else {
            return None;
        };

        if let Some(reason) = revert_reason {
            return Some(reason.clone());
        }

        let lowered = message.to_ascii_lowercase();
        let Some(start) = lowered.find("execution reverted") else {
            return (*code == codes::EXECUTION_REVERTED).then(String::new);
        };

        let rest = &message[start + "execution reverted".len()..];
        Some(rest.trim_start_matches(':').trim().to_owned())
    }

    pub fn is_revert(&self) -> bool {
        self.revert_reason().is_some()
    }
}
