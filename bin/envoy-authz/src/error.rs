use portcullis_core::RpcStatus;
use std::fmt;

/// A single failed call to the decision service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The request never produced an HTTP response.
    Transport { reason: String },
    /// The service answered with an RPC error.
    Status { http_status: u16, status: RpcStatus },
    /// The service answered with something that was not a reply.
    Decode { reason: String },
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport { reason } => write!(f, "transport: {reason}"),
            Self::Status {
                http_status,
                status,
            } => write!(f, "HTTP {http_status}: {status}"),
            Self::Decode { reason } => write!(f, "decode reply: {reason}"),
        }
    }
}

impl std::error::Error for ClientError {}

/// Why a check could not be answered with a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    /// Every attempt failed.
    Unavailable { message: String },
    /// The caller's deadline passed during a call or a wait.
    DeadlineExceeded { attempts: u32, failures: Vec<String> },
    /// The caller went away during a call or a wait.
    Cancelled { attempts: u32, failures: Vec<String> },
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { message } => write!(f, "unavailable: {message}"),
            Self::DeadlineExceeded { attempts, failures } => {
                write!(f, "deadline exceeded after {attempts} tries: {failures:?}")
            }
            Self::Cancelled { attempts, failures } => {
                write!(f, "cancelled after {attempts} tries: {failures:?}")
            }
        }
    }
}

impl std::error::Error for ProxyError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidServerUrl { reason: String },
    Client { reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidServerUrl { reason } => write!(f, "invalid server URL: {reason}"),
            Self::Client { reason } => write!(f, "build HTTP client: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}
