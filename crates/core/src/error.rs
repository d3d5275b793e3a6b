use thiserror::Error;

#[derive(Debug, Error)]
pub enum MolsimError {
    /// Transport, authentication or API-level failure reported by the cloud provider.
    #[error("provider error: {message}")]
    Provider {
        code: Option<String>,
        message: String,
    },

    #[error("remote command on {host} failed: {message}")]
    Remote { host: String, message: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("cluster did not reach {expected} running instances within {waited:?} ({running} running)")]
    StartupTimeout {
        expected: usize,
        running: usize,
        waited: std::time::Duration,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Message(String),
}

impl MolsimError {
    pub fn provider(message: impl Into<String>) -> Self {
        MolsimError::Provider {
            code: None,
            message: message.into(),
        }
    }

    pub fn remote(host: impl Into<String>, message: impl Into<String>) -> Self {
        MolsimError::Remote {
            host: host.into(),
            message: message.into(),
        }
    }
}

impl From<String> for MolsimError {
    fn from(message: String) -> Self {
        MolsimError::Message(message)
    }
}
