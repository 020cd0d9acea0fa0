// ABOUTME: Connection descriptor and the provider seam that turns it into a live session
// ABOUTME: Keeps the password in its own sensitive section and out of Debug output

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DbError;
use crate::session::Session;

/// Default MySQL port used when the descriptor omits one
pub const DEFAULT_PORT: u16 = 3306;

/// Non-sensitive connection fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub host: String,
    pub user: String,
    pub database: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Sensitive connection fields. Never logged.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSecrets {
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for ConnectionSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSecrets")
            .field("password", &"***")
            .finish()
    }
}

/// Everything needed to open a session for one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    #[serde(rename = "unEncrypted")]
    pub params: ConnectionParams,
    #[serde(rename = "encrypted", default = "empty_secrets")]
    pub secrets: ConnectionSecrets,
}

fn empty_secrets() -> ConnectionSecrets {
    ConnectionSecrets {
        password: String::new(),
    }
}

impl ConnectionDescriptor {
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        database: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            params: ConnectionParams {
                host: host.into(),
                user: user.into(),
                database: database.into(),
                port: DEFAULT_PORT,
            },
            secrets: ConnectionSecrets {
                password: password.into(),
            },
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.params.port = port;
        self
    }

    /// `user@host:port/database`, safe for logs
    pub fn display_target(&self) -> String {
        format!(
            "{}@{}:{}/{}",
            self.params.user, self.params.host, self.params.port, self.params.database
        )
    }
}

/// Produces a live session from a descriptor.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    type Session: Session;

    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Self::Session, DbError>;
}
