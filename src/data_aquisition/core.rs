use async_trait::async_trait;
use thiserror::Error;

use crate::{
    config::RouterDescriptor,
    parsers::junos::{LldpNeighbor, ReplyParseError},
};

/// Errors raised while talking to a device.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("TCP error: {0}")]
    Tcp(String),
    #[error("SSH error: {0}")]
    Ssh(String),
    #[error("SSH authentication error: {0}")]
    Auth(String),
    #[error("NETCONF error: {0}")]
    Netconf(String),
    #[error("RPC error: {0}")]
    Rpc(String),
    #[error("malformed reply: {0}")]
    Malformed(#[from] ReplyParseError),
    #[error("reply is missing <{0}>")]
    MissingField(&'static str),
    #[error("Async error: {0}")]
    Async(String),
    #[error("session is closed")]
    Closed,
}

/// Result of loading and committing a configuration change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitStatus {
    Committed,
    Rejected(String),
}

/// An open, authenticated session to a router.
///
/// The discovery logic only needs these five operations, so anything answering them
/// (a NETCONF session, a recorded fixture) can drive a run.
#[async_trait]
pub trait DeviceSession: Send {
    /// Load set-format configuration commands and commit them.
    async fn load_and_commit(&mut self, set_commands: &str) -> Result<CommitStatus, SessionError>;

    /// The device's LLDP neighbor table.
    async fn lldp_neighbors(&mut self) -> Result<Vec<LldpNeighbor>, SessionError>;

    /// Address of the given local interface as reported by the first `ifa-destination`.
    async fn interface_address(&mut self, interface_name: &str) -> Result<String, SessionError>;

    /// The device's own host name.
    async fn host_name(&mut self) -> Result<String, SessionError>;

    /// Release the session. Calling this on a closed session is a no-op.
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// Opens device sessions from router descriptors.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    type Session: DeviceSession;

    async fn open(&self, router: &RouterDescriptor) -> Result<Self::Session, SessionError>;
}
