use std::net::TcpStream;
use std::sync::Arc;
use ssh2::{Channel, Session};
use tokio::sync::Mutex;
use tracing::debug;

use thiserror::Error;

use super::core::SessionError;

pub struct SshClient {
    username: String,
    host: String,
    password: Option<String>,
    port: u16,
    session: Option<Arc<Mutex<ssh2::Session>>>
}

#[derive(Debug, Error)]
pub enum SshError {
    #[error("TCP error: {0}")]
    TcpError(String),
    #[error("SSH error: {0}")]
    SshError(String),
    #[error("SSH authentication error: {0}")]
    SshAuthError(String),
    #[error("Async error: {0}")]
    AsyncError(String),
}

impl From<SshError> for SessionError {
    fn from(e: SshError) -> Self {
        match e {
            SshError::TcpError(s) => SessionError::Tcp(s),
            SshError::SshError(s) => SessionError::Ssh(s),
            SshError::SshAuthError(s) => SessionError::Auth(s),
            SshError::AsyncError(s) => SessionError::Async(s),
        }
    }
}

impl SshClient {
    pub fn new_with_password(username: String, host: String, password: String, port: u16) -> Self {
        Self {
            username,
            host,
            password: Some(password),
            port,
            session: None
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn connect_sync_inner(username: String, host: String, password: Option<String>, port: u16) -> Result<Session, SshError> {
        let tcp = TcpStream::connect((host.as_str(), port)).map_err(|e| SshError::TcpError(e.to_string()))?;
        let mut session = ssh2::Session::new().map_err(|e| SshError::SshError(e.to_string()))?;
        session.set_tcp_stream(tcp);
        session.handshake().map_err(|e| SshError::SshError(e.to_string()))?;
        if let Some(password) = password {
            session.userauth_password(&username, &password).map_err(|e| SshError::SshAuthError(e.to_string()))?;
        }
        if !session.authenticated() {
            return Err(SshError::SshAuthError("Authentication failed".to_string()));
        }
        Ok(session)
    }

    pub async fn connect(&mut self) -> Result<(), SshError> {
        if self.session.is_some() {
            return Err(SshError::SshError("Already connected".to_string()));
        }
        let username = self.username.clone();
        let host = self.host.clone();
        let password = self.password.clone();
        let port = self.port;
        debug!(%host, port, "opening SSH session");
        let session = tokio::task::spawn_blocking(move || {
            SshClient::connect_sync_inner(username, host, password, port)
        })
        .await
        .map_err(|e| SshError::AsyncError(e.to_string()))?
        ?;
        self.session = Some(Arc::new(Mutex::new(session)));
        Ok(())
    }

    /// Start a named subsystem (e.g. `netconf`) on a fresh channel.
    pub async fn open_subsystem(&self, subsystem: &str) -> Result<Channel, SshError> {
        let session_mutex = match &self.session {
            Some(s) => s.clone(),
            None => return Err(SshError::SshError("Session not initialized".to_string())),
        };
        let subsystem = subsystem.to_string();
        tokio::task::spawn_blocking(move || {
            let session = session_mutex.blocking_lock();
            let mut channel = session.channel_session().map_err(|e| SshError::SshError(e.to_string()))?;
            channel.subsystem(&subsystem).map_err(|e| SshError::SshError(e.to_string()))?;
            Ok(channel)
        })
        .await
        .map_err(|e| SshError::AsyncError(e.to_string()))?
    }

    #[cfg(test)]
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub async fn close(&mut self) -> Result<(), SshError> {
        if let Some(session) = self.session.take() {
            let session = session.lock().await;
            session.disconnect(Some(ssh2::DisconnectCode::ByApplication), "", None).map_err(|e| SshError::SshError(e.to_string()))?;
        }
        Ok(())
    }
}
