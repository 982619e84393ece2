/*!
NETCONF (RFC 6241) over the SSH `netconf` subsystem.

Only base:1.0 is advertised, so every message is terminated by the `]]>]]>`
end-of-message marker. RPCs are issued strictly one at a time.
*/

use std::io::{Read, Write};
use std::sync::Arc;

use async_trait::async_trait;
use quick_xml::escape::escape;
use ssh2::Channel;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{
    core::{CommitStatus, DeviceSession, SessionConnector, SessionError},
    ssh::SshClient,
};
use crate::{
    config::RouterDescriptor,
    parsers::junos::{LldpNeighbor, RpcReply, XmlElement},
};

pub const NETCONF_PORT: u16 = 830;

const END_OF_MESSAGE: &[u8] = b"]]>]]>";
const BASE_NAMESPACE: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";
const BASE_CAPABILITY: &str = "urn:ietf:params:netconf:base:1.0";
const READ_CHUNK: usize = 8192;

/// Accumulates channel bytes and splits them into end-of-message framed messages.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    pending: Vec<u8>,
}

impl FrameBuffer {
    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Pop the next complete message, if one has arrived. Bytes after the marker are kept.
    pub fn next_message(&mut self) -> Option<String> {
        let end = self
            .pending
            .windows(END_OF_MESSAGE.len())
            .position(|w| w == END_OF_MESSAGE)?;
        let rest = self.pending.split_off(end + END_OF_MESSAGE.len());
        self.pending.truncate(end);
        let bytes = std::mem::replace(&mut self.pending, rest);
        let message = match String::from_utf8(bytes) {
            Ok(message) => message,
            Err(e) => {
                debug!(
                    valid_up_to = e.utf8_error().valid_up_to(),
                    "NETCONF message is not valid UTF-8, replacing invalid bytes"
                );
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };
        Some(message)
    }
}

/// A framed NETCONF stream. In production the transport is the SSH subsystem channel.
struct NetconfChannel<T> {
    transport: T,
    frames: FrameBuffer,
}

impl<T: Read + Write> NetconfChannel<T> {
    fn new(transport: T) -> Self {
        Self {
            transport,
            frames: FrameBuffer::default(),
        }
    }

    fn exchange_sync(&mut self, message: &str) -> Result<String, SessionError> {
        self.transport
            .write_all(message.as_bytes())
            .and_then(|_| self.transport.write_all(END_OF_MESSAGE))
            .and_then(|_| self.transport.flush())
            .map_err(|e| SessionError::Netconf(format!("write failed: {}", e)))?;

        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(reply) = self.frames.next_message() {
                return Ok(reply);
            }
            let read = self
                .transport
                .read(&mut chunk)
                .map_err(|e| SessionError::Netconf(format!("read failed: {}", e)))?;
            if read == 0 {
                return Err(SessionError::Netconf(
                    "channel closed before end of message".to_string(),
                ));
            }
            self.frames.push(&chunk[..read]);
        }
    }
}

fn client_hello() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><hello xmlns="{BASE_NAMESPACE}"><capabilities><capability>{BASE_CAPABILITY}</capability></capabilities></hello>"#
    )
}

fn rpc_envelope(message_id: u64, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><rpc xmlns="{BASE_NAMESPACE}" message-id="{message_id}">{body}</rpc>"#
    )
}

fn check_server_hello(raw: &str) -> Result<(), SessionError> {
    let hello = XmlElement::parse(raw)?;
    if hello.name != "hello" {
        return Err(SessionError::Netconf(format!(
            "expected <hello>, got <{}>",
            hello.name
        )));
    }
    let speaks_base = hello
        .find_all("capability")
        .iter()
        .any(|c| c.text == BASE_CAPABILITY);
    if !speaks_base {
        return Err(SessionError::Netconf(
            "server does not advertise base:1.0".to_string(),
        ));
    }
    Ok(())
}

/// Fail on any error-severity `rpc-error`.
fn checked(reply: RpcReply) -> Result<RpcReply, SessionError> {
    match reply.first_error() {
        Some(error) => Err(SessionError::Rpc(error.to_string())),
        None => Ok(reply),
    }
}

async fn disconnect_after_failure(client: &mut SshClient) {
    if let Err(e) = client.close().await {
        warn!(host = client.host(), error = %e, "failed to disconnect after session start failed");
    }
}

/// A Junos NETCONF session.
pub struct NetconfSession<T = Channel> {
    client: SshClient,
    channel: Option<Arc<Mutex<NetconfChannel<T>>>>,
    next_message_id: u64,
}

impl NetconfSession<Channel> {
    /// Connect, authenticate, start the `netconf` subsystem and exchange hellos.
    /// The SSH connection is torn down again if any step after authentication fails.
    pub async fn open(router: &RouterDescriptor) -> Result<Self, SessionError> {
        let mut client = SshClient::new_with_password(
            router.user.clone(),
            router.ip.clone(),
            router.password.clone(),
            router.port,
        );
        client.connect().await?;
        let channel = match client.open_subsystem("netconf").await {
            Ok(channel) => channel,
            Err(e) => {
                disconnect_after_failure(&mut client).await;
                return Err(e.into());
            }
        };
        Self::start(client, channel).await
    }
}

impl<T: Read + Write + Send + 'static> NetconfSession<T> {
    async fn start(client: SshClient, transport: T) -> Result<Self, SessionError> {
        let mut session = Self {
            client,
            channel: Some(Arc::new(Mutex::new(NetconfChannel::new(transport)))),
            next_message_id: 1,
        };

        let hello = session
            .exchange(client_hello())
            .await
            .and_then(|server_hello| check_server_hello(&server_hello));
        if let Err(e) = hello {
            session.channel = None;
            disconnect_after_failure(&mut session.client).await;
            return Err(e);
        }
        debug!(host = session.client.host(), "NETCONF hello exchanged");
        Ok(session)
    }

    async fn exchange(&self, message: String) -> Result<String, SessionError> {
        let channel = self.channel.clone().ok_or(SessionError::Closed)?;
        tokio::task::spawn_blocking(move || {
            let mut channel = channel.blocking_lock();
            channel.exchange_sync(&message)
        })
        .await
        .map_err(|e| SessionError::Async(e.to_string()))?
    }

    async fn rpc(&mut self, body: &str) -> Result<RpcReply, SessionError> {
        let message_id = self.next_message_id;
        self.next_message_id += 1;
        debug!(host = self.client.host(), message_id, rpc = body, "sending RPC");
        let raw = self.exchange(rpc_envelope(message_id, body)).await?;
        Ok(RpcReply::parse(&raw)?)
    }
}

#[async_trait]
impl<T: Read + Write + Send + 'static> DeviceSession for NetconfSession<T> {
    async fn load_and_commit(&mut self, set_commands: &str) -> Result<CommitStatus, SessionError> {
        let load = self
            .rpc(&format!(
                r#"<load-configuration action="set" format="text"><configuration-set>{}</configuration-set></load-configuration>"#,
                escape(set_commands)
            ))
            .await?;
        if let Some(error) = load.first_error() {
            return Ok(CommitStatus::Rejected(error.to_string()));
        }

        let commit = self.rpc("<commit-configuration/>").await?;
        if let Some(error) = commit.first_error() {
            return Ok(CommitStatus::Rejected(error.to_string()));
        }
        if commit.commit_succeeded() {
            Ok(CommitStatus::Committed)
        } else {
            Ok(CommitStatus::Rejected(
                "commit was not acknowledged".to_string(),
            ))
        }
    }

    async fn lldp_neighbors(&mut self) -> Result<Vec<LldpNeighbor>, SessionError> {
        let reply = checked(self.rpc("<get-lldp-neighbors-information/>").await?)?;
        Ok(reply.lldp_neighbors())
    }

    async fn interface_address(&mut self, interface_name: &str) -> Result<String, SessionError> {
        let reply = checked(
            self.rpc(&format!(
                "<get-interface-information><interface-name>{}</interface-name></get-interface-information>",
                escape(interface_name)
            ))
            .await?,
        )?;
        reply
            .interface_destination()
            .ok_or(SessionError::MissingField("ifa-destination"))
    }

    async fn host_name(&mut self) -> Result<String, SessionError> {
        let reply = checked(self.rpc("<get-software-information/>").await?)?;
        reply.host_name().ok_or(SessionError::MissingField("host-name"))
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        if self.channel.is_none() {
            return Ok(());
        }
        if let Err(e) = self.rpc("<close-session/>").await {
            warn!(host = self.client.host(), error = %e, "close-session RPC failed");
        }
        self.channel = None;
        self.client.close().await?;
        Ok(())
    }
}

/// Opens a `NetconfSession` per router.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetconfConnector;

#[async_trait]
impl SessionConnector for NetconfConnector {
    type Session = NetconfSession;

    async fn open(&self, router: &RouterDescriptor) -> Result<NetconfSession, SessionError> {
        NetconfSession::open(router).await
    }
}
