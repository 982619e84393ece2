//! Scripted device sessions for exercising discovery without routers.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

use crate::{
    config::RouterDescriptor,
    data_aquisition::core::{CommitStatus, DeviceSession, SessionConnector, SessionError},
    parsers::junos::LldpNeighbor,
};

/// Shared, ordered record of every call made against mock devices.
/// Entries look like `R1:lldp`, `R1:interface:ge-0/0/0`, `open:10.0.0.1`.
#[derive(Debug, Clone, Default)]
pub struct SessionLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl SessionLog {
    pub fn push(&self, entry: String) {
        self.entries.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries.lock().unwrap().iter().filter(|e| *e == entry).count()
    }

    pub fn committed(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| e.split_once(":commit:").map(|(_, cmd)| cmd.to_string()))
            .collect()
    }
}

#[derive(Debug, Clone)]
enum MockCommit {
    Accept,
    Reject(String),
    Fail,
}

#[derive(Debug, Clone)]
pub struct MockDevice {
    host_name: String,
    neighbors: Vec<LldpNeighbor>,
    addresses: HashMap<String, String>,
    commit: MockCommit,
    fail_neighbor_query: bool,
    empty_polls: usize,
    pub log: SessionLog,
}

pub fn neighbor(local_interface: &str, remote_name: &str, remote_port: &str) -> LldpNeighbor {
    LldpNeighbor {
        local_interface: Some(local_interface.to_string()),
        remote_system_name: Some(remote_name.to_string()),
        remote_port_description: Some(remote_port.to_string()),
    }
}

impl MockDevice {
    pub fn new(host_name: &str) -> Self {
        Self {
            host_name: host_name.to_string(),
            neighbors: Vec::new(),
            addresses: HashMap::new(),
            commit: MockCommit::Accept,
            fail_neighbor_query: false,
            empty_polls: 0,
            log: SessionLog::default(),
        }
    }

    /// Add a fully populated neighbor row and the address of its local interface.
    pub fn link(self, local_interface: &str, ip: &str, remote_name: &str, remote_port: &str) -> Self {
        self.neighbor(neighbor(local_interface, remote_name, remote_port))
            .address(local_interface, ip)
    }

    pub fn neighbor(mut self, record: LldpNeighbor) -> Self {
        self.neighbors.push(record);
        self
    }

    pub fn address(mut self, interface: &str, ip: &str) -> Self {
        self.addresses.insert(interface.to_string(), ip.to_string());
        self
    }

    pub fn reject_commit(mut self, reason: &str) -> Self {
        self.commit = MockCommit::Reject(reason.to_string());
        self
    }

    pub fn fail_commit(mut self) -> Self {
        self.commit = MockCommit::Fail;
        self
    }

    pub fn fail_neighbor_query(mut self) -> Self {
        self.fail_neighbor_query = true;
        self
    }

    /// The first `polls` neighbor queries return an empty table.
    pub fn empty_polls(mut self, polls: usize) -> Self {
        self.empty_polls = polls;
        self
    }

    fn record(&self, entry: &str) {
        self.log.push(format!("{}:{}", self.host_name, entry));
    }
}

#[async_trait]
impl DeviceSession for MockDevice {
    async fn load_and_commit(&mut self, set_commands: &str) -> Result<CommitStatus, SessionError> {
        self.record(&format!("commit:{}", set_commands));
        match &self.commit {
            MockCommit::Accept => Ok(CommitStatus::Committed),
            MockCommit::Reject(reason) => Ok(CommitStatus::Rejected(reason.clone())),
            MockCommit::Fail => Err(SessionError::Netconf("channel closed before end of message".to_string())),
        }
    }

    async fn lldp_neighbors(&mut self) -> Result<Vec<LldpNeighbor>, SessionError> {
        self.record("lldp");
        if self.fail_neighbor_query {
            return Err(SessionError::Rpc("syntax error (error)".to_string()));
        }
        if self.empty_polls > 0 {
            self.empty_polls -= 1;
            return Ok(Vec::new());
        }
        Ok(self.neighbors.clone())
    }

    async fn interface_address(&mut self, interface_name: &str) -> Result<String, SessionError> {
        self.record(&format!("interface:{}", interface_name));
        self.addresses
            .get(interface_name)
            .cloned()
            .ok_or(SessionError::MissingField("ifa-destination"))
    }

    async fn host_name(&mut self) -> Result<String, SessionError> {
        self.record("host-name");
        Ok(self.host_name.clone())
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.record("close");
        Ok(())
    }
}

/// Hands out clones of scripted devices keyed by router IP. Unknown IPs refuse the connection.
#[derive(Debug, Default)]
pub struct MockConnector {
    devices: HashMap<String, MockDevice>,
    pub log: SessionLog,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device(mut self, ip: &str, mut device: MockDevice) -> Self {
        device.log = self.log.clone();
        self.devices.insert(ip.to_string(), device);
        self
    }
}

#[async_trait]
impl SessionConnector for MockConnector {
    type Session = MockDevice;

    async fn open(&self, router: &RouterDescriptor) -> Result<MockDevice, SessionError> {
        self.log.push(format!("open:{}", router.ip));
        self.devices
            .get(&router.ip)
            .cloned()
            .ok_or_else(|| SessionError::Tcp("Connection refused (os error 111)".to_string()))
    }
}

pub fn routers(ips: &[&str]) -> Vec<RouterDescriptor> {
    ips.iter()
        .map(|ip| RouterDescriptor::new(ip, "lab", "lab123"))
        .collect()
}
