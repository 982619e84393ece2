/*!
Adjacency collection and run-wide duplicate suppression.

Each polled router contributes directed observations of the links it sees. A
`CollectionSession` owns the dedup set for the whole run and is threaded through
every per-router collection by `&mut`.
*/

use std::{collections::HashSet, time::Duration};

use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::data_aquisition::core::{DeviceSession, SessionError};

/// One LLDP-reported link, from the point of view of the polled device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AdjacencyObservation {
    pub local_device: String,
    pub neighbor_device: String,
    pub local_interface: String,
    pub local_ip: String,
    pub neighbor_interface: String,
}

/// Identity used to suppress repeated observations.
///
/// Field order is `(neighbor_device, local_device, neighbor_interface, local_ip, local_interface)`,
/// which is not the order of the observation it was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub neighbor_device: String,
    pub local_device: String,
    pub neighbor_interface: String,
    pub local_ip: String,
    pub local_interface: String,
}

impl DedupKey {
    #[cfg(test)]
    pub fn as_tuple(&self) -> (&str, &str, &str, &str, &str) {
        (
            &self.neighbor_device,
            &self.local_device,
            &self.neighbor_interface,
            &self.local_ip,
            &self.local_interface,
        )
    }
}

impl AdjacencyObservation {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            neighbor_device: self.neighbor_device.clone(),
            local_device: self.local_device.clone(),
            neighbor_interface: self.neighbor_interface.clone(),
            local_ip: self.local_ip.clone(),
            local_interface: self.local_interface.clone(),
        }
    }

    /// The observation's own tuple read in key order. Equals the dedup key the far end
    /// of the same link produces when both ends report the same address.
    fn reciprocal_key(&self) -> DedupKey {
        DedupKey {
            neighbor_device: self.local_device.clone(),
            local_device: self.neighbor_device.clone(),
            neighbor_interface: self.local_interface.clone(),
            local_ip: self.local_ip.clone(),
            local_interface: self.neighbor_interface.clone(),
        }
    }

    #[cfg(test)]
    pub fn as_tuple(&self) -> (&str, &str, &str, &str, &str) {
        (
            &self.local_device,
            &self.neighbor_device,
            &self.local_interface,
            &self.local_ip,
            &self.neighbor_interface,
        )
    }

    /// Edge label shown in the rendered graph.
    pub fn edge_label(&self) -> String {
        format!(
            "{}\n{}\n{}",
            self.local_interface, self.local_ip, self.neighbor_interface
        )
    }
}

/// How duplicates are recognised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum DedupStrategy {
    /// An observation is dropped only when its own dedup key was already recorded.
    #[default]
    Exact,
    /// Also drop an observation when the opposite end of the same link was already recorded.
    Reciprocal,
}

/// Run-scoped accumulator: the dedup set and every observation retained so far, in order.
#[derive(Debug, Default)]
pub struct CollectionSession {
    strategy: DedupStrategy,
    seen: HashSet<DedupKey>,
    observations: Vec<AdjacencyObservation>,
}

impl CollectionSession {
    pub fn new(strategy: DedupStrategy) -> Self {
        Self {
            strategy,
            ..Default::default()
        }
    }

    #[cfg(test)]
    pub fn contains_key(&self, key: &DedupKey) -> bool {
        self.seen.contains(key)
    }

    #[cfg(test)]
    pub fn observations(&self) -> &[AdjacencyObservation] {
        &self.observations
    }

    pub fn into_observations(self) -> Vec<AdjacencyObservation> {
        self.observations
    }

    fn is_duplicate(&self, observation: &AdjacencyObservation, pending: &HashSet<DedupKey>) -> bool {
        let known = |key: &DedupKey| self.seen.contains(key) || pending.contains(key);
        match self.strategy {
            DedupStrategy::Exact => known(&observation.dedup_key()),
            DedupStrategy::Reciprocal => {
                known(&observation.dedup_key()) || known(&observation.reciprocal_key())
            }
        }
    }

    fn commit(&mut self, batch: &[AdjacencyObservation]) {
        for observation in batch {
            self.seen.insert(observation.dedup_key());
            self.observations.push(observation.clone());
        }
    }
}

/// Query `device` for its LLDP neighbors and return the observations not seen before in this run.
///
/// The session is only updated once the whole table has been processed, so a query failure
/// halfway through leaves it untouched.
pub async fn collect_adjacencies<S>(
    device: &mut S,
    collection: &mut CollectionSession,
) -> Result<Vec<AdjacencyObservation>, SessionError>
where
    S: DeviceSession + ?Sized,
{
    let neighbors = device.lldp_neighbors().await?;
    debug!(count = neighbors.len(), "LLDP neighbor table retrieved");

    // Host name is per device, so one query covers every row
    let mut host_name: Option<String> = None;
    let mut pending: HashSet<DedupKey> = HashSet::new();
    let mut batch = Vec::new();

    for neighbor in neighbors {
        let local_interface = neighbor.local_interface.unwrap_or_default();
        let local_ip = device.interface_address(&local_interface).await?;
        let local_device = match host_name.clone() {
            Some(name) => name,
            None => {
                let name = device.host_name().await?;
                host_name = Some(name.clone());
                name
            }
        };

        let observation = AdjacencyObservation {
            local_device,
            neighbor_device: neighbor.remote_system_name.unwrap_or_default(),
            local_interface,
            local_ip,
            neighbor_interface: neighbor.remote_port_description.unwrap_or_default(),
        };

        if collection.is_duplicate(&observation, &pending) {
            debug!(?observation, "adjacency already recorded, skipping");
            continue;
        }
        pending.insert(observation.dedup_key());
        batch.push(observation);
    }

    collection.commit(&batch);
    Ok(batch)
}

/// Bounded wait for the neighbor table to populate after LLDP has been enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlePoll {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for SettlePoll {
    fn default() -> Self {
        Self {
            timeout: Duration::ZERO,
            interval: Duration::from_secs(1),
        }
    }
}

impl SettlePoll {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.timeout.is_zero()
    }
}

/// Poll until the neighbor table is non-empty or the timeout elapses. Returns the last
/// table size seen; running out of time is not an error.
pub async fn wait_for_neighbors<S>(device: &mut S, poll: &SettlePoll) -> Result<usize, SessionError>
where
    S: DeviceSession + ?Sized,
{
    let deadline = Instant::now() + poll.timeout;
    loop {
        let count = device.lldp_neighbors().await?.len();
        if count > 0 {
            debug!(count, "LLDP neighbor table populated");
            return Ok(count);
        }
        let now = Instant::now();
        if now >= deadline {
            warn!(timeout = %humantime::format_duration(poll.timeout), "LLDP neighbor table still empty");
            return Ok(0);
        }
        info!("Waiting for LLDP neighbors...");
        sleep(poll.interval.min(deadline - now)).await;
    }
}
