/*!
The discovery run: routers are polled one at a time in config order, each inside its own
session scope, and the failure policy decides whether a failing router ends the run.
*/

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::{
    config::{ConfigError, RouterDescriptor, load_routers},
    data_aquisition::core::{DeviceSession, SessionConnector, SessionError},
    network::{
        network_graph::NetworkGraph,
        render::{RenderError, RenderOptions, render},
    },
    topology::{
        collector::{
            AdjacencyObservation, CollectionSession, DedupStrategy, SettlePoll,
            collect_adjacencies, wait_for_neighbors,
        },
        enabler::{EnablementError, enable_lldp},
    },
};

/// What to do when a router fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum FailurePolicy {
    /// Stop at the first failing router; nothing is rendered.
    #[default]
    Abort,
    /// Record the failure, move on and render whatever was collected.
    Continue,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub policy: FailurePolicy,
    pub dedup: DedupStrategy,
    pub settle: SettlePoll,
}

/// Failure while processing one router.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("connection with ip {ip} failed: {source}")]
    Connection { ip: String, source: SessionError },
    #[error("{source} (ip {ip})")]
    Enablement { ip: String, source: EnablementError },
    #[error("gathering LLDP information from {ip} failed: {source}")]
    Query { ip: String, source: SessionError },
}

impl RunError {
    pub fn ip(&self) -> &str {
        match self {
            RunError::Connection { ip, .. }
            | RunError::Enablement { ip, .. }
            | RunError::Query { ip, .. } => ip,
        }
    }
}

/// Anything that ends a run without a graph.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Router(#[from] RunError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub observations: Vec<AdjacencyObservation>,
    pub failures: Vec<RunError>,
    pub routers_polled: usize,
}

/// Drives one run over a fixed list of routers.
pub struct Discovery<C: SessionConnector> {
    connector: C,
    options: RunOptions,
}

impl<C: SessionConnector> Discovery<C> {
    pub fn new(connector: C, options: RunOptions) -> Self {
        Self { connector, options }
    }

    pub async fn run(&self, routers: &[RouterDescriptor]) -> Result<RunReport, RunError> {
        let mut collection = CollectionSession::new(self.options.dedup);
        let mut failures = Vec::new();
        let mut routers_polled = 0;

        for router in routers {
            match self.poll_router(router, &mut collection).await {
                Ok(_) => routers_polled += 1,
                Err(e) => match self.options.policy {
                    FailurePolicy::Abort => return Err(e),
                    FailurePolicy::Continue => {
                        warn!(ip = %router.ip, error = %e, "router failed, continuing");
                        failures.push(e);
                    }
                },
            }
        }

        Ok(RunReport {
            observations: collection.into_observations(),
            failures,
            routers_polled,
        })
    }

    /// Open, use and close one session. The session is closed whether or not the router
    /// succeeded; a close failure is only logged.
    async fn poll_router(
        &self,
        router: &RouterDescriptor,
        collection: &mut CollectionSession,
    ) -> Result<usize, RunError> {
        info!("Establishing connection with ip {}...", router.ip);
        let mut session = self
            .connector
            .open(router)
            .await
            .map_err(|source| RunError::Connection {
                ip: router.ip.clone(),
                source,
            })?;
        info!("Connection successful!");

        let result = self.discover(&mut session, router, collection).await;

        if let Err(e) = session.close().await {
            warn!(ip = %router.ip, error = %e, "failed to close session");
        }
        result
    }

    async fn discover(
        &self,
        session: &mut C::Session,
        router: &RouterDescriptor,
        collection: &mut CollectionSession,
    ) -> Result<usize, RunError> {
        let query_error = |source: SessionError| RunError::Query {
            ip: router.ip.clone(),
            source,
        };

        info!("Enabling LLDP (Link-Layer Discovery Protocol)...");
        enable_lldp(&mut *session)
            .await
            .map_err(|source| RunError::Enablement {
                ip: router.ip.clone(),
                source,
            })?;

        if !self.options.settle.is_disabled() {
            wait_for_neighbors(&mut *session, &self.options.settle)
                .await
                .map_err(query_error)?;
        }

        info!("Gathering LLDP connectivity information...");
        let batch = collect_adjacencies(&mut *session, collection)
            .await
            .map_err(query_error)?;
        info!(
            ip = %router.ip,
            new = batch.len(),
            "Successfully gathered LLDP connectivity information!"
        );
        Ok(batch.len())
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub report: RunReport,
    pub artifact: PathBuf,
}

/// Load the router file, poll every router and render the graph.
/// A bad router file ends the run before any device is contacted.
pub async fn execute<C: SessionConnector>(
    config_path: &Path,
    connector: C,
    options: RunOptions,
    render_options: &RenderOptions,
) -> Result<RunSummary, DiscoveryError> {
    let routers = load_routers(config_path)?;
    info!(routers = routers.len(), path = %config_path.display(), "router file loaded");

    let report = Discovery::new(connector, options).run(&routers).await?;
    if !report.failures.is_empty() {
        warn!(
            failed = report.failures.len(),
            polled = report.routers_polled,
            "some routers could not be polled; the graph is partial"
        );
        for failure in &report.failures {
            warn!(ip = failure.ip(), "{}", failure);
        }
    }

    info!("Displaying network graph...");
    let graph = NetworkGraph::from_observations(&report.observations);
    let artifact = render(&graph, render_options)?;
    Ok(RunSummary { report, artifact })
}
