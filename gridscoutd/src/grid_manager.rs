use std::thread;
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use anyhow::{Context, Result};
use shared::types::{LocalReport, ParsedReport, PilotSighting, ScoutStatus};
use crate::grid::{Grid, IngestOutcome, LocalSubmitOutcome};
use crate::store::BlobStore;

/// Commands sent to the grid thread
pub enum GridCommand {
    Ingest(ParsedReport, oneshot::Sender<Result<IngestOutcome>>),
    ListSightings {
        tenant_id: String,
        limit: usize,
        reply: oneshot::Sender<Result<Vec<PilotSighting>>>,
    },
    ListScouts(String, oneshot::Sender<Result<Vec<ScoutStatus>>>),
    LocalReports(String, oneshot::Sender<Result<Vec<LocalReport>>>),
    SubmitLocalReport {
        tenant_id: String,
        report: LocalReport,
        reply: oneshot::Sender<Result<LocalSubmitOutcome>>,
    },
    DeleteSighting {
        tenant_id: String,
        key: String,
        reply: oneshot::Sender<Result<bool>>,
    },
    SightingsHash(String, oneshot::Sender<Result<String>>),
    StandingIcons(String, oneshot::Sender<Result<Vec<i64>>>),
    Shutdown,
}

/// Handle to the thread that owns all grid state. Commands run one at a
/// time, so every mutation and its write-through finish before the next
/// command is looked at.
#[derive(Clone)]
pub struct GridHandle {
    tx: mpsc::Sender<GridCommand>,
}

impl GridHandle {
    /// Spawn the grid thread
    pub fn spawn<S: BlobStore>(mut grid: Grid<S>) -> Self {
        let (tx, mut rx) = mpsc::channel::<GridCommand>(256);

        thread::spawn(move || {
            while let Some(cmd) = rx.blocking_recv() {
                let now = Utc::now();
                match cmd {
                    GridCommand::Ingest(report, reply) => {
                        let result = grid.ingest(&report, now);
                        if let Err(e) = &result {
                            tracing::error!("Failed to ingest report for {}: {:#}", report.tenant_id, e);
                        }
                        let _ = reply.send(result);
                    }
                    GridCommand::ListSightings { tenant_id, limit, reply } => {
                        let _ = reply.send(grid.list_sightings(&tenant_id, limit));
                    }
                    GridCommand::ListScouts(tenant_id, reply) => {
                        let _ = reply.send(grid.list_live_scouts(&tenant_id, now));
                    }
                    GridCommand::LocalReports(tenant_id, reply) => {
                        let _ = reply.send(grid.local_reports(&tenant_id));
                    }
                    GridCommand::SubmitLocalReport { tenant_id, report, reply } => {
                        let result = grid.submit_local_report(&tenant_id, report, now);
                        if let Err(e) = &result {
                            tracing::error!("Failed to store local report for {}: {:#}", tenant_id, e);
                        }
                        let _ = reply.send(result);
                    }
                    GridCommand::DeleteSighting { tenant_id, key, reply } => {
                        let _ = reply.send(grid.delete_sighting(&tenant_id, &key));
                    }
                    GridCommand::SightingsHash(tenant_id, reply) => {
                        let _ = reply.send(grid.sightings_hash(&tenant_id));
                    }
                    GridCommand::StandingIcons(tenant_id, reply) => {
                        let _ = reply.send(grid.standing_icon_ids(&tenant_id));
                    }
                    GridCommand::Shutdown => {
                        tracing::info!("Grid thread shutting down");
                        break;
                    }
                }
            }
        });

        Self { tx }
    }

    /// Apply a parsed report
    pub async fn ingest(&self, report: ParsedReport) -> Result<IngestOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(GridCommand::Ingest(report, reply)).await?;
        rx.await.context("Grid thread dropped reply")?
    }

    pub async fn list_sightings(&self, tenant_id: String, limit: usize) -> Result<Vec<PilotSighting>> {
        let (reply, rx) = oneshot::channel();
        self.send(GridCommand::ListSightings { tenant_id, limit, reply }).await?;
        rx.await.context("Grid thread dropped reply")?
    }

    pub async fn list_live_scouts(&self, tenant_id: String) -> Result<Vec<ScoutStatus>> {
        let (reply, rx) = oneshot::channel();
        self.send(GridCommand::ListScouts(tenant_id, reply)).await?;
        rx.await.context("Grid thread dropped reply")?
    }

    /// Local reports submitted so far
    pub async fn local_reports(&self, tenant_id: String) -> Result<Vec<LocalReport>> {
        let (reply, rx) = oneshot::channel();
        self.send(GridCommand::LocalReports(tenant_id, reply)).await?;
        rx.await.context("Grid thread dropped reply")?
    }

    pub async fn submit_local_report(&self, tenant_id: String, report: LocalReport) -> Result<LocalSubmitOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(GridCommand::SubmitLocalReport { tenant_id, report, reply }).await?;
        rx.await.context("Grid thread dropped reply")?
    }

    pub async fn delete_sighting(&self, tenant_id: String, key: String) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(GridCommand::DeleteSighting { tenant_id, key, reply }).await?;
        rx.await.context("Grid thread dropped reply")?
    }

    pub async fn sightings_hash(&self, tenant_id: String) -> Result<String> {
        let (reply, rx) = oneshot::channel();
        self.send(GridCommand::SightingsHash(tenant_id, reply)).await?;
        rx.await.context("Grid thread dropped reply")?
    }

    /// Standing icon ids seen in this tenant's local reports
    pub async fn standing_icon_ids(&self, tenant_id: String) -> Result<Vec<i64>> {
        let (reply, rx) = oneshot::channel();
        self.send(GridCommand::StandingIcons(tenant_id, reply)).await?;
        rx.await.context("Grid thread dropped reply")?
    }

    /// Stop the grid thread once queued commands have run
    pub async fn shutdown(&self) -> Result<()> {
        self.send(GridCommand::Shutdown).await
    }

    async fn send(&self, cmd: GridCommand) -> Result<()> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| anyhow::anyhow!("Grid thread is not running"))
    }
}
