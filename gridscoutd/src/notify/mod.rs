//! Notifications derived from grid changes.
//!
//! Producers hand events to a [`NotifierHandle`]; a single task owns the
//! [`NotificationEngine`] and works through them in order, so cooldown state
//! is never shared.

pub mod dedupe;
pub mod delivery;
pub mod discord;
pub mod engine;
pub mod messages;

use std::time::Duration;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use anyhow::Result;
use shared::types::{GridPilot, ParsedReport};
use crate::grid::IngestOutcome;
use self::engine::NotificationEngine;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub enum NotifyEvent {
    /// A report the grid accepted, with what it changed
    Report {
        report: ParsedReport,
        outcome: IngestOutcome,
    },
    OnGridThreat {
        tenant_id: String,
        system: String,
        scout_name: String,
        status: String,
        on_grid: Vec<GridPilot>,
    },
    UndockedLocal {
        tenant_id: String,
        scout_identity: String,
        scout_name: String,
        system: String,
        new_pilot_count: usize,
    },
    SuspectedSpy {
        tenant_ids: Vec<String>,
        identity: String,
        source: String,
        reason: String,
    },
}

/// Producer side of the notification queue. Emitting never waits on
/// delivery; a full queue drops the event.
#[derive(Clone)]
pub struct NotifierHandle {
    tx: mpsc::Sender<NotifyEvent>,
}

impl NotifierHandle {
    pub fn channel(depth: usize) -> (Self, mpsc::Receiver<NotifyEvent>) {
        let (tx, rx) = mpsc::channel(depth.max(1));
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: NotifyEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Notification queue full, dropping event");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!("Notification task is gone, dropping event");
                false
            }
        }
    }

    pub fn report_ingested(&self, report: ParsedReport, outcome: IngestOutcome) -> bool {
        self.emit(NotifyEvent::Report { report, outcome })
    }
}

pub async fn run(
    mut engine: NotificationEngine,
    mut rx: mpsc::Receiver<NotifyEvent>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut sweep_interval = tokio::time::interval(SWEEP_INTERVAL);

    loop {
        tokio::select! {
            Some(event) = rx.recv() => {
                engine.handle(event, Utc::now()).await;
            }
            _ = sweep_interval.tick() => {
                let removed = engine.sweep(Utc::now());
                if removed > 0 {
                    tracing::debug!("Swept {} expired dedupe keys, {} still tracked", removed, engine.tracked_keys());
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("Notifier shutting down");
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_queue_drops_instead_of_blocking() {
        let (notifier, mut rx) = NotifierHandle::channel(1);
        assert!(notifier.report_ingested(ParsedReport::default(), IngestOutcome::default()));
        assert!(!notifier.report_ingested(ParsedReport::default(), IngestOutcome::default()));

        assert!(matches!(rx.try_recv(), Ok(NotifyEvent::Report { .. })));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_queue_drops() {
        let (notifier, rx) = NotifierHandle::channel(4);
        drop(rx);
        assert!(!notifier.emit(NotifyEvent::SuspectedSpy {
            tenant_ids: vec!["1".to_string()],
            identity: "2".to_string(),
            source: "test".to_string(),
            reason: String::new(),
        }));
    }
}
