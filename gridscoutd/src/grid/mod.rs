//! Per-tenant aggregation state: live scouts, pilot sightings and local
//! reports.
//!
//! Sightings and local reports are persisted write-through: each mutation is
//! applied to a copy, the whole collection is written to the blob store, and
//! only then does the in-memory state move forward. A failed write leaves
//! the grid as it was. Scout liveness is memory only.

pub mod locals;
pub mod migrate;

use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap, VecDeque};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use shared::protocol::{ACTIVATION_NAME, LOST_CONNECTION};
use shared::types::{GridPilot, LocalReport, ParsedReport, PilotSighting, ScoutStatus};
use crate::config::StoreConfig;
use crate::expiring::ExpiringMap;
use crate::store::{self, hash, BlobStore};

/// Stable identity of an ordinary sighting
pub fn sighting_key(name: &str, ship_type: &str) -> String {
    format!("{}/{}", name, ship_type)
}

/// What a single ingest changed, as seen by the notification side
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    pub scout_was_online: bool,
    pub scout_is_online: bool,
    /// Online scouts for the tenant after this report
    pub online_scouts: usize,
    pub new_sightings: usize,
    pub updated_sightings: usize,
    pub activation_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SightingChanges {
    pub created: usize,
    pub updated: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalSubmitOutcome {
    pub report: LocalReport,
    pub new_non_friendly_locals: usize,
    pub hostile_on_grid: Vec<GridPilot>,
}

struct TenantState {
    /// Most recently seen last
    sightings: Vec<PilotSighting>,
    local_reports: VecDeque<LocalReport>,
    standing_icons: BTreeSet<i64>,
    scouts: ExpiringMap<String, ScoutStatus>,
}

impl TenantState {
    fn load<S: BlobStore>(store: &S, tenant_id: &str, liveness_window: Duration) -> Result<Self> {
        let sightings = store
            .get(&store::sightings_key(tenant_id))?
            .map(|bytes| migrate::decode_sightings(&bytes))
            .unwrap_or_default();

        let local_reports = store
            .get(&store::local_reports_key(tenant_id))?
            .map(|bytes| migrate::decode_local_reports(&bytes))
            .unwrap_or_default();

        let standing_icons = store
            .get(&store::standing_icons_key(tenant_id))?
            .and_then(|bytes| serde_json::from_slice::<BTreeSet<i64>>(&bytes).ok())
            .unwrap_or_default();

        tracing::debug!(
            "Loaded tenant {}: {} sightings, {} local reports",
            tenant_id,
            sightings.len(),
            local_reports.len()
        );

        Ok(Self {
            sightings,
            local_reports: local_reports.into(),
            standing_icons,
            scouts: ExpiringMap::new(liveness_window),
        })
    }
}

pub struct Grid<S> {
    store: S,
    local_report_cap: usize,
    liveness_window: Duration,
    tenants: HashMap<String, TenantState>,
}

impl<S: BlobStore> Grid<S> {
    pub fn new(store: S, config: &StoreConfig) -> Self {
        Self {
            store,
            local_report_cap: config.local_report_cap.max(1),
            liveness_window: Duration::seconds(config.liveness_window_secs as i64),
            tenants: HashMap::new(),
        }
    }

    /// Apply one parsed report: activation or sightings, then heartbeat.
    /// The heartbeat only lands once the write-through has succeeded.
    pub fn ingest(&mut self, report: &ParsedReport, now: DateTime<Utc>) -> Result<IngestOutcome> {
        let mut outcome = IngestOutcome::default();

        if report.is_activation_event {
            let sighting = self.record_activation(
                &report.tenant_id,
                &report.reporter_name,
                report.effective_wormhole_label(),
                &report.system,
                &report.reporter_identity,
                now,
            )?;
            outcome.activation_key = Some(sighting.key);
        } else if !report.entries.is_empty() {
            let changes = self.record_sighting(report, now)?;
            outcome.new_sightings = changes.created;
            outcome.updated_sightings = changes.updated;
        }

        if !report.reporter_name.is_empty() {
            outcome.scout_was_online = self.record_scout_heartbeat(report, now)?;
            outcome.scout_is_online = !report.is_disconnect_event;
        }

        outcome.online_scouts = self
            .list_live_scouts(&report.tenant_id, now)?
            .iter()
            .filter(|s| s.is_online())
            .count();

        Ok(outcome)
    }

    /// Record every entry of the report. A key already seen under the same
    /// wormhole label is refreshed and moved to the end; anything else is a
    /// new sighting.
    pub fn record_sighting(&mut self, report: &ParsedReport, now: DateTime<Utc>) -> Result<SightingChanges> {
        let state = tenant(&mut self.tenants, &self.store, &report.tenant_id, self.liveness_window)?;
        let label = report.effective_wormhole_label();
        let mut next = state.sightings.clone();
        let mut changes = SightingChanges::default();

        for entry in &report.entries {
            let key = sighting_key(&entry.name, &entry.ship_type);
            let existing = next
                .iter()
                .rposition(|s| s.key == key && s.wormhole_label == label);

            match existing {
                Some(idx) => {
                    let mut sighting = next.remove(idx);
                    sighting.last_seen_at = now;
                    sighting.scout_name = report.reporter_name.clone();
                    sighting.scout_identity = report.reporter_identity.clone();
                    if !report.system.is_empty() {
                        sighting.system = report.system.clone();
                    }
                    if !entry.corporation.is_empty() {
                        sighting.corp = entry.corporation.clone();
                    }
                    if !entry.alliance.is_empty() {
                        sighting.alliance = entry.alliance.clone();
                    }
                    next.push(sighting);
                    changes.updated += 1;
                }
                None => {
                    next.push(PilotSighting {
                        key,
                        name: entry.name.clone(),
                        ship: entry.ship_type.clone(),
                        alliance: entry.alliance.clone(),
                        corp: entry.corporation.clone(),
                        wormhole_class: report.wormhole_class.clone(),
                        wormhole_label: label.to_string(),
                        first_seen_at: now,
                        last_seen_at: now,
                        scout_name: report.reporter_name.clone(),
                        scout_identity: report.reporter_identity.clone(),
                        system: report.system.clone(),
                    });
                    changes.created += 1;
                }
            }
        }

        persist(&self.store, &store::sightings_key(&report.tenant_id), &next)?;
        state.sightings = next;

        tracing::debug!(
            "Tenant {}: {} new, {} refreshed sightings from {}",
            report.tenant_id,
            changes.created,
            changes.updated,
            report.reporter_name
        );
        Ok(changes)
    }

    /// Append a synthetic sighting for a wormhole activation. Never merges.
    pub fn record_activation(
        &mut self,
        tenant_id: &str,
        scout: &str,
        wormhole_label: &str,
        system: &str,
        reporter_identity: &str,
        now: DateTime<Utc>,
    ) -> Result<PilotSighting> {
        let state = tenant(&mut self.tenants, &self.store, tenant_id, self.liveness_window)?;

        let base = format!("{}/{}/{}/{}", ACTIVATION_NAME, scout, wormhole_label, now.timestamp_millis());
        let mut key = base.clone();
        let mut suffix = 1;
        while state.sightings.iter().any(|s| s.key == key) {
            key = format!("{}-{}", base, suffix);
            suffix += 1;
        }

        let sighting = PilotSighting {
            key,
            name: ACTIVATION_NAME.to_string(),
            ship: String::new(),
            alliance: String::new(),
            corp: String::new(),
            wormhole_class: String::new(),
            wormhole_label: wormhole_label.to_string(),
            first_seen_at: now,
            last_seen_at: now,
            scout_name: scout.to_string(),
            scout_identity: reporter_identity.to_string(),
            system: system.to_string(),
        };

        let mut next = state.sightings.clone();
        next.push(sighting.clone());
        persist(&self.store, &store::sightings_key(tenant_id), &next)?;
        state.sightings = next;

        tracing::info!("Tenant {}: activation reported by {} at {}", tenant_id, scout, wormhole_label);
        Ok(sighting)
    }

    /// Refresh the reporting scout's liveness. Returns whether the scout was
    /// online before this report.
    pub fn record_scout_heartbeat(&mut self, report: &ParsedReport, now: DateTime<Utc>) -> Result<bool> {
        let state = tenant(&mut self.tenants, &self.store, &report.tenant_id, self.liveness_window)?;

        let was_online = state
            .scouts
            .get(report.reporter_name.as_str(), now)
            .map(ScoutStatus::is_online)
            .unwrap_or(false);

        let wormhole_label = if report.is_disconnect_event {
            LOST_CONNECTION.to_string()
        } else {
            report.effective_wormhole_label().to_string()
        };

        let status = ScoutStatus {
            name: report.reporter_name.clone(),
            system: report.system.clone(),
            wormhole_label,
            wormhole_class: report.wormhole_class.clone(),
            reporter_identity: report.reporter_identity.clone(),
            version: report.version.clone(),
            last_seen_at: now,
        };
        state.scouts.insert(report.reporter_name.clone(), status, now);

        Ok(was_online)
    }

    /// Scouts heard from within the liveness window, by name
    pub fn list_live_scouts(&mut self, tenant_id: &str, now: DateTime<Utc>) -> Result<Vec<ScoutStatus>> {
        let state = tenant(&mut self.tenants, &self.store, tenant_id, self.liveness_window)?;
        let mut scouts: Vec<ScoutStatus> = state.scouts.live(now).map(|(_, s)| s.clone()).collect();
        scouts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(scouts)
    }

    /// Up to `limit` most recent sightings, oldest of them first
    pub fn list_sightings(&mut self, tenant_id: &str, limit: usize) -> Result<Vec<PilotSighting>> {
        let state = tenant(&mut self.tenants, &self.store, tenant_id, self.liveness_window)?;
        let start = state.sightings.len().saturating_sub(limit);
        Ok(state.sightings[start..].to_vec())
    }

    /// Remove every sighting with `key`. Returns whether any existed.
    pub fn delete_sighting(&mut self, tenant_id: &str, key: &str) -> Result<bool> {
        let state = tenant(&mut self.tenants, &self.store, tenant_id, self.liveness_window)?;
        if !state.sightings.iter().any(|s| s.key == key) {
            return Ok(false);
        }

        let next: Vec<PilotSighting> = state
            .sightings
            .iter()
            .filter(|s| s.key != key)
            .cloned()
            .collect();
        persist(&self.store, &store::sightings_key(tenant_id), &next)?;
        state.sightings = next;

        tracing::info!("Tenant {}: deleted sighting {}", tenant_id, key);
        Ok(true)
    }

    pub fn sightings_hash(&mut self, tenant_id: &str) -> Result<String> {
        let state = tenant(&mut self.tenants, &self.store, tenant_id, self.liveness_window)?;
        Ok(hash::compute_hash(&state.sightings))
    }

    /// Normalize and append a local report, dropping the oldest reports past
    /// the cap.
    pub fn submit_local_report(
        &mut self,
        tenant_id: &str,
        report: LocalReport,
        now: DateTime<Utc>,
    ) -> Result<LocalSubmitOutcome> {
        let cap = self.local_report_cap;
        let state = tenant(&mut self.tenants, &self.store, tenant_id, self.liveness_window)?;
        let report = locals::normalize_local_report(report, now);

        let previous = state
            .local_reports
            .iter()
            .rev()
            .find(|r| r.scout_name == report.scout_name && r.system == report.system);
        let new_non_friendly_locals = locals::new_non_friendly_locals(previous, &report);
        let hostile_on_grid = locals::hostile_on_grid(&report);

        let mut next = state.local_reports.clone();
        next.push_back(report.clone());
        while next.len() > cap {
            next.pop_front();
        }
        persist(&self.store, &store::local_reports_key(tenant_id), &next)?;
        state.local_reports = next;

        let observed = locals::observed_icon_ids(&report);
        if !observed.is_subset(&state.standing_icons) {
            let merged: BTreeSet<i64> = state.standing_icons.union(&observed).copied().collect();
            let bytes = serde_json::to_vec(&merged)?;
            match self.store.set(&store::standing_icons_key(tenant_id), &bytes) {
                Ok(()) => state.standing_icons = merged,
                // Icon bookkeeping is advisory; the report itself is stored
                Err(e) => tracing::error!("Failed to persist standing icon ids for {}: {}", tenant_id, e),
            }
        }

        Ok(LocalSubmitOutcome {
            report,
            new_non_friendly_locals,
            hostile_on_grid,
        })
    }

    /// Local reports in submission order
    pub fn local_reports(&mut self, tenant_id: &str) -> Result<Vec<LocalReport>> {
        let state = tenant(&mut self.tenants, &self.store, tenant_id, self.liveness_window)?;
        Ok(state.local_reports.iter().cloned().collect())
    }

    pub fn standing_icon_ids(&mut self, tenant_id: &str) -> Result<Vec<i64>> {
        let state = tenant(&mut self.tenants, &self.store, tenant_id, self.liveness_window)?;
        Ok(state.standing_icons.iter().copied().collect())
    }
}

/// Tenant state, loading it from the store on first touch
fn tenant<'a, S: BlobStore>(
    tenants: &'a mut HashMap<String, TenantState>,
    store: &S,
    tenant_id: &str,
    liveness_window: Duration,
) -> Result<&'a mut TenantState> {
    match tenants.entry(tenant_id.to_string()) {
        Entry::Occupied(entry) => Ok(entry.into_mut()),
        Entry::Vacant(entry) => {
            let state = TenantState::load(store, tenant_id, liveness_window)?;
            Ok(entry.insert(state))
        }
    }
}

fn persist<S: BlobStore, T: Serialize + ?Sized>(store: &S, key: &str, records: &T) -> Result<()> {
    let bytes = migrate::encode(records)?;
    store.set(key, &bytes)
}
