use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use chrono::{DateTime, Duration, Utc};
use shared::protocol::{
    is_platform_id, EVENT_ALL_SCOUTS_LOGGED_OFF, EVENT_NEW_ENEMY_SIGHTED, EVENT_NEW_SCOUT_LOGGED_IN,
    EVENT_SCOUT_DECLOAKED,
};
use shared::types::{GridPilot, ParsedReport};
use crate::config::NotifyConfig;
use crate::grid::IngestOutcome;
use crate::tenants::TenantDirectory;
use super::dedupe::DedupeWindow;
use super::delivery::{with_retry, Delivery, RetryPolicy};
use super::messages;
use super::NotifyEvent;

/// Derives notifications from grid changes and delivers them.
///
/// Owns every dedupe window; nothing else reads or writes them.
pub struct NotificationEngine {
    delivery: Arc<dyn Delivery>,
    tenants: Arc<dyn TenantDirectory>,
    retry: RetryPolicy,
    scout_login: DedupeWindow,
    enemy_sighting: DedupeWindow,
    on_grid_threat: DedupeWindow,
    spy_behavior: DedupeWindow,
    /// Tenants already told every scout logged off, until one comes back
    logged_off: HashSet<String>,
}

impl NotificationEngine {
    pub fn new(delivery: Arc<dyn Delivery>, tenants: Arc<dyn TenantDirectory>, config: &NotifyConfig) -> Self {
        let secs = |s: u64| Duration::seconds(s as i64);
        Self {
            delivery,
            tenants,
            retry: RetryPolicy::from_config(config),
            scout_login: DedupeWindow::new(secs(config.scout_login_cooldown_secs)),
            enemy_sighting: DedupeWindow::new(secs(config.enemy_sighting_cooldown_secs)),
            on_grid_threat: DedupeWindow::new(secs(config.on_grid_threat_cooldown_secs)),
            spy_behavior: DedupeWindow::new(secs(config.spy_behavior_cooldown_secs)),
            logged_off: HashSet::new(),
        }
    }

    pub async fn handle(&mut self, event: NotifyEvent, now: DateTime<Utc>) {
        match event {
            NotifyEvent::Report { report, outcome } => {
                self.on_parsed_report(&report, &outcome, now).await;
            }
            NotifyEvent::OnGridThreat { tenant_id, system, scout_name, status, on_grid } => {
                self.notify_on_grid_threat(&tenant_id, &system, &scout_name, &status, &on_grid, now)
                    .await;
            }
            NotifyEvent::UndockedLocal { tenant_id, scout_identity, scout_name, system, new_pilot_count } => {
                self.notify_undocked_local(&tenant_id, &scout_identity, &scout_name, &system, new_pilot_count, now)
                    .await;
            }
            NotifyEvent::SuspectedSpy { tenant_ids, identity, source, reason } => {
                self.notify_spy_behavior(&tenant_ids, &identity, &source, &reason, now).await;
            }
        }
    }

    /// Scout coverage, enemy sightings and decloaks for one ingested report
    pub async fn on_parsed_report(&mut self, report: &ParsedReport, outcome: &IngestOutcome, now: DateTime<Utc>) {
        self.sweep(now);
        if !report.reporter_name.is_empty() {
            self.handle_scout_coverage(report, outcome, now).await;
        }
        self.handle_enemy_sightings(report, now).await;
        self.handle_scout_decloaked(report).await;
    }

    pub async fn notify_on_grid_threat(
        &mut self,
        tenant_id: &str,
        system: &str,
        scout_name: &str,
        status: &str,
        on_grid: &[GridPilot],
        now: DateTime<Utc>,
    ) {
        self.sweep(now);
        if tenant_id.is_empty() || on_grid.is_empty() {
            return;
        }

        let system = match system.trim() {
            "" => "Unknown System",
            s => s,
        };
        let key = format!("{}|{}|{}", tenant_id, system.to_lowercase(), status.trim().to_lowercase());
        if !self.on_grid_threat.try_acquire(&key, now) {
            tracing::debug!("Suppressing on-grid threat {} (cooldown)", key);
            return;
        }

        let content = messages::on_grid_threat(status, system, scout_name, on_grid);
        self.publish_to_tenant(tenant_id, &content).await;
    }

    pub async fn notify_undocked_local(
        &mut self,
        tenant_id: &str,
        scout_identity: &str,
        scout_name: &str,
        system: &str,
        new_pilot_count: usize,
        now: DateTime<Utc>,
    ) {
        self.sweep(now);
        if tenant_id.is_empty() || scout_identity.is_empty() || new_pilot_count == 0 {
            return;
        }

        let content = messages::undocked_local_warning(scout_identity, scout_name, system, new_pilot_count);
        self.publish_to_tenant(tenant_id, &content).await;
    }

    pub async fn notify_spy_behavior(
        &mut self,
        tenant_ids: &[String],
        identity: &str,
        source: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) {
        self.sweep(now);
        let tenants: BTreeSet<&str> = tenant_ids
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();
        if tenants.is_empty() || identity.trim().is_empty() {
            return;
        }

        let tenant_set = tenants.iter().copied().collect::<Vec<_>>().join(",");
        let key = format!("{}|{}|{}", identity, tenant_set, source);
        if !self.spy_behavior.try_acquire(&key, now) {
            tracing::debug!("Suppressing spy warning for {} (cooldown)", identity);
            return;
        }

        let content = messages::spy_behavior(identity, reason);
        for tenant_id in tenants {
            self.publish_to_tenant(tenant_id, &content).await;
        }
    }

    async fn handle_scout_coverage(&mut self, report: &ParsedReport, outcome: &IngestOutcome, now: DateTime<Utc>) {
        let tenant_id = &report.tenant_id;

        if outcome.scout_is_online && !outcome.scout_was_online {
            let key = format!("{}|{}", tenant_id, report.reporter_name);
            if self.scout_login.try_acquire(&key, now) {
                let content = messages::scout_logged_in(&report.reporter_name, &report.system);
                self.publish_event(EVENT_NEW_SCOUT_LOGGED_IN, tenant_id, &content).await;
            }
        }

        if outcome.online_scouts == 0 {
            if self.logged_off.insert(tenant_id.clone()) {
                let content = messages::all_scouts_logged_off();
                self.publish_event(EVENT_ALL_SCOUTS_LOGGED_OFF, tenant_id, &content).await;
            }
        } else {
            self.logged_off.remove(tenant_id);
        }
    }

    async fn handle_enemy_sightings(&mut self, report: &ParsedReport, now: DateTime<Utc>) {
        let wormhole = report.effective_wormhole_label();

        for entry in &report.entries {
            let pilot = entry.name.trim();
            let ship = entry.ship_type.trim();
            if pilot.is_empty() || ship.is_empty() {
                continue;
            }

            let key = [report.tenant_id.as_str(), pilot, ship, report.system.as_str(), wormhole]
                .join("|")
                .to_lowercase();
            if !self.enemy_sighting.try_acquire(&key, now) {
                continue;
            }

            let content = messages::enemy_sighted(pilot, ship, wormhole, &report.system);
            self.publish_event(EVENT_NEW_ENEMY_SIGHTED, &report.tenant_id, &content).await;
        }
    }

    /// Tell the scout directly when possible, otherwise the tenant
    async fn handle_scout_decloaked(&self, report: &ParsedReport) {
        if !report.raw_message.to_lowercase().contains("decloak") {
            return;
        }

        let identity = report.reporter_identity.trim();
        if is_platform_id(identity) {
            let delivery = self.delivery.as_ref();
            let direct = messages::scout_decloaked_direct(&report.reporter_name, &report.system);
            let operation = format!("dm_send:{}", identity);
            match with_retry(&self.retry, &operation, || delivery.send_direct_message(identity, &direct)).await {
                Ok(()) => return,
                Err(e) => tracing::error!("Failed to DM scout decloak notice to {}: {}", identity, e),
            }
        }

        let content = messages::scout_decloaked_broadcast(&report.reporter_name);
        self.publish_event(EVENT_SCOUT_DECLOAKED, &report.tenant_id, &content).await;
    }

    /// Deliver an event the tenant can switch on and off
    async fn publish_event(&self, event_type: &str, tenant_id: &str, content: &str) -> bool {
        let enabled = self
            .tenants
            .tenant_config(tenant_id)
            .map(|config| config.is_enabled(event_type))
            .unwrap_or(false);
        if !enabled {
            tracing::debug!("{} not enabled for tenant {}", event_type, tenant_id);
            return false;
        }
        self.publish_to_tenant(tenant_id, content).await
    }

    /// Event channel first, then a direct message to the tenant owner
    async fn publish_to_tenant(&self, tenant_id: &str, content: &str) -> bool {
        let config = self.tenants.tenant_config(tenant_id);
        if let Some(channel_id) = config.as_ref().and_then(|c| c.channel()) {
            if self.send_to_channel(channel_id, content).await {
                return true;
            }
        }
        self.send_to_owner(tenant_id, content).await
    }

    async fn send_to_channel(&self, channel_id: &str, content: &str) -> bool {
        let delivery = self.delivery.as_ref();
        let operation = format!("channel_send:{}", channel_id);
        match with_retry(&self.retry, &operation, || delivery.publish_to_channel(channel_id, content)).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to send to event channel {}: {}", channel_id, e);
                false
            }
        }
    }

    async fn send_to_owner(&self, tenant_id: &str, content: &str) -> bool {
        let delivery = self.delivery.as_ref();

        let operation = format!("owner_fetch:{}", tenant_id);
        let owner = match with_retry(&self.retry, &operation, || delivery.fetch_owner(tenant_id)).await {
            Ok(owner) => owner,
            Err(e) => {
                tracing::error!("Failed to look up owner of {}: {}", tenant_id, e);
                return false;
            }
        };

        let owner = owner.as_str();
        let operation = format!("owner_dm_send:{}", tenant_id);
        match with_retry(&self.retry, &operation, || delivery.send_direct_message(owner, content)).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to DM owner of {}: {}", tenant_id, e);
                false
            }
        }
    }

    /// Drop expired keys from every dedupe window
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        self.windows_mut().into_iter().map(|w| w.sweep(now)).sum()
    }

    /// Keys still held across all dedupe windows
    pub fn tracked_keys(&self) -> usize {
        [&self.scout_login, &self.enemy_sighting, &self.on_grid_threat, &self.spy_behavior]
            .iter()
            .map(|w| w.len())
            .sum()
    }

    fn windows_mut(&mut self) -> [&mut DedupeWindow; 4] {
        [
            &mut self.scout_login,
            &mut self.enemy_sighting,
            &mut self.on_grid_threat,
            &mut self.spy_behavior,
        ]
    }
}
