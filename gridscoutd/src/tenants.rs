use std::collections::HashMap;
use shared::protocol::GRID_EVENT_TYPES;
use crate::config::TenantConfig;

/// Looks up how a tenant wants to be notified
pub trait TenantDirectory: Send + Sync {
    fn tenant_config(&self, tenant_id: &str) -> Option<TenantConfig>;
}

/// Directory backed by the `[tenants]` table of the config file
pub struct StaticTenantDirectory {
    tenants: HashMap<String, TenantConfig>,
}

impl StaticTenantDirectory {
    pub fn new(tenants: HashMap<String, TenantConfig>) -> Self {
        for (tenant_id, config) in &tenants {
            for event in &config.enabled_events {
                if !GRID_EVENT_TYPES.contains(&event.as_str()) {
                    tracing::warn!("Tenant {} enables unknown event type {:?}", tenant_id, event);
                }
            }
        }
        Self { tenants }
    }
}

impl TenantDirectory for StaticTenantDirectory {
    fn tenant_config(&self, tenant_id: &str) -> Option<TenantConfig> {
        self.tenants.get(tenant_id).cloned()
    }
}

impl TenantConfig {
    pub fn is_enabled(&self, event_type: &str) -> bool {
        self.enabled_events.iter().any(|e| e == event_type)
    }

    /// Configured channel id, ignoring blanks
    pub fn channel(&self) -> Option<&str> {
        self.event_channel_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}
