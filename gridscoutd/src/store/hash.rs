use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Sha256, Digest};
use shared::types::PilotSighting;

/// Fields that define a visible change in the sighting list. Ordering is part
/// of the view, so the list is hashed as-is rather than sorted.
#[derive(Serialize)]
struct HashView<'a> {
    key: &'a str,
    wormhole_label: &'a str,
    last_seen_at: &'a DateTime<Utc>,
}

/// Computes a SHA-256 fingerprint of a tenant's ordered sightings.
pub fn compute_hash(sightings: &[PilotSighting]) -> String {
    let views: Vec<HashView<'_>> = sightings
        .iter()
        .map(|s| HashView {
            key: &s.key,
            wormhole_label: &s.wormhole_label,
            last_seen_at: &s.last_seen_at,
        })
        .collect();

    let mut hasher = Sha256::new();
    for view in &views {
        // Serializing a plain struct of strings and a timestamp cannot fail
        if let Ok(json) = serde_json::to_vec(view) {
            hasher.update(&json);
        }
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}
