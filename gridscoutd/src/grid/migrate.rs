//! Versioned decoding of persisted grid collections.
//!
//! Collections are written as `{"version": 2, "records": [...]}`. Older
//! deployments stored a bare array, first of overview lines and later of
//! sighting objects with different field names. Decoding tries the current
//! shape, then each legacy shape in turn, and drops records none of them
//! accept. A blob that is not JSON at all decodes to an empty collection.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::de::lenient_string;
use shared::types::{LocalReport, PilotSighting};
use crate::parser::parse_pilot_row;
use super::sighting_key;

pub const FORMAT_VERSION: u32 = 2;

#[derive(Serialize)]
struct EnvelopeRef<'a, T: Serialize + ?Sized> {
    version: u32,
    records: &'a T,
}

#[derive(Deserialize)]
struct Envelope<T> {
    version: u32,
    records: Vec<T>,
}

/// Serialize a collection in the current envelope
pub fn encode<T: Serialize + ?Sized>(records: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(&EnvelopeRef {
        version: FORMAT_VERSION,
        records,
    })
    .context("Failed to serialize grid collection")
}

pub fn decode_sightings(bytes: &[u8]) -> Vec<PilotSighting> {
    let sightings = decode_with(bytes, "sighting", |value| {
        serde_json::from_value::<PilotSighting>(value.clone())
            .ok()
            .or_else(|| loose_sighting(value))
            .or_else(|| overview_line_sighting(value))
    });
    collapse_duplicates(sightings)
}

/// Keep one record per key and wormhole label. Overview lines that differ
/// only in corp or alliance share a key, so legacy blobs can hold twins.
/// The survivor sits at the later position, carries the later record's
/// fields, and spans both records' first and last sightings.
fn collapse_duplicates(sightings: Vec<PilotSighting>) -> Vec<PilotSighting> {
    let total = sightings.len();
    let mut latest: HashMap<(String, String), usize> = HashMap::new();
    for (i, s) in sightings.iter().enumerate() {
        latest.insert((s.key.clone(), s.wormhole_label.clone()), i);
    }
    if latest.len() == total {
        return sightings;
    }

    let mut merged: Vec<Option<PilotSighting>> = sightings.into_iter().map(Some).collect();
    for i in 0..merged.len() {
        let Some(s) = merged[i].as_ref() else { continue };
        let target = latest[&(s.key.clone(), s.wormhole_label.clone())];
        if target == i {
            continue;
        }
        if let Some(earlier) = merged[i].take() {
            if let Some(later) = merged[target].as_mut() {
                later.first_seen_at = later.first_seen_at.min(earlier.first_seen_at);
                later.last_seen_at = later.last_seen_at.max(earlier.last_seen_at);
            }
        }
    }

    let collapsed: Vec<PilotSighting> = merged.into_iter().flatten().collect();
    tracing::warn!(
        "Merged {} duplicate sighting records during migration",
        total - collapsed.len()
    );
    collapsed
}

pub fn decode_local_reports(bytes: &[u8]) -> Vec<LocalReport> {
    decode_with(bytes, "local report", |value| {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value::<LocalReport>(value.clone()).ok()
    })
}

/// Strict envelope first; otherwise walk the records one at a time
fn decode_with<T, F>(bytes: &[u8], what: &str, decode_record: F) -> Vec<T>
where
    T: DeserializeOwned,
    F: Fn(&Value) -> Option<T>,
{
    if let Ok(envelope) = serde_json::from_slice::<Envelope<T>>(bytes) {
        if envelope.version == FORMAT_VERSION {
            return envelope.records;
        }
    }

    let value: Value = match serde_json::from_slice(bytes) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Discarding unreadable {} collection: {}", what, e);
            return Vec::new();
        }
    };

    let records = match value {
        Value::Array(records) => records,
        Value::Object(mut map) => match map.remove("records") {
            Some(Value::Array(records)) => records,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    let total = records.len();
    let decoded: Vec<T> = records.iter().filter_map(&decode_record).collect();
    if decoded.len() < total {
        tracing::warn!(
            "Dropped {} of {} {} records that could not be migrated",
            total - decoded.len(),
            total,
            what
        );
    }
    decoded
}

/// Current field names with gaps, or the first bot release's names
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LooseSighting {
    #[serde(default, deserialize_with = "lenient_string")]
    key: String,
    #[serde(default, deserialize_with = "lenient_string")]
    name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    ship: String,
    #[serde(default, deserialize_with = "lenient_string")]
    alliance: String,
    #[serde(default, deserialize_with = "lenient_string")]
    corp: String,
    #[serde(default, alias = "wormhole", deserialize_with = "lenient_string")]
    wormhole_class: String,
    #[serde(default, alias = "wormholeName", deserialize_with = "lenient_string")]
    wormhole_label: String,
    #[serde(default, alias = "firstSeenOnGrid", deserialize_with = "lenient_timestamp")]
    first_seen_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "lastSeenOnGrid", deserialize_with = "lenient_timestamp")]
    last_seen_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_string")]
    scout_name: String,
    #[serde(default, alias = "scoutDiscordId", deserialize_with = "lenient_string")]
    scout_identity: String,
    #[serde(default, deserialize_with = "lenient_string")]
    system: String,
}

fn loose_sighting(value: &Value) -> Option<PilotSighting> {
    if !value.is_object() {
        return None;
    }
    let loose: LooseSighting = serde_json::from_value(value.clone()).ok()?;
    if loose.key.is_empty() && loose.name.is_empty() && loose.ship.is_empty() {
        return None;
    }

    let last_seen_at = loose.last_seen_at.or(loose.first_seen_at).unwrap_or_default();
    let first_seen_at = loose.first_seen_at.unwrap_or(last_seen_at);
    let key = if loose.key.is_empty() {
        sighting_key(&loose.name, &loose.ship)
    } else {
        loose.key
    };

    Some(PilotSighting {
        key,
        name: loose.name,
        ship: loose.ship,
        alliance: loose.alliance,
        corp: loose.corp,
        wormhole_class: loose.wormhole_class,
        wormhole_label: loose.wormhole_label,
        first_seen_at,
        last_seen_at,
        scout_name: loose.scout_name,
        scout_identity: loose.scout_identity,
        system: loose.system,
    })
}

/// The earliest format: raw overview lines used as keys
fn overview_line_sighting(value: &Value) -> Option<PilotSighting> {
    let line = value.as_str()?.trim();
    if line.is_empty() {
        return None;
    }
    let entry = parse_pilot_row(line);

    Some(PilotSighting {
        key: sighting_key(&entry.name, &entry.ship_type),
        name: entry.name,
        ship: entry.ship_type,
        alliance: entry.alliance,
        corp: entry.corporation,
        wormhole_class: String::new(),
        wormhole_label: String::new(),
        first_seen_at: DateTime::<Utc>::default(),
        last_seen_at: DateTime::<Utc>::default(),
        scout_name: String::new(),
        scout_identity: String::new(),
        system: String::new(),
    })
}

/// Epoch milliseconds, numeric strings, or RFC 3339
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|v| v.trunc() as i64))
            .and_then(DateTime::from_timestamp_millis),
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(ms) => DateTime::from_timestamp_millis(ms),
                Err(_) => DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc)),
            }
        }
        _ => None,
    })
}
