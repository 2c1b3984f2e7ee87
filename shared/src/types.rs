use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::de::{lenient_bool, lenient_i64, lenient_opt_i64, lenient_string, lenient_vec};

/// A structured report as posted by the scout client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScoutMessage {
    /// Free-text overview dump, or a one-line status such as an activation notice
    #[serde(default, deserialize_with = "lenient_string")]
    pub message: String,

    /// Scout (character) name
    #[serde(default, deserialize_with = "lenient_string")]
    pub scout: String,

    /// Solar system the scout is in
    #[serde(default, deserialize_with = "lenient_string")]
    pub system: String,

    /// Wormhole the scout is sitting on, as labelled by the client
    #[serde(default, deserialize_with = "lenient_string")]
    pub wormhole: String,

    /// Pre-parsed overview rows; takes precedence over `message`
    #[serde(default, deserialize_with = "lenient_vec")]
    pub entries: Vec<ScoutEntry>,

    /// Set by the client when the scout lost its connection to the game
    #[serde(default, deserialize_with = "lenient_bool")]
    pub disconnected: bool,

    /// Scout client version
    #[serde(default, deserialize_with = "lenient_string")]
    pub version: String,
}

/// One overview row in a structured scout report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScoutEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(rename = "Type", default, deserialize_with = "lenient_string")]
    pub ship_type: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub corporation: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub alliance: String,
}

/// A single pilot observed on grid. All fields default to the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PilotEntry {
    pub name: String,
    pub ship_type: String,
    pub corporation: String,
    pub alliance: String,
}

/// Canonical form of one ingest payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedReport {
    pub reporter_name: String,
    pub reporter_identity: String,
    pub tenant_id: String,
    pub system: String,
    /// Label the scout gave the wormhole it is watching
    pub wormhole_label: String,
    /// Class read from the `Wormhole <class>` overview line
    pub wormhole_class: String,
    pub entries: Vec<PilotEntry>,
    pub is_activation_event: bool,
    pub is_disconnect_event: bool,
    pub raw_message: String,
    pub version: String,
}

impl ParsedReport {
    /// Label used for liveness and sighting context: the client label, then the
    /// parsed class, then the "No Wormhole" marker.
    pub fn effective_wormhole_label(&self) -> &str {
        if !self.wormhole_label.is_empty() {
            &self.wormhole_label
        } else if !self.wormhole_class.is_empty() {
            &self.wormhole_class
        } else {
            crate::protocol::NO_WORMHOLE
        }
    }
}

/// A persisted observation of a pilot+ship in a wormhole context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PilotSighting {
    /// `name/ship` for ordinary sightings, `Activation/<scout>/<label>/<ms>` for activations
    pub key: String,
    pub name: String,
    pub ship: String,
    pub alliance: String,
    pub corp: String,
    pub wormhole_class: String,
    pub wormhole_label: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub scout_name: String,
    pub scout_identity: String,
    pub system: String,
}

/// Last known whereabouts of a reporting scout. Held in memory only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoutStatus {
    pub name: String,
    pub system: String,
    pub wormhole_label: String,
    pub wormhole_class: String,
    pub reporter_identity: String,
    pub version: String,
    pub last_seen_at: DateTime<Utc>,
}

impl ScoutStatus {
    /// A scout that reported a lost connection is tracked but not online
    pub fn is_online(&self) -> bool {
        self.wormhole_label != crate::protocol::LOST_CONNECTION
    }
}

/// Snapshot of local chat and on-grid pilots from one scout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LocalReport {
    #[serde(default, deserialize_with = "lenient_string")]
    pub system: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub scout_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: String,
    /// Milliseconds since the Unix epoch
    #[serde(default, deserialize_with = "lenient_i64")]
    pub time: i64,
    #[serde(default)]
    pub locals: Vec<LocalPilot>,
    #[serde(default)]
    pub on_grid: Vec<GridPilot>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LocalPilot {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(rename = "CharacterID", default, deserialize_with = "lenient_i64")]
    pub character_id: i64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub standing_hint: String,
    #[serde(default, deserialize_with = "lenient_opt_i64", skip_serializing_if = "Option::is_none")]
    pub standing_icon_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GridPilot {
    #[serde(default, deserialize_with = "lenient_string")]
    pub pilot_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub ship_type: String,
    #[serde(default, deserialize_with = "lenient_opt_i64", skip_serializing_if = "Option::is_none")]
    pub ship_type_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub standing_hint: String,
    #[serde(default, deserialize_with = "lenient_opt_i64", skip_serializing_if = "Option::is_none")]
    pub standing_icon_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub action: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub distance: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_meters: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub corporation: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub alliance: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scout_message_tolerates_missing_and_null_fields() {
        let msg: ScoutMessage =
            serde_json::from_str(r#"{"Scout":"Scoutie","Wormhole":null,"Disconnected":1}"#).unwrap();
        assert_eq!(msg.scout, "Scoutie");
        assert_eq!(msg.wormhole, "");
        assert!(msg.disconnected);
        assert!(msg.entries.is_empty());
    }

    #[test]
    fn test_scout_message_tolerates_malformed_entries() {
        let msg: ScoutMessage =
            serde_json::from_str(r#"{"Scout":"Scoutie","System":"J123456","Entries":"oops"}"#).unwrap();
        assert_eq!(msg.scout, "Scoutie");
        assert_eq!(msg.system, "J123456");
        assert!(msg.entries.is_empty());

        let msg: ScoutMessage =
            serde_json::from_str(r#"{"Entries":[42,{"Name":"Jane","Type":"Gila"},"row"]}"#).unwrap();
        assert_eq!(msg.entries.len(), 1);
        assert_eq!(msg.entries[0].ship_type, "Gila");
    }

    #[test]
    fn test_local_report_wire_names() {
        let json = r#"{
            "System": "J123456",
            "ScoutName": "Scoutie",
            "Status": "Undocked",
            "Time": 1700000000000,
            "Locals": [{"Name": "Jane", "CharacterID": "9001", "StandingHint": "Pilot has bad standing", "StandingIconId": 4}],
            "OnGrid": [{"PilotName": "Jane", "ShipType": "Gila", "StandingHint": "", "Action": "Approaching"}]
        }"#;
        let report: LocalReport = serde_json::from_str(json).unwrap();
        assert_eq!(report.locals[0].character_id, 9001);
        assert_eq!(report.locals[0].standing_icon_id, Some(4));
        assert_eq!(report.on_grid[0].ship_type, "Gila");
        assert_eq!(report.on_grid[0].standing_icon_id, None);
    }

    #[test]
    fn test_effective_wormhole_label_fallbacks() {
        let mut report = ParsedReport::default();
        assert_eq!(report.effective_wormhole_label(), "No Wormhole");
        report.wormhole_class = "C5".to_string();
        assert_eq!(report.effective_wormhole_label(), "C5");
        report.wormhole_label = "Static".to_string();
        assert_eq!(report.effective_wormhole_label(), "Static");
    }
}
