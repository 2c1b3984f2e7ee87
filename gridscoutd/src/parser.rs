//! Turns one raw scout payload into a [`ParsedReport`].
//!
//! Payloads are either a JSON [`ScoutMessage`] or, from older clients, the
//! bare overview text. Anything that does not decode as JSON is treated as
//! overview text; decoding never fails the report.

use shared::protocol::{
    is_platform_id, ACTIVATION_MESSAGE, HEADER_WORDS, NOTHING_FOUND, WORMHOLE_PREFIX,
};
use shared::types::{ParsedReport, PilotEntry, ScoutEntry, ScoutMessage};

/// An ingest payload plus the identity the host already authenticated
#[derive(Debug, Clone, Default)]
pub struct RawReport {
    pub tenant_id: String,
    pub reporter_identity: String,
    /// Scout name to fall back on when the payload does not carry one
    pub reporter_name: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    #[error("reporter identity is missing")]
    MissingReporter,
    #[error("reporter identity {0:?} is not a platform user id")]
    InvalidReporter(String),
    #[error("tenant id is missing")]
    MissingTenant,
    #[error("report names more than one tenant")]
    AmbiguousTenant,
    #[error("report body is empty")]
    EmptyPayload,
}

/// Pilots and wormhole class read from an overview dump
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overview {
    pub wormhole_class: String,
    pub entries: Vec<PilotEntry>,
}

pub fn parse(raw: RawReport) -> Result<ParsedReport, RejectReason> {
    let reporter_identity = raw.reporter_identity.trim();
    if reporter_identity.is_empty() {
        return Err(RejectReason::MissingReporter);
    }
    if !is_platform_id(reporter_identity) {
        return Err(RejectReason::InvalidReporter(reporter_identity.to_string()));
    }

    let tenant_id = raw.tenant_id.trim();
    if tenant_id.is_empty() {
        return Err(RejectReason::MissingTenant);
    }
    if tenant_id.contains(',') {
        return Err(RejectReason::AmbiguousTenant);
    }

    let text = String::from_utf8_lossy(&raw.body);
    if text.trim().is_empty() {
        return Err(RejectReason::EmptyPayload);
    }

    let message = match serde_json::from_str::<ScoutMessage>(&text) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!("Treating report as overview text ({})", e);
            ScoutMessage {
                message: text.into_owned(),
                ..Default::default()
            }
        }
    };

    let mut report = ParsedReport {
        reporter_name: first_non_empty(&message.scout, raw.reporter_name.as_deref()),
        reporter_identity: reporter_identity.to_string(),
        tenant_id: tenant_id.to_string(),
        system: message.system.trim().to_string(),
        wormhole_label: message.wormhole.trim().to_string(),
        wormhole_class: String::new(),
        entries: Vec::new(),
        is_activation_event: false,
        is_disconnect_event: message.disconnected,
        raw_message: message.message.clone(),
        version: message.version.trim().to_string(),
    };

    if message.message.trim() == ACTIVATION_MESSAGE {
        report.is_activation_event = true;
        return Ok(report);
    }

    let overview = if message.entries.is_empty() {
        parse_overview(&message.message)
    } else {
        from_entries(&message.entries)
    };
    report.wormhole_class = overview.wormhole_class;
    report.entries = overview.entries;

    Ok(report)
}

/// Parse an overview dump line by line
pub fn parse_overview(text: &str) -> Overview {
    let mut overview = Overview::default();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line == NOTHING_FOUND {
            continue;
        }

        if let Some(rest) = line.strip_prefix(WORMHOLE_PREFIX) {
            if let Some(class) = rest.split_whitespace().next() {
                overview.wormhole_class = class.to_string();
            }
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        if is_pilot_row(&tokens) {
            overview.entries.push(parse_pilot_row(line));
        }
    }

    overview
}

/// More than two tokens and not the column header row
fn is_pilot_row(tokens: &[&str]) -> bool {
    if tokens.len() <= 2 {
        return false;
    }
    let header_hits = HEADER_WORDS
        .iter()
        .filter(|h| tokens.contains(*h))
        .count();
    header_hits < 3
}

/// Split `<ship words> [CORP] [ALLIANCE] <name words>`.
///
/// The first token opening or closing a bracket ends the ship type. A row
/// without any bracketed token is all ship type.
pub fn parse_pilot_row(line: &str) -> PilotEntry {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some(boundary) = tokens.iter().position(|t| is_bracketed(t)) else {
        return PilotEntry {
            ship_type: tokens.join(" "),
            ..Default::default()
        };
    };

    let ship_type = tokens[..boundary].join(" ");
    let corporation = strip_brackets(tokens[boundary]);
    let mut rest = boundary + 1;

    let alliance = match tokens.get(rest) {
        Some(token) if is_bracketed(token) => {
            rest += 1;
            strip_brackets(token)
        }
        _ => String::new(),
    };

    PilotEntry {
        name: tokens[rest..].join(" "),
        ship_type,
        corporation,
        alliance,
    }
}

/// Structured rows, with the wormhole row pulled out as the class
fn from_entries(entries: &[ScoutEntry]) -> Overview {
    let mut overview = Overview::default();

    for entry in entries {
        let ship_type = entry.ship_type.trim();
        if let Some(rest) = ship_type.strip_prefix(WORMHOLE_PREFIX) {
            if let Some(class) = rest.split_whitespace().next() {
                overview.wormhole_class = class.to_string();
            }
            continue;
        }

        let name = entry.name.trim();
        if name.is_empty() && ship_type.is_empty() {
            continue;
        }

        overview.entries.push(PilotEntry {
            name: name.to_string(),
            ship_type: ship_type.to_string(),
            corporation: strip_brackets(entry.corporation.trim()),
            alliance: strip_brackets(entry.alliance.trim()),
        });
    }

    overview
}

fn is_bracketed(token: &str) -> bool {
    token.starts_with('[') || token.ends_with(']')
}

fn strip_brackets(token: &str) -> String {
    token.trim_start_matches('[').trim_end_matches(']').to_string()
}

fn first_non_empty(primary: &str, fallback: Option<&str>) -> String {
    let primary = primary.trim();
    if !primary.is_empty() {
        return primary.to_string();
    }
    fallback.map(str::trim).unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORTER: &str = "123456789012345678";

    fn raw(body: &str) -> RawReport {
        RawReport {
            tenant_id: "guild-1".to_string(),
            reporter_identity: REPORTER.to_string(),
            reporter_name: None,
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_wormhole_line_sets_class() {
        let overview = parse_overview("Wormhole C3\nNothing Found");
        assert_eq!(overview.wormhole_class, "C3");
        assert!(overview.entries.is_empty());
    }

    #[test]
    fn test_pilot_row_split() {
        let entry = parse_pilot_row("Gila [TEST] [NULL] Jane Doe");
        assert_eq!(entry.ship_type, "Gila");
        assert_eq!(entry.corporation, "TEST");
        assert_eq!(entry.alliance, "NULL");
        assert_eq!(entry.name, "Jane Doe");
    }

    #[test]
    fn test_pilot_row_multi_word_ship_without_alliance() {
        let entry = parse_pilot_row("Stratios Emergency Responder [CORP] Some Pilot");
        assert_eq!(entry.ship_type, "Stratios Emergency Responder");
        assert_eq!(entry.corporation, "CORP");
        assert_eq!(entry.alliance, "");
        assert_eq!(entry.name, "Some Pilot");
    }

    #[test]
    fn test_pilot_row_without_brackets_is_ship_only() {
        let entry = parse_pilot_row("Some Unbracketed Line");
        assert_eq!(entry.ship_type, "Some Unbracketed Line");
        assert_eq!(entry.corporation, "");
        assert_eq!(entry.alliance, "");
        assert_eq!(entry.name, "");
    }

    #[test]
    fn test_header_and_short_rows_are_skipped() {
        let overview = parse_overview(
            "Wormhole C5\nName Type Corporation Alliance\nTwo words\nGila [TEST] [NULL] Jane Doe",
        );
        assert_eq!(overview.entries.len(), 1);
        assert_eq!(overview.entries[0].name, "Jane Doe");
    }

    #[test]
    fn test_row_with_one_header_word_is_kept() {
        // A pilot actually named "Name" is still a pilot
        let overview = parse_overview("Gila [TEST] [NULL] Name Person");
        assert_eq!(overview.entries.len(), 1);
    }

    #[test]
    fn test_crlf_lines() {
        let overview = parse_overview("Wormhole C2\r\nGila [A] [B] Jane\r\n");
        assert_eq!(overview.wormhole_class, "C2");
        assert_eq!(overview.entries[0].name, "Jane");
    }

    #[test]
    fn test_free_text_fallback() {
        let mut input = raw("Wormhole C5\nGila [TEST] [NULL] Jane Doe\nNothing Found");
        input.reporter_name = Some("Scoutie".to_string());

        let report = parse(input).unwrap();
        assert_eq!(report.reporter_name, "Scoutie");
        assert_eq!(report.wormhole_class, "C5");
        assert_eq!(report.system, "");
        assert_eq!(report.entries.len(), 1);
        assert!(!report.is_activation_event);
    }

    #[test]
    fn test_structured_message_text() {
        let body = r#"{"Scout":"Scoutie","System":"J123456","Wormhole":"K162","Message":"Wormhole C4\nLoki [X] [Y] Bob","Version":"1.2"}"#;
        let report = parse(raw(body)).unwrap();
        assert_eq!(report.reporter_name, "Scoutie");
        assert_eq!(report.system, "J123456");
        assert_eq!(report.wormhole_label, "K162");
        assert_eq!(report.wormhole_class, "C4");
        assert_eq!(report.version, "1.2");
        assert_eq!(report.entries[0].ship_type, "Loki");
    }

    #[test]
    fn test_structured_entries_take_precedence() {
        let body = r#"{
            "Scout": "Scoutie",
            "Message": "Gila [IGNORED] [ROW] Nobody",
            "Entries": [
                {"Name": "", "Type": "Wormhole C6", "Corporation": "", "Alliance": ""},
                {"Name": "Jane Doe", "Type": "Gila", "Corporation": "[TEST]", "Alliance": "NULL"},
                {"Name": "", "Type": "", "Corporation": "", "Alliance": ""}
            ]
        }"#;
        let report = parse(raw(body)).unwrap();
        assert_eq!(report.wormhole_class, "C6");
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].name, "Jane Doe");
        assert_eq!(report.entries[0].corporation, "TEST");
    }

    #[test]
    fn test_malformed_entries_keep_structured_fields() {
        let body = r#"{"Scout":"Scoutie","System":"J123456","Wormhole":"K162","Entries":"oops","Message":"Gila [A] [B] Jane"}"#;
        let report = parse(raw(body)).unwrap();
        assert_eq!(report.reporter_name, "Scoutie");
        assert_eq!(report.system, "J123456");
        assert_eq!(report.wormhole_label, "K162");
        assert_eq!(report.raw_message, "Gila [A] [B] Jane");
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].name, "Jane");
        assert_eq!(report.entries[0].corporation, "A");
    }

    #[test]
    fn test_activation_bypasses_pilot_parsing() {
        let body = r#"{"Scout":"Watcher","System":"J123456","Message":"Possible activation detected!","Entries":[{"Name":"X","Type":"Gila"}]}"#;
        let report = parse(raw(body)).unwrap();
        assert!(report.is_activation_event);
        assert!(report.entries.is_empty());
        assert_eq!(report.system, "J123456");
    }

    #[test]
    fn test_activation_in_plain_text() {
        let report = parse(raw("Possible activation detected!\n")).unwrap();
        assert!(report.is_activation_event);
    }

    #[test]
    fn test_disconnect_flag() {
        let report = parse(raw(r#"{"Scout":"Scoutie","Wormhole":"C5","Disconnected":true}"#)).unwrap();
        assert!(report.is_disconnect_event);
        assert!(report.entries.is_empty());
    }

    #[test]
    fn test_json_that_is_not_a_message_falls_back() {
        let report = parse(raw("1234")).unwrap();
        assert_eq!(report.raw_message, "1234");
        assert!(report.entries.is_empty());
    }

    #[test]
    fn test_rejections() {
        let mut input = raw("Wormhole C5");
        input.reporter_identity = String::new();
        assert_eq!(parse(input).unwrap_err(), RejectReason::MissingReporter);

        let mut input = raw("Wormhole C5");
        input.reporter_identity = "not-a-snowflake".to_string();
        assert!(matches!(parse(input), Err(RejectReason::InvalidReporter(_))));

        let mut input = raw("Wormhole C5");
        input.tenant_id = " ".to_string();
        assert_eq!(parse(input).unwrap_err(), RejectReason::MissingTenant);

        let mut input = raw("Wormhole C5");
        input.tenant_id = "a,b".to_string();
        assert_eq!(parse(input).unwrap_err(), RejectReason::AmbiguousTenant);

        assert_eq!(parse(raw("  \n")).unwrap_err(), RejectReason::EmptyPayload);
    }
}
