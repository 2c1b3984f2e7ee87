use std::collections::{BTreeSet, HashSet};
use chrono::{DateTime, Utc};
use shared::types::{GridPilot, LocalPilot, LocalReport};
use crate::standing::{is_friendly, resolve_standing_hint};

const UNKNOWN_STATUS: &str = "Unknown Status";

/// Trim every field, drop nameless rows and fill in status and time
pub fn normalize_local_report(report: LocalReport, now: DateTime<Utc>) -> LocalReport {
    let status = report.status.trim();

    LocalReport {
        system: report.system.trim().to_string(),
        scout_name: report.scout_name.trim().to_string(),
        status: if status.is_empty() { UNKNOWN_STATUS.to_string() } else { status.to_string() },
        time: if report.time > 0 { report.time } else { now.timestamp_millis() },
        locals: report
            .locals
            .into_iter()
            .filter_map(normalize_local_pilot)
            .collect(),
        on_grid: report
            .on_grid
            .into_iter()
            .filter_map(normalize_grid_pilot)
            .collect(),
    }
}

fn normalize_local_pilot(pilot: LocalPilot) -> Option<LocalPilot> {
    let name = pilot.name.trim();
    if name.is_empty() {
        return None;
    }
    Some(LocalPilot {
        name: name.to_string(),
        character_id: pilot.character_id,
        standing_hint: pilot.standing_hint.trim().to_string(),
        standing_icon_id: pilot.standing_icon_id,
    })
}

fn normalize_grid_pilot(pilot: GridPilot) -> Option<GridPilot> {
    let pilot_name = pilot.pilot_name.trim();
    if pilot_name.is_empty() {
        return None;
    }
    Some(GridPilot {
        pilot_name: pilot_name.to_string(),
        ship_type: pilot.ship_type.trim().to_string(),
        standing_hint: pilot.standing_hint.trim().to_string(),
        action: pilot.action.trim().to_string(),
        distance: pilot.distance.trim().to_string(),
        corporation: pilot.corporation.trim().to_string(),
        alliance: pilot.alliance.trim().to_string(),
        ..pilot
    })
}

/// Non-friendly locals that were not in `previous`
pub fn new_non_friendly_locals(previous: Option<&LocalReport>, current: &LocalReport) -> usize {
    let known: HashSet<&str> = previous
        .map(|p| p.locals.iter().map(|l| l.name.as_str()).collect())
        .unwrap_or_default();

    current
        .locals
        .iter()
        .filter(|l| !is_friendly(&l.standing_hint))
        .filter(|l| !known.contains(l.name.as_str()))
        .count()
}

/// Non-friendly on-grid rows, worst standing first
pub fn hostile_on_grid(report: &LocalReport) -> Vec<GridPilot> {
    let mut hostile: Vec<(usize, GridPilot)> = report
        .on_grid
        .iter()
        .map(|p| (resolve_standing_hint(&p.standing_hint), p))
        .filter(|(standing, _)| !standing.is_friendly)
        .map(|(standing, p)| (standing.precedence, p.clone()))
        .collect();
    hostile.sort_by_key(|(precedence, _)| *precedence);
    hostile.into_iter().map(|(_, p)| p).collect()
}

/// Distinct standing icon ids present anywhere in the report
pub fn observed_icon_ids(report: &LocalReport) -> BTreeSet<i64> {
    report
        .locals
        .iter()
        .filter_map(|l| l.standing_icon_id)
        .chain(report.on_grid.iter().filter_map(|p| p.standing_icon_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(name: &str, hint: &str) -> LocalPilot {
        LocalPilot {
            name: name.to_string(),
            character_id: 1,
            standing_hint: hint.to_string(),
            standing_icon_id: None,
        }
    }

    fn report(locals: Vec<LocalPilot>) -> LocalReport {
        LocalReport {
            system: "J123456".to_string(),
            scout_name: "Scoutie".to_string(),
            status: "Undocked".to_string(),
            time: 1,
            locals,
            on_grid: Vec::new(),
        }
    }

    #[test]
    fn test_normalize_fills_defaults_and_drops_nameless() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let raw = LocalReport {
            system: " J1 ".to_string(),
            status: "  ".to_string(),
            locals: vec![local("  Jane ", " Pilot has bad standing "), local("   ", "")],
            on_grid: vec![GridPilot { pilot_name: "".to_string(), ..Default::default() }],
            ..Default::default()
        };

        let report = normalize_local_report(raw, now);
        assert_eq!(report.system, "J1");
        assert_eq!(report.status, "Unknown Status");
        assert_eq!(report.time, 1_700_000_000_000);
        assert_eq!(report.locals.len(), 1);
        assert_eq!(report.locals[0].name, "Jane");
        assert_eq!(report.locals[0].standing_hint, "Pilot has bad standing");
        assert!(report.on_grid.is_empty());
    }

    #[test]
    fn test_new_non_friendly_locals() {
        let previous = report(vec![local("Old Hostile", "Pilot has bad standing")]);
        let current = report(vec![
            local("Old Hostile", "Pilot has bad standing"),
            local("New Hostile", ""),
            local("New Friend", "Pilot is in your corporation"),
        ]);

        assert_eq!(new_non_friendly_locals(Some(&previous), &current), 1);
        assert_eq!(new_non_friendly_locals(None, &current), 2);
    }

    #[test]
    fn test_hostile_on_grid_and_icons() {
        let mut r = report(vec![LocalPilot { standing_icon_id: Some(7), ..local("A", "") }]);
        r.on_grid = vec![
            GridPilot { pilot_name: "A".to_string(), standing_icon_id: Some(3), ..Default::default() },
            GridPilot {
                pilot_name: "B".to_string(),
                standing_hint: "Pilot is in your fleet".to_string(),
                standing_icon_id: Some(7),
                ..Default::default()
            },
        ];

        let hostile = hostile_on_grid(&r);
        assert_eq!(hostile.len(), 1);
        assert_eq!(hostile[0].pilot_name, "A");
        assert_eq!(observed_icon_ids(&r).into_iter().collect::<Vec<_>>(), vec![3, 7]);
    }

    #[test]
    fn test_hostile_on_grid_worst_first() {
        let mut r = report(Vec::new());
        let pilot = |name: &str, hint: &str| GridPilot {
            pilot_name: name.to_string(),
            standing_hint: hint.to_string(),
            ..Default::default()
        };
        r.on_grid = vec![
            pilot("Neutral", ""),
            pilot("Bad", "Pilot has bad standing"),
            pilot("War", "Pilot is at war with your alliance"),
        ];

        let names: Vec<String> = hostile_on_grid(&r).into_iter().map(|p| p.pilot_name).collect();
        assert_eq!(names, vec!["War", "Bad", "Neutral"]);
    }
}
