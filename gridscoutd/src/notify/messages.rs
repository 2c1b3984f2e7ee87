//! Notification texts.

use shared::types::GridPilot;

const UNKNOWN_SYSTEM: &str = "Unknown System";
const UNKNOWN_SCOUT: &str = "Unknown Scout";
const UNKNOWN_WORMHOLE: &str = "Unknown Wormhole";

fn or_default<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    let value = value.trim();
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

pub fn scout_logged_in(scout: &str, system: &str) -> String {
    format!(
        "🛰️ **New scout logged in:** {} is now active in {}.",
        or_default(scout, UNKNOWN_SCOUT),
        or_default(system, UNKNOWN_SYSTEM)
    )
}

pub fn all_scouts_logged_off() -> String {
    "⚠️ **All scouts logged off.** GridScout currently has no active coverage.".to_string()
}

pub fn enemy_sighted(pilot: &str, ship: &str, wormhole: &str, system: &str) -> String {
    format!(
        "🚨 **New enemy sighted:** {} in {} at {} ({}).",
        pilot,
        ship,
        or_default(wormhole, UNKNOWN_WORMHOLE),
        or_default(system, UNKNOWN_SYSTEM)
    )
}

/// Sent straight to the scout
pub fn scout_decloaked_direct(scout: &str, system: &str) -> String {
    format!(
        "⚠️ **Scout decloaked:** {} appears decloaked in {}.",
        or_default(scout, UNKNOWN_SCOUT),
        or_default(system, UNKNOWN_SYSTEM)
    )
}

/// Broadcast when the scout cannot be reached directly
pub fn scout_decloaked_broadcast(scout: &str) -> String {
    format!(
        "⚠️ **Scout decloaked:** {} appears decloaked.",
        or_default(scout, UNKNOWN_SCOUT)
    )
}

pub fn on_grid_threat(status: &str, system: &str, scout: &str, on_grid: &[GridPilot]) -> String {
    let lines: Vec<String> = on_grid.iter().map(on_grid_line).collect();
    format!(
        "@here 🚨 **{}** in **{}** (Scout: {}).\nOn-grid pilots:\n{}",
        or_default(status, "Unknown Status"),
        or_default(system, UNKNOWN_SYSTEM),
        or_default(scout, UNKNOWN_SCOUT),
        lines.join("\n")
    )
}

fn on_grid_line(pilot: &GridPilot) -> String {
    let alliance = pilot.alliance.trim();
    let corp = pilot.corporation.trim();

    let mut org = Vec::new();
    if !alliance.is_empty() {
        org.push(alliance);
    }
    if !corp.is_empty() && corp != alliance {
        org.push(corp);
    }
    let org_text = if org.is_empty() {
        String::new()
    } else {
        format!(" [{}]", org.join("/"))
    };

    let distance = pilot.distance.trim();
    let distance_text = if distance.is_empty() {
        String::new()
    } else {
        format!(" @ {}", distance)
    };

    format!(
        "- {}{} — {} ({}){}",
        or_default(&pilot.pilot_name, "Unknown Pilot"),
        org_text,
        or_default(&pilot.ship_type, "Unknown Ship"),
        or_default(&pilot.action, "Unknown"),
        distance_text
    )
}

pub fn undocked_local_warning(scout_identity: &str, scout: &str, system: &str, new_pilot_count: usize) -> String {
    let plural = if new_pilot_count == 1 { "" } else { "s" };
    format!(
        "⚠️ **Non-friendlies in local:** <@{}> ({}) is undocked in **{}**. {} new non-friendly pilot{} entered local.",
        scout_identity,
        or_default(scout, UNKNOWN_SCOUT),
        or_default(system, UNKNOWN_SYSTEM),
        new_pilot_count,
        plural
    )
}

pub fn spy_behavior(identity: &str, reason: &str) -> String {
    format!(
        "🚫 **Possible spy behavior detected** for <@{}> ({}). {}",
        identity, identity, reason
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_grid_line_formats_org_and_distance() {
        let pilot = GridPilot {
            pilot_name: "Jane Doe".to_string(),
            ship_type: "Gila".to_string(),
            action: "Approaching".to_string(),
            distance: "12 km".to_string(),
            corporation: "TEST".to_string(),
            alliance: "NULL".to_string(),
            ..Default::default()
        };
        assert_eq!(on_grid_line(&pilot), "- Jane Doe [NULL/TEST] — Gila (Approaching) @ 12 km");

        let bare = GridPilot {
            pilot_name: "Bob".to_string(),
            corporation: "SAME".to_string(),
            alliance: "SAME".to_string(),
            ..Default::default()
        };
        assert_eq!(on_grid_line(&bare), "- Bob [SAME] — Unknown Ship (Unknown)");
    }

    #[test]
    fn test_undocked_pluralization() {
        assert!(undocked_local_warning("1", "S", "J1", 1).ends_with("1 new non-friendly pilot entered local."));
        assert!(undocked_local_warning("1", "S", "J1", 3).ends_with("3 new non-friendly pilots entered local."));
    }

    #[test]
    fn test_unknown_fallbacks() {
        assert_eq!(
            enemy_sighted("Jane", "Gila", "", " "),
            "🚨 **New enemy sighted:** Jane in Gila at Unknown Wormhole (Unknown System)."
        );
    }
}
