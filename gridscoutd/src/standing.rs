//! Classifies the game's standing hint text as friendly or not.

use serde::Serialize;

/// Outcome of matching a hint against the standing rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Standing {
    pub normalized_hint: String,
    /// Index of the matching rule; lower wins when a pilot has several hints
    pub precedence: usize,
    pub color: &'static str,
    pub is_friendly: bool,
}

struct Rule {
    needles: &'static [&'static str],
    color: &'static str,
    is_friendly: bool,
}

const RULES: &[Rule] = &[
    Rule { needles: &["at war with you", "at war with your"], color: "#ad2828", is_friendly: false },
    Rule { needles: &["terrible standing", "horrible standing"], color: "#910203", is_friendly: false },
    Rule { needles: &["bad standing"], color: "#C14503", is_friendly: false },
    Rule { needles: &["in your fleet", "in your gang"], color: "#751FAE", is_friendly: true },
    Rule { needles: &["in your capsuleer corporation", "in your corporation"], color: "#157516", is_friendly: true },
    Rule { needles: &["in your alliance"], color: "#021F76", is_friendly: true },
    Rule { needles: &["good standing"], color: "#2862C2", is_friendly: true },
    Rule { needles: &["excellent standing"], color: "#021F76", is_friendly: true },
    Rule { needles: &["security status below -5"], color: "#8F0203", is_friendly: false },
    Rule { needles: &["security status below 0"], color: "#B88206", is_friendly: false },
];

/// Catch-all for hints no rule recognises
const NO_STANDING: Rule = Rule { needles: &[], color: "#888889", is_friendly: false };

pub fn resolve_standing_hint(hint: &str) -> Standing {
    let normalized_hint = hint.trim().to_lowercase();

    let (precedence, rule) = RULES
        .iter()
        .enumerate()
        .find(|(_, rule)| rule.needles.iter().any(|n| normalized_hint.contains(n)))
        .unwrap_or((RULES.len(), &NO_STANDING));

    Standing {
        normalized_hint,
        precedence,
        color: rule.color,
        is_friendly: rule.is_friendly,
    }
}

pub fn is_friendly(hint: &str) -> bool {
    resolve_standing_hint(hint).is_friendly
}
