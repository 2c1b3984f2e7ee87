/// Literal line emitted by the scout client when nothing is on grid
pub const NOTHING_FOUND: &str = "Nothing Found";

/// Prefix of the grid line (and structured entry type) naming the wormhole class
pub const WORMHOLE_PREFIX: &str = "Wormhole ";

/// Column header words of the scout overview table
pub const HEADER_WORDS: [&str; 4] = ["Type", "Corporation", "Alliance", "Name"];

/// Message body the scout client sends when a wormhole activation is seen
pub const ACTIVATION_MESSAGE: &str = "Possible activation detected!";

/// Liveness labels used in place of a wormhole label
pub const LOST_CONNECTION: &str = "Lost Connection";
pub const NO_WORMHOLE: &str = "No Wormhole";

/// Pilot name given to synthetic activation sightings
pub const ACTIVATION_NAME: &str = "Activation";

/// Event types a tenant can enable for its event channel
pub const EVENT_ALL_SCOUTS_LOGGED_OFF: &str = "all_scouts_logged_off";
pub const EVENT_NEW_SCOUT_LOGGED_IN: &str = "new_scout_logged_in";
pub const EVENT_NEW_ENEMY_SIGHTED: &str = "new_enemy_sighted";
pub const EVENT_SCOUT_DECLOAKED: &str = "scout_decloaked";

pub const GRID_EVENT_TYPES: [&str; 4] = [
    EVENT_ALL_SCOUTS_LOGGED_OFF,
    EVENT_NEW_SCOUT_LOGGED_IN,
    EVENT_NEW_ENEMY_SIGHTED,
    EVENT_SCOUT_DECLOAKED,
];

/// Returns true if `id` looks like a platform user id (17-20 ASCII digits)
pub fn is_platform_id(id: &str) -> bool {
    (17..=20).contains(&id.len()) && id.bytes().all(|b| b.is_ascii_digit())
}
