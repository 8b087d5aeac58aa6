//! Typed rows of the four tables
//!
//! Raw rows accept both shapes a table can be in: freshly scraped (natural
//! keys only) and already normalized (integer keys). Whether a key or a
//! reference still needs work is read from the field's value, never from
//! the presence of a column.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const EVENT_COLUMNS: [&str; 7] = [
    "event_id",
    "event_name",
    "event_date",
    "event_city",
    "event_state",
    "event_country",
    "event_url",
];

pub const FIGHT_COLUMNS: [&str; 15] = [
    "fight_id",
    "event_id",
    "referee",
    "f_1",
    "f_2",
    "winner",
    "num_rounds",
    "title_fight",
    "weight_class",
    "gender",
    "result",
    "result_details",
    "finish_round",
    "finish_time",
    "fight_url",
];

pub const FIGHT_STAT_COLUMNS: [&str; 14] = [
    "fight_stat_id",
    "fight_id",
    "fighter_id",
    "knockdowns",
    "total_strikes_att",
    "total_strikes_succ",
    "sig_strikes_att",
    "sig_strikes_succ",
    "takedown_att",
    "takedown_succ",
    "submission_att",
    "reversals",
    "ctrl_time",
    "fight_url",
];

/// Column order of a parked (rejected) fighter row; the other raw tables
/// park under their normalized column order
pub const RAW_FIGHTER_COLUMNS: [&str; 15] = [
    "fighter_id",
    "fighter_f_name",
    "fighter_l_name",
    "fighter_name",
    "fighter_nickname",
    "fighter_height_cm",
    "fighter_weight_lbs",
    "fighter_reach_cm",
    "fighter_stance",
    "fighter_dob",
    "fighter_w",
    "fighter_l",
    "fighter_d",
    "fighter_nc_dq",
    "fighter_url",
];

pub const FIGHTER_COLUMNS: [&str; 13] = [
    "fighter_id",
    "fighter_name",
    "fighter_nickname",
    "fighter_height_cm",
    "fighter_weight_lbs",
    "fighter_reach_cm",
    "fighter_stance",
    "fighter_dob",
    "fighter_w",
    "fighter_l",
    "fighter_d",
    "fighter_nc_dq",
    "fighter_url",
];

/// A reference cell: an integer key once resolved, a natural key before
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EntityRef {
    Key(i64),
    Name(String),
    #[default]
    Empty,
}

impl EntityRef {
    pub fn parse(cell: &str) -> Self {
        let cell = cell.trim();
        if cell.is_empty() {
            return Self::Empty;
        }
        match parse_key(cell) {
            Some(key) => Self::Key(key),
            None => Self::Name(cell.to_string()),
        }
    }
}

impl Serialize for EntityRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Key(key) => serializer.serialize_i64(*key),
            Self::Name(name) => serializer.serialize_str(name),
            Self::Empty => serializer.serialize_str(""),
        }
    }
}

impl<'de> Deserialize<'de> for EntityRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let cell = Option::<String>::deserialize(deserializer)?;
        Ok(cell.map(|c| Self::parse(&c)).unwrap_or_default())
    }
}

/// Accepts `7` and the float spelling `7.0` some table tools write
fn parse_key(cell: &str) -> Option<i64> {
    if let Ok(key) = cell.parse::<i64>() {
        return Some(key);
    }
    match cell.parse::<f64>() {
        Ok(value) if value.fract() == 0.0 && value.abs() < 9.0e15 => Some(value as i64),
        _ => None,
    }
}

/// Deserializes an optional integer key cell; empty means absent
fn opt_key<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    let cell = Option::<String>::deserialize(deserializer)?;
    match cell.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => parse_key(text)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid key '{}'", text))),
    }
}

// ===== Raw rows =====
// Serialized only when a rejected row is parked for the next pass.

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(default, deserialize_with = "opt_key")]
    pub event_id: Option<i64>,
    pub event_name: String,
    pub event_date: String,
    pub event_city: String,
    pub event_state: String,
    pub event_country: String,
    pub event_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFight {
    #[serde(default, deserialize_with = "opt_key")]
    pub fight_id: Option<i64>,
    /// Event display name in scraped tables, event key once normalized
    #[serde(default, alias = "event_name")]
    pub event_id: EntityRef,
    pub referee: String,
    pub f_1: EntityRef,
    pub f_2: EntityRef,
    #[serde(default)]
    pub winner: EntityRef,
    pub num_rounds: String,
    pub title_fight: String,
    pub weight_class: String,
    pub gender: String,
    pub result: String,
    pub result_details: String,
    pub finish_round: String,
    pub finish_time: String,
    pub fight_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFightStat {
    #[serde(default, deserialize_with = "opt_key")]
    pub fight_stat_id: Option<i64>,
    #[serde(default, deserialize_with = "opt_key")]
    pub fight_id: Option<i64>,
    /// Fighter full name in scraped tables, fighter key once normalized
    #[serde(default, alias = "fighter_name")]
    pub fighter_id: EntityRef,
    pub knockdowns: String,
    pub total_strikes_att: String,
    pub total_strikes_succ: String,
    pub sig_strikes_att: String,
    pub sig_strikes_succ: String,
    pub takedown_att: String,
    pub takedown_succ: String,
    pub submission_att: String,
    pub reversals: String,
    pub ctrl_time: String,
    pub fight_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFighter {
    #[serde(default, deserialize_with = "opt_key")]
    pub fighter_id: Option<i64>,
    #[serde(default)]
    pub fighter_f_name: Option<String>,
    #[serde(default)]
    pub fighter_l_name: Option<String>,
    #[serde(default)]
    pub fighter_name: Option<String>,
    pub fighter_nickname: String,
    pub fighter_height_cm: String,
    pub fighter_weight_lbs: String,
    pub fighter_reach_cm: String,
    pub fighter_stance: String,
    pub fighter_dob: String,
    pub fighter_w: String,
    pub fighter_l: String,
    pub fighter_d: String,
    pub fighter_nc_dq: String,
    pub fighter_url: String,
}

impl RawFighter {
    /// Join key used by fights and fight stats: first and last name joined
    /// by a space, or the stored full name when the parts are absent
    pub fn full_name(&self) -> String {
        if self.fighter_f_name.is_none() && self.fighter_l_name.is_none() {
            return self
                .fighter_name
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string();
        }

        [&self.fighter_f_name, &self.fighter_l_name]
            .into_iter()
            .flatten()
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ===== Normalized rows =====
// Field order is the column order of the persisted table.

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub event_id: i64,
    pub event_name: String,
    pub event_date: String,
    pub event_city: String,
    pub event_state: String,
    pub event_country: String,
    pub event_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fight {
    pub fight_id: i64,
    pub event_id: i64,
    pub referee: String,
    pub f_1: i64,
    pub f_2: i64,
    pub winner: Option<i64>,
    pub num_rounds: String,
    pub title_fight: String,
    pub weight_class: String,
    pub gender: String,
    pub result: String,
    pub result_details: String,
    pub finish_round: String,
    pub finish_time: String,
    pub fight_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FightStat {
    pub fight_stat_id: i64,
    pub fight_id: i64,
    pub fighter_id: i64,
    pub knockdowns: String,
    pub total_strikes_att: String,
    pub total_strikes_succ: String,
    pub sig_strikes_att: String,
    pub sig_strikes_succ: String,
    pub takedown_att: String,
    pub takedown_succ: String,
    pub submission_att: String,
    pub reversals: String,
    pub ctrl_time: String,
    pub fight_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fighter {
    pub fighter_id: i64,
    pub fighter_name: String,
    pub fighter_nickname: String,
    pub fighter_height_cm: String,
    pub fighter_weight_lbs: String,
    pub fighter_reach_cm: String,
    pub fighter_stance: String,
    pub fighter_dob: String,
    pub fighter_w: String,
    pub fighter_l: String,
    pub fighter_d: String,
    pub fighter_nc_dq: String,
    pub fighter_url: String,
}
