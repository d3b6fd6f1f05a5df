//! Records exchanged with the Voltalis web API.
//!
//! Notes
//! - Wire names are camelCase. Nullable fields are `Option` and are written back as
//!   explicit `null`: write endpoints expect every key to be present.
//! - Fields the vendor sends in more than one shape are untagged enums; variants are
//!   tried in declaration order and a value matching none of them is a decode error.
//! - Time-of-day fields remain strings ("HH:MM").

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// =====================
// Scalar ID newtype wrappers
// =====================

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(pub i64);

/// The vendor's `csLinkId`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModulatorId(pub i64);

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ModulatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Legacy boolean: some endpoints send `true`/`false`, others `1`/`0`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Flag {
    Bool(bool),
    Int(i64),
}

impl Flag {
    pub fn is_set(self) -> bool {
        match self {
            Flag::Bool(b) => b,
            Flag::Int(n) => n != 0,
        }
    }
}

impl From<bool> for Flag {
    fn from(value: bool) -> Self {
        Flag::Bool(value)
    }
}

// =====================
// Closed vocabularies
// =====================

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImageName {
    Comfort,
    Eco,
    Marche,
    NoFrost,
    Stop,
    Temperature,
}

impl ImageName {
    pub const ALL: [ImageName; 6] = [
        ImageName::Comfort,
        ImageName::Eco,
        ImageName::Marche,
        ImageName::NoFrost,
        ImageName::Stop,
        ImageName::Temperature,
    ];
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TranslationKey {
    Comfort,
    Eco,
    NoFrost,
    Off,
    On,
    Temperature,
}

impl TranslationKey {
    pub const ALL: [TranslationKey; 6] = [
        TranslationKey::Comfort,
        TranslationKey::Eco,
        TranslationKey::NoFrost,
        TranslationKey::Off,
        TranslationKey::On,
        TranslationKey::Temperature,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TranslationKey::Comfort => "comfort",
            TranslationKey::Eco => "eco",
            TranslationKey::NoFrost => "no-frost",
            TranslationKey::Off => "off",
            TranslationKey::On => "on",
            TranslationKey::Temperature => "temperature",
        }
    }
}

impl fmt::Display for TranslationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =====================
// Account / site / device
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    #[serde(rename = "id")]
    pub uid: SiteId,
    #[serde(rename = "modulatorList", default)]
    pub modulators: Vec<Modulator>,
}

/// A controllable device. Identity and label live under `values["2"]`; when that
/// slot is missing the fields are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ModulatorDocument", into = "ModulatorDocument")]
pub struct Modulator {
    pub uid: Option<ModulatorId>,
    pub name: Option<String>,
    /// Hexadecimal, e.g. `#ff0000`.
    pub color: Option<String>,
    pub modulator_type_id: Option<i64>,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModulatorDocument {
    modulator_type_id: Option<i64>,
    #[serde(default)]
    values: ModulatorSlots,
}

#[derive(Clone, Default, Serialize, Deserialize)]
struct ModulatorSlots {
    #[serde(rename = "2", skip_serializing_if = "Option::is_none")]
    primary: Option<ModulatorValues>,
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModulatorValues {
    cs_link_id: Option<ModulatorId>,
    name: Option<String>,
    color: Option<String>,
}

impl From<ModulatorDocument> for Modulator {
    fn from(doc: ModulatorDocument) -> Self {
        let values = doc.values.primary.unwrap_or_default();
        Modulator {
            uid: values.cs_link_id,
            name: values.name,
            color: values.color,
            modulator_type_id: doc.modulator_type_id,
        }
    }
}

impl From<Modulator> for ModulatorDocument {
    fn from(m: Modulator) -> Self {
        // no identity at all means the slot was absent
        let primary = (m.uid.is_some() || m.name.is_some() || m.color.is_some()).then_some(ModulatorValues {
            cs_link_id: m.uid,
            name: m.name,
            color: m.color,
        });
        ModulatorDocument {
            modulator_type_id: m.modulator_type_id,
            values: ModulatorSlots { primary },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    #[serde(default)]
    pub site_list: Vec<Site>,
}

/// Body of the cookie-generation login call (the token part is read by
/// [`crate::models::token::Token::from_login_response`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(default)]
    pub subscriber: Option<Subscriber>,
}

/// `GET /api/account/me` on the bearer generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub default_site: Option<Site>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionStep {
    pub step_timestamp_in_utc: String,
    pub total_consumption_in_wh: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionStats {
    pub total_consumption: f64,
    #[serde(default)]
    pub consumptions: Vec<ConsumptionStep>,
}

// =====================
// Programmation modes
// =====================

/// One selectable mode for a modulator type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentProgrammationModeElement {
    pub order: i64,
    pub db_id: i64,
    pub image_name: ImageName,
    pub translation_key: TranslationKey,
    pub is_enabled: bool,
    pub id_ref_type_modulator: i64,
    pub required_modulator_type_id: Option<i64>,
}

/// Runtime/target configuration of one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModulatorState {
    pub name: Option<String>,
    pub group_id: Option<i64>,
    pub status: Option<bool>,
    pub id: Option<ModulatorId>,
    pub id_to_cut: Option<ModulatorId>,
    pub id_cs_to_cut: Option<i64>,
    pub id_cs_link: Option<i64>,
    pub is_eco_v: Option<bool>,
    pub modulator_type_id: i64,
    pub current_programmation_mode: CurrentProgrammationModeElement,
    // older responses use `availableModesForModulator`
    #[serde(alias = "availableModesForModulator")]
    pub available_programmation_mode: Vec<CurrentProgrammationModeElement>,
    pub setpoint_temperature_in_celsius: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: Option<i64>,
    pub id_sensor: Option<i64>,
    /// Kept as a JSON number so `19` and `19.5` are written back as received.
    pub temp: Option<serde_json::Number>,
    pub programmation_mode: Option<i64>,
    #[serde(default)]
    pub cs_link_id_list: Vec<ModulatorState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgrammationMode {
    /// `None` until the server has stored the mode.
    pub id: Option<i64>,
    pub name: String,
    #[serde(rename = "type")]
    pub r#type: Option<i64>,
    pub color: String,
    pub group: Vec<Group>,
    #[serde(default)]
    pub targets: Vec<ModulatorState>,
}

// =====================
// Schedulers
// =====================

/// Copy of a mode's identity taken when the slot was authored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mode {
    pub id: i64,
    pub color_mode: String,
    pub label_mode: String,
}

/// One `[time_begin, time_end)` span. A `time_end` of "00:00" is midnight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Datum {
    pub time_begin: String,
    pub time_end: String,
    pub mode: Mode,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayOfWeek {
    /// ISO weekday, 1 = Monday.
    pub id_day: i64,
    pub day_is_on: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scheduler {
    pub id: Option<i64>,
    pub name: String,
    pub is_active: Flag,
    pub is_exception: Flag,
    pub data: Vec<Datum>,
    pub day_of_week: Vec<DayOfWeek>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TimetableShape {
    /// `00:00 -> T`, `T -> 00:00`: the only layout confirmed against the vendor.
    TwoSpanMidnightWrap,
    /// Partitions the day, but in a layout nobody has checked the vendor accepts.
    Unverified,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimetableError {
    #[error("dayOfWeek contains unknown day id {0}")]
    UnknownDay(i64),
    #[error("dayOfWeek lists day {0} more than once")]
    DuplicateDay(i64),
    #[error("dayOfWeek is missing day {0}")]
    MissingDay(i64),
    #[error("scheduler has no time spans")]
    NoSpans,
    #[error("invalid time of day {0:?}")]
    BadTime(String),
    #[error("span starts at {found}, expected {expected}")]
    Gap { expected: String, found: String },
    #[error("span {begin} -> {end} is empty or reversed")]
    EmptySpan { begin: String, end: String },
    #[error("last span ends at {0} instead of midnight")]
    Unterminated(String),
}

const MIDNIGHT: &str = "00:00";

fn parse_time(s: &str) -> Result<NaiveTime, TimetableError> {
    NaiveTime::parse_from_str(s, "%H:%M").map_err(|_| TimetableError::BadTime(s.to_string()))
}

impl Scheduler {
    /// Check that `day_of_week` holds each ISO weekday exactly once and that `data`
    /// partitions one day into contiguous spans.
    pub fn timetable_shape(&self) -> Result<TimetableShape, TimetableError> {
        let mut seen = [false; 7];
        for day in &self.day_of_week {
            let slot = match day.id_day {
                1..=7 => (day.id_day - 1) as usize,
                other => return Err(TimetableError::UnknownDay(other)),
            };
            if seen[slot] {
                return Err(TimetableError::DuplicateDay(day.id_day));
            }
            seen[slot] = true;
        }
        if let Some(missing) = seen.iter().position(|s| !s) {
            return Err(TimetableError::MissingDay(missing as i64 + 1));
        }

        let last = self.data.len().checked_sub(1).ok_or(TimetableError::NoSpans)?;
        let mut expected: &str = MIDNIGHT;
        for (i, span) in self.data.iter().enumerate() {
            if span.time_begin != expected {
                return Err(TimetableError::Gap {
                    expected: expected.to_string(),
                    found: span.time_begin.clone(),
                });
            }
            let begin = parse_time(&span.time_begin)?;
            let end = parse_time(&span.time_end)?;
            let wraps = span.time_end == MIDNIGHT;
            if wraps && i != last {
                return Err(TimetableError::EmptySpan {
                    begin: span.time_begin.clone(),
                    end: span.time_end.clone(),
                });
            }
            if !wraps && end <= begin {
                return Err(TimetableError::EmptySpan {
                    begin: span.time_begin.clone(),
                    end: span.time_end.clone(),
                });
            }
            expected = span.time_end.as_str();
        }
        if expected != MIDNIGHT {
            return Err(TimetableError::Unterminated(expected.to_string()));
        }

        Ok(if self.data.len() == 2 {
            TimetableShape::TwoSpanMidnightWrap
        } else {
            TimetableShape::Unverified
        })
    }
}

// =====================
// Listings and write payloads
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ModeList {
    #[serde(default)]
    pub programmation_mode_list: Vec<ProgrammationMode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerList {
    #[serde(default)]
    pub scheduler_list: Vec<Scheduler>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AvailableModes {
    /// Keyed by modulator type id, as a string.
    #[serde(default)]
    pub available_modes_by_modulator_type: BTreeMap<String, Vec<CurrentProgrammationModeElement>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateModeConfig {
    pub programmation_mode: ProgrammationMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSchedulerConfig {
    pub scheduler: Scheduler,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerUpdated {
    pub scheduler_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSchedulerState {
    pub scheduler_id: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsLinkSwitch {
    pub name: Option<String>,
    pub cs_link_id: Option<ModulatorId>,
    pub cs_link_to_cut_id: Option<ModulatorId>,
    pub modulation: bool,
    pub status: bool,
    pub is_programmable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct OnOffUpdate {
    pub cs_link_list: Vec<CsLinkSwitch>,
}
