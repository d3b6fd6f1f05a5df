//! "All devices to eco" for one site.
//!
//! Every modulator is targeted with its `eco` mode, or `on` when it has no eco
//! mode. Devices with neither are skipped and reported; they never abort the
//! site. The targets are stored as a programmation mode named [`ALL_ECO_NAME`]
//! and a scheduler of the same name runs it from one minute from now until
//! midnight, every day. Both are looked up by name first and reused if present.

use chrono::NaiveTime;
use log::{info, warn};

use crate::client::ClientError;
use crate::models::voltalis::*;
use crate::queries::Queries;
use crate::utils::minute_after;

pub const ALL_ECO_NAME: &str = "AllEco";
pub const ALL_ECO_COLOR: &str = "#f13434";
const MIDNIGHT: &str = "00:00";

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("mode {0} was posted but the server does not list it")]
    ModeNotPersisted(String),
    #[error("mode {0} has no server id")]
    ModeWithoutId(String),
    #[error("scheduler {name}: {source}")]
    Timetable {
        name: String,
        #[source]
        source: TimetableError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// `values["2"].csLinkId` or `modulatorTypeId` was absent.
    MissingIdentity,
    NoEcoOrOnMode { available: Vec<TranslationKey> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceOutcome {
    Targeted {
        uid: ModulatorId,
        name: Option<String>,
        mode: TranslationKey,
        db_id: i64,
    },
    Skipped {
        uid: Option<ModulatorId>,
        name: Option<String>,
        reason: SkipReason,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcoReport {
    pub site: SiteId,
    pub devices: Vec<DeviceOutcome>,
    pub mode_id: i64,
    pub mode_created: bool,
    pub scheduler_id: Option<i64>,
    pub scheduler_created: bool,
    pub activated: bool,
}

impl EcoReport {
    pub fn skipped(&self) -> impl Iterator<Item = &DeviceOutcome> {
        self.devices
            .iter()
            .filter(|d| matches!(d, DeviceOutcome::Skipped { .. }))
    }
}

/// `eco` if the device offers it, otherwise `on`, otherwise nothing.
pub fn select_eco_mode(available: &[CurrentProgrammationModeElement]) -> Option<&CurrentProgrammationModeElement> {
    let find = |key: TranslationKey| available.iter().find(|m| m.translation_key == key);
    find(TranslationKey::Eco).or_else(|| find(TranslationKey::On))
}

fn target_state(
    modulator: &Modulator,
    uid: ModulatorId,
    modulator_type_id: i64,
    selected: &CurrentProgrammationModeElement,
    available: Vec<CurrentProgrammationModeElement>,
) -> ModulatorState {
    ModulatorState {
        name: modulator.name.clone(),
        group_id: None,
        status: Some(true),
        id: Some(uid),
        id_to_cut: Some(uid),
        id_cs_to_cut: None,
        id_cs_link: None,
        is_eco_v: Some(false),
        modulator_type_id,
        current_programmation_mode: selected.clone(),
        available_programmation_mode: available,
        setpoint_temperature_in_celsius: None,
    }
}

/// Per-device selection. Only transport and decode failures are errors.
pub fn plan_targets(
    queries: &Queries<'_>,
    site: &Site,
) -> Result<(Vec<ModulatorState>, Vec<DeviceOutcome>), ClientError> {
    let mut targets = Vec::new();
    let mut outcomes = Vec::new();

    for modulator in &site.modulators {
        let label = modulator.name.as_deref().unwrap_or("<unnamed>");
        let (Some(uid), Some(type_id)) = (modulator.uid, modulator.modulator_type_id) else {
            warn!("{}: no csLinkId or modulatorTypeId, skipped", label);
            outcomes.push(DeviceOutcome::Skipped {
                uid: modulator.uid,
                name: modulator.name.clone(),
                reason: SkipReason::MissingIdentity,
            });
            continue;
        };

        let available = queries.available_modes_for(site.uid, type_id)?;
        match select_eco_mode(&available).cloned() {
            Some(selected) => {
                info!("{}: {} (dbId {})", label, selected.translation_key, selected.db_id);
                outcomes.push(DeviceOutcome::Targeted {
                    uid,
                    name: modulator.name.clone(),
                    mode: selected.translation_key,
                    db_id: selected.db_id,
                });
                targets.push(target_state(modulator, uid, type_id, &selected, available));
            }
            None => {
                let keys: Vec<TranslationKey> = available.iter().map(|m| m.translation_key).collect();
                warn!("{}: no eco or on mode among {:?}, skipped", label, keys);
                outcomes.push(DeviceOutcome::Skipped {
                    uid: Some(uid),
                    name: modulator.name.clone(),
                    reason: SkipReason::NoEcoOrOnMode { available: keys },
                });
            }
        }
    }

    Ok((targets, outcomes))
}

/// A not-yet-stored mode holding `targets`.
pub fn all_eco_mode(targets: Vec<ModulatorState>) -> ProgrammationMode {
    ProgrammationMode {
        id: None,
        name: ALL_ECO_NAME.to_string(),
        r#type: Some(0),
        color: ALL_ECO_COLOR.to_string(),
        group: vec![Group::default()],
        targets,
    }
}

/// Two spans, `00:00 -> T` and `T -> 00:00` with `T` one minute after `now`, on
/// every day of the week.
pub fn all_eco_scheduler(mode: &ProgrammationMode, now: NaiveTime) -> Result<Scheduler, WorkflowError> {
    let id = mode.id.ok_or_else(|| WorkflowError::ModeWithoutId(mode.name.clone()))?;
    let slot = Mode {
        id,
        color_mode: mode.color.clone(),
        label_mode: mode.name.clone(),
    };
    let switch_on = minute_after(now);

    Ok(Scheduler {
        id: None,
        name: ALL_ECO_NAME.to_string(),
        is_active: Flag::Bool(false),
        is_exception: Flag::Bool(true),
        data: vec![
            Datum {
                time_begin: MIDNIGHT.to_string(),
                time_end: switch_on.clone(),
                mode: slot.clone(),
            },
            Datum {
                time_begin: switch_on,
                time_end: MIDNIGHT.to_string(),
                mode: slot,
            },
        ],
        day_of_week: (1..=7).map(|id_day| DayOfWeek { id_day, day_is_on: true }).collect(),
    })
}

fn ensure_mode(
    queries: &Queries<'_>,
    site: SiteId,
    targets: Vec<ModulatorState>,
) -> Result<(ProgrammationMode, bool), WorkflowError> {
    if let Some(existing) = queries.mode_by_name(site, ALL_ECO_NAME)? {
        info!("Site {}: reusing mode {}", site, ALL_ECO_NAME);
        return Ok((existing, false));
    }

    if targets.is_empty() {
        warn!("Site {}: no device qualifies, creating {} without targets", site, ALL_ECO_NAME);
    }
    info!("Site {}: creating mode {}", site, ALL_ECO_NAME);
    let payload = UpdateModeConfig {
        programmation_mode: all_eco_mode(targets),
    };
    queries.client().update_mode_config(site, &payload)?;
    queries.forget(site);

    let stored = queries
        .mode_by_name(site, ALL_ECO_NAME)?
        .ok_or_else(|| WorkflowError::ModeNotPersisted(ALL_ECO_NAME.to_string()))?;
    Ok((stored, true))
}

fn ensure_scheduler(
    queries: &Queries<'_>,
    site: SiteId,
    mode: &ProgrammationMode,
    now: NaiveTime,
) -> Result<(Option<i64>, bool), WorkflowError> {
    if let Some(existing) = queries.scheduler_by_name(site, ALL_ECO_NAME)? {
        info!("Site {}: reusing scheduler {}", site, ALL_ECO_NAME);
        return Ok((existing.id, false));
    }

    let scheduler = all_eco_scheduler(mode, now)?;
    match scheduler.timetable_shape() {
        Ok(TimetableShape::TwoSpanMidnightWrap) => {}
        Ok(TimetableShape::Unverified) => warn!("Site {}: scheduler layout not verified against the API", site),
        Err(source) => {
            return Err(WorkflowError::Timetable {
                name: scheduler.name,
                source,
            });
        }
    }

    info!("Site {}: creating scheduler {}", site, ALL_ECO_NAME);
    let updated = queries
        .client()
        .update_scheduler_config(site, &UpdateSchedulerConfig { scheduler })?;
    let id = match updated.scheduler_id {
        Some(id) => Some(id),
        None => {
            queries.forget(site);
            queries.scheduler_by_name(site, ALL_ECO_NAME)?.and_then(|s| s.id)
        }
    };
    Ok((id, true))
}

/// Run the whole workflow for `site`. `now` is the local time of day the
/// scheduler is anchored on.
pub fn apply_all_eco(queries: &Queries<'_>, site: &Site, now: NaiveTime) -> Result<EcoReport, WorkflowError> {
    let (targets, devices) = plan_targets(queries, site)?;
    let (mode, mode_created) = ensure_mode(queries, site.uid, targets)?;
    let mode_id = mode.id.ok_or_else(|| WorkflowError::ModeWithoutId(mode.name.clone()))?;
    let (scheduler_id, scheduler_created) = ensure_scheduler(queries, site.uid, &mode, now)?;

    let activated = match scheduler_id {
        Some(scheduler_id) => {
            let state = ChangeSchedulerState {
                scheduler_id,
                is_active: true,
            };
            queries.client().change_scheduler_state(site.uid, &state)?;
            true
        }
        None => {
            warn!("Site {}: scheduler {} has no id, not activated", site.uid, ALL_ECO_NAME);
            false
        }
    };

    Ok(EcoReport {
        site: site.uid,
        devices,
        mode_id,
        mode_created,
        scheduler_id,
        scheduler_created,
        activated,
    })
}
