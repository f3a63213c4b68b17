//! Settings records are checked before a task uses them. A record which fails
//! its sanity check is replaced in the registry by the last record that passed,
//! so every reader keeps working from consistent settings.

use crate::errors::{Configuration, GuidanceError};
use crate::signals::Registry;
use crate::sync::watch::Watch;
use crate::types::status::AlarmSeverity;
use crate::ConstDefault;

/// Result of checking a settings record for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SettingsUpdate {
    /// Nothing new was published, or the last valid record was republished
    Unchanged,
    Accepted,
    /// The record was rejected and the last valid record restored
    Rejected(GuidanceError),
}

impl SettingsUpdate {
    /// Severity of the settings alarm after this update, if it changes it.
    pub const fn alarm(&self) -> Option<AlarmSeverity> {
        match self {
            SettingsUpdate::Unchanged => None,
            SettingsUpdate::Accepted => Some(AlarmSeverity::Ok),
            SettingsUpdate::Rejected(_) => Some(AlarmSeverity::Error),
        }
    }
}

/// Log a settings update on behalf of task `id` and reflect it in the settings
/// alarm.
pub fn report(id: &str, record: &str, update: SettingsUpdate, registry: &Registry) {
    match update {
        SettingsUpdate::Unchanged => {}
        SettingsUpdate::Accepted => debug!("{}: Accepted {} settings", id, record),
        SettingsUpdate::Rejected(error) => {
            error!("{}: Rejected {} settings: {}", id, record, error)
        }
    }

    if let Some(severity) = update.alarm() {
        if registry.alarms.get().settings != severity {
            registry.alarms.modify(|alarms| alarms.settings = severity);
        }
    }
}

#[derive(Debug, Clone)]
pub struct SettingsGuard<T> {
    last_valid: T,
    msg_id: Option<usize>,
}

impl<T: ConstDefault + Configuration + Copy + PartialEq> Default for SettingsGuard<T> {
    fn default() -> Self {
        Self::new(T::DEFAULT)
    }
}

impl<T: Configuration + Copy + PartialEq> SettingsGuard<T> {
    pub const fn new(initial: T) -> Self {
        Self {
            last_valid: initial,
            msg_id: None,
        }
    }

    /// The last record which passed its sanity check.
    pub fn get(&self) -> T {
        self.last_valid
    }

    /// Check the record in `watch` if it was republished since the last call.
    pub fn check(&mut self, watch: &Watch<T>) -> SettingsUpdate {
        let (record, msg_id) = watch.get_with_id();
        if self.msg_id == Some(msg_id) {
            return SettingsUpdate::Unchanged;
        }
        self.msg_id = Some(msg_id);

        // Also covers the restore of a record rejected by another task
        if record == self.last_valid {
            return SettingsUpdate::Unchanged;
        }

        match record.sanity_check() {
            Ok(()) => {
                self.last_valid = record;
                SettingsUpdate::Accepted
            }
            Err(error) => {
                watch.send(self.last_valid);
                self.msg_id = Some(watch.get_msg_id());
                SettingsUpdate::Rejected(error.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ConfigurationError;
    use crate::types::config::FlightModeSettings;

    #[test]
    fn rejected_record_is_restored() {
        let watch = Watch::new(FlightModeSettings::const_default());
        let mut guard = SettingsGuard::<FlightModeSettings>::default();
        assert_eq!(guard.check(&watch), SettingsUpdate::Unchanged);

        watch.modify(|s| s.landing_velocity = 1.2);
        assert_eq!(guard.check(&watch), SettingsUpdate::Accepted);
        assert_eq!(guard.get().landing_velocity, 1.2);

        watch.modify(|s| s.position_hold_offset.horizontal = 0.0);
        assert_eq!(
            guard.check(&watch),
            SettingsUpdate::Rejected(GuidanceError::Configuration(
                ConfigurationError::PositionHoldOffset
            ))
        );
        assert_eq!(watch.get().position_hold_offset.horizontal, 10.0);
        assert_eq!(watch.get().landing_velocity, 1.2);
        assert_eq!(guard.check(&watch), SettingsUpdate::Unchanged);
    }

    #[test]
    fn restore_by_another_guard_is_not_an_update() {
        let watch = Watch::new(FlightModeSettings::const_default());
        let mut first = SettingsGuard::<FlightModeSettings>::default();
        let mut second = SettingsGuard::<FlightModeSettings>::default();

        watch.modify(|s| s.vario_control_lowpass_alpha = 1.5);
        assert!(matches!(first.check(&watch), SettingsUpdate::Rejected(_)));
        assert_eq!(second.check(&watch), SettingsUpdate::Unchanged);
        assert_eq!(SettingsUpdate::Unchanged.alarm(), None);
    }
}
