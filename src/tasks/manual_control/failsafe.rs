//! Battery failsafe. A low battery moves the flight mode switch to one of the
//! configured failsafe positions, until the pilot moves the switch.

use embassy_time::{Duration, Instant};

use crate::types::config::FlightModeSettings;
use crate::types::status::AlarmSeverity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FailsafeLevel {
    None,
    Warning,
    Critical,
}

impl FailsafeLevel {
    pub const fn from_alarm(severity: AlarmSeverity) -> Self {
        match severity {
            AlarmSeverity::Warning => FailsafeLevel::Warning,
            AlarmSeverity::Critical => FailsafeLevel::Critical,
            AlarmSeverity::Uninitialised | AlarmSeverity::Ok | AlarmSeverity::Error => {
                FailsafeLevel::None
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatteryFailsafe {
    level: FailsafeLevel,
    overridden: bool,
    switch_position: u8,
    changed_at: Instant,
}

impl Default for BatteryFailsafe {
    fn default() -> Self {
        Self::new()
    }
}

impl BatteryFailsafe {
    pub const fn new() -> Self {
        Self {
            level: FailsafeLevel::None,
            overridden: false,
            switch_position: 0,
            changed_at: Instant::from_ticks(0),
        }
    }

    /// The committed failsafe level.
    pub fn level(&self) -> FailsafeLevel {
        self.level
    }

    pub fn is_overridden(&self) -> bool {
        self.overridden
    }

    /// Return the effective switch position for the pilot selected `position`.
    pub fn apply(
        &mut self,
        position: u8,
        armed: bool,
        battery: AlarmSeverity,
        settings: &FlightModeSettings,
        now: Instant,
    ) -> u8 {
        if !armed {
            self.level = FailsafeLevel::None;
            self.overridden = false;
            self.changed_at = now;
            self.switch_position = position;
            return position;
        }

        let mut level = FailsafeLevel::from_alarm(battery);
        let debounce = Duration::from_millis(settings.battery_failsafe_debounce_ms as u64);

        if level == self.level {
            self.changed_at = now;
        } else if now.saturating_duration_since(self.changed_at) < debounce || level < self.level {
            // Hold the committed level within the grace period, and never downgrade
            level = self.level;
        } else {
            warn!("Battery failsafe {:?} -> {:?}", self.level, level);
            self.level = level;
            self.switch_position = position;
            self.overridden = false;
        }

        if level == FailsafeLevel::None || self.overridden {
            return position;
        }

        if position != self.switch_position {
            info!("Battery failsafe overridden by the pilot");
            self.overridden = true;
            self.changed_at = now;
            return position;
        }

        let positions = &settings.battery_failsafe_switch_positions;
        let failsafe_position = match level {
            FailsafeLevel::Critical => positions.critical.or(positions.warning),
            FailsafeLevel::Warning => positions.warning,
            FailsafeLevel::None => None,
        };

        failsafe_position.unwrap_or(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> FlightModeSettings {
        let mut settings = FlightModeSettings::const_default();
        settings.battery_failsafe_debounce_ms = 1000;
        settings.battery_failsafe_switch_positions.warning = Some(3);
        settings.battery_failsafe_switch_positions.critical = Some(5);
        settings
    }

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn disarmed_passes_through() {
        let mut failsafe = BatteryFailsafe::new();
        let position = failsafe.apply(0, false, AlarmSeverity::Critical, &settings(), at(10_000));
        assert_eq!(position, 0);
        assert_eq!(failsafe.level(), FailsafeLevel::None);
    }

    #[test]
    fn alarm_is_debounced() {
        let settings = settings();
        let mut failsafe = BatteryFailsafe::new();
        failsafe.apply(0, false, AlarmSeverity::Ok, &settings, at(0));

        assert_eq!(failsafe.apply(0, true, AlarmSeverity::Warning, &settings, at(500)), 0);
        assert_eq!(failsafe.apply(0, true, AlarmSeverity::Warning, &settings, at(999)), 0);
        assert_eq!(failsafe.apply(0, true, AlarmSeverity::Warning, &settings, at(1000)), 3);
        assert_eq!(failsafe.level(), FailsafeLevel::Warning);
    }

    #[test]
    fn level_never_downgrades() {
        let settings = settings();
        let mut failsafe = BatteryFailsafe::new();
        failsafe.apply(0, false, AlarmSeverity::Ok, &settings, at(0));
        failsafe.apply(0, true, AlarmSeverity::Critical, &settings, at(2000));
        assert_eq!(failsafe.level(), FailsafeLevel::Critical);

        let alarms = [
            AlarmSeverity::Ok,
            AlarmSeverity::Warning,
            AlarmSeverity::Critical,
            AlarmSeverity::Warning,
        ];
        let mut ms = 2000;
        for alarm in alarms.iter().cycle().take(20) {
            ms += 1500;
            let position = failsafe.apply(0, true, *alarm, &settings, at(ms));
            assert_eq!(position, 5);
            assert_eq!(failsafe.level(), FailsafeLevel::Critical);
        }
    }

    #[test]
    fn pilot_overrides_by_moving_the_switch() {
        let settings = settings();
        let mut failsafe = BatteryFailsafe::new();
        failsafe.apply(1, false, AlarmSeverity::Ok, &settings, at(0));
        assert_eq!(failsafe.apply(1, true, AlarmSeverity::Warning, &settings, at(1000)), 3);

        assert_eq!(failsafe.apply(2, true, AlarmSeverity::Warning, &settings, at(1100)), 2);
        assert!(failsafe.is_overridden());
        assert_eq!(failsafe.apply(1, true, AlarmSeverity::Warning, &settings, at(1200)), 1);

        // A worse alarm after a fresh grace period triggers again
        assert_eq!(failsafe.apply(1, true, AlarmSeverity::Critical, &settings, at(1500)), 1);
        assert_eq!(failsafe.apply(1, true, AlarmSeverity::Critical, &settings, at(2200)), 5);
        assert!(!failsafe.is_overridden());
    }

    #[test]
    fn critical_falls_back_to_warning_position() {
        let mut settings = settings();
        settings.battery_failsafe_switch_positions.critical = None;

        let mut failsafe = BatteryFailsafe::new();
        failsafe.apply(0, false, AlarmSeverity::Ok, &settings, at(0));
        assert_eq!(failsafe.apply(0, true, AlarmSeverity::Critical, &settings, at(1000)), 3);
    }
}
