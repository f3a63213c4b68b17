//! Vertical control of an auto-takeoff leg: the sequence decides the thrust
//! envelope and the altitude controller flies within it.

use crate::consts::GUIDANCE_DT;
use crate::controllers::altitude::{AltitudeController, VerticalBounds};
use crate::guidance::autotakeoff::AutoTakeoffFsm;
use crate::signals::Registry;
use crate::types::control::StabilizationDesired;
use crate::types::guidance::AUTOTAKEOFF_CONTROL_STATE;
use crate::types::status::{AutoTakeoffControlState, AutoTakeoffState};

#[derive(Debug, Clone, Default)]
pub struct TakeoffController {
    fsm: AutoTakeoffFsm,
    altitude: AltitudeController,
    holding: bool,
    active: bool,
}

impl TakeoffController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn fsm(&self) -> &AutoTakeoffFsm {
        &self.fsm
    }

    pub fn altitude(&self) -> &AltitudeController {
        &self.altitude
    }

    /// Called when an auto-takeoff leg is engaged.
    pub fn activate(&mut self, registry: &Registry) {
        if self.active {
            return;
        }

        self.active = true;
        self.holding = false;
        self.settings_updated(registry);
        self.fsm.activate(registry);
        self.altitude
            .activate(registry.stabilization_desired.get().thrust);
    }

    pub fn deactivate(&mut self, registry: &Registry) {
        if self.active {
            self.active = false;
            self.fsm.inactive(registry);
            self.altitude.deactivate();
        }
    }

    /// Reprogram the altitude controller from the current settings.
    pub fn settings_updated(&mut self, registry: &Registry) {
        let settings = registry.path_follower_settings.get();
        let pid = settings.vertical_vel_pid;
        let offset = registry.self_tuning.get().neutral_thrust_offset;

        self.altitude.configure(
            pid.kp,
            pid.ki,
            pid.kd,
            pid.beta,
            GUIDANCE_DT,
            settings.vertical_vel_max,
        );
        self.altitude
            .update_positional_parameters(settings.vertical_pos_p);
        self.altitude
            .update_neutral_thrust(settings.thrust_limits.neutral + offset);
        self.altitude
            .set_thrust_limits(settings.thrust_limits.min, settings.thrust_limits.max);
    }

    /// Run one tick and publish the resulting stabilization demand.
    pub fn update(&mut self, registry: &Registry) -> StabilizationDesired {
        let target = registry.guidance_target.get();
        if let Some(control_state) =
            target.parameter_as::<AutoTakeoffControlState>(AUTOTAKEOFF_CONTROL_STATE)
        {
            if control_state != self.fsm.status().control_state {
                self.fsm.set_control_state(control_state, registry);
            }
        }

        self.fsm.update(registry);

        let position = registry.position.get();
        let velocity = registry.velocity.get();
        let settings = registry.path_follower_settings.get();

        // Once holding, the thrust envelope is that of the altitude controller
        let bounds: Option<&dyn VerticalBounds> = if self.fsm.position_hold_state() {
            if !self.holding {
                self.holding = true;
                self.altitude.update_position_state(position.down);
            }
            if let Some(correction) = self
                .altitude
                .control_position(target.end.down, position.down)
            {
                registry
                    .self_tuning
                    .modify(|stats| correction.apply_to(stats));
            }
            None
        } else {
            self.altitude
                .update_velocity_setpoint(-settings.takeoff_velocity);
            Some(&self.fsm)
        };

        self.altitude.update_velocity_state(velocity.down, bounds);
        let thrust = self.altitude.get_command(bounds);

        let mut desired = registry.stabilization_desired.get();
        desired.thrust = thrust;
        self.fsm.constrain_stabi_desired(&mut desired);
        registry.stabilization_desired.send(desired);

        if self.fsm.state() == AutoTakeoffState::Disarmed {
            registry.path_status.modify(|s| s.fractional_progress = 1.0);
        }

        desired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guidance::plans::setup_auto_takeoff;
    use crate::types::measurements::Ned;
    use approx::assert_relative_eq;

    fn initiate(registry: &Registry) {
        registry.guidance_target.modify(|t| {
            t.mode_parameters[AUTOTAKEOFF_CONTROL_STATE] = AutoTakeoffControlState::Initiate as u8 as f32
        });
    }

    #[test]
    fn waits_for_initiate() {
        let registry = Registry::new();
        setup_auto_takeoff(&registry);

        let mut controller = TakeoffController::new();
        controller.activate(&registry);
        controller.update(&registry);
        assert_eq!(controller.fsm().state(), AutoTakeoffState::Inactive);

        initiate(&registry);
        controller.update(&registry);
        assert_eq!(controller.fsm().state(), AutoTakeoffState::SlowStart);
    }

    #[test]
    fn thrust_follows_sequence_envelope() {
        let registry = Registry::new();
        setup_auto_takeoff(&registry);
        initiate(&registry);

        let mut controller = TakeoffController::new();
        controller.activate(&registry);
        registry.stabilization_desired.modify(|d| d.roll = 5.0);

        for _ in 0..40 {
            let desired = controller.update(&registry);
            let (min, max) = controller.fsm().bound_thrust(0.0, 1.0);
            assert!(desired.thrust >= min - 1e-6 && desired.thrust <= max + 1e-6);
            assert_eq!(desired.roll, 0.0);
        }
        assert_eq!(controller.fsm().state(), AutoTakeoffState::SlowStart);
        assert!(controller.altitude().velocity_desired() < 0.0);
    }

    #[test]
    fn holding_learns_neutral_thrust() {
        let registry = Registry::new();
        setup_auto_takeoff(&registry);
        registry.stabilization_desired.modify(|d| d.thrust = 0.5);
        registry.position.send(Ned::new(0.0, 0.0, -2.5));

        let mut controller = TakeoffController::new();
        controller.activate(&registry);
        assert_eq!(controller.fsm().state(), AutoTakeoffState::Hold);

        for _ in 0..120 {
            let desired = controller.update(&registry);
            assert!(desired.thrust.is_finite());
        }

        assert!(controller.altitude().neutral_thrust_estimate().have_correction);
        let stats = registry.self_tuning.get();
        assert_relative_eq!(
            stats.neutral_thrust_offset,
            stats.neutral_thrust_correction
        );
    }
}
