//! Tick counted auto-takeoff sequence. The sequence only shapes the thrust
//! bounds and the horizontal stabilization of the path follower; the climb
//! itself is flown by the altitude controller.

#[allow(unused_imports)]
use num_traits::Float;

use crate::consts::GUIDANCE_TICKS_PER_SECOND;
use crate::controllers::altitude::VerticalBounds;
use crate::signals::Registry;
use crate::types::config::ThrustLimits;
use crate::types::control::StabilizationDesired;
use crate::types::flight_mode::ControlChain;
use crate::types::measurements::{Ned, TakeoffLocation};
use crate::types::status::{
    AlarmSeverity, AltitudeState, AutoTakeoffControlState, AutoTakeoffState, AutoTakeoffStatus,
    ExitReason,
};

const TIMEOUT_SLOWSTART: u32 = 2 * GUIDANCE_TICKS_PER_SECOND;
const TIMEOUT_THRUSTUP: u32 = GUIDANCE_TICKS_PER_SECOND;
const TIMEOUT_THRUSTDOWN: u32 = 5 * GUIDANCE_TICKS_PER_SECOND;

/// Below this height above takeoff [m, down] the vehicle is considered low
const SLOWDOWN_HEIGHT: f32 = -5.0;

/// Spool-up thrust, assumed below the minimum thrust limit
const SLOWSTART_INITIAL_THRUST: f32 = 0.05;

/// Final thrust ceiling of the thrust-up stage, relative to the maximum
const THRUSTUP_FINAL_RATIO: f32 = 0.8;

/// Horizontal drift which aborts the takeoff [m]
const MAX_POSITION_ERROR: f32 = 3.0;

/// Vertical distance at which the takeoff altitude is reached [m]
const ARRIVAL_TOLERANCE: f32 = 0.5;

/// Registry values consumed by a single step of the sequence.
#[derive(Debug, Clone, Copy)]
struct Inputs {
    thrust: f32,
    position: Ned,
    limits: ThrustLimits,
    target_down: f32,
    control_chain: ControlChain,
}

impl Inputs {
    fn read(registry: &Registry) -> Self {
        Inputs {
            thrust: registry.stabilization_desired.get().thrust,
            position: registry.position.get(),
            limits: registry.path_follower_settings.get().thrust_limits,
            target_down: registry.guidance_target.get().end.down,
            control_chain: registry.flight_status.get().control_chain,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AutoTakeoffFsm {
    state: AutoTakeoffState,
    run_count: u32,
    timeout_count: u32,
    bound_thrust_min: f32,
    bound_thrust_max: f32,
    thrust_limit: f32,
    ramp_step: f32,
    ramp_target: f32,
    expected_north: f32,
    expected_east: f32,
    low_altitude: bool,
    altitude_hold: bool,
    zero_stabi_horizontal: bool,
    constrain_thrust: bool,
    takeoff_location: TakeoffLocation,
    status: AutoTakeoffStatus,
}

impl Default for AutoTakeoffFsm {
    fn default() -> Self {
        Self::new()
    }
}

impl AutoTakeoffFsm {
    pub const fn new() -> Self {
        AutoTakeoffFsm {
            state: AutoTakeoffState::Inactive,
            run_count: 0,
            timeout_count: 0,
            bound_thrust_min: 0.0,
            bound_thrust_max: 0.0,
            thrust_limit: 0.0,
            ramp_step: 0.0,
            ramp_target: 0.0,
            expected_north: 0.0,
            expected_east: 0.0,
            low_altitude: false,
            altitude_hold: false,
            zero_stabi_horizontal: false,
            constrain_thrust: false,
            takeoff_location: TakeoffLocation::const_default(),
            status: AutoTakeoffStatus::const_default(),
        }
    }

    pub fn state(&self) -> AutoTakeoffState {
        self.state
    }

    pub fn status(&self) -> &AutoTakeoffStatus {
        &self.status
    }

    /// Whether the altitude should be held rather than climbed to.
    pub fn position_hold_state(&self) -> bool {
        self.altitude_hold
    }

    pub fn zero_stabi_horizontal(&self) -> bool {
        self.zero_stabi_horizontal
    }

    /// Reset the sequence to a fresh, inactive state.
    pub fn inactive(&mut self, registry: &Registry) {
        *self = Self::new();
        self.set_state(AutoTakeoffState::Inactive, ExitReason::None, registry);
    }

    /// Prepare for a takeoff. A vehicle which already produces thrust, for
    /// example on a repeated mission loop, goes straight to hold.
    pub fn activate(&mut self, registry: &Registry) {
        *self = Self::new();
        self.low_altitude = true;
        self.zero_stabi_horizontal = true;
        self.takeoff_location = registry.takeoff_location.get();
        self.status.control_state = AutoTakeoffControlState::WaitForArmed;

        let inputs = Inputs::read(registry);
        self.assess_altitude(inputs.position.down);

        if inputs.thrust > inputs.limits.min {
            self.set_state(AutoTakeoffState::Hold, ExitReason::None, registry);
        } else {
            self.set_state(AutoTakeoffState::Inactive, ExitReason::None, registry);
        }
    }

    /// Run one tick of the current state.
    pub fn update(&mut self, registry: &Registry) {
        self.run_count += 1;
        let timeout = self.timeout_count > 0 && self.run_count > self.timeout_count;

        let inputs = Inputs::read(registry);
        match self.state {
            AutoTakeoffState::Inactive | AutoTakeoffState::CheckState => {}
            AutoTakeoffState::SlowStart => self.run_slowstart(timeout, registry),
            AutoTakeoffState::ThrustUp => self.run_thrustup(timeout, registry),
            AutoTakeoffState::Takeoff => self.run_takeoff(&inputs, registry),
            AutoTakeoffState::Hold => {}
            AutoTakeoffState::ThrustDown => self.run_thrustdown(timeout, &inputs, registry),
            AutoTakeoffState::ThrustOff => {
                self.set_state(AutoTakeoffState::Disarmed, ExitReason::None, registry)
            }
            AutoTakeoffState::Disarmed => Self::raise_guidance_alarm(&inputs, registry),
        }

        if self.state != AutoTakeoffState::Inactive {
            self.assess_altitude(inputs.position.down);
        }
    }

    /// Apply a control state requested by the pilot-facing gate.
    pub fn set_control_state(&mut self, control_state: AutoTakeoffControlState, registry: &Registry) {
        self.status.control_state = control_state;
        let state = match control_state {
            AutoTakeoffControlState::WaitForArmed
            | AutoTakeoffControlState::WaitForMidThrottle
            | AutoTakeoffControlState::RequireUnarmedFirst => AutoTakeoffState::Inactive,
            AutoTakeoffControlState::Initiate => AutoTakeoffState::CheckState,
            AutoTakeoffControlState::PositionHold | AutoTakeoffControlState::Abort => {
                AutoTakeoffState::Hold
            }
        };
        self.set_state(state, ExitReason::None, registry);
    }

    /// Zero the horizontal stabilization output while the vehicle is not
    /// allowed to correct its position.
    pub fn constrain_stabi_desired(&self, desired: &mut StabilizationDesired) {
        if self.zero_stabi_horizontal {
            desired.roll = 0.0;
            desired.pitch = 0.0;
            desired.yaw = 0.0;
        }
    }

    /// Update the altitude state and return the altitude above the takeoff
    /// location.
    pub fn assess_altitude(&mut self, position_down: f32) -> f32 {
        let takeoff_down = if self.takeoff_location.valid {
            self.takeoff_location.position.down
        } else {
            0.0
        };

        let relative_down = position_down - takeoff_down;
        self.low_altitude = relative_down >= SLOWDOWN_HEIGHT;
        -relative_down
    }

    fn set_state(&mut self, state: AutoTakeoffState, reason: ExitReason, registry: &Registry) {
        self.status.exit_reason[self.state.index()] = reason;
        if self.state == state {
            return;
        }

        debug!("Auto-takeoff state {:?} -> {:?}", self.state, state);
        self.state = state;

        let inputs = Inputs::read(registry);
        if state != AutoTakeoffState::Inactive {
            self.status.altitude_at_state[state.index()] =
                self.assess_altitude(inputs.position.down);
        }

        self.run_count = 0;
        self.timeout_count = 0;

        match state {
            AutoTakeoffState::Inactive => self.setup_inactive(),
            AutoTakeoffState::CheckState => self.setup_checkstate(&inputs, registry),
            AutoTakeoffState::SlowStart => self.setup_slowstart(&inputs),
            AutoTakeoffState::ThrustUp => self.setup_thrustup(&inputs),
            AutoTakeoffState::Takeoff => self.zero_stabi_horizontal = false,
            AutoTakeoffState::Hold => {
                self.zero_stabi_horizontal = false;
                self.altitude_hold = true;
            }
            AutoTakeoffState::ThrustDown => self.setup_thrustdown(&inputs),
            AutoTakeoffState::ThrustOff => self.setup_thrustoff(),
            AutoTakeoffState::Disarmed => {
                self.setup_thrustoff();
                self.zero_stabi_horizontal = true;
                Self::raise_guidance_alarm(&inputs, registry);
            }
        }

        self.publish_status(registry);
    }

    fn publish_status(&mut self, registry: &Registry) {
        self.status.state = self.state;
        self.status.altitude_state = if self.low_altitude {
            AltitudeState::Low
        } else {
            AltitudeState::High
        };
        registry.autotakeoff_status.send(self.status);
    }

    fn raise_guidance_alarm(inputs: &Inputs, registry: &Registry) {
        if !inputs.control_chain.contains(ControlChain::PATH_PLANNER) {
            registry
                .alarms
                .modify(|alarms| alarms.guidance = AlarmSeverity::Critical);
        }
    }

    fn setup_inactive(&mut self) {
        self.zero_stabi_horizontal = false;
        self.constrain_thrust = false;
    }

    fn setup_checkstate(&mut self, inputs: &Inputs, registry: &Registry) {
        // Already flying, treat as a position hold
        if inputs.thrust > inputs.limits.min {
            self.set_state(AutoTakeoffState::Hold, ExitReason::None, registry);
            return;
        }

        // Start from enforced zero thrust
        self.constrain_thrust = false;
        self.bound_thrust_min = -0.1;
        self.bound_thrust_max = 0.0;
        self.set_state(AutoTakeoffState::SlowStart, ExitReason::Timeout, registry);
    }

    fn setup_slowstart(&mut self, inputs: &Inputs) {
        self.timeout_count = TIMEOUT_SLOWSTART;
        self.zero_stabi_horizontal = true;

        let ceiling = inputs.limits.min.max(SLOWSTART_INITIAL_THRUST);
        self.ramp_step = (ceiling - SLOWSTART_INITIAL_THRUST) / TIMEOUT_SLOWSTART as f32;
        self.ramp_target = ceiling;
        self.bound_thrust_min = SLOWSTART_INITIAL_THRUST;
        self.bound_thrust_max = SLOWSTART_INITIAL_THRUST;

        self.expected_north = inputs.position.north;
        self.expected_east = inputs.position.east;
    }

    fn run_slowstart(&mut self, timeout: bool, registry: &Registry) {
        self.bound_thrust_min = (self.bound_thrust_min + self.ramp_step).min(self.ramp_target);
        self.bound_thrust_max = (self.bound_thrust_max + self.ramp_step).min(self.ramp_target);

        if timeout {
            self.set_state(AutoTakeoffState::ThrustUp, ExitReason::Timeout, registry);
        }
    }

    fn setup_thrustup(&mut self, inputs: &Inputs) {
        self.timeout_count = TIMEOUT_THRUSTUP;
        self.zero_stabi_horizontal = false;
        self.ramp_target = THRUSTUP_FINAL_RATIO * inputs.limits.max;
        self.ramp_step = (self.ramp_target - self.bound_thrust_max) / TIMEOUT_THRUSTUP as f32;
        self.bound_thrust_min = inputs.limits.min;
    }

    fn run_thrustup(&mut self, timeout: bool, registry: &Registry) {
        self.bound_thrust_max = (self.bound_thrust_max + self.ramp_step).min(self.ramp_target);

        if timeout {
            self.set_state(AutoTakeoffState::Takeoff, ExitReason::Timeout, registry);
        }
    }

    fn run_takeoff(&mut self, inputs: &Inputs, registry: &Registry) {
        if inputs.thrust < 0.0 {
            self.set_state(AutoTakeoffState::ThrustOff, ExitReason::ZeroThrust, registry);
            return;
        }

        // Broad sideways drift
        let north_error = self.expected_north - inputs.position.north;
        let east_error = self.expected_east - inputs.position.east;
        if (north_error * north_error + east_error * east_error).sqrt() > MAX_POSITION_ERROR {
            self.set_state(AutoTakeoffState::ThrustDown, ExitReason::PositionError, registry);
            return;
        }

        if (inputs.target_down - inputs.position.down).abs() < ARRIVAL_TOLERANCE {
            self.set_state(AutoTakeoffState::Hold, ExitReason::ArrivedAtAlt, registry);
        }
    }

    fn setup_thrustdown(&mut self, inputs: &Inputs) {
        self.timeout_count = TIMEOUT_THRUSTDOWN;
        self.zero_stabi_horizontal = true;
        self.constrain_thrust = true;
        self.thrust_limit = inputs.thrust;
        self.ramp_step = inputs.thrust / TIMEOUT_THRUSTDOWN as f32;
        self.bound_thrust_min = -0.1;
        self.bound_thrust_max = inputs.limits.neutral;
    }

    fn run_thrustdown(&mut self, timeout: bool, inputs: &Inputs, registry: &Registry) {
        self.thrust_limit -= self.ramp_step;

        if inputs.thrust < 0.0 || self.thrust_limit < 0.0 {
            self.set_state(AutoTakeoffState::ThrustOff, ExitReason::ZeroThrust, registry);
        }

        if timeout {
            self.set_state(AutoTakeoffState::ThrustOff, ExitReason::Timeout, registry);
        }
    }

    fn setup_thrustoff(&mut self) {
        self.thrust_limit = -1.0;
        self.constrain_thrust = true;
        self.bound_thrust_min = -0.1;
        self.bound_thrust_max = 0.0;
    }
}

impl VerticalBounds for AutoTakeoffFsm {
    fn bound_thrust(&self, _min: f32, _max: f32) -> (f32, f32) {
        let max = if self.constrain_thrust {
            self.thrust_limit
        } else {
            self.bound_thrust_max
        };
        (self.bound_thrust_min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn initiated(registry: &Registry) -> AutoTakeoffFsm {
        let mut fsm = AutoTakeoffFsm::new();
        fsm.activate(registry);
        assert_eq!(fsm.state(), AutoTakeoffState::Inactive);
        fsm.set_control_state(AutoTakeoffControlState::Initiate, registry);
        fsm
    }

    #[test]
    fn airborne_activation_holds() {
        let registry = Registry::new();
        registry.stabilization_desired.modify(|d| d.thrust = 0.5);

        let mut fsm = AutoTakeoffFsm::new();
        fsm.activate(&registry);
        assert_eq!(fsm.state(), AutoTakeoffState::Hold);
        assert!(fsm.position_hold_state());
        assert_eq!(registry.autotakeoff_status.get().state, AutoTakeoffState::Hold);
    }

    #[test]
    fn initiate_passes_through_checkstate() {
        let registry = Registry::new();
        let fsm = initiated(&registry);

        assert_eq!(fsm.state(), AutoTakeoffState::SlowStart);
        let status = registry.autotakeoff_status.get();
        assert_eq!(status.state, AutoTakeoffState::SlowStart);
        assert_eq!(status.control_state, AutoTakeoffControlState::Initiate);
        assert_eq!(
            status.exit_reason[AutoTakeoffState::CheckState.index()],
            ExitReason::Timeout
        );
        assert_eq!(fsm.bound_thrust(0.0, 1.0), (0.05, 0.05));
        assert!(fsm.zero_stabi_horizontal());
    }

    #[test]
    fn thrust_ramps_are_monotonic() {
        let registry = Registry::new();
        let limits = registry.path_follower_settings.get().thrust_limits;
        let mut fsm = initiated(&registry);

        let mut last = fsm.bound_thrust(0.0, 1.0);
        for _ in 0..TIMEOUT_SLOWSTART {
            fsm.update(&registry);
            let bounds = fsm.bound_thrust(0.0, 1.0);
            assert!(bounds.0 >= last.0 && bounds.1 >= last.1);
            assert!(bounds.0 <= limits.min && bounds.1 <= limits.min);
            last = bounds;
        }
        assert_eq!(fsm.state(), AutoTakeoffState::SlowStart);
        assert_relative_eq!(last.1, limits.min, epsilon = 1e-5);

        fsm.update(&registry);
        assert_eq!(fsm.state(), AutoTakeoffState::ThrustUp);
        assert!(!fsm.zero_stabi_horizontal());

        let mut last = fsm.bound_thrust(0.0, 1.0);
        assert_relative_eq!(last.0, limits.min);
        for _ in 0..TIMEOUT_THRUSTUP {
            fsm.update(&registry);
            let bounds = fsm.bound_thrust(0.0, 1.0);
            assert!(bounds.1 >= last.1);
            assert!(bounds.1 <= THRUSTUP_FINAL_RATIO * limits.max + 1e-6);
            last = bounds;
        }
        assert_relative_eq!(last.1, THRUSTUP_FINAL_RATIO * limits.max, epsilon = 1e-5);

        fsm.update(&registry);
        assert_eq!(fsm.state(), AutoTakeoffState::Takeoff);
    }

    #[test]
    fn slowstart_never_exceeds_min_thrust() {
        for percent in 6..90u8 {
            let registry = Registry::new();
            let min = percent as f32 / 100.0;
            registry.path_follower_settings.modify(|s| {
                s.thrust_limits.min = min;
                s.thrust_limits.neutral = s.thrust_limits.neutral.max(min);
            });

            let mut fsm = initiated(&registry);
            for _ in 0..TIMEOUT_SLOWSTART {
                fsm.update(&registry);
                let (low, high) = fsm.bound_thrust(0.0, 1.0);
                assert!(low <= min && high <= min, "min {}: ({}, {})", min, low, high);
            }
        }
    }

    fn in_takeoff(registry: &Registry) -> AutoTakeoffFsm {
        let mut fsm = initiated(registry);
        for _ in 0..=(TIMEOUT_SLOWSTART + TIMEOUT_THRUSTUP + 1) {
            fsm.update(registry);
        }
        assert_eq!(fsm.state(), AutoTakeoffState::Takeoff);
        fsm
    }

    #[test]
    fn arrives_at_altitude() {
        let registry = Registry::new();
        registry.guidance_target.modify(|t| t.end.down = -2.5);
        let mut fsm = in_takeoff(&registry);
        registry.stabilization_desired.modify(|d| d.thrust = 0.6);

        registry.position.modify(|p| p.down = -1.0);
        fsm.update(&registry);
        assert_eq!(fsm.state(), AutoTakeoffState::Takeoff);

        registry.position.modify(|p| p.down = -2.2);
        fsm.update(&registry);
        assert_eq!(fsm.state(), AutoTakeoffState::Hold);
        assert!(fsm.position_hold_state());

        let status = registry.autotakeoff_status.get();
        assert_eq!(
            status.exit_reason[AutoTakeoffState::Takeoff.index()],
            ExitReason::ArrivedAtAlt
        );
        assert_relative_eq!(status.altitude_at_state[AutoTakeoffState::Hold.index()], 2.2);
    }

    #[test]
    fn drift_aborts_to_disarmed() {
        let registry = Registry::new();
        registry.guidance_target.modify(|t| t.end.down = -2.5);
        let mut fsm = in_takeoff(&registry);
        registry.stabilization_desired.modify(|d| d.thrust = 0.6);

        registry.position.modify(|p| {
            p.north = 3.0;
            p.east = 1.0;
        });
        fsm.update(&registry);
        assert_eq!(fsm.state(), AutoTakeoffState::ThrustDown);
        assert!(fsm.zero_stabi_horizontal());

        let limits = registry.path_follower_settings.get().thrust_limits;
        let (min, max) = fsm.bound_thrust(0.0, 1.0);
        assert_relative_eq!(min, -0.1);
        assert_relative_eq!(max, 0.6);

        // The thrust limit is ramped toward zero
        let mut last = max;
        for _ in 0..TIMEOUT_THRUSTDOWN - 1 {
            fsm.update(&registry);
            let (_, max) = fsm.bound_thrust(0.0, 1.0);
            assert!(max < last && max <= limits.max);
            last = max;
        }
        for _ in 0..3 {
            if fsm.state() != AutoTakeoffState::ThrustDown {
                break;
            }
            fsm.update(&registry);
        }
        assert_eq!(fsm.state(), AutoTakeoffState::ThrustOff);
        assert_eq!(fsm.bound_thrust(0.0, 1.0), (-0.1, -1.0));

        fsm.update(&registry);
        assert_eq!(fsm.state(), AutoTakeoffState::Disarmed);
        assert_eq!(registry.alarms.get().guidance, AlarmSeverity::Critical);
    }

    #[test]
    fn zero_thrust_switches_off() {
        let registry = Registry::new();
        let mut fsm = in_takeoff(&registry);

        registry.stabilization_desired.modify(|d| d.thrust = -0.05);
        fsm.update(&registry);
        assert_eq!(fsm.state(), AutoTakeoffState::ThrustOff);
        assert_eq!(
            registry.autotakeoff_status.get().exit_reason[AutoTakeoffState::Takeoff.index()],
            ExitReason::ZeroThrust
        );
    }

    #[test]
    fn path_planner_suppresses_alarm() {
        let registry = Registry::new();
        registry
            .flight_status
            .modify(|s| s.control_chain = ControlChain::STABILIZATION | ControlChain::PATH_PLANNER);
        let mut fsm = in_takeoff(&registry);

        registry.stabilization_desired.modify(|d| d.thrust = -0.05);
        fsm.update(&registry);
        fsm.update(&registry);
        fsm.update(&registry);
        assert_eq!(fsm.state(), AutoTakeoffState::Disarmed);
        assert_eq!(registry.alarms.get().guidance, AlarmSeverity::Uninitialised);
    }

    #[test]
    fn control_state_mapping() {
        let registry = Registry::new();
        let mut fsm = in_takeoff(&registry);

        fsm.set_control_state(AutoTakeoffControlState::Abort, &registry);
        assert_eq!(fsm.state(), AutoTakeoffState::Hold);

        fsm.set_control_state(AutoTakeoffControlState::WaitForArmed, &registry);
        assert_eq!(fsm.state(), AutoTakeoffState::Inactive);
        assert!(!fsm.zero_stabi_horizontal());
    }

    #[test]
    fn horizontal_output_is_zeroed() {
        let registry = Registry::new();
        let fsm = initiated(&registry);

        let mut desired = StabilizationDesired {
            roll: 5.0,
            pitch: -3.0,
            yaw: 1.0,
            thrust: 0.1,
        };
        fsm.constrain_stabi_desired(&mut desired);
        assert_eq!((desired.roll, desired.pitch, desired.yaw), (0.0, 0.0, 0.0));
        assert_relative_eq!(desired.thrust, 0.1);
    }

    #[test]
    fn altitude_relative_to_valid_takeoff() {
        let registry = Registry::new();
        registry.takeoff_location.send(TakeoffLocation {
            position: Ned::new(0.0, 0.0, -100.0),
            valid: true,
        });
        registry.position.modify(|p| p.down = -107.0);

        let mut fsm = AutoTakeoffFsm::new();
        fsm.activate(&registry);
        assert_relative_eq!(fsm.assess_altitude(-107.0), 7.0);
        assert_eq!(registry.autotakeoff_status.get().altitude_state, AltitudeState::Low);

        fsm.set_control_state(AutoTakeoffControlState::PositionHold, &registry);
        assert_eq!(registry.autotakeoff_status.get().altitude_state, AltitudeState::High);
    }
}
