//! Guidance targets for the assisted and automatic flight modes. Every mode
//! has a `setup` stage, run once when the mode is engaged, and optionally a
//! `run` stage, run every tick after that. Each stage publishes a single
//! [`GuidanceTarget`].

use embassy_time::Instant;
use nalgebra::Vector3;
#[allow(unused_imports)]
use num_traits::Float;

use super::stick::{apply_expo, normalize_deadband, ControlVector};
use crate::filters::{DeltaTime, Lowpass};
use crate::signals::Registry;
use crate::types::flight_mode::{AssistedControlState, FlightMode};
use crate::types::guidance::{
    GuidanceTarget, LandOption, PathMode, AUTOTAKEOFF_CONTROL_STATE, BRAKE_TIMEOUT,
    GOTO_ENDPOINT_NEXT_COMMAND, LAND_OPTIONS,
};
use crate::types::measurements::Ned;
use crate::types::status::AutoTakeoffControlState;
use crate::utils::trig::{cos_deg, sin_deg};

/// Minimum brake deceleration [m/s^2]
const BRAKE_RATE_MINIMUM: f32 = 0.2;
const TIME_TO_STOP_MINIMUM: f32 = 0.2;
const TIME_TO_STOP_MAXIMUM: f32 = 9.0;
/// Time allowed to rotate into a braking attitude [s]
const DELAY_TO_BRAKE: f32 = 1.0;
/// The achieved deceleration can be well below the desired one
const BRAKE_TIMEOUT_MULTIPLIER: f32 = 4.0;

/// Throttle stick position which starts an auto-takeoff
const TAKEOFF_THROTTLE_THRESHOLD: f32 = 0.3;

/// Heading change rate of auto-cruise at full yaw stick [deg/s]
const CRUISE_TURN_RATE: f32 = 10.0;

const CRUISE_DT_EXPECTED: f32 = 0.02;
const CRUISE_DT_MIN: f32 = 1e-6;
const CRUISE_DT_MAX: f32 = 1.0;
const CRUISE_DT_ALPHA: f32 = 0.01;

/// Frame in which the stick of a position vario mode is interpreted.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VarioFrame {
    /// Heading at the time the mode was engaged
    Course,
    /// Live heading of the vehicle
    FirstPerson,
    /// Line of sight from the takeoff location
    LineOfSight,
    /// Fixed north-east axes
    NorthEast,
}

impl VarioFrame {
    pub const fn from_flight_mode(mode: FlightMode) -> Option<Self> {
        match mode {
            FlightMode::CourseLock => Some(VarioFrame::Course),
            FlightMode::PositionRoam => Some(VarioFrame::FirstPerson),
            FlightMode::HomeLeash => Some(VarioFrame::LineOfSight),
            FlightMode::AbsolutePosition => Some(VarioFrame::NorthEast),
            _ => None,
        }
    }
}

/// Target which holds `end`, with the start point offset the way every hold
/// target is. The direction of the offset is irrelevant to the follower.
fn hold_at(target: &mut GuidanceTarget, end: Ned, horizontal_offset: f32) {
    target.end = end;
    target.start = end.offset_north(horizontal_offset);
}

/// Hold the current position.
pub fn setup_position_hold(registry: &Registry) {
    let position = registry.position.get();
    let offset = registry.flight_mode_settings.get().position_hold_offset;

    let mut target = GuidanceTarget::const_default();
    hold_at(&mut target, position, offset.horizontal);
    target.mode = PathMode::GotoEndpoint;
    registry.guidance_target.send(target);
}

/// Fly to the takeoff location, climbing above the higher of the current
/// and takeoff altitude.
pub fn setup_return_to_base(registry: &Registry) {
    let position = registry.position.get();
    let takeoff = registry.takeoff_location.get().position;
    let settings = registry.flight_mode_settings.get();

    let destination_down =
        position.down.min(takeoff.down) - settings.return_to_base_altitude_offset;

    let mut target = GuidanceTarget::const_default();
    hold_at(
        &mut target,
        Ned::new(takeoff.north, takeoff.east, destination_down),
        settings.position_hold_offset.horizontal,
    );
    target.starting_velocity = settings.return_to_base_velocity;
    target.ending_velocity = settings.return_to_base_velocity;
    target.mode_parameters[GOTO_ENDPOINT_NEXT_COMMAND] =
        settings.return_to_base_next_command as u8 as f32;
    target.mode = PathMode::GotoEndpoint;
    registry.guidance_target.send(target);
}

/// Climb vertically by the configured takeoff height.
pub fn setup_auto_takeoff(registry: &Registry) {
    let position = registry.position.get();
    let height = registry.flight_mode_settings.get().auto_takeoff_height.abs();

    let mut target = GuidanceTarget::const_default();
    target.start = position;
    target.end = Ned::new(position.north, position.east, position.down - height);
    target.mode_parameters[AUTOTAKEOFF_CONTROL_STATE] =
        AutoTakeoffControlState::WaitForArmed as u8 as f32;
    target.mode = PathMode::AutoTakeoff;
    registry.guidance_target.send(target);
}

/// Advance the pilot-facing gate of an auto-takeoff target: arm, then raise
/// the throttle to start the sequence.
pub fn run_auto_takeoff(registry: &Registry) {
    let target = registry.guidance_target.get();
    if target.mode != PathMode::AutoTakeoff {
        return;
    }

    let control_state = target
        .parameter_as::<AutoTakeoffControlState>(AUTOTAKEOFF_CONTROL_STATE)
        .unwrap_or(AutoTakeoffControlState::WaitForArmed);
    let armed = registry.flight_status.get().armed;
    let throttle = registry.manual_control.get().throttle;

    let next = match control_state {
        AutoTakeoffControlState::WaitForArmed if armed => {
            AutoTakeoffControlState::WaitForMidThrottle
        }
        AutoTakeoffControlState::WaitForMidThrottle if throttle > TAKEOFF_THROTTLE_THRESHOLD => {
            AutoTakeoffControlState::Initiate
        }
        AutoTakeoffControlState::RequireUnarmedFirst if !armed => {
            AutoTakeoffControlState::WaitForArmed
        }
        unchanged => unchanged,
    };

    if next != control_state {
        debug!("Auto-takeoff control state {:?} -> {:?}", control_state, next);
        registry
            .guidance_target
            .modify(|t| t.mode_parameters[AUTOTAKEOFF_CONTROL_STATE] = next as u8 as f32);
    }
}

fn land_target(registry: &Registry) -> GuidanceTarget {
    let position = registry.position.get();
    let landing_velocity = registry.flight_mode_settings.get().landing_velocity;

    let mut target = GuidanceTarget::const_default();
    target.start = position;
    target.end = position;
    target.mode_parameters = [
        0.0,
        0.0,
        landing_velocity,
        LandOption::HorizontalPositionHold as u8 as f32,
    ];
    target.mode = PathMode::Land;
    target
}

/// Descend at the landing velocity while holding the horizontal position.
pub fn setup_land(registry: &Registry) {
    registry.guidance_target.send(land_target(registry));
}

/// Land after the pilot releases the sticks in velocity roam, skipping the
/// brake stage so the descent continues.
pub fn setup_land_from_velocity_roam(registry: &Registry) {
    setup_land(registry);
    registry
        .flight_status
        .modify(|s| s.assisted_control_state = AssistedControlState::Hold);
}

/// Brake from the current velocity toward a standstill, and enter the brake
/// stage of assisted control.
pub fn setup_assisted_control(registry: &Registry) {
    let position = registry.position.get().to_vector();
    let velocity = registry.velocity.get().to_vector();
    let brake_rate = registry
        .path_follower_settings
        .get()
        .brake_rate
        .max(BRAKE_RATE_MINIMUM);

    let speed = velocity.norm();
    let time_to_stop =
        (DELAY_TO_BRAKE + speed / brake_rate).clamp(TIME_TO_STOP_MINIMUM, TIME_TO_STOP_MAXIMUM);

    // Constant velocity while rotating, then a linear deceleration
    let delta = velocity * DELAY_TO_BRAKE + velocity * ((time_to_stop - DELAY_TO_BRAKE) * 0.5);

    let mut target = GuidanceTarget::const_default();
    target.start = Ned::from_vector(&position);
    target.end = Ned::from_vector(&(position + delta));
    target.starting_velocity = speed;
    target.ending_velocity = 0.0;
    target.mode_parameters = [velocity.x, velocity.y, velocity.z, 0.0];
    target.mode_parameters[BRAKE_TIMEOUT] = time_to_stop * BRAKE_TIMEOUT_MULTIPLIER;
    target.mode = PathMode::Brake;

    registry
        .flight_status
        .modify(|s| s.assisted_control_state = AssistedControlState::Brake);
    registry.guidance_target.send(target);
}

/// Finish a brake, either because the vehicle stopped or the brake timed
/// out, by holding the current position.
pub fn complete_brake(registry: &Registry) {
    setup_position_hold(registry);
    registry
        .flight_status
        .modify(|s| s.assisted_control_state = AssistedControlState::Hold);
}

/// Stick-driven velocity control, rotated into the heading of the vehicle.
pub fn run_velocity_roam(registry: &Registry) {
    let status = registry.flight_status.get();
    let expo = registry.stabilization_settings.get().stick_expo;
    let command = registry.manual_control.get();

    let roll = apply_expo(command.roll, expo.roll as f32);
    let pitch = apply_expo(command.pitch, expo.pitch as f32);
    let landing = status.flight_mode == FlightMode::Land;

    if roll.abs() <= 0.0 && pitch.abs() <= 0.0 {
        // Nothing to do while braking or holding
        if status.assisted_control_state == AssistedControlState::Primary {
            if landing {
                setup_land_from_velocity_roam(registry);
            } else {
                setup_assisted_control(registry);
            }
        }
        return;
    }

    let position = registry.position.get();
    let follower = registry.path_follower_settings.get();

    let angle = registry.attitude.get().yaw.to_radians();
    let (sin, cos) = (angle.sin(), angle.cos());
    let north = (-pitch * cos - roll * sin) * follower.horizontal_vel_max;
    let east = (-pitch * sin + roll * cos) * follower.horizontal_vel_max;
    let down = if landing {
        registry.flight_mode_settings.get().landing_velocity
    } else {
        0.0
    };
    let speed = (north * north + east * east).sqrt();

    let mut target = GuidanceTarget::const_default();
    target.start = position;
    target.end = position;
    target.starting_velocity = speed;
    target.ending_velocity = speed;
    target.mode_parameters = [north, east, down, 0.0];
    target.mode = PathMode::Velocity;
    if landing {
        target.mode = PathMode::Land;
        target.mode_parameters[LAND_OPTIONS] = LandOption::None as u8 as f32;
    }

    registry.guidance_target.send(target);
    registry
        .flight_status
        .modify(|s| s.assisted_control_state = AssistedControlState::Primary);
}

/// State carried between the ticks of the stick-driven modes.
#[derive(Debug, Clone)]
pub struct PlanGenerator {
    vario_hold: bool,
    hold_position: Ned,
    vario_lowpass: [Lowpass<f32>; 3],
    vario_course: f32,
    cruise_dt: DeltaTime,
}

impl Default for PlanGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanGenerator {
    pub fn new() -> Self {
        PlanGenerator {
            vario_hold: true,
            hold_position: Ned::const_default(),
            vario_lowpass: [Lowpass::from_smoothing(0.0); 3],
            vario_course: 0.0,
            cruise_dt: DeltaTime::new(
                CRUISE_DT_EXPECTED,
                CRUISE_DT_MIN,
                CRUISE_DT_MAX,
                CRUISE_DT_ALPHA,
            ),
        }
    }

    fn reset_vario_lowpass(&mut self) {
        for lowpass in self.vario_lowpass.iter_mut() {
            lowpass.reset(0.0);
        }
    }

    /// Engage a position vario mode at the current position.
    pub fn setup_position_vario(&mut self, registry: &Registry) {
        self.vario_hold = true;
        self.reset_vario_lowpass();
        self.vario_course = registry.attitude.get().yaw;
        setup_position_hold(registry);
    }

    /// Move the held position along the stick direction. When the sticks are
    /// released the vehicle holds the point it had reached.
    pub fn run_position_vario(&mut self, frame: VarioFrame, registry: &Registry) {
        // Reuse the target from the setup stage
        let mut target = registry.guidance_target.get();
        let settings = registry.flight_mode_settings.get();
        let offset = settings.position_hold_offset;
        let command = registry.manual_control.get();

        let mut filtered = [0.0; 3];
        for ((lowpass, input), output) in self
            .vario_lowpass
            .iter_mut()
            .zip([command.roll, command.pitch, command.yaw])
            .zip(filtered.iter_mut())
        {
            lowpass.set_smoothing(settings.vario_control_lowpass_alpha);
            *output = lowpass.update(input);
        }

        let mut control = ControlVector {
            roll: filtered[0],
            pitch: filtered[1],
            yaw: filtered[2],
            thrust: command.thrust,
        };

        if !normalize_deadband(&mut control) {
            if !self.vario_hold {
                self.vario_hold = true;
                hold_at(&mut target, self.hold_position, offset.horizontal);
                registry.guidance_target.send(target);
            }
            return;
        }

        // Pitch forward points north
        control.pitch = -control.pitch;
        let (direction, length) = self.vario_vector(&control, frame, registry);

        let mut hold = self.hold_position.to_vector();
        if self.vario_hold {
            self.vario_hold = false;
            hold = target.end.to_vector();
        } else {
            // Advance along the direction of travel only
            let progress = (registry.position.get().to_vector() - hold).dot(&direction);
            if progress > 0.0 {
                hold += direction * progress;
            }
        }
        self.hold_position = Ned::from_vector(&hold);

        hold_at(
            &mut target,
            Ned::from_vector(&(hold + direction * length)),
            offset.horizontal,
        );
        registry.guidance_target.send(target);
    }

    /// Unit direction of travel in the NED frame, and the distance to place
    /// the target along it.
    fn vario_vector(
        &self,
        control: &ControlVector,
        frame: VarioFrame,
        registry: &Registry,
    ) -> (Vector3<f32>, f32) {
        let offset = registry.flight_mode_settings.get().position_hold_offset;

        // Vertical travel is less sensitive than horizontal
        let climb = control.thrust * offset.vertical / offset.horizontal;
        let mut length =
            (control.roll * control.roll + control.pitch * control.pitch + climb * climb).sqrt();
        if length <= 1e-9 {
            length = 1.0;
        }
        let (north, east, up) = (control.pitch / length, control.roll / length, climb / length);

        let angle = match frame {
            VarioFrame::Course => self.vario_course,
            VarioFrame::FirstPerson => registry.attitude.get().yaw,
            VarioFrame::LineOfSight => {
                let position = registry.position.get();
                let takeoff = registry.takeoff_location.get().position;
                (position.east - takeoff.east)
                    .atan2(position.north - takeoff.north)
                    .to_degrees()
            }
            VarioFrame::NorthEast => 0.0,
        };

        let (sin, cos) = (sin_deg(angle), cos_deg(angle));
        let direction = Vector3::new(north * cos - east * sin, north * sin + east * cos, -up);
        (direction, length * offset.horizontal)
    }

    pub fn setup_velocity_roam(&mut self, registry: &Registry) {
        self.reset_vario_lowpass();
        self.vario_course = registry.attitude.get().yaw;
    }

    /// Cruise in the direction of the nose.
    pub fn setup_auto_cruise(&mut self, registry: &Registry) {
        let position = registry.position.get();
        let offset = registry.flight_mode_settings.get().position_hold_offset;
        let yaw = registry.attitude.get().yaw;

        self.hold_position = position;

        let mut target = GuidanceTarget::const_default();
        hold_at(
            &mut target,
            Ned::new(
                position.north + cos_deg(yaw),
                position.east + sin_deg(yaw),
                position.down,
            ),
            offset.horizontal,
        );
        target.mode = PathMode::GotoEndpoint;
        registry.guidance_target.send(target);

        // The average is stale if another mode was flown in between
        self.cruise_dt.reset();
    }

    /// Steer the cruise heading with the yaw stick, the climb with the pitch
    /// stick, and scale the speed with thrust.
    pub fn run_auto_cruise(&mut self, registry: &Registry, now: Instant) {
        let position = registry.position.get().to_vector();
        let mut target = registry.guidance_target.get();
        let offset = registry.flight_mode_settings.get().position_hold_offset;
        let command = registry.manual_control.get();

        // Thrust is used for the speed and needs no deadband
        let mut control = ControlVector {
            roll: command.roll,
            pitch: command.pitch,
            yaw: command.yaw,
            thrust: 0.5,
        };
        normalize_deadband(&mut control);
        let speed = command.thrust.clamp(1e-6, 1.0);

        let mut hold = self.hold_position.to_vector();
        let mut heading = target.end.to_vector() - hold;
        let mut length = heading.norm();
        if length < 1e-9 {
            length = 1.0;
        }
        heading /= length;

        let progress = (position - hold).dot(&heading);
        if progress > 0.0 {
            hold += heading * progress;
        }
        self.hold_position = Ned::from_vector(&hold);

        let dt = self.cruise_dt.average_seconds(now);
        let angle = (heading.y.atan2(heading.x).to_degrees() + CRUISE_TURN_RATE * control.yaw * dt)
            .to_radians();

        let travel = Vector3::new(
            angle.cos() * offset.horizontal * speed,
            angle.sin() * offset.horizontal * speed,
            -control.pitch * offset.vertical * speed,
        );

        hold_at(&mut target, Ned::from_vector(&(hold + travel)), offset.horizontal);
        registry.guidance_target.send(target);
    }
}
