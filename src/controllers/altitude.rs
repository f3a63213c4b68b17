//! Cascaded altitude controller. An outer proportional loop turns a position
//! error into a vertical velocity set-point, and an inner [`Pid2`] loop turns
//! the velocity error into a thrust command. While the vehicle holds its
//! altitude, the integral term is sampled to learn the neutral (hover) thrust.

#[allow(unused_imports)]
use num_traits::Float;

use crate::consts::{GUIDANCE_DT, GUIDANCE_TICKS_PER_SECOND};
use crate::filters::pid2::{Pid2, Pid2Config};
use crate::types::status::VtolSelfTuningStats;

/// Stability limits of the neutral thrust estimate
const STABLE_POSITION_ERROR: f32 = 0.5;
const STABLE_VELOCITY_SETPOINT: f32 = 0.2;
const STABLE_VELOCITY_STATE: f32 = 0.2;
const STABLE_VELOCITY_ERROR: f32 = 0.1;

/// Stable ticks to wait before sampling the integral term
const NEUTRAL_THRUST_START_DELAY: u32 = 2 * GUIDANCE_TICKS_PER_SECOND;

/// Stable ticks after which the estimate is complete
const NEUTRAL_THRUST_END_COUNT: u32 = NEUTRAL_THRUST_START_DELAY + 4 * GUIDANCE_TICKS_PER_SECOND;

/// Factor between the derivative time and the derivative filter time constant
const DERIVATIVE_FILTER_FACTOR: f32 = 10.0;

/// Hooks through which a guidance state machine can shape the inner loop.
pub trait VerticalBounds {
    /// Bound the velocity set-point fed to the inner loop.
    fn bound_velocity_down(&self, velocity: f32) -> f32 {
        velocity
    }

    /// Narrow the thrust output bounds `(min, max)`.
    fn bound_thrust(&self, min: f32, max: f32) -> (f32, f32) {
        (min, max)
    }
}

/// One-shot estimate of the integral term during a hold.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct NeutralThrustEstimate {
    pub start_sampling: bool,
    pub count: u32,
    pub sum: f32,
    pub min: f32,
    pub max: f32,
    pub average: f32,
    pub correction: f32,
    pub have_correction: bool,
}

/// Outcome of a completed neutral thrust estimate.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NeutralThrustCorrection {
    /// Average of the integral term, removed from the integrator
    pub correction: f32,
    /// Integral term after the correction
    pub accumulator: f32,
    /// Spread of the integral term over the sample window
    pub range: f32,
}

impl NeutralThrustCorrection {
    /// Fold the correction into the self-tuning record.
    pub fn apply_to(&self, stats: &mut VtolSelfTuningStats) {
        stats.neutral_thrust_offset += self.correction;
        stats.neutral_thrust_correction = self.correction;
        stats.neutral_thrust_accumulator = self.accumulator;
        stats.neutral_thrust_range = self.range;
    }
}

#[derive(Debug, Clone)]
pub struct AltitudeController {
    pid: Pid2,
    position_kp: f32,
    dt: f32,
    velocity_max: f32,
    neutral: f32,
    min_thrust: f32,
    max_thrust: f32,
    position_setpoint: f32,
    position_state: f32,
    velocity_setpoint_target: f32,
    velocity_setpoint_current: f32,
    velocity_state: f32,
    down_command: f32,
    active: bool,
    estimate: NeutralThrustEstimate,
}

impl Default for AltitudeController {
    fn default() -> Self {
        Self::new()
    }
}

impl AltitudeController {
    pub fn new() -> Self {
        AltitudeController {
            pid: Pid2::new(),
            position_kp: 0.0,
            dt: GUIDANCE_DT,
            velocity_max: 1.0,
            neutral: 0.5,
            min_thrust: 0.1,
            max_thrust: 0.6,
            position_setpoint: 0.0,
            position_state: 0.0,
            velocity_setpoint_target: 0.0,
            velocity_setpoint_current: 0.0,
            velocity_state: 0.0,
            down_command: 0.0,
            active: false,
            estimate: NeutralThrustEstimate::default(),
        }
    }

    pub fn set_thrust_limits(&mut self, min_thrust: f32, max_thrust: f32) {
        self.min_thrust = min_thrust;
        self.max_thrust = max_thrust;
    }

    /// Program the inner velocity loop from PID gains. Near-zero gains are
    /// substituted rather than divided by.
    pub fn configure(&mut self, kp: f32, ki: f32, kd: f32, beta: f32, dt: f32, velocity_max: f32) {
        let td = if kp < 1e-6 { 1e6 } else { kd / kp };
        let kt = if ki < 1e-6 || kp < 1e-6 { 0.0 } else { ki / kp };
        let tf = if kd < 1e-6 {
            0.0
        } else {
            td / DERIVATIVE_FILTER_FACTOR
        };

        self.pid.configure(
            Pid2Config {
                kp,
                ki,
                kd,
                tf,
                kt,
                beta: beta.clamp(0.4, 1.0),
                u0: self.neutral,
                va: self.neutral,
                vb: -1.0,
            },
            dt,
        );
        self.dt = dt;
        self.velocity_max = velocity_max;
    }

    /// Gain of the outer, proportional only, position loop.
    pub fn update_positional_parameters(&mut self, kp: f32) {
        self.position_kp = kp;
    }

    pub fn update_position_setpoint(&mut self, setpoint_down: f32) {
        self.position_setpoint = setpoint_down;
    }

    /// Engage a new altitude hold from `state_down`, restarting the neutral
    /// thrust estimate.
    pub fn update_position_state(&mut self, state_down: f32) {
        self.position_state = state_down;
        self.setup_neutral_thrust_calc();
    }

    /// Run the outer loop toward `target_down`, and advance the neutral
    /// thrust estimate. Returns the correction once an estimate completes.
    pub fn control_position(
        &mut self,
        target_down: f32,
        state_down: f32,
    ) -> Option<NeutralThrustCorrection> {
        self.position_setpoint = target_down;
        self.position_state = state_down;

        let velocity = self.position_kp * (self.position_setpoint - self.position_state);
        self.update_velocity_setpoint(velocity);

        self.run_neutral_thrust_calc()
    }

    /// Follow the vertical component of a path, correcting the cross-track
    /// error with the outer loop.
    pub fn control_position_with_path(&mut self, path_vector_down: f32, correction_down: f32) {
        let velocity = path_vector_down + self.position_kp * correction_down;
        self.update_velocity_setpoint(velocity);
    }

    /// Clamp the magnitude of the velocity set-point, keeping its sign.
    pub fn update_velocity_setpoint(&mut self, setpoint: f32) {
        self.velocity_setpoint_target = if setpoint.abs() > self.velocity_max {
            self.velocity_max.copysign(setpoint)
        } else {
            setpoint
        };
    }

    pub fn update_velocity_state(&mut self, velocity_down: f32, bounds: Option<&dyn VerticalBounds>) {
        self.velocity_state = velocity_down;
        self.velocity_setpoint_current = match bounds {
            Some(bounds) => bounds.bound_velocity_down(self.velocity_setpoint_target),
            None => self.velocity_setpoint_target,
        };
    }

    pub fn update_velocity_state_with_brake(
        &mut self,
        velocity_down: f32,
        path_time: f32,
        brake_rate: f32,
    ) {
        self.velocity_state = velocity_down;
        self.velocity_setpoint_current = Self::update_brake_velocity(
            self.velocity_setpoint_target,
            path_time,
            brake_rate,
            velocity_down,
        );
    }

    /// Velocity reached after braking from `starting` for `dt` seconds at
    /// `brake_rate`. The result never crosses zero and is never further from
    /// zero than the measured `current` velocity.
    pub fn update_brake_velocity(starting: f32, dt: f32, brake_rate: f32, current: f32) -> f32 {
        if starting >= 0.0 {
            (starting - dt * brake_rate).min(current).max(0.0)
        } else {
            (starting + dt * brake_rate).max(current).min(0.0)
        }
    }

    pub fn velocity_desired(&self) -> f32 {
        self.velocity_setpoint_current
    }

    /// Run the inner loop and return the thrust command.
    pub fn get_command(&mut self, bounds: Option<&dyn VerticalBounds>) -> f32 {
        let (low, high) = match bounds {
            Some(bounds) => bounds.bound_thrust(self.min_thrust, self.max_thrust),
            None => (self.min_thrust, self.max_thrust),
        };

        self.down_command = self.pid.update(
            self.velocity_setpoint_current,
            self.velocity_state,
            low,
            high,
        );
        self.down_command
    }

    /// Take over from `current_thrust` without a step in the output.
    pub fn activate(&mut self, current_thrust: f32) {
        self.pid.transfer(current_thrust);
        self.active = true;
    }

    /// The integrator is left untouched, so re-activation is bumpless.
    pub fn deactivate(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Move the operating point to `neutral`, continuing from the last
    /// command when active.
    pub fn update_neutral_thrust(&mut self, neutral: f32) {
        if self.active {
            self.pid.set_bias(neutral);
            self.pid.transfer(self.down_command);
        }
        self.neutral = neutral;
    }

    pub fn neutral_thrust_estimate(&self) -> &NeutralThrustEstimate {
        &self.estimate
    }

    pub fn setup_neutral_thrust_calc(&mut self) {
        self.estimate = NeutralThrustEstimate::default();
    }

    /// Advance the neutral thrust estimate by one tick. The window restarts
    /// whenever the vehicle is not stable, and the estimate completes once
    /// per engagement.
    pub fn run_neutral_thrust_calc(&mut self) -> Option<NeutralThrustCorrection> {
        if self.estimate.have_correction {
            return None;
        }

        let stable = (self.position_setpoint - self.position_state).abs() < STABLE_POSITION_ERROR
            && self.velocity_setpoint_current.abs() < STABLE_VELOCITY_SETPOINT
            && self.velocity_state.abs() < STABLE_VELOCITY_STATE
            && (self.velocity_setpoint_current - self.velocity_state).abs() < STABLE_VELOCITY_ERROR;

        let est = &mut self.estimate;
        if !stable {
            est.start_sampling = false;
            return None;
        }

        if !est.start_sampling {
            est.start_sampling = true;
            est.count = 0;
            est.sum = 0.0;
            est.min = 0.0;
            est.max = 0.0;
        }

        // The first stable tick counts toward the window
        est.count += 1;

        let integral = self.pid.integral();
        if est.count > NEUTRAL_THRUST_START_DELAY {
            est.sum += integral;
            est.min = est.min.min(integral);
            est.max = est.max.max(integral);
        }

        if est.count < NEUTRAL_THRUST_END_COUNT {
            return None;
        }

        est.average = est.sum / (NEUTRAL_THRUST_END_COUNT - NEUTRAL_THRUST_START_DELAY) as f32;
        est.correction = est.average;
        est.start_sampling = false;
        est.have_correction = true;
        self.pid.offset_integral(-est.average);

        debug!(
            "Neutral thrust estimate complete, correction: {}",
            est.correction
        );

        Some(NeutralThrustCorrection {
            correction: est.correction,
            accumulator: self.pid.integral(),
            range: est.max - est.min,
        })
    }
}
