//! End conditions of a path action. Each condition is a plain predicate over
//! a snapshot of the vehicle state, except the timeout which keeps a timer.

use embassy_time::{Duration, Instant};
#[allow(unused_imports)]
use num_traits::Float;

use crate::types::guidance::PathStatus;
use crate::types::measurements::Ned;
use crate::types::mission::{EndCondition, PathAction, Waypoint};

/// Vehicle state consumed by the end conditions.
#[derive(Debug, Clone, Copy)]
pub struct VehicleSnapshot {
    pub position: Ned,
    pub velocity: Ned,
    pub airspeed: f32,
    pub path_status: PathStatus,
}

/// The active leg of the mission.
#[derive(Debug, Clone, Copy)]
pub struct ActiveLeg<'a> {
    pub index: u16,
    pub waypoint: &'a Waypoint,
    /// The waypoint after the active one, wrapping to the first
    pub next_waypoint: &'a Waypoint,
    pub action: &'a PathAction,
}

/// Timer of the timeout condition. It starts when the condition is first
/// evaluated for a waypoint, and restarts after it fires so that a repeated
/// waypoint times out again.
#[derive(Debug, Clone, Default)]
pub struct TimeoutTimer {
    armed: Option<(u16, Instant)>,
}

impl TimeoutTimer {
    pub fn elapsed(&mut self, index: u16, timeout_secs: f32, now: Instant) -> bool {
        let start = match self.armed {
            Some((armed_index, start)) if armed_index == index => start,
            _ => {
                self.armed = Some((index, now));
                now
            }
        };

        let timeout = Duration::from_micros((timeout_secs.max(0.0) * 1e6) as u64);
        if now.saturating_duration_since(start) >= timeout {
            self.armed = None;
            true
        } else {
            false
        }
    }
}

/// Evaluate the end condition of the active leg.
pub fn check(
    leg: &ActiveLeg,
    vehicle: &VehicleSnapshot,
    timer: &mut TimeoutTimer,
    now: Instant,
) -> bool {
    let p = &leg.action.condition_parameters;
    match leg.action.end_condition {
        EndCondition::None => false,
        EndCondition::TimeOut => timer.elapsed(leg.index, p[0], now),
        EndCondition::DistanceToTarget => distance_to_target(leg.waypoint, vehicle, p),
        EndCondition::LegRemaining => leg_remaining(vehicle, p),
        EndCondition::BelowError => below_error(vehicle, p),
        EndCondition::AboveAltitude => above_altitude(vehicle, p),
        EndCondition::AboveSpeed => above_speed(vehicle, p),
        EndCondition::PointingTowardsNext => pointing_towards_next(leg, vehicle, p),
        EndCondition::PythonScript => python_script(),
        EndCondition::Immediate => true,
    }
}

/// `p[0]`: distance [m], `p[1] > 0.5`: measure in 3D rather than horizontally
fn distance_to_target(waypoint: &Waypoint, vehicle: &VehicleSnapshot, p: &[f32; 4]) -> bool {
    let delta = waypoint.position - vehicle.position;
    let distance = if p[1] > 0.5 {
        delta.norm()
    } else {
        delta.horizontal_norm()
    };
    distance <= p[0]
}

/// `p[0]`: remaining fraction of the leg
fn leg_remaining(vehicle: &VehicleSnapshot, p: &[f32; 4]) -> bool {
    vehicle.path_status.fractional_progress >= 1.0 - p[0]
}

/// `p[0]`: allowed distance from the path [m]
fn below_error(vehicle: &VehicleSnapshot, p: &[f32; 4]) -> bool {
    vehicle.path_status.error <= p[0]
}

/// `p[0]`: altitude [m]
fn above_altitude(vehicle: &VehicleSnapshot, p: &[f32; 4]) -> bool {
    -vehicle.position.down >= p[0]
}

/// `p[0]`: speed [m/s], `p[1] > 0.5`: use airspeed rather than ground speed
fn above_speed(vehicle: &VehicleSnapshot, p: &[f32; 4]) -> bool {
    let speed = if p[1] > 0.5 {
        vehicle.airspeed
    } else {
        vehicle.velocity.norm()
    };
    speed >= p[0]
}

/// `p[0]`: allowed angle between the course and the next leg [deg]
fn pointing_towards_next(leg: &ActiveLeg, vehicle: &VehicleSnapshot, p: &[f32; 4]) -> bool {
    let leg_vector = leg.next_waypoint.position - leg.waypoint.position;
    let leg_angle = leg_vector.north.atan2(leg_vector.east);
    let course_angle = vehicle.velocity.north.atan2(vehicle.velocity.east);

    let difference = (leg_angle - course_angle).to_degrees().abs() % 360.0;
    difference <= p[0]
}

/// Placeholder for conditions evaluated by an onboard script, always true.
fn python_script() -> bool {
    true
}
