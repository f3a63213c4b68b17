use embassy_time::Instant;
use vtol_guidance::controllers::altitude::VerticalBounds;
use vtol_guidance::controllers::takeoff::TakeoffController;
use vtol_guidance::signals::Registry;
use vtol_guidance::tasks::manual_control::FlightModeArbiter;
use vtol_guidance::tasks::path_planner::PathPlanner;
use vtol_guidance::types::flight_mode::{ControlChain, ControlHandler, FlightMode};
use vtol_guidance::types::guidance::{PathMode, AUTOTAKEOFF_CONTROL_STATE};
use vtol_guidance::types::measurements::Ned;
use vtol_guidance::types::mission::{EndCondition, MissionStore, PathAction, PathCommand, Waypoint};
use vtol_guidance::types::status::{AlarmSeverity, AutoTakeoffControlState, AutoTakeoffState};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn action(mode: PathMode, end_condition: EndCondition, condition_parameters: [f32; 4]) -> PathAction {
    PathAction {
        mode,
        mode_parameters: [0.0; 4],
        end_condition,
        condition_parameters,
        command: PathCommand::OnConditionNextWaypoint,
        jump_destination: 0,
        error_destination: -1,
    }
}

fn load_mission(registry: &Registry, action: PathAction, positions: &[Ned]) {
    let mut mission = MissionStore::const_default();
    mission.actions.push(action).unwrap();
    for position in positions {
        mission
            .waypoints
            .push(Waypoint {
                position: *position,
                velocity: 2.0,
                action: 0,
            })
            .unwrap();
    }
    registry.path_plan.send(mission.path_plan().unwrap());
    registry.mission.send(mission);
}

/// Switch position 0 selects the path planner, and the vehicle is armed.
fn select_path_planner(registry: &Registry) {
    registry
        .flight_mode_settings
        .modify(|s| s.flight_mode_position[0] = FlightMode::PathPlanner);
    registry.flight_status.modify(|s| s.armed = true);
}

/// Echo the active target like the path follower does.
fn follower_acknowledges(registry: &Registry) {
    let sequence_id = registry.guidance_target.get().sequence_id;
    registry.path_status.modify(|s| s.sequence_id = sequence_id);
}

#[test]
fn immediate_condition_advances_after_engagement() {
    init_logger();
    let registry = Registry::new();
    load_mission(
        &registry,
        action(PathMode::FlyEndpoint, EndCondition::Immediate, [0.0; 4]),
        &[
            Ned::new(0.0, 0.0, -10.0),
            Ned::new(20.0, 0.0, -10.0),
            Ned::new(20.0, 20.0, -10.0),
        ],
    );
    select_path_planner(&registry);

    let mut arbiter = FlightModeArbiter::new();
    let mut planner = PathPlanner::new();

    let arbitration = arbiter.tick(&registry, Instant::from_millis(0));
    assert_eq!(arbitration.handler, ControlHandler::PathPlanner);
    assert!(registry
        .flight_status
        .get()
        .control_chain
        .contains(ControlChain::PATH_PLANNER));

    planner.tick(&registry, Instant::from_millis(0));
    assert!(planner.is_active());
    assert_eq!(registry.waypoint_active.get().index, 0);
    assert_eq!(registry.alarms.get().path_plan, AlarmSeverity::Ok);

    follower_acknowledges(&registry);
    planner.tick(&registry, Instant::from_millis(100));
    assert_eq!(registry.waypoint_active.get().index, 1);

    let target = registry.guidance_target.get();
    assert_eq!(target.sequence_id, 1);
    assert_eq!(target.start, Ned::new(0.0, 0.0, -10.0));
    assert_eq!(target.end, Ned::new(20.0, 0.0, -10.0));
}

#[test]
fn distance_condition_waits_for_arrival() {
    init_logger();
    let registry = Registry::new();
    load_mission(
        &registry,
        action(
            PathMode::FlyEndpoint,
            EndCondition::DistanceToTarget,
            [5.0, 0.0, 0.0, 0.0],
        ),
        &[Ned::new(10.0, 0.0, -10.0), Ned::new(10.0, 10.0, -10.0)],
    );
    select_path_planner(&registry);

    let mut arbiter = FlightModeArbiter::new();
    let mut planner = PathPlanner::new();
    arbiter.tick(&registry, Instant::from_millis(0));
    planner.tick(&registry, Instant::from_millis(0));
    follower_acknowledges(&registry);

    registry.position.send(Ned::new(4.9, 0.0, 0.0));
    planner.tick(&registry, Instant::from_millis(100));
    assert_eq!(registry.waypoint_active.get().index, 0);

    registry.position.send(Ned::new(5.1, 0.0, -10.0));
    planner.tick(&registry, Instant::from_millis(200));
    assert_eq!(registry.waypoint_active.get().index, 1);
}

#[test]
fn corrupted_mission_holds_position() {
    init_logger();
    let registry = Registry::new();
    load_mission(
        &registry,
        action(PathMode::FlyEndpoint, EndCondition::Immediate, [0.0; 4]),
        &[Ned::new(10.0, 0.0, -10.0)],
    );
    registry.path_plan.modify(|p| p.crc = p.crc.wrapping_add(1));
    select_path_planner(&registry);
    registry.position.send(Ned::new(3.0, 4.0, -5.0));

    let mut arbiter = FlightModeArbiter::new();
    let mut planner = PathPlanner::new();
    arbiter.tick(&registry, Instant::from_millis(0));
    planner.tick(&registry, Instant::from_millis(0));

    assert!(!planner.is_active());
    assert_eq!(registry.alarms.get().path_plan, AlarmSeverity::Critical);
    let target = registry.guidance_target.get();
    assert_eq!(target.mode, PathMode::GotoEndpoint);
    assert_eq!(target.end, Ned::new(3.0, 4.0, -5.0));
}

#[test]
fn takeoff_leg_starts_on_throttle() {
    init_logger();
    let registry = Registry::new();
    load_mission(
        &registry,
        action(PathMode::AutoTakeoff, EndCondition::None, [0.0; 4]),
        &[Ned::new(0.0, 0.0, -3.0)],
    );
    select_path_planner(&registry);

    let mut arbiter = FlightModeArbiter::new();
    let mut planner = PathPlanner::new();
    let mut takeoff = TakeoffController::new();

    arbiter.tick(&registry, Instant::from_millis(0));
    planner.tick(&registry, Instant::from_millis(0));
    assert_eq!(registry.guidance_target.get().mode, PathMode::AutoTakeoff);

    let control_state = |registry: &Registry| {
        registry
            .guidance_target
            .get()
            .parameter_as::<AutoTakeoffControlState>(AUTOTAKEOFF_CONTROL_STATE)
    };

    // Armed, so the gate waits for the throttle
    arbiter.tick(&registry, Instant::from_millis(20));
    assert_eq!(
        control_state(&registry),
        Some(AutoTakeoffControlState::WaitForMidThrottle)
    );

    takeoff.activate(&registry);
    takeoff.update(&registry);
    assert_eq!(takeoff.fsm().state(), AutoTakeoffState::Inactive);

    registry.manual_control.modify(|c| c.throttle = 0.5);
    arbiter.tick(&registry, Instant::from_millis(40));
    assert_eq!(control_state(&registry), Some(AutoTakeoffControlState::Initiate));

    takeoff.update(&registry);
    assert_eq!(takeoff.fsm().state(), AutoTakeoffState::SlowStart);

    // The thrust envelope only opens up while spooling up
    let (mut last_min, mut last_max) = takeoff.fsm().bound_thrust(0.0, 1.0);
    for _ in 0..20 {
        let desired = takeoff.update(&registry);
        let (min, max) = takeoff.fsm().bound_thrust(0.0, 1.0);
        assert!(min >= last_min && max >= last_max);
        assert!(desired.thrust >= min - 1e-6 && desired.thrust <= max + 1e-6);
        (last_min, last_max) = (min, max);
    }
    assert_eq!(takeoff.fsm().state(), AutoTakeoffState::SlowStart);
    assert!(last_max > 0.0);
}
