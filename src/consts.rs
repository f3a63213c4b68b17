/// Nominal period of the guidance and altitude control loops [ms]
pub const GUIDANCE_PERIOD_MS: u64 = 50;

/// Nominal period of the waypoint sequencer [ms]
pub const PATH_PLANNER_PERIOD_MS: u64 = 100;

/// Nominal period of the flight mode arbiter [ms]
pub const MANUAL_CONTROL_PERIOD_MS: u64 = 20;

/// Number of guidance ticks per second
pub const GUIDANCE_TICKS_PER_SECOND: u32 = (1000 / GUIDANCE_PERIOD_MS) as u32;

/// Nominal guidance loop sample time [s]
pub const GUIDANCE_DT: f32 = GUIDANCE_PERIOD_MS as f32 / 1000.;
