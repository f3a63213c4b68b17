//! Generation of guidance targets for the path follower.

pub mod autotakeoff;
pub mod plans;
pub mod stick;
