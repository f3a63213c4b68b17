#![no_std]

// Export the logging macros for either defmt or log
#[macro_use]
pub mod logging;

pub mod consts;
pub mod controllers;
pub mod errors;
pub mod filters;
pub mod guidance;
pub mod signals;
pub mod sync;
pub mod tasks;
pub mod types;
pub mod utils;

// Re-exported for implementors
pub use embassy_time;
pub use heapless;
pub use nalgebra;

/// Maximum number of waypoints a mission can hold
pub const MAX_WAYPOINTS: usize = 64;

/// Maximum number of path actions a mission can hold
pub const MAX_PATH_ACTIONS: usize = 32;

/// Number of selectable flight mode switch positions
pub const NUM_FLIGHT_MODE_POSITIONS: usize = 6;

/// Number of accessory channels available to the mode arbiter
pub const NUM_ACCESSORY: usize = 4;

#[macro_export]
macro_rules! const_default {
    ($type:ty => { $($token:tt)+ } ) => {
        impl $crate::ConstDefault for $type {
            const DEFAULT: Self = Self::const_default();
        }

        impl $type {
            pub const fn const_default() -> Self {
                Self { $($token)+ }
            }
        }

        impl Default for $type {
            fn default() -> Self {
                Self::const_default()
            }
        }
    };
    ($type:ty => $($token:tt)+ ) => {
        impl $crate::ConstDefault for $type {
            const DEFAULT: Self = Self::const_default();
        }

        impl $type {
            pub const fn const_default() -> Self {
                $($token)+
            }
        }

        impl Default for $type {
            fn default() -> Self {
                Self::const_default()
            }
        }
    };
}

pub trait ConstDefault {
    const DEFAULT: Self;
}
