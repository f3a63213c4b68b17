pub mod manual_control;
pub mod path_follower_handler;
pub mod path_planner;
pub mod settings;
