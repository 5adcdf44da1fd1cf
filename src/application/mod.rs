pub mod bootstrap;
pub mod commands;
pub mod external_planner;
