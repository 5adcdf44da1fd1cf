pub mod calendar_link;
pub mod config;
pub mod error;
pub mod plan_store;
pub mod storage;
