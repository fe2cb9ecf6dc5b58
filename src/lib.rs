pub mod cascade;
pub mod config;
pub mod lock;
pub mod log;
pub mod provision;
pub mod report;
pub mod resolver;
pub mod satisfaction;
pub mod store;
pub mod store_actor;
pub mod tc_error;
pub mod transition;
pub mod trigger;
pub mod types;
