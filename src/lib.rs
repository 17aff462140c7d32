pub mod config;
pub mod link;
pub mod messages;
pub mod motor;
pub mod protocol;
pub mod runtime;
pub mod watchdog;
