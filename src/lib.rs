pub mod audit;
pub mod auth;
pub mod config;
pub mod confirmation;
pub mod console;
pub mod error;
pub mod node;
pub mod platform;
pub mod reports;
pub mod scheduler;
pub mod shutdown;
pub mod storage;
