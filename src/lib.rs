pub mod bootstrap;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod job;
pub mod leadership;
pub mod shutdown;
pub mod trigger;

pub use coordinator::{JobScheduler, SchedulerMode};
pub use error::{Result, SchedulerError};
