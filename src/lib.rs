//! Operational resilience core: dependency health aggregation and coordinated shutdown.

pub mod checks;
pub mod cli;
pub mod client;
pub mod config;
pub mod logging;
pub mod middleware;
pub mod responder;
pub mod server;
pub mod shutdown;
pub mod status;

pub use checks::{CheckContext, Checker, HealthRegistry};
pub use logging::Logger;
pub use responder::HealthResponder;
pub use shutdown::{ShutdownHook, ShutdownManager};
pub use status::{AggregateReport, CheckOutcome, CheckStatus};
