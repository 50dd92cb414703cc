pub mod clock;
pub mod discovery;
pub mod errors;
pub mod metrics;
pub mod settings;
pub mod status;
pub mod store;
pub mod telemetry;
pub mod waiter;
