pub mod collector;
pub mod config;
pub mod connection;
pub mod middleware;
pub mod models;
pub mod pipeline;
pub mod tracking;

pub use collector::{Collector, CollectorError, UmamiClient};
pub use config::{ConfigError, FeederConfig, ServerConfig};
pub use connection::ConnectionState;
pub use middleware::{track_requests, with_tracking, Feeder};
pub use models::Event;
