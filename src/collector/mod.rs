pub mod trait_def;
pub mod umami;

pub use trait_def::{Collector, CollectorError, CollectorResult};
pub use umami::UmamiClient;
