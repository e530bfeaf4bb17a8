pub mod feeder;
pub mod track;

pub use feeder::Feeder;
pub use track::{track_requests, with_tracking};
