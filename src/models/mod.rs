pub mod event;
pub mod website;

pub use event::{Event, SendBody};
pub use website::{AuthRequest, AuthResponse, CreateWebsiteRequest, Website, WebsitesPage};
