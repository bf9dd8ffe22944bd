//! Session management: cookies, the session object and per-project clients.

mod cookies;
mod project;
mod session;

pub use cookies::Cookies;
pub use project::ProjectClient;
pub use session::Session;
