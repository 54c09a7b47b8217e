//! Browser session management over the Chrome DevTools Protocol

mod errors;
mod session;

pub use errors::BrowserError;
pub use session::{BrowserSession, BrowserSessionConfig};
