//! Forum-site protocol plumbing: charset codec, session persistence and the
//! authenticated driver.

pub mod codec;
pub mod driver;
pub mod session;

pub use driver::SiteDriver;
pub use session::SessionStore;
