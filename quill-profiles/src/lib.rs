//! Per-user profile entities and persistence for the Quill bot.

pub mod profile;
pub mod store;

pub use profile::{Profile, Role, Turn};
pub use store::ProfileStore;
