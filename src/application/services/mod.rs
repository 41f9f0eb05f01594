//! Application services
//!
//! Concrete service implementations that orchestrate domain logic.
//! Services depend on I/O boundary traits (FileSystem, Confirmer, AlertSink)
//! but are themselves concrete structs, not traits.

mod config;
mod editor;

pub use config::ConfigService;
pub use editor::{ConfigProperty, EditSession, SessionState};
