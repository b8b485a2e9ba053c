/// Database configuration and connection management
pub mod database;

/// Engine settings (mile discount, fee proration, batch reporting) loaded from config.toml
pub mod engine;

pub use engine::EngineConfig;
