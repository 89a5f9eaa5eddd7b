pub mod config;
pub mod config_commands;
pub mod errors;
pub mod notify;

pub use config::{AppConfig, ConfigOverrides};
pub use errors::{AppError, AuthError, ConversionError, ValidationError};
pub use notify::{Notice, NoticeLevel, NotificationSink};
