//! Core conversion building blocks

pub mod cache;
pub mod config;
pub mod currency;
pub mod dedup;
pub mod error;
pub mod error_handler;
pub mod frequency;
pub mod log;
pub mod scheduler;
pub mod settings;

// Re-export main types for cleaner imports
pub use currency::{ConversionApi, ConversionKey, ConvertedAmount, Currency, Priority};
pub use error::{ConversionError, ErrorKind, RetryError};
pub use settings::{CurrencySettings, SettingsApi, SettingsUpdate};
