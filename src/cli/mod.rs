pub mod convert;
pub mod settings;
pub mod setup;
pub mod stats;
pub mod ui;
