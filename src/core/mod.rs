pub mod types;
pub mod config;
pub mod clock;
pub mod error;
pub mod index;
