//! Powerman: find a USB power board by serial and drive its control protocol.

pub mod board;
pub mod config;
pub mod device;
pub mod error;
pub mod matcher;
pub mod melody;
pub mod protocol;
pub mod sequencer;
pub mod session;

pub use error::PowermanError;
