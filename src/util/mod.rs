//! Utility functions.

pub mod env;
pub mod format;
pub mod time;

pub use format::{format_money, format_percent};
pub use time::{format_countdown, format_relative_time};
