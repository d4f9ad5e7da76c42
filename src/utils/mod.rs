//! Shared utilities: time value parsing and IP helpers.

pub mod duration;
pub mod ip_utils;

pub use duration::parse_time_to_seconds;
