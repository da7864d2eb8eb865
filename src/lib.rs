#![cfg_attr(not(test), no_std)]

// must come first so the log macros are visible to every module
pub(crate) mod fmt;

pub mod analog;
pub mod config;
pub mod drivers;
pub mod math;
pub mod power;
