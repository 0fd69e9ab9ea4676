//! Command implementations

pub mod climate;
pub mod completions;
pub mod config;
pub mod entities;
pub mod nest;
pub mod poll;
pub mod rpi;
