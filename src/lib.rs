// src/lib.rs

pub mod config;
pub mod input;
pub mod pipeline;
pub mod store;
pub mod tracking;
pub mod types;
