//! Reconciles AI-extracted field suggestions into legal case records.

pub mod api;
pub mod audit;
pub mod cases;
pub mod config;
pub mod error;
pub mod settings;
