//! Vehicle GPS emulator
//!
//! Generates GPS, power and geofence telemetry for simulated vehicle
//! terminals and delivers it to a collection backend.

pub mod backend;
pub mod cli;
pub mod config;
pub mod database;
pub mod errors;
pub mod generator;
pub mod manager;
pub mod models;
pub mod motion;
pub mod storage;
pub mod wire;
