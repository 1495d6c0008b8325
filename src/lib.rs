//! SmartCampus - utility monitoring for campus buildings.
//!
//! # Overview
//!
//! Buildings report water and electricity readings through manual entry,
//! bulk file import, or IoT devices. Every new reading is checked inline,
//! inside the transaction that stores it, by a small anomaly engine:
//!
//! - built-in detectors for threshold breaches, statistical spikes, and
//!   sustained high usage
//! - administrator-defined rules scoped globally, per zone, or per building
//!
//! Alerts raised by the engine are then acknowledged and resolved by
//! operators through the HTTP API.
//!
//! # Modules
//!
//! - [`model`]: Buildings, readings, alerts and request types
//! - [`stats`]: Mean, sample standard deviation and z-scores
//! - [`rules`]: Admin alert rules and their matcher
//! - [`detection`]: The anomaly engine run for each new reading
//! - [`ingestion`]: Import and IoT ingestion paths
//! - [`storage`]: SQLite storage layer
//! - [`config`]: Environment configuration
//! - [`api`]: HTTP API handlers

pub mod api;
pub mod config;
pub mod detection;
pub mod ingestion;
pub mod model;
pub mod rules;
pub mod stats;
pub mod storage;
