//! FaceGate gateway - library crate for the device control-plane REST server.
//!
//! Re-exports all modules so the binary (`main.rs`) and external crates
//! (e.g. `fg-e2e-tests`) can access `AppState`, `build_router` and the
//! device store.

pub mod config;
pub mod device_data;
pub mod error;
pub mod routes;
pub mod state;
pub mod store;
