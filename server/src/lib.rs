//! FlightSurety oracle service library
//!
//! Listens for `OracleRequest` events from the FlightSurety contracts and
//! answers the ones addressed to this oracle's indexes.

pub mod abi;
pub mod app_state;
pub mod chain;
pub mod config;
pub mod error;
pub mod event_listener;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
