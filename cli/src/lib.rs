//! tradegate-cli: command-line front end for tradegate.
//!
//! Loads a TOML config, opens an authorized brokerage session through the
//! OAuth handshake, and then queries the account, places single orders or
//! plans and places a target allocation read from a JSON file. Every
//! session step and order outcome goes to a JSONL audit trail.

pub mod audit;
pub mod config;
pub mod error;
pub mod execution;
pub mod target;
