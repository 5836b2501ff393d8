//! labd - Lab hardware adapter supervisor.
//!
//! A supervisor process spawns one adapter process per piece of hardware on
//! demand, waits for each to report the port it bound, and hands that port to
//! callers, who then talk to the adapter directly.

pub mod adapter;
pub mod client;
pub mod config;
pub mod devices;
pub mod display;
pub mod rpc;
pub mod supervisor;
