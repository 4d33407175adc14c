//! Async [Source RCON protocol](https://developer.valvesoftware.com/wiki/Source_RCON_Protocol)
//! client plus a poller that keeps the status of many game servers up to date.
pub mod client;
pub mod config;
pub mod error;
pub mod packet;
pub mod parser;
pub mod poller;
pub mod probe;
pub mod server;
pub mod store;
pub mod target;
