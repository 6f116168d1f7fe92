//! Service health monitor.
//!
//! Probes configured services over HTTP, TCP, ICMP or a container runtime
//! socket on a fixed schedule, stores every result and sends a webhook
//! when a service changes state.

pub mod alert;
pub mod cli;
pub mod config;
pub mod database;
pub mod monitoring;
pub mod pool;

#[cfg(test)]
mod testing;
