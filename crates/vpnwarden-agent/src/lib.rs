//! vpnwarden-agent: keeps one Windows VPN connection profile in line with a
//! desired configuration, for use by remote management agents.

pub mod config;
pub mod reconcile;
pub mod report;
pub mod store;
