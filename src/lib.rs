//! Line-oriented chat relay.
//!
//! Clients connect over TCP, pick a unique display name, and exchange
//! broadcast, exclusion-broadcast, and private messages through the relay,
//! which drops anything containing a configured banned phrase.

pub mod config;
pub mod relay;
