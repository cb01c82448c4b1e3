//! LifeFlow rules: privacy-first email automation core.
//!
//! Inbound messages are anonymized, classified, matched against the owner's
//! rules and turned into tasks, events, invoices, parcels and orders.

pub mod actions;
pub mod classifier;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod records;
pub mod rules;
pub mod store;
