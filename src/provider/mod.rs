//! # Providers
//!
//! Clients for the external systems reconciled by this controller.

pub mod planetscale;
