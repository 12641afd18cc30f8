//! # Runtime Module
//!
//! Process bootstrap, the controller watch loops and their error policy.

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;

pub use error_policy::*;
pub use initialization::*;
pub use watch_loop::*;
