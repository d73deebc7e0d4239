//! pathtune agent
//!
//! Host-side collaborators for the engine: a ping-backed probe transport and
//! a dry-run applier that reports the plan without changing the host.

#![warn(missing_docs)]

pub mod dry_run;
pub mod ping;

pub use dry_run::DryRunApplier;
pub use ping::PingTransport;
