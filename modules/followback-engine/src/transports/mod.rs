//! Concrete transports behind the capability traits.

pub mod dry_run;
pub mod x_api;

pub use dry_run::DryRunExecutor;
pub use x_api::XTransport;
