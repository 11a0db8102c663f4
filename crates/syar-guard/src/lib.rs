//! Syar Network Guard
//!
//! Sits in front of every network primitive handed out by
//! [`syar_network::Bindings`] and refuses calls whose target the policy
//! blocks, failing each the way that primitive fails on its own.
//!
//! ```rust,ignore
//! let config = GuardConfig::from_file(Path::new("guard.toml"))?;
//! if let Some(guard) = activate(&config, &location, &bindings)? {
//!     println!("{}", guard.diagnostics().to_json()?);
//! }
//! ```
//!
//! Blocked calls are logged on the [`AUDIT_TARGET`] tracing target.

mod activation;
mod adapters;
mod config;
mod diagnostics;
mod installer;
mod stats;

pub use activation::{activate, Activation};
pub use adapters::{
    FetchBlockMode, GuardContext, GuardedBeacon, GuardedFetch, GuardedLoader, GuardedRequest, GuardedRequestFactory,
    GuardedSocketConnector, InterceptionState, AUDIT_TARGET, BLOCKED_MESSAGE, BLOCKED_STATUS,
};
pub use config::{GuardConfig, GuardError};
pub use diagnostics::Diagnostics;
pub use installer::{InstallReport, NetworkGuard};
pub use stats::{GuardStats, PrimitiveStats};
