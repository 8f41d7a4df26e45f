//! Applying accepted version bumps
//!
//! # Modules
//!
//! - [`applier`]: Copy, manifest and build probe state machine
//! - [`ledger`]: Pending update ledger trait and SQLite store
//! - [`process`]: External command execution
//! - [`error`]: Apply errors

pub mod applier;
pub mod error;
pub mod ledger;
pub mod process;

pub use applier::{Applier, ApplyResult, Confirm, stdin_confirm};
pub use error::ApplyError;
pub use ledger::{PendingStatus, PendingStore, PendingUpdate, SqlitePendingStore};
pub use process::{CommandOutput, CommandRunner, SystemCommandRunner};
