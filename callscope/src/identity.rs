//! Process-wide application identity
//!
//! Set once when the agent starts; every context and measurement created
//! afterwards carries it.

use std::sync::OnceLock;

use log::warn;

use crate::domain::ApplicationId;

/// Name used when no agent configured an identity
pub const UNSET_APPLICATION_NAME: &str = "not set";

static APPLICATION: OnceLock<ApplicationId> = OnceLock::new();

/// Fix the application identity for the rest of the process.
///
/// Returns the identity in effect, which is the existing one if a previous
/// call (or an earlier read) already fixed it.
pub fn init(name: &str) -> ApplicationId {
    let mut fresh = false;
    let id = APPLICATION.get_or_init(|| {
        fresh = true;
        ApplicationId::generate(name)
    });
    if !fresh && id.name() != name {
        warn!("Application identity already set to '{}', ignoring '{name}'", id.name());
    }
    id.clone()
}

/// The process's application identity
pub fn application_id() -> ApplicationId {
    APPLICATION.get_or_init(|| ApplicationId::generate(UNSET_APPLICATION_NAME)).clone()
}
