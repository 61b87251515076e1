//! External provisioning collaborator.
//!
//! The provisioner is the slow, asynchronous system that actually
//! creates cloud billing projects and grants consumers access to them.
//! The buffer only ever talks to it through this trait; tests use
//! `testing::FakeProvisioner`.

use async_trait::async_trait;

use crate::error::Result;

/// Externally-reported state of a provisioning attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStatus {
    /// The resource is fully provisioned and usable.
    Ready,
    /// Provisioning is still in flight.
    Creating,
    /// Provisioning failed externally.
    Error,
    /// The provisioner has no record of the resource.
    NotFound,
}

/// Result of a successful grant call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    /// The subject was added to the resource.
    Granted,
    /// The subject was already a member. Treated as success, so grants
    /// are idempotent.
    AlreadyMember,
}

/// The external provisioning system.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Kick off creation of a new resource under `external_name`.
    ///
    /// Completion is asynchronous; poll [`status`](Self::status) to
    /// learn the outcome.
    async fn create(&self, external_name: &str) -> Result<()>;

    /// Report the current provisioning state of `external_name`.
    async fn status(&self, external_name: &str) -> Result<ProvisionStatus>;

    /// Grant `subject` access to `external_name`.
    async fn grant(&self, subject: &str, external_name: &str) -> Result<GrantOutcome>;
}
