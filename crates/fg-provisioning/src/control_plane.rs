//! Identity-issuance control plane seam.

use async_trait::async_trait;
use fg_protocol::CertificateBundle;
use thiserror::Error;

/// A failed control-plane call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlPlaneError {
    #[error("{operation} failed: {message}")]
    Request {
        operation: &'static str,
        message: String,
    },

    #[error("{operation} response is missing '{field}'")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },
}

pub type ControlPlaneResult<T> = Result<T, ControlPlaneError>;

/// Broker-side registry calls used by provisioning.
///
/// Each call has a lasting side effect; none is undone on later failure.
#[async_trait]
pub trait IdentityControlPlane: Send + Sync {
    /// Issue a fresh key pair and an active certificate.
    async fn create_keys_and_certificate(&self) -> ControlPlaneResult<CertificateBundle>;

    async fn create_thing(&self, thing_name: &str) -> ControlPlaneResult<()>;

    async fn attach_thing_principal(
        &self,
        thing_name: &str,
        certificate_arn: &str,
    ) -> ControlPlaneResult<()>;

    async fn attach_policy(&self, policy_name: &str, certificate_arn: &str)
    -> ControlPlaneResult<()>;

    async fn add_thing_to_group(&self, group_name: &str, thing_name: &str)
    -> ControlPlaneResult<()>;
}
