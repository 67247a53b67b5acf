//! First-time device onboarding.
//!
//! Steps, in order:
//! 1. bring up the bootstrap-credential connection
//! 2. issue a certificate and key pair
//! 3. create the thing and attach the certificate to it
//! 4. attach the authorization policy to the certificate
//! 5. add the thing to its fleet group
//! 6. seed the initial shadow document
//!
//! Nothing is rolled back. Every failure after step 1 reports what was
//! already created so an operator can reconcile it.

use std::fmt;
use std::sync::Arc;

use fg_mqtt_channel::{ConnectionError, ConnectionManager, ShadowError, ShadowSynchronizer};
use fg_protocol::{CertificateBundle, ShadowDocument, ThingIdentity, identity};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

use crate::config::ProvisioningConfig;
use crate::control_plane::{ControlPlaneError, IdentityControlPlane};

/// Broker-side resources left behind by a failed provisioning run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrphanedResources {
    pub certificate_arn: String,
    pub certificate_id: String,
    /// Set once the thing was created.
    pub thing_name: Option<String>,
    pub principal_attached: bool,
    pub policy_attached: bool,
    pub group_attached: bool,
}

impl fmt::Display for OrphanedResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "certificate {}", self.certificate_arn)?;
        if let Some(thing) = &self.thing_name {
            write!(f, ", thing {thing}")?;
        }
        if self.policy_attached {
            f.write_str(", policy attachment")?;
        }
        if self.group_attached {
            f.write_str(", group membership")?;
        }
        Ok(())
    }
}

/// Which attachment step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachStep {
    CreateThing,
    AttachPrincipal,
    AttachPolicy,
}

impl fmt::Display for AttachStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AttachStep::CreateThing => "thing registration",
            AttachStep::AttachPrincipal => "certificate attachment",
            AttachStep::AttachPolicy => "policy attachment",
        })
    }
}

#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// Nothing was created; the whole call is safe to retry.
    #[error("bootstrap connection unavailable: {0}")]
    BootstrapUnreachable(#[source] ConnectionError),

    #[error("certificate issuance failed: {0}")]
    IssuanceFailed(#[source] ControlPlaneError),

    #[error("{step} failed: {source} (left behind: {orphaned})")]
    AttachFailed {
        step: AttachStep,
        #[source]
        source: ControlPlaneError,
        orphaned: OrphanedResources,
    },

    #[error("thing group attachment failed: {source} (left behind: {orphaned})")]
    GroupAttachFailed {
        #[source]
        source: ControlPlaneError,
        orphaned: OrphanedResources,
    },

    #[error("initial shadow seed failed: {source} (left behind: {orphaned})")]
    SeedFailed {
        #[source]
        source: ShadowError,
        orphaned: OrphanedResources,
    },
}

impl ProvisioningError {
    /// Resources that exist despite the failure, if any are known.
    pub fn orphaned(&self) -> Option<&OrphanedResources> {
        match self {
            Self::BootstrapUnreachable(_) | Self::IssuanceFailed(_) => None,
            Self::AttachFailed { orphaned, .. }
            | Self::GroupAttachFailed { orphaned, .. }
            | Self::SeedFailed { orphaned, .. } => Some(orphaned),
        }
    }

    /// Whether the failure is guaranteed to have had no side effect.
    pub fn is_side_effect_free(&self) -> bool {
        matches!(self, Self::BootstrapUnreachable(_))
    }
}

pub type ProvisioningResult<T> = Result<T, ProvisioningError>;

/// A successfully registered device.
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub identity: ThingIdentity,
    pub certificate: CertificateBundle,
}

pub struct ProvisioningWorkflow {
    manager: Arc<ConnectionManager>,
    shadows: Arc<ShadowSynchronizer>,
    control_plane: Arc<dyn IdentityControlPlane>,
    config: ProvisioningConfig,
}

impl ProvisioningWorkflow {
    /// `manager` must be authenticated with the shared bootstrap credential.
    pub fn new(
        manager: Arc<ConnectionManager>,
        shadows: Arc<ShadowSynchronizer>,
        control_plane: Arc<dyn IdentityControlPlane>,
        config: ProvisioningConfig,
    ) -> Self {
        Self {
            manager,
            shadows,
            control_plane,
            config,
        }
    }

    pub fn thing_name(&self, device_id: &str) -> String {
        identity::thing_name(&self.config.template_name, device_id)
    }

    /// Onboard `device_id` and hand back its certificate bundle.
    ///
    /// Must not run concurrently for the same device id.
    pub async fn provision(&self, device_id: &str) -> ProvisioningResult<CertificateBundle> {
        self.register(device_id).await.map(|p| p.certificate)
    }

    /// Onboard `device_id`, returning its identity alongside the bundle.
    pub async fn register(&self, device_id: &str) -> ProvisioningResult<Provisioned> {
        let thing_name = self.thing_name(device_id);

        self.manager
            .ensure_connected()
            .await
            .map_err(ProvisioningError::BootstrapUnreachable)?;

        let certificate = self
            .control_plane
            .create_keys_and_certificate()
            .await
            .map_err(ProvisioningError::IssuanceFailed)?;
        info!(
            device_id,
            certificate_id = %certificate.certificate_id,
            "certificate issued"
        );

        let mut orphaned = OrphanedResources {
            certificate_arn: certificate.certificate_arn.clone(),
            certificate_id: certificate.certificate_id.clone(),
            ..Default::default()
        };
        let arn = certificate.certificate_arn.as_str();

        let attach_failed =
            |step: AttachStep, source: ControlPlaneError, orphaned: &OrphanedResources| {
                error!(device_id, %step, error = %source, "provisioning step failed");
                ProvisioningError::AttachFailed {
                    step,
                    source,
                    orphaned: orphaned.clone(),
                }
            };

        self.control_plane
            .create_thing(&thing_name)
            .await
            .map_err(|e| attach_failed(AttachStep::CreateThing, e, &orphaned))?;
        orphaned.thing_name = Some(thing_name.clone());

        self.control_plane
            .attach_thing_principal(&thing_name, arn)
            .await
            .map_err(|e| attach_failed(AttachStep::AttachPrincipal, e, &orphaned))?;
        orphaned.principal_attached = true;

        self.control_plane
            .attach_policy(&self.config.policy_name, arn)
            .await
            .map_err(|e| attach_failed(AttachStep::AttachPolicy, e, &orphaned))?;
        orphaned.policy_attached = true;

        if let Err(source) = self
            .control_plane
            .add_thing_to_group(&self.config.thing_group_name, &thing_name)
            .await
        {
            error!(
                device_id,
                group = %self.config.thing_group_name,
                error = %source,
                "thing group attachment failed"
            );
            return Err(ProvisioningError::GroupAttachFailed { source, orphaned });
        }
        orphaned.group_attached = true;

        if let Err(source) = self
            .shadows
            .seed(&thing_name, &ShadowDocument::initial())
            .await
        {
            error!(device_id, thing_name = %thing_name, error = %source, "shadow seed failed");
            return Err(ProvisioningError::SeedFailed { source, orphaned });
        }

        info!(device_id, thing_name = %thing_name, "device provisioned");
        Ok(Provisioned {
            identity: ThingIdentity {
                thing_name,
                certificate_arn: certificate.certificate_arn.clone(),
                policy_name: self.config.policy_name.clone(),
                thing_group: self.config.thing_group_name.clone(),
            },
            certificate,
        })
    }
}
