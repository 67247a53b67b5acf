//! Device identity provisioning.
//!
//! - `IdentityControlPlane` seam over the broker's registry, with
//!   `AwsIotControlPlane` for production and `MockControlPlane` for tests
//! - `ProvisioningWorkflow` onboarding a device end to end

pub mod aws;
pub mod config;
pub mod control_plane;
pub mod mock;
pub mod workflow;

pub use aws::AwsIotControlPlane;
pub use config::ProvisioningConfig;
pub use control_plane::{ControlPlaneError, ControlPlaneResult, IdentityControlPlane};
pub use mock::MockControlPlane;
pub use workflow::{
    AttachStep, OrphanedResources, Provisioned, ProvisioningError, ProvisioningResult,
    ProvisioningWorkflow,
};
