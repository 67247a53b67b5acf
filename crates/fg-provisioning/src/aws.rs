//! AWS IoT control plane backed by `aws-sdk-iot`.

use async_trait::async_trait;
use aws_sdk_iot::Client as IotClient;
use aws_sdk_iot::error::DisplayErrorContext;
use fg_protocol::{CertificateBundle, PrivateKeyPem};

use crate::control_plane::{ControlPlaneError, ControlPlaneResult, IdentityControlPlane};

fn request_error<E: std::error::Error>(operation: &'static str, e: E) -> ControlPlaneError {
    ControlPlaneError::Request {
        operation,
        message: DisplayErrorContext(e).to_string(),
    }
}

fn required<'a>(
    operation: &'static str,
    field: &'static str,
    value: Option<&'a str>,
) -> ControlPlaneResult<&'a str> {
    value.ok_or(ControlPlaneError::MissingField { operation, field })
}

pub struct AwsIotControlPlane {
    client: IotClient,
}

impl AwsIotControlPlane {
    /// Create a control plane with a pre-built IoT client.
    pub fn new(client: IotClient) -> Self {
        Self { client }
    }

    /// Build a client from the default AWS credential chain, optionally
    /// pinned to `region`.
    pub async fn from_env(region: Option<String>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region.clone() {
            loader = loader.region(aws_config::Region::new(region));
        }
        let sdk_config = loader.load().await;

        tracing::info!(
            region = region.as_deref().unwrap_or("default"),
            "AWS IoT control plane initialized"
        );
        Self::new(IotClient::new(&sdk_config))
    }
}

#[async_trait]
impl IdentityControlPlane for AwsIotControlPlane {
    async fn create_keys_and_certificate(&self) -> ControlPlaneResult<CertificateBundle> {
        const OP: &str = "CreateKeysAndCertificate";
        let output = self
            .client
            .create_keys_and_certificate()
            .set_as_active(true)
            .send()
            .await
            .map_err(|e| request_error(OP, e))?;

        let key_pair = output
            .key_pair()
            .ok_or(ControlPlaneError::MissingField {
                operation: OP,
                field: "keyPair",
            })?;

        Ok(CertificateBundle {
            certificate_arn: required(OP, "certificateArn", output.certificate_arn())?.to_string(),
            certificate_id: required(OP, "certificateId", output.certificate_id())?.to_string(),
            certificate_pem: required(OP, "certificatePem", output.certificate_pem())?.to_string(),
            private_key: PrivateKeyPem::new(required(
                OP,
                "keyPair.PrivateKey",
                key_pair.private_key(),
            )?),
            public_key_pem: required(OP, "keyPair.PublicKey", key_pair.public_key())?.to_string(),
        })
    }

    async fn create_thing(&self, thing_name: &str) -> ControlPlaneResult<()> {
        self.client
            .create_thing()
            .thing_name(thing_name)
            .send()
            .await
            .map_err(|e| request_error("CreateThing", e))?;
        Ok(())
    }

    async fn attach_thing_principal(
        &self,
        thing_name: &str,
        certificate_arn: &str,
    ) -> ControlPlaneResult<()> {
        self.client
            .attach_thing_principal()
            .thing_name(thing_name)
            .principal(certificate_arn)
            .send()
            .await
            .map_err(|e| request_error("AttachThingPrincipal", e))?;
        Ok(())
    }

    async fn attach_policy(
        &self,
        policy_name: &str,
        certificate_arn: &str,
    ) -> ControlPlaneResult<()> {
        self.client
            .attach_policy()
            .policy_name(policy_name)
            .target(certificate_arn)
            .send()
            .await
            .map_err(|e| request_error("AttachPolicy", e))?;
        Ok(())
    }

    async fn add_thing_to_group(
        &self,
        group_name: &str,
        thing_name: &str,
    ) -> ControlPlaneResult<()> {
        self.client
            .add_thing_to_thing_group()
            .thing_group_name(group_name)
            .thing_name(thing_name)
            .send()
            .await
            .map_err(|e| request_error("AddThingToThingGroup", e))?;
        Ok(())
    }
}
