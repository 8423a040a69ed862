//! Trigger payloads delivered by the event router, and the status object
//! every entry point returns.
//!
//! Payloads are parsed from raw JSON by hand rather than through derived
//! `Deserialize` so that a missing or empty field is reported as
//! [`JitpError::MalformedInput`] naming the field.

use super::certificate::CertificateStatus;
use super::identifiers::{CertificateId, DeviceId, Principal};
use crate::errors::{JitpError, JitpResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn optional_str<'a>(payload: &'a Value, field: &str) -> Option<&'a str> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn required_str<'a>(payload: &'a Value, field: &str, context: &str) -> JitpResult<&'a str> {
    optional_str(payload, field)
        .ok_or_else(|| JitpError::malformed_input(format!("missing {field} in {context} payload")))
}

/// Certificate registration event: `{certificateId, certificateStatus, awsAccountId}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRegistered {
    /// Registered certificate
    pub certificate_id: CertificateId,
    /// Status at registration; absent is treated like any non-pending status
    pub certificate_status: Option<CertificateStatus>,
    /// Owning account, if the event names one
    pub aws_account_id: Option<String>,
}

impl CertificateRegistered {
    /// Parse from the raw event
    pub fn from_value(payload: &Value) -> JitpResult<Self> {
        let context = "certificate registration";
        Ok(Self {
            certificate_id: CertificateId::new(required_str(payload, "certificateId", context)?)?,
            certificate_status: optional_str(payload, "certificateStatus")
                .map(CertificateStatus::parse),
            aws_account_id: optional_str(payload, "awsAccountId").map(str::to_string),
        })
    }
}

/// Device-initiated activation request: `{certificateId, deviceId}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationRequest {
    /// Certificate the device connected with
    pub certificate_id: CertificateId,
    /// Identity the device claims; must match the certificate subject
    pub device_id: DeviceId,
}

impl ActivationRequest {
    /// Parse from the raw event
    pub fn from_value(payload: &Value) -> JitpResult<Self> {
        let context = "activation request";
        Ok(Self {
            certificate_id: CertificateId::new(required_str(payload, "certificateId", context)?)?,
            device_id: DeviceId::new(required_str(payload, "deviceId", context)?)?,
        })
    }
}

/// Internal record-creation call: `{deviceId, certificateArn}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThingCreationRequest {
    /// Record to create
    pub device_id: DeviceId,
    /// Principal to bind
    pub certificate_arn: Principal,
}

impl ThingCreationRequest {
    /// Parse from the raw event
    pub fn from_value(payload: &Value) -> JitpResult<Self> {
        let context = "thing creation";
        Ok(Self {
            device_id: DeviceId::new(required_str(payload, "deviceId", context)?)?,
            certificate_arn: Principal::new(required_str(payload, "certificateArn", context)?)?,
        })
    }
}

/// Explicit record-creation request: `{deviceId, certId}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateThingRequest {
    /// Record to create
    pub device_id: DeviceId,
    /// Certificate whose ARN becomes the principal
    pub certificate_id: CertificateId,
}

impl CreateThingRequest {
    /// Parse from the raw event
    pub fn from_value(payload: &Value) -> JitpResult<Self> {
        let context = "create thing";
        Ok(Self {
            device_id: DeviceId::new(required_str(payload, "deviceId", context)?)?,
            certificate_id: CertificateId::new(required_str(payload, "certId", context)?)?,
        })
    }
}

/// Explicit record-deletion request: `{deviceId}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteThingRequest {
    /// Record to delete
    pub device_id: DeviceId,
}

impl DeleteThingRequest {
    /// Parse from the raw event
    pub fn from_value(payload: &Value) -> JitpResult<Self> {
        Ok(Self {
            device_id: DeviceId::new(required_str(payload, "deviceId", "delete thing")?)?,
        })
    }
}

/// Telemetry message: `{deviceId, ...}`. Everything else is opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDataMessage {
    /// Sending device
    pub device_id: DeviceId,
}

impl DeviceDataMessage {
    /// Parse from the raw event
    pub fn from_value(payload: &Value) -> JitpResult<Self> {
        Ok(Self {
            device_id: DeviceId::new(required_str(payload, "deviceId", "device data")?)?,
        })
    }
}

/// Outcome marker of a handler status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The workflow completed
    Success,
    /// The workflow failed (only seen in replies from invoked functions)
    Error,
}

/// Status object returned by every entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerStatus {
    /// Success or error
    pub status: Outcome,
    /// Certificate the run acted on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_id: Option<String>,
    /// Device the run acted on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Device record the run acted on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thing_name: Option<String>,
    /// Archive key written, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Failure detail (error replies only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HandlerStatus {
    /// A bare success status
    pub fn success() -> Self {
        Self {
            status: Outcome::Success,
            certificate_id: None,
            device_id: None,
            thing_name: None,
            key: None,
            message: None,
        }
    }

    /// An error status carrying a message
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Outcome::Error,
            message: Some(message.into()),
            ..Self::success()
        }
    }

    /// Attach a certificate id
    pub fn with_certificate(mut self, certificate: &CertificateId) -> Self {
        self.certificate_id = Some(certificate.to_string());
        self
    }

    /// Attach a device id
    pub fn with_device(mut self, device: &DeviceId) -> Self {
        self.device_id = Some(device.to_string());
        self
    }

    /// Attach a record name
    pub fn with_thing(mut self, thing: &DeviceId) -> Self {
        self.thing_name = Some(thing.to_string());
        self
    }

    /// Attach an archive key
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Whether the status reports success
    pub fn is_success(&self) -> bool {
        self.status == Outcome::Success
    }
}
