//! Typed identifiers used across provisioning workflows.

use crate::errors::{JitpError, JitpResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest device record name the registry accepts.
pub const MAX_THING_NAME_LEN: usize = 128;

fn non_empty(label: &str, value: &str) -> JitpResult<()> {
    if value.trim().is_empty() {
        return Err(JitpError::malformed_input(format!("{label} must not be empty")));
    }
    Ok(())
}

/// Registry name rules: `[A-Za-z0-9:_-]`, 1 to 128 characters. Policy
/// wildcards and topic separators can never reach an ARN this way.
fn thing_name(label: &str, value: &str) -> JitpResult<()> {
    non_empty(label, value)?;
    if value.len() > MAX_THING_NAME_LEN {
        return Err(JitpError::malformed_input(format!(
            "{label} is longer than {MAX_THING_NAME_LEN} characters"
        )));
    }
    if let Some(bad) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, ':' | '_' | '-')))
    {
        return Err(JitpError::malformed_input(format!(
            "{label} contains '{bad}', allowed are letters, digits, ':', '_' and '-'"
        )));
    }
    Ok(())
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        string_id!($(#[$meta])* $name, $label, non_empty);
    };
    ($(#[$meta:meta])* $name:ident, $label:literal, $check:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Wrap a value, validating it first.
            pub fn new(value: impl Into<String>) -> JitpResult<Self> {
                let value = value.into();
                $check($label, &value)?;
                Ok(Self(value))
            }

            /// Borrow the underlying string
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = JitpError;

            fn try_from(value: String) -> JitpResult<Self> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> String {
                value.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Control-plane identifier of a certificate (`certificateId`).
    CertificateId,
    "certificateId"
);

string_id!(
    /// Device identity taken from a certificate's subject common name.
    ///
    /// Also the name of the device record ("Thing"), so it follows the
    /// registry's naming rules.
    DeviceId,
    "deviceId",
    thing_name
);

string_id!(
    /// Name of an access policy.
    PolicyName,
    "policyName"
);

string_id!(
    /// An authorization principal, i.e. a certificate ARN.
    Principal,
    "principal"
);

impl PolicyName {
    /// Canonical name of the least-privilege policy for a device.
    pub fn for_device(device: &DeviceId) -> Self {
        Self(format!("Policy_Device_{device}"))
    }

    /// Canonical name of the broad policy issued with a certificate.
    pub fn bootstrap(certificate: &CertificateId) -> Self {
        Self(format!("Policy_{certificate}"))
    }
}

/// Region and account that qualify every ARN built by a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountContext {
    /// Control-plane region, e.g. `us-east-2`
    pub region: String,
    /// Owning account id
    pub account_id: String,
}

impl AccountContext {
    /// Create an account context
    pub fn new(region: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            account_id: account_id.into(),
        }
    }

    /// Same region, different account. Used when a trigger names its own account.
    pub fn with_account(&self, account_id: impl Into<String>) -> Self {
        Self::new(self.region.clone(), account_id)
    }

    fn arn(&self, resource: &str) -> String {
        format!("arn:aws:iot:{}:{}:{resource}", self.region, self.account_id)
    }

    /// ARN of a certificate, the principal that policies and records bind to.
    pub fn certificate_arn(&self, certificate: &CertificateId) -> Principal {
        Principal(self.arn(&format!("cert/{certificate}")))
    }

    /// ARN of the topic a device publishes to and receives from.
    pub fn device_topic_arn(&self, device: &DeviceId) -> String {
        self.arn(&format!("topic/devices/{device}"))
    }

    /// ARN of the topic filter a device may subscribe with.
    pub fn device_topic_filter_arn(&self, device: &DeviceId) -> String {
        self.arn(&format!("topicfilter/devices/{device}"))
    }
}
