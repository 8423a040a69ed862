//! Access policy documents.
//!
//! Documents serialise to the control plane's JSON policy grammar
//! (`Version`, `Statement[].Effect/Action/Resource`).

use super::identifiers::{AccountContext, DeviceId};
use crate::errors::{JitpError, JitpResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Policy grammar version understood by the control plane.
pub const POLICY_VERSION: &str = "2012-10-17";

/// Connect to the broker
pub const ACTION_CONNECT: &str = "iot:Connect";
/// Look up the data endpoint
pub const ACTION_DESCRIBE_ENDPOINT: &str = "iot:DescribeEndpoint";
/// Publish to a topic
pub const ACTION_PUBLISH: &str = "iot:Publish";
/// Receive from a topic
pub const ACTION_RECEIVE: &str = "iot:Receive";
/// Subscribe with a topic filter
pub const ACTION_SUBSCRIBE: &str = "iot:Subscribe";

/// Allow or deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    /// Grant the listed actions
    Allow,
    /// Refuse the listed actions
    Deny,
}

/// One statement in a policy document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    /// Allow or deny
    pub effect: Effect,
    /// Actions covered by this statement
    pub action: Vec<String>,
    /// Resource ARN (or `*`)
    pub resource: String,
}

impl PolicyStatement {
    /// An `Allow` statement
    pub fn allow<I, S>(actions: I, resource: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            effect: Effect::Allow,
            action: actions.into_iter().map(Into::into).collect(),
            resource: resource.into(),
        }
    }
}

/// A complete policy document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    /// Grammar version
    pub version: String,
    /// Statements, evaluated as a union of grants
    pub statement: Vec<PolicyStatement>,
}

/// Breadth of the policy attached to a certificate at issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BootstrapScope {
    /// Connect, publish, subscribe and receive on every resource
    #[default]
    Open,
    /// Connect only; no topic access until the device policy is attached
    ConnectOnly,
}

impl FromStr for BootstrapScope {
    type Err = JitpError;

    fn from_str(value: &str) -> JitpResult<Self> {
        match value {
            "open" => Ok(Self::Open),
            "connect-only" => Ok(Self::ConnectOnly),
            other => Err(JitpError::configuration(format!(
                "unknown bootstrap scope '{other}', expected 'open' or 'connect-only'"
            ))),
        }
    }
}

impl PolicyDocument {
    /// Build a document from statements
    pub fn new(statement: Vec<PolicyStatement>) -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            statement,
        }
    }

    /// Least-privilege grant for one device.
    ///
    /// Connect anywhere, publish/receive only on `devices/<id>`, subscribe only
    /// with the `devices/<id>` filter.
    pub fn device_scoped(account: &AccountContext, device: &DeviceId) -> Self {
        Self::new(vec![
            PolicyStatement::allow([ACTION_CONNECT, ACTION_DESCRIBE_ENDPOINT], "*"),
            PolicyStatement::allow(
                [ACTION_PUBLISH, ACTION_RECEIVE],
                account.device_topic_arn(device),
            ),
            PolicyStatement::allow([ACTION_SUBSCRIBE], account.device_topic_filter_arn(device)),
        ])
    }

    /// Grant attached to a freshly issued certificate, before its device is known.
    pub fn bootstrap(scope: BootstrapScope) -> Self {
        match scope {
            BootstrapScope::Open => Self::new(vec![PolicyStatement::allow(
                [ACTION_CONNECT, ACTION_PUBLISH, ACTION_SUBSCRIBE, ACTION_RECEIVE],
                "*",
            )]),
            BootstrapScope::ConnectOnly => {
                Self::new(vec![PolicyStatement::allow([ACTION_CONNECT], "*")])
            }
        }
    }

    /// Serialise for the control plane
    pub fn to_json(&self) -> JitpResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a document returned by the control plane
    pub fn from_json(json: &str) -> JitpResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Whether any statement grants `action` on a resource other than `resource`.
    ///
    /// Used to check that a document does not reach past one device's namespace.
    pub fn grants_outside(&self, action: &str, resource: &str) -> bool {
        self.statement.iter().any(|s| {
            s.effect == Effect::Allow
                && s.action.iter().any(|a| a == action)
                && s.resource != resource
        })
    }
}
