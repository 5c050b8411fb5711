//! Credential resolution and scoped client construction.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stratus_reconcile::{ReconcileError, Result};

use crate::cloudformation::CloudFormation;
use crate::dns::Dns;
use crate::ec2::Ec2;

/// IAM role ARN, e.g. `arn:aws:iam::123456789012:role/GiantSwarmAWSOperator`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoleArn {
    arn: String,
    account_id: String,
}

impl RoleArn {
    pub fn as_str(&self) -> &str {
        &self.arn
    }

    /// The 12-digit account the role lives in.
    pub fn account_id(&self) -> &str {
        &self.account_id
    }
}

impl FromStr for RoleArn {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ReconcileError::invalid_config(format!("invalid role ARN {s:?}"));

        // arn:<partition>:iam::<account>:role/<name>
        let parts: Vec<&str> = s.splitn(6, ':').collect();
        let [prefix, partition, service, region, account, resource] = parts.as_slice() else {
            return Err(invalid());
        };

        if *prefix != "arn" || partition.is_empty() || *service != "iam" || !region.is_empty() {
            return Err(invalid());
        }
        if account.len() != 12 || !account.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        match resource.strip_prefix("role/") {
            Some(name) if !name.is_empty() => {}
            _ => return Err(invalid()),
        }

        Ok(Self {
            arn: s.to_string(),
            account_id: account.to_string(),
        })
    }
}

impl TryFrom<String> for RoleArn {
    type Error = ReconcileError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<RoleArn> for String {
    fn from(value: RoleArn) -> Self {
        value.arn
    }
}

impl fmt::Display for RoleArn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.arn)
    }
}

/// Clients scoped to one account.
#[derive(Clone)]
pub struct AwsClients {
    pub account_id: String,
    pub dns: Arc<dyn Dns>,
    pub cloudformation: Arc<dyn CloudFormation>,
    pub ec2: Arc<dyn Ec2>,
}

impl fmt::Debug for AwsClients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsClients")
            .field("account_id", &self.account_id)
            .finish_non_exhaustive()
    }
}

/// Resolves principals to roles.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Role to assume for the given principal (e.g. a tenant credential name).
    ///
    /// Unknown principals are NotFound.
    async fn resolve(&self, principal: &str) -> Result<RoleArn>;

    /// Role of the installation's default tenant account.
    async fn default_tenant_role(&self) -> Result<RoleArn>;
}

/// Builds account-scoped clients.
pub trait ClientFactory: Send + Sync {
    /// Clients for the control-plane (host) account.
    fn control_plane(&self) -> Result<AwsClients>;

    /// Clients assuming the given role.
    fn for_role(&self, role: &RoleArn) -> Result<AwsClients>;
}
