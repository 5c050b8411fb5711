//! Control-plane initializer stack.
//!
//! Every tenant cluster has a `cluster-<id>-host-setup` stack in the
//! control-plane account holding the role the tenant account assumes to reach
//! the control plane. The stack is created with termination protection, so
//! deletion first turns protection off.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::json;
use stratus_cloud::CreateStackInput;
use stratus_reconcile::{Pass, ReconcileError, Resource, Result, ResultExt};
use tracing::{debug, info};

use crate::cluster::TenantCluster;
use crate::keys::{CONTROL_PLANE_CLIENTS, TENANT_ACCOUNT_ID};

pub const NAME: &str = "cpi";

#[derive(Debug, Default)]
pub struct HostSetupStack;

impl HostSetupStack {
    pub fn new() -> Self {
        Self
    }

    /// Template granting the tenant account access to a per-cluster role.
    fn template(obj: &TenantCluster, tenant_account: &str) -> Result<String> {
        let template = json!({
            "AWSTemplateFormatVersion": "2010-09-09",
            "Description": format!("Host setup for tenant cluster {}", obj.cluster_id),
            "Resources": {
                "PeerRole": {
                    "Type": "AWS::IAM::Role",
                    "Properties": {
                        "RoleName": format!("{}-vpc-peer-access", obj.cluster_id),
                        "AssumeRolePolicyDocument": {
                            "Version": "2012-10-17",
                            "Statement": [{
                                "Effect": "Allow",
                                "Principal": { "AWS": format!("arn:aws:iam::{tenant_account}:root") },
                                "Action": "sts:AssumeRole"
                            }]
                        }
                    }
                }
            },
            "Outputs": {
                "PeerRoleArn": { "Value": { "Fn::GetAtt": ["PeerRole", "Arn"] } }
            }
        });

        serde_json::to_string(&template).map_err(|e| {
            ReconcileError::execution("rendering host setup template").with_source(e)
        })
    }
}

#[async_trait]
impl Resource<TenantCluster> for HostSetupStack {
    fn name(&self) -> &str {
        NAME
    }

    async fn ensure_created(&self, pass: &mut Pass, obj: &TenantCluster) -> Result<()> {
        let client = pass.context().require(&CONTROL_PLANE_CLIENTS)?.cloudformation.clone();
        let tenant_account = pass.context().require(&TENANT_ACCOUNT_ID)?.clone();
        let stack_name = obj.host_setup_stack_name();

        match pass
            .guard("describe stack", client.describe_stack(&stack_name))
            .await
        {
            Ok(stack) => {
                debug!(stack = %stack_name, status = ?stack.status, "host setup stack exists");
                return Ok(());
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.context(format!("describing stack {stack_name}"))),
        }

        info!(cluster_id = %obj.cluster_id, stack = %stack_name, "creating host setup stack");

        let input = CreateStackInput {
            name: stack_name.clone(),
            template_body: Self::template(obj, &tenant_account)?,
            enable_termination_protection: true,
            tags: BTreeMap::from([(
                "stratus.io/cluster".to_string(),
                obj.cluster_id.clone(),
            )]),
        };

        match pass
            .guard("create stack", client.create_stack(input))
            .await
        {
            Ok(()) => info!(cluster_id = %obj.cluster_id, stack = %stack_name, "created host setup stack"),
            Err(e) if e.is_already_exists() => {
                debug!(stack = %stack_name, "host setup stack created concurrently")
            }
            Err(e) => {
                return Err(e
                    .into_execution()
                    .context(format!("creating stack {stack_name}")))
            }
        }
        Ok(())
    }

    async fn ensure_deleted(&self, pass: &mut Pass, obj: &TenantCluster) -> Result<()> {
        let client = pass.context().require(&CONTROL_PLANE_CLIENTS)?.cloudformation.clone();
        let stack_name = obj.host_setup_stack_name();

        info!(cluster_id = %obj.cluster_id, stack = %stack_name, "disabling termination protection");

        // A stack that is gone or already deleting cancels the pass.
        pass.guard(
            "update termination protection",
            client.update_termination_protection(&stack_name, false),
        )
        .await
        .with_context(|| format!("disabling termination protection of {stack_name}"))?;

        info!(cluster_id = %obj.cluster_id, stack = %stack_name, "deleting host setup stack");

        pass.guard("delete stack", client.delete_stack(&stack_name))
            .await
            .with_context(|| format!("deleting stack {stack_name}"))?;

        info!(cluster_id = %obj.cluster_id, stack = %stack_name, "requested host setup stack deletion");
        Ok(())
    }
}
