//! In-memory cloud for tests and local simulation.
//!
//! [`MemoryCloud`] keeps hosted zones, stacks and volumes per account and
//! records every call. Deletions and detachments are eventually consistent:
//! they stay in progress until [`MemoryCloud::settle`] is called, the way a
//! real provider finishes them some time after the request returns.
//!
//! Faults can be injected per operation and target (e.g. hang the zone
//! lookup for one name) to exercise partial failure.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use stratus_reconcile::{ErrorKind, ReconcileError, Result};
use tracing::debug;

use crate::cloudformation::{self, CloudFormation, CreateStackInput, Stack, StackStatus};
use crate::credentials::{AwsClients, ClientFactory, CredentialResolver, RoleArn};
use crate::dns::{self, ChangeAction, Dns, HostedZone, RecordChange, RecordSet, RecordType};
use crate::ec2::{self, AttachmentState, Ec2, Volume, VolumeState};

/// TTL of the NS record set a new zone is seeded with.
pub const ZONE_NS_TTL: u64 = 172_800;

/// Operation names used for call matching and fault injection.
pub mod op {
    pub const LIST_HOSTED_ZONES: &str = "list_hosted_zones";
    pub const LIST_RECORD_SETS: &str = "list_record_sets";
    pub const CHANGE_RECORD_SETS: &str = "change_record_sets";
    pub const DESCRIBE_STACK: &str = "describe_stack";
    pub const CREATE_STACK: &str = "create_stack";
    pub const UPDATE_TERMINATION_PROTECTION: &str = "update_termination_protection";
    pub const DELETE_STACK: &str = "delete_stack";
    pub const DESCRIBE_VOLUMES: &str = "describe_volumes";
    pub const DETACH_VOLUME: &str = "detach_volume";
    pub const DELETE_VOLUME: &str = "delete_volume";
}

/// A recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub account: String,
    pub op: &'static str,
    /// Zone name, zone ID, stack name or volume ID the call targeted.
    pub target: String,
    /// Record changes for `change_record_sets`, empty otherwise.
    pub changes: Vec<RecordChange>,
}

impl Call {
    /// Returns true for calls that change cloud state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self.op,
            op::CHANGE_RECORD_SETS
                | op::CREATE_STACK
                | op::UPDATE_TERMINATION_PROTECTION
                | op::DELETE_STACK
                | op::DETACH_VOLUME
                | op::DELETE_VOLUME
        )
    }
}

struct Zone {
    id: String,
    name: String,
    records: Vec<RecordSet>,
}

#[derive(Default)]
struct AccountState {
    zones: Vec<Zone>,
    stacks: BTreeMap<String, Stack>,
    volumes: BTreeMap<String, Volume>,
}

#[derive(Default)]
struct Inner {
    accounts: BTreeMap<String, AccountState>,
    principals: BTreeMap<String, RoleArn>,
    default_tenant_role: Option<RoleArn>,
    calls: Vec<Call>,
    faults: BTreeMap<(String, String), ErrorKind>,
    hangs: BTreeSet<(String, String)>,
    latency: Option<Duration>,
    next_zone: u64,
}

/// In-memory multi-account cloud.
#[derive(Clone)]
pub struct MemoryCloud {
    control_plane_account: String,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryCloud {
    /// Create an empty cloud whose control-plane clients act in the given
    /// account.
    pub fn new(control_plane_account: impl Into<String>) -> Self {
        Self {
            control_plane_account: control_plane_account.into(),
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn control_plane_account(&self) -> &str {
        &self.control_plane_account
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clients acting in one account.
    pub fn account(&self, account_id: &str) -> MemoryAccount {
        MemoryAccount {
            account_id: account_id.to_string(),
            inner: Arc::clone(&self.inner),
        }
    }

    // ---------------------------------------------------------------------
    // Credentials
    // ---------------------------------------------------------------------

    pub fn add_principal(&self, principal: impl Into<String>, role: RoleArn) {
        self.lock().principals.insert(principal.into(), role);
    }

    pub fn set_default_tenant_role(&self, role: RoleArn) {
        self.lock().default_tenant_role = Some(role);
    }

    // ---------------------------------------------------------------------
    // Seeding and inspection
    // ---------------------------------------------------------------------

    /// Create a hosted zone with an NS record set. Returns the zone ID.
    pub fn create_hosted_zone(&self, account: &str, name: &str, name_servers: Vec<String>) -> String {
        let mut inner = self.lock();
        inner.next_zone += 1;
        let id = format!("/hostedzone/Z{:012}", inner.next_zone);
        let name = dns::normalize_name(name);

        let records = vec![
            RecordSet::ns(name.clone(), ZONE_NS_TTL, name_servers.clone()),
            RecordSet {
                name: name.clone(),
                record_type: RecordType::Soa,
                ttl: 900,
                values: vec![format!(
                    "{} hostmaster.{} 1 7200 900 1209600 86400",
                    name_servers.first().map(String::as_str).unwrap_or("ns"),
                    name
                )],
            },
        ];

        inner
            .accounts
            .entry(account.to_string())
            .or_default()
            .zones
            .push(Zone {
                id: id.clone(),
                name,
                records,
            });
        id
    }

    /// Insert or replace a record set.
    pub fn put_record(&self, account: &str, zone_id: &str, record: RecordSet) {
        let mut inner = self.lock();
        if let Some(zone) = inner
            .accounts
            .get_mut(account)
            .and_then(|a| a.zones.iter_mut().find(|z| z.id == zone_id))
        {
            upsert(&mut zone.records, record);
        }
    }

    /// Look up a record set by exact name and type.
    pub fn record(
        &self,
        account: &str,
        zone_id: &str,
        name: &str,
        record_type: RecordType,
    ) -> Option<RecordSet> {
        let inner = self.lock();
        let zone = inner
            .accounts
            .get(account)?
            .zones
            .iter()
            .find(|z| z.id == zone_id)?;
        zone.records
            .iter()
            .find(|r| dns::names_match(&r.name, name) && r.record_type == record_type)
            .cloned()
    }

    pub fn put_stack(&self, account: &str, stack: Stack) {
        self.lock()
            .accounts
            .entry(account.to_string())
            .or_default()
            .stacks
            .insert(stack.name.clone(), stack);
    }

    pub fn stack(&self, account: &str, name: &str) -> Option<Stack> {
        self.lock().accounts.get(account)?.stacks.get(name).cloned()
    }

    pub fn put_volume(&self, account: &str, volume: Volume) {
        self.lock()
            .accounts
            .entry(account.to_string())
            .or_default()
            .volumes
            .insert(volume.id.clone(), volume);
    }

    pub fn volume(&self, account: &str, id: &str) -> Option<Volume> {
        self.lock().accounts.get(account)?.volumes.get(id).cloned()
    }

    /// Finish every pending stack deletion and volume detachment.
    pub fn settle(&self) {
        let mut inner = self.lock();
        for account in inner.accounts.values_mut() {
            account
                .stacks
                .retain(|_, s| !s.status.is_delete_in_progress());

            for volume in account.volumes.values_mut() {
                volume
                    .attachments
                    .retain(|a| a.state != AttachmentState::Detaching);
                if volume.attachments.is_empty() && volume.state == VolumeState::InUse {
                    volume.state = VolumeState::Available;
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Faults
    // ---------------------------------------------------------------------

    /// Make every call of `op` against `target` fail with `kind`.
    pub fn fail(&self, op: &str, target: &str, kind: ErrorKind) {
        self.lock()
            .faults
            .insert((op.to_string(), dns::normalize_name(target)), kind);
    }

    /// Make every call of `op` against `target` hang forever.
    pub fn hang(&self, op: &str, target: &str) {
        self.lock()
            .hangs
            .insert((op.to_string(), dns::normalize_name(target)));
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = Some(latency);
    }

    pub fn clear_faults(&self) {
        let mut inner = self.lock();
        inner.faults.clear();
        inner.hangs.clear();
        inner.latency = None;
    }

    // ---------------------------------------------------------------------
    // Call log
    // ---------------------------------------------------------------------

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Calls that changed (or tried to change) cloud state.
    pub fn mutations(&self) -> Vec<Call> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    /// Calls of one operation.
    pub fn calls_of(&self, op: &str) -> Vec<Call> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.op == op)
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }
}

impl ClientFactory for MemoryCloud {
    fn control_plane(&self) -> Result<AwsClients> {
        Ok(self.account(&self.control_plane_account).into_clients())
    }

    fn for_role(&self, role: &RoleArn) -> Result<AwsClients> {
        Ok(self.account(role.account_id()).into_clients())
    }
}

#[async_trait]
impl CredentialResolver for MemoryCloud {
    async fn resolve(&self, principal: &str) -> Result<RoleArn> {
        self.lock()
            .principals
            .get(principal)
            .cloned()
            .ok_or_else(|| ReconcileError::not_found(format!("credential {principal:?}")))
    }

    async fn default_tenant_role(&self) -> Result<RoleArn> {
        self.lock()
            .default_tenant_role
            .clone()
            .ok_or_else(|| ReconcileError::not_found("default tenant credential"))
    }
}

/// Clients of a [`MemoryCloud`] acting in one account.
#[derive(Clone)]
pub struct MemoryAccount {
    account_id: String,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryAccount {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn into_clients(self) -> AwsClients {
        let this = Arc::new(self);
        AwsClients {
            account_id: this.account_id.clone(),
            dns: Arc::clone(&this) as Arc<dyn Dns>,
            cloudformation: Arc::clone(&this) as Arc<dyn CloudFormation>,
            ec2: this,
        }
    }

    /// Record a call, then apply latency, hangs and injected faults.
    async fn enter(&self, op: &'static str, target: &str, changes: Vec<RecordChange>) -> Result<()> {
        let key = (op.to_string(), dns::normalize_name(target));
        let (latency, hang, fault) = {
            let mut inner = self.lock();
            inner.calls.push(Call {
                account: self.account_id.clone(),
                op,
                target: target.to_string(),
                changes,
            });
            (
                inner.latency,
                inner.hangs.contains(&key),
                inner.faults.get(&key).copied(),
            )
        };

        debug!(account = %self.account_id, op, target, "[MEMORY] call");

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if hang {
            std::future::pending::<()>().await;
        }
        match fault {
            Some(kind) => Err(injected(kind, op, target)),
            None => Ok(()),
        }
    }

    fn with_account<T>(&self, f: impl FnOnce(&mut AccountState) -> T) -> T {
        let mut inner = self.lock();
        let account = inner.accounts.entry(self.account_id.clone()).or_default();
        f(account)
    }
}

fn injected(kind: ErrorKind, op: &str, target: &str) -> ReconcileError {
    let message = format!("injected fault: {op} {target}");
    match kind {
        ErrorKind::NotFound => ReconcileError::not_found(message),
        ErrorKind::AlreadyExists => ReconcileError::already_exists(message),
        ErrorKind::OperationInProgress => ReconcileError::operation_in_progress(message),
        ErrorKind::Execution => ReconcileError::execution(message),
        ErrorKind::InvalidConfig => ReconcileError::invalid_config(message),
        ErrorKind::Transport => ReconcileError::transport(message),
        ErrorKind::Cancelled => ReconcileError::cancelled(message),
    }
}

/// Route53 orders names label by label, starting from the root.
fn sort_key(name: &str) -> Vec<String> {
    dns::normalize_name(name)
        .rsplit('.')
        .map(str::to_string)
        .collect()
}

fn upsert(records: &mut Vec<RecordSet>, record: RecordSet) {
    let name = dns::normalize_name(&record.name);
    let record = RecordSet { name, ..record };
    match records
        .iter_mut()
        .find(|r| r.name == record.name && r.record_type == record.record_type)
    {
        Some(existing) => *existing = record,
        None => records.push(record),
    }
}

#[async_trait]
impl Dns for MemoryAccount {
    async fn list_hosted_zones_by_name(&self, dns_name: &str) -> Result<Vec<HostedZone>> {
        self.enter(op::LIST_HOSTED_ZONES, dns_name, Vec::new()).await?;

        let start = sort_key(dns_name);
        let mut zones = self.with_account(|a| {
            a.zones
                .iter()
                .map(|z| (sort_key(&z.name), z.id.clone(), z.name.clone()))
                .filter(|(key, _, _)| *key >= start)
                .collect::<Vec<_>>()
        });
        zones.sort();

        Ok(zones
            .into_iter()
            .take(100)
            .map(|(_, id, name)| HostedZone {
                id,
                name: format!("{name}."),
            })
            .collect())
    }

    async fn list_record_sets(
        &self,
        zone_id: &str,
        start_name: &str,
        start_type: RecordType,
        max_items: usize,
    ) -> Result<Vec<RecordSet>> {
        self.enter(op::LIST_RECORD_SETS, zone_id, Vec::new()).await?;

        self.with_account(|a| -> Result<Vec<RecordSet>> {
            let zone = a.zones.iter().find(|z| z.id == zone_id).ok_or_else(|| {
                dns::classify_error(
                    "NoSuchHostedZone",
                    &format!("No hosted zone found with ID: {zone_id}"),
                )
            })?;

            let start = (sort_key(start_name), start_type);
            let mut records: Vec<_> = zone
                .records
                .iter()
                .map(|r| ((sort_key(&r.name), r.record_type), r))
                .filter(|(key, _)| *key >= start)
                .collect();
            records.sort_by(|x, y| x.0.cmp(&y.0));

            Ok(records
                .into_iter()
                .take(max_items)
                .map(|(_, r)| RecordSet {
                    name: format!("{}.", r.name),
                    ..r.clone()
                })
                .collect())
        })
    }

    async fn change_record_sets(&self, zone_id: &str, changes: Vec<RecordChange>) -> Result<()> {
        self.enter(op::CHANGE_RECORD_SETS, zone_id, changes.clone())
            .await?;

        self.with_account(|a| -> Result<()> {
            let zone = a.zones.iter_mut().find(|z| z.id == zone_id).ok_or_else(|| {
                dns::classify_error(
                    "NoSuchHostedZone",
                    &format!("No hosted zone found with ID: {zone_id}"),
                )
            })?;

            // Validate the whole batch before applying any of it.
            let mut records = zone.records.clone();
            for change in changes {
                let name = dns::normalize_name(&change.record.name);
                let position = records
                    .iter()
                    .position(|r| r.name == name && r.record_type == change.record.record_type);

                match (change.action, position) {
                    (ChangeAction::Upsert, _) => upsert(&mut records, change.record),
                    (ChangeAction::Create, Some(_)) => {
                        return Err(dns::classify_error(
                            "InvalidChangeBatch",
                            &format!(
                                "Tried to create resource record set [name='{name}.', type='{}'] but it already exists",
                                change.record.record_type
                            ),
                        ));
                    }
                    (ChangeAction::Create, None) => upsert(&mut records, change.record),
                    (ChangeAction::Delete, None) => {
                        return Err(dns::classify_error(
                            "InvalidChangeBatch",
                            &format!(
                                "Tried to delete resource record set [name='{name}.', type='{}'] but it was not found",
                                change.record.record_type
                            ),
                        ));
                    }
                    (ChangeAction::Delete, Some(i)) => {
                        let live = &records[i];
                        if live.ttl != change.record.ttl || live.values != change.record.values {
                            return Err(dns::classify_error(
                                "InvalidChangeBatch",
                                &format!(
                                    "Tried to delete resource record set [name='{name}.', type='{}'] but the values provided do not match the current values",
                                    change.record.record_type
                                ),
                            ));
                        }
                        records.remove(i);
                    }
                }
            }

            zone.records = records;
            Ok(())
        })
    }
}

#[async_trait]
impl CloudFormation for MemoryAccount {
    async fn describe_stack(&self, name: &str) -> Result<Stack> {
        self.enter(op::DESCRIBE_STACK, name, Vec::new()).await?;

        self.with_account(|a| {
            a.stacks.get(name).cloned().ok_or_else(|| {
                cloudformation::classify_error(
                    "ValidationError",
                    &format!("Stack with id {name} does not exist"),
                )
            })
        })
    }

    async fn create_stack(&self, input: CreateStackInput) -> Result<()> {
        self.enter(op::CREATE_STACK, &input.name, Vec::new()).await?;

        self.with_account(|a| {
            if a.stacks.contains_key(&input.name) {
                return Err(cloudformation::classify_error(
                    "AlreadyExistsException",
                    &format!("Stack [{}] already exists", input.name),
                ));
            }
            a.stacks.insert(
                input.name.clone(),
                Stack {
                    name: input.name,
                    status: StackStatus::CreateComplete,
                    termination_protection: input.enable_termination_protection,
                    outputs: BTreeMap::new(),
                },
            );
            Ok(())
        })
    }

    async fn update_termination_protection(&self, name: &str, enabled: bool) -> Result<()> {
        self.enter(op::UPDATE_TERMINATION_PROTECTION, name, Vec::new())
            .await?;

        self.with_account(|a| -> Result<()> {
            let stack = a.stacks.get_mut(name).ok_or_else(|| {
                cloudformation::classify_error(
                    "ValidationError",
                    &format!("Stack [{name}] does not exist"),
                )
            })?;
            if stack.status.is_delete_in_progress() {
                return Err(cloudformation::classify_error(
                    "ValidationError",
                    &format!("Stack [{name}] cannot be updated while in status DELETE_IN_PROGRESS"),
                ));
            }
            stack.termination_protection = enabled;
            Ok(())
        })
    }

    async fn delete_stack(&self, name: &str) -> Result<()> {
        self.enter(op::DELETE_STACK, name, Vec::new()).await?;

        self.with_account(|a| {
            let Some(stack) = a.stacks.get_mut(name) else {
                return Ok(());
            };
            if stack.termination_protection {
                return Err(cloudformation::classify_error(
                    "ValidationError",
                    &format!(
                        "Stack [{name}] cannot be deleted while TerminationProtection is enabled"
                    ),
                ));
            }
            stack.status = StackStatus::DeleteInProgress;
            Ok(())
        })
    }
}

#[async_trait]
impl Ec2 for MemoryAccount {
    async fn describe_volumes_by_tag(&self, key: &str, value: Option<&str>) -> Result<Vec<Volume>> {
        self.enter(op::DESCRIBE_VOLUMES, key, Vec::new()).await?;

        Ok(self.with_account(|a| {
            a.volumes
                .values()
                .filter(|v| match (v.tags.get(key), value) {
                    (Some(actual), Some(expected)) => actual == expected,
                    (Some(_), None) => true,
                    (None, _) => false,
                })
                .cloned()
                .collect()
        }))
    }

    async fn detach_volume(&self, volume_id: &str, instance_id: &str, _force: bool) -> Result<()> {
        self.enter(op::DETACH_VOLUME, volume_id, Vec::new()).await?;

        self.with_account(|a| -> Result<()> {
            let volume = a.volumes.get_mut(volume_id).ok_or_else(|| {
                ec2::classify_error(
                    "InvalidVolume.NotFound",
                    &format!("The volume '{volume_id}' does not exist."),
                )
            })?;
            let attachment = volume
                .attachments
                .iter_mut()
                .find(|att| att.instance_id == instance_id)
                .ok_or_else(|| {
                    ec2::classify_error(
                        "InvalidAttachment.NotFound",
                        &format!("Volume {volume_id} is not attached to {instance_id}"),
                    )
                })?;
            attachment.state = AttachmentState::Detaching;
            Ok(())
        })
    }

    async fn delete_volume(&self, volume_id: &str) -> Result<()> {
        self.enter(op::DELETE_VOLUME, volume_id, Vec::new()).await?;

        self.with_account(|a| -> Result<()> {
            let volume = a.volumes.get(volume_id).ok_or_else(|| {
                ec2::classify_error(
                    "InvalidVolume.NotFound",
                    &format!("The volume '{volume_id}' does not exist."),
                )
            })?;
            if volume.is_attached() {
                return Err(ec2::classify_error(
                    "VolumeInUse",
                    &format!("Volume {volume_id} is currently attached"),
                ));
            }
            a.volumes.remove(volume_id);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCOUNT: &str = "111111111111";

    fn ns(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn test_zone_listing_is_lexicographic_by_reversed_labels() {
        let cloud = MemoryCloud::new(ACCOUNT);
        cloud.create_hosted_zone(ACCOUNT, "9cvgo.k8s.example.io", ns(&["ns-3"]));
        cloud.create_hosted_zone(ACCOUNT, "k8s.example.io", ns(&["ns-1"]));
        cloud.create_hosted_zone(ACCOUNT, "0tz6i.k8s.example.io", ns(&["ns-2"]));
        cloud.create_hosted_zone(ACCOUNT, "example.com", ns(&["ns-4"]));

        let client = cloud.account(ACCOUNT);
        let zones = client.list_hosted_zones_by_name("k8s.example.io").await.unwrap();
        let names: Vec<_> = zones.iter().map(|z| z.name.as_str()).collect();

        assert_eq!(
            names,
            vec![
                "k8s.example.io.",
                "0tz6i.k8s.example.io.",
                "9cvgo.k8s.example.io."
            ]
        );
    }

    #[tokio::test]
    async fn test_zone_listing_compares_whole_labels() {
        let cloud = MemoryCloud::new(ACCOUNT);
        cloud.create_hosted_zone(ACCOUNT, "k8s-a.example.io", ns(&["ns-1"]));
        cloud.create_hosted_zone(ACCOUNT, "c1.k8s.example.io", ns(&["ns-2"]));
        cloud.create_hosted_zone(ACCOUNT, "k8s.example.io", ns(&["ns-3"]));

        let client = cloud.account(ACCOUNT);
        let zones = client.list_hosted_zones_by_name("k8s.example.io").await.unwrap();
        let names: Vec<_> = zones.iter().map(|z| z.name.as_str()).collect();

        // Every name under k8s.example.io sorts before the sibling label k8s-a.
        assert_eq!(
            names,
            vec!["k8s.example.io.", "c1.k8s.example.io.", "k8s-a.example.io."]
        );
    }

    #[tokio::test]
    async fn test_delete_requires_matching_ttl() {
        let cloud = MemoryCloud::new(ACCOUNT);
        let zone = cloud.create_hosted_zone(ACCOUNT, "k8s.example.io", ns(&["ns-1"]));
        cloud.put_record(
            ACCOUNT,
            &zone,
            RecordSet::ns("c1.k8s.example.io", 300, ns(&["ns-9"])),
        );
        let client = cloud.account(ACCOUNT);

        let wrong_ttl = RecordChange {
            action: ChangeAction::Delete,
            record: RecordSet::ns("c1.k8s.example.io", 900, ns(&["ns-9"])),
        };
        let err = client
            .change_record_sets(&zone, vec![wrong_ttl])
            .await
            .unwrap_err();
        assert!(err.is_execution());

        let exact = RecordChange {
            action: ChangeAction::Delete,
            record: RecordSet::ns("c1.k8s.example.io.", 300, ns(&["ns-9"])),
        };
        client.change_record_sets(&zone, vec![exact]).await.unwrap();
        assert!(cloud
            .record(ACCOUNT, &zone, "c1.k8s.example.io", RecordType::Ns)
            .is_none());
    }

    #[tokio::test]
    async fn test_stack_deletion_is_eventual() {
        let cloud = MemoryCloud::new(ACCOUNT);
        let client = cloud.account(ACCOUNT);
        client
            .create_stack(CreateStackInput {
                name: "s1".to_string(),
                template_body: "{}".to_string(),
                enable_termination_protection: true,
                tags: BTreeMap::new(),
            })
            .await
            .unwrap();

        let err = client.delete_stack("s1").await.unwrap_err();
        assert!(err.is_execution());

        client.update_termination_protection("s1", false).await.unwrap();
        client.delete_stack("s1").await.unwrap();

        let err = client
            .update_termination_protection("s1", false)
            .await
            .unwrap_err();
        assert!(err.is_operation_in_progress());

        cloud.settle();
        let err = client.describe_stack("s1").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_injected_fault() {
        let cloud = MemoryCloud::new(ACCOUNT);
        cloud.fail(op::LIST_HOSTED_ZONES, "k8s.example.io.", ErrorKind::Transport);

        let err = cloud
            .account(ACCOUNT)
            .list_hosted_zones_by_name("k8s.example.io")
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(cloud.calls_of(op::LIST_HOSTED_ZONES).len(), 1);
        assert!(cloud.mutations().is_empty());
    }
}
