//! DNS delegation from the intermediate zone to the cluster zone.
//!
//! The intermediate zone `k8s.<base domain>` lives in the default tenant
//! account and is shared by every cluster of the installation. Each cluster
//! owns `<cluster id>.k8s.<base domain>` in its own account. This resource
//! keeps an NS record for the cluster zone in the intermediate zone.
//!
//! Create: look up both zones concurrently, read the cluster zone's name
//! servers and upsert the delegation with the configured TTL. A missing zone
//! cancels the pass. Delete: look up the intermediate zone, read the
//! delegation back and delete it with the TTL it currently has.

use std::sync::Arc;

use async_trait::async_trait;
use stratus_cloud::dns::{self, ChangeAction, Dns, RecordChange, RecordSet, RecordType};
use stratus_cloud::{ClientFactory, CredentialResolver};
use stratus_reconcile::{
    ContextKey, CrudResource, Operation, Pass, ReconcileError, Result, ResultExt,
};
use tracing::{debug, info};

use crate::cluster::TenantCluster;
use crate::keys::{HOSTED_ZONE_NAME_SERVERS, TENANT_CLIENTS};

pub const NAME: &str = "bridgezone";

/// Zones found by the current-state read, for the rest of the pass.
const ZONES: ContextKey<Zones> = ContextKey::new("bridgezone.zones");

struct Zones {
    intermediate_id: String,
    intermediate_dns: Arc<dyn Dns>,
    final_id: Option<String>,
}

/// The NS record delegating the cluster zone, and the zone holding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delegation {
    pub zone_id: String,
    pub record: RecordSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelegationChange {
    Upsert(Delegation),
    Delete(Delegation),
}

/// Bridgezone settings.
#[derive(Debug, Clone)]
pub struct BridgeZoneConfig {
    /// When false both operations return immediately.
    pub route53_enabled: bool,

    /// TTL written on the delegation record.
    pub delegation_ttl: u64,
}

pub struct BridgeZone {
    config: BridgeZoneConfig,
    resolver: Arc<dyn CredentialResolver>,
    factory: Arc<dyn ClientFactory>,
}

impl BridgeZone {
    pub fn new(
        config: BridgeZoneConfig,
        resolver: Arc<dyn CredentialResolver>,
        factory: Arc<dyn ClientFactory>,
    ) -> Result<Self> {
        if config.delegation_ttl == 0 {
            return Err(ReconcileError::invalid_config(
                "bridgezone delegation TTL must be positive",
            ));
        }
        Ok(Self {
            config,
            resolver,
            factory,
        })
    }

    /// DNS client for the account owning the intermediate zone.
    async fn intermediate_dns(&self, pass: &Pass) -> Result<Arc<dyn Dns>> {
        let role = pass
            .guard(
                "resolve default tenant credential",
                self.resolver.default_tenant_role(),
            )
            .await?;
        Ok(self.factory.for_role(&role)?.dns)
    }

    /// Resolve the intermediate zone and its client.
    async fn lookup_intermediate(
        &self,
        pass: &Pass,
        obj: &TenantCluster,
    ) -> Result<(String, Arc<dyn Dns>)> {
        let name = obj.intermediate_zone_name();
        let client = self.intermediate_dns(pass).await?;
        let id = find_hosted_zone_id(pass, client.as_ref(), &name).await?;
        Ok((id, client))
    }

    /// Read the delegation record from the intermediate zone, if present.
    async fn current_delegation(
        &self,
        pass: &Pass,
        obj: &TenantCluster,
        zone_id: &str,
        client: &dyn Dns,
    ) -> Result<Option<Delegation>> {
        match find_ns_record(pass, client, zone_id, &obj.final_zone_name()).await {
            Ok(record) => Ok(Some(Delegation {
                zone_id: zone_id.to_string(),
                record,
            })),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Find the ID of the hosted zone named exactly `name`.
///
/// The registrar lists zones in order starting at `name`, so subzones such as
/// `0tz6i.k8s.example.io` may follow the wanted `k8s.example.io`. Only an
/// exact match is accepted.
pub async fn find_hosted_zone_id(pass: &Pass, client: &dyn Dns, name: &str) -> Result<String> {
    debug!(zone = name, "finding hosted zone ID");

    let zones = pass
        .guard("list hosted zones", client.list_hosted_zones_by_name(name))
        .await
        .with_context(|| format!("listing hosted zones by name {name}"))?;

    let id = zones
        .into_iter()
        .find(|z| dns::names_match(&z.name, name))
        .map(|z| z.id)
        .ok_or_else(|| ReconcileError::not_found(format!("hosted zone {name}")))?;

    debug!(zone = name, zone_id = %id, "found hosted zone ID");
    Ok(id)
}

/// Read the NS record set named exactly `name` from a zone.
pub async fn find_ns_record(
    pass: &Pass,
    client: &dyn Dns,
    zone_id: &str,
    name: &str,
) -> Result<RecordSet> {
    let records = pass
        .guard(
            "list record sets",
            client.list_record_sets(zone_id, name, RecordType::Ns, 1),
        )
        .await
        .with_context(|| format!("listing NS records {name} in zone {zone_id}"))?;

    records
        .into_iter()
        .find(|r| r.record_type == RecordType::Ns && dns::names_match(&r.name, name))
        .map(|r| RecordSet {
            name: dns::normalize_name(&r.name),
            ..r
        })
        .ok_or_else(|| ReconcileError::not_found(format!("NS record {name} in zone {zone_id}")))
}

#[async_trait]
impl CrudResource<TenantCluster> for BridgeZone {
    type State = Option<Delegation>;
    type Change = DelegationChange;

    fn name(&self) -> &str {
        NAME
    }

    async fn current_state(&self, pass: &mut Pass, obj: &TenantCluster) -> Result<Self::State> {
        if !self.config.route53_enabled {
            info!(cluster_id = %obj.cluster_id, "route53 disabled, skipping delegation");
            return Ok(None);
        }

        let zones = match pass.operation() {
            Operation::Create => {
                let tenant_dns = Arc::clone(&pass.context().require(&TENANT_CLIENTS)?.dns);
                let final_name = obj.final_zone_name();
                let shared: &Pass = pass;

                // Either lookup failing drops the other one.
                let ((intermediate_id, intermediate_dns), final_id) = tokio::try_join!(
                    self.lookup_intermediate(shared, obj),
                    find_hosted_zone_id(shared, tenant_dns.as_ref(), &final_name),
                )?;

                Zones {
                    intermediate_id,
                    intermediate_dns,
                    final_id: Some(final_id),
                }
            }
            Operation::Delete => {
                let (intermediate_id, intermediate_dns) =
                    self.lookup_intermediate(pass, obj).await?;
                Zones {
                    intermediate_id,
                    intermediate_dns,
                    final_id: None,
                }
            }
        };

        let current = self
            .current_delegation(pass, obj, &zones.intermediate_id, zones.intermediate_dns.as_ref())
            .await?;

        pass.context_mut().set(NAME, &ZONES, zones)?;
        Ok(current)
    }

    async fn desired_state(&self, pass: &mut Pass, obj: &TenantCluster) -> Result<Self::State> {
        if !self.config.route53_enabled || pass.is_delete() {
            return Ok(None);
        }

        let (intermediate_id, final_id) = {
            let zones = pass.context().require(&ZONES)?;
            let final_id = zones.final_id.clone().ok_or_else(|| {
                ReconcileError::execution("final zone was not resolved on a create pass")
            })?;
            (zones.intermediate_id.clone(), final_id)
        };
        let tenant_dns = Arc::clone(&pass.context().require(&TENANT_CLIENTS)?.dns);
        let final_name = obj.final_zone_name();

        // The cluster zone's own NS record holds the name servers to delegate to.
        // The zone was just resolved, so a missing record is a failure.
        let own = find_ns_record(pass, tenant_dns.as_ref(), &final_id, &final_name)
            .await
            .map_err(ReconcileError::into_execution)?;
        debug!(
            zone = %final_name,
            name_servers = ?own.values,
            ttl = own.ttl,
            "read cluster zone name servers"
        );

        pass.context_mut()
            .set(NAME, &HOSTED_ZONE_NAME_SERVERS, own.values.clone())?;

        Ok(Some(Delegation {
            zone_id: intermediate_id,
            record: RecordSet::ns(final_name, self.config.delegation_ttl, own.values),
        }))
    }

    fn new_create_change(
        &self,
        _obj: &TenantCluster,
        current: &Self::State,
        desired: &Self::State,
    ) -> Result<Option<Self::Change>> {
        if current == desired {
            return Ok(None);
        }
        Ok(desired.clone().map(DelegationChange::Upsert))
    }

    fn new_delete_change(
        &self,
        _obj: &TenantCluster,
        current: &Self::State,
        _desired: &Self::State,
    ) -> Result<Option<Self::Change>> {
        Ok(current.clone().map(DelegationChange::Delete))
    }

    async fn apply_create_change(
        &self,
        pass: &mut Pass,
        obj: &TenantCluster,
        change: Self::Change,
    ) -> Result<()> {
        let DelegationChange::Upsert(delegation) = change else {
            return Err(ReconcileError::execution(
                "bridgezone create received a delete change",
            ));
        };
        let client = Arc::clone(&pass.context().require(&ZONES)?.intermediate_dns);

        info!(
            cluster_id = %obj.cluster_id,
            zone_id = %delegation.zone_id,
            record = %delegation.record.name,
            ttl = delegation.record.ttl,
            "ensuring delegation record"
        );

        let upsert = RecordChange {
            action: ChangeAction::Upsert,
            record: delegation.record,
        };
        pass.guard(
            "change record sets",
            client.change_record_sets(&delegation.zone_id, vec![upsert]),
        )
        .await
        .map_err(ReconcileError::into_execution)
        .with_context(|| format!("upserting delegation in zone {}", delegation.zone_id))?;

        info!(cluster_id = %obj.cluster_id, "ensured delegation record");
        Ok(())
    }

    async fn apply_delete_change(
        &self,
        pass: &mut Pass,
        obj: &TenantCluster,
        change: Self::Change,
    ) -> Result<()> {
        let DelegationChange::Delete(delegation) = change else {
            return Err(ReconcileError::execution(
                "bridgezone delete received an upsert change",
            ));
        };
        let client = Arc::clone(&pass.context().require(&ZONES)?.intermediate_dns);

        info!(
            cluster_id = %obj.cluster_id,
            zone_id = %delegation.zone_id,
            record = %delegation.record.name,
            ttl = delegation.record.ttl,
            "deleting delegation record"
        );

        let delete = RecordChange {
            action: ChangeAction::Delete,
            record: delegation.record,
        };
        match pass
            .guard(
                "change record sets",
                client.change_record_sets(&delegation.zone_id, vec![delete]),
            )
            .await
        {
            Ok(()) => info!(cluster_id = %obj.cluster_id, "deleted delegation record"),
            Err(e) if e.is_not_found() => {
                debug!(cluster_id = %obj.cluster_id, "delegation record already gone")
            }
            Err(e) => {
                return Err(e.context(format!(
                    "deleting delegation in zone {}",
                    delegation.zone_id
                )))
            }
        }
        Ok(())
    }
}
