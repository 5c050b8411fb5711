//! Working-context keys shared between resources.

use stratus_cloud::AwsClients;
use stratus_reconcile::ContextKey;

/// Clients acting in the tenant account. Set by `awsclient`.
pub const TENANT_CLIENTS: ContextKey<AwsClients> = ContextKey::new("tenant_clients");

/// Clients acting in the control-plane account. Set by `awsclient`.
pub const CONTROL_PLANE_CLIENTS: ContextKey<AwsClients> =
    ContextKey::new("control_plane_clients");

/// Tenant account ID. Set by `awsclient`.
pub const TENANT_ACCOUNT_ID: ContextKey<String> = ContextKey::new("tenant_account_id");

/// Name servers of the cluster's own hosted zone. Set by `bridgezone` on
/// create passes.
pub const HOSTED_ZONE_NAME_SERVERS: ContextKey<Vec<String>> =
    ContextKey::new("hosted_zone_name_servers");
