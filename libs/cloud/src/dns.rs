//! DNS capability: hosted zones and record sets.

use std::fmt;

use async_trait::async_trait;
use stratus_reconcile::{ReconcileError, Result};

/// A hosted zone as returned by the registrar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedZone {
    /// Stable, provider-assigned ID (e.g. `/hostedzone/Z1HJGG5VLG8GZH`).
    pub id: String,

    /// Zone name, usually with a trailing dot.
    pub name: String,
}

/// Record types this system reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordType {
    A,
    Cname,
    Ns,
    Soa,
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::A => "A",
            Self::Cname => "CNAME",
            Self::Ns => "NS",
            Self::Soa => "SOA",
        };
        f.write_str(s)
    }
}

/// A record set: name, type, TTL and ordered values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSet {
    pub name: String,
    pub record_type: RecordType,
    pub ttl: u64,
    pub values: Vec<String>,
}

impl RecordSet {
    /// An NS record set.
    pub fn ns(name: impl Into<String>, ttl: u64, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            record_type: RecordType::Ns,
            ttl,
            values,
        }
    }
}

/// Action of a single record change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    /// Create, failing if the record set exists.
    Create,
    /// Create or replace.
    Upsert,
    /// Delete; name, type, TTL and values must match the live record set.
    Delete,
}

/// One entry of a change batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordChange {
    pub action: ChangeAction,
    pub record: RecordSet,
}

/// DNS zone and record operations.
///
/// Implementations classify provider errors into the reconciliation taxonomy
/// (see [`classify_error`]).
#[async_trait]
pub trait Dns: Send + Sync {
    /// List hosted zones in lexicographic order starting at `dns_name`.
    ///
    /// The response may contain zones whose names merely share a suffix
    /// with `dns_name`; callers must select the exact match themselves.
    async fn list_hosted_zones_by_name(&self, dns_name: &str) -> Result<Vec<HostedZone>>;

    /// List record sets of a zone starting at (`start_name`, `start_type`).
    ///
    /// Like the zone listing, results begin at the given position and are not
    /// filtered to the exact name.
    async fn list_record_sets(
        &self,
        zone_id: &str,
        start_name: &str,
        start_type: RecordType,
        max_items: usize,
    ) -> Result<Vec<RecordSet>>;

    /// Apply a change batch atomically.
    async fn change_record_sets(&self, zone_id: &str, changes: Vec<RecordChange>) -> Result<()>;
}

/// Normalize a DNS name for comparison: lowercase without a trailing dot.
pub fn normalize_name(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

/// Returns true if two DNS names are equal after normalization.
pub fn names_match(a: &str, b: &str) -> bool {
    normalize_name(a) == normalize_name(b)
}

/// Map a DNS provider error code to the reconciliation taxonomy.
pub fn classify_error(code: &str, message: &str) -> ReconcileError {
    let detail = format!("{code}: {message}");
    match code {
        "NoSuchHostedZone" | "HostedZoneNotFound" => ReconcileError::not_found(detail),
        "PriorRequestNotComplete" => ReconcileError::operation_in_progress(detail),
        "HostedZoneAlreadyExists" => ReconcileError::already_exists(detail),
        "InvalidChangeBatch" if message.contains("already exists") => {
            ReconcileError::already_exists(detail)
        }
        "InvalidChangeBatch" if message.contains("not found") => ReconcileError::not_found(detail),
        "Throttling" | "ThrottlingException" | "ServiceUnavailable" | "RequestTimeout" => {
            ReconcileError::transport(detail)
        }
        _ => ReconcileError::execution(detail),
    }
}
