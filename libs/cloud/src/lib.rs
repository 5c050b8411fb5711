//! Cloud capabilities consumed by reconciliation resources.
//!
//! Each capability is a narrow trait ([`Dns`], [`CloudFormation`], [`Ec2`])
//! so resources can be exercised against [`MemoryCloud`] in tests and in
//! simulation mode. Provider error codes are mapped to
//! [`stratus_reconcile::ErrorKind`] at this boundary; resources never inspect
//! error strings.

pub mod cloudformation;
pub mod credentials;
pub mod dns;
pub mod ec2;
pub mod memory;

pub use cloudformation::{CloudFormation, CreateStackInput, Stack, StackStatus};
pub use credentials::{AwsClients, ClientFactory, CredentialResolver, RoleArn};
pub use dns::{ChangeAction, Dns, HostedZone, RecordChange, RecordSet, RecordType};
pub use ec2::{Attachment, AttachmentState, Ec2, Volume, VolumeState};
pub use memory::MemoryCloud;
