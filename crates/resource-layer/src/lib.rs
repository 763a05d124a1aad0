//! Resource-Layer: Primitive Resource Interface for Sitecast
//!
//! This crate is the boundary between descriptor synthesis and whatever
//! actually creates cloud resources. Functions, buckets, queues,
//! distributions and grants are opaque creatable/updatable resources keyed
//! by a logical identifier.
//!
//! ## Layer 0 - Primitive Resources
//!
//! Focus: create-vs-update decided by logical identifier equality.
//!
//! ## Key Components
//!
//! - `ResourceProvider`: apply/get/list resources by `LogicalId`
//! - `VersionLedger`: current and historical edge version records
//! - `WorkQueue`: ordered (FIFO) at-least-once work queue
//! - `memory`: in-memory implementations of all three
//! - `state`: JSON snapshot persistence for local runs

mod error;
pub mod memory;
pub mod queue;
pub mod resource_traits;
pub mod state;

pub use error::ProviderError;
pub use memory::{MemoryResourceProvider, MemoryVersionLedger};
pub use queue::{MemoryFifoQueue, QueueMessage, ReceiptHandle, ReceivedMessage, WorkQueue};
pub use resource_traits::{
    ApplyOutcome, ContentHash, LogicalId, ResourceKind, ResourceProvider, ResourceRecord,
    ResourceSpec, VersionLedger, VersionRecord, MAX_LOGICAL_ID_LEN,
};
pub use state::StateSnapshot;

/// Result type for primitive resource operations
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;
