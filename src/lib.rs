//! # tenant-inventory-collector
//!
//! Inventories cloud resources across many independently authenticated
//! accounts ("tenants") and merges them into one stream.
//!
//! ## Pipeline
//!
//! ```text
//! tenants ──► TenantCollectorFactory ──► collectors ──► tenant channel
//!                                                            │
//!                                              forwarder (identity stamp)
//!                                                            │
//!                                     root channel ◄─────────┘ (one per tenant)
//!                                          │
//!                                      consumer
//! ```
//!
//! Every background task is tracked; after cancellation
//! `ForwardingHandle::wait` resolves once nothing is left running.
//!
//! ## Modules
//!
//! - `config`:       JSON configuration
//! - `schema`:       resource envelope, metadata and tenant identity
//! - `collector`:    collector capability, RDS collector, cycle runner
//! - `providers`:    provider APIs, identity resolution, factory registry
//! - `organization`: multi-tenant fan-in
//! - `metrics`:      process-wide counters

pub mod collector;
pub mod config;
pub mod error;
pub mod metrics;
pub mod organization;
pub mod providers;
pub mod schema;

pub use collector::{Collector, CollectorsMap, RegisteredCollector, TenantCollectorFactory, factory_fn};
pub use error::InventoryError;
pub use organization::{ForwarderExit, ForwarderState, ForwardingHandle, OrganizationCollectors};
pub use schema::{CycleMetadata, Resource, ResourceInfo, ResourceMetadata, Tenant, TenantIdentity};
