//! `flux-engine` is the scheduling core of a multi-tenant, kernel-bypass NVMe
//! flash controller: per-tenant software queues and credit state, the
//! two-sub-round LESS/ReFlex-style token-bucket scheduler, admission control,
//! and the device-model lookup that turns a latency SLO into a token budget.
//!
//! ## Core Philosophy
//!
//! Everything a worker touches once per tick — credit grants, the global
//! leftover pool, the active-tenant rings — is either owned exclusively by
//! that worker or backed by a lock-free atomic. The only lock in this crate
//! is [`TenantRegistry`]'s, and it is held solely during `register_flow` /
//! `unregister_flow`, never on the dispatch hot path.
//!
//! ## Example
//!
//! ```rust
//! use flux_engine::{CostModel, DeviceModel, TenantId, TenantRegistry, WorkerId};
//!
//! let device = DeviceModel::from_points(vec![(500, 100_000.0, 100_000.0)]);
//! let registry = TenantRegistry::new(device, CostModel::fake());
//! let admitted = registry.register_flow(TenantId(1), 500, 500, 100, WorkerId(0));
//! assert!(admitted.is_ok());
//! ```

mod active_ring;
mod cost_model;
mod device_model;
mod error;
mod manager;
mod queue;
mod registry;
mod scheduler;
mod tenant;
mod token_pool;

pub use active_ring::ActiveRing;
pub use cost_model::CostModel;
pub use device_model::{DeviceModel, TokenRate};
pub use error::FlowError;
pub use manager::TenantManager;
pub use queue::{PayloadHandle, Request, SoftwareQueue, SoftwareQueueTable};
pub use registry::{RegistrySnapshot, TenantRegistry};
pub use scheduler::{Dispatcher, Scheduler, SchedulerMode, TickOutcome};
pub use tenant::{Opcode, Tenant, TenantHandle, TenantId, WorkerId};
pub use token_pool::GlobalTokenPool;

/// "About ten big writes' worth" — the hard floor on how negative
/// [`queue::SoftwareQueue::token_credit`] may become before an LC tenant is
/// blocked. Derived from the cost model at registry construction time, see
/// [`CostModel::token_deficit_limit`].
pub const WRITE_BURST_COUNT: u32 = 10;

/// Fraction of an LC tenant's excess banked credit donated to the worker-local
/// leftover pool once it exceeds the soft ceiling (`3 * credit_grant`).
pub const TOKEN_FRAC_GIVEAWAY: f64 = 0.9;
