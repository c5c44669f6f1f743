//! `flux-runtime` is the collaborator-seam layer around `flux-engine`: the
//! `NetIo`/`FlashIo` traits the scheduler is driven against, `DispatchShim`,
//! `TickDriver`'s pinned per-worker threads, static configuration loading,
//! and structured logging/metrics. Analogous to `tower-shot` wrapping
//! `shot-limit`: the algorithm crate stays pure state machines and atomics,
//! this crate is what takes it and makes it run against real collaborators.
//!
//! ## Feature Flags
//!
//! - `admin`: a small read-only `axum` introspection surface (`/healthz`,
//!   `/tenants`), off by default, mirroring `tower-shot`'s own `axum` feature
//!   for `ShotError::into_response`.

mod admission;
mod affinity;
mod config;
mod dispatch;
mod error;
mod flashio;
mod metrics;
mod netio;
mod tick_driver;
mod wire;
mod worker;

#[cfg(feature = "admin")]
mod admin;

pub use admission::{AdmissionService, RegisterFlow};
pub use config::{CalibrationPoint, Config, DeviceConfig, DeviceModelConfig, SchedulerModeConfig};
pub use dispatch::{CompletionCounters, DispatchShim, InFlightPoolHandle};
pub use error::{ConfigError, ControlError, DataPlaneError};
pub use flashio::{
    DeviceStatus, DeviceStatusCategory, FakeFlashIo, FlashCompletion, FlashHandle, FlashIo,
    FlashOp, FlashStatus, FlashSubmitError,
};
pub use metrics::WorkerMetrics;
pub use netio::{ChannelNetIo, CompletionStatus, DecodedRequest, NetIo, OutboundEvent};
pub use tick_driver::TickDriver;
pub use wire::{
    chunk_count, ControlOpcode, DataOpcode, IoRequestHeader, IoRespCode, IoResponseHeader,
    RegRequest, RegRespCode, RegResponse, DEFAULT_SECTOR_SIZE, SCATTER_GATHER_CHUNK,
};
pub use worker::{Worker, DEFAULT_QUEUE_CAPACITY};

#[cfg(feature = "admin")]
pub use admin::{admin_router, AdminState};
