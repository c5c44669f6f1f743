//! The `FlashIo` collaborator seam (§1): "exposes `submit(op) -> handle`
//! (non-blocking; may fail if device queue full) and `poll() -> list<completion>`;
//! asynchronous; preserves no ordering."
//!
//! `flux-runtime` never implements the real NVMe submission/completion queue
//! plumbing — that is out of scope per §1 ("the flash device driver") — but
//! it needs a concrete trait seam to drive [`crate::dispatch::DispatchShim`]
//! against, plus a fake for tests, exactly as `shot-limit`'s benches bridge
//! against `governor` through a small adapter trait rather than reimplementing
//! a real rate limiter service.

use flux_engine::{Opcode, PayloadHandle};

/// Device status categories, decoded per §7 ("full status decoding:
/// generic/command-specific/media categories").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatusCategory {
    Generic,
    CommandSpecific,
    Media,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStatus {
    pub category: DeviceStatusCategory,
    pub code: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashStatus {
    Ok,
    Error(DeviceStatus),
}

/// A single block I/O handed to `FlashIo::submit`. Carries only what the
/// device needs — the scheduler-side bookkeeping (tenant, cookie, frozen
/// cost) lives in [`crate::dispatch::InFlight`], keyed by the returned
/// handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashOp {
    pub opcode: Opcode,
    pub lba: u64,
    pub len_sectors: u32,
    pub payload_handle: PayloadHandle,
}

/// Opaque per-submission handle, returned by `submit` and matched back on
/// `poll` — the driver's command-slot identity. `flux-runtime` never
/// interprets its bits.
pub type FlashHandle = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashCompletion {
    pub handle: FlashHandle,
    pub status: FlashStatus,
    pub service_time_us: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FlashSubmitError {
    /// Ran out of command slots. Per §4.5/§7, a caller that checks
    /// `has_room()` before submitting should never observe this — if it
    /// does, that is a gating bug, and [`crate::dispatch::DispatchShim`]
    /// treats it as fatal.
    #[error("device command queue full")]
    QueueFull,
}

/// The collaborator seam: "is there room to submit?", "submit this", "what
/// completed?".
pub trait FlashIo: Send {
    /// True iff `outstanding < device max` (§4.5's capacity gate).
    fn has_room(&self) -> bool;
    fn submit(&mut self, op: FlashOp) -> Result<FlashHandle, FlashSubmitError>;
    /// Drains whatever completions are ready; preserves no ordering.
    fn poll(&mut self) -> Vec<FlashCompletion>;
}

/// The `fake` device-model sentinel's runtime counterpart (§4.2): the
/// scheduler still runs its full two-sub-round logic against this, but it
/// completes every submission immediately rather than touching real
/// hardware. Used by tests and by `nvme_device_model = "fake"` deployments.
pub struct FakeFlashIo {
    max_outstanding: usize,
    next_handle: FlashHandle,
    outstanding: Vec<FlashHandle>,
    ready: Vec<FlashCompletion>,
}

impl FakeFlashIo {
    pub fn new(max_outstanding: usize) -> Self {
        Self {
            max_outstanding,
            next_handle: 0,
            outstanding: Vec::new(),
            ready: Vec::new(),
        }
    }

    /// Test hook: completes every currently-outstanding submission
    /// immediately, as if the device finished a batch.
    pub fn complete_all(&mut self) {
        for handle in self.outstanding.drain(..) {
            self.ready.push(FlashCompletion {
                handle,
                status: FlashStatus::Ok,
                service_time_us: 0,
            });
        }
    }
}

impl FlashIo for FakeFlashIo {
    fn has_room(&self) -> bool {
        self.outstanding.len() < self.max_outstanding
    }

    fn submit(&mut self, _op: FlashOp) -> Result<FlashHandle, FlashSubmitError> {
        if !self.has_room() {
            return Err(FlashSubmitError::QueueFull);
        }
        let handle = self.next_handle;
        self.next_handle += 1;
        self.outstanding.push(handle);
        Ok(handle)
    }

    fn poll(&mut self) -> Vec<FlashCompletion> {
        std::mem::take(&mut self.ready)
    }
}
