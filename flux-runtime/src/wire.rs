//! Control-plane and data-plane message shapes (§6.1, §6.2).
//!
//! The exact bit layout (byte order, padding, framing) is explicitly out of
//! scope per §1 — that is the wire protocol's concern, owned by the
//! line-rate network front-end we treat as an external collaborator. These
//! types capture the *fields* the spec documents, laid out in declaration
//! order, without committing to a serialization. A concrete deployment plugs
//! in its own codec (e.g. a fixed-width `#[repr(C)]` reader over a received
//! buffer) ahead of these structs.

/// Registration opcode tag, distinguishing REG from data-plane GET/PUT on
/// the same control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOpcode {
    Reg,
}

/// The REG control-plane request (§6.1): a client declares a latency target,
/// IOPS target, and read/write mix for the flow it's about to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegRequest {
    pub magic: u32,
    pub opcode: ControlOpcode,
    /// 0 means best-effort.
    pub latency_us_slo: u32,
    pub iops_slo: u64,
    /// 0-100.
    pub rw_ratio_pct: u8,
    /// Opaque client-supplied handle, echoed back in the response.
    pub flow_handle: u64,
}

/// REG response codes (§6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegRespCode {
    Ok,
    CannotMeetSlo,
    InvalidSlo,
}

impl From<crate::error::ControlError> for RegRespCode {
    fn from(err: crate::error::ControlError) -> Self {
        match err {
            crate::error::ControlError::CannotMeetSlo => Self::CannotMeetSlo,
            crate::error::ControlError::InvalidSlo | crate::error::ControlError::NoMemory => {
                Self::InvalidSlo
            }
        }
    }
}

/// The REG response: echoes the header shape, carrying the assigned
/// `tenant_id` on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegResponse {
    pub magic: u32,
    pub opcode: ControlOpcode,
    pub resp_code: RegRespCode,
    pub flow_handle: u64,
    pub tenant_id: Option<flux_engine::TenantId>,
}

/// Data-plane I/O opcode (§6.2). Distinct from [`flux_engine::Opcode`]
/// because the wire uses GET/PUT while the scheduler's cost model uses
/// READ/WRITE; they carry the same meaning but the wire layer owns its own
/// vocabulary until translated at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataOpcode {
    Get,
    Put,
}

impl From<DataOpcode> for flux_engine::Opcode {
    fn from(op: DataOpcode) -> Self {
        match op {
            DataOpcode::Get => flux_engine::Opcode::Read,
            DataOpcode::Put => flux_engine::Opcode::Write,
        }
    }
}

/// Data-plane request header (§6.2). For `Put`, `sector_count * sector_size`
/// payload bytes follow on the wire; that payload is represented in-process
/// by [`crate::netio::DecodedRequest::payload_handle`], not carried here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoRequestHeader {
    pub opcode: DataOpcode,
    pub lba: u64,
    pub sector_count: u32,
    pub req_handle: u64,
}

/// Data-plane response header (§6.2). For `Get`, the read payload follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoResponseHeader {
    pub opcode: DataOpcode,
    pub resp_code: IoRespCode,
    pub req_handle: u64,
    pub service_time_us: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoRespCode {
    Ok,
    DeviceError,
    InvalidRequest,
}

/// A device's sector size, typically 512 B (§6.2). Payload is chunked into
/// 4 KiB units for scatter-gather submission regardless of sector size.
pub const DEFAULT_SECTOR_SIZE: u32 = 512;
pub const SCATTER_GATHER_CHUNK: u32 = 4096;

/// Splits a `sector_count`-sector request into the number of 4 KiB
/// scatter-gather chunks the device driver would submit it as.
pub fn chunk_count(sector_count: u32, sector_size: u32) -> u32 {
    let len_bytes = u64::from(sector_count) * u64::from(sector_size);
    len_bytes.div_ceil(u64::from(SCATTER_GATHER_CHUNK)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_count_rounds_up() {
        assert_eq!(chunk_count(8, 512), 1); // 4096 bytes exactly
        assert_eq!(chunk_count(9, 512), 2); // 4608 bytes -> 2 chunks
        assert_eq!(chunk_count(16, 512), 2); // 8192 bytes -> 2 chunks
    }
}
