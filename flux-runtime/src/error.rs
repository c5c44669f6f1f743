use thiserror::Error;

/// Errors surfaced by the control-plane registration path (§6.1, §7).
///
/// Wraps [`flux_engine::FlowError`] the way `tower-shot`'s `ShotError` wraps
/// `shot_limit::Reason`: the algorithm crate's plain enum becomes a
/// `thiserror`-derived, `Display`-able type at the boundary where a host
/// service actually needs to report it to a caller or log it.
#[derive(Debug, Clone, Error)]
pub enum ControlError {
    /// Admission would push `sum(scaled_IOPS_limit(LC))` over the device's
    /// committed budget for the strictest outstanding latency SLO.
    #[error("cannot meet requested latency/IOPS SLO")]
    CannotMeetSlo,
    /// `rw_ratio_pct > 100` or another basic range violation in the REG
    /// message.
    #[error("malformed registration request")]
    InvalidSlo,
    /// Tenant or request state allocation failed; the caller should close
    /// the connection.
    #[error("out of memory allocating tenant or request state")]
    NoMemory,
}

impl From<flux_engine::FlowError> for ControlError {
    fn from(err: flux_engine::FlowError) -> Self {
        match err {
            flux_engine::FlowError::CannotMeetSLO => Self::CannotMeetSlo,
            flux_engine::FlowError::InvalidRequest => Self::InvalidSlo,
            flux_engine::FlowError::UnknownTenant => Self::InvalidSlo,
            flux_engine::FlowError::NoSpace => {
                unreachable!("NoSpace is a data-plane enqueue error, never an admission error")
            }
        }
    }
}

/// Errors surfaced by the data-plane enqueue path (§7).
#[derive(Debug, Clone, Error)]
pub enum DataPlaneError {
    /// The tenant's software queue is full; the caller must backpressure the
    /// connection.
    #[error("software queue full")]
    NoSpace,
    /// Malformed header or out-of-range LBA; the connection should be
    /// closed.
    #[error("malformed request or out-of-range LBA")]
    InvalidRequest,
    /// Referenced tenant id has no entry in the registry (e.g. a stale
    /// connection racing a retirement).
    #[error("tenant id not registered")]
    UnknownTenant,
}

impl From<flux_engine::FlowError> for DataPlaneError {
    fn from(err: flux_engine::FlowError) -> Self {
        match err {
            flux_engine::FlowError::NoSpace => Self::NoSpace,
            flux_engine::FlowError::InvalidRequest => Self::InvalidRequest,
            flux_engine::FlowError::UnknownTenant => Self::UnknownTenant,
            flux_engine::FlowError::CannotMeetSLO => {
                unreachable!("CannotMeetSLO is an admission error, never a data-plane one")
            }
        }
    }
}

/// Configuration loading failures (ambient; not in spec.md).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("named device model {0:?} requires a calibration table")]
    MissingCalibration(String),
}
