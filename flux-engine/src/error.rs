/// Errors surfaced by the scheduling engine to its caller (§7 of the design).
///
/// `flux-engine` never logs or retries on its own behalf — recovery policy
/// (backpressure, connection teardown, client-facing rejection codes) is the
/// host runtime's job. These variants are what the host needs to decide that
/// policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// Admission would push `Σ scaled_IOPS_limit(LC)` over `global_token_rate`.
    /// The tenant is not registered; registry state is unchanged.
    CannotMeetSLO,
    /// The tenant's software queue is full. The caller must apply
    /// backpressure to the offending connection.
    NoSpace,
    /// A referenced tenant id has no entry in the registry.
    UnknownTenant,
    /// Latency or IOPS SLO fields failed basic range validation
    /// (e.g. `rw_ratio_pct > 100`).
    InvalidRequest,
}

impl std::fmt::Display for FlowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::CannotMeetSLO => "admission would violate an existing latency SLO",
            Self::NoSpace => "software queue full",
            Self::UnknownTenant => "tenant id not registered",
            Self::InvalidRequest => "malformed registration or request",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for FlowError {}
