/// A device token-rate budget, as returned by [`DeviceModel::lookup`].
///
/// The `default` and `fake` sentinel models (§4.2) impose no limit at all;
/// representing that as a variant rather than `f64::INFINITY` keeps the
/// admission-check arithmetic in [`crate::TenantRegistry`] from ever having
/// to reason about `NaN`/infinity propagation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TokenRate {
    Unlimited,
    Limited(f64),
}

impl TokenRate {
    pub fn as_f64(self) -> f64 {
        match self {
            TokenRate::Unlimited => f64::INFINITY,
            TokenRate::Limited(v) => v,
        }
    }

    pub fn min(self, other: TokenRate) -> TokenRate {
        match (self, other) {
            (TokenRate::Unlimited, other) => other,
            (this, TokenRate::Unlimited) => this,
            (TokenRate::Limited(a), TokenRate::Limited(b)) => TokenRate::Limited(a.min(b)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct CalibrationPoint {
    latency_p95_us: u32,
    max_rate: f64,
    max_readonly_rate: f64,
}

/// A static `(latency_p95_us -> max_token_rate, max_readonly_token_rate)`
/// calibration table (§4.2). Lookup interpolates linearly between the two
/// bracketing points; below the first point or above the last, the nearest
/// endpoint's rate is returned.
#[derive(Debug, Clone)]
pub struct DeviceModel {
    points: Vec<CalibrationPoint>,
    unlimited: bool,
}

impl DeviceModel {
    /// Builds a calibrated model from `(latency_p95_us, max_rate,
    /// max_readonly_rate)` triples. Points are sorted by latency; callers may
    /// supply them in any order.
    pub fn from_points(mut points: Vec<(u32, f64, f64)>) -> Self {
        points.sort_by_key(|p| p.0);
        let points = points
            .into_iter()
            .map(|(latency_p95_us, max_rate, max_readonly_rate)| CalibrationPoint {
                latency_p95_us,
                max_rate,
                max_readonly_rate,
            })
            .collect();
        Self {
            points,
            unlimited: false,
        }
    }

    /// The `default` sentinel (§4.2): no limits, for a device the operator
    /// has not calibrated.
    pub fn unlimited() -> Self {
        Self {
            points: Vec::new(),
            unlimited: true,
        }
    }

    /// The `fake` sentinel (§4.2): used for testing. The scheduler still
    /// runs its full two-sub-round logic; only `DispatchShim` short-circuits
    /// the device.
    pub fn fake() -> Self {
        Self::unlimited()
    }

    /// Looks up the token-rate budget for a latency SLO of `latency_us`,
    /// selecting the read-only calibration column iff `readonly` is set.
    pub fn lookup(&self, latency_us: u32, readonly: bool) -> TokenRate {
        if self.unlimited || self.points.is_empty() {
            return TokenRate::Unlimited;
        }
        let points = &self.points;
        let rate_of = |p: &CalibrationPoint| if readonly { p.max_readonly_rate } else { p.max_rate };

        if latency_us <= points[0].latency_p95_us {
            return TokenRate::Limited(rate_of(&points[0]));
        }
        let last = points.len() - 1;
        if latency_us >= points[last].latency_p95_us {
            return TokenRate::Limited(rate_of(&points[last]));
        }

        // Find the bracketing pair: points[i-1].latency < latency_us <= points[i].latency.
        let idx = points.partition_point(|p| p.latency_p95_us < latency_us);
        let (lo, hi) = (&points[idx - 1], &points[idx]);
        if hi.latency_p95_us == lo.latency_p95_us {
            return TokenRate::Limited(rate_of(hi));
        }
        let span = (hi.latency_p95_us - lo.latency_p95_us) as f64;
        let frac = (latency_us - lo.latency_p95_us) as f64 / span;
        let y0 = rate_of(lo);
        let y1 = rate_of(hi);
        TokenRate::Limited(y0 + (y1 - y0) * frac)
    }
}
