//! Pools of units: contiguous index ranges over a layer's neurons, each
//! carrying the aggregate statistics that inhibition and phase bookkeeping
//! read. Pool 0 always spans the whole layer; further pools cover sub-groups
//! for pooled inhibition.

use crate::inhib::FFFBInhib;

/// Running average and max over a set of values, with the index of the max.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AvgMax {
    pub avg: f32,
    pub max: f32,
    /// Index of the max value within the scanned range.
    pub max_idx: i32,
    pub sum: f32,
    pub n: u32,
}

impl Default for AvgMax {
    fn default() -> Self {
        Self {
            avg: 0.0,
            max: f32::MIN,
            max_idx: -1,
            sum: 0.0,
            n: 0,
        }
    }
}

impl AvgMax {
    /// Reset for a fresh accumulation pass.
    pub fn init(&mut self) {
        *self = Self::default();
    }

    /// Fold one value into the statistics.
    pub fn update_val(&mut self, val: f32, idx: usize) {
        self.sum += val;
        self.n += 1;
        if val > self.max {
            self.max = val;
            self.max_idx = idx as i32;
        }
    }

    /// Compute the average from accumulated sum and count. An empty scan
    /// (all units lesioned) yields avg 0 and max 0 rather than sentinels.
    pub fn calc_avg(&mut self) {
        if self.n > 0 {
            self.avg = self.sum / self.n as f32;
        } else {
            self.avg = 0.0;
            self.max = 0.0;
            self.max_idx = -1;
        }
    }
}

/// Running-average activity for a pool across trials, used in net-input
/// scaling.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ActAvgs {
    /// Running average of minus-phase average activity.
    pub act_m_avg: f32,
    /// Running average of plus-phase average activity.
    pub act_p_avg: f32,
    /// Effective plus-phase average actually used for scaling.
    pub act_p_avg_eff: f32,
}

/// One pool of neurons: the half-open unit index range `[st_idx, ed_idx)`
/// plus per-cycle and per-phase statistics.
#[derive(Clone, Debug, Default)]
pub struct Pool {
    /// Start unit index, inclusive.
    pub st_idx: usize,
    /// End unit index, exclusive.
    pub ed_idx: usize,
    /// Excitatory conductance stats for the current cycle.
    pub ge: AvgMax,
    /// Activation stats for the current cycle.
    pub act: AvgMax,
    /// Computed FFFB inhibition state.
    pub inhib: FFFBInhib,
    /// Minus-phase activation snapshot stats.
    pub act_m: AvgMax,
    /// Plus-phase activation snapshot stats.
    pub act_p: AvgMax,
    /// Cross-trial running averages for net-input scaling.
    pub act_avg: ActAvgs,
}

impl Pool {
    pub fn new(st_idx: usize, ed_idx: usize) -> Self {
        Self {
            st_idx,
            ed_idx,
            ..Self::default()
        }
    }

    /// Number of units in the pool.
    #[inline]
    pub fn len(&self) -> usize {
        self.ed_idx - self.st_idx
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ed_idx == self.st_idx
    }
}
