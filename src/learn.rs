//! Learning parameters: the running-average cascade that produces the
//! per-neuron learning signals, the long-term BCM-style floating threshold,
//! cosine-difference statistics, and the synapse-level weight-change rule
//! with contrast enhancement, normalization, momentum, and weight balance.

use crate::neuron::Neuron;

/// Rate constants for the cascade of super-short, short, and medium
/// time-scale activation averages that drive learning.
#[derive(Clone, Debug, PartialEq)]
pub struct LrnActAvgParams {
    /// Time constant in cycles for the super-short average.
    pub ss_tau: f32,
    /// Time constant for the short (plus-phase-like) average.
    pub s_tau: f32,
    /// Time constant for the medium (minus-phase-like) average.
    pub m_tau: f32,
    /// Proportion of the medium average mixed into the short-term learning
    /// drive, smoothing out the error signal.
    pub lrn_m: f32,
    /// Initial value for all averages.
    pub init: f32,

    pub(crate) ss_dt: f32,
    pub(crate) s_dt: f32,
    pub(crate) m_dt: f32,
    pub(crate) lrn_s: f32,
}

impl Default for LrnActAvgParams {
    fn default() -> Self {
        let mut aa = Self {
            ss_tau: 2.0,
            s_tau: 2.0,
            m_tau: 10.0,
            lrn_m: 0.1,
            init: 0.15,
            ss_dt: 0.0,
            s_dt: 0.0,
            m_dt: 0.0,
            lrn_s: 0.0,
        };
        aa.update();
        aa
    }
}

impl LrnActAvgParams {
    pub fn update(&mut self) {
        self.ss_dt = 1.0 / self.ss_tau;
        self.s_dt = 1.0 / self.s_tau;
        self.m_dt = 1.0 / self.m_tau;
        self.lrn_s = 1.0 - self.lrn_m;
    }

    /// Cascade update from the current activation.
    pub fn avgs_fm_act(
        &self,
        act: f32,
        avg_ss: &mut f32,
        avg_s: &mut f32,
        avg_m: &mut f32,
        avg_s_lrn: &mut f32,
    ) {
        *avg_ss += self.ss_dt * (act - *avg_ss);
        *avg_s += self.s_dt * (*avg_ss - *avg_s);
        *avg_m += self.m_dt * (*avg_s - *avg_m);
        *avg_s_lrn = self.lrn_s * *avg_s + self.lrn_m * *avg_m;
    }
}

/// Long-term floating average `avg_l`, the BCM-style threshold that drives
/// self-organizing learning in proportion to how active a unit has been.
#[derive(Clone, Debug, PartialEq)]
pub struct AvgLParams {
    /// Initial avg_l value at start of training.
    pub init: f32,
    /// Gain on avg_m driving avg_l. The key self-organizing parameter:
    /// higher values produce more extreme hog-vs-dead unit differentiation.
    pub gain: f32,
    /// Floor on avg_l.
    pub min: f32,
    /// Time constant in trials for integrating avg_l from avg_m.
    pub tau: f32,
    /// Learning-rate factor at the maximum avg_l.
    pub lrn_max: f32,
    /// Learning-rate factor at the minimum avg_l.
    pub lrn_min: f32,
    /// Modulate the resulting factor by layer-level error, so layers that
    /// are predicting well do less self-organizing churn.
    pub err_mod: bool,
    /// Floor on the error modulation, keeping a little learning alive.
    pub mod_min: f32,

    pub(crate) dt: f32,
    pub(crate) lrn_fact: f32,
}

impl Default for AvgLParams {
    fn default() -> Self {
        let mut al = Self {
            init: 0.4,
            gain: 2.5,
            min: 0.2,
            tau: 10.0,
            lrn_max: 0.5,
            lrn_min: 0.0001,
            err_mod: true,
            mod_min: 0.01,
            dt: 0.0,
            lrn_fact: 0.0,
        };
        al.update();
        al
    }
}

impl AvgLParams {
    pub fn update(&mut self) {
        self.dt = 1.0 / self.tau;
        self.lrn_fact = (self.lrn_max - self.lrn_min) / (self.gain - self.min);
    }

    /// Update avg_l from the medium-term average, and the learning factor
    /// from avg_l.
    pub fn avg_l_fm_avg_m(&self, avg_m: f32, avg_l: &mut f32, lrn: &mut f32) {
        *avg_l += self.dt * (self.gain * avg_m - *avg_l);
        if *avg_l < self.min {
            *avg_l = self.min;
        }
        *lrn = self.lrn_fact * (*avg_l - self.min);
    }

    /// Error-modulation factor from the layer's cosine-difference error.
    pub fn err_mod_fm_lay_err(&self, lay_err: f32) -> f32 {
        if !self.err_mod {
            return 1.0;
        }
        lay_err.max(self.mod_min)
    }
}

/// Parameters for the running average and variance of the minus/plus
/// cosine difference, used to modulate BCM hebbian learning.
#[derive(Clone, Debug, PartialEq)]
pub struct CosDiffParams {
    /// Time constant in trials.
    pub tau: f32,

    pub(crate) dt: f32,
    pub(crate) dt_c: f32,
}

impl Default for CosDiffParams {
    fn default() -> Self {
        let mut cd = Self {
            tau: 100.0,
            dt: 0.0,
            dt_c: 0.0,
        };
        cd.update();
        cd
    }
}

impl CosDiffParams {
    pub fn update(&mut self) {
        self.dt = 1.0 / self.tau;
        self.dt_c = 1.0 - self.dt;
    }

    /// Incremental average and variance from a new cosine sample. The first
    /// sample (variance still 0) seeds the average directly.
    pub fn avg_var_fm_cos(&self, avg: &mut f32, vr: &mut f32, cos: f32) {
        if *vr == 0.0 {
            *avg = cos;
            *vr = 0.0005;
        } else {
            let del = cos - *avg;
            let incr = self.dt * del;
            *avg += incr;
            *vr = self.dt_c * (*vr + del * incr);
        }
    }
}

/// Cosine-difference statistics for one layer.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CosDiffStats {
    /// Cosine between zero-mean minus and plus phase activations this trial.
    pub cos: f32,
    /// Running average of cos.
    pub avg: f32,
    /// Running variance of cos.
    pub var: f32,
    /// 1 - avg: how poorly this layer is predicting, for hidden layers.
    pub avg_lrn: f32,
    /// Error-modulation factor applied to avg_l_lrn.
    pub mod_avg_l_lrn: f32,
}

impl CosDiffStats {
    pub fn init(&mut self) {
        *self = Self::default();
    }
}

/// Neuron-level learning parameters, owned by the layer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LearnNeurParams {
    pub act_avg: LrnActAvgParams,
    pub avg_l: AvgLParams,
    pub cos_diff: CosDiffParams,
}

impl LearnNeurParams {
    pub fn update(&mut self) {
        self.act_avg.update();
        self.avg_l.update();
        self.cos_diff.update();
    }

    /// Per-cycle learning-average cascade from the current activation.
    pub fn avgs_fm_act(&self, nrn: &mut Neuron) {
        self.act_avg.avgs_fm_act(
            nrn.act,
            &mut nrn.avg_ss,
            &mut nrn.avg_s,
            &mut nrn.avg_m,
            &mut nrn.avg_s_lrn,
        );
    }

    /// Per-trial avg_l update, at alpha-cycle init.
    pub fn avg_l_fm_avg_m(&self, nrn: &mut Neuron) {
        self.avg_l
            .avg_l_fm_avg_m(nrn.avg_m, &mut nrn.avg_l, &mut nrn.avg_l_lrn);
    }

    /// Seed the learning averages, during weight init.
    pub fn init_act_avg(&self, nrn: &mut Neuron) {
        nrn.avg_ss = self.act_avg.init;
        nrn.avg_s = self.act_avg.init;
        nrn.avg_m = self.act_avg.init;
        nrn.avg_l = self.avg_l.init;
        nrn.avg_s_lrn = 0.0;
        nrn.avg_l_lrn = 0.0;
    }
}

/// Sigmoidal contrast enhancement between the linear weight that learning
/// operates on and the effective weight used in sending.
#[derive(Clone, Debug, PartialEq)]
pub struct WtSigParams {
    /// Sigmoid gain. 1 = linear passthrough.
    pub gain: f32,
    /// Sigmoid offset: values > 1 shift weights downward overall.
    pub off: f32,
}

impl Default for WtSigParams {
    fn default() -> Self {
        Self {
            gain: 6.0,
            off: 1.25,
        }
    }
}

impl WtSigParams {
    pub fn update(&mut self) {}

    /// Contrast-enhanced weight from linear weight.
    pub fn sig_fm_lin(&self, lw: f32) -> f32 {
        if lw <= 0.0 {
            return 0.0;
        }
        if lw >= 1.0 {
            return 1.0;
        }
        if self.gain == 1.0 && self.off == 1.0 {
            return lw;
        }
        1.0 / (1.0 + ((self.off * (1.0 - lw)) / lw).powf(self.gain))
    }

    /// Inverse mapping, recovering the linear weight from the effective one.
    pub fn lin_fm_sig(&self, sw: f32) -> f32 {
        if sw <= 0.0 {
            return 0.0;
        }
        if sw >= 1.0 {
            return 1.0;
        }
        if self.gain == 1.0 && self.off == 1.0 {
            return sw;
        }
        let t = ((1.0 - sw) / sw).powf(1.0 / self.gain);
        self.off / (self.off + t)
    }
}

/// Normalization of weight changes by a running estimate of their
/// magnitude, so large transients do not swamp the update.
#[derive(Clone, Debug, PartialEq)]
pub struct DwtNormParams {
    pub on: bool,
    /// Time constant for decay of the running max-abs estimate.
    pub decay_tau: f32,
    /// Floor on the norm divisor.
    pub norm_min: f32,
    /// Overall learning-rate compensation for the normalization.
    pub lr_comp: f32,

    pub(crate) decay_dt: f32,
    pub(crate) decay_dt_c: f32,
}

impl Default for DwtNormParams {
    fn default() -> Self {
        let mut dn = Self {
            on: true,
            decay_tau: 1000.0,
            norm_min: 0.001,
            lr_comp: 0.15,
            decay_dt: 0.0,
            decay_dt_c: 0.0,
        };
        dn.update();
        dn
    }
}

impl DwtNormParams {
    pub fn update(&mut self) {
        self.decay_dt = 1.0 / self.decay_tau;
        self.decay_dt_c = 1.0 - self.decay_dt;
    }

    /// Update the norm from |dwt| and return the multiplier to apply.
    pub fn norm_fm_abs_dwt(&self, norm: &mut f32, abs_dwt: f32) -> f32 {
        *norm = (self.decay_dt_c * *norm).max(abs_dwt);
        if *norm == 0.0 {
            return 1.0;
        }
        self.lr_comp / norm.max(self.norm_min)
    }
}

/// Momentum integration of weight changes.
#[derive(Clone, Debug, PartialEq)]
pub struct MomentumParams {
    pub on: bool,
    /// Time constant for the integration.
    pub m_tau: f32,
    /// Learning-rate compensation for the larger effective changes that
    /// momentum produces.
    pub lr_comp: f32,

    pub(crate) m_dt_c: f32,
}

impl Default for MomentumParams {
    fn default() -> Self {
        let mut mp = Self {
            on: true,
            m_tau: 10.0,
            lr_comp: 0.1,
            m_dt_c: 0.0,
        };
        mp.update();
        mp
    }
}

impl MomentumParams {
    pub fn update(&mut self) {
        self.m_dt_c = 1.0 - 1.0 / self.m_tau;
    }

    /// Integrate dwt into the momentum trace and return the effective dwt.
    pub fn moment_fm_dwt(&self, moment: &mut f32, dwt: f32) -> f32 {
        *moment = self.m_dt_c * *moment + dwt;
        self.lr_comp * *moment
    }
}

/// Weight balance: homeostatic rescaling of increases vs. decreases as a
/// function of the average receiving weight, counteracting hog units.
#[derive(Clone, Debug, PartialEq)]
pub struct WtBalParams {
    pub on: bool,
    /// High threshold on the average weight; above it increases are damped
    /// and decreases amplified.
    pub hi_thr: f32,
    /// Gain above the high threshold.
    pub hi_gain: f32,
    /// Low threshold; below it decreases are damped and increases
    /// amplified.
    pub lo_thr: f32,
    /// Gain below the low threshold.
    pub lo_gain: f32,
    /// Floor applied to the average weight in the low-side computation.
    pub avg_thr: f32,
}

impl Default for WtBalParams {
    fn default() -> Self {
        Self {
            on: true,
            hi_thr: 0.4,
            hi_gain: 4.0,
            lo_thr: 0.4,
            lo_gain: 6.0,
            avg_thr: 0.25,
        }
    }
}

impl WtBalParams {
    pub fn update(&mut self) {}

    /// Increase and decrease factors from the average receiving weight.
    /// Both are exactly 1 between the thresholds.
    pub fn wt_bal(&self, wb_avg: f32) -> (f32, f32) {
        let mut inc = 1.0;
        let mut dec = 1.0;
        if wb_avg > self.hi_thr {
            inc = 1.0 / (1.0 + self.hi_gain * (wb_avg - self.hi_thr));
            dec = 2.0 - inc;
        } else if wb_avg < self.lo_thr {
            let wb_avg = wb_avg.max(self.avg_thr);
            dec = 1.0 / (1.0 + self.lo_gain * (self.lo_thr - wb_avg));
            inc = 2.0 - dec;
        }
        (inc, dec)
    }
}

/// Synapse-level learning parameters, owned by the projection.
#[derive(Clone, Debug, PartialEq)]
pub struct LearnSynParams {
    /// Enable learning on this projection.
    pub learn: bool,
    /// Current learning rate.
    pub lrate: f32,
    /// Initial learning rate, restored by lrate-schedule resets.
    pub lrate_init: f32,
    /// Proportion of hebbian learning mixed into the error-driven term.
    pub k_hebb: f32,
    pub wt_sig: WtSigParams,
    pub norm: DwtNormParams,
    pub momentum: MomentumParams,
    pub wt_bal: WtBalParams,
}

impl Default for LearnSynParams {
    fn default() -> Self {
        Self {
            learn: true,
            lrate: 0.04,
            lrate_init: 0.04,
            k_hebb: 0.1,
            wt_sig: WtSigParams::default(),
            norm: DwtNormParams::default(),
            momentum: MomentumParams::default(),
            wt_bal: WtBalParams::default(),
        }
    }
}

impl LearnSynParams {
    pub fn update(&mut self) {
        self.wt_sig.update();
        self.norm.update();
        self.momentum.update();
        self.wt_bal.update();
    }

    /// Restore the initial learning rate after schedule manipulation.
    pub fn lrate_init(&mut self) {
        self.lrate = self.lrate_init;
    }

    /// Raw weight change for one synapse, before lrate, normalization, and
    /// momentum: contrastive error between plus and minus phase co-products,
    /// soft-bounded by the linear weight, plus a hebbian term gated by the
    /// receiver's BCM learning factor.
    pub fn dwt(
        &self,
        su_act_p: f32,
        su_act_m: f32,
        ru_act_p: f32,
        ru_act_m: f32,
        ru_avg_l_lrn: f32,
        lwt: f32,
    ) -> f32 {
        let mut err = ru_act_p * su_act_p - ru_act_m * su_act_m;
        if err > 0.0 {
            err *= 1.0 - lwt;
        } else {
            err *= lwt;
        }
        let hebb = ru_act_p * (su_act_p - lwt);
        let k_eff = self.k_hebb * ru_avg_l_lrn;
        k_eff * hebb + (1.0 - self.k_hebb) * err
    }
}
