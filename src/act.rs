//! Activation parameters and the per-neuron conductance/activation update.
//!
//! `ActParams` drives the per-cycle state transition for one neuron:
//! conductance integration (with soft-clamp blending), noise injection,
//! the membrane potential Euler step, and rate-code activation from the
//! noisy XX1 function, or a hard-clamp short-circuit when external input
//! is clamped directly.

use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::chans::Chans;
use crate::neuron::{flags, Neuron};
use crate::xx1::Xx1Params;

/// A closed f32 range with clipping, used for Vm and clamp bounds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Range32 {
    pub min: f32,
    pub max: f32,
}

impl Range32 {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Clip a value into the range.
    #[inline]
    pub fn clip(&self, v: f32) -> f32 {
        v.clamp(self.min, self.max)
    }
}

/// Time and rate constants for temporal integration at the unit level.
///
/// All taus are in cycles (nominally milliseconds). The derived `*_dt`
/// rates are `integ / tau`; call [`DtParams::update`] after changes.
#[derive(Clone, Debug, PartialEq)]
pub struct DtParams {
    /// Overall rate constant for numerical integration. 1 cycle = 1 msec
    /// at the default of 1; lower for improved numerical stability.
    pub integ: f32,
    /// Membrane potential and rate-code activation time constant.
    pub vm_tau: f32,
    /// Time constant for integrating synaptic conductances. Larger values
    /// damp oscillations from rapidly changing inputs.
    pub g_tau: f32,
    /// Time constant (in trials) for the long-run activation average.
    pub avg_tau: f32,

    pub(crate) vm_dt: f32,
    pub(crate) g_dt: f32,
    pub(crate) avg_dt: f32,
}

impl Default for DtParams {
    fn default() -> Self {
        let mut dt = Self {
            integ: 1.0,
            vm_tau: 3.3,
            g_tau: 1.4,
            avg_tau: 200.0,
            vm_dt: 0.0,
            g_dt: 0.0,
            avg_dt: 0.0,
        };
        dt.update();
        dt
    }
}

impl DtParams {
    pub fn update(&mut self) {
        self.vm_dt = self.integ / self.vm_tau;
        self.g_dt = self.integ / self.g_tau;
        self.avg_dt = 1.0 / self.avg_tau;
    }

    /// Time-filter an integrated conductance toward its raw value.
    #[inline]
    pub fn g_fm_raw(&self, g_raw: f32, g: &mut f32) {
        *g += self.g_dt * (g_raw - *g);
    }
}

/// Initial values for key state variables, applied at trial start by
/// `init_acts` or proportionally by `decay_state`.
#[derive(Clone, Debug, PartialEq)]
pub struct ActInitParams {
    /// Proportion to decay activation state toward init values per trial.
    pub decay: f32,
    /// Initial membrane potential. Somewhat above the resting leak
    /// potential tends to work better.
    pub vm: f32,
    /// Initial activation.
    pub act: f32,
    /// Baseline excitatory conductance, a constant background drive
    /// standing in for inputs not represented in the model.
    pub ge: f32,
}

impl Default for ActInitParams {
    fn default() -> Self {
        Self {
            decay: 1.0,
            vm: 0.4,
            act: 0.0,
            ge: 0.0,
        }
    }
}

/// Activity thresholds that gate sending, trading precision for speed.
///
/// During sleep both thresholds drop to zero so that every change
/// propagates through depressed weights; `wake` restores the configured
/// values.
#[derive(Clone, Debug, PartialEq)]
pub struct OptThreshParams {
    /// Don't send activation at or below this value.
    pub send: f32,
    /// Don't send activation changes until they exceed this threshold.
    pub delta: f32,

    base_send: f32,
    base_delta: f32,
}

impl Default for OptThreshParams {
    fn default() -> Self {
        Self {
            send: 0.1,
            delta: 0.005,
            base_send: 0.1,
            base_delta: 0.005,
        }
    }
}

impl OptThreshParams {
    pub fn update(&mut self) {}

    /// Enter sleep mode: snapshot the configured thresholds and send
    /// everything.
    pub fn sleep(&mut self) {
        self.base_send = self.send;
        self.base_delta = self.delta;
        self.send = 0.0;
        self.delta = 0.0;
    }

    /// Leave sleep mode: restore the snapshotted thresholds.
    pub fn wake(&mut self) {
        self.send = self.base_send;
        self.delta = self.base_delta;
    }
}

/// How external inputs drive activation: hard clamping sets `act = ext`
/// directly; soft clamping injects `ext` into the excitatory conductance.
#[derive(Clone, Debug, PartialEq)]
pub struct ClampParams {
    /// Hard clamp (act = ext) vs soft clamp (ge += gain * ext).
    pub hard: bool,
    /// Allowed range of clamped values. Max is 0.95 by default because the
    /// rate-code function saturates.
    pub range: Range32,
    /// Soft clamp gain factor.
    pub gain: f32,
    /// Compute soft clamp as an average of current and clamp-driven
    /// conductance rather than a sum.
    pub avg: bool,
    /// Mixing proportion for the average: ext contributes avg_gain, the
    /// current ge contributes (1 - avg_gain).
    pub avg_gain: f32,
}

impl Default for ClampParams {
    fn default() -> Self {
        Self {
            hard: true,
            range: Range32::new(0.0, 0.95),
            gain: 0.2,
            avg: false,
            avg_gain: 0.2,
        }
    }
}

impl ClampParams {
    pub fn update(&mut self) {}

    /// Average-based soft clamp conductance.
    #[inline]
    pub fn avg_ge(&self, ext: f32, ge: f32) -> f32 {
        self.avg_gain * self.gain * ext + (1.0 - self.avg_gain) * ge
    }
}

/// Where processing noise is injected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActNoiseKind {
    /// No noise.
    None,
    /// Added to the membrane potential. Has no effect on pure rate-code
    /// activations, which do not read vm above threshold.
    Vm,
    /// Added to the excitatory conductance: the right choice for
    /// rate-coded activations.
    Ge,
    /// Added to the final rate-code activation.
    Act,
}

/// Noise sample distribution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoiseDist {
    /// Constant mean, no sampling.
    Mean,
    /// Uniform over mean +/- var.
    Uniform,
    /// Gaussian with standard deviation var.
    Gaussian,
}

/// Parameters for activation-level noise.
#[derive(Clone, Debug, PartialEq)]
pub struct ActNoiseParams {
    pub kind: ActNoiseKind,
    pub dist: NoiseDist,
    pub mean: f32,
    pub var: f32,
    /// Keep the same noise value over an entire alpha cycle. Produces a
    /// stable effect that learning can use; strongly recommended when
    /// noise is on.
    pub fixed: bool,
}

impl Default for ActNoiseParams {
    fn default() -> Self {
        Self {
            kind: ActNoiseKind::None,
            dist: NoiseDist::Gaussian,
            mean: 0.0,
            var: 0.0,
            fixed: true,
        }
    }
}

impl ActNoiseParams {
    pub fn update(&mut self) {}

    /// Draw one noise sample.
    pub fn gen(&self, rng: &mut StdRng) -> f32 {
        match self.dist {
            NoiseDist::Mean => self.mean,
            NoiseDist::Uniform => {
                if self.var == 0.0 {
                    self.mean
                } else {
                    rng.gen_range(self.mean - self.var..self.mean + self.var)
                }
            }
            NoiseDist::Gaussian => match Normal::new(self.mean, self.var) {
                Ok(n) => n.sample(rng),
                Err(_) => self.mean,
            },
        }
    }
}

/// All activation computation params and functions, at the neuron level.
/// Included in a layer to drive its per-cycle computation.
#[derive(Clone, Debug, PartialEq)]
pub struct ActParams {
    /// X/(X+1) rate-code activation function parameters.
    pub xx1: Xx1Params,
    /// Optimization thresholds for faster processing.
    pub opt_thresh: OptThreshParams,
    /// Initial values for key state variables.
    pub init: ActInitParams,
    /// Time and rate constants for temporal integration.
    pub dt: DtParams,
    /// Maximal conductance levels per channel.
    pub gbar: Chans,
    /// Reversal potentials per channel.
    pub erev: Chans,
    /// How external inputs drive activation.
    pub clamp: ClampParams,
    /// Noise configuration.
    pub noise: ActNoiseParams,
    /// Allowed Vm range.
    pub vm_range: Range32,

    /// erev - thr per channel, derived in update().
    pub(crate) erev_sub_thr: Chans,
    /// thr - erev per channel, derived in update().
    pub(crate) thr_sub_erev: Chans,
}

impl Default for ActParams {
    fn default() -> Self {
        let mut ac = Self {
            xx1: Xx1Params::default(),
            opt_thresh: OptThreshParams::default(),
            init: ActInitParams::default(),
            dt: DtParams::default(),
            gbar: Chans::new(1.0, 0.2, 1.0, 1.0),
            erev: Chans::new(1.0, 0.3, 0.25, 0.1),
            clamp: ClampParams::default(),
            noise: ActNoiseParams::default(),
            vm_range: Range32::new(0.0, 2.0),
            erev_sub_thr: Chans::default(),
            thr_sub_erev: Chans::default(),
        };
        ac.update();
        ac
    }
}

impl ActParams {
    /// Recompute all derived parameter blocks. Must be called after any
    /// parameter change, or threshold math goes stale.
    pub fn update(&mut self) {
        self.erev_sub_thr = Chans::from_other_minus(self.erev, self.xx1.thr);
        self.thr_sub_erev = Chans::from_minus_other(self.xx1.thr, self.erev);
        self.xx1.update();
        self.opt_thresh.update();
        self.dt.update();
        self.clamp.update();
        self.noise.update();
    }

    /// Reset the conductance accumulation state, at start of every trial.
    pub fn init_ge_gi(&self, nrn: &mut Neuron) {
        nrn.act_sent = 0.0;
        nrn.ge_raw = 0.0;
        nrn.ge_inc = 0.0;
        nrn.gi_raw = 0.0;
        nrn.gi_inc = 0.0;
    }

    /// Decay activation state toward initial values in proportion to
    /// `decay`. Delta, net current, and increments are always zeroed.
    pub fn decay_state(&self, nrn: &mut Neuron, decay: f32) {
        if decay > 0.0 {
            nrn.act -= decay * (nrn.act - self.init.act);
            nrn.ge -= decay * (nrn.ge - self.init.ge);
            nrn.gi -= decay * nrn.gi;
            nrn.gi_self -= decay * nrn.gi_self;
            nrn.vm -= decay * (nrn.vm - self.init.vm);
        }
        nrn.act_del = 0.0;
        nrn.inet = 0.0;
        self.init_ge_gi(nrn);
    }

    /// Fully initialize activation state. Called during weight init;
    /// otherwise `decay_state` is used.
    pub fn init_acts(&self, nrn: &mut Neuron) {
        nrn.act = self.init.act;
        nrn.ge = self.init.ge;
        nrn.gi = 0.0;
        nrn.gi_self = 0.0;
        nrn.gi_syn = 0.0;
        nrn.inet = 0.0;
        nrn.vm = self.init.vm;
        nrn.targ = 0.0;
        nrn.ext = 0.0;
        nrn.act_del = 0.0;
        self.init_ge_gi(nrn);
    }

    /// Fold pending increments into the raw conductances.
    pub fn g_raw_fm_inc(&self, nrn: &mut Neuron) {
        nrn.ge_raw += nrn.ge_inc;
        nrn.ge_inc = 0.0;
        nrn.gi_raw += nrn.gi_inc;
        nrn.gi_inc = 0.0;
    }

    /// Integrate conductances for one cycle: fold increments, blend soft
    /// clamp drive, time-filter toward raw values, and inject conductance
    /// noise if configured. Negative integrated inhibition is clamped to
    /// zero: it has no physical meaning.
    pub fn ge_gi_fm_inc(&self, nrn: &mut Neuron, rng: &mut StdRng) {
        self.g_raw_fm_inc(nrn);

        let mut ge_raw = nrn.ge_raw;
        if !self.clamp.hard && nrn.has_flag(flags::HAS_EXT) {
            if self.clamp.avg {
                ge_raw = self.clamp.avg_ge(nrn.ext, ge_raw);
            } else {
                ge_raw += nrn.ext * self.clamp.gain;
            }
        }

        self.dt.g_fm_raw(ge_raw, &mut nrn.ge);
        self.dt.g_fm_raw(nrn.gi_raw, &mut nrn.gi_syn);
        nrn.gi_syn = nrn.gi_syn.max(0.0);

        // first place noise is needed each cycle, so generate here unless
        // the per-trial fixed policy already did
        if self.noise.kind != ActNoiseKind::None
            && !self.noise.fixed
            && self.noise.dist != NoiseDist::Mean
        {
            nrn.noise = self.noise.gen(rng);
        }
        if self.noise.kind == ActNoiseKind::Ge {
            nrn.ge += nrn.noise;
        }
    }

    /// Net current from conductances and membrane potential.
    #[inline]
    pub fn inet_fm_g(&self, vm: f32, ge: f32, gi: f32, gk: f32) -> f32 {
        ge * (self.erev.e - vm)
            + self.gbar.l * (self.erev.l - vm)
            + gi * (self.erev.i - vm)
            + gk * (self.erev.k - vm)
    }

    /// One Euler step of membrane potential from conductances. Vm only
    /// matters in the sub-threshold regime: above threshold the firing
    /// rate is a direct function of ge.
    pub fn vm_fm_g(&self, nrn: &mut Neuron) {
        let ge = nrn.ge * self.gbar.e;
        let gi = nrn.gi * self.gbar.i;
        nrn.inet = self.inet_fm_g(nrn.vm, ge, gi, 0.0);
        let mut nw_vm = nrn.vm + self.dt.vm_dt * nrn.inet;
        if self.noise.kind == ActNoiseKind::Vm {
            nw_vm += nrn.noise;
        }
        nrn.vm = self.vm_range.clip(nw_vm);
    }

    /// The minimum excitatory drive needed to overcome leak plus inhibition
    /// at firing threshold, derived algebraically from the channel params.
    /// The denominator `thr_sub_erev.e` is nonzero by construction (thr is
    /// strictly below erev.e), so this is total over all inputs.
    #[inline]
    pub fn ge_thr_fm_g(&self, nrn: &Neuron) -> f32 {
        (self.gbar.i * nrn.gi * self.erev_sub_thr.i + self.gbar.l * self.erev_sub_thr.l)
            / self.thr_sub_erev.e
    }

    /// Compute rate-coded activation from conductances. Hard-clamped
    /// neurons short-circuit the pipeline entirely.
    pub fn act_fm_g(&self, nrn: &mut Neuron) {
        if self.has_hard_clamp(nrn) {
            self.hard_clamp(nrn);
            return;
        }
        let nw_act = if nrn.act < self.xx1.vm_act_thr && nrn.vm <= self.xx1.thr {
            // sub-threshold regime: drive from vm so units don't jump
            // straight to the gelin dynamics before they are active
            self.xx1.noisy_xx1(nrn.vm - self.xx1.thr)
        } else {
            let ge_thr = self.ge_thr_fm_g(nrn);
            self.xx1.noisy_xx1(nrn.ge * self.gbar.e - ge_thr)
        };
        let cur_act = nrn.act;
        let mut nw_act = cur_act + self.dt.vm_dt * (nw_act - cur_act);
        nrn.act_del = nw_act - cur_act;
        if self.noise.kind == ActNoiseKind::Act {
            nw_act += nrn.noise;
        }
        nrn.act = nw_act;
    }

    /// Whether this neuron has external input that should be hard clamped.
    #[inline]
    pub fn has_hard_clamp(&self, nrn: &Neuron) -> bool {
        self.clamp.hard && nrn.has_flag(flags::HAS_EXT)
    }

    /// Clamp activation directly from external input, back-computing vm
    /// from the inverse transfer function and zeroing delta / net current.
    pub fn hard_clamp(&self, nrn: &mut Neuron) {
        let clmp = self.clamp.range.clip(nrn.ext);
        nrn.act = clmp;
        nrn.vm = self.xx1.thr + nrn.act / self.xx1.gain;
        nrn.act_del = 0.0;
        nrn.inet = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn hard_clamp_reproduces_ext_exactly() {
        let ac = ActParams::default();
        let mut nrn = Neuron::default();
        nrn.ext = 0.8;
        nrn.set_flag(flags::HAS_EXT);
        ac.act_fm_g(&mut nrn);
        assert_eq!(nrn.act, 0.8);
        assert_eq!(nrn.act_del, 0.0);
        assert_eq!(nrn.inet, 0.0);

        // out of range ext is range-limited, not passed through
        nrn.ext = 2.0;
        ac.act_fm_g(&mut nrn);
        assert_eq!(nrn.act, ac.clamp.range.max);
    }

    #[test]
    fn decay_zero_only_clears_transients() {
        let ac = ActParams::default();
        let mut nrn = Neuron::default();
        ac.init_acts(&mut nrn);
        nrn.act = 0.6;
        nrn.vm = 0.7;
        nrn.ge = 0.5;
        nrn.gi = 0.2;
        nrn.gi_self = 0.1;
        nrn.act_del = 0.05;
        nrn.inet = 0.3;
        nrn.ge_inc = 0.2;
        nrn.gi_inc = 0.2;

        let snapshot = nrn.clone();
        ac.decay_state(&mut nrn, 0.0);

        assert_eq!(nrn.act, snapshot.act);
        assert_eq!(nrn.vm, snapshot.vm);
        assert_eq!(nrn.ge, snapshot.ge);
        assert_eq!(nrn.gi, snapshot.gi);
        assert_eq!(nrn.gi_self, snapshot.gi_self);
        assert_eq!(nrn.act_del, 0.0);
        assert_eq!(nrn.inet, 0.0);
        assert_eq!(nrn.ge_inc, 0.0);
        assert_eq!(nrn.gi_inc, 0.0);
        assert_eq!(nrn.ge_raw, 0.0);
    }

    #[test]
    fn full_decay_returns_to_init() {
        let ac = ActParams::default();
        let mut nrn = Neuron::default();
        ac.init_acts(&mut nrn);
        nrn.act = 0.9;
        nrn.vm = 1.2;
        nrn.gi = 0.5;
        ac.decay_state(&mut nrn, 1.0);
        assert!((nrn.act - ac.init.act).abs() < 1e-6);
        assert!((nrn.vm - ac.init.vm).abs() < 1e-6);
        assert!(nrn.gi.abs() < 1e-6);
    }

    #[test]
    fn negative_synaptic_inhibition_clamped() {
        let ac = ActParams::default();
        let mut rng = StdRng::seed_from_u64(7);
        let mut nrn = Neuron::default();
        nrn.gi_inc = -5.0;
        ac.ge_gi_fm_inc(&mut nrn, &mut rng);
        assert!(nrn.gi_syn >= 0.0);
    }

    #[test]
    fn vm_stays_in_range() {
        let ac = ActParams::default();
        let mut nrn = Neuron::default();
        nrn.vm = 0.4;
        nrn.ge = 100.0; // absurd drive
        for _ in 0..50 {
            ac.vm_fm_g(&mut nrn);
        }
        assert!(nrn.vm <= ac.vm_range.max && nrn.vm >= ac.vm_range.min);
    }

    #[test]
    fn soft_clamp_adds_to_ge() {
        let mut ac = ActParams::default();
        ac.clamp.hard = false;
        ac.update();
        let mut rng = StdRng::seed_from_u64(7);

        let mut clamped = Neuron::default();
        clamped.ext = 1.0;
        clamped.set_flag(flags::HAS_EXT);
        let mut free = Neuron::default();

        ac.ge_gi_fm_inc(&mut clamped, &mut rng);
        ac.ge_gi_fm_inc(&mut free, &mut rng);
        assert!(clamped.ge > free.ge);
    }

    #[test]
    fn opt_thresh_sleep_wake() {
        let mut ot = OptThreshParams::default();
        ot.sleep();
        assert_eq!(ot.send, 0.0);
        assert_eq!(ot.delta, 0.0);
        ot.wake();
        assert_eq!(ot.send, 0.1);
        assert_eq!(ot.delta, 0.005);
    }
}
