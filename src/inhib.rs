//! Pooled FFFB inhibition: feedforward from average/max excitatory
//! conductance, feedback from average activation, with an overall gain
//! that can oscillate sinusoidally across cycles for sleep-like dynamics.
//!
//! Inhibition is computed once per pool from pool statistics, never from
//! individual unit-to-unit inhibitory connections. Self-inhibition and the
//! running-average activity estimate used for net-input scaling live here
//! too, since they are layer-level concerns.

/// All inhibition params for a layer: whole-layer FFFB, per-sub-pool FFFB,
/// neuron self-inhibition, and running-average activation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InhibParams {
    /// Inhibition across the entire layer.
    pub layer: FFFBParams,
    /// Inhibition across sub-pools, for layers with a pooled shape.
    pub pool: FFFBParams,
    /// Neuron self-inhibition. Produces more graded, linear responses in
    /// individual units; not typically used in cortical layers.
    pub self_inhib: SelfInhibParams,
    /// Running-average activation, used for net-input scaling.
    pub act_avg: ActAvgParams,
}

impl InhibParams {
    pub fn update(&mut self) {
        self.layer.update();
        self.pool.update();
        self.self_inhib.update();
        self.act_avg.update();
    }
}

/// Feedforward (FF) and feedback (FB) inhibition parameters, driven by
/// average (or maximum) net input and by average activation respectively.
#[derive(Clone, Debug, PartialEq)]
pub struct FFFBParams {
    /// Enable this level of inhibition.
    pub on: bool,
    /// Overall inhibition gain: the main parameter for adjusting activity
    /// levels. Scales both ff and fb contributions uniformly. 1.5-2.3
    /// typical. May be rescaled each cycle by the oscillation.
    pub gi: f32,
    /// Baseline gain that the oscillation modulates around and that
    /// `oscil_mute` restores.
    pub gi_base: f32,
    /// Cycles per complete inhibition oscillation period.
    pub gi_osc_per: u32,
    /// Oscillation peak, as a multiple of `gi_base`. Above 1.
    pub gi_osc_max: f32,
    /// Oscillation trough, as a multiple of `gi_base`. Below 1.
    pub gi_osc_min: f32,
    /// Feedforward contribution: multiplies average net input. Anticipates
    /// upcoming excitation; too high makes activity slow to emerge.
    pub ff: f32,
    /// Feedback contribution: multiplies average activation, acting like a
    /// thermostat on layer activity.
    pub fb: f32,
    /// Time constant in cycles for integrating feedback inhibition, which
    /// prevents oscillations. 1.4 works for most cases; slower (3+) is more
    /// robust when inhibition is strong or inputs change rapidly.
    pub fb_tau: f32,
    /// Proportion of max vs. average net input in the feedforward term:
    /// 0 = all average, 1 = all max. More max suits winner-take-all regimes.
    pub max_vs_avg: f32,
    /// Feedforward zero point: no FF inhibition below this average net
    /// input, and it is subtracted above.
    pub ff0: f32,

    pub(crate) fb_dt: f32,
}

impl Default for FFFBParams {
    fn default() -> Self {
        let mut fb = Self {
            on: false,
            gi: 1.8,
            gi_base: 1.8,
            gi_osc_per: 25,
            gi_osc_max: 1.03,
            gi_osc_min: 0.97,
            ff: 1.0,
            fb: 1.0,
            fb_tau: 1.4,
            max_vs_avg: 0.0,
            ff0: 0.1,
            fb_dt: 0.0,
        };
        fb.update();
        fb
    }
}

impl FFFBParams {
    pub fn update(&mut self) {
        self.fb_dt = 1.0 / self.fb_tau;
        // a zero period would divide by zero in the oscillation
        self.gi_osc_per = self.gi_osc_per.max(1);
    }

    /// Entering sleep: capture the current gain as the oscillation baseline.
    pub fn sleep(&mut self) {
        self.gi_base = self.gi;
    }

    /// Waking: stop oscillating and restore the baseline gain.
    pub fn wake(&mut self) {
        self.oscil_mute();
    }

    /// Feedforward inhibition from average and max excitatory conductance
    /// within the relevant scope.
    pub fn ff_inhib(&self, avg_ge: f32, max_ge: f32) -> f32 {
        let ff_netin = avg_ge + self.max_vs_avg * (max_ge - avg_ge);
        if ff_netin > self.ff0 {
            self.ff * (ff_netin - self.ff0)
        } else {
            0.0
        }
    }

    /// Feedback inhibition from average activation.
    #[inline]
    pub fn fb_inhib(&self, avg_act: f32) -> f32 {
        self.fb * avg_act
    }

    /// Time-integrate feedback inhibition toward its new value.
    #[inline]
    pub fn fb_update(&self, fbi: &mut f32, new_fbi: f32) {
        *fbi += self.fb_dt * (new_fbi - *fbi);
    }

    /// Full inhibition computation for one pool's activity statistics.
    /// When this level is off the state is simply reset.
    pub fn inhib(&self, avg_ge: f32, max_ge: f32, avg_act: f32, inh: &mut FFFBInhib) {
        if !self.on {
            inh.init();
            return;
        }
        let ffi = self.ff_inhib(avg_ge, max_ge);
        let fbi = self.fb_inhib(avg_act);
        inh.ffi = ffi;
        self.fb_update(&mut inh.fbi, fbi);
        inh.gi = self.gi * (ffi + inh.fbi);
        inh.gi_orig = inh.gi;
    }

    /// Rescale the gain along a sine of the cycle counter: positive half
    /// stretched toward `gi_osc_max`, negative half compressed toward
    /// `gi_osc_min`, both relative to `gi_base`.
    pub fn inhib_oscil(&mut self, step: u32) {
        let per = (step % self.gi_osc_per) as f32 / self.gi_osc_per as f32
            * 2.0
            * std::f32::consts::PI;
        let scal = per.sin();
        let fscal = if scal > 0.0 {
            scal * (self.gi_osc_max - 1.0) + 1.0
        } else {
            scal * (1.0 - self.gi_osc_min) + 1.0
        };
        self.gi = self.gi_base * fscal;
    }

    /// Set the gain back to its baseline.
    pub fn oscil_mute(&mut self) {
        self.gi = self.gi_base;
    }
}

/// Computed FFFB inhibition state for one pool.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FFFBInhib {
    /// Feedforward inhibition value.
    pub ffi: f32,
    /// Integrated feedback inhibition value.
    pub fbi: f32,
    /// Overall inhibitory conductance: gi_gain * (ffi + fbi), possibly
    /// raised to the layer-level value for sub-pools.
    pub gi: f32,
    /// Gi as originally computed, before the layer-max composition.
    pub gi_orig: f32,
}

impl FFFBInhib {
    pub fn init(&mut self) {
        self.ffi = 0.0;
        self.fbi = 0.0;
        self.gi = 0.0;
        self.gi_orig = 0.0;
    }
}

/// Neuron self-inhibition: a unit's own activation feeds back as a
/// proportional additional inhibitory conductance.
#[derive(Clone, Debug, PartialEq)]
pub struct SelfInhibParams {
    pub on: bool,
    /// Strength of the self feedback.
    pub gi: f32,
    /// Integration time constant in cycles, preventing oscillation.
    pub tau: f32,

    pub(crate) dt: f32,
}

impl Default for SelfInhibParams {
    fn default() -> Self {
        let mut si = Self {
            on: false,
            gi: 0.4,
            tau: 1.4,
            dt: 0.0,
        };
        si.update();
        si
    }
}

impl SelfInhibParams {
    pub fn update(&mut self) {
        self.dt = 1.0 / self.tau;
    }

    /// Update the self-inhibition conductance from current activation.
    /// Cleared when disabled so a mid-run toggle cannot leave a residue.
    pub fn inhib(&self, gi_self: &mut f32, act: f32) {
        if self.on {
            *gi_self += self.dt * (self.gi * act - *gi_self);
        } else {
            *gi_self = 0.0;
        }
    }
}

/// Expected and running-average activity levels in a layer, used to scale
/// net input so layers with different activity levels balance out.
#[derive(Clone, Debug, PartialEq)]
pub struct ActAvgParams {
    /// Initial estimated average activity. 0.1-0.2 typical; accuracy
    /// matters because it seeds net-input scaling.
    pub init: f32,
    /// Use `init` as a constant effective value instead of the running
    /// average.
    pub fixed: bool,
    /// Replace the initial estimate with the first actually measured
    /// average, which is likely better than the guess.
    pub use_first: bool,
    /// Time constant in trials for the running average.
    pub tau: f32,
    /// Multiplier applied to the running average to get the effective
    /// value used in net-input scaling.
    pub adjust: f32,

    pub(crate) dt: f32,
}

impl Default for ActAvgParams {
    fn default() -> Self {
        let mut aa = Self {
            init: 0.15,
            fixed: false,
            use_first: true,
            tau: 100.0,
            adjust: 1.0,
            dt: 0.0,
        };
        aa.update();
        aa
    }
}

impl ActAvgParams {
    pub fn update(&mut self) {
        self.dt = 1.0 / self.tau;
    }

    /// Initial effective average activity, applied during weight init.
    pub fn eff_init(&self) -> f32 {
        if self.fixed {
            self.init
        } else {
            self.adjust * self.init
        }
    }

    /// Update the running average from a measured average activity level.
    /// Zero measurements are skipped; the first real measurement jumps
    /// halfway from the initial guess.
    pub fn avg_fm_act(&self, avg: &mut f32, act: f32) {
        if act == 0.0 {
            return;
        }
        if self.use_first && *avg == self.init {
            *avg += 0.5 * (act - *avg);
        } else {
            *avg += self.dt * (act - *avg);
        }
    }

    /// Update the effective scaling value from the running average.
    pub fn eff_fm_avg(&self, eff: &mut f32, avg: f32) {
        if self.fixed {
            *eff = self.init;
        } else {
            *eff = self.adjust * avg;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ff_inhib_zero_point() {
        let mut fb = FFFBParams::default();
        fb.on = true;
        // avg = max = 0.3 with ff0 = 0.1 leaves 0.2 of drive
        assert!((fb.ff_inhib(0.3, 0.3) - 0.2).abs() < 1e-6);
        // below the zero point there is no feedforward inhibition
        assert_eq!(fb.ff_inhib(0.05, 0.05), 0.0);
    }

    #[test]
    fn max_vs_avg_mixes_toward_max() {
        let mut fb = FFFBParams::default();
        fb.on = true;
        fb.max_vs_avg = 1.0;
        assert!((fb.ff_inhib(0.2, 0.6) - 0.5).abs() < 1e-6);
        fb.max_vs_avg = 0.5;
        assert!((fb.ff_inhib(0.2, 0.6) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn disabled_fffb_resets_state() {
        let fb = FFFBParams::default();
        let mut inh = FFFBInhib {
            ffi: 0.3,
            fbi: 0.2,
            gi: 0.9,
            gi_orig: 0.9,
        };
        fb.inhib(0.5, 0.5, 0.5, &mut inh);
        assert_eq!(inh, FFFBInhib::default());
    }

    #[test]
    fn feedback_integrates_toward_target() {
        let mut fb = FFFBParams::default();
        fb.on = true;
        let mut inh = FFFBInhib::default();
        for _ in 0..100 {
            fb.inhib(0.3, 0.3, 0.25, &mut inh);
        }
        // fbi converges to fb * avg_act
        assert!((inh.fbi - 0.25).abs() < 1e-3);
        let expect_gi = fb.gi * (0.2 + inh.fbi);
        assert!((inh.gi - expect_gi).abs() < 1e-4);
    }

    #[test]
    fn oscillation_bounded_and_mutes() {
        let mut fb = FFFBParams::default();
        fb.on = true;
        let lo = fb.gi_base * fb.gi_osc_min;
        let hi = fb.gi_base * fb.gi_osc_max;
        for step in 0..200 {
            fb.inhib_oscil(step);
            assert!(
                fb.gi >= lo - 1e-5 && fb.gi <= hi + 1e-5,
                "gi {} out of [{lo}, {hi}] at step {step}",
                fb.gi
            );
        }
        fb.oscil_mute();
        assert_eq!(fb.gi, fb.gi_base);
    }

    #[test]
    fn zero_oscil_period_clamped_at_update() {
        let mut fb = FFFBParams::default();
        fb.gi_osc_per = 0;
        fb.update();
        assert_eq!(fb.gi_osc_per, 1);
        fb.inhib_oscil(5);
        assert_eq!(fb.gi, fb.gi_base);
    }

    #[test]
    fn self_inhib_clears_when_off() {
        let si = SelfInhibParams::default();
        let mut gi_self = 0.4;
        si.inhib(&mut gi_self, 0.8);
        assert_eq!(gi_self, 0.0);

        let mut si = SelfInhibParams::default();
        si.on = true;
        si.update();
        let mut gi_self = 0.0;
        for _ in 0..100 {
            si.inhib(&mut gi_self, 1.0);
        }
        assert!((gi_self - si.gi).abs() < 1e-3);
    }

    #[test]
    fn act_avg_first_measurement_jumps_halfway() {
        let aa = ActAvgParams::default();
        let mut avg = aa.init;
        aa.avg_fm_act(&mut avg, 0.25);
        assert!((avg - 0.2).abs() < 1e-6);
        // subsequent updates use the slow time constant
        let before = avg;
        aa.avg_fm_act(&mut avg, 0.25);
        assert!((avg - before).abs() < 0.01 * (0.25 - before).abs() + 1e-6);
        // zero activity is ignored entirely
        let before = avg;
        aa.avg_fm_act(&mut avg, 0.0);
        assert_eq!(avg, before);
    }

    #[test]
    fn eff_fixed_vs_adjusted() {
        let mut aa = ActAvgParams::default();
        let mut eff = 0.0;
        aa.eff_fm_avg(&mut eff, 0.3);
        assert_eq!(eff, 0.3);
        aa.fixed = true;
        aa.eff_fm_avg(&mut eff, 0.3);
        assert_eq!(eff, aa.init);
    }
}
