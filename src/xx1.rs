//! Noisy X/(X+1) rate-code activation function.
//!
//! Directly computes a close approximation to x/(x+1) convolved with a
//! Gaussian noise kernel of variance `nvar`, so no lookup table is needed.
//! Three branches: a sigmoid below zero, a linear interpolation bridge just
//! above zero, and gain-corrected x/(x+1) beyond that. The interpolation
//! keeps the function continuous at the branch boundaries.

/// Parameters for the noisy x/(x+1) rate-coded activation function,
/// operating on the g_e-linear (gelin) drive.
///
/// Call [`Xx1Params::update`] after mutating any parameter: the `sig_*` and
/// `interp_val` fields are derived and go stale otherwise.
#[derive(Clone, Debug, PartialEq)]
pub struct Xx1Params {
    /// Threshold value Theta for firing output activation.
    pub thr: f32,
    /// Gain (gamma) of the activation function. 100 is standard; lower
    /// values give more graded signals.
    pub gain: f32,
    /// Variance of the Gaussian noise kernel convolved with XX1. Sets the
    /// curvature of the function near threshold. Not stochastic noise.
    pub nvar: f32,
    /// Activation below which the direct `vm - thr` drive is used instead of
    /// the gelin drive. Should be low: once a unit is active it switches to
    /// `ge - ge_thr` dynamics.
    pub vm_act_thr: f32,
    /// Multiplier on the sigmoid used for drive < thr.
    pub sig_mult: f32,
    /// Power for computing `sig_mult_eff` as a function of gain * nvar.
    pub sig_mult_pow: f32,
    /// Gain multiplier on (net - thr) for the sub-threshold sigmoid.
    pub sig_gain: f32,
    /// Interpolation range above zero.
    pub interp_range: f32,
    /// Range in units of nvar over which to apply gain correction,
    /// compensating for the convolution.
    pub gain_cor_range: f32,
    /// Gain correction multiplier.
    pub gain_cor: f32,

    // derived, set by update()
    pub(crate) sig_gain_nvar: f32,
    pub(crate) sig_mult_eff: f32,
    pub(crate) sig_val_at_0: f32,
    pub(crate) interp_val: f32,
}

impl Default for Xx1Params {
    fn default() -> Self {
        let mut xp = Self {
            thr: 0.5,
            gain: 100.0,
            nvar: 0.005,
            vm_act_thr: 0.01,
            sig_mult: 0.33,
            sig_mult_pow: 0.8,
            sig_gain: 3.0,
            interp_range: 0.01,
            gain_cor_range: 10.0,
            gain_cor: 0.1,
            sig_gain_nvar: 0.0,
            sig_mult_eff: 0.0,
            sig_val_at_0: 0.0,
            interp_val: 0.0,
        };
        xp.update();
        xp
    }
}

impl Xx1Params {
    /// Recompute derived constants. Must be called after any parameter change.
    pub fn update(&mut self) {
        self.sig_gain_nvar = self.sig_gain / self.nvar;
        self.sig_mult_eff = self.sig_mult * (self.gain * self.nvar).powf(self.sig_mult_pow);
        self.sig_val_at_0 = 0.5 * self.sig_mult_eff;
        self.interp_val = self.xx1_gain_cor(self.interp_range) - self.sig_val_at_0;
    }

    /// The basic x/(x+1) function.
    #[inline]
    pub fn xx1(&self, x: f32) -> f32 {
        x / (x + 1.0)
    }

    /// x/(x+1) with gain correction within `gain_cor_range`, de-rating the
    /// nominal gain as x approaches `gain_cor_range * nvar`.
    pub fn xx1_gain_cor(&self, x: f32) -> f32 {
        let gain_cor_fact = (self.gain_cor_range - (x / self.nvar)) / self.gain_cor_range;
        if gain_cor_fact < 0.0 {
            return self.xx1(self.gain * x);
        }
        let new_gain = self.gain * (1.0 - self.gain_cor * gain_cor_fact);
        self.xx1(new_gain * x)
    }

    /// Noisy x/(x+1): sigmoid below zero, interpolation bridge in
    /// `[0, interp_range)`, gain-corrected x/(x+1) above.
    pub fn noisy_xx1(&self, x: f32) -> f32 {
        if x < 0.0 {
            self.sig_mult_eff / (1.0 + (-(x * self.sig_gain_nvar)).exp())
        } else if x < self.interp_range {
            let interp = 1.0 - ((self.interp_range - x) / self.interp_range);
            self.sig_val_at_0 + interp * self.interp_val
        } else {
            self.xx1_gain_cor(x)
        }
    }

    /// Gain-corrected x/(x+1) using an externally supplied gain factor.
    pub fn xx1_gain_cor_gain(&self, x: f32, gain: f32) -> f32 {
        let gain_cor_fact = (self.gain_cor_range - (x / self.nvar)) / self.gain_cor_range;
        if gain_cor_fact < 0.0 {
            return self.xx1(gain * x);
        }
        let new_gain = gain * (1.0 - self.gain_cor * gain_cor_fact);
        self.xx1(new_gain * x)
    }

    /// Noisy x/(x+1) using an externally supplied gain factor, for call
    /// sites where gain varies per call without mutating shared params.
    pub fn noisy_xx1_gain(&self, x: f32, gain: f32) -> f32 {
        if x < self.interp_range {
            let sig_mult_eff = self.sig_mult * (gain * self.nvar).powf(self.sig_mult_pow);
            let sig_val_at_0 = 0.5 * sig_mult_eff;
            if x < 0.0 {
                sig_mult_eff / (1.0 + (-(x * self.sig_gain_nvar)).exp())
            } else {
                let interp = 1.0 - ((self.interp_range - x) / self.interp_range);
                sig_val_at_0 + interp * self.interp_val
            }
        } else {
            self.xx1_gain_cor_gain(x, gain)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continuity_at_branch_points() {
        let xp = Xx1Params::default();
        let eps = 1e-4_f32;

        // at x = 0: sigmoid limit vs interpolation start
        let below = xp.noisy_xx1(-1e-6);
        let above = xp.noisy_xx1(1e-6);
        assert!(
            (below - above).abs() < eps,
            "jump at 0: {below} vs {above}"
        );

        // at x = interp_range: interpolation end vs gain-corrected branch
        let below = xp.noisy_xx1(xp.interp_range - 1e-6);
        let above = xp.noisy_xx1(xp.interp_range + 1e-6);
        assert!(
            (below - above).abs() < eps,
            "jump at interp_range: {below} vs {above}"
        );
    }

    #[test]
    fn monotone_and_bounded() {
        let xp = Xx1Params::default();
        let mut prev = xp.noisy_xx1(-1.0);
        let mut x = -1.0_f32;
        while x < 2.0 {
            let v = xp.noisy_xx1(x);
            assert!((0.0..1.0).contains(&v), "out of range at {x}: {v}");
            assert!(v + 1e-6 >= prev, "non-monotone at {x}");
            prev = v;
            x += 0.001;
        }
    }

    #[test]
    fn stale_derived_constants_refresh_on_update() {
        let mut xp = Xx1Params::default();
        let v0 = xp.noisy_xx1(-0.01);
        xp.gain = 40.0;
        xp.update();
        let v1 = xp.noisy_xx1(-0.01);
        assert_ne!(v0, v1, "update() must recompute the sigmoid constants");
    }

    #[test]
    fn gain_overload_matches_at_shared_gain() {
        let xp = Xx1Params::default();
        for &x in &[0.02_f32, 0.1, 0.5, 1.0] {
            let a = xp.noisy_xx1(x);
            let b = xp.noisy_xx1_gain(x, xp.gain);
            assert!((a - b).abs() < 1e-6, "mismatch at {x}: {a} vs {b}");
        }
    }
}
