//! Synapse state and calcium-mediated short-term synaptic depression.
//!
//! A `Synapse` carries the contrast-enhanced weight actually used in
//! sending (`wt`), the underlying linear weight that learning operates on
//! (`lwt`), learning bookkeeping (dwt, norm, moment), and the calcium
//! depression pair (`cai`, `eff_wt`). Depression parameters are shared per
//! projection in [`SynDepParams`] rather than stored per synapse.

use crate::error::NetError;

/// State for one synaptic connection.
#[derive(Clone, Debug, Default)]
pub struct Synapse {
    /// Effective synaptic weight, sigmoid contrast-enhanced from `lwt`.
    pub wt: f32,
    /// Linear underlying weight, learned at the configured lrate and then
    /// mapped through contrast enhancement to produce `wt`.
    pub lwt: f32,
    /// Change in weight from learning.
    pub dwt: f32,
    /// Normalization factor: running max of |dwt|, decaying slowly. An
    /// estimate of the variance of weight changes over time.
    pub norm: f32,
    /// Momentum: time-integrated dwt, accumulating consistent directions
    /// of change and cancelling dithering ones.
    pub moment: f32,
    /// Presynaptic-release scaling, multiplies `wt` in sending.
    pub scale: f32,
    /// Depression-effective weight: `wt * syn_dep(cai)`. What actually
    /// propagates while depression is active.
    pub eff_wt: f32,
    /// Intracellular calcium driving depression, in [0, 1].
    pub cai: f32,
}

/// Calcium-based synaptic depression parameters, shared per projection.
#[derive(Clone, Debug, PartialEq)]
pub struct SynDepParams {
    /// Rate of calcium increase from co-activation (NMDA-like currents).
    pub ca_inc: f32,
    /// Rate of calcium decrease (pumps pushing calcium back out).
    pub ca_dec: f32,
    /// Calcium threshold: only above this does depletion affect sending.
    pub ca_thr: f32,
    /// Multiplier on calcium for computing depression, modulating overall
    /// depth independent of the rate parameters.
    pub ca_gain: f32,
    /// Which activation product drives calcium accumulation.
    pub drive: CaDrive,

    /// ca_gain / (1 - ca_thr), derived in update().
    pub(crate) thr_rescale: f32,
}

/// Source of the co-activation product that drives calcium accumulation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CaDrive {
    /// Raw sender and receiver activations: `ru.act * su.act`.
    #[default]
    Act,
    /// Sender activation weighted by the depressed efficacy, so strongly
    /// depressed synapses accumulate calcium more slowly.
    EffWtAct,
}

impl Default for SynDepParams {
    fn default() -> Self {
        let mut sd = Self {
            ca_inc: 0.2,
            ca_dec: 0.2,
            ca_thr: 0.2,
            ca_gain: 0.3,
            drive: CaDrive::Act,
            thr_rescale: 0.0,
        };
        sd.update();
        sd
    }
}

impl SynDepParams {
    /// Recompute the threshold rescale factor. `ca_thr` must stay below 1.
    pub fn update(&mut self) {
        self.thr_rescale = self.ca_gain / (1.0 - self.ca_thr);
    }

    /// Depression factor in [0, 1]: 1 at or below the calcium threshold,
    /// quadratic roll-off above it.
    pub fn syn_dep(&self, cai: f32) -> f32 {
        let mut cao_thr = 1.0_f32;
        if cai > self.ca_thr {
            cao_thr = (1.0 - self.thr_rescale * (cai - self.ca_thr)).max(0.0);
        }
        cao_thr * cao_thr
    }

    /// One cycle of calcium dynamics: co-activation drives influx toward
    /// saturation at 1 while pumps decay it toward 0.
    pub fn ca_update(&self, cai: &mut f32, ru_act: f32, su_act: f32) {
        let drive = ru_act * su_act;
        *cai += self.ca_inc * (1.0 - *cai) * drive - self.ca_dec * *cai;
    }
}

/// Enumerated synapse variables for logging and inspection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SynapseVar {
    Wt,
    LWt,
    DWt,
    Norm,
    Moment,
    Scale,
    EffWt,
    Cai,
}

/// All synapse variables, in display order.
pub const SYNAPSE_VARS: &[SynapseVar] = &[
    SynapseVar::Wt,
    SynapseVar::LWt,
    SynapseVar::DWt,
    SynapseVar::Norm,
    SynapseVar::Moment,
    SynapseVar::Scale,
    SynapseVar::EffWt,
    SynapseVar::Cai,
];

impl SynapseVar {
    pub fn name(self) -> &'static str {
        match self {
            Self::Wt => "Wt",
            Self::LWt => "LWt",
            Self::DWt => "DWt",
            Self::Norm => "Norm",
            Self::Moment => "Moment",
            Self::Scale => "Scale",
            Self::EffWt => "EffWt",
            Self::Cai => "Cai",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, NetError> {
        SYNAPSE_VARS
            .iter()
            .copied()
            .find(|v| v.name() == name)
            .ok_or_else(|| NetError::UnknownSynVar(name.to_string()))
    }
}

impl Synapse {
    /// Read the value of an enumerated variable.
    pub fn var(&self, v: SynapseVar) -> f32 {
        match v {
            SynapseVar::Wt => self.wt,
            SynapseVar::LWt => self.lwt,
            SynapseVar::DWt => self.dwt,
            SynapseVar::Norm => self.norm,
            SynapseVar::Moment => self.moment,
            SynapseVar::Scale => self.scale,
            SynapseVar::EffWt => self.eff_wt,
            SynapseVar::Cai => self.cai,
        }
    }

    pub fn var_by_name(&self, name: &str) -> Result<f32, NetError> {
        Ok(self.var(SynapseVar::from_name(name)?))
    }

    /// Write an enumerated variable. A zero scale is remapped to 1, since
    /// scale multiplies the weight and zero would silence the synapse.
    pub fn set_var(&mut self, v: SynapseVar, val: f32) {
        match v {
            SynapseVar::Wt => self.wt = val,
            SynapseVar::LWt => self.lwt = val,
            SynapseVar::DWt => self.dwt = val,
            SynapseVar::Norm => self.norm = val,
            SynapseVar::Moment => self.moment = val,
            SynapseVar::Scale => self.scale = if val == 0.0 { 1.0 } else { val },
            SynapseVar::EffWt => self.eff_wt = val,
            SynapseVar::Cai => self.cai = val,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syn_dep_unity_at_or_below_threshold() {
        let sd = SynDepParams::default();
        assert_eq!(sd.syn_dep(0.0), 1.0);
        assert_eq!(sd.syn_dep(sd.ca_thr), 1.0);
        assert!(sd.syn_dep(sd.ca_thr + 0.01) < 1.0);
    }

    #[test]
    fn syn_dep_bounded_and_decreasing() {
        let sd = SynDepParams::default();
        let mut prev = 1.0_f32;
        let mut cai = 0.0_f32;
        while cai <= 1.0 {
            let d = sd.syn_dep(cai);
            assert!((0.0..=1.0).contains(&d), "out of range at cai {cai}: {d}");
            assert!(d <= prev + 1e-7, "non-decreasing at cai {cai}");
            prev = d;
            cai += 0.01;
        }
    }

    #[test]
    fn calcium_saturates_under_sustained_drive() {
        let sd = SynDepParams::default();
        let mut cai = 0.0_f32;
        for _ in 0..500 {
            sd.ca_update(&mut cai, 1.0, 1.0);
            assert!((0.0..=1.0).contains(&cai));
        }
        // equilibrium of inc*(1-c) = dec*c with full drive is 0.5
        assert!((cai - 0.5).abs() < 1e-3);
    }

    #[test]
    fn calcium_decays_without_drive() {
        let sd = SynDepParams::default();
        let mut cai = 0.5_f32;
        for _ in 0..200 {
            sd.ca_update(&mut cai, 0.0, 0.0);
        }
        assert!(cai < 1e-6);
    }

    #[test]
    fn zero_scale_remapped_on_set() {
        let mut sy = Synapse::default();
        sy.set_var(SynapseVar::Scale, 0.0);
        assert_eq!(sy.scale, 1.0);
        sy.set_var(SynapseVar::Scale, 0.5);
        assert_eq!(sy.scale, 0.5);
        sy.set_var(SynapseVar::Wt, 0.7);
        assert_eq!(sy.wt, 0.7);
    }

    #[test]
    fn var_name_round_trip() {
        for &v in SYNAPSE_VARS {
            assert_eq!(SynapseVar::from_name(v.name()).ok(), Some(v));
        }
        assert!(matches!(
            SynapseVar::from_name("Bogus"),
            Err(NetError::UnknownSynVar(_))
        ));
    }
}
