//! Per-unit neuron state for the rate-code engine.
//!
//! One `Neuron` holds everything a unit carries across cycles: raw and
//! time-integrated conductances, membrane potential, rate-coded activation
//! with its send/delta bookkeeping, clamp targets, quarter snapshots, and
//! the running-average traces that drive learning. Neurons are allocated
//! when a layer is sized and never individually destroyed: lesioning just
//! sets the `OFF` flag.

use crate::error::NetError;

/// Neuron state flags, bit positions in [`Neuron::flags`].
pub mod flags {
    /// Unit has external input applied to `ext`.
    pub const HAS_EXT: u32 = 1 << 0;
    /// Unit has a target value in `targ`, clamped during the plus phase.
    pub const HAS_TARG: u32 = 1 << 1;
    /// Unit has a comparison value: recorded but never clamped.
    pub const HAS_CMPR: u32 = 1 << 2;
    /// Unit is lesioned: skipped in every per-neuron pass.
    pub const OFF: u32 = 1 << 3;

    /// Mask covering all external-input flags.
    pub const EXT_MASK: u32 = HAS_EXT | HAS_TARG | HAS_CMPR;
}

/// Per-unit state. All values are `f32` rate-code quantities unless noted.
#[derive(Clone, Debug, Default)]
pub struct Neuron {
    /// Bit flags, see [`flags`].
    pub flags: u32,
    /// Index of the sub-pool this neuron belongs to (0 = layer pool only).
    pub sub_pool: u32,

    /// Rate-coded activation, the primary value communicated to other layers.
    pub act: f32,
    /// Total inhibitory conductance: pool gi + self inhibition + gi_syn.
    pub gi: f32,
    /// Time-integrated excitatory conductance.
    pub ge: f32,
    /// Membrane potential, clipped into the activation param range.
    pub vm: f32,
    /// Net current produced from conductances, drives vm.
    pub inet: f32,
    /// Last activation value actually sent to receivers.
    pub act_sent: f32,
    /// Change in activation this cycle (act - previous act).
    pub act_del: f32,

    /// External input value (hard or soft clamp source).
    pub ext: f32,
    /// Target value for plus-phase clamping.
    pub targ: f32,
    /// Current noise sample (regenerated per cycle or fixed per trial).
    pub noise: f32,

    /// Raw excitatory conductance, accumulated from sent deltas.
    pub ge_raw: f32,
    /// Pending excitatory increment, folded into ge_raw each cycle.
    pub ge_inc: f32,
    /// Raw inhibitory synaptic conductance.
    pub gi_raw: f32,
    /// Pending inhibitory increment.
    pub gi_inc: f32,
    /// Time-integrated inhibitory synaptic conductance, always >= 0.
    pub gi_syn: f32,
    /// Self-inhibition feedback conductance.
    pub gi_self: f32,

    /// Activation snapshot at end of the previous trial's plus phase.
    pub act_q0: f32,
    /// Activation at end of quarter 1.
    pub act_q1: f32,
    /// Activation at end of quarter 2.
    pub act_q2: f32,
    /// Minus-phase activation (end of quarter 3).
    pub act_m: f32,
    /// Plus-phase activation (end of quarter 4).
    pub act_p: f32,
    /// act_p - act_m, the per-unit phase difference.
    pub act_dif: f32,
    /// Long-run average activation, mostly for tracking hog units.
    pub act_avg: f32,

    /// Super-short time-scale learning average.
    pub avg_ss: f32,
    /// Short time-scale (plus-phase-like) learning average.
    pub avg_s: f32,
    /// Medium time-scale (minus-phase-like) learning average.
    pub avg_m: f32,
    /// Long-term average for the BCM-style floating threshold.
    pub avg_l: f32,
    /// Learning-rate factor derived from avg_l, modulated by layer error.
    pub avg_l_lrn: f32,
    /// Mix of avg_s and avg_m used as the short-term learning drive.
    pub avg_s_lrn: f32,
}

impl Neuron {
    #[inline]
    pub fn has_flag(&self, mask: u32) -> bool {
        self.flags & mask != 0
    }

    #[inline]
    pub fn set_flag(&mut self, mask: u32) {
        self.flags |= mask;
    }

    #[inline]
    pub fn clear_flag(&mut self, mask: u32) {
        self.flags &= !mask;
    }

    /// Whether this neuron is lesioned and should be skipped.
    #[inline]
    pub fn is_off(&self) -> bool {
        self.has_flag(flags::OFF)
    }
}

/// Enumerated unit variables, replacing by-name reflection with a fixed
/// table of typed accessors. The variant order is the display order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NeuronVar {
    Act,
    Ge,
    Gi,
    GiSyn,
    GiSelf,
    Inet,
    Vm,
    Noise,
    Targ,
    Ext,
    ActSent,
    ActDel,
    GeRaw,
    GeInc,
    GiRaw,
    GiInc,
    ActQ0,
    ActQ1,
    ActQ2,
    ActM,
    ActP,
    ActDif,
    ActAvg,
    AvgSS,
    AvgS,
    AvgM,
    AvgL,
    AvgLLrn,
    AvgSLrn,
}

/// All unit variables, in display order.
pub const NEURON_VARS: &[NeuronVar] = &[
    NeuronVar::Act,
    NeuronVar::Ge,
    NeuronVar::Gi,
    NeuronVar::GiSyn,
    NeuronVar::GiSelf,
    NeuronVar::Inet,
    NeuronVar::Vm,
    NeuronVar::Noise,
    NeuronVar::Targ,
    NeuronVar::Ext,
    NeuronVar::ActSent,
    NeuronVar::ActDel,
    NeuronVar::GeRaw,
    NeuronVar::GeInc,
    NeuronVar::GiRaw,
    NeuronVar::GiInc,
    NeuronVar::ActQ0,
    NeuronVar::ActQ1,
    NeuronVar::ActQ2,
    NeuronVar::ActM,
    NeuronVar::ActP,
    NeuronVar::ActDif,
    NeuronVar::ActAvg,
    NeuronVar::AvgSS,
    NeuronVar::AvgS,
    NeuronVar::AvgM,
    NeuronVar::AvgL,
    NeuronVar::AvgLLrn,
    NeuronVar::AvgSLrn,
];

impl NeuronVar {
    pub fn name(self) -> &'static str {
        match self {
            Self::Act => "Act",
            Self::Ge => "Ge",
            Self::Gi => "Gi",
            Self::GiSyn => "GiSyn",
            Self::GiSelf => "GiSelf",
            Self::Inet => "Inet",
            Self::Vm => "Vm",
            Self::Noise => "Noise",
            Self::Targ => "Targ",
            Self::Ext => "Ext",
            Self::ActSent => "ActSent",
            Self::ActDel => "ActDel",
            Self::GeRaw => "GeRaw",
            Self::GeInc => "GeInc",
            Self::GiRaw => "GiRaw",
            Self::GiInc => "GiInc",
            Self::ActQ0 => "ActQ0",
            Self::ActQ1 => "ActQ1",
            Self::ActQ2 => "ActQ2",
            Self::ActM => "ActM",
            Self::ActP => "ActP",
            Self::ActDif => "ActDif",
            Self::ActAvg => "ActAvg",
            Self::AvgSS => "AvgSS",
            Self::AvgS => "AvgS",
            Self::AvgM => "AvgM",
            Self::AvgL => "AvgL",
            Self::AvgLLrn => "AvgLLrn",
            Self::AvgSLrn => "AvgSLrn",
        }
    }

    /// Look up a variable by name. Unknown names are a reported error, never
    /// silently ignored.
    pub fn from_name(name: &str) -> Result<Self, NetError> {
        NEURON_VARS
            .iter()
            .copied()
            .find(|v| v.name() == name)
            .ok_or_else(|| NetError::UnknownUnitVar(name.to_string()))
    }
}

impl Neuron {
    /// Read the value of an enumerated variable.
    pub fn var(&self, v: NeuronVar) -> f32 {
        match v {
            NeuronVar::Act => self.act,
            NeuronVar::Ge => self.ge,
            NeuronVar::Gi => self.gi,
            NeuronVar::GiSyn => self.gi_syn,
            NeuronVar::GiSelf => self.gi_self,
            NeuronVar::Inet => self.inet,
            NeuronVar::Vm => self.vm,
            NeuronVar::Noise => self.noise,
            NeuronVar::Targ => self.targ,
            NeuronVar::Ext => self.ext,
            NeuronVar::ActSent => self.act_sent,
            NeuronVar::ActDel => self.act_del,
            NeuronVar::GeRaw => self.ge_raw,
            NeuronVar::GeInc => self.ge_inc,
            NeuronVar::GiRaw => self.gi_raw,
            NeuronVar::GiInc => self.gi_inc,
            NeuronVar::ActQ0 => self.act_q0,
            NeuronVar::ActQ1 => self.act_q1,
            NeuronVar::ActQ2 => self.act_q2,
            NeuronVar::ActM => self.act_m,
            NeuronVar::ActP => self.act_p,
            NeuronVar::ActDif => self.act_dif,
            NeuronVar::ActAvg => self.act_avg,
            NeuronVar::AvgSS => self.avg_ss,
            NeuronVar::AvgS => self.avg_s,
            NeuronVar::AvgM => self.avg_m,
            NeuronVar::AvgL => self.avg_l,
            NeuronVar::AvgLLrn => self.avg_l_lrn,
            NeuronVar::AvgSLrn => self.avg_s_lrn,
        }
    }

    /// Read a variable by name, e.g. for logging or visualization hookups.
    pub fn var_by_name(&self, name: &str) -> Result<f32, NetError> {
        Ok(self.var(NeuronVar::from_name(name)?))
    }

    /// Write an enumerated variable, e.g. for test harness setup.
    pub fn set_var(&mut self, v: NeuronVar, val: f32) {
        match v {
            NeuronVar::Act => self.act = val,
            NeuronVar::Ge => self.ge = val,
            NeuronVar::Gi => self.gi = val,
            NeuronVar::GiSyn => self.gi_syn = val,
            NeuronVar::GiSelf => self.gi_self = val,
            NeuronVar::Inet => self.inet = val,
            NeuronVar::Vm => self.vm = val,
            NeuronVar::Noise => self.noise = val,
            NeuronVar::Targ => self.targ = val,
            NeuronVar::Ext => self.ext = val,
            NeuronVar::ActSent => self.act_sent = val,
            NeuronVar::ActDel => self.act_del = val,
            NeuronVar::GeRaw => self.ge_raw = val,
            NeuronVar::GeInc => self.ge_inc = val,
            NeuronVar::GiRaw => self.gi_raw = val,
            NeuronVar::GiInc => self.gi_inc = val,
            NeuronVar::ActQ0 => self.act_q0 = val,
            NeuronVar::ActQ1 => self.act_q1 = val,
            NeuronVar::ActQ2 => self.act_q2 = val,
            NeuronVar::ActM => self.act_m = val,
            NeuronVar::ActP => self.act_p = val,
            NeuronVar::ActDif => self.act_dif = val,
            NeuronVar::ActAvg => self.act_avg = val,
            NeuronVar::AvgSS => self.avg_ss = val,
            NeuronVar::AvgS => self.avg_s = val,
            NeuronVar::AvgM => self.avg_m = val,
            NeuronVar::AvgL => self.avg_l = val,
            NeuronVar::AvgLLrn => self.avg_l_lrn = val,
            NeuronVar::AvgSLrn => self.avg_s_lrn = val,
        }
    }
}
