//! Ion channel parameter blocks for the point-neuron activation function.

/// Chans holds one value per ion channel used in computing the point-neuron
/// conductance-based activation: excitatory, leak, inhibitory, and potassium.
///
/// Used both for maximal conductances (`gbar`) and reversal potentials
/// (`erev`), and for the derived `erev - thr` / `thr - erev` blocks that the
/// activation threshold math needs.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Chans {
    /// Excitatory sodium (Na) AMPA channels, activated by synaptic glutamate.
    pub e: f32,
    /// Constant leak (potassium, K+) channels: determines resting potential.
    pub l: f32,
    /// Inhibitory chloride (Cl-) channels, activated by synaptic GABA.
    pub i: f32,
    /// Gated / active potassium channels, hyperpolarizing relative to leak.
    pub k: f32,
}

impl Chans {
    pub fn new(e: f32, l: f32, i: f32, k: f32) -> Self {
        Self { e, l, i, k }
    }

    /// Set all four channel values at once.
    pub fn set_all(&mut self, e: f32, l: f32, i: f32, k: f32) {
        self.e = e;
        self.l = l;
        self.i = i;
        self.k = k;
    }

    /// Each channel of `other` minus the scalar `minus`.
    pub fn from_other_minus(other: Chans, minus: f32) -> Self {
        Self {
            e: other.e - minus,
            l: other.l - minus,
            i: other.i - minus,
            k: other.k - minus,
        }
    }

    /// The scalar `minus` minus each channel of `other`.
    pub fn from_minus_other(minus: f32, other: Chans) -> Self {
        Self {
            e: minus - other.e,
            l: minus - other.l,
            i: minus - other.i,
            k: minus - other.k,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_chans_near(got: Chans, want: Chans) {
        for (g, w) in [
            (got.e, want.e),
            (got.l, want.l),
            (got.i, want.i),
            (got.k, want.k),
        ] {
            assert!((g - w).abs() < 1e-6, "{got:?} != {want:?}");
        }
    }

    #[test]
    fn other_minus() {
        let ch = Chans::new(1.0, 0.3, 0.25, 0.1);
        let sub = Chans::from_other_minus(ch, 0.5);
        assert_chans_near(sub, Chans::new(0.5, -0.2, -0.25, -0.4));
    }

    #[test]
    fn minus_other() {
        let ch = Chans::new(1.0, 0.3, 0.25, 0.1);
        let sub = Chans::from_minus_other(0.5, ch);
        assert_chans_near(sub, Chans::new(-0.5, 0.2, 0.25, 0.4));
    }
}
