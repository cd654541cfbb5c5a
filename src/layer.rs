//! Layers: the unit of orchestration. A layer owns its neurons, its
//! inhibition pools, the parameter blocks that drive them, and a seeded
//! RNG for noise and lesioning. Projections live in the network arena;
//! the layer holds index lists for its receiving and sending sides plus
//! the per-cycle outbox of sent activation deltas that projections
//! consume.

use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::act::{ActNoiseKind, ActParams, NoiseDist};
use crate::error::NetError;
use crate::inhib::InhibParams;
use crate::learn::{CosDiffStats, LearnNeurParams};
use crate::neuron::{flags, Neuron, NeuronVar};
use crate::pool::Pool;
use crate::prjn::Prjn;
use crate::timing::Time;

/// Layer role, determining how external input is routed and whether the
/// layer participates in BCM hebbian modulation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LayerType {
    /// Ordinary processing layer. The only type that gets BCM modulation.
    #[default]
    Hidden,
    /// Receives hard-clamped external input at trial start.
    Input,
    /// Receives target values, clamped during the plus phase.
    Target,
    /// Receives comparison values that are recorded but never clamped.
    Compare,
}

/// Unit layout of a layer: a plain grid, or a grid of sub-pools for
/// pooled inhibition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    /// y * x units, one layer-wide pool.
    Grid { y: usize, x: usize },
    /// py * px sub-pools of uy * ux units each.
    Pools {
        py: usize,
        px: usize,
        uy: usize,
        ux: usize,
    },
}

impl Shape {
    /// Total number of units.
    pub fn len(&self) -> usize {
        match *self {
            Shape::Grid { y, x } => y * x,
            Shape::Pools { py, px, uy, ux } => py * px * uy * ux,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of sub-pools, 0 for a plain grid.
    pub fn n_pools(&self) -> usize {
        match *self {
            Shape::Grid { .. } => 0,
            Shape::Pools { py, px, .. } => py * px,
        }
    }

    /// Units per sub-pool, 0 for a plain grid.
    pub fn units_per_pool(&self) -> usize {
        match *self {
            Shape::Grid { .. } => 0,
            Shape::Pools { uy, ux, .. } => uy * ux,
        }
    }
}

/// One layer of rate-coded units.
#[derive(Clone, Debug)]
pub struct Layer {
    pub name: String,
    pub typ: LayerType,
    /// Disable without removing: skipped by every network pass.
    pub off: bool,
    pub shape: Shape,
    /// Arena index of this layer in the network.
    pub idx: usize,

    pub act: ActParams,
    pub inhib: InhibParams,
    pub learn: LearnNeurParams,

    pub neurons: Vec<Neuron>,
    /// Pool 0 spans the layer; further pools cover sub-groups.
    pub pools: Vec<Pool>,
    /// Cosine difference stats between minus and plus phase activations.
    pub cos_diff: CosDiffStats,
    /// Correlation between previous and current cycle activation state.
    pub sim: f32,

    /// Arena indices of projections received by this layer.
    pub recv_prjns: Vec<usize>,
    /// Arena indices of projections sent by this layer.
    pub send_prjns: Vec<usize>,

    /// (unit, delta) pairs sent this cycle, consumed by sending
    /// projections. Rebuilt every cycle.
    pub send_buf: Vec<(u32, f32)>,

    rng: StdRng,
}

impl Layer {
    pub fn new(name: impl Into<String>, shape: Shape, typ: LayerType, seed: u64) -> Self {
        let mut inhib = InhibParams::default();
        inhib.layer.on = true;
        Self {
            name: name.into(),
            typ,
            off: false,
            shape,
            idx: 0,
            act: ActParams::default(),
            inhib,
            learn: LearnNeurParams::default(),
            neurons: Vec::new(),
            pools: Vec::new(),
            cos_diff: CosDiffStats::default(),
            sim: 0.0,
            recv_prjns: Vec::new(),
            send_prjns: Vec::new(),
            send_buf: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Recompute all derived parameters after configuration changes.
    pub fn update_params(&mut self) {
        self.act.update();
        self.inhib.update();
        self.learn.update();
    }

    /// Allocate neurons and pools for the configured shape. Sub-pools are
    /// built only when pool-level inhibition is enabled.
    pub fn build(&mut self) -> Result<(), NetError> {
        let nu = self.shape.len();
        if nu == 0 {
            return Err(NetError::EmptyLayerShape {
                name: self.name.clone(),
            });
        }
        self.neurons = vec![Neuron::default(); nu];
        let np = if self.inhib.pool.on {
            self.shape.n_pools()
        } else {
            0
        };
        self.pools = Vec::with_capacity(1 + np);
        self.pools.push(Pool::new(0, nu));
        if np > 0 {
            let upp = self.shape.units_per_pool();
            for pi in 0..np {
                let st = pi * upp;
                self.pools.push(Pool::new(st, st + upp));
                for nrn in &mut self.neurons[st..st + upp] {
                    nrn.sub_pool = (pi + 1) as u32;
                }
            }
        }
        self.send_buf = Vec::with_capacity(nu);
        Ok(())
    }

    pub fn pool(&self, idx: usize) -> Result<&Pool, NetError> {
        self.pools.get(idx).ok_or(NetError::PoolIndex {
            index: idx,
            n: self.pools.len(),
        })
    }

    //// Init

    /// Reset the per-layer pieces of weight init: running averages, full
    /// activation state, cosine stats. Projection weights are handled by
    /// the network, which owns them.
    pub fn init_state(&mut self) {
        for pl in &mut self.pools {
            pl.act_avg.act_m_avg = self.inhib.act_avg.init;
            pl.act_avg.act_p_avg = self.inhib.act_avg.init;
            pl.act_avg.act_p_avg_eff = self.inhib.act_avg.eff_init();
        }
        self.init_act_avg();
        self.init_acts();
        self.cos_diff.init();
        self.sim = 0.0;
    }

    /// Seed the learning running averages.
    pub fn init_act_avg(&mut self) {
        for nrn in &mut self.neurons {
            self.learn.init_act_avg(nrn);
        }
    }

    /// Fully initialize activation state.
    pub fn init_acts(&mut self) {
        for nrn in &mut self.neurons {
            self.act.init_acts(nrn);
        }
    }

    /// Reset conductance accumulation on all units (the projection-side
    /// buffers are reset by the network pass).
    pub fn init_g_inc(&mut self) {
        for nrn in &mut self.neurons {
            if nrn.is_off() {
                continue;
            }
            self.act.init_ge_gi(nrn);
        }
    }

    //// External input

    /// Clear external input values and flags, prior to applying new input.
    pub fn init_ext(&mut self) {
        for nrn in &mut self.neurons {
            nrn.ext = 0.0;
            nrn.targ = 0.0;
            nrn.clear_flag(flags::EXT_MASK);
        }
    }

    /// Which flag external input sets for this layer type, and whether the
    /// value goes into targ rather than ext.
    fn apply_ext_flags(&self) -> (u32, bool) {
        match self.typ {
            LayerType::Target => (flags::HAS_TARG, true),
            LayerType::Compare => (flags::HAS_CMPR, true),
            _ => (flags::HAS_EXT, false),
        }
    }

    /// Apply external input from a flat slice, routed to ext or targ by
    /// layer type. Extra values beyond the layer size are ignored.
    pub fn apply_ext(&mut self, ext: &[f32]) {
        let (setmsk, to_targ) = self.apply_ext_flags();
        let mx = ext.len().min(self.neurons.len());
        for (nrn, &vl) in self.neurons[..mx].iter_mut().zip(ext) {
            if nrn.is_off() {
                continue;
            }
            if to_targ {
                nrn.targ = vl;
            } else {
                nrn.ext = vl;
            }
            nrn.clear_flag(flags::EXT_MASK);
            nrn.set_flag(setmsk);
        }
    }

    //// Alpha cycle init

    /// Per-layer initialization at the start of a new input pattern:
    /// long-term average update, cross-trial activity averages, previous
    /// plus-phase snapshot, fixed noise, state decay, and hard clamping of
    /// input layers. Conductance scaling runs as a separate network pass
    /// because it reads other layers.
    pub fn alpha_cyc_init(&mut self) {
        self.avg_l_fm_avg_m();
        for pl in &mut self.pools {
            self.inhib
                .act_avg
                .avg_fm_act(&mut pl.act_avg.act_m_avg, pl.act_m.avg);
            self.inhib
                .act_avg
                .avg_fm_act(&mut pl.act_avg.act_p_avg, pl.act_p.avg);
            self.inhib
                .act_avg
                .eff_fm_avg(&mut pl.act_avg.act_p_avg_eff, pl.act_avg.act_p_avg);
        }
        for nrn in &mut self.neurons {
            if nrn.is_off() {
                continue;
            }
            nrn.act_q0 = nrn.act_p;
        }
        if self.act.noise.kind != ActNoiseKind::None
            && self.act.noise.fixed
            && self.act.noise.dist != NoiseDist::Mean
        {
            self.gen_noise();
        }
        self.decay_state(self.act.init.decay);
        if self.act.clamp.hard && self.typ == LayerType::Input {
            self.hard_clamp();
        }
    }

    /// Update the BCM long-term average and its learning factor, with
    /// layer-error modulation for hidden layers.
    pub fn avg_l_fm_avg_m(&mut self) {
        for nrn in &mut self.neurons {
            if nrn.is_off() {
                continue;
            }
            self.learn.avg_l_fm_avg_m(nrn);
            if self.learn.avg_l.err_mod {
                nrn.avg_l_lrn *= self.cos_diff.mod_avg_l_lrn;
            }
        }
    }

    /// Draw one fixed noise sample per neuron for the coming trial.
    pub fn gen_noise(&mut self) {
        let Self {
            neurons, rng, act, ..
        } = self;
        for nrn in neurons.iter_mut() {
            nrn.noise = act.noise.gen(rng);
        }
    }

    /// Decay activation state toward init values by the given proportion.
    /// Pool activity and inhibition decay too, which matters for the next
    /// trial's inhibition bootstrap.
    pub fn decay_state(&mut self, decay: f32) {
        for nrn in &mut self.neurons {
            if nrn.is_off() {
                continue;
            }
            self.act.decay_state(nrn, decay);
        }
        for pl in &mut self.pools {
            pl.act.max -= decay * pl.act.max;
            pl.act.avg -= decay * pl.act.avg;
            pl.inhib.ffi -= decay * pl.inhib.ffi;
            pl.inhib.fbi -= decay * pl.inhib.fbi;
            pl.inhib.gi -= decay * pl.inhib.gi;
        }
    }

    /// Hard-clamp activations from external input, for input layers.
    pub fn hard_clamp(&mut self) {
        for nrn in &mut self.neurons {
            if nrn.is_off() {
                continue;
            }
            self.act.hard_clamp(nrn);
        }
    }

    //// Cycle

    /// Collect activation deltas above the send thresholds into the
    /// outbox, including the un-send of a previously sent activation that
    /// has since dropped below threshold.
    pub fn send_g_delta(&mut self) {
        self.send_buf.clear();
        for (ni, nrn) in self.neurons.iter_mut().enumerate() {
            if nrn.is_off() {
                continue;
            }
            if nrn.act > self.act.opt_thresh.send {
                let delta = nrn.act - nrn.act_sent;
                if delta.abs() > self.act.opt_thresh.delta {
                    self.send_buf.push((ni as u32, delta));
                    nrn.act_sent = nrn.act;
                }
            } else if nrn.act_sent > self.act.opt_thresh.send {
                self.send_buf.push((ni as u32, -nrn.act_sent));
                nrn.act_sent = 0.0;
            }
        }
    }

    /// Integrate the increments accumulated on receiving projections into
    /// each unit's conductances, routed by projection type.
    pub fn g_fm_inc(&mut self, prjns: &[Prjn]) {
        for &pi in &self.recv_prjns {
            let pj = &prjns[pi];
            if pj.off {
                continue;
            }
            if pj.typ.is_inhib() {
                for (nrn, &g) in self.neurons.iter_mut().zip(&pj.g_inc) {
                    nrn.gi_inc += g;
                }
            } else {
                for (nrn, &g) in self.neurons.iter_mut().zip(&pj.g_inc) {
                    nrn.ge_inc += g;
                }
            }
        }
        let Self {
            neurons, rng, act, ..
        } = self;
        for nrn in neurons.iter_mut() {
            if nrn.is_off() {
                continue;
            }
            act.ge_gi_fm_inc(nrn, rng);
        }
    }

    /// Average and max Ge per pool, the feedforward inhibition drive.
    pub fn avg_max_ge(&mut self) {
        for pl in &mut self.pools {
            pl.ge.init();
            for (ni, nrn) in self.neurons[pl.st_idx..pl.ed_idx].iter().enumerate() {
                pl.ge.update_val(nrn.ge, pl.st_idx + ni);
            }
            pl.ge.calc_avg();
        }
    }

    /// Compute inhibition from pool Ge and Act statistics. Sub-pool Gi is
    /// raised to the layer-level value so pools never undercut the layer.
    pub fn inhib_fm_ge_act(&mut self) {
        let (lpl, subs) = match self.pools.split_first_mut() {
            Some(v) => v,
            None => return,
        };
        self.inhib
            .layer
            .inhib(lpl.ge.avg, lpl.ge.max, lpl.act.avg, &mut lpl.inhib);
        if !subs.is_empty() {
            for pl in subs.iter_mut() {
                self.inhib
                    .pool
                    .inhib(pl.ge.avg, pl.ge.max, pl.act.avg, &mut pl.inhib);
                pl.inhib.gi = pl.inhib.gi.max(lpl.inhib.gi);
                for nrn in &mut self.neurons[pl.st_idx..pl.ed_idx] {
                    if nrn.is_off() {
                        continue;
                    }
                    self.inhib.self_inhib.inhib(&mut nrn.gi_self, nrn.act);
                    nrn.gi = pl.inhib.gi + nrn.gi_self + nrn.gi_syn;
                }
            }
        } else {
            for nrn in &mut self.neurons[lpl.st_idx..lpl.ed_idx] {
                if nrn.is_off() {
                    continue;
                }
                self.inhib.self_inhib.inhib(&mut nrn.gi_self, nrn.act);
                nrn.gi = lpl.inhib.gi + nrn.gi_self + nrn.gi_syn;
            }
        }
    }

    /// Rate-code activation from conductances, plus the learning-average
    /// cascade from the resulting activation.
    pub fn act_fm_g(&mut self) {
        for nrn in &mut self.neurons {
            if nrn.is_off() {
                continue;
            }
            self.act.vm_fm_g(nrn);
            self.act.act_fm_g(nrn);
            self.learn.avgs_fm_act(nrn);
        }
    }

    /// Average and max Act per pool, the feedback inhibition drive.
    /// Lesioned units are excluded so a stale activation cannot keep
    /// driving inhibition.
    pub fn avg_max_act(&mut self) {
        for pl in &mut self.pools {
            pl.act.init();
            for (ni, nrn) in self.neurons[pl.st_idx..pl.ed_idx].iter().enumerate() {
                if nrn.is_off() {
                    continue;
                }
                pl.act.update_val(nrn.act, pl.st_idx + ni);
            }
            pl.act.calc_avg();
        }
    }

    /// Pearson correlation between the last-sent and current activation
    /// vectors, a cheap measure of how much the layer state is still
    /// moving within a trial. Degenerate (constant) vectors yield 0.
    pub fn cal_lay_sim(&mut self) {
        let n = self.neurons.len();
        if n == 0 {
            self.sim = 0.0;
            return;
        }
        let mut mean_p = 0.0_f32;
        let mut mean_c = 0.0_f32;
        for nrn in &self.neurons {
            mean_p += nrn.act_sent;
            mean_c += nrn.act;
        }
        mean_p /= n as f32;
        mean_c /= n as f32;
        let mut cov = 0.0_f32;
        let mut var_p = 0.0_f32;
        let mut var_c = 0.0_f32;
        for nrn in &self.neurons {
            let dp = nrn.act_sent - mean_p;
            let dc = nrn.act - mean_c;
            cov += dp * dc;
            var_p += dp * dp;
            var_c += dc * dc;
        }
        let denom = (var_p * var_c).sqrt();
        self.sim = if denom > 0.0 { cov / denom } else { 0.0 };
    }

    //// Quarter

    /// End-of-quarter bookkeeping: phase snapshots at the pool and unit
    /// level, target clamping for the upcoming plus phase, and the phase
    /// statistics at end of plus.
    pub fn quarter_final(&mut self, time: &Time) {
        for pl in &mut self.pools {
            match time.quarter {
                2 => pl.act_m = pl.act,
                3 => pl.act_p = pl.act,
                _ => {}
            }
        }
        let avg_dt = self.act.dt.avg_dt;
        for nrn in &mut self.neurons {
            if nrn.is_off() {
                continue;
            }
            match time.quarter {
                0 => nrn.act_q1 = nrn.act,
                1 => nrn.act_q2 = nrn.act,
                2 => {
                    nrn.act_m = nrn.act;
                    if nrn.has_flag(flags::HAS_TARG) {
                        nrn.ext = nrn.targ;
                        nrn.set_flag(flags::HAS_EXT);
                    }
                }
                3 => {
                    nrn.act_p = nrn.act;
                    nrn.act_dif = nrn.act_p - nrn.act_m;
                    nrn.act_avg += avg_dt * (nrn.act - nrn.act_avg);
                }
                _ => {}
            }
        }
        if time.quarter == 3 {
            self.cos_diff_fm_acts();
        }
    }

    /// Cosine between zero-mean minus and plus phase activations, folded
    /// into the running stats, and from them the BCM modulation factors
    /// (hidden layers only).
    pub fn cos_diff_fm_acts(&mut self) {
        let lpl = &self.pools[0];
        let avg_m = lpl.act_m.avg;
        let avg_p = lpl.act_p.avg;
        let mut cosv = 0.0_f32;
        let mut ssm = 0.0_f32;
        let mut ssp = 0.0_f32;
        for nrn in &self.neurons {
            if nrn.is_off() {
                continue;
            }
            let ap = nrn.act_p - avg_p;
            let am = nrn.act_m - avg_m;
            cosv += ap * am;
            ssm += am * am;
            ssp += ap * ap;
        }
        let dist = (ssm * ssp).sqrt();
        if dist != 0.0 {
            cosv /= dist;
        }
        self.cos_diff.cos = cosv;
        self.learn
            .cos_diff
            .avg_var_fm_cos(&mut self.cos_diff.avg, &mut self.cos_diff.var, cosv);

        if self.typ != LayerType::Hidden {
            self.cos_diff.avg_lrn = 0.0;
            self.cos_diff.mod_avg_l_lrn = 0.0;
        } else {
            self.cos_diff.avg_lrn = 1.0 - self.cos_diff.avg;
            self.cos_diff.mod_avg_l_lrn =
                self.learn.avg_l.err_mod_fm_lay_err(self.cos_diff.avg_lrn);
        }
    }

    //// Stats

    /// Sum- and mean-squared error over act_p - act_m, counting a unit as
    /// in error only when the difference exceeds the tolerance.
    pub fn mse(&self, tol: f32) -> (f32, f32) {
        let nn = self.neurons.len();
        if nn == 0 {
            return (0.0, 0.0);
        }
        let mut sse = 0.0_f32;
        for nrn in &self.neurons {
            if nrn.is_off() {
                continue;
            }
            let d = nrn.act_p - nrn.act_m;
            if d.abs() < tol {
                continue;
            }
            sse += d * d;
        }
        (sse, sse / nn as f32)
    }

    /// Sum-squared error only.
    pub fn sse(&self, tol: f32) -> f32 {
        self.mse(tol).0
    }

    //// Sleep

    /// Enter sleep mode: send everything, and capture the inhibition gain
    /// as the oscillation baseline.
    pub fn sleep(&mut self) {
        self.inhib.layer.sleep();
        self.act.opt_thresh.sleep();
    }

    /// Leave sleep mode: restore thresholds and the baseline gain.
    pub fn wake(&mut self) {
        self.inhib.layer.wake();
        self.act.opt_thresh.wake();
    }

    /// Advance the layer-level inhibition oscillation.
    pub fn inhib_oscil(&mut self, step: u32) {
        self.inhib.layer.inhib_oscil(step);
    }

    /// Stop oscillating, returning the gain to baseline.
    pub fn inhib_oscil_mute(&mut self) {
        self.inhib.layer.oscil_mute();
    }

    //// Lesion

    /// Clear the Off flag on all neurons.
    pub fn un_lesion_neurons(&mut self) {
        for nrn in &mut self.neurons {
            nrn.clear_flag(flags::OFF);
        }
    }

    /// Lesion the given proportion of neurons, chosen by a seeded
    /// permutation, and return how many were turned off. The proportion
    /// must be in [0, 1] -- a percent passed by mistake is an error.
    pub fn lesion_neurons(&mut self, prop: f32) -> Result<usize, NetError> {
        self.un_lesion_neurons();
        if !(0.0..=1.0).contains(&prop) {
            return Err(NetError::LesionProportion(prop));
        }
        let nn = self.neurons.len();
        if nn == 0 {
            return Ok(0);
        }
        let mut perm: Vec<usize> = (0..nn).collect();
        perm.shuffle(&mut self.rng);
        let nl = (prop * nn as f32) as usize;
        for &ni in &perm[..nl] {
            self.neurons[ni].set_flag(flags::OFF);
        }
        debug!("lesion: layer {} turned off {}/{} units", self.name, nl, nn);
        Ok(nl)
    }

    //// Introspection

    /// Values of the given variable for every unit.
    pub fn unit_vals(&self, var: &str) -> Result<Vec<f32>, NetError> {
        let v = NeuronVar::from_name(var)?;
        Ok(self.neurons.iter().map(|nrn| nrn.var(v)).collect())
    }

    /// Value of the given variable on one unit by flat index.
    pub fn unit_val_1d(&self, var: &str, idx: usize) -> Result<f32, NetError> {
        let nn = self.neurons.len();
        let nrn = self.neurons.get(idx).ok_or(NetError::UnitIndex {
            index: idx,
            n: nn,
        })?;
        nrn.var_by_name(var)
    }

    /// Min and max of the given variable over the layer.
    pub fn var_range(&self, var: &str) -> Result<(f32, f32), NetError> {
        let v = NeuronVar::from_name(var)?;
        let mut it = self.neurons.iter().map(|nrn| nrn.var(v));
        let first = match it.next() {
            Some(f) => f,
            None => return Ok((0.0, 0.0)),
        };
        let (mut min, mut max) = (first, first);
        for vl in it {
            if vl < min {
                min = vl;
            }
            if vl > max {
                max = vl;
            }
        }
        Ok((min, max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_layer(n: usize, typ: LayerType) -> Layer {
        let mut ly = Layer::new("test", Shape::Grid { y: 1, x: n }, typ, 7);
        ly.build().unwrap();
        ly
    }

    #[test]
    fn build_rejects_empty_shape() {
        let mut ly = Layer::new("empty", Shape::Grid { y: 0, x: 5 }, LayerType::Hidden, 0);
        assert!(matches!(
            ly.build(),
            Err(NetError::EmptyLayerShape { .. })
        ));
    }

    #[test]
    fn pooled_shape_builds_sub_pools() {
        let mut ly = Layer::new(
            "pools",
            Shape::Pools {
                py: 2,
                px: 2,
                uy: 3,
                ux: 3,
            },
            LayerType::Hidden,
            0,
        );
        ly.inhib.pool.on = true;
        ly.build().unwrap();
        assert_eq!(ly.neurons.len(), 36);
        assert_eq!(ly.pools.len(), 5);
        assert_eq!(ly.pools[0].len(), 36);
        for pi in 1..5 {
            assert_eq!(ly.pools[pi].len(), 9);
        }
        assert_eq!(ly.neurons[0].sub_pool, 1);
        assert_eq!(ly.neurons[35].sub_pool, 4);
    }

    #[test]
    fn apply_ext_routes_by_layer_type() {
        let mut inp = grid_layer(3, LayerType::Input);
        inp.apply_ext(&[0.1, 0.2, 0.3]);
        assert_eq!(inp.neurons[1].ext, 0.2);
        assert!(inp.neurons[1].has_flag(flags::HAS_EXT));
        assert!(!inp.neurons[1].has_flag(flags::HAS_TARG));

        let mut targ = grid_layer(3, LayerType::Target);
        targ.apply_ext(&[0.9, 0.8, 0.7]);
        assert_eq!(targ.neurons[0].targ, 0.9);
        assert_eq!(targ.neurons[0].ext, 0.0);
        assert!(targ.neurons[0].has_flag(flags::HAS_TARG));
        assert!(!targ.neurons[0].has_flag(flags::HAS_EXT));

        targ.init_ext();
        assert_eq!(targ.neurons[0].targ, 0.0);
        assert!(!targ.neurons[0].has_flag(flags::EXT_MASK));
    }

    #[test]
    fn target_clamps_at_end_of_minus_phase() {
        let mut ly = grid_layer(2, LayerType::Target);
        ly.apply_ext(&[0.6, 0.4]);
        let mut time = Time::default();
        time.quarter = 2;
        ly.quarter_final(&time);
        assert_eq!(ly.neurons[0].ext, 0.6);
        assert!(ly.neurons[0].has_flag(flags::HAS_EXT));
    }

    #[test]
    fn send_g_delta_unsends_below_threshold() {
        let mut ly = grid_layer(1, LayerType::Hidden);
        ly.neurons[0].act = 0.5;
        ly.send_g_delta();
        assert_eq!(ly.send_buf.len(), 1);
        assert!((ly.send_buf[0].1 - 0.5).abs() < 1e-6);
        assert_eq!(ly.neurons[0].act_sent, 0.5);

        // small change below delta threshold: nothing sent
        ly.neurons[0].act = 0.501;
        ly.send_g_delta();
        assert!(ly.send_buf.is_empty());

        // dropping below send threshold un-sends the full amount
        ly.neurons[0].act = 0.05;
        ly.send_g_delta();
        assert_eq!(ly.send_buf.len(), 1);
        assert!((ly.send_buf[0].1 + 0.5).abs() < 1e-6);
        assert_eq!(ly.neurons[0].act_sent, 0.0);
    }

    #[test]
    fn inhibition_off_leaves_only_gi_syn() {
        let mut ly = grid_layer(4, LayerType::Hidden);
        ly.inhib.layer.on = false;
        for nrn in &mut ly.neurons {
            nrn.gi_syn = 0.3;
            nrn.act = 0.5;
            nrn.ge = 0.5;
        }
        ly.avg_max_ge();
        ly.avg_max_act();
        ly.inhib_fm_ge_act();
        for nrn in &ly.neurons {
            assert_eq!(nrn.gi, nrn.gi_syn);
            assert_eq!(nrn.gi_self, 0.0);
        }
    }

    #[test]
    fn pool_gi_never_undercuts_layer_gi() {
        let mut ly = Layer::new(
            "pools",
            Shape::Pools {
                py: 1,
                px: 2,
                uy: 1,
                ux: 2,
            },
            LayerType::Hidden,
            0,
        );
        ly.inhib.pool.on = true;
        ly.build().unwrap();
        // strong layer-wide drive, one quiet pool
        ly.neurons[0].ge = 0.9;
        ly.neurons[1].ge = 0.9;
        ly.neurons[2].ge = 0.0;
        ly.neurons[3].ge = 0.0;
        for nrn in &mut ly.neurons {
            nrn.act = 0.4;
        }
        ly.avg_max_ge();
        ly.avg_max_act();
        ly.inhib_fm_ge_act();
        let lay_gi = ly.pools[0].inhib.gi;
        for pi in 1..ly.pools.len() {
            assert!(ly.pools[pi].inhib.gi >= lay_gi);
        }
    }

    #[test]
    fn lesioned_units_excluded_from_act_stats() {
        let mut ly = grid_layer(4, LayerType::Hidden);
        // stale activation on a lesioned unit in an otherwise silent layer
        ly.neurons[1].act = 0.9;
        ly.neurons[1].set_flag(flags::OFF);
        ly.avg_max_act();
        assert_eq!(ly.pools[0].act.max, 0.0);
        assert_eq!(ly.pools[0].act.avg, 0.0);
        // Ge stats keep counting off units
        ly.neurons[1].ge = 0.6;
        ly.avg_max_ge();
        assert_eq!(ly.pools[0].ge.max, 0.6);
    }

    #[test]
    fn cosine_zero_phase_difference() {
        let mut ly = grid_layer(4, LayerType::Hidden);
        for (i, nrn) in ly.neurons.iter_mut().enumerate() {
            nrn.act = 0.1 * (i + 1) as f32;
        }
        ly.avg_max_act();
        let mut time = Time::default();
        time.quarter = 2;
        ly.quarter_final(&time);
        time.quarter = 3;
        ly.quarter_final(&time);
        // identical phases: cosine of 1, sse of 0
        assert!((ly.cos_diff.cos - 1.0).abs() < 1e-5);
        assert_eq!(ly.sse(0.5), 0.0);
    }

    #[test]
    fn cosine_degenerate_state_is_zero_not_nan() {
        let mut ly = grid_layer(4, LayerType::Hidden);
        // uniform activations: zero-mean vectors are all-zero
        for nrn in &mut ly.neurons {
            nrn.act = 0.5;
        }
        ly.avg_max_act();
        let mut time = Time::default();
        time.quarter = 2;
        ly.quarter_final(&time);
        time.quarter = 3;
        ly.quarter_final(&time);
        assert_eq!(ly.cos_diff.cos, 0.0);
        assert!(!ly.cos_diff.cos.is_nan());
    }

    #[test]
    fn non_hidden_layers_get_no_bcm_modulation() {
        let mut ly = grid_layer(4, LayerType::Input);
        for (i, nrn) in ly.neurons.iter_mut().enumerate() {
            nrn.act = 0.2 * (i + 1) as f32;
        }
        ly.avg_max_act();
        let mut time = Time::default();
        time.quarter = 2;
        ly.quarter_final(&time);
        time.quarter = 3;
        ly.quarter_final(&time);
        assert_eq!(ly.cos_diff.avg_lrn, 0.0);
        assert_eq!(ly.cos_diff.mod_avg_l_lrn, 0.0);
    }

    #[test]
    fn lesion_exact_count_and_reset() {
        let mut ly = grid_layer(10, LayerType::Hidden);
        let n = ly.lesion_neurons(0.5).unwrap();
        assert_eq!(n, 5);
        assert_eq!(ly.neurons.iter().filter(|n| n.is_off()).count(), 5);
        ly.un_lesion_neurons();
        assert_eq!(ly.neurons.iter().filter(|n| n.is_off()).count(), 0);
        assert!(matches!(
            ly.lesion_neurons(50.0),
            Err(NetError::LesionProportion(_))
        ));
    }

    #[test]
    fn pool_lookup_bounds() {
        let ly = grid_layer(3, LayerType::Hidden);
        assert_eq!(ly.pool(0).unwrap().len(), 3);
        assert!(matches!(
            ly.pool(4),
            Err(NetError::PoolIndex { index: 4, n: 1 })
        ));
    }

    #[test]
    fn unit_vals_and_ranges() {
        let mut ly = grid_layer(3, LayerType::Hidden);
        for (i, nrn) in ly.neurons.iter_mut().enumerate() {
            nrn.act = 0.1 * i as f32;
        }
        let vals = ly.unit_vals("Act").unwrap();
        assert_eq!(vals.len(), 3);
        assert!((vals[2] - 0.2).abs() < 1e-6);
        assert!(ly.unit_vals("NoSuch").is_err());
        assert!(ly.unit_val_1d("Act", 99).is_err());
        let (min, max) = ly.var_range("Act").unwrap();
        assert_eq!(min, 0.0);
        assert!((max - 0.2).abs() < 1e-6);
    }

    #[test]
    fn sim_tracks_settling() {
        let mut ly = grid_layer(4, LayerType::Hidden);
        for (i, nrn) in ly.neurons.iter_mut().enumerate() {
            nrn.act = 0.1 * (i + 1) as f32;
            nrn.act_sent = nrn.act;
        }
        ly.cal_lay_sim();
        assert!((ly.sim - 1.0).abs() < 1e-5);
        // constant vector is degenerate, correlation reported as 0
        for nrn in &mut ly.neurons {
            nrn.act = 0.5;
            nrn.act_sent = 0.5;
        }
        ly.cal_lay_sim();
        assert_eq!(ly.sim, 0.0);
    }
}
