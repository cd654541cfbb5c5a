//! Projections: the bundles of synapses connecting one layer to another.
//!
//! Synapses are stored sender-major (CSR over sending units) because the
//! hot path is delta-sending from active senders. A receiver-grouped index
//! is kept alongside for the recv-side passes (weight balance, symmetry).
//! Each projection also owns the per-receiver conductance increment buffer
//! that sending accumulates into, so the send phase only ever writes
//! projection-local state.

use rand::rngs::StdRng;
use rand::Rng;

use crate::error::NetError;
use crate::learn::LearnSynParams;
use crate::neuron::Neuron;
use crate::pool::AvgMax;
use crate::synapse::{CaDrive, SynDepParams, Synapse};

/// Projection class, determining which conductance the input drives and
/// how it is grouped in net-input scale normalization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PrjnType {
    /// Feedforward, from an earlier layer.
    #[default]
    Forward,
    /// Within-layer lateral connectivity.
    Lateral,
    /// Feedback, from a later layer.
    Back,
    /// Drives the inhibitory conductance instead of the excitatory one.
    Inhib,
}

impl PrjnType {
    /// Whether this projection contributes to gi rather than ge.
    #[inline]
    pub fn is_inhib(self) -> bool {
        self == PrjnType::Inhib
    }
}

/// Connectivity pattern between sending and receiving units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pattern {
    /// Every sender connects to every receiver. `self_con` keeps the
    /// diagonal for a layer projecting to itself.
    Full { self_con: bool },
    /// Unit i connects to unit i, up to the smaller layer size.
    OneToOne,
}

/// Weight scaling: absolute (applied directly) and relative (normalized
/// against the other projections into the same layer).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WtScaleParams {
    /// Absolute scaling, not subject to normalization.
    pub abs: f32,
    /// Relative scaling, normalized across all projections into a unit.
    pub rel: f32,
}

impl Default for WtScaleParams {
    fn default() -> Self {
        Self { abs: 1.0, rel: 1.0 }
    }
}

impl WtScaleParams {
    /// Scaling from sending-layer activity: savg = average activation,
    /// snu = number of sending units, ncon = average recv connections.
    /// A fixed extra of 2 is added to the expected active count to cover
    /// the standard error under partial connectivity.
    pub fn slay_act_scale(&self, savg: f32, snu: f32, ncon: f32) -> f32 {
        let sem_extra = 2_usize;
        let slay_act_n = ((savg * snu + 0.5) as usize).max(1);
        if ncon == snu {
            1.0 / slay_act_n as f32
        } else {
            let r_max_act_n = ncon.min(slay_act_n as f32) as usize;
            let r_avg_act_n = ((savg * ncon + 0.5) as usize).max(1);
            let r_exp_act_n = (r_avg_act_n + sem_extra).min(r_max_act_n.max(1));
            1.0 / r_exp_act_n as f32
        }
    }

    /// Full scaling factor: abs * rel * activity scale.
    pub fn full_scale(&self, savg: f32, snu: f32, ncon: f32) -> f32 {
        self.abs * self.rel * self.slay_act_scale(savg, snu, ncon)
    }
}

/// Initial weight distribution: uniform over `mean ± var`, clipped to
/// [0, 1].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WtInitParams {
    pub mean: f32,
    pub var: f32,
    /// Enforce symmetric initial weights for reciprocal projections.
    pub sym: bool,
}

impl Default for WtInitParams {
    fn default() -> Self {
        Self {
            mean: 0.5,
            var: 0.25,
            sym: true,
        }
    }
}

impl WtInitParams {
    pub fn gen(&self, rng: &mut StdRng) -> f32 {
        if self.var == 0.0 {
            return self.mean.clamp(0.0, 1.0);
        }
        rng.gen_range(self.mean - self.var..self.mean + self.var)
            .clamp(0.0, 1.0)
    }
}

/// One projection between two layers in the network arena.
#[derive(Clone, Debug)]
pub struct Prjn {
    /// Disable without removing: skipped by every pass.
    pub off: bool,
    pub typ: PrjnType,
    pub pat: Pattern,
    /// Arena index of the sending layer.
    pub send_lay: usize,
    /// Arena index of the receiving layer.
    pub recv_lay: usize,

    /// Synapses, sender-major.
    pub syns: Vec<Synapse>,
    /// Receiving unit of each synapse, parallel to `syns`.
    pub syn_recv_idx: Vec<u32>,
    /// CSR offsets into `syns` per sending unit, len send_n + 1.
    pub send_syn_st: Vec<usize>,
    /// Receiver-grouped index: offsets per receiving unit, len recv_n + 1.
    pub recv_syn_st: Vec<usize>,
    /// Synapse indices grouped by receiving unit.
    pub recv_syn_idx: Vec<u32>,
    /// Stats over the number of connections per receiving unit.
    pub recv_con: AvgMax,

    /// Per-receiver conductance increments accumulated by sending, folded
    /// into neuron increments by the receiving layer each cycle.
    pub g_inc: Vec<f32>,
    /// Overall conductance scale, recomputed at alpha-cycle init from
    /// sending-layer average activity.
    pub g_scale: f32,
    pub wt_scale: WtScaleParams,
    pub wt_init: WtInitParams,
    pub learn: LearnSynParams,
    pub syn_dep: SynDepParams,

    /// Weight-balance increase factor per receiving unit.
    pub wb_inc: Vec<f32>,
    /// Weight-balance decrease factor per receiving unit.
    pub wb_dec: Vec<f32>,
}

impl Prjn {
    pub fn new(send_lay: usize, recv_lay: usize, pat: Pattern, typ: PrjnType) -> Self {
        Self {
            off: false,
            typ,
            pat,
            send_lay,
            recv_lay,
            syns: Vec::new(),
            syn_recv_idx: Vec::new(),
            send_syn_st: Vec::new(),
            recv_syn_st: Vec::new(),
            recv_syn_idx: Vec::new(),
            recv_con: AvgMax::default(),
            g_inc: Vec::new(),
            g_scale: 1.0,
            wt_scale: WtScaleParams::default(),
            wt_init: WtInitParams::default(),
            learn: LearnSynParams::default(),
            syn_dep: SynDepParams::default(),
            wb_inc: Vec::new(),
            wb_dec: Vec::new(),
        }
    }

    pub fn update_params(&mut self) {
        self.learn.update();
        self.syn_dep.update();
    }

    /// Construct the synapse storage for the configured pattern, given the
    /// unit counts of the two layers.
    pub fn build(&mut self, send_n: usize, recv_n: usize) -> Result<(), NetError> {
        if send_n == 0 || recv_n == 0 {
            return Err(NetError::PrjnBeforeLayers {
                send: self.send_lay,
                recv: self.recv_lay,
            });
        }
        self.send_syn_st = Vec::with_capacity(send_n + 1);
        self.syn_recv_idx.clear();
        self.send_syn_st.push(0);
        let same_layer = self.send_lay == self.recv_lay;
        match self.pat {
            Pattern::Full { self_con } => {
                for si in 0..send_n {
                    for ri in 0..recv_n {
                        if same_layer && !self_con && si == ri {
                            continue;
                        }
                        self.syn_recv_idx.push(ri as u32);
                    }
                    self.send_syn_st.push(self.syn_recv_idx.len());
                }
            }
            Pattern::OneToOne => {
                let n = send_n.min(recv_n);
                for si in 0..send_n {
                    if si < n {
                        self.syn_recv_idx.push(si as u32);
                    }
                    self.send_syn_st.push(self.syn_recv_idx.len());
                }
            }
        }
        self.syns = vec![Synapse::default(); self.syn_recv_idx.len()];
        self.g_inc = vec![0.0; recv_n];
        self.wb_inc = vec![1.0; recv_n];
        self.wb_dec = vec![1.0; recv_n];
        self.build_recv_index(recv_n);
        Ok(())
    }

    /// Bucket synapse indices by receiving unit, counting-sort style, and
    /// record connection-count stats.
    fn build_recv_index(&mut self, recv_n: usize) {
        let mut counts = vec![0usize; recv_n];
        for &ri in &self.syn_recv_idx {
            counts[ri as usize] += 1;
        }
        self.recv_con.init();
        for (ri, &c) in counts.iter().enumerate() {
            self.recv_con.update_val(c as f32, ri);
        }
        self.recv_con.calc_avg();

        self.recv_syn_st = Vec::with_capacity(recv_n + 1);
        self.recv_syn_st.push(0);
        let mut acc = 0usize;
        for &c in &counts {
            acc += c;
            self.recv_syn_st.push(acc);
        }
        self.recv_syn_idx = vec![0; self.syns.len()];
        let mut cursor: Vec<usize> = self.recv_syn_st[..recv_n].to_vec();
        for (syi, &ri) in self.syn_recv_idx.iter().enumerate() {
            let ri = ri as usize;
            self.recv_syn_idx[cursor[ri]] = syi as u32;
            cursor[ri] += 1;
        }
    }

    /// Number of sending units this projection was built for.
    #[inline]
    pub fn send_n(&self) -> usize {
        self.send_syn_st.len().saturating_sub(1)
    }

    /// Synapse index range for one sending unit.
    #[inline]
    pub fn send_syn_range(&self, si: usize) -> std::ops::Range<usize> {
        self.send_syn_st[si]..self.send_syn_st[si + 1]
    }

    /// Initialize weights from the configured distribution and reset all
    /// learning state.
    pub fn init_wts(&mut self, rng: &mut StdRng) {
        for sy in &mut self.syns {
            sy.wt = self.wt_init.gen(rng);
            sy.lwt = self.learn.wt_sig.lin_fm_sig(sy.wt);
            sy.dwt = 0.0;
            sy.norm = 0.0;
            sy.moment = 0.0;
            sy.scale = 1.0;
            sy.eff_wt = sy.wt;
            sy.cai = 0.0;
        }
        for w in &mut self.wb_inc {
            *w = 1.0;
        }
        for w in &mut self.wb_dec {
            *w = 1.0;
        }
        self.init_g_inc();
    }

    /// Copy weights from this projection onto its reciprocal, making the
    /// initial weight matrix symmetric. The reciprocal's sender groups are
    /// built in ascending recv order, so the mirror synapse is found by
    /// binary search.
    pub fn init_wt_sym(&self, rpj: &mut Prjn) {
        for si in 0..self.send_n() {
            for syi in self.send_syn_range(si) {
                let ri = self.syn_recv_idx[syi] as usize;
                // mirror: rpj sender ri -> receiver si
                if ri + 1 >= rpj.send_syn_st.len() {
                    continue;
                }
                let rng = rpj.send_syn_range(ri);
                let grp = &rpj.syn_recv_idx[rng.clone()];
                if let Ok(off) = grp.binary_search(&(si as u32)) {
                    let rsy = &mut rpj.syns[rng.start + off];
                    let sy = &self.syns[syi];
                    rsy.wt = sy.wt;
                    rsy.lwt = sy.lwt;
                    rsy.eff_wt = sy.eff_wt;
                }
            }
        }
    }

    /// Zero the conductance increment buffer.
    pub fn init_g_inc(&mut self) {
        for g in &mut self.g_inc {
            *g = 0.0;
        }
    }

    /// Reset the depression state: full efficacy, no accumulated calcium.
    pub fn init_sd_eff_wt(&mut self) {
        for sy in &mut self.syns {
            sy.eff_wt = sy.wt;
            sy.cai = 0.0;
        }
    }

    /// Accumulate one cycle of sent activation deltas into `g_inc`.
    /// `send_buf` holds (sending unit, delta) pairs from the send layer;
    /// depressed efficacies are used instead of raw weights during sleep.
    pub fn accum_send(&mut self, send_buf: &[(u32, f32)], sleep: bool) {
        for &(si, delta) in send_buf {
            let scale = self.g_scale * delta;
            for syi in self.send_syn_range(si as usize) {
                let sy = &self.syns[syi];
                let w = if sleep { sy.eff_wt } else { sy.wt };
                self.g_inc[self.syn_recv_idx[syi] as usize] += scale * w * sy.scale;
            }
        }
    }

    /// Per-cycle calcium and depression update during sleep: calcium from
    /// sender/receiver co-activation, then efficacy from calcium.
    pub fn ca_syn_dep(&mut self, send_nrns: &[Neuron], recv_nrns: &[Neuron]) {
        for si in 0..self.send_n() {
            let su = &send_nrns[si];
            if su.is_off() {
                continue;
            }
            for syi in self.send_syn_range(si) {
                let ri = self.syn_recv_idx[syi] as usize;
                let ru = &recv_nrns[ri];
                if ru.is_off() {
                    continue;
                }
                let sy = &mut self.syns[syi];
                let su_drive = match self.syn_dep.drive {
                    CaDrive::Act => su.act,
                    CaDrive::EffWtAct => sy.eff_wt * su.act,
                };
                self.syn_dep.ca_update(&mut sy.cai, ru.act, su_drive);
                sy.eff_wt = sy.wt * self.syn_dep.syn_dep(sy.cai);
            }
        }
    }

    /// Compute weight changes from the phase activation products, with
    /// normalization and momentum folded in.
    pub fn dwt(&mut self, send_nrns: &[Neuron], recv_nrns: &[Neuron]) {
        if !self.learn.learn {
            return;
        }
        for si in 0..self.send_n() {
            let su = &send_nrns[si];
            if su.is_off() {
                continue;
            }
            for syi in self.send_syn_range(si) {
                let ri = self.syn_recv_idx[syi] as usize;
                let ru = &recv_nrns[ri];
                if ru.is_off() {
                    continue;
                }
                let sy = &mut self.syns[syi];
                let mut dwt = self.learn.dwt(
                    su.act_p,
                    su.act_m,
                    ru.act_p,
                    ru.act_m,
                    ru.avg_l_lrn,
                    sy.lwt,
                );
                let norm = if self.learn.norm.on {
                    self.learn.norm.norm_fm_abs_dwt(&mut sy.norm, dwt.abs())
                } else {
                    1.0
                };
                if self.learn.momentum.on {
                    dwt = norm * self.learn.momentum.moment_fm_dwt(&mut sy.moment, dwt);
                } else {
                    dwt *= norm;
                }
                sy.dwt += self.learn.lrate * dwt;
            }
        }
    }

    /// Apply accumulated weight changes: balance factors by sign, linear
    /// weight clipped to [0, 1], contrast enhancement, and the depressed
    /// efficacy refreshed from the new weight.
    pub fn wt_fm_dwt(&mut self) {
        if !self.learn.learn {
            return;
        }
        for syi in 0..self.syns.len() {
            let ri = self.syn_recv_idx[syi] as usize;
            let sy = &mut self.syns[syi];
            if sy.dwt == 0.0 {
                continue;
            }
            if sy.dwt > 0.0 {
                sy.dwt *= self.wb_inc[ri];
            } else {
                sy.dwt *= self.wb_dec[ri];
            }
            sy.lwt = (sy.lwt + sy.dwt).clamp(0.0, 1.0);
            sy.wt = self.learn.wt_sig.sig_fm_lin(sy.lwt);
            sy.eff_wt = sy.wt * self.syn_dep.syn_dep(sy.cai);
            sy.dwt = 0.0;
        }
    }

    /// Recompute weight-balance factors from the average weight received
    /// by each unit.
    pub fn wt_bal_fm_wt(&mut self) {
        if !self.learn.learn || !self.learn.wt_bal.on {
            return;
        }
        let recv_n = self.recv_syn_st.len().saturating_sub(1);
        for ri in 0..recv_n {
            let rng = self.recv_syn_st[ri]..self.recv_syn_st[ri + 1];
            if rng.is_empty() {
                continue;
            }
            let mut sum = 0.0;
            for &syi in &self.recv_syn_idx[rng.clone()] {
                sum += self.syns[syi as usize].wt;
            }
            let avg = sum / rng.len() as f32;
            let (inc, dec) = self.learn.wt_bal.wt_bal(avg);
            self.wb_inc[ri] = inc;
            self.wb_dec[ri] = dec;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn nrn(act: f32) -> Neuron {
        Neuron {
            act,
            ..Neuron::default()
        }
    }

    #[test]
    fn full_pattern_counts() {
        let mut pj = Prjn::new(0, 1, Pattern::Full { self_con: false }, PrjnType::Forward);
        pj.build(3, 4).unwrap();
        assert_eq!(pj.syns.len(), 12);
        assert_eq!(pj.send_syn_range(1), 4..8);
        assert_eq!(pj.recv_con.avg, 3.0);
        assert_eq!(pj.recv_con.max, 3.0);
    }

    #[test]
    fn full_self_projection_skips_diagonal() {
        let mut pj = Prjn::new(2, 2, Pattern::Full { self_con: false }, PrjnType::Lateral);
        pj.build(4, 4).unwrap();
        assert_eq!(pj.syns.len(), 12);
        for si in 0..4 {
            for syi in pj.send_syn_range(si) {
                assert_ne!(pj.syn_recv_idx[syi] as usize, si);
            }
        }
    }

    #[test]
    fn one_to_one_truncates_to_smaller() {
        let mut pj = Prjn::new(0, 1, Pattern::OneToOne, PrjnType::Forward);
        pj.build(5, 3).unwrap();
        assert_eq!(pj.syns.len(), 3);
        for si in 0..3 {
            assert_eq!(pj.syn_recv_idx[pj.send_syn_st[si]] as usize, si);
        }
        assert!(pj.send_syn_range(4).is_empty());
    }

    #[test]
    fn build_rejects_empty_layers() {
        let mut pj = Prjn::new(0, 1, Pattern::OneToOne, PrjnType::Forward);
        assert!(matches!(
            pj.build(0, 3),
            Err(NetError::PrjnBeforeLayers { .. })
        ));
    }

    #[test]
    fn init_wts_in_range_and_linear_consistent() {
        let mut pj = Prjn::new(0, 1, Pattern::Full { self_con: false }, PrjnType::Forward);
        pj.build(4, 4).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        pj.init_wts(&mut rng);
        for sy in &pj.syns {
            assert!((0.0..=1.0).contains(&sy.wt));
            let back = pj.learn.wt_sig.sig_fm_lin(sy.lwt);
            assert!((back - sy.wt).abs() < 1e-5);
            assert_eq!(sy.eff_wt, sy.wt);
            assert_eq!(sy.cai, 0.0);
            assert_eq!(sy.scale, 1.0);
        }
    }

    #[test]
    fn wt_sym_mirrors_weights() {
        let mut fwd = Prjn::new(0, 1, Pattern::Full { self_con: false }, PrjnType::Forward);
        let mut back = Prjn::new(1, 0, Pattern::Full { self_con: false }, PrjnType::Back);
        fwd.build(3, 3).unwrap();
        back.build(3, 3).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        fwd.init_wts(&mut rng);
        back.init_wts(&mut rng);
        fwd.init_wt_sym(&mut back);
        for si in 0..3 {
            for syi in fwd.send_syn_range(si) {
                let ri = fwd.syn_recv_idx[syi] as usize;
                let brng = back.send_syn_range(ri);
                let off = back.syn_recv_idx[brng.clone()]
                    .binary_search(&(si as u32))
                    .unwrap();
                assert_eq!(back.syns[brng.start + off].wt, fwd.syns[syi].wt);
            }
        }
    }

    #[test]
    fn accum_send_uses_eff_wt_in_sleep() {
        let mut pj = Prjn::new(0, 1, Pattern::OneToOne, PrjnType::Forward);
        pj.build(2, 2).unwrap();
        pj.syns[0].wt = 0.8;
        pj.syns[0].eff_wt = 0.4;
        pj.syns[0].scale = 1.0;
        pj.accum_send(&[(0, 0.5)], false);
        assert!((pj.g_inc[0] - 0.4).abs() < 1e-6);
        pj.init_g_inc();
        pj.accum_send(&[(0, 0.5)], true);
        assert!((pj.g_inc[0] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn depression_lowers_eff_wt_under_coactivation() {
        let mut pj = Prjn::new(0, 1, Pattern::OneToOne, PrjnType::Forward);
        pj.build(1, 1).unwrap();
        pj.syns[0].wt = 1.0;
        pj.syns[0].eff_wt = 1.0;
        let send = vec![nrn(1.0)];
        let recv = vec![nrn(1.0)];
        for _ in 0..100 {
            pj.ca_syn_dep(&send, &recv);
        }
        assert!(pj.syns[0].cai > pj.syn_dep.ca_thr);
        assert!(pj.syns[0].eff_wt < pj.syns[0].wt);
        // recovery once activity stops
        let idle = vec![nrn(0.0)];
        for _ in 0..500 {
            pj.ca_syn_dep(&idle, &idle);
        }
        assert!((pj.syns[0].eff_wt - pj.syns[0].wt).abs() < 1e-4);
    }

    #[test]
    fn dwt_then_wt_fm_dwt_moves_weight() {
        let mut pj = Prjn::new(0, 1, Pattern::OneToOne, PrjnType::Forward);
        pj.build(1, 1).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        pj.init_wts(&mut rng);
        let w0 = pj.syns[0].wt;

        let mut su = nrn(0.0);
        su.act_p = 0.9;
        su.act_m = 0.1;
        let mut ru = nrn(0.0);
        ru.act_p = 0.9;
        ru.act_m = 0.1;
        pj.dwt(&[su], &[ru]);
        assert!(pj.syns[0].dwt > 0.0);
        pj.wt_fm_dwt();
        assert!(pj.syns[0].wt > w0);
        assert_eq!(pj.syns[0].dwt, 0.0);
        assert!((0.0..=1.0).contains(&pj.syns[0].lwt));
    }

    #[test]
    fn wt_bal_factors_respond_to_heavy_weights() {
        let mut pj = Prjn::new(0, 1, Pattern::Full { self_con: false }, PrjnType::Forward);
        pj.build(4, 2).unwrap();
        for sy in &mut pj.syns {
            sy.wt = 0.9;
        }
        pj.wt_bal_fm_wt();
        for ri in 0..2 {
            assert!(pj.wb_inc[ri] < 1.0);
            assert!(pj.wb_dec[ri] > 1.0);
        }
    }
}
