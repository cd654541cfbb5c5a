//! The network arena: owns all layers and projections, wires them by
//! index, and drives the cycle / quarter / alpha-cycle timeline.
//!
//! Every per-cycle phase is a parallel map over layers or projections
//! with an implicit join, which is the barrier between sub-phases: a
//! phase only ever mutates its own side of the arena and reads the
//! other side immutably. Sending is split in two for this reason --
//! layers collect their deltas into a local outbox, then projections
//! consume the outboxes into their own increment buffers.

use log::debug;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::error::NetError;
use crate::layer::Layer;
use crate::prjn::{Pattern, Prjn, PrjnType};
use crate::timing::Time;

/// A rate-coded network.
#[derive(Clone, Debug)]
pub struct Network {
    pub name: String,
    pub layers: Vec<Layer>,
    pub prjns: Vec<Prjn>,
    /// How frequently (in weight updates) to recompute the weight-balance
    /// factors, which is relatively expensive.
    pub wt_bal_interval: u32,
    wt_bal_ctr: u32,
    rng: StdRng,
}

impl Network {
    pub fn new(name: impl Into<String>, seed: u64) -> Self {
        Self {
            name: name.into(),
            layers: Vec::new(),
            prjns: Vec::new(),
            wt_bal_interval: 10,
            wt_bal_ctr: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Add a layer to the arena, returning its index.
    pub fn add_layer(&mut self, mut ly: Layer) -> usize {
        let idx = self.layers.len();
        ly.idx = idx;
        self.layers.push(ly);
        idx
    }

    /// Find a layer index by name.
    pub fn layer_by_name(&self, name: &str) -> Result<usize, NetError> {
        self.layers
            .iter()
            .position(|ly| ly.name == name)
            .ok_or_else(|| NetError::UnknownLayer(name.to_string()))
    }

    pub fn layer(&self, idx: usize) -> Result<&Layer, NetError> {
        self.layers.get(idx).ok_or(NetError::LayerIndex {
            index: idx,
            n: self.layers.len(),
        })
    }

    pub fn layer_mut(&mut self, idx: usize) -> Result<&mut Layer, NetError> {
        let n = self.layers.len();
        self.layers
            .get_mut(idx)
            .ok_or(NetError::LayerIndex { index: idx, n })
    }

    /// Connect two layers, returning the new projection's index. Both
    /// layers must already be in the arena.
    pub fn connect_layers(
        &mut self,
        send: usize,
        recv: usize,
        pat: Pattern,
        typ: PrjnType,
    ) -> Result<usize, NetError> {
        let n = self.layers.len();
        if send >= n || recv >= n {
            return Err(NetError::PrjnBeforeLayers { send, recv });
        }
        let pi = self.prjns.len();
        self.prjns.push(Prjn::new(send, recv, pat, typ));
        self.layers[send].send_prjns.push(pi);
        self.layers[recv].recv_prjns.push(pi);
        Ok(pi)
    }

    /// Recompute all derived parameters after configuration changes.
    pub fn update_params(&mut self) {
        for ly in &mut self.layers {
            ly.update_params();
        }
        for pj in &mut self.prjns {
            pj.update_params();
        }
    }

    /// Allocate all layer and projection state. Pool-level inhibition
    /// settings must be final by this point, since they size the pools.
    pub fn build(&mut self) -> Result<(), NetError> {
        for ly in &mut self.layers {
            ly.build()?;
        }
        for pj in &mut self.prjns {
            let send_n = self.layers[pj.send_lay].neurons.len();
            let recv_n = self.layers[pj.recv_lay].neurons.len();
            pj.build(send_n, recv_n)?;
        }
        Ok(())
    }

    //// Init

    /// Initialize all weights and long-term state, resetting learning.
    pub fn init_wts(&mut self) {
        self.wt_bal_ctr = 0;
        for pj in &mut self.prjns {
            if pj.off {
                continue;
            }
            pj.init_wts(&mut self.rng);
        }
        for ly in &mut self.layers {
            if ly.off {
                continue;
            }
            ly.init_state();
        }
        self.init_wt_sym();
        debug!("init_wts: network {} reset", self.name);
    }

    /// Symmetry pass: copy weights from the lower-indexed direction onto
    /// reciprocal projections that ask for it.
    fn init_wt_sym(&mut self) {
        for pi in 0..self.prjns.len() {
            let (send, recv, off, sym) = {
                let pj = &self.prjns[pi];
                (pj.send_lay, pj.recv_lay, pj.off, pj.wt_init.sym)
            };
            if off || !sym || recv < send {
                continue;
            }
            let rpi = match self
                .prjns
                .iter()
                .position(|rp| !rp.off && rp.send_lay == recv && rp.recv_lay == send)
            {
                Some(rpi) if rpi != pi => rpi,
                _ => continue,
            };
            let (lo, hi) = (pi.min(rpi), pi.max(rpi));
            let (left, right) = self.prjns.split_at_mut(hi);
            if pi == lo {
                left[lo].init_wt_sym(&mut right[0]);
            } else {
                right[0].init_wt_sym(&mut left[lo]);
            }
        }
    }

    /// Reset the depression state on all projections: full efficacy, no
    /// accumulated calcium.
    pub fn init_sd_eff_wt(&mut self) {
        for pj in &mut self.prjns {
            if pj.off {
                continue;
            }
            pj.init_sd_eff_wt();
        }
    }

    /// Reset conductance accumulation on all layers and projections, e.g.
    /// after weights changed strength mid-trial.
    pub fn init_g_inc(&mut self) {
        for ly in &mut self.layers {
            if ly.off {
                continue;
            }
            ly.init_g_inc();
        }
        for pj in &mut self.prjns {
            if pj.off {
                continue;
            }
            pj.init_g_inc();
        }
    }

    /// Fully initialize activation state on all layers.
    pub fn init_acts(&mut self) {
        for ly in &mut self.layers {
            if ly.off {
                continue;
            }
            ly.init_acts();
        }
    }

    /// Clear external inputs, prior to applying new ones.
    pub fn init_ext(&mut self) {
        for ly in &mut self.layers {
            if ly.off {
                continue;
            }
            ly.init_ext();
        }
    }

    /// Apply external input to a layer by name.
    pub fn apply_ext(&mut self, name: &str, ext: &[f32]) -> Result<(), NetError> {
        let li = self.layer_by_name(name)?;
        self.layers[li].apply_ext(ext);
        Ok(())
    }

    //// Alpha cycle

    /// All initialization at the start of a new input pattern. External
    /// input should already be applied.
    pub fn alpha_cyc_init(&mut self) {
        self.layers
            .par_iter_mut()
            .filter(|ly| !ly.off)
            .for_each(|ly| ly.alpha_cyc_init());
        self.g_scale_fm_avg_act();
        self.init_g_inc();
    }

    /// Conductance scaling from sending-layer average activity, normalized
    /// across all projections into each layer (inhibitory projections
    /// normalize separately). Runs sequentially because each projection
    /// reads its sending layer's activity averages.
    fn g_scale_fm_avg_act(&mut self) {
        for li in 0..self.layers.len() {
            if self.layers[li].off {
                continue;
            }
            let mut tot_ge_rel = 0.0_f32;
            let mut tot_gi_rel = 0.0_f32;
            for k in 0..self.layers[li].recv_prjns.len() {
                let pi = self.layers[li].recv_prjns[k];
                if self.prjns[pi].off {
                    continue;
                }
                let slay = &self.layers[self.prjns[pi].send_lay];
                let savg = slay.pools[0].act_avg.act_p_avg_eff;
                let snu = slay.neurons.len() as f32;
                let pj = &mut self.prjns[pi];
                pj.g_scale = pj.wt_scale.full_scale(savg, snu, pj.recv_con.avg);
                if pj.typ.is_inhib() {
                    tot_gi_rel += pj.wt_scale.rel;
                } else {
                    tot_ge_rel += pj.wt_scale.rel;
                }
            }
            for k in 0..self.layers[li].recv_prjns.len() {
                let pi = self.layers[li].recv_prjns[k];
                let pj = &mut self.prjns[pi];
                if pj.off {
                    continue;
                }
                if pj.typ.is_inhib() {
                    if tot_gi_rel > 0.0 {
                        pj.g_scale /= tot_gi_rel;
                    }
                } else if tot_ge_rel > 0.0 {
                    pj.g_scale /= tot_ge_rel;
                }
            }
        }
    }

    /// One cycle of activation updating: depression (sleep only), delta
    /// sending, conductance integration, pool Ge stats, inhibition,
    /// activation, pool Act stats. Each step is a parallel pass bounded
    /// by a join.
    pub fn cycle(&mut self, _time: &Time, sleep: bool) {
        if sleep {
            self.ca_syn_dep();
        }
        self.send_g_delta(sleep);
        self.layer_pass(|ly| ly.avg_max_ge());
        self.layer_pass(|ly| ly.inhib_fm_ge_act());
        self.layer_pass(|ly| ly.act_fm_g());
        self.layer_pass(|ly| ly.avg_max_act());
    }

    fn layer_pass(&mut self, f: impl Fn(&mut Layer) + Sync + Send) {
        self.layers
            .par_iter_mut()
            .filter(|ly| !ly.off)
            .for_each(f);
    }

    /// Delta sending: layers fill their outboxes, then projections fold
    /// them through the weights into per-receiver increments, then layers
    /// integrate the increments into unit conductances.
    fn send_g_delta(&mut self, sleep: bool) {
        self.layer_pass(|ly| ly.send_g_delta());
        let Self { layers, prjns, .. } = self;
        let layers_ref: &Vec<Layer> = layers;
        prjns.par_iter_mut().filter(|pj| !pj.off).for_each(|pj| {
            pj.init_g_inc();
            if !layers_ref[pj.send_lay].off {
                pj.accum_send(&layers_ref[pj.send_lay].send_buf, sleep);
            }
        });
        let prjns_ref: &Vec<Prjn> = prjns;
        layers
            .par_iter_mut()
            .filter(|ly| !ly.off)
            .for_each(|ly| ly.g_fm_inc(prjns_ref));
    }

    /// Calcium and depression dynamics on every projection, from current
    /// sender/receiver co-activation.
    fn ca_syn_dep(&mut self) {
        let Self { layers, prjns, .. } = self;
        let layers_ref: &Vec<Layer> = layers;
        prjns.par_iter_mut().filter(|pj| !pj.off).for_each(|pj| {
            let slay = &layers_ref[pj.send_lay];
            let rlay = &layers_ref[pj.recv_lay];
            if slay.off || rlay.off {
                return;
            }
            pj.ca_syn_dep(&slay.neurons, &rlay.neurons);
        });
    }

    /// End-of-quarter bookkeeping on all layers.
    pub fn quarter_final(&mut self, time: &Time) {
        self.layers
            .par_iter_mut()
            .filter(|ly| !ly.off)
            .for_each(|ly| ly.quarter_final(time));
    }

    /// Update the inter-cycle state correlation on all layers.
    pub fn cal_lay_sim(&mut self) {
        self.layer_pass(|ly| ly.cal_lay_sim());
    }

    /// Run one complete alpha cycle over already-applied external input:
    /// init, 4 quarters of cycles, and (when training) the learning pass.
    pub fn alpha_cyc(&mut self, time: &mut Time, train: bool) {
        self.alpha_cyc_init();
        time.alpha_cyc_start();
        for _ in 0..4 {
            for _ in 0..time.cyc_per_qtr {
                self.cycle(time, false);
                time.cycle_inc();
            }
            self.quarter_final(time);
            time.quarter_inc();
        }
        if train {
            self.dwt();
            self.wt_fm_dwt();
        }
    }

    //// Learning

    /// Compute weight changes on all projections from the phase snapshots.
    pub fn dwt(&mut self) {
        let Self { layers, prjns, .. } = self;
        let layers_ref: &Vec<Layer> = layers;
        prjns.par_iter_mut().filter(|pj| !pj.off).for_each(|pj| {
            let slay = &layers_ref[pj.send_lay];
            let rlay = &layers_ref[pj.recv_lay];
            if slay.off || rlay.off {
                return;
            }
            pj.dwt(&slay.neurons, &rlay.neurons);
        });
    }

    /// Apply weight changes, recomputing the weight-balance factors every
    /// `wt_bal_interval` updates.
    pub fn wt_fm_dwt(&mut self) {
        self.prjns
            .par_iter_mut()
            .filter(|pj| !pj.off)
            .for_each(|pj| pj.wt_fm_dwt());
        self.wt_bal_ctr += 1;
        if self.wt_bal_ctr >= self.wt_bal_interval {
            self.wt_bal_ctr = 0;
            self.wt_bal_fm_wt();
        }
    }

    /// Recompute weight-balance factors from average receiving weights.
    pub fn wt_bal_fm_wt(&mut self) {
        self.prjns
            .par_iter_mut()
            .filter(|pj| !pj.off)
            .for_each(|pj| pj.wt_bal_fm_wt());
    }

    //// Sleep

    /// Enter sleep mode: send thresholds drop to zero, inhibition gains
    /// snapshot their baseline for oscillation, and depression state is
    /// reset to full efficacy.
    pub fn sleep(&mut self) {
        for ly in &mut self.layers {
            if ly.off {
                continue;
            }
            ly.sleep();
        }
        self.init_sd_eff_wt();
        debug!("sleep: network {} entering sleep mode", self.name);
    }

    /// Leave sleep mode: thresholds and gains restored, depression
    /// cleared.
    pub fn wake(&mut self) {
        for ly in &mut self.layers {
            if ly.off {
                continue;
            }
            ly.wake();
        }
        self.init_sd_eff_wt();
        debug!("wake: network {} leaving sleep mode", self.name);
    }

    /// Advance the inhibition oscillation on all layers.
    pub fn inhib_oscil(&mut self, step: u32) {
        for ly in &mut self.layers {
            if ly.off {
                continue;
            }
            ly.inhib_oscil(step);
        }
    }

    /// Return all layer inhibition gains to baseline.
    pub fn inhib_oscil_mute(&mut self) {
        for ly in &mut self.layers {
            if ly.off {
                continue;
            }
            ly.inhib_oscil_mute();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{LayerType, Shape};

    fn three_layer_net(seed: u64) -> Network {
        let mut net = Network::new("test", seed);
        let inp = net.add_layer(Layer::new(
            "Input",
            Shape::Grid { y: 2, x: 2 },
            LayerType::Input,
            seed + 1,
        ));
        let hid = net.add_layer(Layer::new(
            "Hidden",
            Shape::Grid { y: 2, x: 3 },
            LayerType::Hidden,
            seed + 2,
        ));
        let out = net.add_layer(Layer::new(
            "Output",
            Shape::Grid { y: 2, x: 2 },
            LayerType::Target,
            seed + 3,
        ));
        net.connect_layers(inp, hid, Pattern::Full { self_con: false }, PrjnType::Forward)
            .unwrap();
        net.connect_layers(hid, out, Pattern::Full { self_con: false }, PrjnType::Forward)
            .unwrap();
        net.connect_layers(out, hid, Pattern::Full { self_con: false }, PrjnType::Back)
            .unwrap();
        net.build().unwrap();
        net.init_wts();
        net
    }

    fn run_trial(net: &mut Network, time: &mut Time, train: bool) {
        net.init_ext();
        net.apply_ext("Input", &[1.0, 0.0, 0.0, 1.0]).unwrap();
        net.apply_ext("Output", &[1.0, 0.0, 0.0, 1.0]).unwrap();
        net.alpha_cyc(time, train);
    }

    #[test]
    fn connect_requires_existing_layers() {
        let mut net = Network::new("bad", 0);
        assert!(matches!(
            net.connect_layers(0, 1, Pattern::OneToOne, PrjnType::Forward),
            Err(NetError::PrjnBeforeLayers { .. })
        ));
    }

    #[test]
    fn reciprocal_weights_symmetric_after_init() {
        let net = three_layer_net(3);
        let fwd = &net.prjns[1]; // hid -> out
        let back = &net.prjns[2]; // out -> hid
        for si in 0..fwd.send_n() {
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
    fn trial_clamps_input_and_target() {
        let mut net = three_layer_net(11);
        let mut time = Time::default();
        run_trial(&mut net, &mut time, false);

        let inp = net.layer(net.layer_by_name("Input").unwrap()).unwrap();
        // hard clamp is range-limited at 0.95
        assert!((inp.neurons[0].act - 0.95).abs() < 1e-6);
        assert_eq!(inp.neurons[1].act, 0.0);

        let out = net.layer(net.layer_by_name("Output").unwrap()).unwrap();
        // plus phase clamps the target, so act_p reflects it
        assert!((out.neurons[0].act_p - 0.95).abs() < 1e-6);
        assert_eq!(out.neurons[1].act_p, 0.0);
        // minus phase was free-running
        assert!(out.neurons[0].act_m < 0.95);

        let hid = net.layer(net.layer_by_name("Hidden").unwrap()).unwrap();
        for nrn in &hid.neurons {
            assert!((0.0..1.0).contains(&nrn.act), "act out of range: {}", nrn.act);
            assert!(!nrn.act.is_nan());
        }
    }

    #[test]
    fn training_moves_weights() {
        let mut net = three_layer_net(17);
        let mut time = Time::default();
        let w0: Vec<f32> = net.prjns[0].syns.iter().map(|sy| sy.wt).collect();
        for _ in 0..3 {
            run_trial(&mut net, &mut time, true);
        }
        let w1: Vec<f32> = net.prjns[0].syns.iter().map(|sy| sy.wt).collect();
        assert!(
            w0.iter().zip(&w1).any(|(a, b)| (a - b).abs() > 1e-6),
            "no weight changed after training"
        );
        for &w in &w1 {
            assert!((0.0..=1.0).contains(&w));
        }
    }

    #[test]
    fn identical_seeds_are_deterministic() {
        let mut a = three_layer_net(23);
        let mut b = three_layer_net(23);
        let mut ta = Time::default();
        let mut tb = Time::default();
        for _ in 0..2 {
            run_trial(&mut a, &mut ta, true);
            run_trial(&mut b, &mut tb, true);
        }
        let ha = a.layer_by_name("Hidden").unwrap();
        for (na, nb) in a.layers[ha].neurons.iter().zip(&b.layers[ha].neurons) {
            assert_eq!(na.act, nb.act);
            assert_eq!(na.act_p, nb.act_p);
        }
        for (pa, pb) in a.prjns.iter().zip(&b.prjns) {
            for (sa, sb) in pa.syns.iter().zip(&pb.syns) {
                assert_eq!(sa.wt, sb.wt);
            }
        }
    }

    #[test]
    fn sleep_depresses_active_synapses_and_wake_restores() {
        let mut net = three_layer_net(29);
        let mut time = Time::default();
        run_trial(&mut net, &mut time, false);

        net.sleep();
        // thresholds dropped so everything propagates
        assert_eq!(net.layers[0].act.opt_thresh.send, 0.0);

        time.alpha_cyc_start();
        for step in 0..50 {
            net.inhib_oscil(step);
            net.cycle(&time, true);
            time.cycle_inc();
        }
        let depressed = net.prjns[0]
            .syns
            .iter()
            .any(|sy| sy.eff_wt < sy.wt - 1e-4);
        assert!(depressed, "no synapse depressed during sleep");

        net.wake();
        assert_eq!(net.layers[0].act.opt_thresh.send, 0.1);
        assert_eq!(
            net.layers[0].inhib.layer.gi,
            net.layers[0].inhib.layer.gi_base
        );
        for pj in &net.prjns {
            for sy in &pj.syns {
                assert_eq!(sy.eff_wt, sy.wt);
                assert_eq!(sy.cai, 0.0);
            }
        }
    }

    #[test]
    fn wt_bal_runs_on_interval() {
        let mut net = three_layer_net(31);
        net.wt_bal_interval = 2;
        // saturate weights so balance factors must move off 1
        for pj in &mut net.prjns {
            for sy in &mut pj.syns {
                sy.wt = 0.95;
                sy.lwt = pj.learn.wt_sig.lin_fm_sig(0.95);
            }
        }
        let mut time = Time::default();
        run_trial(&mut net, &mut time, true);
        assert!(net.prjns[0].wb_inc.iter().all(|&v| v == 1.0));
        run_trial(&mut net, &mut time, true);
        assert!(
            net.prjns[0].wb_inc.iter().any(|&v| v < 1.0),
            "weight balance never ran"
        );
    }
}
