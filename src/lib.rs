//! # ratenet
//!
//! Rate-coded neural network engine with biologically grounded dynamics.
//!
//! Provides conductance-based point neurons with a noisy-X/(X+1) rate
//! activation, pooled feedforward/feedback (FFFB) inhibition, error-driven
//! plus Hebbian learning over minus/plus phase snapshots, and a sleep mode
//! with calcium-driven synaptic depression and oscillating inhibition.
//!
//! Computation runs on a 100-cycle alpha cycle split into four quarters:
//! three minus-phase quarters of free settling followed by a plus phase
//! with targets clamped, after which weight changes are computed from the
//! difference between the two phases.

pub mod act;
pub mod chans;
pub mod error;
pub mod inhib;
pub mod layer;
pub mod learn;
pub mod network;
pub mod neuron;
pub mod pool;
pub mod prjn;
pub mod synapse;
pub mod timing;
pub mod xx1;

pub use act::{ActInitParams, ActNoiseKind, ActNoiseParams, ActParams, ClampParams, DtParams, NoiseDist, OptThreshParams, Range32};
pub use chans::Chans;
pub use error::NetError;
pub use inhib::{ActAvgParams, FFFBInhib, FFFBParams, InhibParams, SelfInhibParams};
pub use layer::{Layer, LayerType, Shape};
pub use learn::{AvgLParams, CosDiffParams, CosDiffStats, DwtNormParams, LearnNeurParams, LearnSynParams, LrnActAvgParams, MomentumParams, WtBalParams, WtSigParams};
pub use network::Network;
pub use neuron::{Neuron, NeuronVar};
pub use pool::{ActAvgs, AvgMax, Pool};
pub use prjn::{Pattern, Prjn, PrjnType, WtInitParams, WtScaleParams};
pub use synapse::{CaDrive, SynDepParams, Synapse, SynapseVar};
pub use timing::Time;
pub use xx1::Xx1Params;
