//! Error types for network construction and introspection.
//!
//! Numeric degeneracies (division by zero in the activation math) are
//! prevented structurally at parameter `update()` time and never show up
//! here. What remains is configuration and lookup errors, which always
//! carry the offending value and the valid bound.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NetError {
    /// A layer was built with a shape containing zero units. Fatal for
    /// construction: no per-cycle computation can proceed on it.
    #[error("layer {name:?}: shape has no units")]
    EmptyLayerShape { name: String },

    #[error("unknown unit variable {0:?}")]
    UnknownUnitVar(String),

    #[error("unknown synapse variable {0:?}")]
    UnknownSynVar(String),

    #[error("unit index {index} out of range, layer has {n} units")]
    UnitIndex { index: usize, n: usize },

    #[error("pool index {index} out of range, layer has {n} pools")]
    PoolIndex { index: usize, n: usize },

    #[error("layer index {index} out of range, network has {n} layers")]
    LayerIndex { index: usize, n: usize },

    #[error("no layer named {0:?}")]
    UnknownLayer(String),

    #[error("lesion proportion {0} outside [0, 1]")]
    LesionProportion(f32),

    #[error("projection {send} -> {recv} built before both layers")]
    PrjnBeforeLayers { send: usize, recv: usize },
}
