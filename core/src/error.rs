use std::path::PathBuf;

use crate::DocId;

/// Errors callers are expected to match on. Everything else travels as `anyhow::Error`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("page {id} ({title:?}) is already registered")]
    DuplicatePage { id: DocId, title: String },

    #[error("edges were already computed for this graph")]
    EdgesAlreadyComputed,

    #[error("R-precision rank {r} exceeds the {answers} retrieved answers")]
    RPrecisionOutOfRange { r: usize, answers: usize },

    #[error("ground truth unavailable: {0}")]
    GroundTruthUnavailable(String),

    #[error("missing artifact {}", .0.display())]
    MissingArtifact(PathBuf),
}
