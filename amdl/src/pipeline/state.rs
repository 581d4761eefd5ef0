//! Stage machine of a single acquisition.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Stages of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStage {
    /// Turning the URL into track metadata.
    #[default]
    Resolving,
    /// A variant matching the codec preference was found.
    VariantSelected,
    /// Downloading the encrypted bitstream.
    Fetching,
    /// Obtaining the content key.
    KeyAcquiring,
    /// Decrypting, remuxing and placing the artifact.
    Decrypting,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resolving => "RESOLVING",
            Self::VariantSelected => "VARIANT_SELECTED",
            Self::Fetching => "FETCHING",
            Self::KeyAcquiring => "KEY_ACQUIRING",
            Self::Decrypting => "DECRYPTING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Validate a stage transition.
    pub fn can_transition_to(&self, target: PipelineStage) -> bool {
        use PipelineStage::*;

        match (self, target) {
            (from, _) if from.is_terminal() => false,
            (_, Failed) => true,
            (Resolving, VariantSelected) => true,
            // A cache hit ends the run right after selection.
            (VariantSelected, Fetching | Done) => true,
            // Unprotected downloads skip the key stage.
            (Fetching, KeyAcquiring | Decrypting) => true,
            (KeyAcquiring, Decrypting) => true,
            (Decrypting, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the current stage of a run and logs every transition.
#[derive(Debug, Default)]
pub struct StageTracker {
    current: PipelineStage,
}

impl StageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> PipelineStage {
        self.current
    }

    pub fn advance(&mut self, next: PipelineStage) {
        if !self.current.can_transition_to(next) {
            warn!(from = %self.current, to = %next, "Unexpected stage transition");
        }
        debug!(from = %self.current, to = %next, "Stage transition");
        self.current = next;
    }
}
