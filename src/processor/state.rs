use serde::Serialize;

/// Pipeline progress, in execution order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineStage {
    #[default]
    Empty,
    GridBuilt,
    GraphBuilt,
    Segmented,
    MixtureFit,
    Smoothed,
}

impl PipelineStage {
    pub fn name(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::GridBuilt => "grid-built",
            Self::GraphBuilt => "graph-built",
            Self::Segmented => "segmented",
            Self::MixtureFit => "mixture-fit",
            Self::Smoothed => "smoothed",
        }
    }

    pub fn next(self) -> Option<Self> {
        match self {
            Self::Empty => Some(Self::GridBuilt),
            Self::GridBuilt => Some(Self::GraphBuilt),
            Self::GraphBuilt => Some(Self::Segmented),
            Self::Segmented => Some(Self::MixtureFit),
            Self::MixtureFit => Some(Self::Smoothed),
            Self::Smoothed => None,
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Stage reached plus whether everything up to it succeeded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineState {
    pub stage: PipelineStage,
    pub valid: bool,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            stage: PipelineStage::Empty,
            valid: true,
        }
    }
}

impl PipelineState {
    /// Move to the following stage. Stages never go backwards.
    pub fn advance(&mut self, stage: PipelineStage) {
        debug_assert_eq!(self.stage.next(), Some(stage));
        self.stage = stage;
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_ordered() {
        let mut stage = PipelineStage::Empty;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            assert!(next > stage);
            stage = next;
            seen.push(stage);
        }
        assert_eq!(seen.len(), 6);
        assert_eq!(stage, PipelineStage::Smoothed);
        assert_eq!(
            serde_json::to_string(&PipelineStage::MixtureFit).unwrap(),
            "\"mixture-fit\""
        );
    }
}
