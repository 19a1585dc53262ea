use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Wall-clock time spent in one pipeline stage.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTiming {
    pub label: String,
    pub elapsed_ms: f64,
}

/// Per-stage timings of one processor run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingBreakdown {
    pub total_ms: f64,
    pub stages: Vec<StageTiming>,
}

impl TimingBreakdown {
    pub fn push(&mut self, label: impl Into<String>, elapsed_ms: f64) {
        self.stages.push(StageTiming {
            label: label.into(),
            elapsed_ms,
        });
    }

    /// Elapsed time of the first stage recorded under `label`.
    pub fn stage_ms(&self, label: &str) -> Option<f64> {
        self.stages
            .iter()
            .find(|s| s.label == label)
            .map(|s| s.elapsed_ms)
    }

    pub fn summary(&self) -> String {
        let parts: Vec<String> = self
            .stages
            .iter()
            .map(|s| format!("{}={:.2}ms", s.label, s.elapsed_ms))
            .collect();
        format!("total={:.2}ms [{}]", self.total_ms, parts.join(" "))
    }
}

/// Lap timer feeding a [`TimingBreakdown`].
#[derive(Debug)]
pub struct StageClock {
    started: Instant,
    lap: Instant,
}

impl StageClock {
    pub fn start() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            lap: now,
        }
    }

    /// Record the time since the previous lap under `label`; returns it in ms.
    pub fn lap(&mut self, timings: &mut TimingBreakdown, label: &str) -> f64 {
        let now = Instant::now();
        let ms = now.duration_since(self.lap).as_secs_f64() * 1000.0;
        self.lap = now;
        timings.push(label, ms);
        ms
    }

    pub fn total_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }
}
