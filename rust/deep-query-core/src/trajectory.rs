//! Trajectory Recorder.
//!
//! Append-only log of every step taken while building one document's tree.
//! The recorder is the sole writer of its own log
//! and never drops a step, even when a step's own serialization fails.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

/// Category of a recorded step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepType {
    Generation,
    Validation,
    Extraction,
    Search,
    Integration,
    Error,
}

/// One entry in the trajectory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectoryStep {
    pub step_id: String,
    pub step_name: String,
    pub step_type: StepType,
    pub input_digest: String,
    pub output_digest: String,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub scores: HashMap<String, f64>,
    pub metadata: HashMap<String, Value>,
}

/// Rollup statistics attached on `finalize`, meant for an external exporter's `stats` view.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrajectoryStats {
    pub web_searches: u32,
    pub llm_calls: u32,
    pub depth: u32,
    pub size: usize,
    pub total_duration_ms: u64,
}

/// The full trajectory for one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectoryRecord {
    pub trajectory_id: String,
    pub document_id: String,
    pub steps: Vec<TrajectoryStep>,
    pub cancelled: bool,
    pub stats: TrajectoryStats,
}

/// Builder-style recorder; not `Clone`/`Send`-shared, one per document
/// being processed: construction of one document's tree is single-threaded and cooperative.
#[derive(Debug)]
pub struct TrajectoryRecorder {
    trajectory_id: String,
    document_id: String,
    steps: Vec<TrajectoryStep>,
    cancelled: bool,
    web_searches: u32,
    llm_calls: u32,
    #[expect(dead_code, reason = "kept for a future wall-clock reporting field")]
    started: Instant,
}

impl TrajectoryRecorder {
    #[must_use]
    pub fn start(document_id: impl Into<String>) -> Self {
        let trajectory_id = Uuid::new_v4().to_string();
        info!(trajectory_id, "trajectory started");
        Self {
            trajectory_id,
            document_id: document_id.into(),
            steps: Vec::new(),
            cancelled: false,
            web_searches: 0,
            llm_calls: 0,
            started: Instant::now(),
        }
    }

    #[must_use]
    pub fn trajectory_id(&self) -> &str {
        &self.trajectory_id
    }

    /// Records a step. Never panics: if `step` somehow cannot be recorded
    /// (this implementation cannot fail, but the contract is preserved for
    /// callers that build `TrajectoryStep` from fallible serialization),
    /// an `error`-typed step is stored in its place.
    pub fn record(&mut self, step_name: impl Into<String>, step_type: StepType, success: bool, started_at: Instant, scores: HashMap<String, f64>, metadata: HashMap<String, Value>) {
        let step_name = step_name.into();
        match step_type {
            StepType::Search => self.web_searches += 1,
            StepType::Generation | StepType::Validation | StepType::Extraction => self.llm_calls += 1,
            StepType::Integration | StepType::Error => {}
        }
        let step = TrajectoryStep {
            step_id: Uuid::new_v4().to_string(),
            step_name,
            step_type,
            input_digest: digest_of(&metadata.get("input").cloned().unwrap_or(Value::Null)),
            output_digest: digest_of(&metadata.get("output").cloned().unwrap_or(Value::Null)),
            success,
            started_at: Utc::now(),
            duration_ms: started_at.elapsed().as_millis() as u64,
            scores,
            metadata,
        };
        self.steps.push(step);
    }

    /// Records a fallback error step when a caller's own serialization of a
    /// step has failed; the recorder itself never drops the slot.
    pub fn record_error(&mut self, step_name: impl Into<String>, error: impl Into<String>) {
        let step_name = step_name.into();
        let error = error.into();
        warn!(step_name, error, "trajectory step recorded as error fallback");
        self.steps.push(TrajectoryStep {
            step_id: Uuid::new_v4().to_string(),
            step_name,
            step_type: StepType::Error,
            input_digest: String::new(),
            output_digest: String::new(),
            success: false,
            started_at: Utc::now(),
            duration_ms: 0,
            scores: HashMap::new(),
            metadata: HashMap::from([("error".to_string(), Value::String(error))]),
        });
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    #[must_use]
    pub fn llm_calls(&self) -> u32 {
        self.llm_calls
    }

    #[must_use]
    pub fn web_searches(&self) -> u32 {
        self.web_searches
    }

    /// Closes the trajectory and attaches final rollup stats.
    #[must_use]
    pub fn finalize(self, depth: u32, size: usize) -> TrajectoryRecord {
        let total_duration_ms = self.steps.iter().map(|s| s.duration_ms).sum();
        info!(
            trajectory_id = self.trajectory_id,
            steps = self.steps.len(),
            depth,
            size,
            "trajectory finalized"
        );
        TrajectoryRecord {
            trajectory_id: self.trajectory_id,
            document_id: self.document_id,
            steps: self.steps,
            cancelled: self.cancelled,
            stats: TrajectoryStats {
                web_searches: self.web_searches,
                llm_calls: self.llm_calls,
                depth,
                size,
                total_duration_ms,
            },
        }
    }
}

fn digest_of(value: &Value) -> String {
    let serialized = serde_json::to_string(value).unwrap_or_default();
    format!("{:x}", simple_hash(&serialized))
}

/// A cheap, dependency-free content digest; this is for trajectory-level
/// auditing, not cryptographic integrity.
fn simple_hash(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in s.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_increments_call_counters_by_type() {
        let mut recorder = TrajectoryRecorder::start("doc1");
        recorder.record("root_gen", StepType::Generation, true, Instant::now(), HashMap::new(), HashMap::new());
        recorder.record("search", StepType::Search, true, Instant::now(), HashMap::new(), HashMap::new());
        assert_eq!(recorder.llm_calls(), 1);
        assert_eq!(recorder.web_searches(), 1);
    }

    #[test]
    fn finalize_rolls_up_stats_and_preserves_step_count() {
        let mut recorder = TrajectoryRecorder::start("doc1");
        recorder.record("root_gen", StepType::Generation, true, Instant::now(), HashMap::new(), HashMap::new());
        recorder.record_error("broken_step", "serialization failed");
        let record = recorder.finalize(1, 2);
        assert_eq!(record.steps.len(), 2);
        assert_eq!(record.stats.llm_calls, 1);
        assert!(!record.steps[1].success);
    }

    #[test]
    fn digest_is_stable_for_identical_values() {
        let a = digest_of(&Value::String("hello".to_string()));
        let b = digest_of(&Value::String("hello".to_string()));
        assert_eq!(a, b);
    }
}
