use crate::error::TrainingError;
use crate::punch::Sequence;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Session used when a client does not name one.
pub const DEFAULT_SESSION_ID: &str = "default";
const MAX_SESSION_ID_LEN: usize = 64;
/// Sessions kept at once before idle ones are evicted.
pub const MAX_SESSIONS: usize = 1024;

/// Mean accuracy a scored combination needs to extend the streak.
pub const STREAK_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Idle,
    Active,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionState {
    pub current_sequence: String,
    pub num_last_correct: u32,
    pub session_scores: Vec<f64>,
    pub total_punches: u64,
    pub best_score: f64,
    pub current_streak: u32,
    pub best_streak: u32,
    pub start_time: Option<DateTime<Local>>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            current_sequence: String::new(),
            num_last_correct: 0,
            session_scores: vec![],
            total_punches: 0,
            best_score: 0.0,
            current_streak: 0,
            best_streak: 0,
            start_time: None,
        }
    }

    /// A fresh state stamped with the current time.
    pub fn started() -> Self {
        Self {
            start_time: Some(Local::now()),
            ..Self::new()
        }
    }

    pub fn phase(&self) -> SessionPhase {
        if self.start_time.is_some() {
            SessionPhase::Active
        } else {
            SessionPhase::Idle
        }
    }

    /// Folds one scored combination into the aggregates.
    pub fn record_score(&mut self, summary: &ResultSummary, punches: usize) {
        self.session_scores.push(summary.average_accuracy);
        self.total_punches += punches as u64;
        if summary.average_accuracy > self.best_score {
            self.best_score = summary.average_accuracy;
        }
        if summary.average_accuracy >= STREAK_THRESHOLD * 100.0 {
            self.current_streak += 1;
            self.best_streak = self.best_streak.max(self.current_streak);
        } else {
            self.current_streak = 0;
        }
    }

    pub fn log_state(&self, session_id: &str, operation: &str) {
        tracing::debug!(
            session_id,
            operation,
            phase = ?self.phase(),
            current_sequence = %self.current_sequence,
            num_last_correct = self.num_last_correct,
            total_punches = self.total_punches,
            best_score = self.best_score,
            current_streak = self.current_streak,
            best_streak = self.best_streak,
            "session state"
        );
    }
}

/// Per-punch accuracy report for one combination.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScoredResult {
    pub sequence: String,
    pub accuracy: Vec<f64>,
    pub total_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSummary {
    /// Mean accuracy in percent.
    pub average_accuracy: f64,
    pub punches_per_second: f64,
    pub rating: &'static str,
}

pub fn rating_for(mean_accuracy: f64) -> &'static str {
    if mean_accuracy >= 0.9 {
        "Excellent!"
    } else if mean_accuracy >= 0.8 {
        "Great job!"
    } else if mean_accuracy >= 0.7 {
        "Good work!"
    } else {
        "Keep practicing!"
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl ScoredResult {
    /// Validates the report and computes its summary. Pure.
    pub fn summarize(&self) -> Result<(Sequence, ResultSummary), TrainingError> {
        let sequence = Sequence::parse(&self.sequence)?;
        if self.accuracy.len() != sequence.len() {
            return Err(TrainingError::invalid(format!(
                "Expected {} accuracy values for sequence '{}', got {}",
                sequence.len(),
                self.sequence,
                self.accuracy.len()
            )));
        }
        if let Some(bad) = self
            .accuracy
            .iter()
            .find(|a| !a.is_finite() || !(0.0..=1.0).contains(*a))
        {
            return Err(TrainingError::invalid(format!(
                "Accuracy values must be between 0 and 1, got {bad}"
            )));
        }

        let mean = self.accuracy.iter().sum::<f64>() / self.accuracy.len() as f64;
        let punches_per_second = if self.total_time > 0.0 {
            sequence.len() as f64 / self.total_time
        } else {
            0.0
        };

        let summary = ResultSummary {
            average_accuracy: round2(mean * 100.0),
            punches_per_second: round2(punches_per_second),
            rating: rating_for(mean),
        };
        Ok((sequence, summary))
    }
}

/// Shared handle to one session's state.
pub type SessionHandle = Arc<Mutex<SessionState>>;

/// Live sessions keyed by id.
///
/// Each entry carries its own lock; holding it gives one operation exclusive
/// access to that session while others proceed. A missing entry is the same as
/// a fresh idle session, so only sessions that have been written are stored.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    max_sessions: usize,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_capacity(MAX_SESSIONS)
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
        }
    }

    pub fn validate_id(session_id: &str) -> Result<(), TrainingError> {
        if session_id.is_empty() || session_id.len() > MAX_SESSION_ID_LEN {
            return Err(TrainingError::invalid(format!(
                "session_id must be 1 to {MAX_SESSION_ID_LEN} characters"
            )));
        }
        Ok(())
    }

    /// Looks a session up without creating it.
    pub async fn get(&self, session_id: &str) -> Result<Option<SessionHandle>, TrainingError> {
        Self::validate_id(session_id)?;
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    /// Returns the session handle for a write, creating an idle session on
    /// first use.
    ///
    /// When the registry is full, idle sessions nobody is using are evicted
    /// first; if none can go the call fails with `Capacity`.
    pub async fn session(&self, session_id: &str) -> Result<SessionHandle, TrainingError> {
        if let Some(existing) = self.get(session_id).await? {
            return Ok(existing);
        }
        let mut sessions = self.sessions.write().await;
        if !sessions.contains_key(session_id) && sessions.len() >= self.max_sessions {
            // Under the write lock no new handles can be cloned out, so a
            // strong count of one means the map holds the only reference.
            sessions.retain(|_, handle| {
                let unused = Arc::strong_count(handle) == 1;
                let idle = handle
                    .try_lock()
                    .map(|state| state.phase() == SessionPhase::Idle)
                    .unwrap_or(false);
                !(unused && idle)
            });
            if sessions.len() >= self.max_sessions {
                tracing::warn!(session_id, max = self.max_sessions, "session registry full");
                return Err(TrainingError::Capacity(format!(
                    "Too many active sessions (limit {})",
                    self.max_sessions
                )));
            }
        }
        let entry = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(SessionState::new())));
        Ok(entry.clone())
    }

    /// Drops the session; later reads see a fresh idle state.
    pub async fn remove(&self, session_id: &str) -> Result<Option<SessionHandle>, TrainingError> {
        Self::validate_id(session_id)?;
        Ok(self.sessions.write().await.remove(session_id))
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
