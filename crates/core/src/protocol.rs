use crate::coach::Coach;
use crate::error::{SynthesisError, TrainingError};
use crate::punch::Sequence;
use crate::session_state::{ResultSummary, ScoredResult, SessionRegistry, SessionState};
use crate::speech::{AudioBuffer, SpeechClient};
use serde::Serialize;
use std::sync::Arc;

/// Spoken when a session starts.
pub const START_SCRIPT: &str = "Alright champion, let's get ready for some training! I'm Cus, and I'll be your coach today.
Remember, boxing isn't just about throwing punches - it's about precision, timing, and staying focused.
Keep your guard up, stay light on your feet, and follow my lead.
Let's begin!";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NextSequence {
    pub sequence: String,
    pub description: String,
    pub motivational_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitAck {
    pub message: &'static str,
    pub num_correct: u32,
}

/// Outcome of a scored submission, with the aggregates it produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredSubmission {
    #[serde(flatten)]
    pub summary: ResultSummary,
    pub total_punches: u64,
    pub current_streak: u32,
    pub best_streak: u32,
    pub best_score: f64,
}

/// Outcome of starting a session with the spoken welcome.
///
/// The reset is committed whatever happened to `audio`.
#[derive(Debug)]
pub struct StartOutcome {
    pub state: SessionState,
    pub audio: Result<AudioBuffer, SynthesisError>,
}

/// The training operations, each scoped to one session id.
#[derive(Clone)]
pub struct Trainer {
    registry: Arc<SessionRegistry>,
    coach: Coach,
    speech: SpeechClient,
}

impl Trainer {
    pub fn new(registry: Arc<SessionRegistry>, coach: Coach, speech: SpeechClient) -> Self {
        Self {
            registry,
            coach,
            speech,
        }
    }

    /// Replaces the session with a fresh, stamped one.
    pub async fn start_session(&self, session_id: &str) -> Result<SessionState, TrainingError> {
        let session = self.registry.session(session_id).await?;
        let mut state = session.lock().await;
        state.log_state(session_id, "start_session [before]");
        *state = SessionState::started();
        state.log_state(session_id, "start_session [after]");
        Ok(state.clone())
    }

    /// Starts the session and synthesizes the welcome script concurrently.
    pub async fn start_session_with_speech(
        &self,
        session_id: &str,
    ) -> Result<StartOutcome, TrainingError> {
        // The reset only waits on the session lock and synthesis only on the
        // provider, so neither delays the other. A speech failure never undoes
        // the reset.
        let (state, audio) = tokio::join!(
            self.start_session(session_id),
            self.speech.synthesize(START_SCRIPT)
        );
        let state = state?;
        if let Err(e) = &audio {
            tracing::warn!(session_id, error = %e, "welcome speech unavailable");
        }
        Ok(StartOutcome { state, audio })
    }

    /// Generates a combination and its coaching message.
    ///
    /// Works whether or not the session was started.
    pub async fn next_sequence(
        &self,
        session_id: &str,
        length: i64,
    ) -> Result<NextSequence, TrainingError> {
        let sequence = Sequence::generate(length, &mut rand::thread_rng())?;
        let description = sequence.description();

        let session = self.registry.session(session_id).await?;
        let mut state = session.lock().await;
        state.log_state(session_id, "next_sequence [before]");

        // The lock stays held across the coaching call so the prompt and the
        // recorded sequence see the same state. Other sessions are unaffected.
        let motivational_message = self
            .coach
            .generate_message(&description, state.num_last_correct)
            .await;

        state.current_sequence = sequence.digits();
        state.log_state(session_id, "next_sequence [after]");

        Ok(NextSequence {
            sequence: sequence.digits(),
            description,
            motivational_message,
        })
    }

    /// Records how many punches of the last combination landed.
    pub async fn submit_result(
        &self,
        session_id: &str,
        num_correct: u32,
    ) -> Result<SubmitAck, TrainingError> {
        let session = self.registry.session(session_id).await?;
        let mut state = session.lock().await;
        state.log_state(session_id, "submit_result [before]");
        state.num_last_correct = num_correct;
        state.log_state(session_id, "submit_result [after]");
        Ok(SubmitAck {
            message: "Results submitted successfully",
            num_correct,
        })
    }

    /// Scores a per-punch accuracy report and folds it into the aggregates.
    pub async fn submit_scored_result(
        &self,
        session_id: &str,
        result: &ScoredResult,
    ) -> Result<ScoredSubmission, TrainingError> {
        let (sequence, summary) = result.summarize()?;

        let session = self.registry.session(session_id).await?;
        let mut state = session.lock().await;
        state.log_state(session_id, "submit_scored_result [before]");
        state.record_score(&summary, sequence.len());
        state.log_state(session_id, "submit_scored_result [after]");

        Ok(ScoredSubmission {
            summary,
            total_punches: state.total_punches,
            current_streak: state.current_streak,
            best_streak: state.best_streak,
            best_score: state.best_score,
        })
    }

    /// Reads the session without creating it; unknown ids read as idle.
    pub async fn get_state(&self, session_id: &str) -> Result<SessionState, TrainingError> {
        let Some(session) = self.registry.get(session_id).await? else {
            return Ok(SessionState::new());
        };
        let state = session.lock().await;
        state.log_state(session_id, "get_state");
        Ok(state.clone())
    }

    /// Discards the session, leaving it idle.
    ///
    /// The entry leaves the registry; a missing entry reads as a fresh state.
    pub async fn reset_state(&self, session_id: &str) -> Result<SessionState, TrainingError> {
        if let Some(session) = self.registry.remove(session_id).await? {
            // Wait out any operation still holding the old entry.
            let state = session.lock().await;
            state.log_state(session_id, "reset_state [before]");
        }
        let state = SessionState::new();
        state.log_state(session_id, "reset_state [after]");
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coach::{FALLBACK_MESSAGE, MockLanguageModel};
    use crate::error::CollaboratorError;
    use crate::session_state::{DEFAULT_SESSION_ID, SessionPhase};
    use crate::speech::{AudioChunkStream, MockTextToSpeech};
    use bytes::Bytes;
    use futures_util::{StreamExt, stream};

    fn silent_speech() -> SpeechClient {
        let mut tts = MockTextToSpeech::new();
        tts.expect_stream_speech()
            .returning(|_text, _voice| Box::pin(async move { Err(SynthesisError::MissingCredential) }));
        SpeechClient::new(Arc::new(tts))
    }

    fn failing_coach() -> Coach {
        let mut llm = MockLanguageModel::new();
        llm.expect_complete()
            .returning(|_prompt, _max| Box::pin(async move { Err(CollaboratorError::MissingCredential) }));
        Coach::new(Arc::new(llm), 100)
    }

    fn trainer(coach: Coach, speech: SpeechClient) -> Trainer {
        Trainer::new(Arc::new(SessionRegistry::new()), coach, speech)
    }

    #[tokio::test]
    async fn test_next_sequence_records_sequence_and_passes_last_correct() {
        // --- 1. Arrange ---
        let mut llm = MockLanguageModel::new();
        llm.expect_complete()
            .withf(|prompt, _max| prompt.contains("They got 3 punches correct"))
            .returning(|_prompt, _max| Box::pin(async move { Ok("Snap that jab!".to_string()) }))
            .once();
        let trainer = trainer(Coach::new(Arc::new(llm), 100), silent_speech());
        trainer.start_session(DEFAULT_SESSION_ID).await.unwrap();
        trainer.submit_result(DEFAULT_SESSION_ID, 3).await.unwrap();

        // --- 2. Act ---
        let next = trainer.next_sequence(DEFAULT_SESSION_ID, 5).await.unwrap();

        // --- 3. Assert ---
        assert_eq!(next.sequence.len(), 5);
        assert_eq!(next.motivational_message, "Snap that jab!");
        assert_eq!(next.description, Sequence::parse(&next.sequence).unwrap().description());
        let state = trainer.get_state(DEFAULT_SESSION_ID).await.unwrap();
        assert_eq!(state.current_sequence, next.sequence);
    }

    #[tokio::test]
    async fn test_next_sequence_rejects_bad_length_without_touching_state() {
        let trainer = trainer(failing_coach(), silent_speech());
        let err = trainer.next_sequence(DEFAULT_SESSION_ID, 21).await.unwrap_err();
        assert!(matches!(err, TrainingError::InvalidArgument(_)));
        assert!(trainer.next_sequence(DEFAULT_SESSION_ID, 0).await.is_err());

        let state = trainer.get_state(DEFAULT_SESSION_ID).await.unwrap();
        assert_eq!(state.current_sequence, "");
    }

    #[tokio::test]
    async fn test_next_sequence_is_lenient_and_falls_back() {
        let trainer = trainer(failing_coach(), silent_speech());

        let next = trainer.next_sequence(DEFAULT_SESSION_ID, 1).await.unwrap();

        assert_eq!(next.motivational_message, FALLBACK_MESSAGE);
        let state = trainer.get_state(DEFAULT_SESSION_ID).await.unwrap();
        assert_eq!(state.phase(), SessionPhase::Idle);
        assert_eq!(state.current_sequence, next.sequence);
    }

    #[tokio::test]
    async fn test_end_to_end_submit_then_reset() {
        let trainer = trainer(failing_coach(), silent_speech());

        let started = trainer.start_session(DEFAULT_SESSION_ID).await.unwrap();
        assert_eq!(started.phase(), SessionPhase::Active);
        trainer.next_sequence(DEFAULT_SESSION_ID, 5).await.unwrap();
        let ack = trainer.submit_result(DEFAULT_SESSION_ID, 3).await.unwrap();
        assert_eq!(ack.num_correct, 3);

        let state = trainer.get_state(DEFAULT_SESSION_ID).await.unwrap();
        assert_eq!(state.num_last_correct, 3);
        assert_eq!(state.current_sequence.len(), 5);

        let reset = trainer.reset_state(DEFAULT_SESSION_ID).await.unwrap();
        assert_eq!(reset, SessionState::new());
        assert_eq!(trainer.get_state(DEFAULT_SESSION_ID).await.unwrap(), SessionState::new());
    }

    #[tokio::test]
    async fn test_start_session_clears_previous_state() {
        let trainer = trainer(failing_coach(), silent_speech());
        trainer.next_sequence(DEFAULT_SESSION_ID, 4).await.unwrap();
        trainer.submit_result(DEFAULT_SESSION_ID, 2).await.unwrap();
        let report = ScoredResult {
            sequence: "12".to_string(),
            accuracy: vec![1.0, 1.0],
            total_time: 1.0,
        };
        trainer.submit_scored_result(DEFAULT_SESSION_ID, &report).await.unwrap();

        let state = trainer.start_session(DEFAULT_SESSION_ID).await.unwrap();

        assert_eq!(state.num_last_correct, 0);
        assert_eq!(state.current_sequence, "");
        assert!(state.session_scores.is_empty());
        assert_eq!(state.total_punches, 0);
        assert!(state.start_time.is_some());
    }

    #[tokio::test]
    async fn test_scored_submission_feeds_aggregates_only() {
        let trainer = trainer(failing_coach(), silent_speech());
        trainer.start_session(DEFAULT_SESSION_ID).await.unwrap();
        let report = ScoredResult {
            sequence: "12".to_string(),
            accuracy: vec![1.0, 0.5],
            total_time: 0.0,
        };

        let scored = trainer
            .submit_scored_result(DEFAULT_SESSION_ID, &report)
            .await
            .unwrap();

        assert_eq!(scored.summary.average_accuracy, 75.0);
        assert_eq!(scored.summary.punches_per_second, 0.0);
        assert_eq!(scored.total_punches, 2);
        let state = trainer.get_state(DEFAULT_SESSION_ID).await.unwrap();
        assert_eq!(state.session_scores, vec![75.0]);
        assert_eq!(state.num_last_correct, 0);

        let mismatched = ScoredResult {
            accuracy: vec![1.0],
            ..report
        };
        assert!(
            trainer
                .submit_scored_result(DEFAULT_SESSION_ID, &mismatched)
                .await
                .is_err()
        );
        assert_eq!(trainer.get_state(DEFAULT_SESSION_ID).await.unwrap().total_punches, 2);
    }

    #[tokio::test]
    async fn test_start_with_speech_commits_reset_even_when_speech_fails() {
        let trainer = trainer(failing_coach(), silent_speech());
        trainer.submit_result(DEFAULT_SESSION_ID, 9).await.unwrap();

        let outcome = trainer
            .start_session_with_speech(DEFAULT_SESSION_ID)
            .await
            .unwrap();

        assert!(matches!(outcome.audio, Err(SynthesisError::MissingCredential)));
        assert_eq!(outcome.state.num_last_correct, 0);
        let state = trainer.get_state(DEFAULT_SESSION_ID).await.unwrap();
        assert_eq!(state.phase(), SessionPhase::Active);
        assert_eq!(state.num_last_correct, 0);
    }

    #[tokio::test]
    async fn test_start_with_speech_returns_welcome_audio() {
        let mut tts = MockTextToSpeech::new();
        tts.expect_stream_speech()
            .withf(|text, _voice| text.starts_with("Alright champion"))
            .returning(|_text, _voice| {
                let audio: AudioChunkStream =
                    stream::iter(vec![Ok(Bytes::from_static(b"ID3"))]).boxed();
                Box::pin(async move { Ok(audio) })
            })
            .once();
        let trainer = trainer(failing_coach(), SpeechClient::new(Arc::new(tts)));

        let outcome = trainer
            .start_session_with_speech(DEFAULT_SESSION_ID)
            .await
            .unwrap();

        assert_eq!(outcome.audio.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated_by_id() {
        let trainer = trainer(failing_coach(), silent_speech());
        trainer.submit_result("ring-a", 4).await.unwrap();
        trainer.reset_state("ring-b").await.unwrap();

        assert_eq!(trainer.get_state("ring-a").await.unwrap().num_last_correct, 4);
        assert_eq!(trainer.get_state("ring-b").await.unwrap().num_last_correct, 0);
    }

    #[tokio::test]
    async fn test_get_state_of_unknown_session_does_not_register_it() {
        let registry = Arc::new(SessionRegistry::new());
        let trainer = Trainer::new(registry.clone(), failing_coach(), silent_speech());

        for i in 0..50 {
            let state = trainer.get_state(&format!("visitor-{i}")).await.unwrap();
            assert_eq!(state, SessionState::new());
        }

        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn test_reset_state_drops_the_session() {
        // --- 1. Arrange ---
        let registry = Arc::new(SessionRegistry::new());
        let trainer = Trainer::new(registry.clone(), failing_coach(), silent_speech());
        trainer.start_session("ring-a").await.unwrap();
        trainer.submit_result("ring-a", 3).await.unwrap();
        assert_eq!(registry.len().await, 1);

        // --- 2. Act ---
        let reset = trainer.reset_state("ring-a").await.unwrap();

        // --- 3. Assert ---
        assert_eq!(reset, SessionState::new());
        assert_eq!(registry.len().await, 0);
        assert_eq!(trainer.get_state("ring-a").await.unwrap(), SessionState::new());
        // Resetting a session that does not exist is still fine.
        assert!(trainer.reset_state("never-seen").await.is_ok());
    }

    #[tokio::test]
    async fn test_full_registry_turns_away_new_sessions() {
        let registry = Arc::new(SessionRegistry::with_capacity(1));
        let trainer = Trainer::new(registry.clone(), failing_coach(), silent_speech());
        trainer.start_session("ring-a").await.unwrap();

        let err = trainer.submit_result("ring-b", 2).await.unwrap_err();

        assert!(matches!(err, TrainingError::Capacity(_)));
        // Reads still work and the existing session is untouched.
        assert_eq!(trainer.get_state("ring-b").await.unwrap(), SessionState::new());
        assert_eq!(trainer.get_state("ring-a").await.unwrap().phase(), SessionPhase::Active);
    }
}
