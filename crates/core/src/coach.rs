use crate::error::CollaboratorError;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Spoken whenever the language model cannot produce a message.
pub const FALLBACK_MESSAGE: &str = "Let's crush this combo! Stay focused and give it your all!";

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: Message,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub content: Option<String>,
}

// A text-completion provider. The coach only ever needs one prompt in and one
// string out, so the trait stays that narrow; tests script it through
// `MockLanguageModel`.
#[async_trait]
#[cfg_attr(test, automock)]
pub trait LanguageModel: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        max_output_tokens: u32,
    ) -> Result<String, CollaboratorError>;
}

/// Chat Completions client for the OpenAI API.
pub struct OpenAiChatClient {
    client: Client,
    api_key: Option<String>,
    model: String,
}

impl OpenAiChatClient {
    pub fn new(api_key: Option<String>, model: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatClient {
    async fn complete(
        &self,
        prompt: &str,
        max_output_tokens: u32,
    ) -> Result<String, CollaboratorError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(CollaboratorError::MissingCredential)?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
            "max_completion_tokens": max_output_tokens
        });

        let resp = self
            .client
            .post(CHAT_COMPLETIONS_URL)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CollaboratorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let resp = resp.json::<LlmResponse>().await?;
        let content = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(CollaboratorError::EmptyCompletion);
        }
        Ok(content)
    }
}

/// Produces the short motivational line that accompanies every combination.
#[derive(Clone)]
pub struct Coach {
    model: Arc<dyn LanguageModel>,
    max_output_tokens: u32,
}

impl Coach {
    pub fn new(model: Arc<dyn LanguageModel>, max_output_tokens: u32) -> Self {
        Self {
            model,
            max_output_tokens,
        }
    }

    pub fn build_prompt(sequence_description: &str, last_correct: u32) -> String {
        let last_performance = if last_correct > 0 {
            format!("They got {last_correct} punches correct in their last sequence. ")
        } else {
            String::new()
        };
        format!(
            "As a boxing coach, give a short, energetic motivational message (max 30 words) to encourage \
             your athlete during their training. {last_performance}You could even give them feedback on how \
             they can improve their form, although that is not always necessary. The next combination \
             they'll practice is: {sequence_description}. DO NOT include any emojis or symbols that cannot \
             be easily said aloud."
        )
    }

    /// Asks the model for a message, surfacing every failure.
    pub async fn try_generate_message(
        &self,
        sequence_description: &str,
        last_correct: u32,
    ) -> Result<String, CollaboratorError> {
        let prompt = Self::build_prompt(sequence_description, last_correct);
        tracing::debug!(%prompt, "requesting coaching message");
        let message = self.model.complete(&prompt, self.max_output_tokens).await?;
        let message = message.trim();
        if message.is_empty() {
            return Err(CollaboratorError::EmptyCompletion);
        }
        Ok(message.to_string())
    }

    /// Never fails and never returns an empty string.
    pub async fn generate_message(&self, sequence_description: &str, last_correct: u32) -> String {
        match self
            .try_generate_message(sequence_description, last_correct)
            .await
        {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "coaching message unavailable, using fallback");
                FALLBACK_MESSAGE.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn coach_with(mock: MockLanguageModel) -> Coach {
        Coach::new(Arc::new(mock), 100)
    }

    #[tokio::test]
    async fn test_generate_message_returns_model_output() {
        // --- 1. Arrange ---
        let mut mock = MockLanguageModel::new();
        mock.expect_complete()
            .withf(|prompt, max| prompt.contains("1 (Jab) → 2 (Cross)") && *max == 100)
            .returning(|_prompt, _max| Box::pin(async move { Ok("  Hands up, champ!  ".to_string()) }))
            .once();

        // --- 2. Act ---
        let message = coach_with(mock)
            .generate_message("1 (Jab) → 2 (Cross)", 0)
            .await;

        // --- 3. Assert ---
        assert_eq!(message, "Hands up, champ!");
    }

    #[tokio::test]
    async fn test_generate_message_falls_back_on_error() {
        let mut mock = MockLanguageModel::new();
        mock.expect_complete()
            .returning(|_prompt, _max| {
                Box::pin(async move { Err(CollaboratorError::MissingCredential) })
            })
            .once();

        let message = coach_with(mock).generate_message("1 (Jab)", 3).await;
        assert_eq!(message, FALLBACK_MESSAGE);
    }

    #[tokio::test]
    async fn test_generate_message_falls_back_on_blank_completion() {
        let mut mock = MockLanguageModel::new();
        mock.expect_complete()
            .returning(|_prompt, _max| Box::pin(async move { Ok("   \n".to_string()) }))
            .once();

        let coach = coach_with(mock);
        assert!(matches!(
            coach.try_generate_message("1 (Jab)", 0).await,
            Err(CollaboratorError::EmptyCompletion)
        ));
    }

    #[tokio::test]
    async fn test_blank_completion_yields_fallback_text() {
        let mut mock = MockLanguageModel::new();
        mock.expect_complete()
            .returning(|_prompt, _max| Box::pin(async move { Ok(String::new()) }))
            .once();

        let message = coach_with(mock).generate_message("1 (Jab)", 0).await;
        assert!(!message.is_empty());
        assert_eq!(message, FALLBACK_MESSAGE);
    }

    #[test]
    fn test_prompt_mentions_last_performance_only_when_positive() {
        let with_hint = Coach::build_prompt("1 (Jab)", 4);
        assert!(with_hint.contains("They got 4 punches correct"));

        let without_hint = Coach::build_prompt("1 (Jab)", 0);
        assert!(!without_hint.contains("punches correct"));
        assert!(without_hint.contains("The next combination they'll practice is: 1 (Jab)."));
    }

    // Live call against the OpenAI API. Run with `cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn test_live_coaching_message() {
        dotenvy::dotenv_override().ok();
        let api_key = env::var("OPENAI_API_KEY").expect("OPENAI_API_KEY not set");
        let client = OpenAiChatClient::new(
            Some(api_key),
            "gpt-4o-mini".to_string(),
            Duration::from_secs(15),
        )
        .unwrap();
        let coach = Coach::new(Arc::new(client), 100);

        let message = coach
            .try_generate_message("1 (Jab) → 2 (Cross) → 3 (Left Hook)", 2)
            .await
            .expect("live completion failed");
        println!("Coach says: {message}");
        assert!(!message.is_empty());
    }
}
