//! # Language-Completion Collaborator
//!
//! The chat-completion service behind three interview features:
//! question generation during setup, the throttled realtime coaching line,
//! and the per-answer improvement used in the final summary.
//!
//! ## Degradation policy:
//! - `generate_questions` is the only method that propagates failure — setup
//!   cannot proceed without questions.
//! - `realtime_feedback` failures surface as an error Result the caller logs
//!   and swallows (the coaching line is optional).
//! - `improve_answer` never fails: unparseable responses and provider errors
//!   degrade to fallback results so summarization always completes.

use crate::config::ServicesConfig;
use crate::error::{SessionError, SessionResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

/// Structured improvement for one answered question.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ImprovedAnswer {
    /// 2-3 concrete improvements the candidate should make
    pub points: Vec<String>,
    /// A polished version of the candidate's answer
    pub suggested: String,
}

/// Contract for the language-completion collaborator.
///
/// Implementations must be `Send + Sync`; sessions share one instance.
#[async_trait]
pub trait InterviewCoach: Send + Sync {
    /// Generate `count` interview questions for the given role.
    async fn generate_questions(&self, role: &str, count: usize) -> SessionResult<Vec<String>>;

    /// One short piece of realtime coaching for the transcript so far.
    async fn realtime_feedback(&self, question: &str, transcript: &str) -> SessionResult<String>;

    /// Structured improvement for a finished answer. Never fails; degenerate
    /// and unparseable cases produce fallback results.
    async fn improve_answer(&self, question: &str, transcript: &str) -> ImprovedAnswer;
}

/// OpenAI chat-completions implementation of [`InterviewCoach`].
pub struct OpenAiCoach {
    client: reqwest::Client,
    api_key: String,
    url: String,
    model: String,
    /// Transcripts shorter than this get the canned improvement without an
    /// external call.
    min_transcript_len: usize,
}

impl OpenAiCoach {
    pub fn new(api_key: String, services: &ServicesConfig, min_transcript_len: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(services.request_timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key,
            url: services.completion_url.clone(),
            model: services.completion_model.clone(),
            min_transcript_len,
        }
    }

    /// Send one user message and return the assistant's reply text.
    async fn complete(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
        json_object: bool,
    ) -> SessionResult<String> {
        let mut body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": max_tokens,
            "temperature": temperature,
        });

        if json_object {
            body["response_format"] = json!({ "type": "json_object" });
        }

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| SessionError::from_request(e, "completion service"))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            return Err(SessionError::Service(format!(
                "completion service returned {}: {}",
                status, error_body
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SessionError::from_request(e, "completion service"))?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(|content| content.trim().to_string())
            .ok_or_else(|| {
                SessionError::Service("completion response missing message content".to_string())
            })
    }
}

#[async_trait]
impl InterviewCoach for OpenAiCoach {
    async fn generate_questions(&self, role: &str, count: usize) -> SessionResult<Vec<String>> {
        let prompt = question_generation_prompt(role, count);
        let content = self.complete(&prompt, 350, 0.7, true).await?;

        #[derive(Deserialize)]
        struct QuestionList {
            questions: Vec<String>,
        }

        let parsed: QuestionList = serde_json::from_str(&content).map_err(|e| {
            SessionError::Service(format!("question list was not valid JSON: {}", e))
        })?;

        if parsed.questions.is_empty() {
            return Err(SessionError::Service(
                "completion service returned no questions".to_string(),
            ));
        }

        debug!(role = %role, count = parsed.questions.len(), "generated interview questions");
        Ok(parsed.questions)
    }

    async fn realtime_feedback(&self, question: &str, transcript: &str) -> SessionResult<String> {
        let prompt = realtime_feedback_prompt(question, transcript);
        self.complete(&prompt, 60, 0.8, false).await
    }

    async fn improve_answer(&self, question: &str, transcript: &str) -> ImprovedAnswer {
        // Known-degenerate case: not enough signal to critique. Handled
        // uniformly here so summarization never spends a request on it.
        if transcript.trim().chars().count() < self.min_transcript_len {
            return ImprovedAnswer {
                points: vec!["Answer too short, expand with more detail.".to_string()],
                suggested: "Try elaborating more clearly on your experience.".to_string(),
            };
        }

        let prompt = improvement_prompt(question, transcript);
        match self.complete(&prompt, 300, 0.7, false).await {
            Ok(raw) => match serde_json::from_str::<ImprovedAnswer>(&raw) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(error = %e, "improvement response was not the expected structure");
                    ImprovedAnswer {
                        points: vec!["Could not parse response".to_string()],
                        suggested: transcript.to_string(),
                    }
                }
            },
            Err(e) => {
                warn!(error = %e, "improvement request failed");
                ImprovedAnswer {
                    points: vec!["Error generating improvements".to_string()],
                    suggested: transcript.to_string(),
                }
            }
        }
    }
}

fn question_generation_prompt(role: &str, count: usize) -> String {
    format!(
        "Generate a list of {count} common and relevant behavioral and technical interview \
         questions for a {role} role. Focus on questions that evaluate teamwork, \
         problem-solving, past experiences, and situational scenarios, while also assessing \
         the technical skills and knowledge required for the role. The questions should \
         encourage the candidate to provide examples from their past work and describe how \
         they've applied their technical expertise to overcome challenges. Return ONLY a \
         valid JSON object in this exact format: \
         {{\"questions\": [\"Question 1?\", \"Question 2?\", \"Question 3?\"]}}"
    )
}

fn realtime_feedback_prompt(question: &str, transcript: &str) -> String {
    format!(
        "You are an AI interview coach.\n\n\
         The interviewer asked:\n\"{question}\"\n\n\
         The candidate answered:\n\"{transcript}\"\n\n\
         Give one short, specific piece of real-time feedback (max 1-2 sentences).\n\
         - If they are speaking too fast/slow, mention pacing.\n\
         - If they use many filler words, point it out.\n\
         - If their answer seems irrelevant, tell them to focus on the actual question.\n\
         - If it's strong, praise clarity and structure.\n\n\
         Do not repeat the same structure every time. Only output the feedback sentence."
    )
}

fn improvement_prompt(question: &str, transcript: &str) -> String {
    format!(
        "You are an AI interview coach.\n\
         The interviewer asked:\n\"{question}\"\n\n\
         The candidate answered:\n\"{transcript}\"\n\n\
         Return a JSON object with:\n\
         {{\n\
           \"points\": [\"list of 2-3 concrete improvements the candidate should make\"],\n\
           \"suggested\": \"a polished version of the candidate's answer that is clear, concise, and professional\"\n\
         }}\n\n\
         Rules:\n\
         - Be supportive and constructive\n\
         - Suggestions must be realistic and actionable\n\
         - Suggested response should paraphrase, not invent new content\n\
         - IMPORTANT: Return only valid JSON, no commentary"
    )
}
