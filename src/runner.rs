//! Evaluation runner: send each unified sample to a model backend and
//! record the prediction.
//!
//! The runner only reads samples. Output keeps input order regardless of
//! concurrency, and a failed call is recorded on its sample instead of
//! aborting the run.

use crate::CuebenchError;
use crate::config::{BackendKind, ModelConfig};
use crate::unify::{Category, UnifiedSample};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

const CONV_START_PROMPT: &str = "Below is a conversation between two people: {A} and {B}. \
The conversation takes place over multiple days, \
and the date of each conversation is written at the beginning of the conversation.\n\n";

const INSTRUCTION_QA: &str = "Answer the following question based on the conversation above.\n\n";

const INSTRUCTION_COGNITIVE: &str = "Your task: This is a memory-aware dialogue setting. \
You are continuing or reflecting on a prior conversation. \
Show that you are aware of the relevant memory or context from the evidence when you respond; \
your answer should naturally connect to or acknowledge that context.\n\n";

const COGNITIVE_FALLBACK_QUESTION: &str = "Context dialogue (cue awareness)";

/// A chat model reachable with a single user prompt.
pub trait Backend: Sync {
    fn complete(&self, prompt: &str) -> Result<String, CuebenchError>;
}

impl<F> Backend for F
where
    F: Fn(&str) -> Result<String, CuebenchError> + Sync,
{
    fn complete(&self, prompt: &str) -> Result<String, CuebenchError> {
        self(prompt)
    }
}

/// Offline backend: answers with the last non-empty line of the prompt.
pub struct EchoBackend;

impl Backend for EchoBackend {
    fn complete(&self, prompt: &str) -> Result<String, CuebenchError> {
        let line = prompt
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("(empty)");
        Ok(line.to_string())
    }
}

/// OpenAI-compatible chat completions over HTTP.
pub struct ChatBackend {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    api_key: Option<String>,
}

/// `OPENAI_BASE_URL` replaces the configured endpoint when set.
pub fn resolve_endpoint(configured: &str, base_url: Option<&str>) -> String {
    match base_url.map(str::trim).filter(|b| !b.is_empty()) {
        Some(base) => format!("{}/chat/completions", base.trim_end_matches('/')),
        None => configured.to_string(),
    }
}

impl ChatBackend {
    pub fn from_config(config: &ModelConfig) -> Result<Self, CuebenchError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        let base_url = std::env::var("OPENAI_BASE_URL").ok();
        let endpoint = resolve_endpoint(&config.endpoint, base_url.as_deref());
        if api_key.is_none() && endpoint.contains("api.openai.com") {
            return Err(CuebenchError::Configuration(
                "OPENAI_API_KEY is not set".into(),
            ));
        }

        let agent = ureq::Agent::new_with_config(
            ureq::config::Config::builder()
                .timeout_global(Some(std::time::Duration::from_secs(config.timeout_secs)))
                .build(),
        );

        Ok(Self {
            agent,
            endpoint,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            api_key,
        })
    }
}

impl Backend for ChatBackend {
    fn complete(&self, prompt: &str) -> Result<String, CuebenchError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let mut request = self.agent.post(&self.endpoint);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let resp: serde_json::Value = request
            .send_json(&body)
            .map_err(|e| CuebenchError::Backend(format!("chat request: {e}")))?
            .body_mut()
            .read_json()
            .map_err(|e| CuebenchError::Backend(format!("chat response: {e}")))?;

        let text = resp
            .pointer("/choices/0/message/content")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| CuebenchError::Backend("no content in chat completion response".into()))?
            .trim();

        Ok(if text.is_empty() { "(empty)".into() } else { text.to_string() })
    }
}

pub fn make_backend(config: &ModelConfig) -> Result<Box<dyn Backend>, CuebenchError> {
    Ok(match config.backend {
        BackendKind::Echo => Box::new(EchoBackend),
        BackendKind::Openai => Box::new(ChatBackend::from_config(config)?),
    })
}

/// Conversation prefix + task instruction + prompt body.
pub fn build_model_input(sample: &UnifiedSample) -> String {
    let prefix = CONV_START_PROMPT
        .replace("{A}", sample.speaker_a.as_deref().unwrap_or("A"))
        .replace("{B}", sample.speaker_b.as_deref().unwrap_or("B"));
    let instruction = if sample.category == Category::Cognitive {
        INSTRUCTION_COGNITIVE
    } else {
        INSTRUCTION_QA
    };
    format!("{prefix}{instruction}{}", sample.input_prompt.trim())
}

/// What the judge sees as the question: the trigger for Cognitive samples,
/// the text after the last `Question:` otherwise.
pub fn question_input(sample: &UnifiedSample) -> String {
    if sample.category == Category::Cognitive {
        let trigger = sample.trigger.trim();
        return if trigger.is_empty() {
            COGNITIVE_FALLBACK_QUESTION.to_string()
        } else {
            trigger.to_string()
        };
    }
    sample
        .input_prompt
        .rsplit_once("Question:")
        .map(|(_, q)| q.trim().to_string())
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub question_input: String,
    #[serde(default)]
    pub evidence: Option<String>,
    pub category: Category,
    /// Reference answer, or `""` when the sample has none.
    pub ground_truth: serde_json::Value,
    pub prediction: Option<String>,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_gap: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn ground_truth(answer: Option<&serde_json::Value>) -> serde_json::Value {
    match answer {
        None | Some(serde_json::Value::Null) => serde_json::Value::String(String::new()),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => {
            serde_json::Value::String(String::new())
        }
        Some(v) => v.clone(),
    }
}

pub fn predict_one(sample: &UnifiedSample, backend: &dyn Backend, model: &str) -> Prediction {
    let result = if sample.input_prompt.trim().is_empty() {
        Err(CuebenchError::MalformedRecord("empty input prompt".into()))
    } else {
        backend.complete(&build_model_input(sample))
    };
    let (prediction, error) = match result {
        Ok(p) => (Some(p), None),
        Err(e) => {
            log::warn!("sample {}: {e}", sample.id);
            (None, Some(e.to_string()))
        }
    };
    Prediction {
        id: sample.id.clone(),
        question_input: question_input(sample),
        evidence: sample.evidence.clone(),
        category: sample.category.clone(),
        ground_truth: ground_truth(sample.answer.as_ref()),
        prediction,
        model: model.to_string(),
        time_gap: sample.time_gap.clone().filter(|g| !g.is_empty()),
        error,
    }
}

/// Run `f` over `items` on a pool of `concurrency` threads, keeping order.
pub(crate) fn map_bounded<T, U, F>(items: &[T], concurrency: usize, f: F) -> Result<Vec<U>, CuebenchError>
where
    T: Sync,
    U: Send,
    F: Fn(&T) -> U + Sync + Send,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(concurrency.max(1))
        .build()
        .map_err(|e| CuebenchError::Configuration(format!("thread pool: {e}")))?;
    Ok(pool.install(|| items.par_iter().map(&f).collect()))
}

pub fn run_predictions(
    samples: &[UnifiedSample],
    backend: &dyn Backend,
    model: &str,
    concurrency: usize,
) -> Result<Vec<Prediction>, CuebenchError> {
    map_bounded(samples, concurrency, |s| predict_one(s, backend, model))
}

pub fn handle_evaluate(config: &ModelConfig, input: &Path, out: &Path) -> Result<(), CuebenchError> {
    let samples: Vec<UnifiedSample> = crate::read_json(input)?;
    let backend = make_backend(config)?;
    log::info!(
        "evaluating {} samples with {} ({:?}, concurrency {})",
        samples.len(),
        config.model,
        config.backend,
        config.concurrency
    );
    let predictions = run_predictions(&samples, backend.as_ref(), &config.model, config.concurrency)?;
    crate::write_json(out, &predictions)?;
    let failed = predictions.iter().filter(|p| p.error.is_some()).count();
    eprintln!(
        "cuebench: wrote {} predictions to {} ({failed} failed)",
        predictions.len(),
        out.display()
    );
    Ok(())
}
