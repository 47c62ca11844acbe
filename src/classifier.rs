// 🤖 Suspicious Payee Classifier
// Delegates judgment to a remote completion model, then parses its answer
// back into transactions drawn from the input batch.
//
// Output is advisory: the same batch can be judged differently on two calls.

use crate::config::ClassifierConfig;
use crate::error::DetectionError;
use crate::transaction::{FraudType, PossibleFraudInstance, Transaction};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::thread;
use tracing::{debug, warn};

// ============================================================================
// SEAMS
// ============================================================================

/// Anything that can flag suspicious payees in a batch.
///
/// Implementations return one `suspicious_payee` finding per flagged
/// transaction, and only transactions taken from `batch`.
pub trait PayeeClassifier: Send + Sync {
    fn name(&self) -> &str;

    fn classify(&self, batch: &[Transaction]) -> Result<Vec<PossibleFraudInstance>, DetectionError>;
}

/// Single-shot, stateless text completion
pub trait CompletionClient: Send + Sync {
    fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, DetectionError>;
}

// ============================================================================
// PROMPT
// ============================================================================

pub const SYSTEM_PROMPT: &str = r#"You are a data analyst reviewing bank transaction records for suspicious activity.

A transaction is suspicious if its memo, payee, or description field is vague or incoherent, is written in a language other than English, or references a company that may be based in a nation known for conducting financial fraud, such as China, Russia, or North Korea.

The user message is a JSON array of transactions. Respond with a single JSON object and nothing else: no explanation, no Markdown code fence. The object must have this shape:

{"transactions": [{"id": string, "posted": integer, "amount": string, "description": string, "payee": string, "memo": string}]}

Every entry must be copied unchanged from the input array. If no transaction is suspicious, respond with {"transactions": []}."#;

/// Serialize the batch exactly as the model will see it
pub fn serialize_batch(batch: &[Transaction]) -> Result<String, DetectionError> {
    serde_json::to_string_pretty(batch)
        .map_err(|e| DetectionError::ClassifierResponseInvalid(format!("failed to serialize batch: {}", e)))
}

// ============================================================================
// RESPONSE PARSING
// ============================================================================

/// Parse the model's answer into transactions from `batch`.
///
/// Tolerates whitespace, a Markdown fence, and prose (braces included) around
/// the first complete JSON object. Each id must exist in `batch`; the batch's own copy is
/// returned so nothing fabricated reaches the caller. Repeated ids are
/// returned once, in first-seen order.
pub fn parse_classifier_response(
    raw: &str,
    batch: &[Transaction],
) -> Result<Vec<Transaction>, DetectionError> {
    let value = first_json_object(raw)?;

    let entries = value
        .get("transactions")
        .ok_or_else(|| invalid("response is missing the `transactions` key"))?
        .as_array()
        .ok_or_else(|| invalid("`transactions` is not a list"))?;

    let by_id: HashMap<&str, &Transaction> = batch.iter().map(|tx| (tx.id.as_str(), tx)).collect();
    let mut seen = HashSet::new();
    let mut flagged = Vec::new();

    for (i, entry) in entries.iter().enumerate() {
        let id = entry
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid(format!("entry #{} has no string `id`", i)))?;

        let original = by_id
            .get(id)
            .ok_or_else(|| invalid(format!("entry #{} references unknown transaction id {:?}", i, id)))?;

        if !echoes(entry, original) {
            debug!(id, "classifier entry differs from the input record; using the input copy");
        }

        if seen.insert(id) {
            flagged.push((*original).clone());
        }
    }

    Ok(flagged)
}

fn invalid(message: impl Into<String>) -> DetectionError {
    DetectionError::ClassifierResponseInvalid(message.into())
}

/// The first JSON object embedded in `raw`, ignoring anything around it
fn first_json_object(raw: &str) -> Result<Value, DetectionError> {
    let mut last_error = None;

    for (start, _) in raw.match_indices('{') {
        let mut stream = serde_json::Deserializer::from_str(&raw[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value)) if value.is_object() => return Ok(value),
            Some(Err(e)) => last_error = Some(e),
            _ => {}
        }
    }

    Err(match last_error {
        Some(e) => invalid(format!("response is not valid JSON: {}", e)),
        None => invalid("response contains no JSON object"),
    })
}

/// Whether the model copied the record faithfully
fn echoes(entry: &Value, original: &Transaction) -> bool {
    serde_json::from_value::<Transaction>(entry.clone())
        .map(|tx| &tx == original)
        .unwrap_or(false)
}

// ============================================================================
// LLM-BACKED CLASSIFIER
// ============================================================================

pub struct LlmPayeeClassifier<C: CompletionClient> {
    client: C,
}

impl<C: CompletionClient> LlmPayeeClassifier<C> {
    pub fn new(client: C) -> Self {
        LlmPayeeClassifier { client }
    }
}

impl<C: CompletionClient> PayeeClassifier for LlmPayeeClassifier<C> {
    fn name(&self) -> &str {
        "llm"
    }

    fn classify(&self, batch: &[Transaction]) -> Result<Vec<PossibleFraudInstance>, DetectionError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let payload = serialize_batch(batch)?;
        let raw = self.client.complete(SYSTEM_PROMPT, &payload)?;
        debug!(bytes = raw.len(), "classifier response received");

        let flagged = parse_classifier_response(&raw, batch)?;
        Ok(flagged
            .into_iter()
            .map(|tx| PossibleFraudInstance::single(tx, FraudType::SuspiciousPayee))
            .collect())
    }
}

// ============================================================================
// OPENAI-COMPATIBLE CLIENT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Blocking client for `{base_url}/chat/completions`
pub struct OpenAiCompletionClient {
    http: reqwest::blocking::Client,
    api_key: String,
    endpoint: String,
    model: String,
    config: ClassifierConfig,
}

impl OpenAiCompletionClient {
    pub fn new(config: &ClassifierConfig) -> Result<Self, DetectionError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| DetectionError::ClassifierUnavailable("no API key configured".to_string()))?;

        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| DetectionError::ClassifierUnavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_key,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            config: config.clone(),
        })
    }

    fn send_once(&self, system_prompt: &str, user_prompt: &str) -> Result<String, DetectionError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system".to_string(), content: system_prompt.to_string() },
                ChatMessage { role: "user".to_string(), content: user_prompt.to_string() },
            ],
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .map_err(|e| {
                let what = if e.is_timeout() { "request timed out" } else { "request failed" };
                DetectionError::ClassifierUnavailable(format!("{}: {}", what, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(DetectionError::ClassifierUnavailable(format!(
                "HTTP {}: {}",
                status,
                truncate(&body, 200)
            )));
        }

        let body = response
            .text()
            .map_err(|e| DetectionError::ClassifierUnavailable(format!("failed to read response: {}", e)))?;

        extract_completion(&body)
    }
}

impl CompletionClient for OpenAiCompletionClient {
    fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, DetectionError> {
        with_retries(&self.config, || self.send_once(system_prompt, user_prompt))
    }
}

/// Run `send` until it succeeds, retrying only `ClassifierUnavailable`
/// up to `max_retries` extra times with doubling backoff.
fn with_retries<F>(config: &ClassifierConfig, mut send: F) -> Result<String, DetectionError>
where
    F: FnMut() -> Result<String, DetectionError>,
{
    let mut attempt = 0;
    loop {
        match send() {
            Err(DetectionError::ClassifierUnavailable(reason)) if attempt < config.max_retries => {
                let delay = config.backoff(attempt);
                warn!(attempt = attempt + 1, ?delay, %reason, "classifier request failed, retrying");
                thread::sleep(delay);
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Pull `choices[0].message.content` out of a chat completion body
pub fn extract_completion(body: &str) -> Result<String, DetectionError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| invalid(format!("unexpected completion envelope: {}", e)))?;

    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| invalid("completion has no choices"))
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

// ============================================================================
// TESTS
// ============================================================================
