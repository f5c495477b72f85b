// 🤖 LLM Matcher - chat-completions endpoint picks among candidates
//
// One request per entry, JSON-object response:
//   {"category_id": "..", "confidence": 0.85, "match_type": "closeMatch", "reasoning": ".."}
//
// The HTTP client enforces the per-call timeout. Every failure (network,
// status, empty or unparsable body, missing fields) is a MatchError for
// that entry only.

use super::{MatchOutcome, Matcher, MAX_CANDIDATES};
use crate::alignment::MatchType;
use crate::config::{LlmConfig, ENV_LLM_API_KEY, ENV_LLM_ENDPOINT};
use crate::error::{ConfigError, MatchError};
use crate::source::ExternalEntry;
use crate::taxonomy::Category;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const SYSTEM_PROMPT: &str = "You are a building materials expert. Respond with valid JSON only.";

// ============================================================================
// API TYPES
// ============================================================================

#[derive(Serialize)]
struct ChatRequest {
    messages: Vec<ChatMessage>,
    max_completion_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Expected JSON structure from the model
#[derive(Debug, Deserialize)]
struct MatchAnswer {
    category_id: String,
    confidence: f64,
    #[serde(default)]
    match_type: Option<String>,
    #[serde(default)]
    reasoning: String,
}

// ============================================================================
// MATCHER
// ============================================================================

pub struct LlmMatcher {
    http: reqwest::blocking::Client,
    url: String,
    api_key: String,
    max_completion_tokens: u32,
    timeout: Duration,
}

impl LlmMatcher {
    pub fn new(settings: &LlmConfig, timeout: Duration) -> Result<Self, ConfigError> {
        let endpoint = settings
            .endpoint
            .as_deref()
            .ok_or(ConfigError::MissingCredential(ENV_LLM_ENDPOINT))?;
        let api_key = settings
            .api_key
            .clone()
            .ok_or(ConfigError::MissingCredential(ENV_LLM_API_KEY))?;

        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Invalid {
                field: "llm",
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(LlmMatcher {
            http,
            url: format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint.trim_end_matches('/'),
                settings.deployment,
                settings.api_version
            ),
            api_key,
            max_completion_tokens: settings.max_completion_tokens,
            timeout,
        })
    }

    fn complete(&self, prompt: String) -> Result<String, MatchError> {
        let request = ChatRequest {
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt,
                },
            ],
            max_completion_tokens: self.max_completion_tokens,
            response_format: ResponseFormat {
                format_type: "json_object".to_string(),
            },
        };

        let response = self
            .http
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(&request)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    MatchError::Timeout(self.timeout.as_millis())
                } else {
                    MatchError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&error_text)
                .map(|e| e.error.message)
                .unwrap_or(error_text);
            return Err(MatchError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: ChatResponse = response.json().map_err(|e| MatchError::Parse(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(MatchError::EmptyResponse)
    }
}

impl Matcher for LlmMatcher {
    fn method(&self) -> &str {
        "llm-only"
    }

    fn match_entry(&self, entry: &ExternalEntry, candidates: &[&Category]) -> Result<MatchOutcome, MatchError> {
        if candidates.is_empty() {
            return Err(MatchError::NoCandidates(entry.code().to_string()));
        }

        let content = self.complete(build_prompt(entry, candidates))?;
        debug!(code = entry.code(), "raw model response: {}", content);

        parse_answer(&content)
    }
}

// ============================================================================
// PROMPT + RESPONSE PARSING
// ============================================================================

pub fn build_prompt(entry: &ExternalEntry, candidates: &[&Category]) -> String {
    let mut listing = String::new();
    for (i, cat) in candidates.iter().take(MAX_CANDIDATES).enumerate() {
        listing.push_str(&format!(
            "{}. ID: {}\n   Name (German): {}\n   Path: {}\n",
            i + 1,
            cat.id(),
            cat.native_label(),
            cat.native_path()
        ));
        if let Some(path) = cat.resolved_path() {
            listing.push_str(&format!("   Path (English): {}\n", path));
        }
    }

    let definition = if entry.definition().is_empty() {
        "Not provided"
    } else {
        entry.definition()
    };

    format!(
        "You are an expert in building materials and construction product classification.

Your task: Match this English building product to the most appropriate German Ökobaudat category.

ENGLISH PRODUCT:
Name: {name}
Definition: {definition}

GERMAN ÖKOBAUDAT CATEGORIES (choose from):
{listing}
Instructions:
1. Understand both the English product and the German category names
2. Match based on actual material type and use case
3. Determine confidence (0.0-1.0) - be realistic!
4. Choose match type:
   - exactMatch (0.9-1.0): Same concept
   - closeMatch (0.7-0.89): Very similar
   - relatedMatch (0.5-0.69): Related
   - noMatch (<0.5): No good match

Respond ONLY with valid JSON:
{{
  \"category_id\": \"selected ID\",
  \"confidence\": 0.85,
  \"match_type\": \"exactMatch\",
  \"reasoning\": \"Brief explanation\"
}}",
        name = entry.name(),
        definition = definition,
        listing = listing
    )
}

/// Strip a surrounding Markdown code fence (``` or ```json)
fn strip_fences(content: &str) -> &str {
    let trimmed = content.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            rest.strip_suffix("```").unwrap_or(rest).trim()
        }
        None => trimmed,
    }
}

pub fn parse_answer(content: &str) -> Result<MatchOutcome, MatchError> {
    let body = strip_fences(content);
    if body.is_empty() {
        return Err(MatchError::EmptyResponse);
    }

    let answer: MatchAnswer = match serde_json::from_str(body) {
        Ok(a) => a,
        Err(first_err) => {
            // Prose around the object: take the outermost braces
            let start = body.find('{');
            let end = body.rfind('}');
            match (start, end) {
                (Some(open), Some(close)) if open < close => serde_json::from_str(&body[open..=close])
                    .map_err(|e| MatchError::Parse(format!("{} (raw: {})", e, content)))?,
                _ => return Err(MatchError::Parse(format!("{} (raw: {})", first_err, content))),
            }
        }
    };

    let mut outcome = MatchOutcome::new(answer.category_id.trim(), answer.confidence, answer.reasoning.trim());
    outcome.proposed_band = answer.match_type.as_deref().and_then(MatchType::from_skos_label);
    Ok(outcome)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::CategoryTree;

    #[test]
    fn test_parse_plain_json() {
        let outcome = parse_answer(
            r#"{"category_id": "1.3.13", "confidence": 0.92, "match_type": "exactMatch", "reasoning": "Gypsum board"}"#,
        )
        .unwrap();

        assert_eq!(outcome.selected_id, "1.3.13");
        assert_eq!(outcome.confidence, 0.92);
        assert_eq!(outcome.proposed_band, Some(MatchType::Exact));
        assert_eq!(outcome.rationale, "Gypsum board");
    }

    #[test]
    fn test_parse_fenced_json() {
        let content = "```json\n{\"category_id\": \"2.1\", \"confidence\": 0.6, \"match_type\": \"relatedMatch\", \"reasoning\": \"x\"}\n```";
        let outcome = parse_answer(content).unwrap();
        assert_eq!(outcome.selected_id, "2.1");
        assert_eq!(outcome.proposed_band, Some(MatchType::Related));

        let bare_fence = "```\n{\"category_id\": \"2.1\", \"confidence\": 0.6}\n```";
        assert_eq!(parse_answer(bare_fence).unwrap().proposed_band, None);
    }

    #[test]
    fn test_parse_json_with_prose() {
        let content = "Here is my answer: {\"category_id\": \"4\", \"confidence\": 0.3, \"reasoning\": \"weak\"} Hope it helps.";
        assert_eq!(parse_answer(content).unwrap().selected_id, "4");
    }

    #[test]
    fn test_parse_failures() {
        assert_eq!(parse_answer("   ").unwrap_err(), MatchError::EmptyResponse);
        assert_eq!(parse_answer("```json\n```").unwrap_err(), MatchError::EmptyResponse);
        assert!(matches!(parse_answer("not json at all"), Err(MatchError::Parse(_))));
        // Missing confidence
        assert!(matches!(parse_answer(r#"{"category_id": "1"}"#), Err(MatchError::Parse(_))));
    }

    #[test]
    fn test_prompt_lists_candidates() {
        let mut tree = CategoryTree::new();
        tree.insert("1", "Mineralische Baustoffe", None).unwrap();
        tree.insert("1.3.13", "Gipsplatten", Some("1")).unwrap();
        let candidates: Vec<&Category> = tree.iter().collect();
        let entry = ExternalEntry::new("EC1", "Gypsum board", "", "https://example.org/etim", None).unwrap();

        let prompt = build_prompt(&entry, &candidates);
        assert!(prompt.contains("Name: Gypsum board"));
        assert!(prompt.contains("Definition: Not provided"));
        assert!(prompt.contains("2. ID: 1.3.13\n   Name (German): Gipsplatten\n   Path: Mineralische Baustoffe/Gipsplatten"));
        assert!(prompt.contains("\"category_id\": \"selected ID\""));
    }

    #[test]
    fn test_new_requires_credentials() {
        let settings = LlmConfig::default();
        assert_eq!(
            LlmMatcher::new(&settings, Duration::from_secs(5)).err(),
            Some(ConfigError::MissingCredential(ENV_LLM_ENDPOINT))
        );
    }
}
