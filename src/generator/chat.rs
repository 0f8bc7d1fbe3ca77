//! Generator backed by an OpenAI-compatible `/v1/chat/completions` endpoint.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::prompt::{SYSTEM_PROMPT, prioritize, render_user_prompt};
use super::{PromptContext, RecommendationGenerator};
use crate::config::GeneratorConfig;
use crate::domain::{CandidateRecommendation, Origin, Priority, Subject, Target};
use crate::error::EngineError;

#[derive(Clone)]
pub struct ChatGenerator {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_targets: usize,
}

impl std::fmt::Debug for ChatGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatGenerator")
            .field("url", &self.url)
            .field("model", &self.model)
            .field("max_targets", &self.max_targets)
            .finish_non_exhaustive()
    }
}

/// One recommendation as the model writes it. Accepts both the English and
/// the legacy Spanish field names.
#[derive(Debug, Deserialize)]
struct RawRecommendation {
    #[serde(alias = "prioridad")]
    priority: Priority,
    #[serde(alias = "cliente_rut")]
    target_id: String,
    #[serde(default, alias = "cliente_nombre")]
    target_name: String,
    #[serde(alias = "accion")]
    action: String,
    #[serde(default, alias = "razon")]
    justification: String,
    #[serde(alias = "origen")]
    origin: Origin,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAnswer {
    Wrapped {
        #[serde(alias = "sugerencias_clientes")]
        recommendations: Vec<RawRecommendation>,
    },
    List(Vec<RawRecommendation>),
}

impl ChatGenerator {
    pub fn new(cfg: &GeneratorConfig) -> anyhow::Result<Self> {
        let base_url = cfg
            .base_url
            .as_deref()
            .context("generator.base_url is not set")?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            url: format!("{}/v1/chat/completions", base_url.trim_end_matches('/')),
            api_key: cfg.api_key.clone().filter(|k| !k.trim().is_empty()),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            max_targets: cfg.max_targets_per_subject,
        })
    }
}

/// Strips a surrounding markdown code fence (```json ... ```), if any.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening line
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parses the model's answer into candidates for `subject`.
pub fn parse_answer(
    subject: &Subject,
    eligible: &[Target],
    content: &str,
) -> Result<Vec<CandidateRecommendation>, EngineError> {
    let answer: RawAnswer = serde_json::from_str(strip_code_fences(content))
        .map_err(|e| EngineError::GeneratorFailure(format!("Unparseable answer: {e}")))?;

    let raw = match answer {
        RawAnswer::Wrapped { recommendations } => recommendations,
        RawAnswer::List(list) => list,
    };

    Ok(raw
        .into_iter()
        .map(|r| {
            let target_name = if r.target_name.trim().is_empty() {
                eligible
                    .iter()
                    .find(|t| t.target_id == r.target_id)
                    .map(|t| t.name.clone())
                    .unwrap_or_default()
            } else {
                r.target_name
            };
            CandidateRecommendation {
                subject_id: subject.subject_id.clone(),
                target_id: r.target_id,
                target_name,
                priority: r.priority,
                action: r.action,
                justification: r.justification,
                origin: r.origin,
            }
        })
        .collect())
}

fn transport_error(err: &reqwest::Error) -> EngineError {
    EngineError::GeneratorFailure(err.to_string())
}

#[async_trait]
impl RecommendationGenerator for ChatGenerator {
    #[instrument(skip_all, fields(subject_id = %subject.subject_id, eligible = eligible.len()))]
    async fn generate(
        &self,
        subject: &Subject,
        eligible: &[Target],
        context: &PromptContext,
    ) -> Result<Vec<CandidateRecommendation>, EngineError> {
        let targets = prioritize(eligible, self.max_targets);
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": render_user_prompt(subject, &targets, context) },
            ],
        });

        let mut rb = self.http.post(&self.url).json(&body);
        if let Some(k) = &self.api_key {
            rb = rb.bearer_auth(k);
        }

        let resp = rb
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| transport_error(&e))?;
        let v: serde_json::Value = resp.json().await.map_err(|e| transport_error(&e))?;

        let content = v["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| EngineError::GeneratorFailure("Answer has no message content".into()))?;

        let candidates = parse_answer(subject, eligible, content)?;
        debug!(count = candidates.len(), "Generator answered");
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> Subject {
        Subject {
            subject_id: "S1".into(),
            name: "Ana".into(),
            email: None,
            targets: vec![],
            sales_context: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```\n[]\n```  "), "[]");
        assert_eq!(strip_code_fences("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_wrapped_answer() {
        let content = r#"```json
{"recommendations": [
  {"priority": "CRITICAL", "target_id": "C1", "target_name": "Acme", "action": "Visit Acme",
   "justification": "No purchases this month", "origin": "risk_analysis"}
]}
```"#;
        let candidates = parse_answer(&subject(), &[], content).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].subject_id, "S1");
        assert_eq!(candidates[0].priority, Priority::Critical);
        assert_eq!(candidates[0].origin, Origin::RiskAnalysis);
    }

    #[test]
    fn test_parse_legacy_field_names() {
        let content = r#"{"sugerencias_clientes": [
  {"prioridad": "ALTA", "cliente_rut": "65091146", "accion": "Reunión",
   "razon": "Dos reclamos pendientes", "origen": "problema_operacional"}
]}"#;
        let eligible = [Target {
            target_id: "65091146".into(),
            name: "Transportes Sur".into(),
            monthly_sales: 0.0,
            metrics: None,
            open_claims: 2,
            pickups: None,
        }];
        let candidates = parse_answer(&subject(), &eligible, content).unwrap();
        assert_eq!(candidates[0].priority, Priority::High);
        assert_eq!(candidates[0].target_name, "Transportes Sur");
        assert_eq!(candidates[0].origin, Origin::OperationalAnalysis);
    }

    #[test]
    fn test_unparseable_answer_is_a_generator_failure() {
        let err = parse_answer(&subject(), &[], "I cannot help with that").unwrap_err();
        assert!(matches!(err, EngineError::GeneratorFailure(_)));
    }
}
