//! Candidate-fact extraction from conversation.
//!
//! Two independent passes whose union forms the candidate set:
//!
//! 1. a deterministic template pass: fixed linguistic patterns with a
//!    fixed confidence per template, always runs;
//! 2. a model-assisted pass: the model is asked for a JSON array of
//!    `{type, content, confidence}`; parsing is defensive and any
//!    failure yields an empty list, never an error out of the
//!    extractor.
//!
//! Extraction produces [`Claim`]s only. Verification against the truth
//! table and storage happen downstream; nothing here writes anywhere.

use crate::memory::facts::{Claim, ClaimSource, FactKind};
use crate::provider::ModelClient;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use thiserror::Error;

/// Low temperature for the extraction call; we want consistency, not
/// creativity.
const EXTRACTION_TEMPERATURE: f64 = 0.3;

struct Template {
    regex: Regex,
    kind: FactKind,
    confidence: f64,
}

/// Linguistic templates for the deterministic pass (Korean
/// first-person statements about preferences, identity, work, and
/// habits).
static TEMPLATES: LazyLock<Vec<Template>> = LazyLock::new(|| {
    let table: &[(&str, FactKind, f64)] = &[
        (r"나는 (.+?)(?:을|를|이|가) 좋아", FactKind::Preference, 0.7),
        (r"내 이름은 (.+?)(?:이다|입니다|야|이야)", FactKind::Fact, 0.9),
        (r"나는 (.+?)(?:에서|에) (?:일하|근무)", FactKind::Fact, 0.8),
        (r"(?:매일|매주|항상)\s*(.+?)(?:한다|해)", FactKind::Habit, 0.7),
    ];
    table
        .iter()
        .map(|(pattern, kind, confidence)| Template {
            regex: Regex::new(pattern).unwrap_or_else(|e| panic!("invalid template: {e}")),
            kind: *kind,
            confidence: *confidence,
        })
        .collect()
});

/// Failure to read the model's extraction output.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no JSON array in model output")]
    MissingArray,
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// One item of the model's extraction output.
#[derive(Debug, Deserialize)]
struct RawClaim {
    #[serde(default)]
    r#type: String,
    content: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

fn default_confidence() -> f64 {
    0.7
}

/// Turns raw conversation text into candidate claims.
pub struct LearningExtractor {
    /// Subject used to normalize extracted statements ("공장장은 ...").
    owner_name: String,
}

impl LearningExtractor {
    pub fn new(owner_name: &str) -> Self {
        Self {
            owner_name: owner_name.to_string(),
        }
    }

    /// Run both passes over one user message and return their union.
    pub async fn extract(&self, client: &ModelClient, user_message: &str) -> Vec<Claim> {
        let mut claims = self.pattern_pass(user_message);

        match self.model_pass(client, user_message).await {
            Ok(mut model_claims) => claims.append(&mut model_claims),
            Err(e) => {
                // Model-assisted extraction is opportunistic; the
                // template pass already ran.
                tracing::warn!("Model extraction failed (continuing): {e}");
            }
        }

        claims
    }

    /// Deterministic template pass.
    pub fn pattern_pass(&self, text: &str) -> Vec<Claim> {
        let mut claims = Vec::new();
        for template in TEMPLATES.iter() {
            for cap in template.regex.captures_iter(text) {
                let captured = cap[1].trim();
                if captured.is_empty() {
                    continue;
                }
                claims.push(Claim::new(
                    format!("{}은 {}", self.owner_name, captured),
                    ClaimSource::Pattern,
                    template.kind,
                    template.confidence,
                ));
            }
        }
        claims
    }

    /// Model-assisted pass. Transport failure or unusable output both
    /// reduce to an empty candidate list at the call site.
    async fn model_pass(
        &self,
        client: &ModelClient,
        user_message: &str,
    ) -> anyhow::Result<Vec<Claim>> {
        let prompt = self.extraction_prompt(user_message);
        let raw = client
            .complete(
                "You are a highly observant secretary extracting structured facts.",
                &prompt,
                EXTRACTION_TEMPERATURE,
            )
            .await?;

        match Self::parse_claims(&raw) {
            Ok(claims) => {
                if !claims.is_empty() {
                    tracing::debug!(count = claims.len(), "Model extracted claims");
                }
                Ok(claims)
            }
            Err(e) => {
                tracing::warn!("Claim parse failed, treating as empty: {e}");
                Ok(Vec::new())
            }
        }
    }

    fn extraction_prompt(&self, user_message: &str) -> String {
        format!(
            "사용자의 메시지에서 학습할 만한 모든 정보를 빠짐없이 추출하세요.\n\n\
             사용자 메시지: \"{user_message}\"\n\n\
             다음을 찾아서 JSON 배열로 반환하세요:\n\
             1. 개인 선호사항 (좋아하는 것, 싫어하는 것)\n\
             2. 사실 정보 (이름, 직업, 위치, 회사, 소속)\n\
             3. 습관/패턴 (시간, 루틴, 반복적인 행동)\n\
             4. 목표/계획 (하고 싶은 것, 계획, 일정)\n\n\
             반환 형식 (JSON만):\n\
             [\n  {{\"type\": \"preference\", \"content\": \"{owner}은 커피를 좋아함\", \"confidence\": 0.9}}\n]\n\n\
             학습할 정보가 없으면: []\n\n\
             중요:\n\
             - 반드시 JSON 배열만 반환\n\
             - confidence는 0.5~1.0 사이\n\
             - content는 \"{owner}\" 주어로 시작",
            owner = self.owner_name,
        )
    }

    /// Pull the first JSON array out of model output and parse it.
    /// Explicit empty-on-error policy lives at the caller; this
    /// function reports exactly what went wrong.
    pub fn parse_claims(raw: &str) -> Result<Vec<Claim>, ParseError> {
        static ARRAY: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"\[[\s\S]*\]").unwrap());

        let trimmed = raw.trim();
        let candidate = if trimmed.starts_with('[') && trimmed.ends_with(']') {
            trimmed
        } else {
            ARRAY
                .find(trimmed)
                .map(|m| m.as_str())
                .ok_or(ParseError::MissingArray)?
        };

        let items: Vec<RawClaim> = serde_json::from_str(candidate)?;
        Ok(items
            .into_iter()
            .filter(|item| !item.content.trim().is_empty())
            .map(|item| {
                Claim::new(
                    item.content.trim().to_string(),
                    ClaimSource::Model,
                    FactKind::from_str_lossy(&item.r#type),
                    item.confidence,
                )
            })
            .collect())
    }
}

// ── Tests ────────────────────────────────────────────────────────
