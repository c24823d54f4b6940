//! AI-assisted lead scoring.
//!
//! The node asks an external [`LeadScorer`] for a score. Any failure of that
//! collaborator falls back to a deterministic local heuristic; the output's
//! `aiUsed` flag tells callers which path produced the result.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::fields::{lookup, str_field};
use crate::traits::{ContextMap, NodeConfig, NodeContext, NodeOutput};
use crate::{ExecutableNode, NodeError};

/// Lead fields the scorers look at, read from the context or the
/// trigger's `submittedData`.
const LEAD_FIELDS: &[&str] = &["name", "email", "phone", "company", "website", "message"];

/// Budget for one call to the external scorer.
pub const DEFAULT_SCORER_TIMEOUT: Duration = Duration::from_secs(20);

/// Room left for the heuristic fallback once the scorer budget is spent.
const FALLBACK_HEADROOM: Duration = Duration::from_secs(5);

const FREE_MAIL_DOMAINS: &[&str] = &[
    "gmail.com",
    "yahoo.com",
    "hotmail.com",
    "outlook.com",
    "libero.it",
    "icloud.com",
];

/// Result of scoring a lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadScore {
    /// 0–100.
    pub score: f64,
    pub category: String,
    /// 0–1.
    pub confidence: f64,
    pub reasoning: String,
}

/// External scoring collaborator (an AI service in production).
#[async_trait]
pub trait LeadScorer: Send + Sync {
    async fn score(&self, lead: &Map<String, Value>) -> Result<LeadScore, NodeError>;
}

/// `HOT` ≥ 80, `WARM` ≥ 60, otherwise `COLD`.
pub fn category_for(score: f64) -> &'static str {
    if score >= 80.0 {
        "HOT"
    } else if score >= 60.0 {
        "WARM"
    } else {
        "COLD"
    }
}

/// Collect the known lead fields; top-level context keys win over
/// `submittedData`.
pub fn lead_from_context(input: &ContextMap) -> Map<String, Value> {
    let mut lead = Map::new();
    for &field in LEAD_FIELDS {
        let value = str_field(input, field).map(str::to_owned).or_else(|| {
            lookup(input, &format!("submittedData.{field}"))
                .and_then(Value::as_str)
                .map(str::to_owned)
        });
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            lead.insert(field.into(), value.into());
        }
    }
    lead
}

/// Deterministic local scoring used when no scorer is configured or the
/// scorer fails.
pub fn heuristic_score(lead: &Map<String, Value>) -> LeadScore {
    let has = |key: &str| str_field(lead, key).is_some();
    let mut score: f64 = 20.0;
    let mut factors = Vec::new();

    if has("name") {
        score += 10.0;
        factors.push("name");
    }
    if let Some(email) = str_field(lead, "email") {
        score += 15.0;
        factors.push("email");
        let domain = email.rsplit('@').next().unwrap_or_default().to_ascii_lowercase();
        if !domain.is_empty() && !FREE_MAIL_DOMAINS.contains(&domain.as_str()) {
            score += 10.0;
            factors.push("business email");
        }
    }
    if has("phone") {
        score += 15.0;
        factors.push("phone");
    }
    if has("company") {
        score += 15.0;
        factors.push("company");
    }
    if has("website") {
        score += 5.0;
        factors.push("website");
    }
    if str_field(lead, "message").is_some_and(|m| m.chars().count() >= 20) {
        score += 10.0;
        factors.push("detailed message");
    }

    let score = score.min(100.0);
    let reasoning = if factors.is_empty() {
        "heuristic score: no lead signals found".to_string()
    } else {
        format!("heuristic score from {}", factors.join(", "))
    };

    LeadScore {
        score,
        category: category_for(score).to_string(),
        confidence: 0.6,
        reasoning,
    }
}

pub struct AiScoreNode {
    scorer: Option<Arc<dyn LeadScorer>>,
    scorer_timeout: Duration,
}

impl AiScoreNode {
    pub fn new(scorer: Option<Arc<dyn LeadScorer>>) -> Self {
        Self {
            scorer,
            scorer_timeout: DEFAULT_SCORER_TIMEOUT,
        }
    }

    /// A scorer slower than `timeout` is treated as failed.
    pub fn with_scorer_timeout(mut self, timeout: Duration) -> Self {
        self.scorer_timeout = timeout;
        self
    }
}

#[async_trait]
impl ExecutableNode for AiScoreNode {
    async fn execute(
        &self,
        input: &ContextMap,
        _config: &NodeConfig,
        ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let lead = lead_from_context(input);

        let (result, ai_used, ai_error) = match &self.scorer {
            None => (heuristic_score(&lead), false, None),
            Some(scorer) => {
                let scored = tokio::select! {
                    _ = ctx.cancellation.cancelled() => return Err(NodeError::Cancelled),
                    scored = tokio::time::timeout(self.scorer_timeout, scorer.score(&lead)) => scored,
                };
                match scored.unwrap_or(Err(NodeError::Timeout(self.scorer_timeout))) {
                    Ok(mut s) => {
                        s.score = s.score.clamp(0.0, 100.0);
                        s.confidence = s.confidence.clamp(0.0, 1.0);
                        (s, true, None)
                    }
                    Err(err) => {
                        warn!(node_id = %ctx.node_id, error = %err, "lead scorer failed, using heuristic");
                        (heuristic_score(&lead), false, Some(err.to_string()))
                    }
                }
            }
        };

        let mut out = Map::new();
        out.insert("score".into(), result.score.into());
        out.insert("category".into(), result.category.into());
        out.insert("confidence".into(), result.confidence.into());
        out.insert("reasoning".into(), result.reasoning.into());
        out.insert("aiUsed".into(), ai_used.into());
        if let Some(err) = ai_error {
            out.insert("aiError".into(), err.into());
        }
        Ok(out)
    }

    fn default_timeout(&self) -> Duration {
        self.scorer_timeout + FALLBACK_HEADROOM
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FixedScorer(Result<LeadScore, NodeError>);

    #[async_trait]
    impl LeadScorer for FixedScorer {
        async fn score(&self, _lead: &Map<String, Value>) -> Result<LeadScore, NodeError> {
            self.0.clone()
        }
    }

    struct HangingScorer;

    #[async_trait]
    impl LeadScorer for HangingScorer {
        async fn score(&self, _lead: &Map<String, Value>) -> Result<LeadScore, NodeError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(NodeError::fatal("unreachable"))
        }
    }

    fn input() -> ContextMap {
        json!({
            "submittedData": {
                "name": "Ada Lovelace",
                "email": "ada@analytical.engines",
                "phone": "+39 123",
                "message": "I would like to know more about your plans"
            }
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn heuristic_is_deterministic() {
        let lead = lead_from_context(&input());
        let a = heuristic_score(&lead);
        let b = heuristic_score(&lead);
        assert_eq!(a, b);
        // 20 base + 10 name + 15 email + 10 business + 15 phone + 10 message
        assert_eq!(a.score, 80.0);
        assert_eq!(a.category, "HOT");
    }

    #[test]
    fn free_mail_domains_score_lower() {
        let lead = json!({ "email": "someone@gmail.com" }).as_object().cloned().unwrap();
        assert_eq!(heuristic_score(&lead).score, 35.0);
        assert_eq!(heuristic_score(&lead).category, "COLD");
    }

    #[tokio::test]
    async fn scorer_result_is_marked_as_ai() {
        let scorer = FixedScorer(Ok(LeadScore {
            score: 140.0,
            category: "HOT".into(),
            confidence: 0.9,
            reasoning: "model".into(),
        }));
        let node = AiScoreNode::new(Some(Arc::new(scorer)));
        let out = node
            .execute(&input(), &Map::new(), &NodeContext::detached("score"))
            .await
            .unwrap();

        assert_eq!(out["aiUsed"], true);
        assert_eq!(out["score"], 100.0);
    }

    #[tokio::test]
    async fn scorer_failure_falls_back_to_heuristic() {
        let node = AiScoreNode::new(Some(Arc::new(FixedScorer(Err(NodeError::retryable("503"))))));
        let out = node
            .execute(&input(), &Map::new(), &NodeContext::detached("score"))
            .await
            .unwrap();

        assert_eq!(out["aiUsed"], false);
        assert_eq!(out["score"], 80.0);
        assert!(out.contains_key("aiError"));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_scorer_falls_back_within_the_node_timeout() {
        let node = AiScoreNode::new(Some(Arc::new(HangingScorer))).with_scorer_timeout(Duration::from_secs(2));
        assert!(node.default_timeout() > Duration::from_secs(2));

        let out = node
            .execute(&input(), &Map::new(), &NodeContext::detached("score"))
            .await
            .unwrap();

        assert_eq!(out["aiUsed"], false);
        assert_eq!(out["score"], 80.0);
        assert!(out["aiError"].as_str().unwrap().contains("timed out"));
    }
}
