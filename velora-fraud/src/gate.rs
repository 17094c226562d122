use crate::counters::CounterStore;
use crate::scoring::{self, Decision, FraudSignal, Indicator, Scorecard};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use velora_core::EngineError;

/// Gate policy. Detection always runs and always persists; `enforce`
/// gates only whether a block decision rejects the call, so dev and
/// production share one code path and the assessment data stays
/// meaningful in every mode.
#[derive(Debug, Clone, Deserialize)]
pub struct FraudPolicy {
    pub enforce: bool,
    pub payment_rate_limit_per_minute: u64,
    pub dedup_window_secs: u64,
    pub velocity_window_secs: u64,
}

impl Default for FraudPolicy {
    fn default() -> Self {
        Self {
            enforce: true,
            payment_rate_limit_per_minute: 20,
            dedup_window_secs: 120,
            velocity_window_secs: 3600,
        }
    }
}

/// A payment submission as seen at order creation, before the order row
/// exists.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub user_id: i64,
    pub amount_minor: i64,
    pub is_cod: bool,
    pub max_item_quantity: u32,
    pub client_ip: String,
}

#[derive(Debug, Clone)]
pub struct NewFraudAssessment {
    pub trace_id: Uuid,
    pub user_id: i64,
    pub order_id: Option<i64>,
    pub amount_minor: i64,
    pub score: u32,
    pub indicators: Vec<Indicator>,
    pub decision: Decision,
    pub enforced: bool,
}

/// Immutable once written; kept even when the overall call is rejected
/// so the back office can audit every decision.
#[derive(Debug, Clone, Serialize)]
pub struct FraudAssessment {
    pub id: i64,
    pub trace_id: Uuid,
    pub user_id: i64,
    pub order_id: Option<i64>,
    pub amount_minor: i64,
    pub score: u32,
    pub indicators: Vec<Indicator>,
    pub decision: Decision,
    pub enforced: bool,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait AssessmentStore: Send + Sync {
    async fn persist(
        &self,
        assessment: NewFraudAssessment,
    ) -> Result<FraudAssessment, EngineError>;

    /// Stamps the order id once the order row exists.
    async fn attach_order(&self, trace_id: Uuid, order_id: i64) -> Result<(), EngineError>;
}

pub struct FraudGate {
    counters: Arc<dyn CounterStore>,
    assessments: Arc<dyn AssessmentStore>,
    policy: FraudPolicy,
}

impl FraudGate {
    pub fn new(
        counters: Arc<dyn CounterStore>,
        assessments: Arc<dyn AssessmentStore>,
        policy: FraudPolicy,
    ) -> Self {
        Self {
            counters,
            assessments,
            policy,
        }
    }

    /// Pre-transition guard at order creation/payment. Order of checks:
    /// rate limit, duplicate, then heuristic scoring. The assessment is
    /// persisted on every scored path, pass or block.
    pub async fn check_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<FraudAssessment, EngineError> {
        let rate_key = format!("fraud:rate:payment_{}", request.user_id);
        let attempts = self.counters.hit(&rate_key, 60).await?;
        if attempts > self.policy.payment_rate_limit_per_minute {
            tracing::warn!(
                user_id = request.user_id,
                attempts,
                "payment rate limit tripped"
            );
            return Err(EngineError::RateLimited(format!(
                "payment_{}",
                request.user_id
            )));
        }

        let dedup_key = format!(
            "fraud:dedup:{}:{}",
            request.user_id, request.amount_minor
        );
        if !self
            .counters
            .acquire_once(&dedup_key, self.policy.dedup_window_secs)
            .await?
        {
            let assessment = self
                .persist(
                    request,
                    Scorecard {
                        score: Indicator::DuplicateSubmission.weight(),
                        indicators: vec![Indicator::DuplicateSubmission],
                        decision: Decision::Block,
                    },
                )
                .await?;
            tracing::warn!(
                user_id = request.user_id,
                trace_id = %assessment.trace_id,
                "duplicate payment submission"
            );
            return Err(EngineError::DuplicateSubmission(format!(
                "identical submission from user {} within {}s",
                request.user_id, self.policy.dedup_window_secs
            )));
        }

        let recent_order_count = self
            .counters
            .hit(
                &format!("fraud:vel:order:{}", request.user_id),
                self.policy.velocity_window_secs,
            )
            .await?;
        let distinct_users_on_ip = self
            .counters
            .add_member(
                &format!("fraud:ip:{}", request.client_ip),
                &request.user_id.to_string(),
                self.policy.velocity_window_secs,
            )
            .await?;
        let first_seen = self
            .counters
            .first_seen(&format!("fraud:acct:{}", request.user_id))
            .await?;
        let account_age_secs = (Utc::now().timestamp() - first_seen).max(0);

        let card = scoring::score(&FraudSignal {
            user_id: request.user_id,
            amount_minor: request.amount_minor,
            is_cod: request.is_cod,
            max_item_quantity: request.max_item_quantity,
            recent_order_count,
            distinct_users_on_ip,
            account_age_secs,
        });

        let blocked = card.decision == Decision::Block;
        let assessment = self.persist(request, card).await?;

        tracing::info!(
            user_id = request.user_id,
            trace_id = %assessment.trace_id,
            score = assessment.score,
            decision = assessment.decision.as_str(),
            "fraud assessment recorded"
        );

        if blocked && self.policy.enforce {
            return Err(EngineError::FraudBlocked {
                score: assessment.score,
                trace_id: assessment.trace_id,
            });
        }

        Ok(assessment)
    }

    pub async fn attach_order(&self, trace_id: Uuid, order_id: i64) -> Result<(), EngineError> {
        self.assessments.attach_order(trace_id, order_id).await
    }

    async fn persist(
        &self,
        request: &PaymentRequest,
        card: Scorecard,
    ) -> Result<FraudAssessment, EngineError> {
        self.assessments
            .persist(NewFraudAssessment {
                trace_id: Uuid::new_v4(),
                user_id: request.user_id,
                order_id: None,
                amount_minor: request.amount_minor,
                score: card.score,
                indicators: card.indicators,
                decision: card.decision,
                enforced: self.policy.enforce,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::MemoryCounterStore;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryAssessments {
        rows: Mutex<Vec<FraudAssessment>>,
    }

    #[async_trait]
    impl AssessmentStore for MemoryAssessments {
        async fn persist(
            &self,
            a: NewFraudAssessment,
        ) -> Result<FraudAssessment, EngineError> {
            let mut rows = self.rows.lock().unwrap();
            let row = FraudAssessment {
                id: rows.len() as i64 + 1,
                trace_id: a.trace_id,
                user_id: a.user_id,
                order_id: a.order_id,
                amount_minor: a.amount_minor,
                score: a.score,
                indicators: a.indicators,
                decision: a.decision,
                enforced: a.enforced,
                created_at: Utc::now(),
            };
            rows.push(row.clone());
            Ok(row)
        }

        async fn attach_order(&self, trace_id: Uuid, order_id: i64) -> Result<(), EngineError> {
            let mut rows = self.rows.lock().unwrap();
            if let Some(row) = rows.iter_mut().find(|r| r.trace_id == trace_id) {
                row.order_id = Some(order_id);
            }
            Ok(())
        }
    }

    fn gate_with(policy: FraudPolicy) -> (FraudGate, Arc<MemoryAssessments>) {
        let assessments = Arc::new(MemoryAssessments::default());
        let gate = FraudGate::new(
            Arc::new(MemoryCounterStore::new()),
            assessments.clone(),
            policy,
        );
        (gate, assessments)
    }

    fn request(amount_minor: i64) -> PaymentRequest {
        PaymentRequest {
            user_id: 42,
            amount_minor,
            is_cod: false,
            max_item_quantity: 1,
            client_ip: "203.0.113.9".to_string(),
        }
    }

    #[tokio::test]
    async fn twentieth_attempt_passes_twenty_first_is_rate_limited() {
        // Enforcement off: the velocity indicators fire over this burst,
        // but the rate ceiling must trip regardless of mode.
        let (gate, _) = gate_with(FraudPolicy {
            enforce: false,
            ..FraudPolicy::default()
        });
        for i in 0..20 {
            // Distinct amounts so the dedup lock stays out of the way.
            let result = gate.check_payment(&request(1_000 + i)).await;
            assert!(result.is_ok(), "attempt {} should pass: {result:?}", i + 1);
        }
        let err = gate.check_payment(&request(5_000)).await.unwrap_err();
        assert!(matches!(err, EngineError::RateLimited(_)));
    }

    #[tokio::test]
    async fn identical_resubmission_is_blocked_and_still_persisted() {
        let (gate, assessments) = gate_with(FraudPolicy::default());
        gate.check_payment(&request(2_500)).await.unwrap();
        let err = gate.check_payment(&request(2_500)).await.unwrap_err();
        assert!(matches!(err, EngineError::DuplicateSubmission(_)));

        let rows = assessments.rows.lock().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].decision, Decision::Block);
        assert_eq!(rows[1].indicators, vec![Indicator::DuplicateSubmission]);
    }

    #[tokio::test]
    async fn block_is_reported_but_not_enforced_when_policy_disables_it() {
        let (gate, assessments) = gate_with(FraudPolicy {
            enforce: false,
            ..FraudPolicy::default()
        });
        // Fresh account (+25) with a high-amount COD order over the
        // ceiling (+30 +20) scores 75.
        let assessment = gate
            .check_payment(&PaymentRequest {
                is_cod: true,
                ..request(250_000)
            })
            .await
            .unwrap();
        assert_eq!(assessment.decision, Decision::Block);
        assert!(assessment.score >= 50);
        assert!(!assessments.rows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn enforced_block_persists_the_assessment_before_failing() {
        let (gate, assessments) = gate_with(FraudPolicy::default());
        let err = gate
            .check_payment(&PaymentRequest {
                is_cod: true,
                ..request(250_000)
            })
            .await
            .unwrap_err();
        match err {
            EngineError::FraudBlocked { score, trace_id } => {
                let rows = assessments.rows.lock().unwrap();
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].score, score);
                assert_eq!(rows[0].trace_id, trace_id);
            }
            other => panic!("expected FraudBlocked, got {other:?}"),
        }
    }
}
