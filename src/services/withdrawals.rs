use crate::{
    context::RequestContext,
    entities::withdraw_request::{self, WithdrawStatus},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Influencer payout requests and their admin review.
#[derive(Clone)]
pub struct WithdrawalService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RequestWithdrawalInput {
    #[validate(custom = "validate_positive_amount")]
    pub amount: Decimal,
}

fn validate_positive_amount(amount: &Decimal) -> Result<(), validator::ValidationError> {
    if *amount <= Decimal::ZERO {
        return Err(validator::ValidationError::new("amount_must_be_positive"));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum ReviewDecision {
    Approve,
    Deny { reason: String },
    Complete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewWithdrawalInput {
    #[serde(flatten)]
    pub decision: ReviewDecision,
    pub admin_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalHistory {
    pub requests: Vec<withdraw_request::Model>,
    pub pending_total: Decimal,
}

impl ReviewDecision {
    /// Target status, if the transition from `current` is allowed.
    fn apply_to(&self, current: WithdrawStatus) -> Option<WithdrawStatus> {
        match (self, current) {
            (ReviewDecision::Approve, WithdrawStatus::Pending) => Some(WithdrawStatus::Approved),
            (ReviewDecision::Deny { .. }, WithdrawStatus::Pending) => Some(WithdrawStatus::Denied),
            (ReviewDecision::Complete, WithdrawStatus::Approved) => Some(WithdrawStatus::Completed),
            _ => None,
        }
    }
}

impl WithdrawalService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, ctx), fields(influencer_id = %ctx.user_id))]
    pub async fn request_withdrawal(
        &self,
        ctx: &RequestContext,
        input: RequestWithdrawalInput,
    ) -> Result<withdraw_request::Model, ServiceError> {
        ctx.require_influencer()?;
        input.validate()?;

        let now = Utc::now();
        let request = withdraw_request::ActiveModel {
            id: Set(Uuid::new_v4()),
            influencer_id: Set(ctx.user_id),
            amount: Set(input.amount),
            status: Set(WithdrawStatus::Pending),
            reason: Set(None),
            admin_notes: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            processed_at: Set(None),
        }
        .insert(&*self.db)
        .await?;

        self.event_sender
            .send_or_log(Event::WithdrawalRequested {
                request_id: request.id,
                influencer_id: request.influencer_id,
                amount: request.amount,
            })
            .await;

        info!(request_id = %request.id, amount = %request.amount, "Withdrawal requested");
        Ok(request)
    }

    #[instrument(skip(self, ctx), fields(influencer_id = %ctx.user_id))]
    pub async fn influencer_withdrawals(
        &self,
        ctx: &RequestContext,
    ) -> Result<WithdrawalHistory, ServiceError> {
        ctx.require_influencer()?;

        let requests = withdraw_request::Entity::find()
            .filter(withdraw_request::Column::InfluencerId.eq(ctx.user_id))
            .order_by_desc(withdraw_request::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let pending_total = requests
            .iter()
            .filter(|r| r.status == WithdrawStatus::Pending)
            .map(|r| r.amount)
            .sum();

        Ok(WithdrawalHistory {
            requests,
            pending_total,
        })
    }

    #[instrument(skip(self, ctx, input), fields(request_id = %request_id))]
    pub async fn review_withdrawal(
        &self,
        ctx: &RequestContext,
        request_id: Uuid,
        input: ReviewWithdrawalInput,
    ) -> Result<withdraw_request::Model, ServiceError> {
        ctx.require_admin()?;

        let request = withdraw_request::Entity::find_by_id(request_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Withdrawal request {} not found", request_id))
            })?;

        let current = request.status;
        let next = input.decision.apply_to(current).ok_or_else(|| {
            warn!(status = %current, decision = ?input.decision, "Rejected withdrawal transition");
            ServiceError::InvalidOperation(format!(
                "Cannot {:?} a withdrawal that is {}",
                input.decision, current
            ))
        })?;

        let now = Utc::now();
        let mut active: withdraw_request::ActiveModel = request.into();
        active.status = Set(next);
        if let ReviewDecision::Deny { reason } = &input.decision {
            active.reason = Set(Some(reason.clone()));
        }
        if input.admin_notes.is_some() {
            active.admin_notes = Set(input.admin_notes);
        }
        active.processed_at = Set(Some(now));
        active.updated_at = Set(now);
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::WithdrawalReviewed {
                request_id,
                status: next.to_string(),
                reviewed_at: now,
            })
            .await;

        info!("Withdrawal {} moved from {} to {}", request_id, current, next);
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::UserRole;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;
    use sea_orm::Database;
    use tokio::sync::mpsc;

    async fn service() -> WithdrawalService {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        crate::db::run_migrations(&db).await.unwrap();
        let (tx, _rx) = mpsc::channel(16);
        WithdrawalService::new(Arc::new(db), Arc::new(EventSender::new(tx)))
    }

    fn review(decision: ReviewDecision) -> ReviewWithdrawalInput {
        ReviewWithdrawalInput {
            decision,
            admin_notes: None,
        }
    }

    // ==================== Transition Tests ====================

    #[test]
    fn only_forward_transitions_are_allowed() {
        use WithdrawStatus::*;
        assert_eq!(ReviewDecision::Approve.apply_to(Pending), Some(Approved));
        assert_eq!(ReviewDecision::Complete.apply_to(Approved), Some(Completed));
        assert_eq!(
            ReviewDecision::Deny { reason: "x".into() }.apply_to(Pending),
            Some(Denied)
        );
        assert_eq!(ReviewDecision::Complete.apply_to(Pending), None);
        assert_eq!(ReviewDecision::Approve.apply_to(Denied), None);
        assert_eq!(ReviewDecision::Deny { reason: "x".into() }.apply_to(Completed), None);
    }

    #[test]
    fn review_input_wire_format() {
        let input: ReviewWithdrawalInput = serde_json::from_str(
            r#"{"decision":"deny","reason":"duplicate","admin_notes":"see ticket"}"#,
        )
        .unwrap();
        assert_eq!(
            input.decision,
            ReviewDecision::Deny {
                reason: "duplicate".into()
            }
        );
        assert_eq!(input.admin_notes.as_deref(), Some("see ticket"));
    }

    // ==================== Service Tests ====================

    #[tokio::test]
    async fn request_requires_influencer_and_positive_amount() {
        let service = service().await;
        let customer = RequestContext::new(Uuid::new_v4(), UserRole::Customer);
        let influencer = RequestContext::new(Uuid::new_v4(), UserRole::Influencer);

        let result = service
            .request_withdrawal(&customer, RequestWithdrawalInput { amount: dec!(10) })
            .await;
        assert_matches!(result, Err(ServiceError::Forbidden(_)));

        let result = service
            .request_withdrawal(&influencer, RequestWithdrawalInput { amount: dec!(0) })
            .await;
        assert_matches!(result, Err(ServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn approve_then_complete_with_pending_total() {
        let service = service().await;
        let influencer = RequestContext::new(Uuid::new_v4(), UserRole::Influencer);
        let admin = RequestContext::new(Uuid::new_v4(), UserRole::Admin);

        let first = service
            .request_withdrawal(&influencer, RequestWithdrawalInput { amount: dec!(150.00) })
            .await
            .unwrap();
        service
            .request_withdrawal(&influencer, RequestWithdrawalInput { amount: dec!(50.00) })
            .await
            .unwrap();

        let history = service.influencer_withdrawals(&influencer).await.unwrap();
        assert_eq!(history.requests.len(), 2);
        assert_eq!(history.pending_total, dec!(200.00));

        let approved = service
            .review_withdrawal(&admin, first.id, review(ReviewDecision::Approve))
            .await
            .unwrap();
        assert_eq!(approved.status, WithdrawStatus::Approved);
        assert!(approved.processed_at.is_some());

        let again = service
            .review_withdrawal(&admin, first.id, review(ReviewDecision::Approve))
            .await;
        assert_matches!(again, Err(ServiceError::InvalidOperation(_)));

        let completed = service
            .review_withdrawal(&admin, first.id, review(ReviewDecision::Complete))
            .await
            .unwrap();
        assert_eq!(completed.status, WithdrawStatus::Completed);

        let history = service.influencer_withdrawals(&influencer).await.unwrap();
        assert_eq!(history.pending_total, dec!(50.00));
    }

    #[tokio::test]
    async fn deny_stores_reason_and_notes() {
        let service = service().await;
        let influencer = RequestContext::new(Uuid::new_v4(), UserRole::Influencer);
        let admin = RequestContext::new(Uuid::new_v4(), UserRole::Admin);

        let request = service
            .request_withdrawal(&influencer, RequestWithdrawalInput { amount: dec!(75) })
            .await
            .unwrap();

        let forbidden = service
            .review_withdrawal(&influencer, request.id, review(ReviewDecision::Approve))
            .await;
        assert_matches!(forbidden, Err(ServiceError::Forbidden(_)));

        let denied = service
            .review_withdrawal(
                &admin,
                request.id,
                ReviewWithdrawalInput {
                    decision: ReviewDecision::Deny {
                        reason: "exceeds earnings".into(),
                    },
                    admin_notes: Some("checked ledger".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(denied.status, WithdrawStatus::Denied);
        assert_eq!(denied.reason.as_deref(), Some("exceeds earnings"));
        assert_eq!(denied.admin_notes.as_deref(), Some("checked ledger"));

        let missing = service
            .review_withdrawal(&admin, Uuid::new_v4(), review(ReviewDecision::Approve))
            .await;
        assert_matches!(missing, Err(ServiceError::NotFound(_)));
    }
}
