//! # HTTP Routes
//!
//! ```text
//! GET  /health                         DB ping
//! GET  /api/plans                      active plans
//! POST /api/pricing/quote              PriceQuote for a plan and optional coupon
//! POST /api/coupons/validate           { valid, error }
//! POST /api/coupons/redeem             record a redemption after payment capture
//! POST /api/posts                      schedule a post (any legacy document shape)
//!
//! POST /internal/dispatch              run one dispatch cycle        ┐
//! GET  /internal/posts/stats           counts by status              │ X-Dispatch-Secret
//! GET  /internal/posts/failed          failed posts                  │
//! POST /internal/posts/{id}/requeue    failed → pending              ┘
//! ```

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiQuery};
use crate::state::AppState;
use postcraft_core::normalize::normalize_post_document;
use postcraft_core::pricing::{calculate_price_quote, validate_coupon_for_user};
use postcraft_core::validation::validate_identifier;
use postcraft_core::{CouponRedemption, Plan, PriceQuote, ScheduledPost};
use postcraft_db::{PostStats, RedeemOutcome, RedeemRequest};
use postcraft_dispatch::CycleSummary;

pub const DISPATCH_SECRET_HEADER: &str = "x-dispatch-secret";

const DEFAULT_FAILED_LIMIT: u32 = 100;

/// Builds the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/plans", get(list_plans))
        .route("/api/pricing/quote", post(quote))
        .route("/api/coupons/validate", post(validate_coupon))
        .route("/api/coupons/redeem", post(redeem_coupon))
        .route("/api/posts", post(schedule_post))
        .route("/internal/dispatch", post(run_dispatch))
        .route("/internal/posts/stats", get(post_stats))
        .route("/internal/posts/failed", get(failed_posts))
        .route("/internal/posts/{id}/requeue", post(requeue_post))
        .with_state(state)
}

// =============================================================================
// Request / Response Bodies
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub plan_id: String,
    #[serde(default)]
    pub coupon_code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateCouponRequest {
    pub code: String,
    pub plan_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateCouponResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemCouponRequest {
    pub code: String,
    pub user_id: String,
    pub plan_id: String,
    pub payment_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemCouponResponse {
    /// False when the payment had already been redeemed.
    pub created: bool,
    pub redemption: CouponRedemption,
}

#[derive(Debug, Deserialize)]
pub struct FailedQuery {
    pub limit: Option<u32>,
}

// =============================================================================
// Public Handlers
// =============================================================================

async fn health(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    if state.db.health_check().await {
        Ok(Json(json!({ "status": "ok" })))
    } else {
        Err(ApiError::Unavailable("database unreachable".to_string()))
    }
}

async fn list_plans(State(state): State<AppState>) -> ApiResult<Json<Vec<Plan>>> {
    Ok(Json(state.db.plans().list_active().await?))
}

async fn active_plan(state: &AppState, plan_id: &str) -> ApiResult<Plan> {
    state
        .db
        .plans()
        .get_active(plan_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Plan not found: {}", plan_id)))
}

async fn quote(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<QuoteRequest>,
) -> ApiResult<Json<PriceQuote>> {
    let plan = active_plan(&state, &req.plan_id).await?;

    let coupon = match req.coupon_code.as_deref() {
        Some(code) => state.db.coupons().get_by_code(code).await?,
        None => None,
    };

    let quote = calculate_price_quote(
        Some(plan.price()),
        req.coupon_code.as_deref(),
        coupon.as_ref(),
        Some(&plan.id),
        Utc::now(),
    )?;

    debug!(plan_id = %plan.id, valid = quote.valid, final_amount = quote.final_amount, "Quote computed");
    Ok(Json(quote))
}

async fn validate_coupon(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ValidateCouponRequest>,
) -> ApiResult<Json<ValidateCouponResponse>> {
    let plan = active_plan(&state, &req.plan_id).await?;
    let coupons = state.db.coupons();
    let coupon = coupons.get_by_code(&req.code).await?;
    let now = Utc::now();

    let quote = calculate_price_quote(
        Some(plan.price()),
        Some(&req.code),
        coupon.as_ref(),
        Some(&plan.id),
        now,
    )?;

    if !quote.valid {
        return Ok(Json(ValidateCouponResponse {
            valid: false,
            error: quote.error,
        }));
    }

    if let (Some(coupon), Some(user_id)) = (coupon.as_ref(), req.user_id.as_deref()) {
        let used = coupons.count_user_redemptions(&coupon.id, user_id).await?;
        if let Err(reason) = validate_coupon_for_user(coupon, Some(&plan.id), used, now) {
            return Ok(Json(ValidateCouponResponse {
                valid: false,
                error: Some(reason.to_string()),
            }));
        }
    }

    Ok(Json(ValidateCouponResponse {
        valid: true,
        error: None,
    }))
}

async fn redeem_coupon(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RedeemCouponRequest>,
) -> ApiResult<impl IntoResponse> {
    let request = RedeemRequest {
        code: req.code,
        user_id: validate_identifier("userId", &req.user_id)?,
        plan_id: validate_identifier("planId", &req.plan_id)?,
        payment_id: validate_identifier("paymentId", &req.payment_id)?,
    };

    match state.db.coupons().redeem(&request, Utc::now()).await? {
        RedeemOutcome::Redeemed(redemption) => Ok((
            StatusCode::CREATED,
            Json(RedeemCouponResponse {
                created: true,
                redemption,
            }),
        )),
        RedeemOutcome::AlreadyRedeemed(redemption) => Ok((
            StatusCode::OK,
            Json(RedeemCouponResponse {
                created: false,
                redemption,
            }),
        )),
        RedeemOutcome::Rejected(reason) => Err(ApiError::CouponRejected(reason)),
    }
}

async fn schedule_post(
    State(state): State<AppState>,
    ApiJson(document): ApiJson<Value>,
) -> ApiResult<(StatusCode, Json<ScheduledPost>)> {
    let new = normalize_post_document(document)?;
    let post = state.db.scheduled_posts().insert(&new, Utc::now()).await?;

    info!(post_id = %post.id, user_id = %post.user_id, scheduled_at = %post.scheduled_at, "Post scheduled");
    Ok((StatusCode::CREATED, Json(post)))
}

// =============================================================================
// Internal Handlers
// =============================================================================

fn authorize(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let presented = headers
        .get(DISPATCH_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if state.secret_matches(presented) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

async fn run_dispatch(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<CycleSummary>> {
    authorize(&state, &headers)?;
    let summary = state.dispatcher.run_cycle(Utc::now()).await?;
    Ok(Json(summary))
}

async fn post_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<PostStats>> {
    authorize(&state, &headers)?;
    Ok(Json(state.db.scheduled_posts().stats().await?))
}

async fn failed_posts(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<FailedQuery>,
) -> ApiResult<Json<Vec<ScheduledPost>>> {
    authorize(&state, &headers)?;
    let limit = query.limit.unwrap_or(DEFAULT_FAILED_LIMIT);
    Ok(Json(state.db.scheduled_posts().list_failed(limit).await?))
}

async fn requeue_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<ScheduledPost>> {
    authorize(&state, &headers)?;
    let post = state.db.scheduled_posts().requeue(&id, Utc::now()).await?;
    Ok(Json(post))
}

// =============================================================================
// Router Tests
// =============================================================================
