//! Handler for `GET /user/subscription`.

use axum::Json;
use levelup_core::gate::SubscriptionSummary;

use crate::auth::CurrentUser;

/// `GET /user/subscription` → `{isActive, status, plan, endDate}`
///
/// Always read from the stored account; entitlement is never cached.
pub async fn summary(CurrentUser(account): CurrentUser) -> Json<SubscriptionSummary> {
  Json(SubscriptionSummary::from(&account))
}
