//! Checkout, billing portal and the payments webhook.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/checkout` | Form: `plan=<PLAN>`; 303 to the hosted checkout |
//! | `GET`  | `/portal` | 303 to the billing portal, or back home without a customer |
//! | `POST` | `/webhooks/stripe` | Signed lifecycle events; always 200 once verified and applied |

use axum::{
  Form, Json,
  body::Bytes,
  extract::{State, rejection::FormRejection},
  http::HeaderMap,
  response::Redirect,
};
use levelup_core::{
  account::Plan,
  billing::{Reconciled, reconcile},
  store::LevelUpStore,
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{AppState, auth::CurrentUser, error::ApiError, payments::CheckoutRequest};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

// ─── Checkout ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CheckoutForm {
  pub plan: Option<String>,
}

/// `POST /checkout`
///
/// A body that is not a form (including a missing content type) is a 400
/// rather than axum's 415.
pub async fn checkout<S>(
  State(state): State<AppState<S>>,
  CurrentUser(account): CurrentUser,
  form: Result<Form<CheckoutForm>, FormRejection>,
) -> Result<Redirect, ApiError>
where
  S: LevelUpStore + 'static,
{
  let Form(form) = form.map_err(|e| ApiError::BadRequest(format!("invalid checkout form: {e}")))?;
  let plan = form
    .plan
    .as_deref()
    .and_then(|p| Plan::parse(p).ok())
    .ok_or_else(|| ApiError::BadRequest("invalid plan".into()))?;

  let price_id = state
    .config
    .prices
    .price_for(plan)
    .ok_or_else(|| ApiError::Internal(format!("no price configured for {plan}")))?
    .to_owned();

  let customer_email = match account.customer_id {
    Some(_) => None,
    None => Some(account.email.clone()),
  };
  let request = CheckoutRequest {
    price_id,
    customer_id: account.customer_id.clone(),
    customer_email,
    success_url: state.config.app_link("/?success=true"),
    cancel_url: state.config.app_link("/?canceled=true"),
    metadata: vec![
      ("userId".to_owned(), account.user_id.clone()),
      ("plan".to_owned(), plan.to_string()),
    ],
  };

  let url = state.payments.create_checkout_session(request).await?;
  tracing::info!(user_id = %account.user_id, %plan, "checkout session created");
  Ok(Redirect::to(&url))
}

// ─── Portal ──────────────────────────────────────────────────────────────────

/// `GET /portal`
pub async fn portal<S>(
  State(state): State<AppState<S>>,
  CurrentUser(account): CurrentUser,
) -> Result<Redirect, ApiError>
where
  S: LevelUpStore + 'static,
{
  let Some(customer_id) = account.customer_id.as_deref() else {
    return Ok(Redirect::to("/?error=no_subscription"));
  };
  let url = state
    .payments
    .create_portal_session(customer_id, &state.config.app_link("/"))
    .await?;
  Ok(Redirect::to(&url))
}

// ─── Webhook ─────────────────────────────────────────────────────────────────

/// `POST /webhooks/stripe`
///
/// A bad signature is a 400 and nothing is processed. A persistence failure
/// is a 500 so the provider retries; every other outcome, including events
/// about unknown customers, is acknowledged.
pub async fn webhook<S>(
  State(state): State<AppState<S>>,
  headers: HeaderMap,
  body: Bytes,
) -> Result<Json<Value>, ApiError>
where
  S: LevelUpStore + 'static,
{
  let signature = headers
    .get(SIGNATURE_HEADER)
    .and_then(|v| v.to_str().ok())
    .ok_or_else(|| ApiError::InvalidSignature("missing signature header".into()))?;

  let verified = state.payments.verify_event(&body, signature).map_err(|e| {
    tracing::warn!(error = %e, "webhook rejected");
    ApiError::InvalidSignature(e.to_string())
  })?;

  let kind = verified.event.kind().to_owned();
  let outcome = reconcile(state.store.as_ref(), &verified.event)
    .await
    .map_err(ApiError::store)?;

  match outcome {
    Reconciled::Applied { user_id, status, rejected_plan } => {
      if let Some(plan) = rejected_plan {
        tracing::warn!(event_id = %verified.id, %user_id, %plan, "unknown plan in checkout metadata");
      }
      tracing::info!(event_id = %verified.id, %kind, %user_id, %status, "subscription updated");
    }
    Reconciled::UnknownSubject(subject) => {
      tracing::warn!(event_id = %verified.id, %kind, %subject, "no account for billing event");
    }
    Reconciled::Ignored => {
      tracing::debug!(event_id = %verified.id, %kind, "billing event ignored");
    }
  }

  Ok(Json(json!({ "received": true })))
}
