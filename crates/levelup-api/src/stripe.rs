//! [`StripeClient`], the Stripe implementation of [`Payments`].
//!
//! Talks to the REST API with form-encoded requests and a bearer secret key.
//! Webhook bodies are authenticated with the `Stripe-Signature` scheme:
//! `t=<unix seconds>,v1=<hex hmac-sha256 of "<t>.<body>">`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use levelup_core::billing::BillingEvent;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;

use crate::payments::{CheckoutRequest, Payments, PaymentsError, VerifiedEvent};

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// Maximum age of a signed webhook, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

/// Connection settings for Stripe.
#[derive(Debug, Clone)]
pub struct StripeConfig {
  pub api_base:       String,
  pub secret_key:     String,
  pub webhook_secret: String,
}

/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct StripeClient {
  client: Client,
  config: StripeConfig,
}

impl StripeClient {
  pub fn new(config: StripeConfig) -> Result<Self, PaymentsError> {
    let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!("{}/v1{}", self.config.api_base.trim_end_matches('/'), path)
  }

  /// POST a form and return the `url` of the created session.
  async fn create_session(
    &self,
    path: &str,
    form: &[(String, String)],
  ) -> Result<String, PaymentsError> {
    let resp = self
      .client
      .post(self.url(path))
      .bearer_auth(&self.config.secret_key)
      .form(form)
      .send()
      .await?;

    let status = resp.status();
    if !status.is_success() {
      let body: Value = resp.json().await.unwrap_or(Value::Null);
      let message = body
        .pointer("/error/message")
        .and_then(Value::as_str)
        .unwrap_or("no error message")
        .to_owned();
      return Err(PaymentsError::Provider { status: status.as_u16(), message });
    }

    #[derive(Deserialize)]
    struct Session {
      url: Option<String>,
    }
    let session: Session = resp.json().await?;
    session.url.ok_or(PaymentsError::MissingUrl)
  }

  /// Verify `signature` over `payload` as of `now` (unix seconds).
  pub fn verify_at(
    &self,
    payload: &[u8],
    signature: &str,
    now: i64,
  ) -> Result<VerifiedEvent, PaymentsError> {
    verify_signature(self.config.webhook_secret.as_bytes(), payload, signature, now)?;
    parse_event(payload)
  }
}

#[async_trait]
impl Payments for StripeClient {
  async fn create_checkout_session(&self, request: CheckoutRequest) -> Result<String, PaymentsError> {
    self.create_session("/checkout/sessions", &checkout_form(&request)).await
  }

  async fn create_portal_session(
    &self,
    customer_id: &str,
    return_url: &str,
  ) -> Result<String, PaymentsError> {
    let form = [
      ("customer".to_owned(), customer_id.to_owned()),
      ("return_url".to_owned(), return_url.to_owned()),
    ];
    self.create_session("/billing_portal/sessions", &form).await
  }

  fn verify_event(&self, payload: &[u8], signature: &str) -> Result<VerifiedEvent, PaymentsError> {
    self.verify_at(payload, signature, Utc::now().timestamp())
  }
}

// ─── Checkout form ───────────────────────────────────────────────────────────

/// Form fields for `POST /v1/checkout/sessions`.
pub fn checkout_form(request: &CheckoutRequest) -> Vec<(String, String)> {
  let mut form = vec![
    ("mode".to_owned(), "subscription".to_owned()),
    ("payment_method_types[0]".to_owned(), "card".to_owned()),
    ("line_items[0][price]".to_owned(), request.price_id.clone()),
    ("line_items[0][quantity]".to_owned(), "1".to_owned()),
    ("success_url".to_owned(), request.success_url.clone()),
    ("cancel_url".to_owned(), request.cancel_url.clone()),
    ("allow_promotion_codes".to_owned(), "true".to_owned()),
  ];

  match (&request.customer_id, &request.customer_email) {
    (Some(customer), _) => form.push(("customer".to_owned(), customer.clone())),
    (None, Some(email)) => form.push(("customer_email".to_owned(), email.clone())),
    (None, None) => {}
  }

  for (key, value) in &request.metadata {
    form.push((format!("metadata[{key}]"), value.clone()));
    form.push((format!("subscription_data[metadata][{key}]"), value.clone()));
  }
  form
}

// ─── Signatures ──────────────────────────────────────────────────────────────

/// Check a `Stripe-Signature` header. Any one matching `v1` entry suffices.
pub fn verify_signature(
  secret: &[u8],
  payload: &[u8],
  header: &str,
  now: i64,
) -> Result<(), PaymentsError> {
  let mut timestamp = None;
  let mut candidates = Vec::new();
  for part in header.split(',') {
    match part.trim().split_once('=') {
      Some(("t", t)) => timestamp = t.parse::<i64>().ok(),
      Some(("v1", sig)) => candidates.push(sig),
      _ => {}
    }
  }

  let timestamp = timestamp.ok_or(PaymentsError::Signature("missing timestamp"))?;
  if candidates.is_empty() {
    return Err(PaymentsError::Signature("no v1 signature"));
  }
  if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
    return Err(PaymentsError::Signature("timestamp outside tolerance"));
  }

  let mut mac =
    HmacSha256::new_from_slice(secret).map_err(|_| PaymentsError::Signature("unusable secret"))?;
  mac.update(timestamp.to_string().as_bytes());
  mac.update(b".");
  mac.update(payload);

  let matched = candidates
    .into_iter()
    .filter_map(|sig| hex::decode(sig).ok())
    .any(|expected| mac.clone().verify_slice(&expected).is_ok());

  if matched { Ok(()) } else { Err(PaymentsError::Signature("no matching signature")) }
}

// ─── Events ──────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawEvent {
  id:   String,
  #[serde(rename = "type")]
  kind: String,
  data: RawEventData,
}

#[derive(Deserialize)]
struct RawEventData {
  object: Value,
}

/// A string field, or the `id` of an expanded object.
fn id_field(object: &Value, key: &str) -> Option<String> {
  let value = object.get(key)?;
  value
    .as_str()
    .or_else(|| value.get("id").and_then(Value::as_str))
    .map(str::to_owned)
}

fn required_id(object: &Value, key: &str, kind: &str) -> Result<String, PaymentsError> {
  id_field(object, key).ok_or_else(|| PaymentsError::MalformedEvent(format!("{kind} without {key}")))
}

/// Decode a webhook body into the fields the reconciler reads.
pub fn parse_event(payload: &[u8]) -> Result<VerifiedEvent, PaymentsError> {
  let raw: RawEvent =
    serde_json::from_slice(payload).map_err(|e| PaymentsError::MalformedEvent(e.to_string()))?;
  let object = &raw.data.object;

  let event = match raw.kind.as_str() {
    "checkout.session.completed" => {
      let metadata = object.get("metadata");
      let meta = |key: &str| {
        metadata.and_then(|m| m.get(key)).and_then(Value::as_str).map(str::to_owned)
      };
      BillingEvent::CheckoutCompleted {
        user_id:         meta("userId"),
        customer_id:     id_field(object, "customer"),
        subscription_id: id_field(object, "subscription"),
        plan:            meta("plan"),
      }
    }
    "customer.subscription.updated" => BillingEvent::SubscriptionUpdated {
      customer_id:        required_id(object, "customer", &raw.kind)?,
      provider_status:    object
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned(),
      current_period_end: object
        .get("current_period_end")
        .and_then(Value::as_i64)
        .and_then(|secs| DateTime::from_timestamp(secs, 0)),
    },
    "customer.subscription.deleted" => BillingEvent::SubscriptionDeleted {
      customer_id: required_id(object, "customer", &raw.kind)?,
    },
    "invoice.payment_failed" => BillingEvent::InvoicePaymentFailed {
      customer_id: required_id(object, "customer", &raw.kind)?,
    },
    _ => BillingEvent::Other { kind: raw.kind.clone() },
  };

  Ok(VerifiedEvent { id: raw.id, event })
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  const SECRET: &str = "whsec_test";
  const NOW: i64 = 1_700_000_000;

  fn sign(secret: &str, payload: &[u8], t: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{t}.").as_bytes());
    mac.update(payload);
    format!("t={t},v1={}", hex::encode(mac.finalize().into_bytes()))
  }

  #[test]
  fn valid_signature_is_accepted() {
    let body = br#"{"id":"evt_1"}"#;
    let header = sign(SECRET, body, NOW);
    assert!(verify_signature(SECRET.as_bytes(), body, &header, NOW + 10).is_ok());
  }

  #[test]
  fn any_matching_v1_entry_is_enough() {
    let body = br#"{"id":"evt_1"}"#;
    let good = sign(SECRET, body, NOW);
    let sig = good.split_once("v1=").unwrap().1;
    let header = format!("t={NOW},v1=deadbeef,v0=abc,v1={sig}");
    assert!(verify_signature(SECRET.as_bytes(), body, &header, NOW).is_ok());
  }

  #[test]
  fn tampered_body_is_rejected() {
    let header = sign(SECRET, br#"{"id":"evt_1"}"#, NOW);
    let result = verify_signature(SECRET.as_bytes(), br#"{"id":"evt_2"}"#, &header, NOW);
    assert!(matches!(result, Err(PaymentsError::Signature(_))));
  }

  #[test]
  fn wrong_secret_is_rejected() {
    let body = br#"{"id":"evt_1"}"#;
    let header = sign("whsec_other", body, NOW);
    assert!(verify_signature(SECRET.as_bytes(), body, &header, NOW).is_err());
  }

  #[test]
  fn stale_timestamp_is_rejected() {
    let body = br#"{"id":"evt_1"}"#;
    let header = sign(SECRET, body, NOW);
    let later = NOW + SIGNATURE_TOLERANCE_SECS + 1;
    assert!(verify_signature(SECRET.as_bytes(), body, &header, later).is_err());
  }

  #[test]
  fn garbage_header_is_rejected() {
    assert!(verify_signature(SECRET.as_bytes(), b"{}", "", NOW).is_err());
    assert!(verify_signature(SECRET.as_bytes(), b"{}", "t=abc,v1=00", NOW).is_err());
    assert!(verify_signature(SECRET.as_bytes(), b"{}", &format!("t={NOW}"), NOW).is_err());
  }

  #[test]
  fn parses_checkout_completed() {
    let body = json!({
      "id": "evt_1",
      "type": "checkout.session.completed",
      "data": { "object": {
        "customer": "cus_1",
        "subscription": "sub_1",
        "metadata": { "userId": "u1", "plan": "CHILD_YEARLY" }
      }}
    });
    let parsed = parse_event(body.to_string().as_bytes()).unwrap();
    assert_eq!(parsed.id, "evt_1");
    assert_eq!(parsed.event, BillingEvent::CheckoutCompleted {
      user_id:         Some("u1".into()),
      customer_id:     Some("cus_1".into()),
      subscription_id: Some("sub_1".into()),
      plan:            Some("CHILD_YEARLY".into()),
    });
  }

  #[test]
  fn parses_subscription_updated_with_expanded_customer() {
    let body = json!({
      "id": "evt_2",
      "type": "customer.subscription.updated",
      "data": { "object": {
        "customer": { "id": "cus_1" },
        "status": "past_due",
        "current_period_end": 1_735_689_600
      }}
    });
    let parsed = parse_event(body.to_string().as_bytes()).unwrap();
    assert_eq!(parsed.event, BillingEvent::SubscriptionUpdated {
      customer_id:        "cus_1".into(),
      provider_status:    "past_due".into(),
      current_period_end: DateTime::from_timestamp(1_735_689_600, 0),
    });
  }

  #[test]
  fn unknown_types_become_other() {
    let body = json!({ "id": "evt_3", "type": "customer.created", "data": { "object": {} } });
    let parsed = parse_event(body.to_string().as_bytes()).unwrap();
    assert_eq!(parsed.event, BillingEvent::Other { kind: "customer.created".into() });
  }

  #[test]
  fn deletion_without_customer_is_malformed() {
    let body =
      json!({ "id": "evt_4", "type": "customer.subscription.deleted", "data": { "object": {} } });
    assert!(matches!(
      parse_event(body.to_string().as_bytes()),
      Err(PaymentsError::MalformedEvent(_))
    ));
  }

  #[test]
  fn checkout_form_prefers_existing_customer() {
    let request = CheckoutRequest {
      price_id:       "price_1".into(),
      customer_id:    Some("cus_1".into()),
      customer_email: None,
      success_url:    "https://app.test/?success=true".into(),
      cancel_url:     "https://app.test/?canceled=true".into(),
      metadata:       vec![("userId".into(), "u1".into())],
    };
    let form = checkout_form(&request);
    let has = |k: &str, v: &str| form.iter().any(|(fk, fv)| fk == k && fv == v);
    assert!(has("customer", "cus_1"));
    assert!(!form.iter().any(|(k, _)| k == "customer_email"));
    assert!(has("line_items[0][price]", "price_1"));
    assert!(has("metadata[userId]", "u1"));
    assert!(has("subscription_data[metadata][userId]", "u1"));
  }

  #[test]
  fn client_verifies_then_parses() {
    let client = StripeClient::new(StripeConfig {
      api_base:       DEFAULT_API_BASE.into(),
      secret_key:     "sk_test".into(),
      webhook_secret: SECRET.into(),
    })
    .unwrap();
    let body = json!({
      "id": "evt_5",
      "type": "invoice.payment_failed",
      "data": { "object": { "customer": "cus_9" } }
    })
    .to_string();
    let header = sign(SECRET, body.as_bytes(), NOW);
    let parsed = client.verify_at(body.as_bytes(), &header, NOW).unwrap();
    assert_eq!(parsed.event, BillingEvent::InvoicePaymentFailed { customer_id: "cus_9".into() });
  }
}
