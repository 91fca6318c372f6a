//! Router tests against an in-memory store, a recording payments fake and
//! locally minted access tokens.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
  Router,
  body::Body,
  http::{Request, StatusCode, header},
  response::Response,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use levelup_core::{account::SubscriptionStatus, store::LevelUpStore};
use levelup_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tower::ServiceExt as _;

use crate::{
  AppState, ApiConfig, PlanPrices, api_router,
  auth::{Claims, JwtAuthenticator, UserMetadata},
  payments::{CheckoutRequest, Payments, PaymentsError, VerifiedEvent},
  stripe::parse_event,
};

const SECRET: &str = "router-test-secret-router-test-secret";
const VALID_SIGNATURE: &str = "t=1,v1=good";

// ─── Fixtures ────────────────────────────────────────────────────────────────

#[derive(Default)]
struct FakePayments {
  checkouts: Mutex<Vec<CheckoutRequest>>,
  portals:   Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Payments for FakePayments {
  async fn create_checkout_session(&self, request: CheckoutRequest) -> Result<String, PaymentsError> {
    self.checkouts.lock().unwrap().push(request);
    Ok("https://checkout.test/session/1".into())
  }

  async fn create_portal_session(
    &self,
    customer_id: &str,
    return_url: &str,
  ) -> Result<String, PaymentsError> {
    self.portals.lock().unwrap().push((customer_id.into(), return_url.into()));
    Ok("https://billing.test/portal/1".into())
  }

  fn verify_event(&self, payload: &[u8], signature: &str) -> Result<VerifiedEvent, PaymentsError> {
    if signature != VALID_SIGNATURE {
      return Err(PaymentsError::Signature("no matching signature"));
    }
    parse_event(payload)
  }
}

struct Harness {
  store:    Arc<SqliteStore>,
  payments: Arc<FakePayments>,
  state:    AppState<SqliteStore>,
}

impl Harness {
  async fn new() -> Self {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let payments = Arc::new(FakePayments::default());
    let state = AppState {
      store:    store.clone(),
      auth:     Arc::new(JwtAuthenticator::new(SECRET, None)),
      payments: payments.clone(),
      config:   Arc::new(ApiConfig {
        app_url: "https://levelup.test".into(),
        prices:  PlanPrices {
          child_monthly: Some("price_cm".into()),
          child_yearly: Some("price_cy".into()),
          ..Default::default()
        },
      }),
    };
    Self { store, payments, state }
  }

  fn router(&self) -> Router { api_router(self.state.clone()) }

  async fn send(&self, req: Request<Body>) -> Response { self.router().oneshot(req).await.unwrap() }

  async fn get(&self, uri: &str, user: Option<&str>) -> Response {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(user) = user {
      builder = builder.header(header::AUTHORIZATION, bearer(user));
    }
    self.send(builder.body(Body::empty()).unwrap()).await
  }

  async fn post_json(&self, uri: &str, user: &str, body: &str) -> Response {
    let req = Request::builder()
      .method("POST")
      .uri(uri)
      .header(header::AUTHORIZATION, bearer(user))
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(body.to_owned()))
      .unwrap();
    self.send(req).await
  }

  async fn post_form(&self, uri: &str, user: &str, body: &str) -> Response {
    let req = Request::builder()
      .method("POST")
      .uri(uri)
      .header(header::AUTHORIZATION, bearer(user))
      .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
      .body(Body::from(body.to_owned()))
      .unwrap();
    self.send(req).await
  }

  async fn webhook(&self, signature: &str, event: Value) -> Response {
    let req = Request::builder()
      .method("POST")
      .uri("/webhooks/stripe")
      .header("stripe-signature", signature)
      .body(Body::from(event.to_string()))
      .unwrap();
    self.send(req).await
  }
}

fn bearer(user: &str) -> String {
  let claims = Claims {
    sub:           user.into(),
    email:         format!("{user}@example.com"),
    exp:           (chrono::Utc::now().timestamp() + 3600) as u64,
    aud:           Some("authenticated".into()),
    user_metadata: UserMetadata { name: Some("Sam".into()) },
  };
  let token =
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap();
  format!("Bearer {token}")
}

async fn json_body(resp: Response) -> Value {
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  serde_json::from_slice(&bytes).unwrap()
}

fn location(resp: &Response) -> &str {
  resp.headers().get(header::LOCATION).unwrap().to_str().unwrap()
}

fn checkout_completed(user: &str, plan: &str) -> Value {
  json!({
    "id": "evt_checkout",
    "type": "checkout.session.completed",
    "data": { "object": {
      "customer": "cus_1",
      "subscription": "sub_1",
      "metadata": { "userId": user, "plan": plan }
    }}
  })
}

// ─── Basics ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_needs_no_auth() {
  let h = Harness::new().await;
  assert_eq!(h.get("/health", None).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn unauthenticated_requests_are_401() {
  let h = Harness::new().await;
  let resp = h.get("/user/progress", None).await;
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  assert_eq!(json_body(resp).await, json!({ "error": "unauthorized" }));

  let req = Request::builder()
    .uri("/user/subscription")
    .header(header::AUTHORIZATION, "Bearer not-a-jwt")
    .body(Body::empty())
    .unwrap();
  assert_eq!(h.send(req).await.status(), StatusCode::UNAUTHORIZED);
}

// ─── Progress ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn first_read_creates_account_and_defaults() {
  let h = Harness::new().await;
  let resp = h.get("/user/progress", Some("u1")).await;
  assert_eq!(resp.status(), StatusCode::OK);

  let body = json_body(resp).await;
  assert_eq!(body["totalStars"], 0);
  assert_eq!(body["completedLevels"], json!([]));
  assert!(body["lastActiveDate"].is_null());

  let account = h.store.get_account("u1").await.unwrap().unwrap();
  assert_eq!(account.subscription_status, SubscriptionStatus::Inactive);
  assert_eq!(account.name.as_deref(), Some("Sam"));
}

#[tokio::test]
async fn partial_writes_merge_per_field() {
  let h = Harness::new().await;

  let resp = h.post_json("/user/progress", "u1", r#"{"totalStars":50}"#).await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(json_body(resp).await["totalStars"], 50);

  let resp = h.post_json("/user/progress", "u1", r#"{"currentStreak":2}"#).await;
  let body = json_body(resp).await;
  assert_eq!(body["totalStars"], 50);
  assert_eq!(body["currentStreak"], 2);
}

#[tokio::test]
async fn malformed_progress_is_400_without_mutation() {
  let h = Harness::new().await;
  h.post_json("/user/progress", "u1", r#"{"totalStars":5}"#).await;

  for bad in [r#"{"totalStars":"many"}"#, r#"{"completedLevels":[9]}"#, "not json"] {
    let resp = h.post_json("/user/progress", "u1", bad).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{bad}");
  }
  let body = json_body(h.get("/user/progress", Some("u1")).await).await;
  assert_eq!(body["totalStars"], 5);
}

// ─── Journals ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn mood_upload_is_idempotent() {
  let h = Harness::new().await;
  let entries = json!([
    {
      "id": "6f1c1d5e-8a3b-4b7e-9f53-2a1c0f3e9d11",
      "emoji": "😟", "intensity": 6, "trigger": "test",
      "createdAt": "2024-01-02T10:00:00Z"
    },
    {
      "id": "0b7f3a52-1b34-4c1e-a0a5-5d0bde33a1f2",
      "emoji": "😊", "intensity": 3,
      "createdAt": "2024-01-02T18:00:00Z"
    }
  ])
  .to_string();

  let resp = h.post_json("/user/moods", "u1", &entries).await;
  assert_eq!(json_body(resp).await, json!({ "inserted": 2 }));
  let resp = h.post_json("/user/moods", "u1", &entries).await;
  assert_eq!(json_body(resp).await, json!({ "inserted": 0 }));

  let listed = json_body(h.get("/user/moods", Some("u1")).await).await;
  assert_eq!(listed[0]["emoji"], "😊");
  assert_eq!(listed[1]["trigger"], "test");
}

#[tokio::test]
async fn out_of_range_intensity_is_400() {
  let h = Harness::new().await;
  let entries = json!([{
    "id": "6f1c1d5e-8a3b-4b7e-9f53-2a1c0f3e9d11",
    "emoji": "😠", "intensity": 11,
    "createdAt": "2024-01-02T10:00:00Z"
  }])
  .to_string();
  let resp = h.post_json("/user/moods", "u1", &entries).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn iceberg_entries_round_trip() {
  let h = Harness::new().await;
  let entries = json!([{
    "id": "0b7f3a52-1b34-4c1e-a0a5-5d0bde33a1f2",
    "behavior": "yelled", "feeling": "scared", "need": "reassurance",
    "createdAt": "2024-02-01T09:00:00Z"
  }])
  .to_string();
  let resp = h.post_json("/user/iceberg", "u1", &entries).await;
  assert_eq!(json_body(resp).await["inserted"], 1);

  let listed = json_body(h.get("/user/iceberg", Some("u1")).await).await;
  assert_eq!(listed[0]["need"], "reassurance");
}

// ─── Checkout & portal ───────────────────────────────────────────────────────

#[tokio::test]
async fn checkout_redirects_with_metadata() {
  let h = Harness::new().await;
  let resp = h.post_form("/checkout", "u1", "plan=CHILD_YEARLY").await;
  assert_eq!(resp.status(), StatusCode::SEE_OTHER);
  assert_eq!(location(&resp), "https://checkout.test/session/1");

  let checkouts = h.payments.checkouts.lock().unwrap();
  let request = &checkouts[0];
  assert_eq!(request.price_id, "price_cy");
  assert_eq!(request.customer_id, None);
  assert_eq!(request.customer_email.as_deref(), Some("u1@example.com"));
  assert_eq!(request.success_url, "https://levelup.test/?success=true");
  assert!(request.metadata.contains(&("userId".into(), "u1".into())));
  assert!(request.metadata.contains(&("plan".into(), "CHILD_YEARLY".into())));
}

#[tokio::test]
async fn checkout_rejects_unknown_or_missing_plan() {
  let h = Harness::new().await;
  assert_eq!(h.post_form("/checkout", "u1", "plan=GOLD").await.status(), StatusCode::BAD_REQUEST);
  assert_eq!(h.post_form("/checkout", "u1", "").await.status(), StatusCode::BAD_REQUEST);
  assert!(h.payments.checkouts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn checkout_without_form_content_type_is_400() {
  let h = Harness::new().await;
  let req = Request::builder()
    .method("POST")
    .uri("/checkout")
    .header(header::AUTHORIZATION, bearer("u1"))
    .body(Body::from("plan=CHILD_YEARLY"))
    .unwrap();

  let resp = h.send(req).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  assert!(h.payments.checkouts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn checkout_without_configured_price_is_500() {
  let h = Harness::new().await;
  let resp = h.post_form("/checkout", "u1", "plan=BUNDLE_YEARLY").await;
  assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
  assert_eq!(json_body(resp).await, json!({ "error": "internal server error" }));
}

#[tokio::test]
async fn portal_requires_a_customer() {
  let h = Harness::new().await;
  let resp = h.get("/portal", Some("u1")).await;
  assert_eq!(resp.status(), StatusCode::SEE_OTHER);
  assert_eq!(location(&resp), "/?error=no_subscription");

  h.webhook(VALID_SIGNATURE, checkout_completed("u1", "CHILD_MONTHLY")).await;

  let resp = h.get("/portal", Some("u1")).await;
  assert_eq!(location(&resp), "https://billing.test/portal/1");
  let portals = h.payments.portals.lock().unwrap();
  assert_eq!(portals[0], ("cus_1".to_string(), "https://levelup.test/".to_string()));
}

#[tokio::test]
async fn returning_customers_reuse_their_customer_id() {
  let h = Harness::new().await;
  h.get("/user/progress", Some("u1")).await;
  h.webhook(VALID_SIGNATURE, checkout_completed("u1", "CHILD_MONTHLY")).await;

  h.post_form("/checkout", "u1", "plan=CHILD_YEARLY").await;
  let checkouts = h.payments.checkouts.lock().unwrap();
  assert_eq!(checkouts[0].customer_id.as_deref(), Some("cus_1"));
  assert_eq!(checkouts[0].customer_email, None);
}

// ─── Webhook ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn bad_signature_is_400_and_changes_nothing() {
  let h = Harness::new().await;
  h.get("/user/progress", Some("u1")).await;

  let resp = h.webhook("t=1,v1=forged", checkout_completed("u1", "CHILD_YEARLY")).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

  let account = h.store.get_account("u1").await.unwrap().unwrap();
  assert_eq!(account.subscription_status, SubscriptionStatus::Inactive);
  assert_eq!(account.customer_id, None);
}

#[tokio::test]
async fn missing_signature_is_400() {
  let h = Harness::new().await;
  let req = Request::builder()
    .method("POST")
    .uri("/webhooks/stripe")
    .body(Body::from(checkout_completed("u1", "CHILD_YEARLY").to_string()))
    .unwrap();
  assert_eq!(h.send(req).await.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_subjects_and_types_are_acknowledged() {
  let h = Harness::new().await;
  let ghost = json!({
    "id": "evt_ghost",
    "type": "invoice.payment_failed",
    "data": { "object": { "customer": "cus_ghost" } }
  });
  let resp = h.webhook(VALID_SIGNATURE, ghost).await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(json_body(resp).await, json!({ "received": true }));

  let other = json!({ "id": "evt_other", "type": "customer.created", "data": { "object": {} } });
  assert_eq!(h.webhook(VALID_SIGNATURE, other).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn subscription_lifecycle_end_to_end() {
  let h = Harness::new().await;

  // Sign up: inactive, not entitled.
  let summary = json_body(h.get("/user/subscription", Some("u1")).await).await;
  assert_eq!(summary["isActive"], false);
  assert_eq!(summary["status"], "INACTIVE");

  // Checkout completes.
  let resp = h.webhook(VALID_SIGNATURE, checkout_completed("u1", "CHILD_YEARLY")).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let summary = json_body(h.get("/user/subscription", Some("u1")).await).await;
  assert_eq!(summary["isActive"], true);
  assert_eq!(summary["plan"], "CHILD_YEARLY");

  let progress = json_body(h.get("/user/progress", Some("u1")).await).await;
  assert_eq!(progress["totalStars"], 0);

  // Level 1 completed on the client and pushed.
  h.post_json("/user/progress", "u1", r#"{"totalStars":10,"completedLevels":[1],"earnedBadges":[1]}"#)
    .await;

  // Payment trouble.
  let updated = json!({
    "id": "evt_updated",
    "type": "customer.subscription.updated",
    "data": { "object": {
      "customer": "cus_1", "status": "past_due", "current_period_end": 1_735_689_600
    }}
  });
  h.webhook(VALID_SIGNATURE, updated).await;

  let summary = json_body(h.get("/user/subscription", Some("u1")).await).await;
  assert_eq!(summary["isActive"], false);
  assert_eq!(summary["status"], "PAST_DUE");
  assert_eq!(summary["endDate"], "2025-01-01T00:00:00Z");

  let progress = json_body(h.get("/user/progress", Some("u1")).await).await;
  assert_eq!(progress["totalStars"], 10);
  assert_eq!(progress["completedLevels"], json!([1]));

  // Cancellation, delivered twice.
  let deleted = json!({
    "id": "evt_deleted",
    "type": "customer.subscription.deleted",
    "data": { "object": { "customer": "cus_1" } }
  });
  h.webhook(VALID_SIGNATURE, deleted.clone()).await;
  h.webhook(VALID_SIGNATURE, deleted).await;

  let account = h.store.get_account("u1").await.unwrap().unwrap();
  assert_eq!(account.subscription_status, SubscriptionStatus::Cancelled);
  assert_eq!(account.subscription_id, None);
}
