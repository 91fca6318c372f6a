//! The payments collaborator: hosted checkout, the billing portal, and
//! signed lifecycle webhooks.

use async_trait::async_trait;
use levelup_core::billing::BillingEvent;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaymentsError {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("provider returned {status}: {message}")]
  Provider { status: u16, message: String },

  #[error("provider response had no redirect url")]
  MissingUrl,

  #[error("signature rejected: {0}")]
  Signature(&'static str),

  #[error("malformed event: {0}")]
  MalformedEvent(String),
}

/// Input for a hosted subscription checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
  pub price_id:       String,
  /// Reuse an existing customer; otherwise `customer_email` seeds a new one.
  pub customer_id:    Option<String>,
  pub customer_email: Option<String>,
  pub success_url:    String,
  pub cancel_url:     String,
  /// Copied to the checkout session and its subscription.
  pub metadata:       Vec<(String, String)>,
}

/// An event whose signature checked out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedEvent {
  pub id:    String,
  pub event: BillingEvent,
}

#[async_trait]
pub trait Payments: Send + Sync {
  /// Returns the URL to send the customer to.
  async fn create_checkout_session(&self, request: CheckoutRequest) -> Result<String, PaymentsError>;

  /// Returns the URL of a self-service billing portal session.
  async fn create_portal_session(
    &self,
    customer_id: &str,
    return_url: &str,
  ) -> Result<String, PaymentsError>;

  /// Authenticate a raw webhook body against its signature header and decode
  /// it.
  fn verify_event(&self, payload: &[u8], signature: &str) -> Result<VerifiedEvent, PaymentsError>;
}
