//! Accounts, plans, and subscription status.
//!
//! An account is created lazily on first authenticated access. Its
//! subscription fields are written only by the billing reconciler
//! ([`crate::billing`]); the gamification path never touches them.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::{Error, Result};

// ─── Subscription status ─────────────────────────────────────────────────────

/// Durable subscription state of an account.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  Display,
  AsRefStr,
  EnumString,
  EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
  Active,
  PastDue,
  Cancelled,
  Trialing,
  #[default]
  Inactive,
}

impl SubscriptionStatus {
  /// Map a payments-provider subscription status string onto our status.
  /// Anything unrecognised (`incomplete`, `unpaid`, `paused`, ...) is
  /// [`Inactive`](Self::Inactive).
  pub fn from_provider(status: &str) -> Self {
    match status {
      "active" => Self::Active,
      "past_due" => Self::PastDue,
      "canceled" => Self::Cancelled,
      "trialing" => Self::Trialing,
      _ => Self::Inactive,
    }
  }

  /// Parse the stored (SCREAMING_SNAKE_CASE) form.
  pub fn parse(s: &str) -> Result<Self> {
    Self::from_str(s).map_err(|_| Error::UnknownStatus(s.to_owned()))
  }
}

// ─── Plans ───────────────────────────────────────────────────────────────────

/// A purchasable subscription plan.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  AsRefStr,
  EnumString,
  EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Plan {
  ChildMonthly,
  ChildYearly,
  ParentMonthly,
  ParentYearly,
  BundleMonthly,
  BundleYearly,
}

impl Plan {
  /// Parse a plan key such as `"CHILD_YEARLY"`.
  pub fn parse(s: &str) -> Result<Self> {
    Self::from_str(s).map_err(|_| Error::UnknownPlan(s.to_owned()))
  }
}

// ─── Identity ────────────────────────────────────────────────────────────────

/// Who the auth provider says is making the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
  /// Opaque id owned by the auth provider.
  pub user_id: String,
  pub email:   String,
  pub name:    Option<String>,
}

// ─── Account ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
  pub user_id:               String,
  pub email:                 String,
  pub name:                  Option<String>,
  /// Payments-provider customer id; set by the first completed checkout.
  pub customer_id:           Option<String>,
  pub subscription_id:       Option<String>,
  pub subscription_status:   SubscriptionStatus,
  pub subscription_plan:     Option<Plan>,
  pub subscription_end_date: Option<DateTime<Utc>>,
  pub created_at:            DateTime<Utc>,
}

impl UserAccount {
  /// A freshly signed-up account: no billing linkage, `INACTIVE`.
  pub fn new(identity: &Identity, created_at: DateTime<Utc>) -> Self {
    Self {
      user_id: identity.user_id.clone(),
      email: identity.email.clone(),
      name: identity.name.clone(),
      customer_id: None,
      subscription_id: None,
      subscription_status: SubscriptionStatus::default(),
      subscription_plan: None,
      subscription_end_date: None,
      created_at,
    }
  }
}
