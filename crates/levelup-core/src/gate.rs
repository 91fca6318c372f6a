//! The subscription gate: who gets the unlocked experience.
//!
//! Entitlement is derived from the stored status every time it is asked
//! for. Billing events can revoke it at any moment, so callers must not hold
//! on to an answer across authentication changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::{Plan, SubscriptionStatus, UserAccount};

pub fn is_entitled(status: SubscriptionStatus) -> bool {
  matches!(status, SubscriptionStatus::Active | SubscriptionStatus::Trialing)
}

/// The body of `GET /api/user/subscription`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSummary {
  pub is_active: bool,
  pub status:    SubscriptionStatus,
  pub plan:      Option<Plan>,
  pub end_date:  Option<DateTime<Utc>>,
}

impl From<&UserAccount> for SubscriptionSummary {
  fn from(account: &UserAccount) -> Self {
    Self {
      is_active: is_entitled(account.subscription_status),
      status:    account.subscription_status,
      plan:      account.subscription_plan,
      end_date:  account.subscription_end_date,
    }
  }
}

/// Which top-level experience the front end should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
  SignIn,
  Subscribe,
  Unlocked,
}

impl Screen {
  /// `status` is `None` when there is no authenticated session.
  pub fn for_status(status: Option<SubscriptionStatus>) -> Self {
    match status {
      None => Self::SignIn,
      Some(s) if is_entitled(s) => Self::Unlocked,
      Some(_) => Self::Subscribe,
    }
  }
}
