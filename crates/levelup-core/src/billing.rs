//! Billing state reconciliation.
//!
//! The payments provider is the source of truth for subscription state. Its
//! lifecycle events arrive asynchronously, possibly more than once and out
//! of order. Each event is turned into an [`Effect`]: which account it is
//! about and which subscription fields to set. Every field is set to an
//! absolute value, so replaying an event lands in the same state.
//!
//! Signature verification happens before an event gets here; this module
//! only sees events the payments collaborator has already authenticated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  account::{Plan, SubscriptionStatus, UserAccount},
  store::LevelUpStore,
};

// ─── Events ──────────────────────────────────────────────────────────────────

/// A verified payments-provider lifecycle event, reduced to the fields the
/// reconciler reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BillingEvent {
  CheckoutCompleted {
    /// Our user id, from the checkout session's metadata.
    user_id:         Option<String>,
    customer_id:     Option<String>,
    /// Absent for one-off payments.
    subscription_id: Option<String>,
    /// Plan key from the checkout session's metadata.
    plan:            Option<String>,
  },
  SubscriptionUpdated {
    customer_id:        String,
    /// The provider's own status string (`active`, `past_due`, ...).
    provider_status:    String,
    current_period_end: Option<DateTime<Utc>>,
  },
  SubscriptionDeleted {
    customer_id: String,
  },
  InvoicePaymentFailed {
    customer_id: String,
  },
  /// Any event type the reconciler does not act on.
  Other {
    kind: String,
  },
}

/// How an event names the account it is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountRef {
  User(String),
  Customer(String),
}

impl std::fmt::Display for AccountRef {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::User(id) => write!(f, "user {id}"),
      Self::Customer(id) => write!(f, "customer {id}"),
    }
  }
}

// ─── Changes ─────────────────────────────────────────────────────────────────

/// Subscription fields to overwrite on an account. `None` leaves a field
/// alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionChange {
  pub customer_id:     Option<String>,
  /// `Some(None)` clears the stored subscription id.
  pub subscription_id: Option<Option<String>>,
  pub status:          Option<SubscriptionStatus>,
  pub plan:            Option<Plan>,
  pub end_date:        Option<DateTime<Utc>>,
}

impl SubscriptionChange {
  pub fn apply_to(&self, account: &mut UserAccount) {
    if let Some(customer_id) = &self.customer_id {
      account.customer_id = Some(customer_id.clone());
    }
    if let Some(subscription_id) = &self.subscription_id {
      account.subscription_id = subscription_id.clone();
    }
    if let Some(status) = self.status {
      account.subscription_status = status;
    }
    if let Some(plan) = self.plan {
      account.subscription_plan = Some(plan);
    }
    if let Some(end_date) = self.end_date {
      account.subscription_end_date = Some(end_date);
    }
  }
}

/// What an event does to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Effect {
  pub target:          AccountRef,
  pub change:          SubscriptionChange,
  /// Make sure a progress row exists for the account afterwards.
  pub ensure_progress: bool,
  /// A metadata plan that did not parse; the stored plan is left as is.
  pub rejected_plan:   Option<String>,
}

impl BillingEvent {
  /// The provider's event-type name, for logging.
  pub fn kind(&self) -> &str {
    match self {
      Self::CheckoutCompleted { .. } => "checkout.session.completed",
      Self::SubscriptionUpdated { .. } => "customer.subscription.updated",
      Self::SubscriptionDeleted { .. } => "customer.subscription.deleted",
      Self::InvoicePaymentFailed { .. } => "invoice.payment_failed",
      Self::Other { kind } => kind.as_str(),
    }
  }

  /// The effect of this event, or `None` if it is acknowledged and ignored.
  pub fn effect(&self) -> Option<Effect> {
    match self {
      Self::CheckoutCompleted { user_id, customer_id, subscription_id, plan } => {
        let subscription_id = subscription_id.clone()?;
        let target = match (user_id, customer_id) {
          (Some(user), _) => AccountRef::User(user.clone()),
          (None, Some(customer)) => AccountRef::Customer(customer.clone()),
          (None, None) => return None,
        };
        let parsed = plan.as_deref().map(Plan::parse);
        let rejected_plan = match &parsed {
          Some(Err(_)) => plan.clone(),
          _ => None,
        };
        Some(Effect {
          target,
          change: SubscriptionChange {
            customer_id: customer_id.clone(),
            subscription_id: Some(Some(subscription_id)),
            status: Some(SubscriptionStatus::Active),
            plan: parsed.and_then(Result::ok),
            end_date: None,
          },
          ensure_progress: true,
          rejected_plan,
        })
      }

      Self::SubscriptionUpdated { customer_id, provider_status, current_period_end } => {
        Some(Effect {
          target:          AccountRef::Customer(customer_id.clone()),
          change:          SubscriptionChange {
            status: Some(SubscriptionStatus::from_provider(provider_status)),
            end_date: *current_period_end,
            ..Default::default()
          },
          ensure_progress: false,
          rejected_plan:   None,
        })
      }

      Self::SubscriptionDeleted { customer_id } => Some(Effect {
        target:          AccountRef::Customer(customer_id.clone()),
        change:          SubscriptionChange {
          status: Some(SubscriptionStatus::Cancelled),
          subscription_id: Some(None),
          ..Default::default()
        },
        ensure_progress: false,
        rejected_plan:   None,
      }),

      Self::InvoicePaymentFailed { customer_id } => Some(Effect {
        target:          AccountRef::Customer(customer_id.clone()),
        change:          SubscriptionChange {
          status: Some(SubscriptionStatus::PastDue),
          ..Default::default()
        },
        ensure_progress: false,
        rejected_plan:   None,
      }),

      Self::Other { .. } => None,
    }
  }
}

// ─── Reconciler ──────────────────────────────────────────────────────────────

/// What [`reconcile`] did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
  Applied {
    user_id:       String,
    status:        SubscriptionStatus,
    rejected_plan: Option<String>,
  },
  /// No account matches; the event is dropped.
  UnknownSubject(AccountRef),
  Ignored,
}

/// Apply `event` to `store`.
///
/// Unknown accounts are not an error: the account may not exist yet or may
/// have been deleted, and the provider's retries would not change that.
pub async fn reconcile<S: LevelUpStore>(
  store: &S,
  event: &BillingEvent,
) -> Result<Reconciled, S::Error> {
  let Some(effect) = event.effect() else {
    return Ok(Reconciled::Ignored);
  };

  let account = match &effect.target {
    AccountRef::User(user_id) => store.get_account(user_id).await?,
    AccountRef::Customer(customer_id) => store.find_account_by_customer(customer_id).await?,
  };
  let Some(account) = account else {
    return Ok(Reconciled::UnknownSubject(effect.target));
  };

  let Some(updated) = store.apply_subscription_change(&account.user_id, &effect.change).await?
  else {
    return Ok(Reconciled::UnknownSubject(effect.target));
  };

  if effect.ensure_progress {
    store.get_or_create_progress(&updated.user_id).await?;
  }

  Ok(Reconciled::Applied {
    user_id:       updated.user_id,
    status:        updated.subscription_status,
    rejected_plan: effect.rejected_plan,
  })
}
