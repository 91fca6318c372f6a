//! Settings the handlers read at request time.

use levelup_core::account::Plan;
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct ApiConfig {
  /// Public base URL of the front end, used for checkout and portal
  /// return links.
  pub app_url: String,
  pub prices:  PlanPrices,
}

impl ApiConfig {
  pub fn app_link(&self, path_and_query: &str) -> String {
    format!("{}{}", self.app_url.trim_end_matches('/'), path_and_query)
  }
}

/// Payments-provider price id for each plan. A plan without a price cannot
/// be checked out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PlanPrices {
  pub child_monthly:  Option<String>,
  pub child_yearly:   Option<String>,
  pub parent_monthly: Option<String>,
  pub parent_yearly:  Option<String>,
  pub bundle_monthly: Option<String>,
  pub bundle_yearly:  Option<String>,
}

impl PlanPrices {
  pub fn price_for(&self, plan: Plan) -> Option<&str> {
    let price = match plan {
      Plan::ChildMonthly => &self.child_monthly,
      Plan::ChildYearly => &self.child_yearly,
      Plan::ParentMonthly => &self.parent_monthly,
      Plan::ParentYearly => &self.parent_yearly,
      Plan::BundleMonthly => &self.bundle_monthly,
      Plan::BundleYearly => &self.bundle_yearly,
    };
    price.as_deref().filter(|p| !p.is_empty())
  }
}
