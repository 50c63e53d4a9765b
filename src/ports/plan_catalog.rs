//! Plan catalog port.
//!
//! Read-only view onto the tenant/plan model owned by the wider back
//! office. The billing engine consumes prices and feature limits from it
//! and never writes back.

use crate::domain::foundation::{DomainError, Money, PlanId, TenantId};
use crate::domain::subscription::BillingCycle;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Point-in-time view of a plan as offered to a tenant.
///
/// Prices are captured per cycle; the amount actually charged is always
/// snapshotted onto the subscription row, so later catalog edits never
/// rewrite billing history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    pub plan_id: PlanId,
    pub name: String,
    pub price_monthly: Money,
    pub price_annual: Money,
    /// Opaque feature limits enforced elsewhere; carried through untouched.
    pub feature_limits: serde_json::Value,
}

impl PlanSnapshot {
    /// Price for the given billing cycle.
    pub fn price_for(&self, cycle: BillingCycle) -> Money {
        match cycle {
            BillingCycle::Monthly => self.price_monthly,
            BillingCycle::Annual => self.price_annual,
        }
    }

    /// A plan is free when both cycle prices are zero.
    pub fn is_free(&self) -> bool {
        self.price_monthly.is_zero() && self.price_annual.is_zero()
    }
}

/// Port for reading plan offerings.
#[async_trait]
pub trait PlanCatalog: Send + Sync {
    /// Resolves the plan as offered to the given tenant.
    ///
    /// Returns `None` when the plan does not exist or is not available to
    /// the tenant.
    async fn plan_for_tenant(
        &self,
        tenant_id: &TenantId,
        plan_id: &PlanId,
    ) -> Result<Option<PlanSnapshot>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::Currency;

    fn snapshot() -> PlanSnapshot {
        PlanSnapshot {
            plan_id: PlanId::new(),
            name: "Profissional".to_string(),
            price_monthly: Money::from_minor_units(9990, Currency::Brl),
            price_annual: Money::from_minor_units(99900, Currency::Brl),
            feature_limits: serde_json::json!({ "max_processes": 50 }),
        }
    }

    // Trait object safety test
    #[test]
    fn plan_catalog_is_object_safe() {
        fn _accepts_dyn(_catalog: &dyn PlanCatalog) {}
    }

    #[test]
    fn price_for_selects_cycle_price() {
        let plan = snapshot();

        assert_eq!(
            plan.price_for(BillingCycle::Monthly),
            Money::from_minor_units(9990, Currency::Brl)
        );
        assert_eq!(
            plan.price_for(BillingCycle::Annual),
            Money::from_minor_units(99900, Currency::Brl)
        );
    }

    #[test]
    fn free_plan_has_zero_prices() {
        let free = PlanSnapshot {
            plan_id: PlanId::new(),
            name: "Gratuito".to_string(),
            price_monthly: Money::zero(Currency::Brl),
            price_annual: Money::zero(Currency::Brl),
            feature_limits: serde_json::json!({ "max_processes": 3 }),
        };

        assert!(free.is_free());
        assert!(!snapshot().is_free());
    }
}
