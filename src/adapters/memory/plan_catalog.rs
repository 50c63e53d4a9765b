//! In-memory implementation of PlanCatalog.

use std::sync::RwLock;

use crate::domain::foundation::{DomainError, PlanId, TenantId};
use crate::ports::{PlanCatalog, PlanSnapshot};
use async_trait::async_trait;

/// In-memory plan catalog for tests and local development.
///
/// All plans are offered to every tenant; tenant-scoped offerings are a
/// production concern handled by the PostgreSQL read adapter.
///
/// # Panics
///
/// Methods panic if the internal lock is poisoned; acceptable for test
/// code, do not use in production.
pub struct InMemoryPlanCatalog {
    plans: RwLock<Vec<PlanSnapshot>>,
}

impl InMemoryPlanCatalog {
    pub fn new() -> Self {
        Self {
            plans: RwLock::new(Vec::new()),
        }
    }

    pub fn with_plans(plans: Vec<PlanSnapshot>) -> Self {
        Self {
            plans: RwLock::new(plans),
        }
    }

    pub fn add_plan(&self, plan: PlanSnapshot) {
        self.plans
            .write()
            .expect("InMemoryPlanCatalog: lock poisoned")
            .push(plan);
    }
}

impl Default for InMemoryPlanCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlanCatalog for InMemoryPlanCatalog {
    async fn plan_for_tenant(
        &self,
        _tenant_id: &TenantId,
        plan_id: &PlanId,
    ) -> Result<Option<PlanSnapshot>, DomainError> {
        Ok(self
            .plans
            .read()
            .expect("InMemoryPlanCatalog: lock poisoned")
            .iter()
            .find(|p| &p.plan_id == plan_id)
            .cloned())
    }
}
