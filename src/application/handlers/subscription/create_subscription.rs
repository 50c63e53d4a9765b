//! CreateSubscriptionHandler - Command handler for creating subscriptions.

use std::sync::Arc;

use crate::domain::foundation::{
    Currency, EventId, PlanId, SubscriptionId, TenantId, Timestamp,
};
use crate::domain::payment::{IdempotencyKey, PaymentMethod, PaymentRequest};
use crate::domain::subscription::{
    reconcile, BillingCycle, ReconcileOutcome, Subscription, SubscriptionError, SubscriptionEvent,
    SubscriptionStatus,
};
use crate::ports::{EventPublisher, PaymentGateway, PlanCatalog, SubscriptionRepository};

use super::charge_execution::{charge_with_retry, ChargeAttempt};
use super::publish_events;

/// Days after the paid period in which access is kept while renewal is
/// retried.
const DEFAULT_GRACE_PERIOD_DAYS: u16 = 7;

const DEFAULT_CHARGE_ATTEMPTS: u32 = 3;

/// Command to create a subscription for a tenant.
#[derive(Debug, Clone)]
pub struct CreateSubscriptionCommand {
    pub tenant_id: TenantId,
    pub plan_id: PlanId,
    pub cycle: BillingCycle,
    pub payment_method: PaymentMethod,
    /// Tokenized card, required iff the method is credit_card.
    pub card_token: Option<String>,
    pub payer_email: String,
    /// CPF or CNPJ, when the provider requires one (boleto).
    pub payer_tax_id: Option<String>,
}

/// How the creation settled on the synchronous path.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateSubscriptionOutcome {
    /// First charge approved (or free plan); access is on.
    Activated,

    /// Charge accepted but not settled (pix/boleto, or transport outcome
    /// unknown); confirmation arrives by webhook.
    PendingConfirmation,

    /// Provider explicitly declined the first charge.
    Declined { reason: Option<String> },
}

/// Result of a creation attempt.
#[derive(Debug, Clone)]
pub struct CreateSubscriptionResult {
    pub subscription: Subscription,
    pub outcome: CreateSubscriptionOutcome,
}

/// Handler for creating subscriptions.
///
/// Free plans activate immediately and never reach the gateway. Paid plans
/// persist a `pendente` row first, then charge with a deterministic
/// idempotency key so retries can never double-charge, and finally
/// reconcile the provider's answer onto the row.
pub struct CreateSubscriptionHandler {
    repository: Arc<dyn SubscriptionRepository>,
    plan_catalog: Arc<dyn PlanCatalog>,
    gateway: Arc<dyn PaymentGateway>,
    event_publisher: Arc<dyn EventPublisher>,
    max_charge_attempts: u32,
}

impl CreateSubscriptionHandler {
    pub fn new(
        repository: Arc<dyn SubscriptionRepository>,
        plan_catalog: Arc<dyn PlanCatalog>,
        gateway: Arc<dyn PaymentGateway>,
        event_publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            repository,
            plan_catalog,
            gateway,
            event_publisher,
            max_charge_attempts: DEFAULT_CHARGE_ATTEMPTS,
        }
    }

    /// Overrides the transport retry budget for the first charge.
    pub fn with_max_charge_attempts(mut self, attempts: u32) -> Self {
        self.max_charge_attempts = attempts.max(1);
        self
    }

    pub async fn handle(
        &self,
        cmd: CreateSubscriptionCommand,
    ) -> Result<CreateSubscriptionResult, SubscriptionError> {
        // 1. Resolve the plan from the read model
        let plan = self
            .plan_catalog
            .plan_for_tenant(&cmd.tenant_id, &cmd.plan_id)
            .await?
            .ok_or_else(|| SubscriptionError::plan_not_found(cmd.plan_id))?;

        let price = plan.price_for(cmd.cycle);

        // 2. Free plans activate immediately, no gateway involved
        if plan.is_free() {
            return self.create_free(&cmd, price.currency()).await;
        }

        // 3. Build the aggregate and validate the charge request before
        //    persisting anything; a missing card token never leaves a row
        let subscription = Subscription::create_pending(
            SubscriptionId::new(),
            cmd.tenant_id,
            cmd.plan_id,
            cmd.cycle,
            price,
            cmd.payment_method,
            DEFAULT_GRACE_PERIOD_DAYS,
        )?;
        let request = self.build_charge_request(&cmd, &subscription, &plan.name)?;

        // 4. Persist the pendente row before any gateway call, so a crash
        //    mid-charge leaves a record to resolve against
        self.repository.save(&subscription).await?;

        let created_event = SubscriptionEvent::Created {
            event_id: EventId::new(),
            subscription_id: subscription.id,
            tenant_id: subscription.tenant_id,
            plan_id: subscription.plan_id,
            cycle: subscription.cycle,
            amount: subscription.amount,
            payment_method: subscription.payment_method,
            is_free: false,
            occurred_at: Timestamp::now(),
        };
        publish_events(self.event_publisher.as_ref(), &[created_event]).await?;

        // 5. Charge; the key is a pure function of (subscription, creation
        //    instant) so every retry of this first charge reuses it
        let idempotency_key =
            IdempotencyKey::for_billing_period(&subscription.id, &subscription.created_at);

        let attempt = charge_with_retry(
            &self.gateway,
            &request,
            &idempotency_key,
            self.max_charge_attempts,
        )
        .await?;

        let result = match attempt {
            ChargeAttempt::Completed(result) => result,
            ChargeAttempt::Unresolved => {
                // Outcome unknown at the provider; the row stays pendente
                // and the webhook (or a status query) settles it later
                tracing::info!(
                    subscription_id = %subscription.id,
                    "first charge unresolved, awaiting provider confirmation"
                );
                return Ok(CreateSubscriptionResult {
                    subscription,
                    outcome: CreateSubscriptionOutcome::PendingConfirmation,
                });
            }
        };

        // 6. Reconcile the provider's answer onto the row
        let outcome = reconcile(&subscription, &result, Timestamp::now())?;
        let (subscription, events) = match outcome {
            ReconcileOutcome::Applied {
                subscription,
                events,
            } => (subscription, events),
            // The row was just created; its recorded status cannot
            // supersede a fresh result
            ReconcileOutcome::Stale { subscription } => (subscription, Vec::new()),
        };
        self.repository.update(&subscription).await?;
        publish_events(self.event_publisher.as_ref(), &events).await?;

        tracing::info!(
            subscription_id = %subscription.id,
            status = %subscription.status,
            payment_status = %result.status,
            "subscription created and first charge reconciled"
        );

        let outcome = match subscription.status {
            SubscriptionStatus::Active => CreateSubscriptionOutcome::Activated,
            SubscriptionStatus::Suspended => CreateSubscriptionOutcome::Declined {
                reason: result.error_message.clone(),
            },
            _ => CreateSubscriptionOutcome::PendingConfirmation,
        };

        Ok(CreateSubscriptionResult {
            subscription,
            outcome,
        })
    }

    async fn create_free(
        &self,
        cmd: &CreateSubscriptionCommand,
        currency: Currency,
    ) -> Result<CreateSubscriptionResult, SubscriptionError> {
        let subscription = Subscription::create_free(
            SubscriptionId::new(),
            cmd.tenant_id,
            cmd.plan_id,
            cmd.cycle,
            currency,
        );
        self.repository.save(&subscription).await?;

        let event = SubscriptionEvent::Created {
            event_id: EventId::new(),
            subscription_id: subscription.id,
            tenant_id: subscription.tenant_id,
            plan_id: subscription.plan_id,
            cycle: subscription.cycle,
            amount: subscription.amount,
            payment_method: subscription.payment_method,
            is_free: true,
            occurred_at: Timestamp::now(),
        };
        publish_events(self.event_publisher.as_ref(), &[event]).await?;

        tracing::info!(
            subscription_id = %subscription.id,
            tenant_id = %subscription.tenant_id,
            "free subscription activated"
        );

        Ok(CreateSubscriptionResult {
            subscription,
            outcome: CreateSubscriptionOutcome::Activated,
        })
    }

    fn build_charge_request(
        &self,
        cmd: &CreateSubscriptionCommand,
        subscription: &Subscription,
        plan_name: &str,
    ) -> Result<PaymentRequest, SubscriptionError> {
        let mut builder = PaymentRequest::builder(subscription.amount, cmd.payment_method)
            .description(format!("Assinatura {} ({})", plan_name, cmd.cycle))
            .payer_email(cmd.payer_email.clone())
            .external_reference(subscription.id.to_string())
            .metadata_entry("tenant_id", cmd.tenant_id.to_string())
            .metadata_entry("plan_id", cmd.plan_id.to_string());

        if let Some(token) = &cmd.card_token {
            builder = builder.card_token(token.clone());
        }
        if let Some(tax_id) = &cmd.payer_tax_id {
            builder = builder.payer_tax_id(tax_id.clone());
        }

        Ok(builder.build()?)
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{DomainError, EventEnvelope, Money};
    use crate::domain::payment::PaymentResult;
    use crate::ports::{GatewayError, PlanSnapshot, WebhookNotification};
    use async_trait::async_trait;
    use std::sync::Mutex;

    // ════════════════════════════════════════════════════════════════════════════
    // Mock Implementations
    // ════════════════════════════════════════════════════════════════════════════

    struct MockSubscriptionRepository {
        subscriptions: Mutex<Vec<Subscription>>,
    }

    impl MockSubscriptionRepository {
        fn new() -> Self {
            Self {
                subscriptions: Mutex::new(Vec::new()),
            }
        }

        fn stored(&self) -> Vec<Subscription> {
            self.subscriptions.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SubscriptionRepository for MockSubscriptionRepository {
        async fn save(&self, subscription: &Subscription) -> Result<(), DomainError> {
            self.subscriptions.lock().unwrap().push(subscription.clone());
            Ok(())
        }

        async fn update(&self, subscription: &Subscription) -> Result<(), DomainError> {
            let mut subscriptions = self.subscriptions.lock().unwrap();
            if let Some(s) = subscriptions.iter_mut().find(|s| s.id == subscription.id) {
                *s = subscription.clone();
            }
            Ok(())
        }

        async fn find_by_id(
            &self,
            id: &SubscriptionId,
        ) -> Result<Option<Subscription>, DomainError> {
            Ok(self
                .subscriptions
                .lock()
                .unwrap()
                .iter()
                .find(|s| &s.id == id)
                .cloned())
        }

        async fn find_by_external_id(
            &self,
            external_id: &str,
        ) -> Result<Option<Subscription>, DomainError> {
            Ok(self
                .subscriptions
                .lock()
                .unwrap()
                .iter()
                .find(|s| s.external_transaction_id.as_deref() == Some(external_id))
                .cloned())
        }

        async fn find_latest_for_tenant(
            &self,
            tenant_id: &TenantId,
        ) -> Result<Option<Subscription>, DomainError> {
            Ok(self
                .subscriptions
                .lock()
                .unwrap()
                .iter()
                .filter(|s| &s.tenant_id == tenant_id)
                .max_by_key(|s| *s.created_at.as_datetime())
                .cloned())
        }

        async fn list_expiring_before(
            &self,
            _cutoff: Timestamp,
        ) -> Result<Vec<Subscription>, DomainError> {
            Ok(vec![])
        }
    }

    struct MockPlanCatalog {
        plan: Option<PlanSnapshot>,
    }

    #[async_trait]
    impl PlanCatalog for MockPlanCatalog {
        async fn plan_for_tenant(
            &self,
            _tenant_id: &TenantId,
            _plan_id: &PlanId,
        ) -> Result<Option<PlanSnapshot>, DomainError> {
            Ok(self.plan.clone())
        }
    }

    struct MockPaymentGateway {
        outcomes: Mutex<Vec<Result<PaymentResult, GatewayError>>>,
        keys_seen: Mutex<Vec<String>>,
    }

    impl MockPaymentGateway {
        fn approving(external_id: &str, amount: Money) -> Self {
            Self {
                outcomes: Mutex::new(vec![Ok(PaymentResult::approved(
                    external_id,
                    amount,
                    PaymentMethod::CreditCard,
                    Timestamp::now(),
                ))]),
                keys_seen: Mutex::new(Vec::new()),
            }
        }

        fn scripted(outcomes: Vec<Result<PaymentResult, GatewayError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes),
                keys_seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PaymentGateway for MockPaymentGateway {
        async fn charge(
            &self,
            _request: &PaymentRequest,
            idempotency_key: &IdempotencyKey,
        ) -> Result<PaymentResult, GatewayError> {
            self.keys_seen
                .lock()
                .unwrap()
                .push(idempotency_key.as_str().to_string());
            self.outcomes.lock().unwrap().remove(0)
        }

        async fn query_status(&self, _external_id: &str) -> Result<PaymentResult, GatewayError> {
            Err(GatewayError::transport("not scripted"))
        }

        fn verify_webhook_signature(
            &self,
            _payload: &[u8],
            _signature_header: &str,
            _now: Timestamp,
        ) -> Result<(), GatewayError> {
            Ok(())
        }

        fn parse_webhook(&self, _payload: &[u8]) -> Result<WebhookNotification, GatewayError> {
            Err(GatewayError::malformed_payload("not scripted"))
        }
    }

    struct MockEventPublisher {
        published_events: Mutex<Vec<EventEnvelope>>,
    }

    impl MockEventPublisher {
        fn new() -> Self {
            Self {
                published_events: Mutex::new(Vec::new()),
            }
        }

        fn published_events(&self) -> Vec<EventEnvelope> {
            self.published_events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventPublisher for MockEventPublisher {
        async fn publish(&self, event: EventEnvelope) -> Result<(), DomainError> {
            self.published_events.lock().unwrap().push(event);
            Ok(())
        }

        async fn publish_all(&self, events: Vec<EventEnvelope>) -> Result<(), DomainError> {
            for event in events {
                self.publish(event).await?;
            }
            Ok(())
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Test Helpers
    // ════════════════════════════════════════════════════════════════════════════

    fn paid_plan() -> PlanSnapshot {
        PlanSnapshot {
            plan_id: PlanId::new(),
            name: "Profissional".to_string(),
            price_monthly: Money::from_minor_units(9990, Currency::Brl),
            price_annual: Money::from_minor_units(99900, Currency::Brl),
            feature_limits: serde_json::json!({ "max_processes": 50 }),
        }
    }

    fn free_plan() -> PlanSnapshot {
        PlanSnapshot {
            plan_id: PlanId::new(),
            name: "Gratuito".to_string(),
            price_monthly: Money::zero(Currency::Brl),
            price_annual: Money::zero(Currency::Brl),
            feature_limits: serde_json::json!({ "max_processes": 3 }),
        }
    }

    fn card_command(plan_id: PlanId) -> CreateSubscriptionCommand {
        CreateSubscriptionCommand {
            tenant_id: TenantId::new(),
            plan_id,
            cycle: BillingCycle::Monthly,
            payment_method: PaymentMethod::CreditCard,
            card_token: Some("tok_abc".to_string()),
            payer_email: "financeiro@prefeitura.gov.br".to_string(),
            payer_tax_id: None,
        }
    }

    fn build_handler(
        repo: Arc<MockSubscriptionRepository>,
        catalog: MockPlanCatalog,
        gateway: Arc<MockPaymentGateway>,
        publisher: Arc<MockEventPublisher>,
    ) -> CreateSubscriptionHandler {
        CreateSubscriptionHandler::new(repo, Arc::new(catalog), gateway, publisher)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Success Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn approved_first_charge_activates_subscription() {
        let plan = paid_plan();
        let repo = Arc::new(MockSubscriptionRepository::new());
        let gateway = Arc::new(MockPaymentGateway::approving(
            "mp-100",
            plan.price_monthly,
        ));
        let publisher = Arc::new(MockEventPublisher::new());
        let cmd = card_command(plan.plan_id);
        let handler = build_handler(
            repo.clone(),
            MockPlanCatalog { plan: Some(plan) },
            gateway,
            publisher,
        );

        let result = handler.handle(cmd).await.unwrap();

        assert_eq!(result.outcome, CreateSubscriptionOutcome::Activated);
        assert_eq!(result.subscription.status, SubscriptionStatus::Active);
        assert_eq!(
            result.subscription.external_transaction_id.as_deref(),
            Some("mp-100")
        );
        assert!(result.subscription.current_period_end.is_some());

        let stored = repo.stored();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn publishes_created_and_activated_events() {
        let plan = paid_plan();
        let repo = Arc::new(MockSubscriptionRepository::new());
        let gateway = Arc::new(MockPaymentGateway::approving("mp-100", plan.price_monthly));
        let publisher = Arc::new(MockEventPublisher::new());
        let cmd = card_command(plan.plan_id);
        let handler = build_handler(
            repo,
            MockPlanCatalog { plan: Some(plan) },
            gateway,
            publisher.clone(),
        );

        handler.handle(cmd).await.unwrap();

        let events = publisher.published_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "subscription.created");
        assert_eq!(events[1].event_type, "subscription.activated");
    }

    #[tokio::test]
    async fn free_plan_activates_without_gateway_call() {
        let plan = free_plan();
        let repo = Arc::new(MockSubscriptionRepository::new());
        let gateway = Arc::new(MockPaymentGateway::scripted(vec![]));
        let publisher = Arc::new(MockEventPublisher::new());
        let mut cmd = card_command(plan.plan_id);
        cmd.payment_method = PaymentMethod::CreditCard; // ignored for free plans
        cmd.card_token = None;
        let handler = build_handler(
            repo.clone(),
            MockPlanCatalog { plan: Some(plan) },
            gateway.clone(),
            publisher.clone(),
        );

        let result = handler.handle(cmd).await.unwrap();

        assert_eq!(result.outcome, CreateSubscriptionOutcome::Activated);
        assert_eq!(result.subscription.status, SubscriptionStatus::Active);
        assert_eq!(result.subscription.payment_method, PaymentMethod::Gratuito);
        assert!(result.subscription.amount.is_zero());
        assert!(result.subscription.current_period_end.is_none());
        assert!(gateway.keys_seen.lock().unwrap().is_empty());

        let events = publisher.published_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "subscription.created");
    }

    #[tokio::test]
    async fn pending_settlement_reports_pending_confirmation() {
        let plan = paid_plan();
        let price = plan.price_monthly;
        let now = Timestamp::now();
        let pending_result = PaymentResult::new(
            "mp-200",
            crate::domain::payment::PaymentStatus::Pending,
            price,
            PaymentMethod::Boleto,
            now,
            None,
        )
        .unwrap();
        let repo = Arc::new(MockSubscriptionRepository::new());
        let gateway = Arc::new(MockPaymentGateway::scripted(vec![Ok(pending_result)]));
        let publisher = Arc::new(MockEventPublisher::new());
        let mut cmd = card_command(plan.plan_id);
        cmd.payment_method = PaymentMethod::Boleto;
        cmd.card_token = None;
        cmd.payer_tax_id = Some("52998224725".to_string());
        let handler = build_handler(
            repo.clone(),
            MockPlanCatalog { plan: Some(plan) },
            gateway,
            publisher,
        );

        let result = handler.handle(cmd).await.unwrap();

        assert_eq!(
            result.outcome,
            CreateSubscriptionOutcome::PendingConfirmation
        );
        assert_eq!(result.subscription.status, SubscriptionStatus::Pending);
        // The boleto id is tracked so the webhook can find this row
        assert_eq!(
            result.subscription.external_transaction_id.as_deref(),
            Some("mp-200")
        );
    }

    #[tokio::test]
    async fn transport_failures_leave_row_pending_with_same_key() {
        let plan = paid_plan();
        let repo = Arc::new(MockSubscriptionRepository::new());
        let gateway = Arc::new(MockPaymentGateway::scripted(vec![
            Err(GatewayError::transport("timeout")),
            Err(GatewayError::transport("timeout")),
            Err(GatewayError::transport("timeout")),
        ]));
        let publisher = Arc::new(MockEventPublisher::new());
        let cmd = card_command(plan.plan_id);
        let handler = build_handler(
            repo.clone(),
            MockPlanCatalog { plan: Some(plan) },
            gateway.clone(),
            publisher,
        );

        let result = handler.handle(cmd).await.unwrap();

        assert_eq!(
            result.outcome,
            CreateSubscriptionOutcome::PendingConfirmation
        );
        assert_eq!(result.subscription.status, SubscriptionStatus::Pending);

        let keys = gateway.keys_seen.lock().unwrap();
        assert_eq!(keys.len(), 3);
        assert!(keys.iter().all(|k| k == &keys[0]));
    }

    #[tokio::test]
    async fn declined_charge_suspends_and_reports_reason() {
        let plan = paid_plan();
        let price = plan.price_monthly;
        let repo = Arc::new(MockSubscriptionRepository::new());
        let gateway = Arc::new(MockPaymentGateway::scripted(vec![Ok(
            PaymentResult::rejected(
                "mp-300",
                price,
                PaymentMethod::CreditCard,
                Timestamp::now(),
                "cc_rejected_insufficient_amount",
            ),
        )]));
        let publisher = Arc::new(MockEventPublisher::new());
        let cmd = card_command(plan.plan_id);
        let handler = build_handler(
            repo.clone(),
            MockPlanCatalog { plan: Some(plan) },
            gateway,
            publisher.clone(),
        );

        let result = handler.handle(cmd).await.unwrap();

        assert_eq!(
            result.outcome,
            CreateSubscriptionOutcome::Declined {
                reason: Some("cc_rejected_insufficient_amount".to_string())
            }
        );
        assert_eq!(result.subscription.status, SubscriptionStatus::Suspended);

        let events = publisher.published_events();
        assert_eq!(events.last().unwrap().event_type, "subscription.suspended");
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Failure Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn fails_when_plan_not_found() {
        let repo = Arc::new(MockSubscriptionRepository::new());
        let gateway = Arc::new(MockPaymentGateway::scripted(vec![]));
        let publisher = Arc::new(MockEventPublisher::new());
        let handler = build_handler(
            repo.clone(),
            MockPlanCatalog { plan: None },
            gateway,
            publisher,
        );

        let result = handler.handle(card_command(PlanId::new())).await;

        assert!(matches!(result, Err(SubscriptionError::PlanNotFound(_))));
        assert!(repo.stored().is_empty());
    }

    #[tokio::test]
    async fn credit_card_without_token_fails_validation() {
        let plan = paid_plan();
        let repo = Arc::new(MockSubscriptionRepository::new());
        let gateway = Arc::new(MockPaymentGateway::scripted(vec![]));
        let publisher = Arc::new(MockEventPublisher::new());
        let mut cmd = card_command(plan.plan_id);
        cmd.card_token = None;
        let handler = build_handler(
            repo.clone(),
            MockPlanCatalog { plan: Some(plan) },
            gateway.clone(),
            publisher,
        );

        let result = handler.handle(cmd).await;

        assert!(matches!(
            result,
            Err(SubscriptionError::ValidationFailed { ref field, .. }) if field == "card_token"
        ));
        // No gateway call was made
        assert!(gateway.keys_seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn authentication_failure_surfaces_as_gateway_unavailable() {
        let plan = paid_plan();
        let repo = Arc::new(MockSubscriptionRepository::new());
        let gateway = Arc::new(MockPaymentGateway::scripted(vec![Err(
            GatewayError::authentication("invalid access token"),
        )]));
        let publisher = Arc::new(MockEventPublisher::new());
        let cmd = card_command(plan.plan_id);
        let handler = build_handler(
            repo,
            MockPlanCatalog { plan: Some(plan) },
            gateway,
            publisher,
        );

        let result = handler.handle(cmd).await;

        assert!(matches!(
            result,
            Err(SubscriptionError::GatewayUnavailable(_))
        ));
    }
}
