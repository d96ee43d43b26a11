//! Payment service
//!
//! Orchestrates the transaction lifecycle over a [`PaymentStore`] and the
//! registered [`GatewayAdapter`]s:
//!
//! 1. `create_payment_link` persists a pending transaction, then asks the
//!    provider for a hosted checkout.
//! 2. `handle_webhook` verifies, resolves and applies provider callbacks.
//! 3. `register_manual_payment` / `verify_manual` / `reject_manual` cover
//!    cash and bank transfers, which only an administrator can settle.
//!
//! Approval always flips the quote to PAID in the same store commit.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use core_kernel::{HealthCheckResult, PaymentMethodId, PortError, QuoteId};

use crate::adapters::{CheckoutRequest, GatewayAdapter, GatewayRegistry};
use crate::catalog::{self, BootstrapReport};
use crate::error::PaymentError;
use crate::gateway::{GatewayType, JsonMap, PaymentGateway, PublicGateway};
use crate::method::{PaymentMethod, PaymentMethodChanges};
use crate::ports::{PaymentStore, TransactionFilter, TransitionResult};
use crate::quote::Quote;
use crate::transaction::PaymentTransaction;
use crate::webhook::{GatewayNotification, NotificationOutcome, WebhookOutcome, WebhookRequest};

/// Label stored in quote payment data for payments without a gateway
const CASH_GATEWAY_LABEL: &str = "cash";

#[derive(Debug, Clone)]
pub struct PaymentServiceConfig {
    /// Zone in which quote due dates end
    pub billing_timezone: Tz,
    /// Link lifetime when the quote is already past due
    pub link_ttl: Duration,
}

impl Default for PaymentServiceConfig {
    fn default() -> Self {
        Self {
            billing_timezone: Tz::UTC,
            link_ttl: Duration::hours(72),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateLinkRequest {
    pub quote_id: QuoteId,
    pub gateway_type: GatewayType,
    pub payer_email: String,
    pub payment_method_id: Option<PaymentMethodId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentLink {
    pub payment_url: String,
    pub sandbox_url: Option<String>,
    pub transaction_id: String,
    pub preference_id: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualPaymentRequest {
    pub quote_id: QuoteId,
    pub payment_method_id: PaymentMethodId,
    /// Defaults to bank_transfer for methods that need a gateway
    pub gateway_type: Option<GatewayType>,
    pub payment_reference: Option<String>,
    pub registered_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualVerification {
    pub transaction_id: String,
    pub payment_reference: String,
    pub payment_proof: Option<String>,
    pub verified_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BankTransferInstructions {
    pub gateway_name: String,
    pub bank_info: JsonMap,
    pub instructions: Option<String>,
}

pub struct PaymentService {
    store: Arc<dyn PaymentStore>,
    gateways: GatewayRegistry,
    config: PaymentServiceConfig,
}

impl PaymentService {
    pub fn new(store: Arc<dyn PaymentStore>, gateways: GatewayRegistry) -> Self {
        Self {
            store,
            gateways,
            config: PaymentServiceConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PaymentServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &PaymentServiceConfig {
        &self.config
    }

    pub async fn health_check(&self) -> HealthCheckResult {
        self.store.health_check().await
    }

    // ========================================================================
    // Gateway checkout
    // ========================================================================

    /// Creates a pending transaction and a hosted payment link for a quote
    ///
    /// # Errors
    ///
    /// - `NotFound` if the quote or given payment method does not exist
    /// - `Validation` if the quote is not payable, the gateway type is manual,
    ///   inactive or has no adapter, or the method cannot be used for checkout
    /// - `GatewayCommunication` if the provider call fails; the transaction is
    ///   kept pending with `payment_details.creation_error`
    #[instrument(skip(self, request), fields(quote_id = %request.quote_id, gateway_type = %request.gateway_type))]
    pub async fn create_payment_link(
        &self,
        request: CreateLinkRequest,
    ) -> Result<PaymentLink, PaymentError> {
        let payer_email = request.payer_email.trim();
        if payer_email.is_empty() || !payer_email.contains('@') {
            return Err(PaymentError::validation("payer_email must be a valid email address"));
        }

        let quote = self.store.get_quote(request.quote_id).await?;
        quote.ensure_payable()?;

        if request.gateway_type.is_manual() {
            return Err(PaymentError::validation(format!(
                "{} payments are registered manually, not through a payment link",
                request.gateway_type
            )));
        }
        let gateway = self.active_gateway(request.gateway_type).await?;
        let adapter = self.adapter_for(request.gateway_type)?;
        let method = self.resolve_checkout_method(request.payment_method_id).await?;

        let now = Utc::now();
        let expires_at = self.link_expiry(quote.due_date, now);
        let mut transaction = PaymentTransaction::new(&quote, &method, Some(&gateway), Some(expires_at));
        transaction.set_detail("payer_email", payer_email);
        self.store.insert_transaction(&transaction).await?;

        let checkout = CheckoutRequest {
            transaction_id: transaction.transaction_id.clone(),
            quote_id: quote.id,
            title: checkout_title(&quote),
            amount: transaction.amount,
            payer_email: payer_email.to_string(),
            expires_at: Some(expires_at),
        };

        match adapter.create_checkout(&gateway, &checkout).await {
            Ok(session) => {
                transaction.set_detail("preference_id", session.preference_id.clone());
                transaction.set_detail("payment_url", session.payment_url.clone());
                transaction.set_detail("sandbox_url", json!(session.sandbox_url));
                transaction.set_detail("link_created_at", now.to_rfc3339());
                transaction.record_response(&session.raw);
                self.store.update_pending(&transaction).await?;

                info!(
                    transaction_id = %transaction.transaction_id,
                    preference_id = %session.preference_id,
                    "Payment link created"
                );

                Ok(PaymentLink {
                    payment_url: session.payment_url,
                    sandbox_url: session.sandbox_url,
                    transaction_id: transaction.transaction_id,
                    preference_id: session.preference_id,
                    expires_at,
                })
            }
            Err(err) => {
                warn!(
                    transaction_id = %transaction.transaction_id,
                    error = %err,
                    "Payment link creation failed; transaction left pending"
                );
                transaction.set_detail("creation_error", err.to_string());
                if let Err(store_err) = self.store.update_pending(&transaction).await {
                    error!(
                        transaction_id = %transaction.transaction_id,
                        error = %store_err,
                        "Failed to record link creation error"
                    );
                }
                Err(PaymentError::gateway(err.to_string()))
            }
        }
    }

    // ========================================================================
    // Webhooks
    // ========================================================================

    /// Applies a provider callback
    ///
    /// Signature verification runs before anything is read or written.
    /// Terminal transactions are acknowledged as replays. Returns `NotFound`
    /// when no transaction matches the callback.
    #[instrument(skip(self, request), fields(gateway_type = %gateway_type))]
    pub async fn handle_webhook(
        &self,
        gateway_type: GatewayType,
        request: &WebhookRequest,
    ) -> Result<WebhookOutcome, PaymentError> {
        if gateway_type.is_manual() {
            return Err(PaymentError::validation(format!(
                "{} gateways do not receive webhooks",
                gateway_type
            )));
        }
        let gateway = self.active_gateway(gateway_type).await?;
        let adapter = self.adapter_for(gateway_type)?;

        if let Err(err) = adapter.verify_signature(&gateway, request) {
            warn!(gateway = %gateway.name, error = %err, "Webhook verification failed");
            return Err(err);
        }

        let notification = adapter.resolve_notification(&gateway, request).await?;
        if notification.outcome == NotificationOutcome::Ignored {
            debug!("Notification acknowledged without action");
            return Ok(WebhookOutcome::Ignored {
                transaction_id: notification.transaction_ref,
                reason: "notification type not handled".to_string(),
            });
        }

        let mut transaction = self.locate_transaction(&notification).await?;
        if transaction.payment_gateway_id != Some(gateway.id) {
            warn!(
                transaction_id = %transaction.transaction_id,
                gateway = %gateway.name,
                "Webhook for a transaction bound to another gateway ignored"
            );
            return Ok(WebhookOutcome::Ignored {
                transaction_id: Some(transaction.transaction_id),
                reason: "transaction belongs to another gateway".to_string(),
            });
        }
        let method = self.store.get_payment_method(transaction.payment_method_id).await?;

        if method.manual_verification {
            warn!(
                transaction_id = %transaction.transaction_id,
                "Webhook for a manually verified transaction ignored"
            );
            return Ok(WebhookOutcome::Ignored {
                transaction_id: Some(transaction.transaction_id),
                reason: "transaction requires manual verification".to_string(),
            });
        }

        if transaction.status.is_terminal() {
            info!(
                transaction_id = %transaction.transaction_id,
                status = %transaction.status,
                "Webhook replay for terminal transaction"
            );
            return Ok(WebhookOutcome::Replayed {
                transaction_id: transaction.transaction_id,
                transaction_status: transaction.status,
            });
        }

        let now = Utc::now();
        if transaction.is_expired(now) {
            warn!(
                transaction_id = %transaction.transaction_id,
                "Callback received after payment link expiry"
            );
        }
        self.absorb_notification(&mut transaction, &notification, now);

        match notification.outcome {
            NotificationOutcome::Approved => {
                if notification.amount.is_none() {
                    warn!(
                        transaction_id = %transaction.transaction_id,
                        gateway = %gateway.name,
                        "Approval without reported amount"
                    );
                }
                if let Some(reported) = notification.amount {
                    if !reported.matches(&transaction.amount) {
                        warn!(
                            transaction_id = %transaction.transaction_id,
                            expected = %transaction.amount.amount(),
                            reported = %reported.value,
                            "Reported amount differs from quote; approval withheld"
                        );
                        transaction.set_detail("amount_mismatch", json!({
                            "expected": transaction.amount.amount().to_string(),
                            "reported": reported.value.to_string(),
                        }));
                        self.store.update_pending(&transaction).await?;
                        return Ok(WebhookOutcome::AmountMismatch {
                            transaction_id: transaction.transaction_id,
                            expected: transaction.amount.amount(),
                            reported: reported.value,
                        });
                    }
                }

                let (transaction, result) = self
                    .commit_approval(transaction, Some(gateway_type.as_str()), now)
                    .await?;
                Ok(transition_outcome(transaction, result))
            }
            NotificationOutcome::Rejected { ref reason } => {
                transaction.reject(reason, now)?;
                let result = self.store.commit_transition(&transaction, None).await?;
                info!(
                    transaction_id = %transaction.transaction_id,
                    reason = %reason,
                    "Transaction rejected by gateway"
                );
                Ok(transition_outcome(transaction, result))
            }
            NotificationOutcome::Pending | NotificationOutcome::Unknown(_) | NotificationOutcome::Ignored => {
                let reason = match &notification.outcome {
                    NotificationOutcome::Unknown(code) => format!("unhandled provider status '{}'", code),
                    _ => "payment still pending at provider".to_string(),
                };
                if !self.store.update_pending(&transaction).await? {
                    debug!(transaction_id = %transaction.transaction_id, "Transaction settled concurrently");
                }
                info!(transaction_id = %transaction.transaction_id, reason = %reason, "No transition applied");
                Ok(WebhookOutcome::Ignored {
                    transaction_id: Some(transaction.transaction_id),
                    reason,
                })
            }
        }
    }

    // ========================================================================
    // Manual payments
    // ========================================================================

    /// Registers a cash or bank transfer payment awaiting verification
    #[instrument(skip(self, request), fields(quote_id = %request.quote_id))]
    pub async fn register_manual_payment(
        &self,
        request: ManualPaymentRequest,
    ) -> Result<PaymentTransaction, PaymentError> {
        let quote = self.store.get_quote(request.quote_id).await?;
        quote.ensure_payable()?;

        let method = self.store.get_payment_method(request.payment_method_id).await?;
        if !method.supports_manual_registration() {
            return Err(PaymentError::validation(format!(
                "Payment method '{}' is not a manually verified method",
                method.name
            )));
        }

        let gateway = if method.requires_gateway {
            let gateway_type = request.gateway_type.unwrap_or(GatewayType::BankTransfer);
            if !gateway_type.is_manual() {
                return Err(PaymentError::validation(format!(
                    "Gateway type {} cannot be used for manual payments",
                    gateway_type
                )));
            }
            Some(self.active_gateway(gateway_type).await?)
        } else {
            None
        };

        let now = Utc::now();
        let mut transaction = PaymentTransaction::new(&quote, &method, gateway.as_ref(), None);
        if let Some(gateway) = &gateway {
            transaction.set_detail("transfer_instructions", Value::Object(gateway.bank_info.clone()));
        }
        if let Some(reference) = request.payment_reference.filter(|r| !r.trim().is_empty()) {
            transaction.set_detail("payment_reference", reference);
        }
        if let Some(registered_by) = request.registered_by {
            transaction.set_detail("registered_by", registered_by);
        }
        transaction.set_detail("registered_at", now.to_rfc3339());

        self.store.insert_transaction(&transaction).await?;
        info!(
            transaction_id = %transaction.transaction_id,
            method = %method.name,
            "Manual payment registered"
        );
        Ok(transaction)
    }

    /// Approves a pending manual transaction and marks its quote paid
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown transaction id
    /// - `InvalidState` if the transaction is already approved or rejected
    /// - `Validation` if the method is not manually verified
    #[instrument(skip(self, verification), fields(transaction_id = %verification.transaction_id))]
    pub async fn verify_manual(
        &self,
        verification: ManualVerification,
    ) -> Result<PaymentTransaction, PaymentError> {
        let mut transaction = self.require_transaction(&verification.transaction_id).await?;
        let method = self.require_manual_method(&transaction).await?;
        transaction.ensure_pending()?;

        let reference = verification.payment_reference.trim();
        if reference.is_empty() {
            return Err(PaymentError::validation("payment_reference is required"));
        }

        let now = Utc::now();
        transaction.set_detail("payment_reference", reference);
        transaction.set_detail("payment_proof", json!(verification.payment_proof));
        transaction.set_detail("verified_by", verification.verified_by.clone());
        transaction.set_detail("verified_at", now.to_rfc3339());

        let label = self.gateway_label(&transaction).await?;
        let (transaction, result) = self.commit_approval(transaction, Some(&label), now).await?;
        match result {
            TransitionResult::Applied { .. } => {
                info!(
                    transaction_id = %transaction.transaction_id,
                    method = %method.name,
                    verified_by = %verification.verified_by,
                    "Manual payment verified"
                );
                Ok(transaction)
            }
            TransitionResult::AlreadyFinal(status) => Err(PaymentError::InvalidState {
                transaction_id: transaction.transaction_id,
                status,
            }),
        }
    }

    /// Rejects a pending manual transaction
    #[instrument(skip(self, reason, rejected_by))]
    pub async fn reject_manual(
        &self,
        transaction_id: &str,
        reason: &str,
        rejected_by: &str,
    ) -> Result<PaymentTransaction, PaymentError> {
        let mut transaction = self.require_transaction(transaction_id).await?;
        self.require_manual_method(&transaction).await?;
        transaction.ensure_pending()?;

        let reason = reason.trim();
        if reason.is_empty() {
            return Err(PaymentError::validation("A rejection reason is required"));
        }

        let now = Utc::now();
        transaction.set_detail("rejected_by", rejected_by);
        transaction.set_detail("rejected_at", now.to_rfc3339());
        transaction.reject(reason, now)?;

        match self.store.commit_transition(&transaction, None).await? {
            TransitionResult::Applied { .. } => {
                info!(transaction_id = %transaction.transaction_id, "Manual payment rejected");
                Ok(transaction)
            }
            TransitionResult::AlreadyFinal(status) => Err(PaymentError::InvalidState {
                transaction_id: transaction.transaction_id,
                status,
            }),
        }
    }

    // ========================================================================
    // Catalog
    // ========================================================================

    /// Active payment methods, ordered by name
    pub async fn list_payment_methods(&self) -> Result<Vec<PaymentMethod>, PaymentError> {
        Ok(self.store.list_payment_methods(true).await?)
    }

    /// Adds a method to the catalog
    ///
    /// # Errors
    ///
    /// - `Validation` if the name is blank, too long or already taken
    #[instrument(skip(self, method), fields(name = %method.name))]
    pub async fn create_payment_method(
        &self,
        mut method: PaymentMethod,
    ) -> Result<PaymentMethod, PaymentError> {
        method.name = PaymentMethod::normalized_name(&method.name)?;
        self.store
            .insert_payment_method(&method)
            .await
            .map_err(|err| method_name_conflict(err, &method.name))?;

        info!(method_id = %method.id, "Payment method created");
        Ok(method)
    }

    /// Edits a method; switching it off follows the deactivation rules
    #[instrument(skip(self, changes))]
    pub async fn update_payment_method(
        &self,
        id: PaymentMethodId,
        changes: PaymentMethodChanges,
    ) -> Result<PaymentMethod, PaymentError> {
        let mut method = self.store.get_payment_method(id).await?;
        if changes.deactivates(&method) {
            self.ensure_no_pending(&method).await?;
        }

        method.apply(changes, Utc::now())?;
        self.store
            .update_payment_method(&method)
            .await
            .map_err(|err| method_name_conflict(err, &method.name))?;

        info!(method_id = %method.id, is_active = method.is_active, "Payment method updated");
        Ok(method)
    }

    /// Soft-deletes a method so it is no longer offered
    ///
    /// Methods are never removed: settled transactions keep pointing at them.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown method
    /// - `Validation` while pending transactions still use the method
    #[instrument(skip(self))]
    pub async fn deactivate_payment_method(
        &self,
        id: PaymentMethodId,
    ) -> Result<PaymentMethod, PaymentError> {
        let mut method = self.store.get_payment_method(id).await?;
        if !method.is_active {
            debug!(method_id = %id, "Payment method already inactive");
            return Ok(method);
        }
        self.ensure_no_pending(&method).await?;

        method.is_active = false;
        method.updated_at = Utc::now();
        self.store.update_payment_method(&method).await?;

        info!(method_id = %method.id, name = %method.name, "Payment method deactivated");
        Ok(method)
    }

    /// Active gateways without credentials, ordered by name
    pub async fn list_gateways(
        &self,
        gateway_type: Option<GatewayType>,
    ) -> Result<Vec<PublicGateway>, PaymentError> {
        let gateways = self.store.list_gateways(gateway_type, true).await?;
        Ok(gateways.iter().map(PaymentGateway::public_view).collect())
    }

    pub async fn bank_transfer_instructions(&self) -> Result<BankTransferInstructions, PaymentError> {
        let gateway = self.active_gateway(GatewayType::BankTransfer).await?;
        Ok(BankTransferInstructions {
            instructions: gateway.config_str("instructions").map(str::to_string),
            gateway_name: gateway.name,
            bank_info: gateway.bank_info,
        })
    }

    /// Creates the default methods and gateways that are missing
    ///
    /// Safe to run on every start. A default gateway is created inactive when
    /// another gateway of its type is already active.
    #[instrument(skip(self))]
    pub async fn bootstrap_catalog(&self) -> Result<BootstrapReport, PaymentError> {
        let mut report = BootstrapReport::default();

        for method in catalog::default_payment_methods() {
            if self.store.find_payment_method_by_name(&method.name).await?.is_some() {
                continue;
            }
            match self.store.insert_payment_method(&method).await {
                Ok(()) => report.methods_created.push(method.name),
                Err(PortError::Conflict { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }

        for mut gateway in catalog::default_gateways() {
            if self.store.find_gateway_by_name(&gateway.name).await?.is_some() {
                continue;
            }
            if gateway.is_active
                && !self
                    .store
                    .list_gateways(Some(gateway.gateway_type), true)
                    .await?
                    .is_empty()
            {
                gateway.is_active = false;
            }
            match self.store.insert_gateway(&gateway).await {
                Ok(()) => report.gateways_created.push(gateway.name),
                Err(PortError::Conflict { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }

        if report.is_noop() {
            debug!("Payment catalog already bootstrapped");
        } else {
            info!(
                methods = ?report.methods_created,
                gateways = ?report.gateways_created,
                "Payment catalog bootstrapped"
            );
        }
        Ok(report)
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Transactions ordered by creation time, oldest first
    pub async fn list_transactions(
        &self,
        filter: TransactionFilter,
    ) -> Result<Vec<PaymentTransaction>, PaymentError> {
        Ok(self.store.list_transactions(&filter).await?)
    }

    pub async fn get_transaction(&self, transaction_id: &str) -> Result<PaymentTransaction, PaymentError> {
        self.require_transaction(transaction_id).await
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// The single active gateway of a type
    async fn active_gateway(&self, gateway_type: GatewayType) -> Result<PaymentGateway, PaymentError> {
        let mut active = self.store.list_gateways(Some(gateway_type), true).await?;
        if active.len() > 1 {
            warn!(
                gateway_type = %gateway_type,
                count = active.len(),
                "More than one active gateway; using the first by name"
            );
        }
        if active.is_empty() {
            return Err(PaymentError::validation(format!(
                "No active {} gateway is configured",
                gateway_type
            )));
        }
        Ok(active.remove(0))
    }

    fn adapter_for(&self, gateway_type: GatewayType) -> Result<Arc<dyn GatewayAdapter>, PaymentError> {
        self.gateways.get(gateway_type).ok_or_else(|| {
            PaymentError::validation(format!("No adapter available for gateway type {}", gateway_type))
        })
    }

    async fn resolve_checkout_method(
        &self,
        method_id: Option<PaymentMethodId>,
    ) -> Result<PaymentMethod, PaymentError> {
        match method_id {
            Some(id) => {
                let method = self.store.get_payment_method(id).await?;
                if !method.supports_checkout() {
                    return Err(PaymentError::validation(format!(
                        "Payment method '{}' cannot be paid through a gateway link",
                        method.name
                    )));
                }
                Ok(method)
            }
            None => self
                .store
                .list_payment_methods(true)
                .await?
                .into_iter()
                .find(PaymentMethod::supports_checkout)
                .ok_or_else(|| {
                    PaymentError::validation("No active payment method supports gateway checkout")
                }),
        }
    }

    /// End of the due date in the billing zone, or `now + link_ttl` if that
    /// moment has already passed
    fn link_expiry(&self, due_date: NaiveDate, now: DateTime<Utc>) -> DateTime<Utc> {
        due_date
            .and_hms_opt(23, 59, 59)
            .and_then(|end| self.config.billing_timezone.from_local_datetime(&end).latest())
            .map(|end| end.with_timezone(&Utc))
            .filter(|end| *end > now)
            .unwrap_or(now + self.config.link_ttl)
    }

    async fn locate_transaction(
        &self,
        notification: &GatewayNotification,
    ) -> Result<PaymentTransaction, PaymentError> {
        if let Some(reference) = &notification.transaction_ref {
            if let Some(tx) = self.store.find_transaction(reference).await? {
                return Ok(tx);
            }
        }
        if let Some(external_id) = &notification.external_id {
            if let Some(tx) = self.store.find_transaction_by_external_id(external_id).await? {
                return Ok(tx);
            }
        }

        let key = notification
            .transaction_ref
            .clone()
            .or_else(|| notification.external_id.clone())
            .unwrap_or_else(|| "<none>".to_string());
        warn!(reference = %key, "Webhook for unknown transaction");
        Err(PaymentError::not_found("PaymentTransaction", key))
    }

    async fn require_transaction(&self, transaction_id: &str) -> Result<PaymentTransaction, PaymentError> {
        self.store
            .find_transaction(transaction_id)
            .await?
            .ok_or_else(|| PaymentError::not_found("PaymentTransaction", transaction_id))
    }

    async fn require_manual_method(
        &self,
        transaction: &PaymentTransaction,
    ) -> Result<PaymentMethod, PaymentError> {
        let method = self.store.get_payment_method(transaction.payment_method_id).await?;
        if !method.manual_verification {
            return Err(PaymentError::validation(format!(
                "Transaction {} uses '{}', which is settled by its gateway",
                transaction.transaction_id, method.name
            )));
        }
        Ok(method)
    }

    async fn gateway_label(&self, transaction: &PaymentTransaction) -> Result<String, PaymentError> {
        match transaction.payment_gateway_id {
            Some(id) => Ok(self.store.get_gateway(id).await?.gateway_type.as_str().to_string()),
            None => Ok(CASH_GATEWAY_LABEL.to_string()),
        }
    }

    /// Copies provider data onto a pending transaction
    fn absorb_notification(
        &self,
        transaction: &mut PaymentTransaction,
        notification: &GatewayNotification,
        now: DateTime<Utc>,
    ) {
        if let Some(external_id) = &notification.external_id {
            if !transaction.assign_external_id(external_id) {
                warn!(
                    transaction_id = %transaction.transaction_id,
                    recorded = ?transaction.external_id,
                    reported = %external_id,
                    "Callback reports a different provider id; keeping the recorded one"
                );
            }
        }
        transaction.merge_details(notification.details.clone());
        transaction.record_response(&notification.raw);
        transaction.mark_processed(now);
    }

    async fn ensure_no_pending(&self, method: &PaymentMethod) -> Result<(), PaymentError> {
        let pending = self.store.count_pending_for_method(method.id).await?;
        if pending > 0 {
            warn!(method_id = %method.id, pending, "Deactivation refused; method still in use");
            return Err(PaymentError::validation(format!(
                "Payment method '{}' has {} pending transactions",
                method.name, pending
            )));
        }
        Ok(())
    }

    /// Approves and marks the quote paid in one store commit
    async fn commit_approval(
        &self,
        mut transaction: PaymentTransaction,
        gateway_label: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(PaymentTransaction, TransitionResult), PaymentError> {
        transaction.approve(now)?;

        let mut quote = self.store.get_quote(transaction.quote_id).await?;
        let paid_quote = match quote.mark_paid(
            &transaction.transaction_id,
            transaction.external_id.as_deref(),
            gateway_label,
            now,
        ) {
            Ok(()) => Some(quote),
            Err(err) => {
                warn!(
                    transaction_id = %transaction.transaction_id,
                    quote_id = %transaction.quote_id,
                    quote_status = %quote.status,
                    error = %err,
                    "Quote not credited by approval"
                );
                None
            }
        };

        let result = self
            .store
            .commit_transition(&transaction, paid_quote.as_ref())
            .await?;
        if let TransitionResult::Applied { quote_marked_paid } = result {
            info!(
                transaction_id = %transaction.transaction_id,
                quote_marked_paid,
                "Transaction approved"
            );
        }
        Ok((transaction, result))
    }
}

fn method_name_conflict(err: PortError, name: &str) -> PaymentError {
    match err {
        PortError::Conflict { .. } => {
            PaymentError::validation(format!("Payment method '{}' already exists", name))
        }
        other => other.into(),
    }
}

fn transition_outcome(transaction: PaymentTransaction, result: TransitionResult) -> WebhookOutcome {
    match result {
        TransitionResult::Applied { quote_marked_paid } => WebhookOutcome::Processed {
            transaction_id: transaction.transaction_id,
            transaction_status: transaction.status,
            quote_marked_paid,
        },
        TransitionResult::AlreadyFinal(status) => WebhookOutcome::Replayed {
            transaction_id: transaction.transaction_id,
            transaction_status: status,
        },
    }
}

fn checkout_title(quote: &Quote) -> String {
    let period = match quote.period_month {
        Some(month) => format!("{:02}/{}", month, quote.period_year),
        None => quote.period_year.to_string(),
    };
    format!("Cuota {} - Vivienda {}", period, quote.house_code)
}
