use super::ledger::{AccountingLedger, PaymentDetails, Reconciliation};
use super::wallets::{WALLET_METHOD, WalletService};
use crate::config::Settings;
use crate::domain::gateway::ChargeReceipt;
use crate::domain::invoice::{Invoice, PaymentClaim};
use crate::domain::ledger::{FEE_SUFFIX, RENT_SUFFIX, derive_idempotency_key, entry_key};
use crate::domain::money::Amount;
use crate::domain::ports::{
    GatewayBox, NotifierHandle, StorageHandle, UnitOfWork, UserDirectoryHandle,
};
use crate::domain::wallet::WalletTxType;
use crate::domain::{InvoiceId, UserId};
use crate::error::{PaymentError, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;
use tracing::{error, info, instrument, warn};

const DEFAULT_TENANT_NAME: &str = "Tenant";

/// How the tenant pays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentMethod {
    /// Debit the payer's wallet.
    Wallet,
    /// Charge through the payment provider. The label is informational.
    External(String),
}

impl FromStr for PaymentMethod {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PaymentError::ValidationError(
                "payment method must not be empty".into(),
            ));
        }
        if s.eq_ignore_ascii_case("wallet") {
            Ok(PaymentMethod::Wallet)
        } else {
            Ok(PaymentMethod::External(s.to_string()))
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::Wallet => f.write_str("wallet"),
            PaymentMethod::External(label) => f.write_str(label),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentReceipt {
    pub invoice_id: InvoiceId,
    /// `WAL-<id>` for wallet payments, the provider's charge id otherwise.
    pub transaction_id: String,
    pub rent: Decimal,
    pub service_fees: Decimal,
    pub platform_fee: Decimal,
    pub total: Decimal,
    pub provider: String,
    /// True when the idempotency key had already been applied and nothing new
    /// happened.
    pub replayed: bool,
}

impl PaymentReceipt {
    pub fn receipt_number(&self) -> String {
        format!("RCP-{:05}-{}", self.invoice_id, self.transaction_id)
    }
}

/// Entry point for collecting rent.
///
/// Validates the request, moves the money (wallet debit or provider charge and
/// transfer), reconciles the invoice against the ledger and notifies the
/// landlord. Retries with the same idempotency key return the first result.
pub struct PaymentOrchestrator {
    storage: StorageHandle,
    users: UserDirectoryHandle,
    gateway: GatewayBox,
    notifier: NotifierHandle,
    ledger: AccountingLedger,
    currency: String,
    claim_ttl: chrono::Duration,
    idempotency_scope: String,
}

impl PaymentOrchestrator {
    pub fn new(
        storage: StorageHandle,
        users: UserDirectoryHandle,
        gateway: GatewayBox,
        notifier: NotifierHandle,
        settings: &Settings,
    ) -> Self {
        Self {
            ledger: AccountingLedger::new(storage.clone()),
            storage,
            users,
            gateway,
            notifier,
            currency: settings.gateway.currency.clone(),
            claim_ttl: chrono::Duration::from_std(settings.claim_ttl)
                .unwrap_or(chrono::Duration::MAX),
            idempotency_scope: settings.idempotency_scope.clone(),
        }
    }

    pub fn ledger(&self) -> &AccountingLedger {
        &self.ledger
    }

    /// Key for callers that did not bring their own.
    pub fn idempotency_key_for(&self, payer_id: UserId, invoice_id: InvoiceId) -> String {
        derive_idempotency_key(&self.idempotency_scope, payer_id, invoice_id)
    }

    #[instrument(skip(self, method), fields(method = %method))]
    pub async fn collect_payment(
        &self,
        payer_id: UserId,
        invoice_id: InvoiceId,
        idempotency_key: &str,
        method: &PaymentMethod,
    ) -> Result<PaymentReceipt> {
        let key = idempotency_key.trim();
        if key.is_empty() {
            return Err(PaymentError::ValidationError(
                "idempotency key must not be empty".into(),
            ));
        }

        let invoice = self
            .storage
            .find_invoice(invoice_id)
            .await?
            .ok_or_else(|| PaymentError::not_found("invoice", invoice_id))?;
        if invoice.tenant_id != payer_id {
            return Err(PaymentError::Unauthorized {
                payer: payer_id,
                invoice: invoice_id,
            });
        }

        if self
            .storage
            .ledger_entry_by_key(&entry_key(key, RENT_SUFFIX))
            .await?
            .is_some()
        {
            return self.replayed_receipt(invoice_id, key).await;
        }
        if invoice.is_paid() {
            return Err(PaymentError::AlreadyPaid(invoice_id));
        }

        let charge_amount = invoice.chargeable_total()?;
        if invoice.amount != charge_amount.value() {
            warn!(
                stored = %invoice.amount,
                computed = %charge_amount,
                "invoice total does not match rent plus fees, charging the computed total"
            );
        }

        let receipt = match method {
            PaymentMethod::Wallet => self.pay_from_wallet(&invoice, key, charge_amount).await?,
            PaymentMethod::External(_) => {
                self.pay_with_provider(&invoice, key, charge_amount).await?
            }
        };
        if receipt.replayed {
            return Ok(receipt);
        }

        info!(
            transaction_id = %receipt.transaction_id,
            total = %receipt.total,
            provider = %receipt.provider,
            "payment collected"
        );
        self.notify_landlord(&invoice, receipt.total);
        Ok(receipt)
    }

    /// Debit, payment mark and ledger entries in one unit of work.
    async fn pay_from_wallet(
        &self,
        invoice: &Invoice,
        key: &str,
        total: Amount,
    ) -> Result<PaymentReceipt> {
        let mut uow = self.storage.begin().await?;
        if !self.recheck_in(uow.as_mut(), invoice.id, key).await? {
            drop(uow);
            return self.replayed_receipt(invoice.id, key).await;
        }

        let tx = WalletService::debit_in(
            uow.as_mut(),
            invoice.tenant_id,
            total,
            WalletTxType::RentPayment,
            WALLET_METHOD,
        )
        .await?;
        let transaction_id = format!("WAL-{}", tx.id);
        let details = self.details(invoice, key, WALLET_METHOD, &transaction_id);

        match AccountingLedger::reconcile_in(uow.as_mut(), invoice.id, &details).await? {
            Reconciliation::Applied(_) => uow.commit().await?,
            Reconciliation::AlreadySettled(_) => {
                return Err(PaymentError::AlreadyPaid(invoice.id));
            }
        }

        Ok(self.receipt(invoice, transaction_id, WALLET_METHOD))
    }

    async fn pay_with_provider(
        &self,
        invoice: &Invoice,
        key: &str,
        total: Amount,
    ) -> Result<PaymentReceipt> {
        if !self.claim(invoice.id, key).await? {
            return self.replayed_receipt(invoice.id, key).await;
        }

        let charge = match self.gateway.charge(total, &self.currency).await {
            Ok(receipt) if receipt.success => receipt,
            Ok(receipt) => {
                self.release_claim(invoice.id, key).await;
                return Err(PaymentError::ProviderRejected(format!(
                    "charge {} was declined by {}",
                    receipt.transaction_id, receipt.provider
                )));
            }
            Err(e) => {
                self.release_claim(invoice.id, key).await;
                return Err(e);
            }
        };

        let destination = invoice.landlord_account_ref();
        match self
            .gateway
            .transfer(total, invoice.rent, invoice.service_fees, &destination)
            .await
        {
            Ok(transfer) if transfer.success => {}
            Ok(transfer) => {
                let cause = PaymentError::ProviderRejected(format!(
                    "transfer {} to {destination} was declined",
                    transfer.transfer_id
                ));
                return Err(self.compensate(invoice.id, key, &charge, total, cause).await);
            }
            Err(e) => return Err(self.compensate(invoice.id, key, &charge, total, e).await),
        }

        let details = self.details(invoice, key, &charge.provider, &charge.transaction_id);
        match self.ledger.reconcile(invoice.id, &details).await {
            Ok(Reconciliation::Applied(_)) => {}
            Ok(Reconciliation::AlreadySettled(_)) => {
                let cause = PaymentError::AlreadyPaid(invoice.id);
                return Err(self.compensate(invoice.id, key, &charge, total, cause).await);
            }
            Err(e) => return Err(self.compensate(invoice.id, key, &charge, total, e).await),
        }

        Ok(self.receipt(invoice, charge.transaction_id.clone(), &charge.provider))
    }

    /// Re-validates the invoice under the writer lock.
    ///
    /// `Ok(false)` means the key has been applied in the meantime.
    async fn recheck_in(
        &self,
        uow: &mut dyn UnitOfWork,
        invoice_id: InvoiceId,
        key: &str,
    ) -> Result<bool> {
        if uow
            .ledger_entry_by_key(&entry_key(key, RENT_SUFFIX))
            .await?
            .is_some()
        {
            return Ok(false);
        }
        let invoice = uow
            .invoice(invoice_id)
            .await?
            .ok_or_else(|| PaymentError::not_found("invoice", invoice_id))?;
        if invoice.is_paid() {
            return Err(PaymentError::AlreadyPaid(invoice_id));
        }
        if let Some(claim) = uow.payment_claim(invoice_id).await? {
            if !claim.is_expired(Utc::now(), self.claim_ttl) {
                return Err(PaymentError::PaymentInProgress(invoice_id));
            }
            warn!(
                invoice_id,
                stale_key = %claim.idempotency_key,
                "ignoring abandoned payment claim"
            );
        }
        Ok(true)
    }

    /// Marks the invoice as being charged. `Ok(false)` means the key has
    /// already been applied.
    async fn claim(&self, invoice_id: InvoiceId, key: &str) -> Result<bool> {
        let mut uow = self.storage.begin().await?;
        if !self.recheck_in(uow.as_mut(), invoice_id, key).await? {
            return Ok(false);
        }
        uow.put_payment_claim(PaymentClaim {
            invoice_id,
            idempotency_key: key.to_string(),
            claimed_at: Utc::now(),
        })
        .await?;
        uow.commit().await?;
        Ok(true)
    }

    async fn release_claim(&self, invoice_id: InvoiceId, key: &str) {
        let released = async {
            let mut uow = self.storage.begin().await?;
            match uow.payment_claim(invoice_id).await? {
                Some(claim) if claim.idempotency_key == key => {
                    uow.remove_payment_claim(invoice_id).await?;
                    uow.commit().await
                }
                _ => Ok(()),
            }
        };
        if let Err(e) = released.await {
            warn!(invoice_id, error = %e, "failed to release payment claim");
        }
    }

    /// Refunds a charge that could not be completed and returns `cause`.
    async fn compensate(
        &self,
        invoice_id: InvoiceId,
        key: &str,
        charge: &ChargeReceipt,
        amount: Amount,
        cause: PaymentError,
    ) -> PaymentError {
        warn!(
            invoice_id,
            charge_id = %charge.transaction_id,
            error = %cause,
            "payment could not be completed, refunding charge"
        );
        match self.gateway.refund(&charge.transaction_id, amount).await {
            Ok(refund) if refund.success => {
                info!(invoice_id, refund_id = %refund.refund_id, "charge refunded");
            }
            Ok(refund) => error!(
                invoice_id,
                charge_id = %charge.transaction_id,
                refund_id = %refund.refund_id,
                %amount,
                "refund declined, manual intervention required"
            ),
            Err(e) => error!(
                invoice_id,
                charge_id = %charge.transaction_id,
                %amount,
                error = %e,
                "refund failed, manual intervention required"
            ),
        }
        self.release_claim(invoice_id, key).await;
        cause
    }

    /// Rebuilds the receipt of a payment that already went through with `key`.
    async fn replayed_receipt(&self, invoice_id: InvoiceId, key: &str) -> Result<PaymentReceipt> {
        let rent_entry = self
            .storage
            .ledger_entry_by_key(&entry_key(key, RENT_SUFFIX))
            .await?
            .ok_or_else(|| PaymentError::internal(format!("no ledger entry for key {key}")))?;
        if rent_entry.invoice_id != Some(invoice_id) {
            return Err(PaymentError::ValidationError(format!(
                "idempotency key {key} was already used for another invoice"
            )));
        }
        let fee = self
            .storage
            .ledger_entry_by_key(&entry_key(key, FEE_SUFFIX))
            .await?
            .map_or(Decimal::ZERO, |e| e.amount);
        let provider = self
            .storage
            .find_invoice(invoice_id)
            .await?
            .and_then(|i| i.payment_method)
            .unwrap_or_default();

        info!(invoice_id, key, "replaying completed payment");
        Ok(PaymentReceipt {
            invoice_id,
            transaction_id: rent_entry.external_ref.unwrap_or_default(),
            rent: rent_entry.amount,
            service_fees: fee,
            platform_fee: fee,
            total: rent_entry.amount + fee,
            provider,
            replayed: true,
        })
    }

    fn details(
        &self,
        invoice: &Invoice,
        key: &str,
        method: &str,
        external_ref: &str,
    ) -> PaymentDetails {
        PaymentDetails {
            method: method.to_string(),
            idempotency_key: key.to_string(),
            external_ref: external_ref.to_string(),
            amount_paid: invoice.total_due(),
            rent_covered: invoice.rent,
            service_fee: invoice.service_fees,
        }
    }

    fn receipt(&self, invoice: &Invoice, transaction_id: String, provider: &str) -> PaymentReceipt {
        PaymentReceipt {
            invoice_id: invoice.id,
            transaction_id,
            rent: invoice.rent,
            service_fees: invoice.service_fees,
            platform_fee: invoice.service_fees,
            total: invoice.total_due(),
            provider: provider.to_string(),
            replayed: false,
        }
    }

    /// Fire-and-forget; a failing notifier never affects the payment.
    fn notify_landlord(&self, invoice: &Invoice, total: Decimal) {
        let users = self.users.clone();
        let notifier = self.notifier.clone();
        let invoice_id = invoice.id;
        let tenant_id = invoice.tenant_id;
        tokio::spawn(async move {
            let tenant_name = match users.find_user(tenant_id).await {
                Ok(Some(user)) => user.name,
                _ => DEFAULT_TENANT_NAME.to_string(),
            };
            if let Err(e) = notifier
                .notify_landlord_payment(invoice_id, total, &tenant_name)
                .await
            {
                warn!(invoice_id, error = %e, "landlord notification failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewaySettings;
    use crate::domain::ports::Storage;
    use crate::infrastructure::gateway::GatewayFacade;
    use crate::infrastructure::in_memory::InMemoryStorage;
    use crate::infrastructure::notifier::LogNotifier;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    async fn orchestrator(invoice: Invoice) -> (Arc<InMemoryStorage>, PaymentOrchestrator) {
        let storage = Arc::new(InMemoryStorage::new());
        let mut uow = storage.begin().await.unwrap();
        uow.put_invoice(invoice).await.unwrap();
        uow.commit().await.unwrap();
        let settings = Settings {
            gateway: GatewaySettings::instant(),
            ..Settings::default()
        };
        let orchestrator = PaymentOrchestrator::new(
            storage.clone(),
            storage.clone(),
            Box::new(GatewayFacade::from_settings(&settings.gateway)),
            Arc::new(LogNotifier),
            &settings,
        );
        (storage, orchestrator)
    }

    #[test]
    fn test_parse_payment_method() {
        assert_eq!("WALLET".parse::<PaymentMethod>().unwrap(), PaymentMethod::Wallet);
        assert_eq!(
            "card".parse::<PaymentMethod>().unwrap(),
            PaymentMethod::External("card".into())
        );
        assert!(" ".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_receipt_number() {
        let receipt = PaymentReceipt {
            invoice_id: 12,
            transaction_id: "WAL-3".into(),
            rent: dec!(1),
            service_fees: dec!(0),
            platform_fee: dec!(0),
            total: dec!(1),
            provider: WALLET_METHOD.into(),
            replayed: false,
        };
        assert_eq!(receipt.receipt_number(), "RCP-00012-WAL-3");
    }

    #[tokio::test]
    async fn test_rejects_wrong_payer_and_empty_key() {
        let (_storage, orchestrator) =
            orchestrator(Invoice::new(1, 10, 1, 1, None, dec!(100), dec!(0))).await;

        let err = orchestrator
            .collect_payment(11, 1, "K", &PaymentMethod::Wallet)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Unauthorized { payer: 11, invoice: 1 }));

        let err = orchestrator
            .collect_payment(10, 1, "  ", &PaymentMethod::Wallet)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::ValidationError(_)));

        let err = orchestrator
            .collect_payment(10, 2, "K", &PaymentMethod::Wallet)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::NotFound { entity: "invoice", .. }));
    }

    #[tokio::test]
    async fn test_wallet_payment_without_wallet() {
        let (storage, orchestrator) =
            orchestrator(Invoice::new(1, 10, 1, 1, None, dec!(100), dec!(0))).await;
        let err = orchestrator
            .collect_payment(10, 1, "K", &PaymentMethod::Wallet)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::NotFound { entity: "wallet", .. }));
        assert!(!storage.find_invoice(1).await.unwrap().unwrap().is_paid());
    }

    #[tokio::test]
    async fn test_external_payment_routes_to_platform_reserve() {
        let (storage, orchestrator) =
            orchestrator(Invoice::new(1, 10, 1, 1, None, dec!(700), dec!(30))).await;
        let receipt = orchestrator
            .collect_payment(10, 1, "EXT-1", &PaymentMethod::External("card".into()))
            .await
            .unwrap();
        assert!(receipt.transaction_id.starts_with("MOCK-TX-"));
        assert_eq!(receipt.provider, "MOCK_GATEWAY");
        assert_eq!(receipt.total, dec!(730));

        let entries = storage.ledger_entries().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].external_ref.as_deref(), Some(receipt.transaction_id.as_str()));

        let mut uow = storage.begin().await.unwrap();
        assert!(uow.payment_claim(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_live_claim_blocks_wallet_payment() {
        let (storage, orchestrator) =
            orchestrator(Invoice::new(1, 10, 1, 1, None, dec!(100), dec!(0))).await;
        let mut uow = storage.begin().await.unwrap();
        uow.put_payment_claim(PaymentClaim {
            invoice_id: 1,
            idempotency_key: "OTHER".into(),
            claimed_at: Utc::now(),
        })
        .await
        .unwrap();
        uow.commit().await.unwrap();

        let err = orchestrator
            .collect_payment(10, 1, "K", &PaymentMethod::Wallet)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::PaymentInProgress(1)));
        assert!(err.kind().is_retryable());
    }

    #[tokio::test]
    async fn test_abandoned_claim_is_taken_over() {
        let (storage, orchestrator) =
            orchestrator(Invoice::new(1, 10, 1, 1, None, dec!(100), dec!(0))).await;
        let mut uow = storage.begin().await.unwrap();
        uow.put_payment_claim(PaymentClaim {
            invoice_id: 1,
            idempotency_key: "OTHER".into(),
            claimed_at: Utc::now() - chrono::Duration::hours(1),
        })
        .await
        .unwrap();
        uow.commit().await.unwrap();

        let receipt = orchestrator
            .collect_payment(10, 1, "K", &PaymentMethod::External("card".into()))
            .await
            .unwrap();
        assert!(!receipt.replayed);
        assert!(storage.find_invoice(1).await.unwrap().unwrap().is_paid());
    }

    #[tokio::test]
    async fn test_key_reused_for_other_invoice() {
        let (storage, orchestrator) =
            orchestrator(Invoice::new(1, 10, 1, 1, None, dec!(100), dec!(0))).await;
        let mut uow = storage.begin().await.unwrap();
        uow.put_invoice(Invoice::new(2, 10, 1, 1, None, dec!(50), dec!(0)))
            .await
            .unwrap();
        uow.commit().await.unwrap();

        let card = PaymentMethod::External("card".into());
        orchestrator
            .collect_payment(10, 1, "K", &card)
            .await
            .unwrap();
        let err = orchestrator
            .collect_payment(10, 2, "K", &card)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::ValidationError(_)));
        assert!(!storage.find_invoice(2).await.unwrap().unwrap().is_paid());
    }
}
