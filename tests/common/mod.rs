#![allow(dead_code)]

use async_trait::async_trait;
use rentledger::application::orchestrator::PaymentOrchestrator;
use rentledger::application::wallets::WalletService;
use rentledger::config::{GatewaySettings, Settings};
use rentledger::domain::gateway::{ChargeReceipt, RefundReceipt, TransferReceipt};
use rentledger::domain::invoice::Invoice;
use rentledger::domain::money::Amount;
use rentledger::domain::ports::{GatewayBox, PaymentGateway, Storage};
use rentledger::domain::user::User;
use rentledger::error::{PaymentError, Result};
use rentledger::infrastructure::gateway::GatewayFacade;
use rentledger::infrastructure::in_memory::InMemoryStorage;
use rentledger::infrastructure::notifier::LogNotifier;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const TENANT: u64 = 1;
pub const OWNER: u64 = 2;
pub const OTHER: u64 = 3;

pub fn amount(value: Decimal) -> Amount {
    Amount::new(value).unwrap()
}

pub struct Harness {
    pub storage: Arc<InMemoryStorage>,
    pub wallets: WalletService,
    pub orchestrator: Arc<PaymentOrchestrator>,
}

impl Harness {
    /// Harness backed by the mock provider without latency.
    pub async fn new() -> Self {
        let settings = Settings {
            gateway: GatewaySettings::instant(),
            ..Settings::default()
        };
        Self::with_gateway(Box::new(GatewayFacade::from_settings(&settings.gateway))).await
    }

    pub async fn with_gateway(gateway: GatewayBox) -> Self {
        let storage = Arc::new(InMemoryStorage::new());
        let mut uow = storage.begin().await.unwrap();
        for (id, email, name) in [
            (TENANT, "tenant@example.com", "Tess Tenant"),
            (OWNER, "owner@example.com", "Olly Owner"),
            (OTHER, "other@example.com", "Otto Other"),
        ] {
            uow.put_user(User {
                id,
                email: email.into(),
                name: name.into(),
            })
            .await
            .unwrap();
        }
        uow.commit().await.unwrap();

        let orchestrator = PaymentOrchestrator::new(
            storage.clone(),
            storage.clone(),
            gateway,
            Arc::new(LogNotifier),
            &Settings::default(),
        );
        Self {
            wallets: WalletService::new(storage.clone(), storage.clone()),
            orchestrator: Arc::new(orchestrator),
            storage,
        }
    }

    pub async fn add_invoice(&self, invoice: Invoice) {
        let mut uow = self.storage.begin().await.unwrap();
        uow.put_invoice(invoice).await.unwrap();
        uow.commit().await.unwrap();
    }

    pub async fn invoice(&self, id: u64) -> Invoice {
        self.storage.find_invoice(id).await.unwrap().unwrap()
    }

    pub async fn balance(&self, user: u64) -> Decimal {
        self.wallets.wallet(user).await.unwrap().balance.value()
    }
}

/// What a [`ScriptedGateway`] call should do.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Step {
    Succeed,
    Decline,
    Fail,
    Hang,
}

/// Provider double whose behaviour is fixed per operation and which counts calls.
pub struct ScriptedGateway {
    pub charge: Step,
    pub transfer: Step,
    pub refund: Step,
    pub calls: Arc<GatewayCalls>,
}

#[derive(Default, Debug)]
pub struct GatewayCalls {
    pub charges: AtomicUsize,
    pub transfers: AtomicUsize,
    pub refunds: AtomicUsize,
}

impl GatewayCalls {
    pub fn charges(&self) -> usize {
        self.charges.load(Ordering::SeqCst)
    }

    pub fn transfers(&self) -> usize {
        self.transfers.load(Ordering::SeqCst)
    }

    pub fn refunds(&self) -> usize {
        self.refunds.load(Ordering::SeqCst)
    }
}

impl ScriptedGateway {
    pub fn new(charge: Step, transfer: Step, refund: Step) -> (Self, Arc<GatewayCalls>) {
        let calls = Arc::new(GatewayCalls::default());
        let gateway = Self {
            charge,
            transfer,
            refund,
            calls: calls.clone(),
        };
        (gateway, calls)
    }

    /// Boxed behind the real facade so that timeouts apply.
    pub fn into_facade(self, timeout: Duration) -> GatewayBox {
        Box::new(GatewayFacade::with_provider(Box::new(self), timeout))
    }

    async fn run(step: Step) -> Result<bool> {
        match step {
            Step::Succeed => Ok(true),
            Step::Decline => Ok(false),
            Step::Fail => Err(PaymentError::ProviderRejected("provider unavailable".into())),
            Step::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(true)
            }
        }
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn charge(&self, _amount: Amount, _currency: &str) -> Result<ChargeReceipt> {
        let n = self.calls.charges.fetch_add(1, Ordering::SeqCst) + 1;
        let success = Self::run(self.charge).await?;
        Ok(ChargeReceipt {
            success,
            transaction_id: format!("SCRIPT-TX-{n}"),
            provider: self.provider_name().to_string(),
        })
    }

    async fn transfer(
        &self,
        _total: Amount,
        _primary_amount: Decimal,
        _fee_amount: Decimal,
        _destination_ref: &str,
    ) -> Result<TransferReceipt> {
        let n = self.calls.transfers.fetch_add(1, Ordering::SeqCst) + 1;
        let success = Self::run(self.transfer).await?;
        Ok(TransferReceipt {
            success,
            transfer_id: format!("SCRIPT-TR-{n}"),
        })
    }

    async fn refund(&self, _transaction_id: &str, _amount: Amount) -> Result<RefundReceipt> {
        let n = self.calls.refunds.fetch_add(1, Ordering::SeqCst) + 1;
        let success = Self::run(self.refund).await?;
        Ok(RefundReceipt {
            success,
            refund_id: format!("SCRIPT-REF-{n}"),
        })
    }

    fn provider_name(&self) -> &'static str {
        "SCRIPTED"
    }
}
