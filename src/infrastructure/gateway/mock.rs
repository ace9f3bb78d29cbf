use crate::domain::gateway::{ChargeReceipt, RefundReceipt, TransferReceipt};
use crate::domain::money::Amount;
use crate::domain::ports::PaymentGateway;
use crate::error::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::info;

pub const MOCK_PROVIDER: &str = "MOCK_GATEWAY";

/// Stand-in provider used when no live credentials are configured.
///
/// Always succeeds after a configurable delay and hands out synthetic ids.
#[derive(Debug, Clone, Default)]
pub struct MockGateway {
    charge_latency: Duration,
    refund_latency: Duration,
}

impl MockGateway {
    pub fn new(charge_latency: Duration, refund_latency: Duration) -> Self {
        Self {
            charge_latency,
            refund_latency,
        }
    }
}

pub(crate) fn synthetic_id(prefix: &str) -> String {
    let token = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
    format!("{prefix}-{}", &token[..9])
}

async fn pause(latency: Duration) {
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn charge(&self, amount: Amount, currency: &str) -> Result<ChargeReceipt> {
        info!(%amount, currency, "mock provider charging");
        pause(self.charge_latency).await;
        Ok(ChargeReceipt {
            success: true,
            transaction_id: synthetic_id("MOCK-TX"),
            provider: MOCK_PROVIDER.to_string(),
        })
    }

    async fn transfer(
        &self,
        total: Amount,
        primary_amount: Decimal,
        fee_amount: Decimal,
        destination_ref: &str,
    ) -> Result<TransferReceipt> {
        info!(
            %total,
            %primary_amount,
            %fee_amount,
            destination_ref,
            "mock provider routing funds"
        );
        Ok(TransferReceipt {
            success: true,
            transfer_id: synthetic_id("MOCK-TR"),
        })
    }

    async fn refund(&self, transaction_id: &str, amount: Amount) -> Result<RefundReceipt> {
        info!(%amount, transaction_id, "mock provider refunding");
        pause(self.refund_latency).await;
        Ok(RefundReceipt {
            success: true,
            refund_id: synthetic_id("MOCK-REF"),
        })
    }

    fn provider_name(&self) -> &'static str {
        MOCK_PROVIDER
    }
}
