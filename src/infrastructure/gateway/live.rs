use super::mock::synthetic_id;
use crate::domain::gateway::{ChargeReceipt, RefundReceipt, TransferReceipt};
use crate::domain::money::Amount;
use crate::domain::ports::PaymentGateway;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::info;

pub const LIVE_PROVIDER: &str = "STRIPE";

/// Card processor integration with connected-account payouts.
///
/// Inactive until a secret key is supplied; any call while inactive is a
/// configuration defect and fails fast.
#[derive(Clone, Default)]
pub struct LiveGateway {
    api_key: Option<String>,
}

impl std::fmt::Debug for LiveGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveGateway")
            .field("active", &self.is_active())
            .finish()
    }
}

impl LiveGateway {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn is_active(&self) -> bool {
        self.api_key.is_some()
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(PaymentError::ConfigurationError(
                "live payment provider is not configured (API key missing)".to_string(),
            ))
        }
    }
}

// TODO: issue charges, transfers and refunds through the processor's HTTP API
// once an HTTP client is part of the stack; ids are synthesised until then.
#[async_trait]
impl PaymentGateway for LiveGateway {
    async fn charge(&self, amount: Amount, currency: &str) -> Result<ChargeReceipt> {
        self.ensure_active()?;
        info!(%amount, currency, "live provider charging");
        Ok(ChargeReceipt {
            success: true,
            transaction_id: synthetic_id("STRIPE-CH"),
            provider: LIVE_PROVIDER.to_string(),
        })
    }

    async fn transfer(
        &self,
        _total: Amount,
        primary_amount: Decimal,
        fee_amount: Decimal,
        destination_ref: &str,
    ) -> Result<TransferReceipt> {
        self.ensure_active()?;
        info!(
            %primary_amount,
            %fee_amount,
            destination_ref,
            "live provider transferring to connected account"
        );
        Ok(TransferReceipt {
            success: true,
            transfer_id: synthetic_id("STRIPE-TR"),
        })
    }

    async fn refund(&self, transaction_id: &str, amount: Amount) -> Result<RefundReceipt> {
        self.ensure_active()?;
        info!(%amount, transaction_id, "live provider refunding");
        Ok(RefundReceipt {
            success: true,
            refund_id: synthetic_id("STRIPE-RE"),
        })
    }

    fn provider_name(&self) -> &'static str {
        LIVE_PROVIDER
    }
}
