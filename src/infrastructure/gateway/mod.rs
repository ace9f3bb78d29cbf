//! Payment provider facade.
//!
//! The facade picks the live provider when credentials are configured and the
//! mock otherwise. The choice is made once, at construction; callers only ever
//! see the [`PaymentGateway`] trait.

pub mod live;
pub mod mock;

use crate::config::GatewaySettings;
use crate::domain::gateway::{ChargeReceipt, RefundReceipt, TransferReceipt};
use crate::domain::money::Amount;
use crate::domain::ports::{GatewayBox, PaymentGateway};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use live::LiveGateway;
use mock::MockGateway;
use rust_decimal::Decimal;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

pub struct GatewayFacade {
    provider: GatewayBox,
    timeout: Duration,
}

impl GatewayFacade {
    pub fn from_settings(settings: &GatewaySettings) -> Self {
        let live = LiveGateway::new(settings.live_api_key.clone());
        let provider: GatewayBox = if live.is_active() {
            Box::new(live)
        } else {
            Box::new(MockGateway::new(
                settings.mock_charge_latency,
                settings.mock_refund_latency,
            ))
        };
        info!(provider = provider.provider_name(), "payment provider selected");
        Self::with_provider(provider, settings.timeout)
    }

    /// Wraps an arbitrary provider, still enforcing the call timeout.
    pub fn with_provider(provider: GatewayBox, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    async fn guarded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    operation,
                    provider = self.provider.provider_name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "payment provider call timed out"
                );
                Err(PaymentError::GatewayTimeout(self.timeout))
            }
        }
    }
}

#[async_trait]
impl PaymentGateway for GatewayFacade {
    async fn charge(&self, amount: Amount, currency: &str) -> Result<ChargeReceipt> {
        self.guarded("charge", self.provider.charge(amount, currency))
            .await
    }

    async fn transfer(
        &self,
        total: Amount,
        primary_amount: Decimal,
        fee_amount: Decimal,
        destination_ref: &str,
    ) -> Result<TransferReceipt> {
        self.guarded(
            "transfer",
            self.provider
                .transfer(total, primary_amount, fee_amount, destination_ref),
        )
        .await
    }

    async fn refund(&self, transaction_id: &str, amount: Amount) -> Result<RefundReceipt> {
        self.guarded("refund", self.provider.refund(transaction_id, amount))
            .await
    }

    fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use rust_decimal_macros::dec;

    #[test]
    fn test_selects_mock_without_credentials() {
        let facade = GatewayFacade::from_settings(&GatewaySettings::instant());
        assert_eq!(facade.provider_name(), mock::MOCK_PROVIDER);
    }

    #[test]
    fn test_selects_live_with_credentials() {
        let settings = GatewaySettings {
            live_api_key: Some("sk_test_1".into()),
            ..GatewaySettings::instant()
        };
        let facade = GatewayFacade::from_settings(&settings);
        assert_eq!(facade.provider_name(), live::LIVE_PROVIDER);
    }

    #[tokio::test]
    async fn test_timeout_is_a_failure() {
        let slow = MockGateway::new(Duration::from_millis(500), Duration::ZERO);
        let facade = GatewayFacade::with_provider(Box::new(slow), Duration::from_millis(20));
        let err = facade
            .charge(Amount::new(dec!(1)).unwrap(), "USD")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GatewayTimeout);
    }

    #[tokio::test]
    async fn test_passes_through_within_timeout() {
        let facade = GatewayFacade::from_settings(&GatewaySettings::instant());
        let receipt = facade
            .charge(Amount::new(dec!(1)).unwrap(), "USD")
            .await
            .unwrap();
        assert!(receipt.success);
    }
}
