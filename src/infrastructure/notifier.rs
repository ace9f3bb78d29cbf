use crate::domain::InvoiceId;
use crate::domain::ports::NotificationDispatcher;
use crate::error::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::info;

/// Notification dispatcher that records landlord notices in the log stream.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationDispatcher for LogNotifier {
    async fn notify_landlord_payment(
        &self,
        invoice_id: InvoiceId,
        amount: Decimal,
        tenant_name: &str,
    ) -> Result<()> {
        info!(
            invoice_id,
            %amount,
            tenant = tenant_name,
            "notifying landlord of rent payment"
        );
        Ok(())
    }
}
