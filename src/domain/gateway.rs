use serde::{Deserialize, Serialize};

/// Outcome of charging the payer through a provider.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct ChargeReceipt {
    pub success: bool,
    pub transaction_id: String,
    pub provider: String,
}

/// Outcome of routing charged funds to the landlord and the platform.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct TransferReceipt {
    pub success: bool,
    pub transfer_id: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct RefundReceipt {
    pub success: bool,
    pub refund_id: String,
}
