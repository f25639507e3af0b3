pub mod midtrans;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct LineItem {
    pub id: String,
    pub name: String,
    pub price: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerDetails {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionRequest {
    /// The booking code; notifications come back keyed by it.
    pub order_id: String,
    pub gross_amount: i64,
    pub items: Vec<LineItem>,
    pub customer: CustomerDetails,
    pub expiry_minutes: i64,
}

/// What the client needs to complete payment out-of-band.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentSession {
    pub token: String,
    pub redirect_url: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_transaction(&self, request: &TransactionRequest) -> anyhow::Result<PaymentSession>;
}
