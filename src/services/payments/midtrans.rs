use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;

use super::{PaymentGateway, PaymentSession, TransactionRequest};

/// Snap API client. The server key authenticates requests and signs notifications.
pub struct MidtransSnapGateway {
    server_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl MidtransSnapGateway {
    pub fn new(server_key: String, base_url: String) -> Self {
        Self {
            server_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

pub(crate) fn snap_payload(request: &TransactionRequest) -> serde_json::Value {
    let items: Vec<serde_json::Value> = request
        .items
        .iter()
        .map(|item| {
            json!({
                "id": item.id,
                "name": item.name,
                "price": item.price,
                "quantity": item.quantity,
            })
        })
        .collect();

    json!({
        "transaction_details": {
            "order_id": request.order_id,
            "gross_amount": request.gross_amount,
        },
        "item_details": items,
        "customer_details": {
            "first_name": request.customer.name,
            "email": request.customer.email,
            "phone": request.customer.phone,
        },
        "expiry": {
            "unit": "minutes",
            "duration": request.expiry_minutes,
        },
    })
}

#[async_trait]
impl PaymentGateway for MidtransSnapGateway {
    async fn create_transaction(&self, request: &TransactionRequest) -> anyhow::Result<PaymentSession> {
        anyhow::ensure!(!self.server_key.is_empty(), "payment server key is not configured");

        let resp = self
            .client
            .post(format!("{}/snap/v1/transactions", self.base_url))
            .basic_auth(&self.server_key, Some(""))
            .json(&snap_payload(request))
            .send()
            .await
            .context("failed to call payment provider")?;

        let status = resp.status();
        let data: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse payment provider response")?;

        if !status.is_success() {
            anyhow::bail!("payment provider error ({}): {}", status, data);
        }

        let token = data["token"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("missing token in payment provider response"))?;
        let redirect_url = data["redirect_url"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("missing redirect_url in payment provider response"))?;

        Ok(PaymentSession {
            token: token.to_string(),
            redirect_url: redirect_url.to_string(),
        })
    }
}
