use crate::config::GatewayConfig;
use crate::error::{AppError, AppResult};
use crate::external::gateway::{ChargeReceipt, IssuedBillingKey, PaymentGateway};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    code: String,
    #[allow(dead_code)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CardInfo {
    company: Option<String>,
    number: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IssueBillingKeyResponse {
    #[serde(rename = "billingKey")]
    billing_key: String,
    card: Option<CardInfo>,
}

#[derive(Debug, Deserialize)]
struct ChargeResponse {
    #[serde(rename = "paymentKey")]
    payment_key: String,
    #[serde(rename = "totalAmount")]
    total_amount: i64,
}

#[derive(Debug, Serialize)]
struct IssueBillingKeyRequest<'a> {
    #[serde(rename = "authKey")]
    auth_key: &'a str,
    #[serde(rename = "customerKey")]
    customer_key: &'a str,
}

/// Toss-Payments-style billing-key client. Authenticates with
/// `Basic base64(secret_key:)` and speaks JSON.
#[derive(Clone)]
pub struct TossPaymentsClient {
    client: Client,
    config: GatewayConfig,
}

impl TossPaymentsClient {
    pub fn new(config: GatewayConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, config }
    }

    /// Masked card numbers come back like `433012******1234`; keep the tail.
    fn last4(number: &str) -> Option<String> {
        let digits: String = number.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() >= 4 {
            Some(digits[digits.len() - 4..].to_string())
        } else {
            None
        }
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        body: serde_json::Value,
    ) -> AppResult<T> {
        let response = self
            .client
            .post(url)
            .basic_auth(&self.config.secret_key, Some(""))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                log::error!("Gateway request to {url} failed: {e}");
                AppError::GatewayError {
                    code: "GATEWAY_UNREACHABLE".to_string(),
                }
            })?;

        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let body = match response.json::<GatewayErrorBody>().await {
                Ok(err) => err,
                Err(_) => GatewayErrorBody {
                    code: format!("HTTP_{}", status.as_u16()),
                    message: None,
                },
            };
            log::error!("Gateway rejected request to {url}: {} ({status})", body.code);
            Err(AppError::GatewayError { code: body.code })
        }
    }
}

#[async_trait]
impl PaymentGateway for TossPaymentsClient {
    async fn issue_billing_key(
        &self,
        auth_key: &str,
        customer_key: &str,
    ) -> AppResult<IssuedBillingKey> {
        let url = format!("{}/v1/billing/authorizations/issue", self.config.base_url);
        let request = IssueBillingKeyRequest {
            auth_key,
            customer_key,
        };
        let response: IssueBillingKeyResponse =
            self.post_json(&url, serde_json::to_value(&request)?).await?;

        let (card_brand, card_last4) = match response.card {
            Some(card) => (
                card.company,
                card.number.as_deref().and_then(Self::last4),
            ),
            None => (None, None),
        };

        log::info!("Issued billing key for customer {customer_key}");
        Ok(IssuedBillingKey {
            billing_key: response.billing_key,
            card_brand,
            card_last4,
        })
    }

    async fn charge_billing_key(
        &self,
        billing_key: &str,
        customer_key: &str,
        amount: i64,
        order_id: &str,
        order_name: &str,
    ) -> AppResult<ChargeReceipt> {
        let url = format!("{}/v1/billing/{}", self.config.base_url, billing_key);
        let body = json!({
            "customerKey": customer_key,
            "amount": amount,
            "orderId": order_id,
            "orderName": order_name,
        });
        let response: ChargeResponse = self.post_json(&url, body).await?;

        log::info!(
            "Charged {} for order {order_id} (payment {})",
            response.total_amount,
            response.payment_key
        );
        Ok(ChargeReceipt {
            transaction_id: response.payment_key,
            amount: response.total_amount,
        })
    }

    async fn cancel_billing_key(&self, billing_key: &str) -> AppResult<()> {
        let url = format!(
            "{}/v1/billing/{}/cancel",
            self.config.base_url, billing_key
        );
        let _: serde_json::Value = self.post_json(&url, json!({})).await?;
        log::info!("Cancelled billing key");
        Ok(())
    }
}
