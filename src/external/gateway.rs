use crate::error::AppResult;
use async_trait::async_trait;

/// Billing key issued by the payment gateway, with cached card metadata.
#[derive(Debug, Clone)]
pub struct IssuedBillingKey {
    pub billing_key: String,
    pub card_brand: Option<String>,
    pub card_last4: Option<String>,
}

/// Confirmation of a completed charge.
#[derive(Debug, Clone)]
pub struct ChargeReceipt {
    pub transaction_id: String,
    pub amount: i64,
}

/// Seam over the payment provider's billing-key API. Services receive an
/// `Arc<dyn PaymentGateway>` at construction so tests can substitute a
/// scripted gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Exchange the widget's auth key for a reusable billing key.
    async fn issue_billing_key(
        &self,
        auth_key: &str,
        customer_key: &str,
    ) -> AppResult<IssuedBillingKey>;

    /// Charge a stored billing key. A transport failure or timeout is a
    /// charge failure; it is never reported as success.
    async fn charge_billing_key(
        &self,
        billing_key: &str,
        customer_key: &str,
        amount: i64,
        order_id: &str,
        order_name: &str,
    ) -> AppResult<ChargeReceipt>;

    /// Invalidate a billing key at the gateway (used when a user re-registers
    /// a payment method; the old key is superseded, not merged).
    async fn cancel_billing_key(&self, billing_key: &str) -> AppResult<()>;
}

/// User-facing text for gateway decline codes. Raw codes stay in the server
/// logs; clients only ever see these messages.
pub fn user_message(code: &str) -> &'static str {
    match code {
        "PAY_PROCESS_CANCELED" => "The payment was cancelled before it completed.",
        "PAY_PROCESS_ABORTED" => "The payment could not be completed. Please try again.",
        "REJECT_CARD_COMPANY" => "The card issuer declined this card. Please try another card.",
        "INVALID_STOPPED_CARD" => "This card has been suspended. Please use another card.",
        "INVALID_CARD_EXPIRATION" => "The card's expiration date is invalid.",
        "INVALID_CARD_NUMBER" => "The card number is invalid.",
        "EXCEED_MAX_DAILY_PAYMENT_COUNT" => "This card's daily payment limit has been exceeded.",
        "EXCEED_MAX_PAYMENT_AMOUNT" => "The amount exceeds this card's payment limit.",
        "NOT_SUPPORTED_CARD_TYPE" => "This card type is not supported for recurring billing.",
        "GATEWAY_UNREACHABLE" => "Could not reach the payment provider. Please try again shortly.",
        _ => "Payment failed. Please check your payment method and try again.",
    }
}
