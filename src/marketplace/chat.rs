use super::client::{MarketplaceClient, MarketplaceError, envelope_message, envelope_success};
use crate::imaging::EncodedImage;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Dispatch timeout is longer than the default client timeout; the
/// attachment payload can run to several megabytes of base64.
const DISPATCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Chat message against the product's quotation thread. The identifier
/// quartet is minted by the marketplace at submission time.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub product_id: i64,
    pub quotation_id: i64,
    pub client_account_id: i64,
    pub client_user_id: i64,
    pub quotation_request_id: i64,
    pub is_quotation_product: i32,
    pub shopify_product_id: i64,
    pub description: String,
    #[serde(rename = "myProductfiles", skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<EncodedImage>,
}

impl MarketplaceClient {
    pub async fn send_chat_message(&self, message: &ChatMessage) -> Result<(), MarketplaceError> {
        let body = self
            .send(
                self.post("save-product-chat-messages")
                    .timeout(DISPATCH_TIMEOUT)
                    .json(message),
            )
            .await?;
        if !envelope_success(&body) {
            return Err(MarketplaceError::Rejected(envelope_message(&body)));
        }
        debug!(
            target = "quotesync.sp",
            product_id = message.product_id,
            attachments = message.attachments.len(),
            "chat message dispatched"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_serializes_contract_fields() {
        let message = ChatMessage {
            product_id: 7,
            quotation_id: 11,
            client_account_id: 12,
            client_user_id: 13,
            quotation_request_id: 14,
            is_quotation_product: 2,
            shopify_product_id: 555,
            description: "hello".to_string(),
            attachments: vec![EncodedImage {
                name: "image1.jpg".to_string(),
                data: "aGk=".to_string(),
                mime_type: "image/jpeg".to_string(),
            }],
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["is_quotation_product"], 2);
        assert_eq!(value["myProductfiles"][0]["name"], "image1.jpg");
        assert_eq!(value["myProductfiles"][0]["type"], "image/jpeg");
    }

    #[test]
    fn attachments_are_omitted_when_empty() {
        let message = ChatMessage {
            product_id: 7,
            quotation_id: 0,
            client_account_id: 0,
            client_user_id: 0,
            quotation_request_id: 0,
            is_quotation_product: 2,
            shopify_product_id: 555,
            description: "hello".to_string(),
            attachments: Vec::new(),
        };
        let value = serde_json::to_value(&message).unwrap();
        assert!(value.get("myProductfiles").is_none());
    }
}
