use super::client::{MarketplaceClient, MarketplaceError, envelope_message, envelope_success};
use crate::reconcile::Reconciliation;
use reqwest::StatusCode;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum NonQuotableError {
    /// The marketplace refuses because a quotation already exists; the
    /// message is kept verbatim for the status annotation.
    #[error("{0}")]
    AlreadyQuoted(String),
    #[error("every request shape was rejected")]
    Exhausted,
}

/// Combined submission payload: static shipping/processing metadata,
/// the dynamic `pcs_*` price map, and the deletion set when non-empty.
/// Pricing and deletion always travel in the same atomic write.
pub fn submission_payload(
    product_id: i64,
    shopify_product_id: i64,
    reconciliation: &Reconciliation,
) -> Value {
    let mut payload = Map::new();
    payload.insert("product_id".into(), json!(product_id));
    payload.insert("shopify_product_id".into(), json!(shopify_product_id));
    payload.insert("is_quotation_product".into(), json!(2));
    payload.insert("is_new_price_submitted".into(), json!(0));
    payload.insert("expected_processing_time".into(), json!("3-5 days"));
    payload.insert("expecting_shipping_time".into(), json!("7-9 days"));
    payload.insert("product_quality".into(), json!("3"));
    payload.insert("start_fulfillment_delay".into(), json!("0 day"));
    payload.insert("reason_fulfillment_delay".into(), json!(""));
    if !reconciliation.delete_variants.is_empty() {
        payload.insert(
            "delete_variant".into(),
            json!(reconciliation.delete_variants),
        );
    }
    for (key, price) in &reconciliation.price_params {
        payload.insert(key.clone(), json!(price));
    }
    Value::Object(payload)
}

impl MarketplaceClient {
    /// Submit the combined price/deletion payload. A non-success
    /// envelope is a rejection.
    pub async fn submit_quotation(&self, payload: &Value) -> Result<(), MarketplaceError> {
        let body = self
            .send(self.post("update-product-quotation").json(payload))
            .await?;
        if !envelope_success(&body) {
            return Err(MarketplaceError::Rejected(envelope_message(&body)));
        }
        debug!(target = "quotesync.sp", "quotation accepted");
        Ok(())
    }

    /// Mark a product as not quotable. The endpoint's accepted schema
    /// has proven inconsistent, so two request shapes are tried in
    /// order; 404/405 means the shape was not recognized.
    pub async fn mark_non_quotable(
        &self,
        product_id: i64,
        shopify_product_id: i64,
    ) -> Result<(), NonQuotableError> {
        let shapes = [
            json!({
                "product_id": product_id,
                "shopify_product_id": shopify_product_id,
                "is_quotation_product": 2,
                "is_quotable": 0,
            }),
            json!({
                "product_id": product_id,
                "shopify_product_id": shopify_product_id,
                "is_quotation_product": 2,
                "quotation_status": "not_available",
            }),
        ];

        for (index, payload) in shapes.iter().enumerate() {
            let response = match self
                .post("mark-product-non-quotable")
                .json(payload)
                .send()
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    warn!(
                        target = "quotesync.sp",
                        shape = index + 1,
                        error = %err,
                        "non-quotable request failed"
                    );
                    continue;
                }
            };

            if matches!(
                response.status(),
                StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED
            ) {
                continue;
            }

            let body: Value = match response.json().await {
                Ok(body) => body,
                Err(_) => continue,
            };

            if envelope_success(&body) {
                info!(
                    target = "quotesync.sp",
                    product_id = product_id,
                    shape = index + 1,
                    "product marked non-quotable"
                );
                return Ok(());
            }

            let message = envelope_message(&body);
            if message.contains("Quotation already given") {
                return Err(NonQuotableError::AlreadyQuoted(message));
            }
            warn!(
                target = "quotesync.sp",
                shape = index + 1,
                message = %message,
                "non-quotable shape rejected"
            );
        }

        Err(NonQuotableError::Exhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample_reconciliation() -> Reconciliation {
        Reconciliation {
            price_params: BTreeMap::from([
                ("pcs_50_1_10".to_string(), "9.90".to_string()),
                ("pcs_100_2_10".to_string(), "19.80".to_string()),
            ]),
            delete_variants: BTreeMap::from([("20".to_string(), vec![3, 4])]),
            skipped_zero_price: 0,
            skipped_unmatched: 0,
        }
    }

    #[test]
    fn payload_carries_static_metadata_and_prices() {
        let payload = submission_payload(7, 555, &sample_reconciliation());
        assert_eq!(payload["product_id"], json!(7));
        assert_eq!(payload["shopify_product_id"], json!(555));
        assert_eq!(payload["is_quotation_product"], json!(2));
        assert_eq!(payload["is_new_price_submitted"], json!(0));
        assert_eq!(payload["expected_processing_time"], json!("3-5 days"));
        assert_eq!(payload["expecting_shipping_time"], json!("7-9 days"));
        assert_eq!(payload["product_quality"], json!("3"));
        assert_eq!(payload["start_fulfillment_delay"], json!("0 day"));
        assert_eq!(payload["reason_fulfillment_delay"], json!(""));
        assert_eq!(payload["pcs_50_1_10"], json!("9.90"));
        assert_eq!(payload["pcs_100_2_10"], json!("19.80"));
        assert_eq!(payload["delete_variant"], json!({"20": [3, 4]}));
    }

    #[test]
    fn payload_omits_empty_deletion_set() {
        let mut reconciliation = sample_reconciliation();
        reconciliation.delete_variants.clear();
        let payload = submission_payload(7, 555, &reconciliation);
        assert!(payload.get("delete_variant").is_none());
    }
}
