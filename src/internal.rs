use crate::config::AppConfig;
use crate::http::build_client;
use crate::models::{IdField, StatusUpdate, TaskRecord, decode_task_batch};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

/// Message sent to the marketplace chat when the internal store has no
/// custom text for the product.
pub const DEFAULT_MESSAGE: &str = "Your quotation has been completed. We are waiting for the supplier to provide product \
real-shot pictures and the size chart, which will ensure we offer you the most accurate \
and clear product information. We will upload them as soon as we receive the physical \
product images from the factory. Thank you for your understanding.";

const QUOTATION_TASKS_PATH: &str = "up-sp-bj";
const NON_QUOTABLE_TASKS_PATH: &str = "up-sp-bj_copy_9LotzZVQ";
const PRODUCT_LOOKUP_PATH: &str = "sp_productid";
const SAVE_STATUS_PATH: &str = "task-data/save";
const FINALIZE_PATH: &str = "up_sp_status";
const MESSAGE_PATH: &str = "product-attributes";
const TASK_DETAIL_PATH: &str = "getTaskDetailById";
const PRODUCT_INFO_PATH: &str = "get_product_info";

#[derive(Debug, Error)]
pub enum InternalError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("invalid response: {0}")]
    Deserialize(String),
}

/// Client for the internal task store.
#[derive(Debug, Clone)]
pub struct InternalClient {
    base_url: String,
    http: Client,
}

/// Row returned by the product lookup keyed on the internal id.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductRef {
    #[serde(default)]
    pub product_id: Option<IdField>,
    #[serde(default)]
    pub supplier_name: Option<String>,
}

impl InternalClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            base_url: config.internal_base_url.clone(),
            http: build_client(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post_json(&self, path: &str, payload: &Value) -> Result<Value, InternalError> {
        let response = self
            .http
            .post(self.endpoint(path))
            .json(payload)
            .send()
            .await
            .map_err(|err| InternalError::Request(err.to_string()))?;
        if !response.status().is_success() {
            return Err(InternalError::Request(format!(
                "HTTP {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|err| InternalError::Deserialize(err.to_string()))
    }

    pub async fn fetch_quotation_tasks(
        &self,
        store_code: &str,
        created_at: &str,
    ) -> Result<Vec<TaskRecord>, InternalError> {
        self.fetch_tasks(QUOTATION_TASKS_PATH, store_code, created_at)
            .await
    }

    pub async fn fetch_non_quotable_tasks(
        &self,
        store_code: &str,
        created_at: &str,
    ) -> Result<Vec<TaskRecord>, InternalError> {
        self.fetch_tasks(NON_QUOTABLE_TASKS_PATH, store_code, created_at)
            .await
    }

    async fn fetch_tasks(
        &self,
        path: &str,
        store_code: &str,
        created_at: &str,
    ) -> Result<Vec<TaskRecord>, InternalError> {
        let payload = json!({"store_code": store_code, "created_at": created_at});
        let body = self.post_json(path, &payload).await?;
        Ok(decode_task_batch(&body))
    }

    /// Resolve the internal product id to marketplace candidates. An
    /// unsuccessful envelope is an error; an empty row set is not.
    pub async fn lookup_product(
        &self,
        keer_product_id: i64,
    ) -> Result<Vec<ProductRef>, InternalError> {
        let payload = json!({"keep_product_id": keer_product_id});
        let body = self.post_json(PRODUCT_LOOKUP_PATH, &payload).await?;
        if !envelope_success(&body) {
            return Err(InternalError::Request(
                "lookup reported failure".to_string(),
            ));
        }
        match body.get("data") {
            Some(rows) if !rows.is_null() => serde_json::from_value(rows.clone())
                .map_err(|err| InternalError::Deserialize(err.to_string())),
            _ => Ok(Vec::new()),
        }
    }

    /// Status feedback sink. Failures are logged, not propagated: a
    /// lost status write must not fail the task a second time.
    pub async fn save_task_status(&self, keer_product_id: i64, update: &StatusUpdate) -> bool {
        let mut payload = json!({"keer_product_id": keer_product_id.to_string()});
        if let (Value::Object(map), Ok(Value::Object(extra))) =
            (&mut payload, serde_json::to_value(update))
        {
            map.extend(extra);
        }
        match self.post_json(SAVE_STATUS_PATH, &payload).await {
            Ok(_) => {
                debug!(
                    target = "quotesync.internal",
                    keer_product_id = keer_product_id,
                    "status saved"
                );
                true
            }
            Err(err) => {
                warn!(
                    target = "quotesync.internal",
                    keer_product_id = keer_product_id,
                    error = %err,
                    "status save failed"
                );
                false
            }
        }
    }

    /// Finalization sink: marks the task's marketplace-side status as
    /// done. Fixed `sp_status: 2` by contract.
    pub async fn finalize_task(&self, keer_product_id: i64) -> bool {
        let payload = json!({"id": keer_product_id, "sp_status": 2});
        match self.post_json(FINALIZE_PATH, &payload).await {
            Ok(_) => true,
            Err(err) => {
                warn!(
                    target = "quotesync.internal",
                    keer_product_id = keer_product_id,
                    error = %err,
                    "finalization failed"
                );
                false
            }
        }
    }

    /// Custom chat text for the product, or the fixed default when the
    /// lookup fails or comes back empty.
    pub async fn fetch_message_content(&self, keer_product_id: i64) -> String {
        let response = self
            .http
            .post(self.endpoint(MESSAGE_PATH))
            .form(&[("id", keer_product_id.to_string())])
            .send()
            .await;
        let body: Value = match response {
            Ok(resp) if resp.status().is_success() => match resp.json().await {
                Ok(body) => body,
                Err(_) => return DEFAULT_MESSAGE.to_string(),
            },
            _ => return DEFAULT_MESSAGE.to_string(),
        };
        first_row_string(&body, "product_attribute").unwrap_or_else(|| DEFAULT_MESSAGE.to_string())
    }

    /// Delimiter-joined ledger of already-uploaded image URLs. Empty
    /// string when absent or unreadable.
    pub async fn fetch_uploaded_ledger(&self, keer_product_id: i64) -> String {
        let payload = json!({"keer_product_id": keer_product_id.to_string()});
        match self.post_json(TASK_DETAIL_PATH, &payload).await {
            Ok(body) => first_row_string(&body, "shi_image_note").unwrap_or_default(),
            Err(err) => {
                warn!(
                    target = "quotesync.internal",
                    keer_product_id = keer_product_id,
                    error = %err,
                    "ledger fetch failed"
                );
                String::new()
            }
        }
    }

    /// Delimiter-joined list of every real-shot image URL on record.
    pub async fn fetch_product_images(&self, keer_product_id: i64) -> String {
        let payload = json!({"id": keer_product_id.to_string()});
        match self.post_json(PRODUCT_INFO_PATH, &payload).await {
            Ok(body) => first_row_string(&body, "product_shi_img").unwrap_or_default(),
            Err(err) => {
                warn!(
                    target = "quotesync.internal",
                    keer_product_id = keer_product_id,
                    error = %err,
                    "image list fetch failed"
                );
                String::new()
            }
        }
    }
}

fn envelope_success(body: &Value) -> bool {
    body.get("success").and_then(Value::as_bool).unwrap_or(false)
}

/// Pull a trimmed string field off the first `data` row. The store
/// serializes missing values as the literal string "null".
fn first_row_string(body: &Value, field: &str) -> Option<String> {
    if !envelope_success(body) {
        return None;
    }
    let value = body
        .get("data")?
        .as_array()?
        .first()?
        .get(field)?
        .as_str()?
        .trim();
    if value.is_empty() || value == "null" {
        return None;
    }
    Some(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_row_string_reads_trimmed_field() {
        let body = json!({"success": true, "data": [{"shi_image_note": "  a.jpg,b.jpg "}]});
        assert_eq!(
            first_row_string(&body, "shi_image_note").as_deref(),
            Some("a.jpg,b.jpg")
        );
    }

    #[test]
    fn first_row_string_rejects_null_marker_and_empties() {
        let null_marker = json!({"success": true, "data": [{"product_shi_img": "null"}]});
        assert_eq!(first_row_string(&null_marker, "product_shi_img"), None);

        let blank = json!({"success": true, "data": [{"product_shi_img": "   "}]});
        assert_eq!(first_row_string(&blank, "product_shi_img"), None);

        let unsuccessful = json!({"success": false, "data": [{"product_shi_img": "x.jpg"}]});
        assert_eq!(first_row_string(&unsuccessful, "product_shi_img"), None);

        let empty_rows = json!({"success": true, "data": []});
        assert_eq!(first_row_string(&empty_rows, "product_shi_img"), None);
    }

    #[test]
    fn product_ref_accepts_numeric_and_string_ids() {
        let rows: Vec<ProductRef> = serde_json::from_value(json!([
            {"product_id": 77, "supplier_name": "Liu Hong"},
            {"product_id": "78"},
        ]))
        .unwrap();
        assert_eq!(rows[0].product_id.as_ref().and_then(IdField::as_i64), Some(77));
        assert_eq!(rows[1].product_id.as_ref().and_then(IdField::as_i64), Some(78));
        assert!(rows[1].supplier_name.is_none());
    }
}
