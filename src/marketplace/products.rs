use super::client::{MarketplaceClient, MarketplaceError, envelope_success};
use crate::models::IdField;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;

/// Supplier identity block. The search shape carries `name`, the
/// detail shape carries `supplier_name`; both are modeled.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SupplierDetail {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub supplier_name: Option<String>,
}

/// One candidate row from the keyword search.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductSummary {
    #[serde(default)]
    pub product_id: Option<IdField>,
    #[serde(default)]
    pub store: String,
    #[serde(default)]
    pub supplier_detail: Option<SupplierDetail>,
}

/// A (country, pricing-tier) unit nested under a country's entry in
/// `quotation_information`.
#[derive(Debug, Clone, Deserialize)]
pub struct Variant {
    #[serde(default)]
    pub variant_id: Option<i64>,
    #[serde(default)]
    pub country_id: Option<i64>,
}

/// Full marketplace product detail. Fetched fresh per pipeline stage;
/// the quotation/client identifiers only exist after a submission.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductDetail {
    #[serde(default)]
    pub product_shopify_id: Option<IdField>,
    #[serde(default)]
    pub quotation_information: BTreeMap<String, Vec<Variant>>,
    #[serde(default)]
    pub supplier_detail: Option<SupplierDetail>,
    #[serde(default)]
    pub quotation_id: Option<IdField>,
    #[serde(default)]
    pub client_account_id: Option<IdField>,
    #[serde(default)]
    pub client_user_id: Option<IdField>,
    #[serde(default)]
    pub quotation_request_id: Option<IdField>,
}

impl ProductDetail {
    pub fn supplier_name(&self) -> Option<&str> {
        self.supplier_detail
            .as_ref()
            .and_then(|detail| detail.supplier_name.as_deref())
            .filter(|name| !name.is_empty())
    }
}

impl MarketplaceClient {
    /// Keyword search over quotation products, first page.
    pub async fn search_products(
        &self,
        keyword: &str,
    ) -> Result<Vec<ProductSummary>, MarketplaceError> {
        let payload = json!({
            "is_quotation_product": 2,
            "product_search_keys": keyword,
            "page": 1,
        });
        let body = self.send(self.post("get-products").json(&payload)).await?;
        if !envelope_success(&body) {
            return Ok(Vec::new());
        }
        match body.get("data") {
            Some(rows) if !rows.is_null() => serde_json::from_value(rows.clone())
                .map_err(|err| MarketplaceError::Deserialize(err.to_string())),
            _ => Ok(Vec::new()),
        }
    }

    /// Product detail, `None` when the marketplace has no row for the
    /// id. `attachments` maps to `is_attachment_needed`.
    pub async fn product_detail(
        &self,
        product_id: i64,
        attachments: bool,
    ) -> Result<Option<ProductDetail>, MarketplaceError> {
        let payload = json!({
            "product_id": product_id,
            "is_quotation_product": 2,
            "is_attachment_needed": if attachments { 1 } else { 0 },
        });
        let body = self
            .send(self.post("get-product-quotation").json(&payload))
            .await?;
        if !envelope_success(&body) {
            return Ok(None);
        }
        let mut details: Vec<ProductDetail> = match body.get("data") {
            Some(rows) if !rows.is_null() => serde_json::from_value(rows.clone())
                .map_err(|err| MarketplaceError::Deserialize(err.to_string()))?,
            _ => Vec::new(),
        };
        if details.is_empty() {
            Ok(None)
        } else {
            Ok(Some(details.swap_remove(0)))
        }
    }
}
