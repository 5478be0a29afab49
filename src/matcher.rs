use crate::internal::{InternalClient, InternalError};
use crate::marketplace::{MarketplaceClient, MarketplaceError, ProductDetail, ProductSummary};
use crate::models::IdField;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Registered supplier name -> store-code prefix. Combined with a
/// candidate's own store field this reconstructs the composite store
/// code the internal system keys tasks by.
static SUPPLIER_CODE_PREFIXES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("Yu Liu", "LPP-SP00001"),
        ("Panpan Liu (1)", "LYN-SP00001"),
        ("Liu Lila", "QY-SP00001"),
        ("XU Liam", "LDD-SP00001"),
        ("Liu Hong", "SQQ-SP00001"),
        ("Li Yanshuang", "LYS-SP00001"),
        ("Xuelian qi", "SJL-SP00002"),
        ("Sain xu", "LY-SP00002"),
    ])
});

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("product lookup failed: {0}")]
    LookupFailed(String),
    #[error("product detail unavailable: {0}")]
    DetailUnavailable(String),
}

/// A resolved marketplace product plus the supplier-identity check.
#[derive(Debug, Clone)]
pub struct ProductResolution {
    pub product_id: i64,
    pub detail: ProductDetail,
    /// Set when the supplier recorded at task time differs from the
    /// supplier currently assigned on the marketplace. Non-fatal; it
    /// rides along with the success outcome.
    pub drift: Option<String>,
}

/// Resolves internal product ids against the marketplace.
pub struct ProductMatcher<'a> {
    pub internal: &'a InternalClient,
    pub marketplace: &'a MarketplaceClient,
}

impl ProductMatcher<'_> {
    pub async fn resolve(
        &self,
        keer_product_id: i64,
        attachments: bool,
    ) -> Result<ProductResolution, ResolutionError> {
        let rows = self
            .internal
            .lookup_product(keer_product_id)
            .await
            .map_err(|err: InternalError| ResolutionError::LookupFailed(err.to_string()))?;
        let Some(reference) = rows.first() else {
            return Err(ResolutionError::LookupFailed(
                "lookup returned no match".to_string(),
            ));
        };
        let Some(product_id) = reference
            .product_id
            .as_ref()
            .and_then(IdField::as_i64)
        else {
            return Err(ResolutionError::LookupFailed(
                "lookup row carries no product id".to_string(),
            ));
        };
        let supplier_at_task_time = reference
            .supplier_name
            .clone()
            .filter(|name| !name.is_empty());

        debug!(
            target = "quotesync.matcher",
            keer_product_id = keer_product_id,
            product_id = product_id,
            "internal id resolved"
        );

        let detail = self
            .marketplace
            .product_detail(product_id, attachments)
            .await
            .map_err(|err: MarketplaceError| ResolutionError::DetailUnavailable(err.to_string()))?
            .ok_or_else(|| {
                ResolutionError::DetailUnavailable("detail response was empty".to_string())
            })?;

        let drift = match (supplier_at_task_time.as_deref(), detail.supplier_name()) {
            (Some(recorded), Some(current)) if recorded != current => {
                warn!(
                    target = "quotesync.matcher",
                    recorded = recorded,
                    current = current,
                    "supplier identity drift"
                );
                Some(format!(
                    "product was quoted under the {recorded} account but now sits under the {current} account"
                ))
            }
            _ => None,
        };

        Ok(ProductResolution {
            product_id,
            detail,
            drift,
        })
    }

    /// Resolve via keyword search when no direct id mapping exists:
    /// search by title, pick the candidate whose composite store code
    /// matches, then fetch its detail. No drift check here; the search
    /// path has no task-time supplier to compare against.
    #[allow(dead_code)]
    pub async fn resolve_by_store(
        &self,
        title: &str,
        store_code: &str,
        attachments: bool,
    ) -> Result<ProductResolution, ResolutionError> {
        let candidates = self
            .marketplace
            .search_products(title)
            .await
            .map_err(|err| ResolutionError::LookupFailed(err.to_string()))?;
        let candidate = match_by_store(&candidates, store_code).ok_or_else(|| {
            ResolutionError::LookupFailed("keyword search returned no candidates".to_string())
        })?;
        let Some(product_id) = candidate.product_id.as_ref().and_then(IdField::as_i64) else {
            return Err(ResolutionError::LookupFailed(
                "candidate carries no product id".to_string(),
            ));
        };
        let detail = self
            .marketplace
            .product_detail(product_id, attachments)
            .await
            .map_err(|err| ResolutionError::DetailUnavailable(err.to_string()))?
            .ok_or_else(|| {
                ResolutionError::DetailUnavailable("detail response was empty".to_string())
            })?;
        Ok(ProductResolution {
            product_id,
            detail,
            drift: None,
        })
    }
}

/// Pick the search candidate matching a composite store code.
///
/// Tier 1 reconstructs `{supplier prefix}-{candidate store}` from the
/// registered supplier name and accepts an exact or prefix match. Tier
/// 2 falls back to exact store equality, then to substring matching on
/// the target's `-`-split segments (length > 3). If nothing matches,
/// the first candidate is returned as a last resort; upstream store
/// codes are too inconsistent for this to be more than best effort.
pub fn match_by_store<'a>(
    products: &'a [ProductSummary],
    store_code: &str,
) -> Option<&'a ProductSummary> {
    if products.is_empty() || store_code.is_empty() {
        return None;
    }

    for product in products {
        let supplier_name = product
            .supplier_detail
            .as_ref()
            .and_then(|detail| detail.name.as_deref())
            .unwrap_or("");
        let Some(prefix) = SUPPLIER_CODE_PREFIXES.get(supplier_name) else {
            continue;
        };
        let combined = format!("{prefix}-{}", product.store);
        if combined == store_code || store_code.starts_with(&combined) {
            info!(
                target = "quotesync.matcher",
                store_code = store_code,
                combined = %combined,
                "store matched via supplier prefix"
            );
            return Some(product);
        }
    }

    let mut partial: Option<&ProductSummary> = None;
    for product in products {
        if product.store == store_code {
            return Some(product);
        }
        let segment_hit = store_code
            .split('-')
            .any(|part| part.len() > 3 && product.store.contains(part));
        if segment_hit && partial.is_none() {
            partial = Some(product);
        }
    }
    if partial.is_some() {
        return partial;
    }

    debug!(
        target = "quotesync.matcher",
        store_code = store_code,
        "no store match; falling back to first candidate"
    );
    products.first()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marketplace::SupplierDetail;

    fn candidate(product_id: i64, store: &str, supplier: Option<&str>) -> ProductSummary {
        ProductSummary {
            product_id: Some(IdField::Number(product_id)),
            store: store.to_string(),
            supplier_detail: supplier.map(|name| SupplierDetail {
                name: Some(name.to_string()),
                supplier_name: None,
            }),
        }
    }

    fn id_of(product: Option<&ProductSummary>) -> Option<i64> {
        product?.product_id.as_ref().and_then(IdField::as_i64)
    }

    #[test]
    fn supplier_prefix_exact_match_wins() {
        let products = vec![
            candidate(1, "aaaa-v0", Some("Yu Liu")),
            candidate(2, "pqf5ud-v0", Some("Liu Hong")),
        ];
        let matched = match_by_store(&products, "SQQ-SP00001-pqf5ud-v0");
        assert_eq!(id_of(matched), Some(2));
    }

    #[test]
    fn supplier_prefix_match_accepts_longer_target() {
        let products = vec![candidate(1, "pqf5ud", Some("Liu Hong"))];
        let matched = match_by_store(&products, "SQQ-SP00001-pqf5ud-v0");
        assert_eq!(id_of(matched), Some(1));
    }

    #[test]
    fn segment_fallback_matches_long_parts_only() {
        // No known supplier: tier 1 cannot apply. "v0" is too short to
        // count; "pqf5ud" carries the match.
        let products = vec![
            candidate(1, "zzzz-v0", None),
            candidate(2, "xx-pqf5ud-yy", Some("Nobody Known")),
        ];
        let matched = match_by_store(&products, "SQQ-SP00001-pqf5ud-v0");
        assert_eq!(id_of(matched), Some(2));
    }

    #[test]
    fn exact_store_equality_beats_segments() {
        let products = vec![
            candidate(1, "xx-pqf5ud-yy", None),
            candidate(2, "SQQ-SP00001-pqf5ud-v0", None),
        ];
        let matched = match_by_store(&products, "SQQ-SP00001-pqf5ud-v0");
        assert_eq!(id_of(matched), Some(2));
    }

    #[test]
    fn falls_back_to_first_candidate() {
        let products = vec![candidate(9, "unrelated", None), candidate(10, "also", None)];
        let matched = match_by_store(&products, "SQQ-SP00001-pqf5ud-v0");
        assert_eq!(id_of(matched), Some(9));
    }

    #[test]
    fn empty_inputs_match_nothing() {
        assert!(match_by_store(&[], "SQQ-SP00001-x").is_none());
        let products = vec![candidate(1, "s", None)];
        assert!(match_by_store(&products, "").is_none());
    }
}
