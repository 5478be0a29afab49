use crate::country;
use crate::marketplace::Variant;
use crate::models::QuoteLine;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("every quote line has a non-positive price")]
    AllPricesZero,
    #[error("product carries no variant information")]
    NoVariants,
    #[error("no price parameters could be generated")]
    NoPriceParameters,
}

/// Output of reconciling a product's country/variant tree against the
/// task's quote lines. Priced and deleted countries never overlap: a
/// country either receives price parameters or lands in the deletion
/// set, and both travel in one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// `pcs_{quantity}_{variant_id}_{country_id}` -> price string.
    pub price_params: BTreeMap<String, String>,
    /// `country_id` -> variant ids for countries with no usable quote.
    pub delete_variants: BTreeMap<String, Vec<i64>>,
    pub skipped_zero_price: usize,
    pub skipped_unmatched: usize,
}

pub fn build(
    quotation_info: &BTreeMap<String, Vec<Variant>>,
    lines: &[QuoteLine],
) -> Result<Reconciliation, ReconcileError> {
    if !lines
        .iter()
        .any(|line| line.price.is_some_and(|price| price > 0.0))
    {
        return Err(ReconcileError::AllPricesZero);
    }

    // Countries with at least one variant; a country's id comes from
    // its first variant carrying one.
    let mut country_variants: BTreeMap<&str, &[Variant]> = BTreeMap::new();
    let mut country_ids: BTreeMap<&str, i64> = BTreeMap::new();
    for (code, variants) in quotation_info {
        if variants.is_empty() {
            continue;
        }
        country_variants.insert(code.as_str(), variants.as_slice());
        if let Some(id) = variants.iter().find_map(|variant| variant.country_id) {
            country_ids.insert(code.as_str(), id);
        }
    }
    if country_variants.is_empty() {
        return Err(ReconcileError::NoVariants);
    }

    let countries_with_quotes: BTreeSet<String> = lines
        .iter()
        .filter(|line| line.price.is_some_and(|price| price > 0.0))
        .filter_map(|line| line.nation.as_deref())
        .map(country::normalize)
        .collect();

    let mut delete_variants: BTreeMap<String, Vec<i64>> = BTreeMap::new();
    for (code, variants) in &country_variants {
        if countries_with_quotes.contains(*code) {
            continue;
        }
        let Some(country_id) = country_ids.get(code) else {
            continue;
        };
        let ids: Vec<i64> = variants
            .iter()
            .filter_map(|variant| variant.variant_id)
            .collect();
        if !ids.is_empty() {
            delete_variants.insert(country_id.to_string(), ids);
        }
    }

    let mut price_params = BTreeMap::new();
    let mut skipped_zero_price = 0;
    let mut skipped_unmatched = 0;
    for line in lines {
        let (Some(nation), Some(quantity), Some(price)) =
            (line.nation.as_deref(), line.quantity, line.price)
        else {
            continue;
        };
        if price <= 0.0 {
            skipped_zero_price += 1;
            continue;
        }
        let canonical = country::normalize(nation);
        let (Some(country_id), Some(variants)) = (
            country_ids.get(canonical.as_str()),
            country_variants.get(canonical.as_str()),
        ) else {
            skipped_unmatched += 1;
            continue;
        };
        for variant in variants.iter() {
            let Some(variant_id) = variant.variant_id else {
                continue;
            };
            price_params.insert(
                format!("pcs_{quantity}_{variant_id}_{country_id}"),
                format_price(price),
            );
        }
    }

    if price_params.is_empty() {
        return Err(ReconcileError::NoPriceParameters);
    }

    Ok(Reconciliation {
        price_params,
        delete_variants,
        skipped_zero_price,
        skipped_unmatched,
    })
}

/// Submitted price = quoted price less the 1% platform margin, two
/// decimal places.
fn format_price(price: f64) -> String {
    let discounted = (price * 0.99 * 100.0).round() / 100.0;
    format!("{discounted:.2}")
}
