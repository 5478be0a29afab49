use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Alias table for country identifiers as they appear in quote lines.
/// Keys are upper-cased so lookup stays case-insensitive.
static COUNTRY_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("UK/GB", "GB"),
        ("UK", "GB"),
        ("UNITED KINGDOM", "GB"),
        ("USA", "US"),
        ("UNITED STATES", "US"),
        ("UAE", "AE"),
        ("AUSTRALIA", "AU"),
        ("NEW ZEALAND", "NZ"),
        ("IRELAND", "IE"),
        ("CANADA", "CA"),
        ("SINGAPORE", "SG"),
    ])
});

/// Canonicalize a free-form country identifier. Unmapped codes pass
/// through upper-cased; never fails.
pub fn normalize(code: &str) -> String {
    let cleaned = code.trim().to_uppercase();
    match COUNTRY_ALIASES.get(cleaned.as_str()) {
        Some(mapped) => (*mapped).to_string(),
        None => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_aliases() {
        assert_eq!(normalize("UK/GB"), "GB");
        assert_eq!(normalize("UK"), "GB");
        assert_eq!(normalize("United Kingdom"), "GB");
        assert_eq!(normalize("USA"), "US");
        assert_eq!(normalize("United States"), "US");
        assert_eq!(normalize("UAE"), "AE");
        assert_eq!(normalize("Australia"), "AU");
        assert_eq!(normalize("New Zealand"), "NZ");
        assert_eq!(normalize("Ireland"), "IE");
        assert_eq!(normalize("Canada"), "CA");
        assert_eq!(normalize("Singapore"), "SG");
    }

    #[test]
    fn unmapped_codes_pass_through_upper_cased() {
        assert_eq!(normalize("de"), "DE");
        assert_eq!(normalize("FR"), "FR");
    }

    #[test]
    fn insensitive_to_case_and_whitespace() {
        assert_eq!(normalize("  uk "), "GB");
        assert_eq!(normalize("usa"), "US");
        assert_eq!(normalize("\tnew zealand\n"), "NZ");
    }

    #[test]
    fn idempotent() {
        for input in ["UK", "United Kingdom", "GB", "usa", "xx", "  ca "] {
            let once = normalize(input);
            assert_eq!(normalize(&once), once);
        }
    }
}
