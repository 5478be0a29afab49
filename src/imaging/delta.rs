/// Incremental-upload tracking over the internal store's
/// delimiter-joined image ledgers.
///
/// Ledgers arrive with ASCII or full-width commas depending on which
/// upstream tool wrote them; both are honored.
fn split_urls(raw: &str) -> Vec<String> {
    raw.replace('，', ",")
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

/// URLs in `all_images` not yet present in `uploaded_images`, in
/// `all_images` order.
pub fn pending(all_images: &str, uploaded_images: &str) -> Vec<String> {
    if all_images.is_empty() {
        return Vec::new();
    }
    let all = split_urls(all_images);
    if uploaded_images.is_empty() {
        return all;
    }
    let uploaded = split_urls(uploaded_images);
    all.into_iter()
        .filter(|url| !uploaded.contains(url))
        .collect()
}

/// Append newly uploaded URLs to the ledger. The ledger is append-only
/// from this side; only called after a successful dispatch.
pub fn record(previous_ledger: &str, newly_uploaded: &[String]) -> String {
    let appended = newly_uploaded.join(",");
    if previous_ledger.is_empty() {
        appended
    } else {
        format!("{previous_ledger},{appended}")
    }
}
