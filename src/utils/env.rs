/// Get environment variable with `CRM_BILLING_` prefix, falling back to the unprefixed name
///
/// Deployment platforms commonly inject plain names such as `PORT` or
/// `DATABASE_URL`; the prefixed form wins when both are set.
///
/// # Examples
///
/// ```rust
/// use crm_billing::utils::get_env_with_prefix;
///
/// // Checks CRM_BILLING_PORT first, then PORT
/// let port = get_env_with_prefix("PORT");
/// ```
pub fn get_env_with_prefix(key: &str) -> Option<String> {
    std::env::var(format!("CRM_BILLING_{}", key))
        .or_else(|_| std::env::var(key))
        .ok()
        .filter(|value| !value.trim().is_empty())
}

/// Parse a boolean flag (`true`/`1`/`yes`, case-insensitive).
pub fn get_env_flag(key: &str) -> Option<bool> {
    get_env_with_prefix(key).map(|value| {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "on"
        )
    })
}

/// Parse a value with `FromStr`, ignoring malformed input.
pub fn get_env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    get_env_with_prefix(key).and_then(|value| value.trim().parse().ok())
}
