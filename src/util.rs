//! Shared utility functions for the MotorCards application.

/// Append query parameters to a URL, URL-encoding the values.
pub fn append_query_params(base_url: &str, params: &[(&str, &str)]) -> String {
    let query_string: String = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    if base_url.contains('?') {
        format!("{}&{}", base_url, query_string)
    } else {
        format!("{}?{}", base_url, query_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_to_bare_url() {
        assert_eq!(
            append_query_params("https://x.test/result", &[("order", "mcd_ord_1"), ("status", "paid")]),
            "https://x.test/result?order=mcd_ord_1&status=paid"
        );
    }

    #[test]
    fn test_append_to_url_with_query() {
        assert_eq!(
            append_query_params("https://x.test/result?lang=es", &[("status", "paid")]),
            "https://x.test/result?lang=es&status=paid"
        );
    }

    #[test]
    fn test_values_are_encoded() {
        assert_eq!(
            append_query_params("https://x.test/r", &[("q", "a b&c")]),
            "https://x.test/r?q=a%20b%26c"
        );
    }
}
