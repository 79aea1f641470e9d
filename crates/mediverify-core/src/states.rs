//! Jurisdiction codes accepted by the license registries.

/// Two-letter codes for the 50 states plus DC and the territories the
/// registries license (PR, VI, GU, AS, MP). Sorted for binary search.
const STATE_CODES: [&str; 56] = [
    "AK", "AL", "AR", "AS", "AZ", "CA", "CO", "CT", "DC", "DE", "FL", "GA",
    "GU", "HI", "IA", "ID", "IL", "IN", "KS", "KY", "LA", "MA", "MD", "ME",
    "MI", "MN", "MO", "MP", "MS", "MT", "NC", "ND", "NE", "NH", "NJ", "NM",
    "NV", "NY", "OH", "OK", "OR", "PA", "PR", "RI", "SC", "SD", "TN", "TX",
    "UT", "VA", "VI", "VT", "WA", "WI", "WV", "WY",
];

/// Case-insensitive check that `code` is a known jurisdiction.
pub fn is_valid(code: &str) -> bool {
    normalize(code).is_some()
}

/// Trims and uppercases `code`, returning `None` for unknown jurisdictions.
pub fn normalize(code: &str) -> Option<String> {
    let upper = code.trim().to_uppercase();
    STATE_CODES.binary_search(&upper.as_str()).ok().map(|_| upper)
}
