//! Crate version string, exposed as a stable runtime constant.

/// Returns this crate's version, e.g. `"opus-core 0.1.0"`.
#[must_use]
pub fn version_string() -> &'static str {
    concat!("opus-core ", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_contains_crate_name() {
        assert!(version_string().starts_with("opus-core"));
    }
}
