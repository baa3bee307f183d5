use clipstash_core::AppError;

const SHA256_HEX_LEN: usize = 64;

/// Normalise a client-declared SHA-256 digest to lowercase hex.
///
/// Accepts an optional `sha256:` prefix and either case.
pub fn normalize_digest(declared: &str) -> Result<String, AppError> {
    let trimmed = declared.trim();
    let hex_part = match trimmed.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("sha256:") => &trimmed[7..],
        _ => trimmed,
    };

    if hex_part.len() != SHA256_HEX_LEN || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AppError::Validation(format!(
            "Invalid content digest: expected {} hex characters of SHA-256",
            SHA256_HEX_LEN
        )));
    }

    Ok(hex_part.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn test_accepts_prefix_and_uppercase() {
        let upper = format!("SHA256:{}", EMPTY_SHA256.to_uppercase());
        assert_eq!(normalize_digest(&upper).unwrap(), EMPTY_SHA256);
        assert_eq!(normalize_digest(EMPTY_SHA256).unwrap(), EMPTY_SHA256);
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(normalize_digest("abc").is_err());
        assert!(normalize_digest(&"g".repeat(64)).is_err());
        assert!(normalize_digest("").is_err());
    }
}
