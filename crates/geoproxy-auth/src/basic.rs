//! HTTP Basic credential parsing.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Parses an HTTP Basic `Authorization` header value.
///
/// The scheme is matched case-insensitively and surrounding whitespace is
/// ignored. The password is everything after the first colon, so it may
/// itself contain colons.
///
/// Returns `Some((user, pass))` if valid, `None` otherwise.
///
/// # Example
///
/// ```
/// use geoproxy_auth::basic::parse_basic_auth;
///
/// let (user, pass) = parse_basic_auth("Basic dXNlcjpwYXNz").unwrap();
/// assert_eq!((user.as_str(), pass.as_str()), ("user", "pass"));
/// ```
#[must_use]
pub fn parse_basic_auth(header_value: &str) -> Option<(String, String)> {
    let header_value = header_value.trim();

    let (scheme, encoded) = header_value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;

    let (user, pass) = credentials.split_once(':')?;

    Some((user.to_string(), pass.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_auth_valid() {
        // "user:pass"
        let (user, pass) = parse_basic_auth("Basic dXNlcjpwYXNz").unwrap();
        assert_eq!(user, "user");
        assert_eq!(pass, "pass");
    }

    #[test]
    fn test_parse_basic_auth_scheme_is_case_insensitive() {
        assert!(parse_basic_auth("basic dXNlcjpwYXNz").is_some());
        assert!(parse_basic_auth("BASIC   dXNlcjpwYXNz  ").is_some());
    }

    #[test]
    fn test_parse_basic_auth_with_colon_in_password() {
        // "client:pass:word"
        let (user, pass) = parse_basic_auth("Basic Y2xpZW50OnBhc3M6d29yZA==").unwrap();
        assert_eq!(user, "client");
        assert_eq!(pass, "pass:word");
    }

    #[test]
    fn test_parse_basic_auth_empty_password() {
        // "user:"
        let (user, pass) = parse_basic_auth("Basic dXNlcjo=").unwrap();
        assert_eq!(user, "user");
        assert_eq!(pass, "");
    }

    #[test]
    fn test_parse_basic_auth_invalid_scheme() {
        assert!(parse_basic_auth("Digest dXNlcjpwYXNz").is_none());
        assert!(parse_basic_auth("dXNlcjpwYXNz").is_none());
    }

    #[test]
    fn test_parse_basic_auth_invalid_base64() {
        assert!(parse_basic_auth("Basic not-valid-base64!!!").is_none());
    }

    #[test]
    fn test_parse_basic_auth_no_colon() {
        // "clientonly"
        assert!(parse_basic_auth("Basic Y2xpZW50b25seQ==").is_none());
    }
}
