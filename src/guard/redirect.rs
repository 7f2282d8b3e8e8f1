//! Post-login return paths.

use reqwest::Url;

const PROBE_ORIGIN: &str = "https://redirect.invalid";

/// `candidate` if it is a same-origin relative path, `default` otherwise.
///
/// Rejected: anything not starting with `/`, protocol-relative `//`, `/\`,
/// paths containing `..`, and anything that parses as an absolute URL or
/// resolves to another host.
pub fn safe_redirect_path(candidate: Option<&str>, default: &str) -> String {
    let Some(candidate) = candidate.map(str::trim).filter(|c| !c.is_empty()) else {
        return default.to_string();
    };

    if !candidate.starts_with('/')
        || candidate.starts_with("//")
        || candidate.starts_with("/\\")
        || candidate.contains("..")
        || candidate.chars().any(char::is_control)
    {
        return default.to_string();
    }

    if Url::parse(candidate).is_ok() {
        return default.to_string();
    }

    let same_origin = Url::parse(PROBE_ORIGIN)
        .and_then(|base| base.join(candidate))
        .is_ok_and(|url| url.host_str() == Some("redirect.invalid"));
    if !same_origin {
        return default.to_string();
    }

    candidate.to_string()
}
