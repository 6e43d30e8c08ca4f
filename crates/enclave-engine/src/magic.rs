//! Runtime placeholders
//!
//! Scripts are interpreted before any IP is allocated, so a service's
//! `ip_address` is a placeholder of the form `{{service:<id>.ip_address}}`.
//! The executor swaps placeholders for real addresses right before an
//! instruction reaches the backend.

use std::net::Ipv4Addr;

use enclave_core::errors::NetworkError;
use enclave_core::model::ServiceId;

const PREFIX: &str = "{{service:";
const SUFFIX: &str = ".ip_address}}";

pub fn ip_address_placeholder(service_id: &ServiceId) -> String {
    format!("{}{}{}", PREFIX, service_id, SUFFIX)
}

/// Replace every placeholder in `text` with the address `lookup` returns
///
/// Text that merely looks similar but is not closed by the suffix is left
/// as is.
///
/// # Errors
///
/// `UnknownService` when a placeholder names a service `lookup` does not know.
pub fn substitute(
    text: &str,
    lookup: impl Fn(&ServiceId) -> Option<Ipv4Addr>,
) -> Result<String, NetworkError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(PREFIX) {
        let after_prefix = &rest[start + PREFIX.len()..];
        let Some(end) = after_prefix.find(SUFFIX) else {
            break;
        };
        let service_id = ServiceId::new(&after_prefix[..end]);
        let ip = lookup(&service_id).ok_or_else(|| NetworkError::UnknownService {
            service_id: service_id.to_string(),
        })?;
        out.push_str(&rest[..start]);
        out.push_str(&ip.to_string());
        rest = &after_prefix[end + SUFFIX.len()..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(id: &ServiceId) -> Option<Ipv4Addr> {
        (id.as_str() == "db").then_some(Ipv4Addr::new(10, 0, 0, 2))
    }

    #[test]
    fn test_substitutes_every_occurrence() {
        let text = format!(
            "postgres://{}:5432 and {}",
            ip_address_placeholder(&"db".into()),
            ip_address_placeholder(&"db".into())
        );
        assert_eq!(
            substitute(&text, lookup).unwrap(),
            "postgres://10.0.0.2:5432 and 10.0.0.2"
        );
    }

    #[test]
    fn test_unknown_service_is_an_error() {
        let text = ip_address_placeholder(&"ghost".into());
        assert!(matches!(
            substitute(&text, lookup),
            Err(NetworkError::UnknownService { .. })
        ));
    }

    #[test]
    fn test_plain_text_is_untouched() {
        assert_eq!(substitute("{{service:db", lookup).unwrap(), "{{service:db");
        assert_eq!(substitute("echo hi", lookup).unwrap(), "echo hi");
    }
}
