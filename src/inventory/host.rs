//! Host entry parsing.
//!
//! A host entry is an address (ip or hostname), optionally followed by a
//! single space and a JSON object of host variables:
//!
//! ```text
//! 10.0.0.5
//! 127.0.0.1 {"ansible_connection":"local"}
//! ```

use serde_json::{Map, Value};

use crate::error::InventoryError;

/// Host variables attached to a single inventory host.
pub type HostAttributes = Map<String, Value>;

/// A parsed host entry.
#[derive(Debug, Clone, PartialEq)]
pub struct HostSpec {
    /// Host address.
    pub address: String,
    /// Host variables; empty when the entry carries none.
    pub attributes: HostAttributes,
}

impl HostSpec {
    /// Parses a host entry, splitting on the first space only.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::MalformedHostAttributes`] if the text after
    /// the first space is not a JSON object, and
    /// [`InventoryError::EmptyAddress`] if the entry has no address.
    pub fn parse(spec: &str) -> Result<Self, InventoryError> {
        let (address, raw_attributes) = match spec.split_once(' ') {
            Some((address, rest)) => (address, Some(rest)),
            None => (spec, None),
        };

        if address.is_empty() {
            return Err(InventoryError::EmptyAddress {
                spec: spec.to_string(),
            });
        }

        let attributes = match raw_attributes {
            Some(raw) => serde_json::from_str::<HostAttributes>(raw).map_err(|source| {
                InventoryError::MalformedHostAttributes {
                    address: address.to_string(),
                    source,
                }
            })?,
            None => HostAttributes::new(),
        };

        Ok(Self {
            address: address.to_string(),
            attributes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_address_only() {
        let spec = HostSpec::parse("10.0.0.5").unwrap();
        assert_eq!(spec.address, "10.0.0.5");
        assert!(spec.attributes.is_empty());
    }

    #[test]
    fn test_parse_with_attributes() {
        let spec = HostSpec::parse(r#"127.0.0.1 {"ansible_connection":"local","port":22}"#).unwrap();
        assert_eq!(spec.address, "127.0.0.1");
        assert_eq!(spec.attributes["ansible_connection"], json!("local"));
        assert_eq!(spec.attributes["port"], json!(22));
    }

    #[test]
    fn test_parse_splits_on_first_space_only() {
        let spec = HostSpec::parse(r#"web-1 {"motd": "hello world"}"#).unwrap();
        assert_eq!(spec.address, "web-1");
        assert_eq!(spec.attributes["motd"], json!("hello world"));
    }

    #[test]
    fn test_parse_malformed_attributes() {
        let err = HostSpec::parse("db-1 {not json}").unwrap_err();
        match err {
            InventoryError::MalformedHostAttributes { address, .. } => assert_eq!(address, "db-1"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_rejects_non_object_attributes() {
        let err = HostSpec::parse("db-1 [1, 2]").unwrap_err();
        assert!(matches!(err, InventoryError::MalformedHostAttributes { .. }));
        assert!(err.to_string().contains("'db-1'"));
    }

    #[test]
    fn test_parse_empty_address() {
        assert!(matches!(
            HostSpec::parse(r#" {"a":1}"#),
            Err(InventoryError::EmptyAddress { .. })
        ));
        assert!(matches!(HostSpec::parse(""), Err(InventoryError::EmptyAddress { .. })));
    }

    #[test]
    fn test_empty_address_is_scoped_to_hosts() {
        let err = HostSpec::parse(r#" {"a":1}"#).unwrap_err();
        assert!(err.to_string().contains(r#"' {"a":1}'"#));
        assert_eq!(crate::error::AnsiblePlayError::from(err).attribute(), Some("hosts"));
    }
}
