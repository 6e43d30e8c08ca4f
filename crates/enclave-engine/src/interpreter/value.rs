//! Runtime values of the script language

use std::collections::BTreeMap;
use std::fmt::Write as _;

use enclave_core::instruction::ServiceConfig;
use enclave_core::model::{Connection, PortSpec, ServiceId};

use super::builtins::Builtin;
use crate::magic::ip_address_placeholder;

/// What a service-producing builtin hands back to the script
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRef {
    pub service_id: ServiceId,
    pub ports: BTreeMap<String, PortSpec>,
}

impl ServiceRef {
    /// Placeholder the executor replaces with the allocated IP
    pub fn ip_address(&self) -> String {
        ip_address_placeholder(&self.service_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Dict(BTreeMap<String, Value>),
    PortSpec(PortSpec),
    Connection(Connection),
    ServiceConfig(Box<ServiceConfig>),
    Service(ServiceRef),
    Builtin(Builtin),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::PortSpec(_) => "PortSpec",
            Value::Connection(_) => "Connection",
            Value::ServiceConfig(_) => "ServiceConfig",
            Value::Service(_) => "Service",
            Value::Builtin(_) => "builtin_function_or_method",
        }
    }

    /// Attribute lookup on struct-like values
    pub fn attr(&self, name: &str) -> Option<Value> {
        match self {
            Value::Service(service) => match name {
                "service_id" => Some(Value::String(service.service_id.to_string())),
                "ip_address" => Some(Value::String(service.ip_address())),
                "ports" => Some(Value::Dict(
                    service
                        .ports
                        .iter()
                        .map(|(k, p)| (k.clone(), Value::PortSpec(p.clone())))
                        .collect(),
                )),
                _ => None,
            },
            Value::PortSpec(port) => match name {
                "number" => Some(Value::Int(i64::from(port.number))),
                "transport_protocol" => Some(Value::String(
                    port.transport_protocol.as_str().to_string(),
                )),
                "application_protocol" => Some(
                    port.application_protocol
                        .clone()
                        .map(Value::String)
                        .unwrap_or(Value::None),
                ),
                _ => None,
            },
            Value::Connection(conn) => match name {
                "packet_loss_percentage" => {
                    Some(Value::Float(f64::from(conn.packet_loss_percentage())))
                }
                "blocked" => Some(Value::Bool(conn.is_blocked())),
                _ => None,
            },
            Value::ServiceConfig(config) => match name {
                "image" => Some(Value::String(config.image.clone())),
                "data_dir_mount" => Some(
                    config
                        .data_dir_mount
                        .clone()
                        .map(Value::String)
                        .unwrap_or(Value::None),
                ),
                _ => None,
            },
            _ => None,
        }
    }

    /// Conversion used by `str()` and `print()`; strings are unquoted
    pub fn to_str(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            other => other.repr(),
        }
    }

    /// Source-like rendering; strings are quoted
    pub fn repr(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::String(s) => format!("{:?}", s),
            Value::List(items) => {
                let inner: Vec<String> = items.iter().map(Value::repr).collect();
                format!("[{}]", inner.join(", "))
            }
            Value::Dict(entries) => {
                let inner: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{:?}: {}", k, v.repr()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
            Value::PortSpec(port) => {
                let mut out = format!(
                    "PortSpec(number={}, transport_protocol={:?}",
                    port.number,
                    port.transport_protocol.as_str()
                );
                if let Some(app) = &port.application_protocol {
                    let _ = write!(out, ", application_protocol={:?}", app);
                }
                out.push(')');
                out
            }
            Value::Connection(conn) => format!(
                "Connection(packet_loss_percentage={})",
                format_float(f64::from(conn.packet_loss_percentage()))
            ),
            Value::ServiceConfig(config) => format!("ServiceConfig(image={:?})", config.image),
            Value::Service(service) => format!(
                "Service(service_id={:?}, ip_address={:?})",
                service.service_id.as_str(),
                service.ip_address()
            ),
            Value::Builtin(builtin) => format!("<built-in function {}>", builtin.name()),
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(entries) => Value::Dict(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.is_finite() {
        format!("{:.1}", f)
    } else {
        f.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repr_and_str() {
        let value = Value::List(vec![
            Value::String("a".into()),
            Value::Int(1),
            Value::Float(2.0),
            Value::None,
        ]);
        assert_eq!(value.repr(), r#"["a", 1, 2.0, None]"#);
        assert_eq!(Value::String("a".into()).to_str(), "a");
    }

    #[test]
    fn test_service_ip_address_is_placeholder() {
        let service = Value::Service(ServiceRef {
            service_id: "db".into(),
            ports: BTreeMap::new(),
        });
        assert_eq!(
            service.attr("ip_address"),
            Some(Value::String("{{service:db.ip_address}}".into()))
        );
        assert_eq!(service.attr("nope"), None);
    }

    #[test]
    fn test_from_json_keeps_ints_and_floats_apart() {
        let json: serde_json::Value = serde_json::json!({"n": 3, "f": 1.5});
        let Value::Dict(entries) = Value::from_json(&json) else {
            panic!("expected dict");
        };
        assert_eq!(entries.get("n"), Some(&Value::Int(3)));
        assert_eq!(entries.get("f"), Some(&Value::Float(1.5)));
    }
}
