//! Runtime value cells.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use crate::cidr::Cidr;
use crate::types::FlowType;

/// Runtime carrier for any Flow value.
///
/// Booleans and numbers are stored inline. Strings and arrays are shared
/// behind `Arc` so that cloning a cell off the constant pool or between the
/// operand stack and native callbacks never copies the payload. Regexes and
/// handler references carry their constant-pool / program index; the pool
/// owns the compiled object.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Number(i64),
    String(Arc<str>),
    IpAddr(IpAddr),
    Cidr(Cidr),
    /// Index of a compiled regex in the program's constant pool.
    Regex(u16),
    /// Id of a linked handler.
    Handler(u16),
    IntArray(Arc<Vec<i64>>),
    StringArray(Arc<Vec<String>>),
    IpAddrArray(Arc<Vec<IpAddr>>),
    CidrArray(Arc<Vec<Cidr>>),
}

impl Value {
    pub fn type_of(&self) -> FlowType {
        match self {
            Value::Bool(_) => FlowType::Boolean,
            Value::Number(_) => FlowType::Number,
            Value::String(_) => FlowType::String,
            Value::IpAddr(_) => FlowType::IPAddress,
            Value::Cidr(_) => FlowType::Cidr,
            Value::Regex(_) => FlowType::RegExp,
            Value::Handler(_) => FlowType::Handler,
            Value::IntArray(_) => FlowType::IntArray,
            Value::StringArray(_) => FlowType::StringArray,
            Value::IpAddrArray(_) => FlowType::IPAddrArray,
            Value::CidrArray(_) => FlowType::CidrArray,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_ip(&self) -> Option<IpAddr> {
        match self {
            Value::IpAddr(ip) => Some(*ip),
            _ => None,
        }
    }

    pub fn as_cidr(&self) -> Option<Cidr> {
        match self {
            Value::Cidr(c) => Some(*c),
            _ => None,
        }
    }

    /// Shorthand for building a string cell.
    pub fn string(s: impl AsRef<str>) -> Value {
        Value::String(Arc::from(s.as_ref()))
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Bool(false)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Number(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::string(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::string(v)
    }
}

impl From<IpAddr> for Value {
    fn from(v: IpAddr) -> Self {
        Value::IpAddr(v)
    }
}

impl From<Cidr> for Value {
    fn from(v: Cidr) -> Self {
        Value::Cidr(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s}"),
            Value::IpAddr(ip) => write!(f, "{ip}"),
            Value::Cidr(c) => write!(f, "{c}"),
            Value::Regex(id) => write!(f, "<regex #{id}>"),
            Value::Handler(id) => write!(f, "<handler #{id}>"),
            Value::IntArray(xs) => write!(f, "{xs:?}"),
            Value::StringArray(xs) => write!(f, "{xs:?}"),
            Value::IpAddrArray(xs) => write!(f, "{xs:?}"),
            Value::CidrArray(xs) => {
                let items: Vec<String> = xs.iter().map(Cidr::to_string).collect();
                write!(f, "{items:?}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_of_matches_variant() {
        assert_eq!(Value::Number(7).type_of(), FlowType::Number);
        assert_eq!(Value::string("x").type_of(), FlowType::String);
        assert_eq!(Value::Handler(3).type_of(), FlowType::Handler);
    }

    #[test]
    fn accessors_reject_other_variants() {
        assert_eq!(Value::Number(1).as_bool(), None);
        assert_eq!(Value::Bool(true).as_number(), None);
        assert_eq!(Value::string("a").as_str(), Some("a"));
    }
}
