//! Callable signatures.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::FlowType;

/// The join key between a compiled call site and a host callback.
///
/// Two natives with the same name but different parameter-type lists are
/// distinct callables; return type does not participate in lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    name: String,
    return_type: FlowType,
    params: Vec<FlowType>,
}

impl Signature {
    pub fn new(name: impl Into<String>, return_type: FlowType, params: Vec<FlowType>) -> Self {
        Self {
            name: name.into(),
            return_type,
            params,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn return_type(&self) -> FlowType {
        self.return_type
    }

    pub fn params(&self) -> &[FlowType] {
        &self.params
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Append a parameter type; used by the registration builder.
    pub fn push_param(&mut self, ty: FlowType) {
        self.params.push(ty);
    }

    /// Exact match on name and parameter types.
    pub fn matches(&self, name: &str, args: &[FlowType]) -> bool {
        self.name == name && self.params.as_slice() == args
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{p}")?;
        }
        write!(f, ") -> {}", self.return_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_match() {
        let sig = Signature::new(
            "req.header",
            FlowType::String,
            vec![FlowType::String],
        );
        assert_eq!(sig.to_string(), "req.header(String) -> String");
        assert!(sig.matches("req.header", &[FlowType::String]));
        assert!(!sig.matches("req.header", &[FlowType::Number]));
        assert!(!sig.matches("req.path", &[FlowType::String]));
    }
}
