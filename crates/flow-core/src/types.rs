//! The closed set of Flow types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Static type of a Flow expression or value.
///
/// The set is closed: Flow has no user-defined aggregates and no maps.
/// Arrays exist only as immutable literals of the four element kinds below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowType {
    /// No value; the return type of effect-only native functions.
    Void,
    Boolean,
    /// 64-bit signed integer.
    Number,
    String,
    /// IPv4 or IPv6 address.
    IPAddress,
    /// Network in CIDR notation.
    Cidr,
    RegExp,
    /// Reference to a compiled handler.
    Handler,
    IntArray,
    StringArray,
    IPAddrArray,
    CidrArray,
}

impl FlowType {
    /// Whether this type is one of the four array kinds.
    pub fn is_array(self) -> bool {
        matches!(
            self,
            FlowType::IntArray | FlowType::StringArray | FlowType::IPAddrArray | FlowType::CidrArray
        )
    }

    /// Element type of an array type, or `None` for scalars.
    pub fn element_type(self) -> Option<FlowType> {
        match self {
            FlowType::IntArray => Some(FlowType::Number),
            FlowType::StringArray => Some(FlowType::String),
            FlowType::IPAddrArray => Some(FlowType::IPAddress),
            FlowType::CidrArray => Some(FlowType::Cidr),
            _ => None,
        }
    }

    /// Array type with the given element type, if one exists.
    pub fn array_of(element: FlowType) -> Option<FlowType> {
        match element {
            FlowType::Number => Some(FlowType::IntArray),
            FlowType::String => Some(FlowType::StringArray),
            FlowType::IPAddress => Some(FlowType::IPAddrArray),
            FlowType::Cidr => Some(FlowType::CidrArray),
            _ => None,
        }
    }

    /// Whether a value of this type converts implicitly to `target`.
    ///
    /// The matrix is exactly the cast set lowered by the code generator:
    /// `Number|IPAddress|Cidr|RegExp -> String` and `String -> Number`.
    /// Same-type conversion is trivially allowed.
    pub fn casts_to(self, target: FlowType) -> bool {
        if self == target {
            return true;
        }
        matches!(
            (self, target),
            (FlowType::Number, FlowType::String)
                | (FlowType::IPAddress, FlowType::String)
                | (FlowType::Cidr, FlowType::String)
                | (FlowType::RegExp, FlowType::String)
                | (FlowType::String, FlowType::Number)
        )
    }
}

/// Comparison class of a `match` statement.
///
/// Decided at parse time from the match operator and the case label kinds,
/// carried through the IR `Match` terminator, and recorded in the bytecode
/// program's match tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchClass {
    /// Exact string equality.
    Same,
    /// Case labels are prefixes of the subject.
    Head,
    /// Case labels are suffixes of the subject.
    Tail,
    /// Case labels are regular expressions.
    RegExp,
}

impl fmt::Display for MatchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchClass::Same => "Same",
            MatchClass::Head => "Head",
            MatchClass::Tail => "Tail",
            MatchClass::RegExp => "RegExp",
        };
        f.write_str(name)
    }
}

impl fmt::Display for FlowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowType::Void => "Void",
            FlowType::Boolean => "Boolean",
            FlowType::Number => "Number",
            FlowType::String => "String",
            FlowType::IPAddress => "IPAddress",
            FlowType::Cidr => "Cidr",
            FlowType::RegExp => "RegExp",
            FlowType::Handler => "Handler",
            FlowType::IntArray => "IntArray",
            FlowType::StringArray => "StringArray",
            FlowType::IPAddrArray => "IPAddrArray",
            FlowType::CidrArray => "CidrArray",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_element_round_trip() {
        for ty in [
            FlowType::IntArray,
            FlowType::StringArray,
            FlowType::IPAddrArray,
            FlowType::CidrArray,
        ] {
            let elem = ty.element_type().unwrap();
            assert_eq!(FlowType::array_of(elem), Some(ty));
        }
        assert_eq!(FlowType::Boolean.element_type(), None);
    }

    #[test]
    fn cast_matrix() {
        assert!(FlowType::Number.casts_to(FlowType::String));
        assert!(FlowType::String.casts_to(FlowType::Number));
        assert!(FlowType::Cidr.casts_to(FlowType::String));
        assert!(!FlowType::String.casts_to(FlowType::IPAddress));
        assert!(!FlowType::Boolean.casts_to(FlowType::Number));
        assert!(FlowType::Handler.casts_to(FlowType::Handler));
    }
}
