//! Foundation types shared by every stage of the Flow toolchain.
//!
//! Flow is the configuration language of the `x0d` server: handlers written
//! in Flow are parsed, lowered to an SSA-style IR, compiled to bytecode and
//! interpreted by the VM while dispatching into host-provided native
//! callbacks. This crate holds the pieces all of those stages agree on:
//!
//! - [`FlowType`] — the closed set of language types
//! - [`Value`] — the runtime carrier for any Flow value
//! - [`Cidr`] — IPv4/IPv6 network literals
//! - [`Signature`] and [`NativeRegistry`] — the join key between compiled
//!   call sites and host callbacks
//! - [`Report`] — the diagnostic sink every compilation phase writes into

pub mod cidr;
pub mod diag;
pub mod registry;
pub mod signature;
pub mod span;
pub mod types;
pub mod value;

pub use cidr::Cidr;
pub use diag::{DiagnosticKind, Message, Report};
pub use registry::{CallableInfo, ConfigContext, Contexts, NativeRegistry};
pub use signature::Signature;
pub use span::{SourceBuffer, SourcePos, SourceSpan};
pub use types::{FlowType, MatchClass};
pub use value::Value;
