//! The compiler's view of host-provided native callables.
//!
//! The parser and verifier never see the VM's callback objects; they
//! resolve names through [`NativeRegistry`], which exposes only signatures
//! and call-site metadata. The VM's `Runtime` implements this trait.

use crate::signature::Signature;
use crate::types::FlowType;
use crate::value::Value;

/// Which configuration phase a call site lives in.
///
/// `setup` runs once at configuration time; `main` (and every other user
/// handler) runs per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigContext {
    Setup,
    Main,
}

/// The set of contexts a callable may be used from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contexts {
    pub setup: bool,
    pub main: bool,
}

impl Contexts {
    pub const SETUP: Contexts = Contexts {
        setup: true,
        main: false,
    };
    pub const MAIN: Contexts = Contexts {
        setup: false,
        main: true,
    };
    pub const BOTH: Contexts = Contexts {
        setup: true,
        main: true,
    };

    pub fn allows(&self, context: ConfigContext) -> bool {
        match context {
            ConfigContext::Setup => self.setup,
            ConfigContext::Main => self.main,
        }
    }
}

/// Metadata for one registered native callable.
#[derive(Debug, Clone)]
pub struct CallableInfo {
    pub signature: Signature,
    /// Handlers return `Boolean` and may terminate the calling Flow handler;
    /// functions produce a value (or `Void`) and always fall through.
    pub is_handler: bool,
    pub contexts: Contexts,
    /// Trailing parameter defaults, aligned to the signature's parameter
    /// list. `None` entries have no default and must be supplied.
    pub defaults: Vec<Option<Value>>,
    /// Read-only callables are pure and eligible for constant folding.
    pub read_only: bool,
}

impl CallableInfo {
    /// Least number of arguments a call site must supply.
    pub fn required_arity(&self) -> usize {
        let trailing_defaults = self
            .defaults
            .iter()
            .rev()
            .take_while(|d| d.is_some())
            .count();
        self.signature.arity() - trailing_defaults
    }
}

/// Lookup interface the parser and verifier use to resolve call sites.
pub trait NativeRegistry {
    /// All callables registered under `name` (same name, different
    /// parameter lists are distinct entries).
    fn candidates(&self, name: &str) -> Vec<&CallableInfo>;

    /// Exact-signature lookup.
    fn find(&self, name: &str, params: &[FlowType]) -> Option<&CallableInfo> {
        self.candidates(name)
            .into_iter()
            .find(|c| c.signature.params() == params)
    }

    /// Whether any callable is registered with the given dotted-name prefix.
    ///
    /// `import http;` resolves by asking the registry for module `http`.
    fn has_module(&self, module: &str) -> bool;
}
