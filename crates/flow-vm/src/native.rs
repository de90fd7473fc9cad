//! Native callback registration.
//!
//! The host publishes callables through [`Runtime`]:
//!
//! ```
//! # use flow_vm::Runtime;
//! # use flow_core::FlowType;
//! let mut runtime = Runtime::new();
//! runtime
//!     .register_handler("return")
//!     .param(FlowType::Number)
//!     .bind(|params| {
//!         let _status = params.get_int(1);
//!         params.set_result(true);
//!     });
//! ```
//!
//! The parser sees these entries through the [`NativeRegistry`] trait; the
//! verifier consults the optional per-callback verifier hook; the runner
//! dispatches `CALL`/`HANDLER` opcodes into the bound functors.

use flow_core::{CallableInfo, Contexts, FlowType, NativeRegistry, Signature, Value};
use flow_ir::Constant;

use crate::params::Params;

/// The function the VM invokes for a native call.
pub type Functor = Box<dyn Fn(&mut Params) + Send + Sync>;

/// Link-time verifier hook, consulted per call site when every argument is
/// a compile-time constant.
pub type Verifier = Box<dyn Fn(&[Constant]) -> VerifyOutcome + Send + Sync>;

/// What a verifier decided about a call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The call is fine as written.
    Accept,
    /// The call is invalid; the message becomes a `LinkError`.
    Reject(String),
    /// Replace the call with a constant (constant folding).
    Fold(Constant),
}

/// One host-provided callable.
pub struct NativeCallback {
    info: CallableInfo,
    functor: Option<Functor>,
    verifier: Option<Verifier>,
}

impl NativeCallback {
    fn handler(name: &str) -> Self {
        Self {
            info: CallableInfo {
                signature: Signature::new(name, FlowType::Boolean, Vec::new()),
                is_handler: true,
                contexts: Contexts::MAIN,
                defaults: Vec::new(),
                read_only: false,
            },
            functor: None,
            verifier: None,
        }
    }

    fn function(name: &str, return_type: FlowType) -> Self {
        Self {
            info: CallableInfo {
                signature: Signature::new(name, return_type, Vec::new()),
                is_handler: false,
                contexts: Contexts::BOTH,
                defaults: Vec::new(),
                read_only: false,
            },
            functor: None,
            verifier: None,
        }
    }

    /// Append a required parameter.
    pub fn param(&mut self, ty: FlowType) -> &mut Self {
        self.info.signature.push_param(ty);
        self.info.defaults.push(None);
        self
    }

    /// Append a parameter with a default; call sites may omit it.
    pub fn param_default(&mut self, ty: FlowType, default: impl Into<Value>) -> &mut Self {
        self.info.signature.push_param(ty);
        self.info.defaults.push(Some(default.into()));
        self
    }

    /// Restrict where the callable may be used.
    pub fn contexts(&mut self, contexts: Contexts) -> &mut Self {
        self.info.contexts = contexts;
        self
    }

    /// Mark the callable pure and eligible for constant folding.
    pub fn read_only(&mut self) -> &mut Self {
        self.info.read_only = true;
        self
    }

    pub fn bind(&mut self, f: impl Fn(&mut Params) + Send + Sync + 'static) -> &mut Self {
        self.functor = Some(Box::new(f));
        self
    }

    pub fn verifier(
        &mut self,
        f: impl Fn(&[Constant]) -> VerifyOutcome + Send + Sync + 'static,
    ) -> &mut Self {
        self.verifier = Some(Box::new(f));
        self
    }

    pub fn info(&self) -> &CallableInfo {
        &self.info
    }

    pub fn signature(&self) -> &Signature {
        &self.info.signature
    }

    pub fn is_handler(&self) -> bool {
        self.info.is_handler
    }

    /// Run the verifier hook, if any.
    pub fn verify(&self, args: &[Constant]) -> Option<VerifyOutcome> {
        self.verifier.as_ref().map(|v| v(args))
    }

    /// Invoke the bound functor.
    ///
    /// A callback registered without `bind` is a host bug; invoking it
    /// leaves the result untouched and logs an error.
    pub fn invoke(&self, params: &mut Params) {
        match &self.functor {
            Some(f) => f(params),
            None => tracing::error!(
                callable = %self.info.signature,
                "native callback invoked without a bound functor"
            ),
        }
    }
}

/// The host's callback table.
///
/// Owns every registered [`NativeCallback`] and implements the
/// [`NativeRegistry`] lookup the parser and verifier use. Registration
/// happens before compilation; the table is not mutated afterwards.
#[derive(Default)]
pub struct Runtime {
    callbacks: Vec<NativeCallback>,
    modules: Vec<String>,
}

impl Runtime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a native handler (returns `Boolean`, may terminate the
    /// calling Flow handler). Defaults to main-context only.
    pub fn register_handler(&mut self, name: &str) -> &mut NativeCallback {
        self.callbacks.push(NativeCallback::handler(name));
        self.callbacks.last_mut().expect("just pushed")
    }

    /// Register a native function. Defaults to both contexts.
    pub fn register_function(&mut self, name: &str, return_type: FlowType) -> &mut NativeCallback {
        self.callbacks.push(NativeCallback::function(name, return_type));
        self.callbacks.last_mut().expect("just pushed")
    }

    /// Declare a module importable by `import NAME;`.
    pub fn register_module(&mut self, name: &str) {
        self.modules.push(name.to_string());
    }

    /// Exact lookup by name and parameter types.
    pub fn find_callback(&self, name: &str, params: &[FlowType]) -> Option<(u16, &NativeCallback)> {
        self.callbacks
            .iter()
            .position(|c| c.signature().matches(name, params))
            .map(|pos| (pos as u16, &self.callbacks[pos]))
    }

    pub fn callback(&self, index: u16) -> &NativeCallback {
        &self.callbacks[index as usize]
    }

    pub fn callbacks(&self) -> impl Iterator<Item = &NativeCallback> {
        self.callbacks.iter()
    }
}

impl NativeRegistry for Runtime {
    fn candidates(&self, name: &str) -> Vec<&CallableInfo> {
        self.callbacks
            .iter()
            .filter(|c| c.signature().name() == name)
            .map(|c| c.info())
            .collect()
    }

    fn has_module(&self, module: &str) -> bool {
        let prefix = format!("{module}.");
        self.modules.iter().any(|m| m == module)
            || self
                .callbacks
                .iter()
                .any(|c| c.signature().name().starts_with(&prefix))
    }
}
