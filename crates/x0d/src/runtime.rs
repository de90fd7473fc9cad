//! The daemon's core native module.
//!
//! These are the callables every `x0d` configuration is written against:
//! listener setup in `setup`, request inspection and response generation
//! in `main`. The `setup`/`main` split is enforced at parse time through
//! each callable's declared contexts.

use std::collections::HashMap;
use std::net::IpAddr;

use tracing::info;

use flow_core::{Contexts, FlowType};
use flow_ir::Constant;
use flow_vm::{Runtime, VerifyOutcome};

/// Server state accumulated by the `setup` handler.
#[derive(Debug, Default, Clone)]
pub struct ServerConfig {
    pub listen_ports: Vec<u16>,
    pub workers: i64,
    pub docroot: Option<String>,
    /// Linked id of the Flow handler to run for unhandled requests.
    pub error_handler: Option<u16>,
}

/// One simulated (or real) request being routed by `main`.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub remote: IpAddr,
}

impl Default for Request {
    fn default() -> Self {
        Self {
            method: "GET".to_string(),
            path: "/".to_string(),
            headers: Vec::new(),
            remote: IpAddr::from([127, 0, 0, 1]),
        }
    }
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Per-invocation context attached to each runner.
#[derive(Debug, Default)]
pub struct HostContext {
    pub config: ServerConfig,
    pub request: Request,
    /// Response status recorded by the `return` native.
    pub status: Option<i64>,
    /// Pending sleep recorded by the `sleep` native; the driver resumes
    /// the runner after honoring it.
    pub pending_sleep: Option<i64>,
}

impl HostContext {
    pub fn for_request(config: ServerConfig, request: Request) -> Self {
        Self {
            config,
            request,
            status: None,
            pending_sleep: None,
        }
    }
}

/// Build the runtime with the daemon's core module registered.
///
/// The process environment is captured once here; `sys.env` call sites
/// with a literal name constant-fold to the captured value at link time.
pub fn core_runtime() -> Runtime {
    let mut runtime = Runtime::new();
    let env: HashMap<String, String> = std::env::vars().collect();

    // {{{ setup context
    runtime
        .register_function("listen", FlowType::Void)
        .param(FlowType::Number)
        .contexts(Contexts::SETUP)
        .bind(|params| {
            let port = params.get_int(1);
            if let Some(host) = params.context_mut::<HostContext>() {
                host.config.listen_ports.push(port as u16);
            }
            info!(port, "listener configured");
        });

    runtime
        .register_function("workers", FlowType::Void)
        .param_default(FlowType::Number, 1i64)
        .contexts(Contexts::SETUP)
        .bind(|params| {
            let count = params.get_int(1);
            if let Some(host) = params.context_mut::<HostContext>() {
                host.config.workers = count;
            }
        });

    runtime
        .register_function("docroot", FlowType::Void)
        .param(FlowType::String)
        .contexts(Contexts::SETUP)
        .bind(|params| {
            let path = params.get_string(1);
            if let Some(host) = params.context_mut::<HostContext>() {
                host.config.docroot = Some(path.to_string());
            }
        });

    runtime
        .register_function("error.handler", FlowType::Void)
        .param(FlowType::Handler)
        .contexts(Contexts::SETUP)
        .bind(|params| {
            let handler = params.get_handler(1);
            if let Some(host) = params.context_mut::<HostContext>() {
                host.config.error_handler = Some(handler);
            }
        });
    // }}}

    // {{{ both contexts
    runtime
        .register_function("log", FlowType::Void)
        .param(FlowType::String)
        .bind(|params| {
            info!(target: "flow", "{}", params.get_string(1));
        });

    let verifier_env = env.clone();
    runtime
        .register_function("sys.env", FlowType::String)
        .param(FlowType::String)
        .read_only()
        .verifier(move |args| match args {
            [Constant::Str(name)] => VerifyOutcome::Fold(Constant::Str(
                verifier_env.get(name).cloned().unwrap_or_default(),
            )),
            _ => VerifyOutcome::Accept,
        })
        .bind(move |params| {
            let name = params.get_string(1);
            params.set_result(env.get(&*name).cloned().unwrap_or_default());
        });
    // }}}

    // {{{ main context
    runtime
        .register_handler("return")
        .param(FlowType::Number)
        .bind(|params| {
            let status = params.get_int(1);
            if let Some(host) = params.context_mut::<HostContext>() {
                host.status = Some(status);
            }
            params.set_result(true);
        });

    runtime
        .register_function("sleep", FlowType::Void)
        .param(FlowType::Number)
        .contexts(Contexts::MAIN)
        .bind(|params| {
            let seconds = params.get_int(1);
            if let Some(host) = params.context_mut::<HostContext>() {
                host.pending_sleep = Some(seconds);
            }
            params.suspend();
        });

    runtime
        .register_function("req.path", FlowType::String)
        .contexts(Contexts::MAIN)
        .bind(|params| {
            let path = params
                .context::<HostContext>()
                .map(|h| h.request.path.clone())
                .unwrap_or_default();
            params.set_result(path);
        });

    runtime
        .register_function("req.method", FlowType::String)
        .contexts(Contexts::MAIN)
        .bind(|params| {
            let method = params
                .context::<HostContext>()
                .map(|h| h.request.method.clone())
                .unwrap_or_default();
            params.set_result(method);
        });

    runtime
        .register_function("req.header", FlowType::String)
        .param(FlowType::String)
        .contexts(Contexts::MAIN)
        .bind(|params| {
            let name = params.get_string(1);
            let value = params
                .context::<HostContext>()
                .and_then(|h| h.request.header(&name).map(str::to_string))
                .unwrap_or_default();
            params.set_result(value);
        });

    runtime
        .register_function("remote.ip", FlowType::IPAddress)
        .contexts(Contexts::MAIN)
        .bind(|params| {
            let remote = params
                .context::<HostContext>()
                .map(|h| h.request.remote)
                .unwrap_or_else(|| IpAddr::from([0, 0, 0, 0]));
            params.set_result(remote);
        });
    // }}}

    runtime
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_core::NativeRegistry;

    #[test]
    fn core_module_covers_both_contexts() {
        let runtime = core_runtime();
        assert!(!runtime.candidates("listen").is_empty());
        assert!(!runtime.candidates("return").is_empty());
        assert!(!runtime.candidates("req.header").is_empty());
        assert!(runtime.has_module("sys"));
        assert!(runtime.has_module("req"));
    }

    #[test]
    fn request_header_lookup_is_case_insensitive() {
        let request = Request {
            headers: vec![("Host".into(), "example.com".into())],
            ..Request::default()
        };
        assert_eq!(request.header("host"), Some("example.com"));
        assert_eq!(request.header("x-none"), None);
    }
}
