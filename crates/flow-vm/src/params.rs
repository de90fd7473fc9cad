//! The argument view handed to native callbacks.
//!
//! `args[0]` is the result slot; arguments are 1-based, matching the
//! calling convention of the `CALL`/`HANDLER` opcodes. Typed accessors
//! panic on a type mismatch: argument types are enforced by the compiler,
//! so a mismatch here is a host-side registration bug, not a runtime
//! condition.

use std::net::IpAddr;
use std::sync::Arc;

use flow_core::{Cidr, Value};

use crate::runner::Runner;

pub struct Params<'a, 'p> {
    args: Vec<Value>,
    runner: &'a mut Runner<'p>,
}

impl<'a, 'p> Params<'a, 'p> {
    pub(crate) fn new(args: Vec<Value>, runner: &'a mut Runner<'p>) -> Self {
        debug_assert!(!args.is_empty(), "args[0] is the result slot");
        Self { args, runner }
    }

    /// Number of arguments (excluding the result slot).
    pub fn count(&self) -> usize {
        self.args.len() - 1
    }

    fn arg(&self, index: usize, expected: &str) -> &Value {
        assert!(
            index >= 1 && index < self.args.len(),
            "native callback read argument {index} of {} (expected {expected})",
            self.count()
        );
        &self.args[index]
    }

    fn mismatch(&self, index: usize, expected: &str) -> ! {
        panic!(
            "native callback read argument {index} as {expected}, found {}",
            self.args[index].type_of()
        )
    }

    // Boolean constants travel through the integer immediate load.
    pub fn get_bool(&self, index: usize) -> bool {
        match self.arg(index, "Boolean") {
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0,
            _ => self.mismatch(index, "Boolean"),
        }
    }

    pub fn get_int(&self, index: usize) -> i64 {
        match self.arg(index, "Number") {
            Value::Number(n) => *n,
            _ => self.mismatch(index, "Number"),
        }
    }

    pub fn get_string(&self, index: usize) -> Arc<str> {
        match self.arg(index, "String") {
            Value::String(s) => s.clone(),
            _ => self.mismatch(index, "String"),
        }
    }

    pub fn get_ip(&self, index: usize) -> IpAddr {
        match self.arg(index, "IPAddress") {
            Value::IpAddr(ip) => *ip,
            _ => self.mismatch(index, "IPAddress"),
        }
    }

    pub fn get_cidr(&self, index: usize) -> Cidr {
        match self.arg(index, "Cidr") {
            Value::Cidr(c) => *c,
            _ => self.mismatch(index, "Cidr"),
        }
    }

    /// Handler references arrive as the linked handler id.
    pub fn get_handler(&self, index: usize) -> u16 {
        match self.arg(index, "Handler") {
            Value::Handler(id) => *id,
            // Handler ids travel through the integer load opcode.
            Value::Number(n) => *n as u16,
            _ => self.mismatch(index, "Handler"),
        }
    }

    pub fn get_int_array(&self, index: usize) -> Arc<Vec<i64>> {
        match self.arg(index, "IntArray") {
            Value::IntArray(xs) => xs.clone(),
            _ => self.mismatch(index, "IntArray"),
        }
    }

    pub fn get_string_array(&self, index: usize) -> Arc<Vec<String>> {
        match self.arg(index, "StringArray") {
            Value::StringArray(xs) => xs.clone(),
            _ => self.mismatch(index, "StringArray"),
        }
    }

    pub fn get_ip_array(&self, index: usize) -> Arc<Vec<IpAddr>> {
        match self.arg(index, "IPAddrArray") {
            Value::IpAddrArray(xs) => xs.clone(),
            _ => self.mismatch(index, "IPAddrArray"),
        }
    }

    pub fn get_cidr_array(&self, index: usize) -> Arc<Vec<Cidr>> {
        match self.arg(index, "CidrArray") {
            Value::CidrArray(xs) => xs.clone(),
            _ => self.mismatch(index, "CidrArray"),
        }
    }

    /// Write the single return value.
    pub fn set_result(&mut self, value: impl Into<Value>) {
        self.args[0] = value.into();
    }

    /// Ask the runner to halt before the next opcode; the host resumes it
    /// later via [`Runner::resume`].
    pub fn suspend(&mut self) {
        self.runner.request_suspend();
    }

    /// The runner executing this call.
    pub fn runner(&mut self) -> &mut Runner<'p> {
        self.runner
    }

    /// Host per-invocation context, downcast to its concrete type.
    pub fn context<T: 'static>(&self) -> Option<&T> {
        self.runner.context::<T>()
    }

    pub fn context_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.runner.context_mut::<T>()
    }

    pub(crate) fn into_result(self) -> Value {
        self.args.into_iter().next().expect("result slot")
    }
}
