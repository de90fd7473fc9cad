//! The program's constant pool.
//!
//! Interned literals addressed by small integer ids. The pool is
//! append-only: an id, once issued, stays valid for the program's
//! lifetime, and interning an equal value twice returns the same id.
//! Regexes are compiled on interning; a pattern the regex engine rejects
//! is reported as a `LinkError` by the caller.

use std::net::IpAddr;
use std::sync::Arc;

use indexmap::IndexMap;
use regex::Regex;

use flow_core::{Cidr, MatchClass, Signature};

use crate::opcode::Instruction;

/// One `on LIT =>` entry of a match table.
#[derive(Debug, Clone)]
pub struct MatchCaseDef {
    /// Constant-pool id of the label (string id, or regex id for
    /// `MatchClass::RegExp`).
    pub label: u16,
    /// Program counter of the case body, patched in after emission.
    pub pc: usize,
}

/// A compiled `match` dispatch table.
#[derive(Debug, Clone)]
pub struct MatchDef {
    pub handler_id: u16,
    pub class: MatchClass,
    pub cases: Vec<MatchCaseDef>,
    /// Program counter of the else branch.
    pub else_pc: usize,
}

/// Pool error; the only fallible interning is regex compilation.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("invalid regular expression /{pattern}/: {error}")]
    BadRegex {
        pattern: String,
        error: regex::Error,
    },
}

/// Interned literals, match tables, native references and handler code.
#[derive(Debug, Default)]
pub struct ConstantPool {
    numbers: Vec<i64>,
    number_ids: IndexMap<i64, u16>,
    strings: Vec<Arc<str>>,
    string_ids: IndexMap<String, u16>,
    ipaddrs: Vec<IpAddr>,
    ipaddr_ids: IndexMap<IpAddr, u16>,
    cidrs: Vec<Cidr>,
    cidr_ids: IndexMap<Cidr, u16>,
    regexes: Vec<(String, Regex)>,
    regex_ids: IndexMap<String, u16>,
    int_arrays: Vec<Arc<Vec<i64>>>,
    string_arrays: Vec<Arc<Vec<String>>>,
    ipaddr_arrays: Vec<Arc<Vec<IpAddr>>>,
    cidr_arrays: Vec<Arc<Vec<Cidr>>>,
    match_defs: Vec<MatchDef>,
    native_functions: Vec<Signature>,
    native_handlers: Vec<Signature>,
    handlers: Vec<(String, Vec<Instruction>)>,
    modules: Vec<String>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    // {{{ interning
    pub fn make_number(&mut self, value: i64) -> u16 {
        if let Some(id) = self.number_ids.get(&value) {
            return *id;
        }
        let id = self.numbers.len() as u16;
        self.numbers.push(value);
        self.number_ids.insert(value, id);
        id
    }

    pub fn make_string(&mut self, value: &str) -> u16 {
        if let Some(id) = self.string_ids.get(value) {
            return *id;
        }
        let id = self.strings.len() as u16;
        self.strings.push(Arc::from(value));
        self.string_ids.insert(value.to_string(), id);
        id
    }

    pub fn make_ipaddr(&mut self, value: IpAddr) -> u16 {
        if let Some(id) = self.ipaddr_ids.get(&value) {
            return *id;
        }
        let id = self.ipaddrs.len() as u16;
        self.ipaddrs.push(value);
        self.ipaddr_ids.insert(value, id);
        id
    }

    pub fn make_cidr(&mut self, value: Cidr) -> u16 {
        if let Some(id) = self.cidr_ids.get(&value) {
            return *id;
        }
        let id = self.cidrs.len() as u16;
        self.cidrs.push(value);
        self.cidr_ids.insert(value, id);
        id
    }

    pub fn make_regex(&mut self, pattern: &str) -> Result<u16, PoolError> {
        if let Some(id) = self.regex_ids.get(pattern) {
            return Ok(*id);
        }
        let compiled = Regex::new(pattern).map_err(|error| PoolError::BadRegex {
            pattern: pattern.to_string(),
            error,
        })?;
        let id = self.regexes.len() as u16;
        self.regexes.push((pattern.to_string(), compiled));
        self.regex_ids.insert(pattern.to_string(), id);
        Ok(id)
    }

    pub fn make_int_array(&mut self, values: Vec<i64>) -> u16 {
        if let Some(pos) = self.int_arrays.iter().position(|a| **a == values) {
            return pos as u16;
        }
        let id = self.int_arrays.len() as u16;
        self.int_arrays.push(Arc::new(values));
        id
    }

    pub fn make_string_array(&mut self, values: Vec<String>) -> u16 {
        if let Some(pos) = self.string_arrays.iter().position(|a| **a == values) {
            return pos as u16;
        }
        let id = self.string_arrays.len() as u16;
        self.string_arrays.push(Arc::new(values));
        id
    }

    pub fn make_ipaddr_array(&mut self, values: Vec<IpAddr>) -> u16 {
        if let Some(pos) = self.ipaddr_arrays.iter().position(|a| **a == values) {
            return pos as u16;
        }
        let id = self.ipaddr_arrays.len() as u16;
        self.ipaddr_arrays.push(Arc::new(values));
        id
    }

    pub fn make_cidr_array(&mut self, values: Vec<Cidr>) -> u16 {
        if let Some(pos) = self.cidr_arrays.iter().position(|a| **a == values) {
            return pos as u16;
        }
        let id = self.cidr_arrays.len() as u16;
        self.cidr_arrays.push(Arc::new(values));
        id
    }

    pub fn make_match_def(&mut self, def: MatchDef) -> u16 {
        let id = self.match_defs.len() as u16;
        self.match_defs.push(def);
        id
    }

    pub fn make_native_function(&mut self, signature: &Signature) -> u16 {
        if let Some(pos) = self.native_functions.iter().position(|s| s == signature) {
            return pos as u16;
        }
        let id = self.native_functions.len() as u16;
        self.native_functions.push(signature.clone());
        id
    }

    pub fn make_native_handler(&mut self, signature: &Signature) -> u16 {
        if let Some(pos) = self.native_handlers.iter().position(|s| s == signature) {
            return pos as u16;
        }
        let id = self.native_handlers.len() as u16;
        self.native_handlers.push(signature.clone());
        id
    }

    /// Forward-declare a handler, returning its stable id.
    pub fn make_handler(&mut self, name: &str) -> u16 {
        if let Some(pos) = self.handlers.iter().position(|(n, _)| n == name) {
            return pos as u16;
        }
        let id = self.handlers.len() as u16;
        self.handlers.push((name.to_string(), Vec::new()));
        id
    }

    pub fn set_handler_code(&mut self, id: u16, code: Vec<Instruction>) {
        self.handlers[id as usize].1 = code;
    }

    pub fn set_modules(&mut self, modules: Vec<String>) {
        self.modules = modules;
    }
    // }}}

    // {{{ access
    pub fn number(&self, id: u16) -> i64 {
        self.numbers[id as usize]
    }

    pub fn string(&self, id: u16) -> &Arc<str> {
        &self.strings[id as usize]
    }

    pub fn ipaddr(&self, id: u16) -> IpAddr {
        self.ipaddrs[id as usize]
    }

    pub fn cidr(&self, id: u16) -> Cidr {
        self.cidrs[id as usize]
    }

    pub fn regex(&self, id: u16) -> &Regex {
        &self.regexes[id as usize].1
    }

    pub fn regex_source(&self, id: u16) -> &str {
        &self.regexes[id as usize].0
    }

    pub fn int_array(&self, id: u16) -> &Arc<Vec<i64>> {
        &self.int_arrays[id as usize]
    }

    pub fn string_array(&self, id: u16) -> &Arc<Vec<String>> {
        &self.string_arrays[id as usize]
    }

    pub fn ipaddr_array(&self, id: u16) -> &Arc<Vec<IpAddr>> {
        &self.ipaddr_arrays[id as usize]
    }

    pub fn cidr_array(&self, id: u16) -> &Arc<Vec<Cidr>> {
        &self.cidr_arrays[id as usize]
    }

    pub fn match_def(&self, id: u16) -> &MatchDef {
        &self.match_defs[id as usize]
    }

    pub fn match_def_mut(&mut self, id: u16) -> &mut MatchDef {
        &mut self.match_defs[id as usize]
    }

    pub fn native_function(&self, id: u16) -> &Signature {
        &self.native_functions[id as usize]
    }

    pub fn native_handler(&self, id: u16) -> &Signature {
        &self.native_handlers[id as usize]
    }

    pub fn native_functions(&self) -> &[Signature] {
        &self.native_functions
    }

    pub fn native_handlers(&self) -> &[Signature] {
        &self.native_handlers
    }

    pub fn handler_id(&self, name: &str) -> Option<u16> {
        self.handlers.iter().position(|(n, _)| n == name).map(|p| p as u16)
    }

    pub fn handler_name(&self, id: u16) -> &str {
        &self.handlers[id as usize].0
    }

    pub fn handler_code(&self, id: u16) -> &[Instruction] {
        &self.handlers[id as usize].1
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn modules(&self) -> &[String] {
        &self.modules
    }
    // }}}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable() {
        let mut pool = ConstantPool::new();
        let a = pool.make_string("hello");
        let b = pool.make_string("world");
        let c = pool.make_string("hello");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(&**pool.string(a), "hello");
    }

    #[test]
    fn numbers_and_arrays() {
        let mut pool = ConstantPool::new();
        let n = pool.make_number(1 << 40);
        assert_eq!(pool.number(n), 1 << 40);
        let xs = pool.make_int_array(vec![1, 2, 3]);
        assert_eq!(pool.make_int_array(vec![1, 2, 3]), xs);
        assert_eq!(**pool.int_array(xs), vec![1, 2, 3]);
    }

    #[test]
    fn regex_compiles_on_interning() {
        let mut pool = ConstantPool::new();
        let id = pool.make_regex("^/a.*$").unwrap();
        assert!(pool.regex(id).is_match("/abc"));
        assert_eq!(pool.regex_source(id), "^/a.*$");
        assert!(pool.make_regex("([").is_err());
    }

    #[test]
    fn handlers_forward_declare() {
        let mut pool = ConstantPool::new();
        let main = pool.make_handler("main");
        let setup = pool.make_handler("setup");
        assert_eq!(pool.make_handler("main"), main);
        assert_ne!(main, setup);
        assert_eq!(pool.handler_id("setup"), Some(setup));
        assert_eq!(pool.handler_name(main), "main");
    }
}
