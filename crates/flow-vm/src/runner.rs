//! The bytecode interpreter.
//!
//! A [`Runner`] executes one handler invocation: it owns the operand
//! stack, the variable slots, the instruction pointer, the regex match
//! context and the host's per-invocation context, and borrows the
//! immutable [`Program`] and [`Runtime`]. Many runners may execute the same program concurrently;
//! each runner is driven by exactly one thread at a time.
//!
//! Suspension is cooperative: a native callback calls `Params::suspend`,
//! the runner finishes the current call instruction and halts before the
//! next opcode, and the host later calls [`Runner::resume`]. Resuming a
//! finished or never-started runner is a no-op.

use std::any::Any;

use tracing::trace;

use flow_core::Value;

use crate::opcode::Opcode;
use crate::params::Params;
use crate::program::Program;
use crate::native::Runtime;

/// Terminal / non-terminal result of driving a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Handler completed; `true` means the request was handled.
    Finished(bool),
    /// A native callback suspended; call [`Runner::resume`] later.
    Suspended,
    /// The host cancelled the invocation.
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Inactive,
    Suspended,
    Finished(bool),
    Aborted,
}

/// Execution failure; aborts the runner.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("operand stack underflow at pc {pc}")]
    StackUnderflow { pc: usize },
    #[error("variable slot {index} out of bounds at pc {pc}")]
    BadSlot { index: usize, pc: usize },
    #[error("type mismatch at pc {pc}: expected {expected}, found {found}")]
    TypeMismatch {
        pc: usize,
        expected: &'static str,
        found: String,
    },
    #[error("division by zero at pc {pc}")]
    DivisionByZero { pc: usize },
    #[error("jump target {target} out of bounds at pc {pc}")]
    BadJump { target: usize, pc: usize },
}

pub struct Runner<'p> {
    program: &'p Program,
    runtime: &'p Runtime,
    handler: u16,
    ip: usize,
    stack: Vec<Value>,
    /// Variable slots, one per executed `ALLOCA`.
    slots: Vec<Value>,
    state: State,
    suspend_requested: bool,
    /// Capture groups of the most recent regex match, group 0 first.
    regex_captures: Option<Vec<String>>,
    context: Option<Box<dyn Any>>,
}

impl<'p> Runner<'p> {
    pub fn new(program: &'p Program, runtime: &'p Runtime, handler: u16) -> Self {
        Self {
            program,
            runtime,
            handler,
            ip: 0,
            stack: Vec::with_capacity(32),
            slots: Vec::new(),
            state: State::Inactive,
            suspend_requested: false,
            regex_captures: None,
            context: None,
        }
    }

    /// Attach host per-invocation context (e.g. the request).
    pub fn with_context(mut self, context: Box<dyn Any>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn context<T: 'static>(&self) -> Option<&T> {
        self.context.as_ref()?.downcast_ref()
    }

    pub fn context_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.context.as_mut()?.downcast_mut()
    }

    /// Detach the host context, e.g. to hand it to a follow-up runner.
    pub fn take_context(&mut self) -> Option<Box<dyn Any>> {
        self.context.take()
    }

    pub fn program(&self) -> &'p Program {
        self.program
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, State::Finished(_) | State::Aborted)
    }

    pub fn is_suspended(&self) -> bool {
        self.state == State::Suspended
    }

    /// Capture groups of the last regex comparison, if it matched.
    pub fn regex_captures(&self) -> Option<&[String]> {
        self.regex_captures.as_deref()
    }

    pub(crate) fn request_suspend(&mut self) {
        self.suspend_requested = true;
    }

    /// Cancel the invocation; a cancelled runner is never resumed.
    pub fn abort(&mut self) {
        if !matches!(self.state, State::Finished(_)) {
            self.state = State::Aborted;
            self.stack.clear();
            self.slots.clear();
        }
    }

    /// Start executing the handler from its first instruction.
    pub fn run(&mut self) -> Result<Outcome, ExecutionError> {
        match self.state {
            State::Inactive => self.execute(),
            _ => self.resume(),
        }
    }

    /// Continue a suspended runner. No-op for finished or aborted runners.
    pub fn resume(&mut self) -> Result<Outcome, ExecutionError> {
        match self.state {
            State::Suspended => self.execute(),
            State::Finished(result) => Ok(Outcome::Finished(result)),
            State::Aborted => Ok(Outcome::Aborted),
            State::Inactive => Ok(Outcome::Suspended),
        }
    }

    fn execute(&mut self) -> Result<Outcome, ExecutionError> {
        let result = self.dispatch();
        if result.is_err() {
            self.state = State::Aborted;
        }
        result
    }

    fn dispatch(&mut self) -> Result<Outcome, ExecutionError> {
        let program = self.program;
        let runtime = self.runtime;
        let pool = program.pool();
        let code = pool.handler_code(self.handler);

        loop {
            if self.suspend_requested {
                self.suspend_requested = false;
                self.state = State::Suspended;
                return Ok(Outcome::Suspended);
            }
            if self.ip >= code.len() {
                self.state = State::Finished(false);
                return Ok(Outcome::Finished(false));
            }

            let pc = self.ip;
            let instr = code[pc];
            self.ip += 1;
            trace!(pc, op = instr.opcode().mnemonic(), "step");

            match instr.opcode() {
                Opcode::NOP => {}

                // {{{ slots and stack management
                Opcode::ALLOCA => {
                    for _ in 0..instr.a() {
                        self.slots.push(Value::default());
                    }
                }
                Opcode::DISCARD => {
                    for _ in 0..instr.a() {
                        self.pop(pc)?;
                    }
                }
                Opcode::LOAD => {
                    let index = instr.a() as usize;
                    let cell = self
                        .slots
                        .get(index)
                        .cloned()
                        .ok_or(ExecutionError::BadSlot { index, pc })?;
                    self.stack.push(cell);
                }
                Opcode::STORE => {
                    let index = instr.a() as usize;
                    let value = self.pop(pc)?;
                    if index >= self.slots.len() {
                        return Err(ExecutionError::BadSlot { index, pc });
                    }
                    self.slots[index] = value;
                }
                // }}}

                // {{{ constant loads
                Opcode::ILOAD => self.stack.push(Value::Number(instr.a() as i64)),
                Opcode::NLOAD => self.stack.push(Value::Number(pool.number(instr.a()))),
                Opcode::SLOAD => self
                    .stack
                    .push(Value::String(pool.string(instr.a()).clone())),
                Opcode::PLOAD => self.stack.push(Value::IpAddr(pool.ipaddr(instr.a()))),
                Opcode::CLOAD => self.stack.push(Value::Cidr(pool.cidr(instr.a()))),
                Opcode::RLOAD => self.stack.push(Value::Regex(instr.a())),
                Opcode::ITLOAD => self
                    .stack
                    .push(Value::IntArray(pool.int_array(instr.a()).clone())),
                Opcode::STLOAD => self
                    .stack
                    .push(Value::StringArray(pool.string_array(instr.a()).clone())),
                Opcode::PTLOAD => self
                    .stack
                    .push(Value::IpAddrArray(pool.ipaddr_array(instr.a()).clone())),
                Opcode::CTLOAD => self
                    .stack
                    .push(Value::CidrArray(pool.cidr_array(instr.a()).clone())),
                // }}}

                // {{{ control flow
                Opcode::JMP => {
                    self.ip = self.jump_target(code.len(), instr.a(), pc)?;
                }
                Opcode::JZ => {
                    let cond = self.pop_bool(pc)?;
                    if !cond {
                        self.ip = self.jump_target(code.len(), instr.a(), pc)?;
                    }
                }
                Opcode::JN => {
                    let cond = self.pop_bool(pc)?;
                    if cond {
                        self.ip = self.jump_target(code.len(), instr.a(), pc)?;
                    }
                }
                Opcode::EXIT => {
                    let result = instr.a() != 0;
                    self.state = State::Finished(result);
                    return Ok(Outcome::Finished(result));
                }
                // }}}

                // {{{ calls
                Opcode::CALL => {
                    let argc = instr.b() as usize;
                    let has_result = instr.c() == 1;
                    let args = self.pop_args(argc, pc)?;
                    let callback = runtime.callback(program.linked_function(instr.a()));
                    let result = {
                        let mut params = Params::new(args, self);
                        callback.invoke(&mut params);
                        params.into_result()
                    };
                    if has_result {
                        self.stack.push(result);
                    }
                }
                Opcode::HANDLER => {
                    let argc = instr.b() as usize;
                    let args = self.pop_args(argc, pc)?;
                    let callback = runtime.callback(program.linked_handler(instr.a()));
                    let result = {
                        let mut params = Params::new(args, self);
                        callback.invoke(&mut params);
                        params.into_result()
                    };
                    if result.as_bool().unwrap_or(false) {
                        self.state = State::Finished(true);
                        return Ok(Outcome::Finished(true));
                    }
                }
                // }}}

                // {{{ casts
                Opcode::N2S => {
                    let n = self.pop_number(pc)?;
                    self.stack.push(Value::string(n.to_string()));
                }
                Opcode::P2S => {
                    let ip = self.pop_ip(pc)?;
                    self.stack.push(Value::string(ip.to_string()));
                }
                Opcode::C2S => {
                    let cidr = self.pop_cidr(pc)?;
                    self.stack.push(Value::string(cidr.to_string()));
                }
                Opcode::R2S => {
                    let id = self.pop_regex(pc)?;
                    self.stack.push(Value::string(pool.regex_source(id)));
                }
                Opcode::S2N => {
                    let s = self.pop_string(pc)?;
                    let n = s.trim().parse::<i64>().unwrap_or(0);
                    self.stack.push(Value::Number(n));
                }
                // }}}

                // {{{ numeric
                Opcode::NNEG => {
                    let v = self.pop_number(pc)?;
                    self.stack.push(Value::Number(v.wrapping_neg()));
                }
                Opcode::NNOT => {
                    let v = self.pop_number(pc)?;
                    self.stack.push(Value::Number(!v));
                }
                Opcode::NADD => self.numeric(pc, i64::wrapping_add)?,
                Opcode::NSUB => self.numeric(pc, i64::wrapping_sub)?,
                Opcode::NMUL => self.numeric(pc, i64::wrapping_mul)?,
                Opcode::NDIV => {
                    let (a, b) = self.pop_two_numbers(pc)?;
                    if b == 0 {
                        return Err(ExecutionError::DivisionByZero { pc });
                    }
                    self.stack.push(Value::Number(a.wrapping_div(b)));
                }
                Opcode::NREM => {
                    let (a, b) = self.pop_two_numbers(pc)?;
                    if b == 0 {
                        return Err(ExecutionError::DivisionByZero { pc });
                    }
                    self.stack.push(Value::Number(a.wrapping_rem(b)));
                }
                Opcode::NPOW => {
                    let (a, b) = self.pop_two_numbers(pc)?;
                    let result = if b < 0 {
                        0
                    } else {
                        a.wrapping_pow(b as u32)
                    };
                    self.stack.push(Value::Number(result));
                }
                Opcode::NAND => self.numeric(pc, |a, b| a & b)?,
                Opcode::NOR => self.numeric(pc, |a, b| a | b)?,
                Opcode::NXOR => self.numeric(pc, |a, b| a ^ b)?,
                Opcode::NSHL => self.numeric(pc, |a, b| a.wrapping_shl(b as u32))?,
                Opcode::NSHR => self.numeric(pc, |a, b| a.wrapping_shr(b as u32))?,
                Opcode::NCMPEQ => self.numeric_cmp(pc, |a, b| a == b)?,
                Opcode::NCMPNE => self.numeric_cmp(pc, |a, b| a != b)?,
                Opcode::NCMPLE => self.numeric_cmp(pc, |a, b| a <= b)?,
                Opcode::NCMPGE => self.numeric_cmp(pc, |a, b| a >= b)?,
                Opcode::NCMPLT => self.numeric_cmp(pc, |a, b| a < b)?,
                Opcode::NCMPGT => self.numeric_cmp(pc, |a, b| a > b)?,
                // }}}

                // {{{ boolean
                Opcode::BNOT => {
                    let v = self.pop_bool(pc)?;
                    self.stack.push(Value::Bool(!v));
                }
                Opcode::BAND => self.boolean(pc, |a, b| a && b)?,
                Opcode::BOR => self.boolean(pc, |a, b| a || b)?,
                Opcode::BXOR => self.boolean(pc, |a, b| a != b)?,
                // }}}

                // {{{ string
                Opcode::SLEN => {
                    let s = self.pop_string(pc)?;
                    self.stack.push(Value::Number(s.len() as i64));
                }
                Opcode::SISEMPTY => {
                    let s = self.pop_string(pc)?;
                    self.stack.push(Value::Bool(s.is_empty()));
                }
                Opcode::SADD => {
                    let b = self.pop_string(pc)?;
                    let a = self.pop_string(pc)?;
                    self.stack.push(Value::string(format!("{a}{b}")));
                }
                Opcode::SSUBSTR => {
                    let offset = self.pop_number(pc)?.max(0) as usize;
                    let s = self.pop_string(pc)?;
                    let tail = s.get(offset.min(s.len())..).unwrap_or("");
                    self.stack.push(Value::string(tail));
                }
                Opcode::SCMPEQ => self.string_cmp(pc, |a, b| a == b)?,
                Opcode::SCMPNE => self.string_cmp(pc, |a, b| a != b)?,
                Opcode::SCMPLE => self.string_cmp(pc, |a, b| a <= b)?,
                Opcode::SCMPGE => self.string_cmp(pc, |a, b| a >= b)?,
                Opcode::SCMPLT => self.string_cmp(pc, |a, b| a < b)?,
                Opcode::SCMPGT => self.string_cmp(pc, |a, b| a > b)?,
                Opcode::SREGMATCH => {
                    let subject = self.pop_string(pc)?;
                    let regex = pool.regex(instr.a());
                    match regex.captures(&subject) {
                        Some(captures) => {
                            self.regex_captures = Some(
                                captures
                                    .iter()
                                    .map(|g| g.map(|m| m.as_str().to_string()).unwrap_or_default())
                                    .collect(),
                            );
                            self.stack.push(Value::Bool(true));
                        }
                        None => self.stack.push(Value::Bool(false)),
                    }
                }
                Opcode::SCMPBEG => self.string_cmp(pc, |a, b| a.starts_with(b))?,
                Opcode::SCMPEND => self.string_cmp(pc, |a, b| a.ends_with(b))?,
                Opcode::SCONTAINS => self.string_cmp(pc, |a, b| b.contains(a))?,
                // }}}

                // {{{ ip address
                Opcode::PCMPEQ => {
                    let b = self.pop_ip(pc)?;
                    let a = self.pop_ip(pc)?;
                    self.stack.push(Value::Bool(a == b));
                }
                Opcode::PCMPNE => {
                    let b = self.pop_ip(pc)?;
                    let a = self.pop_ip(pc)?;
                    self.stack.push(Value::Bool(a != b));
                }
                Opcode::PINCIDR => {
                    let cidr = self.pop_cidr(pc)?;
                    let ip = self.pop_ip(pc)?;
                    self.stack.push(Value::Bool(cidr.contains(&ip)));
                }
                // }}}

                // {{{ match dispatch
                Opcode::SMATCHEQ | Opcode::SMATCHBEG | Opcode::SMATCHEND | Opcode::SMATCHR => {
                    let subject = self.pop_string(pc)?;
                    let def = pool.match_def(instr.a());
                    let mut target = def.else_pc;
                    for case in &def.cases {
                        let hit = match instr.opcode() {
                            Opcode::SMATCHEQ => **pool.string(case.label) == *subject,
                            Opcode::SMATCHBEG => subject.starts_with(&**pool.string(case.label)),
                            Opcode::SMATCHEND => subject.ends_with(&**pool.string(case.label)),
                            Opcode::SMATCHR => pool.regex(case.label).is_match(&subject),
                            _ => unreachable!(),
                        };
                        if hit {
                            target = case.pc;
                            break;
                        }
                    }
                    if target >= code.len() {
                        return Err(ExecutionError::BadJump { target, pc });
                    }
                    self.ip = target;
                }
                // }}}
            }
        }
    }

    // {{{ stack helpers
    fn pop(&mut self, pc: usize) -> Result<Value, ExecutionError> {
        self.stack
            .pop()
            .ok_or(ExecutionError::StackUnderflow { pc })
    }

    fn pop_args(&mut self, argc: usize, pc: usize) -> Result<Vec<Value>, ExecutionError> {
        let mut args = vec![Value::default(); argc + 1];
        for index in (1..=argc).rev() {
            args[index] = self.pop(pc)?;
        }
        Ok(args)
    }

    // Boolean constants travel through the integer immediate load, so a
    // boolean cell may arrive as a number; zero is false.
    fn pop_bool(&mut self, pc: usize) -> Result<bool, ExecutionError> {
        match self.pop(pc)? {
            Value::Bool(b) => Ok(b),
            Value::Number(n) => Ok(n != 0),
            other => Err(self.type_mismatch(pc, "Boolean", other)),
        }
    }

    fn pop_number(&mut self, pc: usize) -> Result<i64, ExecutionError> {
        match self.pop(pc)? {
            Value::Number(n) => Ok(n),
            other => Err(self.type_mismatch(pc, "Number", other)),
        }
    }

    fn pop_two_numbers(&mut self, pc: usize) -> Result<(i64, i64), ExecutionError> {
        let b = self.pop_number(pc)?;
        let a = self.pop_number(pc)?;
        Ok((a, b))
    }

    fn pop_string(&mut self, pc: usize) -> Result<std::sync::Arc<str>, ExecutionError> {
        match self.pop(pc)? {
            Value::String(s) => Ok(s),
            other => Err(self.type_mismatch(pc, "String", other)),
        }
    }

    fn pop_ip(&mut self, pc: usize) -> Result<std::net::IpAddr, ExecutionError> {
        match self.pop(pc)? {
            Value::IpAddr(ip) => Ok(ip),
            other => Err(self.type_mismatch(pc, "IPAddress", other)),
        }
    }

    fn pop_cidr(&mut self, pc: usize) -> Result<flow_core::Cidr, ExecutionError> {
        match self.pop(pc)? {
            Value::Cidr(c) => Ok(c),
            other => Err(self.type_mismatch(pc, "Cidr", other)),
        }
    }

    fn pop_regex(&mut self, pc: usize) -> Result<u16, ExecutionError> {
        match self.pop(pc)? {
            Value::Regex(id) => Ok(id),
            other => Err(self.type_mismatch(pc, "RegExp", other)),
        }
    }

    fn type_mismatch(&self, pc: usize, expected: &'static str, found: Value) -> ExecutionError {
        ExecutionError::TypeMismatch {
            pc,
            expected,
            found: found.type_of().to_string(),
        }
    }

    fn jump_target(
        &self,
        code_len: usize,
        operand: u16,
        pc: usize,
    ) -> Result<usize, ExecutionError> {
        let target = operand as usize;
        if target >= code_len {
            return Err(ExecutionError::BadJump { target, pc });
        }
        Ok(target)
    }

    fn numeric(
        &mut self,
        pc: usize,
        f: impl FnOnce(i64, i64) -> i64,
    ) -> Result<(), ExecutionError> {
        let (a, b) = self.pop_two_numbers(pc)?;
        self.stack.push(Value::Number(f(a, b)));
        Ok(())
    }

    fn numeric_cmp(
        &mut self,
        pc: usize,
        f: impl FnOnce(i64, i64) -> bool,
    ) -> Result<(), ExecutionError> {
        let (a, b) = self.pop_two_numbers(pc)?;
        self.stack.push(Value::Bool(f(a, b)));
        Ok(())
    }

    fn boolean(
        &mut self,
        pc: usize,
        f: impl FnOnce(bool, bool) -> bool,
    ) -> Result<(), ExecutionError> {
        let b = self.pop_bool(pc)?;
        let a = self.pop_bool(pc)?;
        self.stack.push(Value::Bool(f(a, b)));
        Ok(())
    }

    fn string_cmp(
        &mut self,
        pc: usize,
        f: impl FnOnce(&str, &str) -> bool,
    ) -> Result<(), ExecutionError> {
        let b = self.pop_string(pc)?;
        let a = self.pop_string(pc)?;
        self.stack.push(Value::Bool(f(&a, &b)));
        Ok(())
    }
    // }}}
}
