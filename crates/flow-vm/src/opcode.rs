//! Opcodes and the packed instruction word.
//!
//! An [`Instruction`] is a single 64-bit word: `[opcode:16][A:16][B:16][C:16]`.
//! Field meaning is opcode-specific; most instructions use only `A`.
//! Numbers that fit the unsigned 16-bit immediate load through `ILOAD`;
//! everything else goes through the constant pool.

use std::fmt;

macro_rules! opcodes {
    ($($name:ident = $value:literal, $mnemonic:literal;)*) => {
        /// Bytecode operation.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum Opcode {
            $($name = $value,)*
        }

        impl Opcode {
            pub fn from_u16(raw: u16) -> Option<Opcode> {
                match raw {
                    $($value => Some(Opcode::$name),)*
                    _ => None,
                }
            }

            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$name => $mnemonic,)*
                }
            }
        }
    };
}

opcodes! {
    NOP = 0, "NOP";

    // stack management
    ALLOCA = 1, "ALLOCA";
    DISCARD = 2, "DISCARD";
    LOAD = 3, "LOAD";
    STORE = 4, "STORE";

    // typed constant loads
    ILOAD = 5, "ILOAD";
    NLOAD = 6, "NLOAD";
    SLOAD = 7, "SLOAD";
    PLOAD = 8, "PLOAD";
    CLOAD = 9, "CLOAD";
    RLOAD = 10, "RLOAD";
    ITLOAD = 11, "ITLOAD";
    STLOAD = 12, "STLOAD";
    PTLOAD = 13, "PTLOAD";
    CTLOAD = 14, "CTLOAD";

    // control
    JMP = 15, "JMP";
    JZ = 16, "JZ";
    JN = 17, "JN";
    EXIT = 18, "EXIT";

    // calls
    CALL = 19, "CALL";
    HANDLER = 20, "HANDLER";

    // casts
    N2S = 21, "N2S";
    P2S = 22, "P2S";
    C2S = 23, "C2S";
    R2S = 24, "R2S";
    S2N = 25, "S2N";

    // numeric
    NNEG = 26, "NNEG";
    NNOT = 27, "NNOT";
    NADD = 28, "NADD";
    NSUB = 29, "NSUB";
    NMUL = 30, "NMUL";
    NDIV = 31, "NDIV";
    NREM = 32, "NREM";
    NPOW = 33, "NPOW";
    NAND = 34, "NAND";
    NOR = 35, "NOR";
    NXOR = 36, "NXOR";
    NSHL = 37, "NSHL";
    NSHR = 38, "NSHR";
    NCMPEQ = 39, "NCMPEQ";
    NCMPNE = 40, "NCMPNE";
    NCMPLE = 41, "NCMPLE";
    NCMPGE = 42, "NCMPGE";
    NCMPLT = 43, "NCMPLT";
    NCMPGT = 44, "NCMPGT";

    // boolean
    BNOT = 45, "BNOT";
    BAND = 46, "BAND";
    BOR = 47, "BOR";
    BXOR = 48, "BXOR";

    // string
    SLEN = 49, "SLEN";
    SISEMPTY = 50, "SISEMPTY";
    SADD = 51, "SADD";
    SSUBSTR = 52, "SSUBSTR";
    SCMPEQ = 53, "SCMPEQ";
    SCMPNE = 54, "SCMPNE";
    SCMPLE = 55, "SCMPLE";
    SCMPGE = 56, "SCMPGE";
    SCMPLT = 57, "SCMPLT";
    SCMPGT = 58, "SCMPGT";
    SREGMATCH = 59, "SREGMATCH";
    SCMPBEG = 60, "SCMPBEG";
    SCMPEND = 61, "SCMPEND";
    SCONTAINS = 62, "SCONTAINS";

    // ip address
    PCMPEQ = 63, "PCMPEQ";
    PCMPNE = 64, "PCMPNE";
    PINCIDR = 65, "PINCIDR";

    // match dispatch
    SMATCHEQ = 66, "SMATCHEQ";
    SMATCHBEG = 67, "SMATCHBEG";
    SMATCHEND = 68, "SMATCHEND";
    SMATCHR = 69, "SMATCHR";
}

/// Operand field width.
pub type Operand = u16;

/// One packed instruction word.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Instruction(u64);

impl Instruction {
    pub fn new(opcode: Opcode, a: Operand, b: Operand, c: Operand) -> Self {
        Self(
            (opcode as u64)
                | ((a as u64) << 16)
                | ((b as u64) << 32)
                | ((c as u64) << 48),
        )
    }

    pub fn op0(opcode: Opcode) -> Self {
        Self::new(opcode, 0, 0, 0)
    }

    pub fn op1(opcode: Opcode, a: Operand) -> Self {
        Self::new(opcode, a, 0, 0)
    }

    pub fn op2(opcode: Opcode, a: Operand, b: Operand) -> Self {
        Self::new(opcode, a, b, 0)
    }

    /// Decode the opcode field.
    ///
    /// # Panics
    ///
    /// Panics on an unknown opcode value; instruction words are only ever
    /// produced by the code generator, so this is a corruption check.
    pub fn opcode(self) -> Opcode {
        let raw = (self.0 & 0xFFFF) as u16;
        Opcode::from_u16(raw).unwrap_or_else(|| panic!("corrupt instruction word: {:#018x}", self.0))
    }

    pub fn a(self) -> Operand {
        ((self.0 >> 16) & 0xFFFF) as u16
    }

    pub fn b(self) -> Operand {
        ((self.0 >> 32) & 0xFFFF) as u16
    }

    pub fn c(self) -> Operand {
        ((self.0 >> 48) & 0xFFFF) as u16
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.opcode().mnemonic(),
            self.a(),
            self.b(),
            self.c()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_and_unpack_round_trip() {
        let i = Instruction::new(Opcode::CALL, 7, 3, 1);
        assert_eq!(i.opcode(), Opcode::CALL);
        assert_eq!(i.a(), 7);
        assert_eq!(i.b(), 3);
        assert_eq!(i.c(), 1);
    }

    #[test]
    fn field_extremes() {
        let i = Instruction::new(Opcode::SMATCHR, u16::MAX, 0, u16::MAX);
        assert_eq!(i.a(), u16::MAX);
        assert_eq!(i.b(), 0);
        assert_eq!(i.c(), u16::MAX);
    }

    #[test]
    fn opcode_values_are_stable() {
        assert_eq!(Opcode::from_u16(0), Some(Opcode::NOP));
        assert_eq!(Opcode::from_u16(18), Some(Opcode::EXIT));
        assert_eq!(Opcode::from_u16(1000), None);
    }
}
