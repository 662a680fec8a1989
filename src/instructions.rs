//! The mnemonic table. Each descriptor names an encoding family; the
//! family carries whatever opcode bases or group indices the encoder and
//! runtime need. Conditional jumps get one descriptor per alias, all
//! mapping onto the sixteen 0x70-0x7f conditions.
use super::*;
use lazy_static::lazy_static;
use std::collections::HashMap;

/// The sixteen Jcc conditions, in opcode order (0x70 + offset).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    O = 0,
    No,
    B,
    Ae,
    E,
    Ne,
    Be,
    A,
    S,
    Ns,
    P,
    Np,
    L,
    Ge,
    Le,
    G,
}

impl Cond {
    pub fn offset(self) -> u8 { self as u8 }
    pub fn from_offset(n: u8) -> Cond {
        match n & 0xf {
            0 => Cond::O,
            1 => Cond::No,
            2 => Cond::B,
            3 => Cond::Ae,
            4 => Cond::E,
            5 => Cond::Ne,
            6 => Cond::Be,
            7 => Cond::A,
            8 => Cond::S,
            9 => Cond::Ns,
            10 => Cond::P,
            11 => Cond::Np,
            12 => Cond::L,
            13 => Cond::Ge,
            14 => Cond::Le,
            _ => Cond::G,
        }
    }
    pub fn eval(self, fl: &registers::Flags) -> bool {
        use registers::Flag;
        let cf = fl.is_set(Flag::C);
        let zf = fl.is_set(Flag::Z);
        let sf = fl.is_set(Flag::S);
        let of = fl.is_set(Flag::O);
        let pf = fl.is_set(Flag::P);
        match self {
            Cond::O => of,
            Cond::No => !of,
            Cond::B => cf,
            Cond::Ae => !cf,
            Cond::E => zf,
            Cond::Ne => !zf,
            Cond::Be => cf || zf,
            Cond::A => !cf && !zf,
            Cond::S => sf,
            Cond::Ns => !sf,
            Cond::P => pf,
            Cond::Np => !pf,
            Cond::L => xor!(sf, of),
            Cond::Ge => !xor!(sf, of),
            Cond::Le => zf || xor!(sf, of),
            Cond::G => !zf && !xor!(sf, of),
        }
    }
}

/// Encoding family of a mnemonic, plus the constants the encoder needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// binary ALU ops: base opcode of the +0..+5 matrix and the 0x80/0x81
    /// group index (which is also the runtime dispatch index)
    Alu { base: u8, group: u8 },
    Mov,
    Test,
    Xchg,
    Lea,
    Les,
    /// single-operand 0xF6/0xF7 group member
    Unary { group: u8 },
    /// INC/DEC: 0x40/0x48 short form base and the 0xFE/0xFF group index
    IncDec { short_base: u8, group: u8 },
    Push,
    Pop,
    Jcc(Cond),
    Jcxz,
    Loop,
    Jmp,
    Call,
    Ret,
    Int,
    In,
    Out,
    Hlt,
    Nop,
}

pub struct Descriptor {
    pub name: &'static str,
    pub family: Family,
}

#[rustfmt::skip]
pub static DESCRIPTORS: &[Descriptor] = &[
    Descriptor { name: "ADD",  family: Family::Alu { base: 0x00, group: 0 } },
    Descriptor { name: "OR",   family: Family::Alu { base: 0x08, group: 1 } },
    Descriptor { name: "ADC",  family: Family::Alu { base: 0x10, group: 2 } },
    Descriptor { name: "SBB",  family: Family::Alu { base: 0x18, group: 3 } },
    Descriptor { name: "AND",  family: Family::Alu { base: 0x20, group: 4 } },
    Descriptor { name: "SUB",  family: Family::Alu { base: 0x28, group: 5 } },
    Descriptor { name: "XOR",  family: Family::Alu { base: 0x30, group: 6 } },
    Descriptor { name: "CMP",  family: Family::Alu { base: 0x38, group: 7 } },
    Descriptor { name: "MOV",  family: Family::Mov },
    Descriptor { name: "TEST", family: Family::Test },
    Descriptor { name: "XCHG", family: Family::Xchg },
    Descriptor { name: "LEA",  family: Family::Lea },
    Descriptor { name: "LES",  family: Family::Les },
    Descriptor { name: "NOT",  family: Family::Unary { group: 2 } },
    Descriptor { name: "NEG",  family: Family::Unary { group: 3 } },
    Descriptor { name: "MUL",  family: Family::Unary { group: 4 } },
    Descriptor { name: "IMUL", family: Family::Unary { group: 5 } },
    Descriptor { name: "DIV",  family: Family::Unary { group: 6 } },
    Descriptor { name: "IDIV", family: Family::Unary { group: 7 } },
    Descriptor { name: "INC",  family: Family::IncDec { short_base: 0x40, group: 0 } },
    Descriptor { name: "DEC",  family: Family::IncDec { short_base: 0x48, group: 1 } },
    Descriptor { name: "PUSH", family: Family::Push },
    Descriptor { name: "POP",  family: Family::Pop },
    Descriptor { name: "JO",   family: Family::Jcc(Cond::O) },
    Descriptor { name: "JNO",  family: Family::Jcc(Cond::No) },
    Descriptor { name: "JB",   family: Family::Jcc(Cond::B) },
    Descriptor { name: "JC",   family: Family::Jcc(Cond::B) },
    Descriptor { name: "JNAE", family: Family::Jcc(Cond::B) },
    Descriptor { name: "JAE",  family: Family::Jcc(Cond::Ae) },
    Descriptor { name: "JNB",  family: Family::Jcc(Cond::Ae) },
    Descriptor { name: "JNC",  family: Family::Jcc(Cond::Ae) },
    Descriptor { name: "JE",   family: Family::Jcc(Cond::E) },
    Descriptor { name: "JZ",   family: Family::Jcc(Cond::E) },
    Descriptor { name: "JNE",  family: Family::Jcc(Cond::Ne) },
    Descriptor { name: "JNZ",  family: Family::Jcc(Cond::Ne) },
    Descriptor { name: "JBE",  family: Family::Jcc(Cond::Be) },
    Descriptor { name: "JNA",  family: Family::Jcc(Cond::Be) },
    Descriptor { name: "JA",   family: Family::Jcc(Cond::A) },
    Descriptor { name: "JNBE", family: Family::Jcc(Cond::A) },
    Descriptor { name: "JS",   family: Family::Jcc(Cond::S) },
    Descriptor { name: "JNS",  family: Family::Jcc(Cond::Ns) },
    Descriptor { name: "JP",   family: Family::Jcc(Cond::P) },
    Descriptor { name: "JPE",  family: Family::Jcc(Cond::P) },
    Descriptor { name: "JNP",  family: Family::Jcc(Cond::Np) },
    Descriptor { name: "JPO",  family: Family::Jcc(Cond::Np) },
    Descriptor { name: "JL",   family: Family::Jcc(Cond::L) },
    Descriptor { name: "JNGE", family: Family::Jcc(Cond::L) },
    Descriptor { name: "JGE",  family: Family::Jcc(Cond::Ge) },
    Descriptor { name: "JNL",  family: Family::Jcc(Cond::Ge) },
    Descriptor { name: "JLE",  family: Family::Jcc(Cond::Le) },
    Descriptor { name: "JNG",  family: Family::Jcc(Cond::Le) },
    Descriptor { name: "JG",   family: Family::Jcc(Cond::G) },
    Descriptor { name: "JNLE", family: Family::Jcc(Cond::G) },
    Descriptor { name: "JCXZ", family: Family::Jcxz },
    Descriptor { name: "LOOP", family: Family::Loop },
    Descriptor { name: "JMP",  family: Family::Jmp },
    Descriptor { name: "CALL", family: Family::Call },
    Descriptor { name: "RET",  family: Family::Ret },
    Descriptor { name: "INT",  family: Family::Int },
    Descriptor { name: "IN",   family: Family::In },
    Descriptor { name: "OUT",  family: Family::Out },
    Descriptor { name: "HLT",  family: Family::Hlt },
    Descriptor { name: "NOP",  family: Family::Nop },
];

lazy_static! {
    static ref DESC_BY_NAME: HashMap<&'static str, &'static Descriptor> =
        DESCRIPTORS.iter().map(|d| (d.name, d)).collect();
}

/// Look up a descriptor by (uppercase) mnemonic name.
pub fn name_to_descriptor(name: &str) -> Option<&'static Descriptor> { DESC_BY_NAME.get(name).copied() }

/// Completion hints for "invalid operation" errors: every mnemonic plus
/// the two data directives.
pub fn suggestions() -> Vec<Suggestion> {
    let mut v: Vec<Suggestion> = DESCRIPTORS.iter().map(|d| Suggestion::Instruction(d.name)).collect();
    v.push(Suggestion::Define("db"));
    v.push(Suggestion::Define("dw"));
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use registers::{Flag, Flags};

    #[test]
    fn aliases_share_conditions() {
        let jz = name_to_descriptor("JZ").unwrap();
        let je = name_to_descriptor("JE").unwrap();
        assert_eq!(jz.family, je.family);
        assert_eq!(jz.family, Family::Jcc(Cond::E));
        assert!(name_to_descriptor("JXX").is_none());
    }

    #[test]
    fn signed_conditions() {
        let mut fl = Flags::default();
        // SF=1 OF=0 -> "less"
        fl.set(Flag::S, true);
        assert!(Cond::L.eval(&fl));
        assert!(!Cond::Ge.eval(&fl));
        assert!(Cond::Le.eval(&fl));
        // SF=1 OF=1 -> "greater or equal"
        fl.set(Flag::O, true);
        assert!(!Cond::L.eval(&fl));
        assert!(Cond::Ge.eval(&fl));
        // ZF forces "less or equal" regardless of sign/overflow
        fl.set(Flag::Z, true);
        assert!(Cond::Le.eval(&fl));
        assert!(!Cond::G.eval(&fl));
    }

    #[test]
    fn unsigned_conditions() {
        let mut fl = Flags::default();
        fl.set(Flag::C, true);
        assert!(Cond::B.eval(&fl));
        assert!(Cond::Be.eval(&fl));
        assert!(!Cond::A.eval(&fl));
        fl.set(Flag::C, false);
        fl.set(Flag::Z, true);
        assert!(Cond::Be.eval(&fl));
        assert!(!Cond::A.eval(&fl));
        fl.set(Flag::Z, false);
        assert!(Cond::A.eval(&fl));
    }

    #[test]
    fn offsets_round_trip() {
        for n in 0..16u8 {
            assert_eq!(Cond::from_offset(n).offset(), n);
        }
    }
}
