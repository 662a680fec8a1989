#![allow(dead_code)]
//! A small helper type for values that may be either a byte or a word.
//! The assembler and runtime both deal in mixed 8/16-bit quantities and
//! this keeps the width attached to the value.
use std::fmt;

/// Operand width: one byte or one word.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Width {
    Byte,
    Word,
}
impl Width {
    pub fn bytes(self) -> u16 {
        match self {
            Width::Byte => 1,
            Width::Word => 2,
        }
    }
}
impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Width::Byte => write!(f, "byte"),
            Width::Word => write!(f, "word"),
        }
    }
}

/// An immediate value together with its natural width.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Imm {
    Byte(u8),
    Word(u16),
}

impl Imm {
    /// The natural width of a literal is the smallest width that holds it.
    pub fn from_literal(val: u16) -> Imm {
        if val <= 0xff {
            Imm::Byte(val as u8)
        } else {
            Imm::Word(val)
        }
    }
    pub fn width(self) -> Width {
        match self {
            Imm::Byte(_) => Width::Byte,
            Imm::Word(_) => Width::Word,
        }
    }
    pub fn u16(self) -> u16 {
        match self {
            Imm::Byte(b) => b as u16,
            Imm::Word(w) => w,
        }
    }
    pub fn lsb(self) -> u8 {
        match self {
            Imm::Byte(b) => b,
            Imm::Word(w) => w as u8,
        }
    }
    /// Zero-extend to a word.
    pub fn widened(self) -> Imm { Imm::Word(self.u16()) }
    /// Narrow to a byte if the value fits.
    pub fn narrowed(self) -> Option<Imm> {
        match self {
            Imm::Byte(_) => Some(self),
            Imm::Word(w) if w <= 0xff => Some(Imm::Byte(w as u8)),
            Imm::Word(_) => None,
        }
    }
}

impl fmt::Display for Imm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Imm::Byte(b) => write!(f, "0x{:02x}", b),
            Imm::Word(w) => write!(f, "0x{:04x}", w),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn literal_widths() {
        assert_eq!(Imm::from_literal(0), Imm::Byte(0));
        assert_eq!(Imm::from_literal(0xff), Imm::Byte(0xff));
        assert_eq!(Imm::from_literal(0x100), Imm::Word(0x100));
        assert_eq!(Imm::from_literal(0x1234).lsb(), 0x34);
        assert_eq!(Imm::Word(0x00ff).narrowed(), Some(Imm::Byte(0xff)));
        assert_eq!(Imm::Word(0x0100).narrowed(), None);
    }
}
