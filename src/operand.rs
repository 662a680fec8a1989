//! Operand representation and the addressing-mode resolver: turns token
//! runs into the operand forms the encoder knows how to emit.
use super::*;
use lexer::{Token, TokenKind};
use registers::{Reg16, Reg8};
use std::fmt;

/// A direct-address source: either a literal offset or a symbol to be
/// resolved during the patch phase.
#[derive(Debug, Clone, PartialEq)]
pub enum AddrExpr {
    Literal(u16),
    Sym(String),
}

/// The eight legal base/index combinations of the ModRM rm field, in
/// hardware encoding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexBase {
    BxSi,
    BxDi,
    BpSi,
    BpDi,
    Si,
    Di,
    Bp,
    Bx,
}
impl IndexBase {
    pub fn rm(self) -> u8 {
        match self {
            IndexBase::BxSi => 0,
            IndexBase::BxDi => 1,
            IndexBase::BpSi => 2,
            IndexBase::BpDi => 3,
            IndexBase::Si => 4,
            IndexBase::Di => 5,
            IndexBase::Bp => 6,
            IndexBase::Bx => 7,
        }
    }
    pub fn to_str(self) -> &'static str {
        match self {
            IndexBase::BxSi => "bx+si",
            IndexBase::BxDi => "bx+di",
            IndexBase::BpSi => "bp+si",
            IndexBase::BpDi => "bp+di",
            IndexBase::Si => "si",
            IndexBase::Di => "di",
            IndexBase::Bp => "bp",
            IndexBase::Bx => "bx",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Reg16(Reg16),
    Reg8(Reg8),
    Imm(Imm),
    Direct { addr: AddrExpr, width: Option<Width> },
    Indirect { base: IndexBase, disp: u16, width: Option<Width> },
}

impl Operand {
    pub fn is_mem(&self) -> bool { matches!(self, Operand::Direct { .. } | Operand::Indirect { .. }) }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Operand::Reg16(r) => write!(f, "{}", r.to_str()),
            Operand::Reg8(r) => write!(f, "{}", r.to_str()),
            Operand::Imm(i) => write!(f, "{}", i),
            Operand::Direct { addr: AddrExpr::Literal(a), .. } => write!(f, "[0x{:04x}]", a),
            Operand::Direct { addr: AddrExpr::Sym(s), .. } => write!(f, "{}", s),
            Operand::Indirect { base, disp: 0, .. } => write!(f, "[{}]", base.to_str()),
            Operand::Indirect { base, disp, .. } => write!(f, "[{}+0x{:x}]", base.to_str(), disp),
        }
    }
}

/// Parse a comma-separated operand list.
pub fn parse_operands(tokens: &[Token]) -> Result<Vec<Operand>, Error> {
    let mut out = Vec::new();
    if tokens.is_empty() {
        return Ok(out);
    }
    let mut start = 0usize;
    for i in 0..=tokens.len() {
        if i < tokens.len() && tokens[i].kind != TokenKind::Comma {
            continue;
        }
        if start == i {
            let pos = tokens[if i < tokens.len() { i } else { i - 1 }].pos;
            return Err(syntax_err!(pos, "empty operand"));
        }
        out.push(parse_one(&tokens[start..i])?);
        start = i + 1;
    }
    Ok(out)
}

fn parse_one(tokens: &[Token]) -> Result<Operand, Error> {
    let (qual, rest) = match tokens[0].kind {
        TokenKind::BytePtr => (Some(Width::Byte), &tokens[1..]),
        TokenKind::WordPtr => (Some(Width::Word), &tokens[1..]),
        _ => (None, tokens),
    };
    if rest.is_empty() {
        return Err(syntax_err!(tokens[0].pos, "dangling width qualifier"));
    }
    match &rest[0].kind {
        TokenKind::Reg16(_) | TokenKind::Reg8(_) if qual.is_some() => {
            Err(syntax_err!(rest[0].pos, "width qualifiers are not allowed on registers"))
        }
        TokenKind::Reg16(r) if rest.len() == 1 => Ok(Operand::Reg16(*r)),
        TokenKind::Reg8(r) if rest.len() == 1 => Ok(Operand::Reg8(*r)),
        TokenKind::Number(n) if rest.len() == 1 => {
            let imm = match qual {
                Some(Width::Byte) => n
                    .narrowed()
                    .ok_or_else(|| syntax_err!(rest[0].pos, "value {} does not fit in a byte", n))?,
                Some(Width::Word) => n.widened(),
                None => *n,
            };
            Ok(Operand::Imm(imm))
        }
        TokenKind::Ident(name) if rest.len() == 1 => Ok(Operand::Direct {
            addr: AddrExpr::Sym(name.clone()),
            width: qual,
        }),
        TokenKind::OpenBracket => parse_bracketed(rest, qual),
        _ => Err(syntax_err!(rest[0].pos, "malformed operand")),
    }
}

fn parse_bracketed(rest: &[Token], qual: Option<Width>) -> Result<Operand, Error> {
    let open = rest[0].pos;
    if rest.len() < 3 || rest[rest.len() - 1].kind != TokenKind::CloseBracket {
        return Err(syntax_err!(open, "unterminated address expression"));
    }
    let inner = &rest[1..rest.len() - 1];
    let mut regs: Vec<Reg16> = Vec::new();
    let mut disp: Option<u16> = None;
    let mut sym: Option<String> = None;
    let mut expect_term = true;
    for t in inner {
        match &t.kind {
            TokenKind::Plus if !expect_term => expect_term = true,
            TokenKind::Reg16(r) if expect_term => {
                regs.push(*r);
                expect_term = false;
            }
            TokenKind::Number(n) if expect_term => {
                if disp.is_some() {
                    return Err(syntax_err!(t.pos, "more than one displacement in address expression"));
                }
                disp = Some(n.u16());
                expect_term = false;
            }
            TokenKind::Ident(name) if expect_term => {
                if sym.is_some() {
                    return Err(syntax_err!(t.pos, "more than one symbol in address expression"));
                }
                sym = Some(name.clone());
                expect_term = false;
            }
            TokenKind::Reg8(r) => {
                return Err(syntax_err!(t.pos, "8-bit register {} cannot be used for addressing", r.to_str()))
            }
            _ => return Err(syntax_err!(t.pos, "malformed address expression")),
        }
    }
    if expect_term {
        return Err(syntax_err!(open, "malformed address expression"));
    }
    if let Some(name) = sym {
        if !regs.is_empty() || disp.is_some() {
            return Err(syntax_err!(
                open,
                "symbols cannot be combined with registers or displacements"
            ));
        }
        return Ok(Operand::Direct {
            addr: AddrExpr::Sym(name),
            width: qual,
        });
    }
    if regs.is_empty() {
        // a lone literal is a direct address; disp is Some here
        return Ok(Operand::Direct {
            addr: AddrExpr::Literal(disp.unwrap_or(0)),
            width: qual,
        });
    }
    let mut base: Option<Reg16> = None;
    let mut index: Option<Reg16> = None;
    for r in regs {
        match r {
            Reg16::BX | Reg16::BP if base.is_none() => base = Some(r),
            Reg16::SI | Reg16::DI if index.is_none() => index = Some(r),
            Reg16::BX | Reg16::BP | Reg16::SI | Reg16::DI => {
                return Err(syntax_err!(open, "invalid base/index register combination"))
            }
            _ => {
                return Err(syntax_err!(
                    open,
                    "register {} cannot be used for addressing",
                    r.to_str()
                ))
            }
        }
    }
    let ib = match (base, index) {
        (Some(Reg16::BX), Some(Reg16::SI)) => IndexBase::BxSi,
        (Some(Reg16::BX), Some(Reg16::DI)) => IndexBase::BxDi,
        (Some(Reg16::BP), Some(Reg16::SI)) => IndexBase::BpSi,
        (Some(Reg16::BP), Some(Reg16::DI)) => IndexBase::BpDi,
        (None, Some(Reg16::SI)) => IndexBase::Si,
        (None, Some(Reg16::DI)) => IndexBase::Di,
        (Some(Reg16::BP), None) => IndexBase::Bp,
        (Some(Reg16::BX), None) => IndexBase::Bx,
        _ => return Err(syntax_err!(open, "invalid base/index register combination")),
    };
    Ok(Operand::Indirect {
        base: ib,
        disp: disp.unwrap_or(0),
        width: qual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(src: &str) -> Result<Vec<Operand>, Error> { parse_operands(&lexer::tokenize_line(src, 1).unwrap()) }

    #[test]
    fn registers_and_immediates() {
        assert_eq!(
            ops("ax, 5").unwrap(),
            vec![Operand::Reg16(Reg16::AX), Operand::Imm(Imm::Byte(5))]
        );
        assert_eq!(
            ops("w.5").unwrap(),
            vec![Operand::Imm(Imm::Word(5))]
        );
    }

    #[test]
    fn direct_and_indirect_addresses() {
        assert_eq!(
            ops("[0x100]").unwrap(),
            vec![Operand::Direct {
                addr: AddrExpr::Literal(0x100),
                width: None
            }]
        );
        assert_eq!(
            ops("b.[bx+si+0x10]").unwrap(),
            vec![Operand::Indirect {
                base: IndexBase::BxSi,
                disp: 0x10,
                width: Some(Width::Byte)
            }]
        );
        assert_eq!(
            ops("[bp]").unwrap(),
            vec![Operand::Indirect {
                base: IndexBase::Bp,
                disp: 0,
                width: None
            }]
        );
        assert_eq!(
            ops("counter").unwrap(),
            vec![Operand::Direct {
                addr: AddrExpr::Sym("counter".to_string()),
                width: None
            }]
        );
    }

    #[test]
    fn rejects_bad_address_expressions() {
        assert!(ops("[al]").is_err());
        assert!(ops("[bx+bp]").is_err());
        assert!(ops("[si+di]").is_err());
        assert!(ops("[sp]").is_err());
        assert!(ops("[bx+").is_err());
        assert!(ops("w.").is_err());
        assert!(ops("b.ax").is_err());
    }
}
