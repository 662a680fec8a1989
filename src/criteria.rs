//! Self-check criteria embedded in assembly source. A comment of the
//! form `;! lhs = rhs` asserts that after the program halts, the
//! register, variable or memory cell on the left holds the value on the
//! right. Front ends and the CLI both use these to grade programs.
use super::*;
use lexer::TokenKind;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
enum Lhs {
    Reg16(registers::Reg16),
    Reg8(registers::Reg8),
    /// a variable, read at its declared width
    Sym(String),
    /// a literal data-segment offset; the comparison width follows the
    /// magnitude of the expected value
    Addr(u16),
}

#[derive(Debug)]
pub struct Criterion {
    pub line: usize,
    lhs_src: String,
    rhs_src: String,
    lhs: Lhs,
    rhs: u16,
}

impl Criterion {
    pub fn parse(line: usize, lhs_src: &str, rhs_src: &str) -> Result<Criterion, Error> {
        let pos = Pos::new(line, 0, lhs_src.len());
        let bad = || asm_err!(crate::ErrorKind::Test, pos, "malformed test criterion \"{} = {}\"", lhs_src, rhs_src);
        let toks = lexer::tokenize_line(lhs_src, line)?;
        let lhs = match toks.as_slice() {
            [t] => match &t.kind {
                TokenKind::Reg16(r) => Lhs::Reg16(*r),
                TokenKind::Reg8(r) => Lhs::Reg8(*r),
                TokenKind::Ident(name) => Lhs::Sym(name.clone()),
                _ => return Err(bad()),
            },
            [open, t, close]
                if open.kind == TokenKind::OpenBracket && close.kind == TokenKind::CloseBracket =>
            {
                match &t.kind {
                    TokenKind::Number(n) => Lhs::Addr(n.u16()),
                    TokenKind::Ident(name) => Lhs::Sym(name.clone()),
                    _ => return Err(bad()),
                }
            }
            _ => return Err(bad()),
        };
        let toks = lexer::tokenize_line(rhs_src, line)?;
        let rhs = match toks.as_slice() {
            [t] => match &t.kind {
                TokenKind::Number(n) => n.u16(),
                _ => return Err(bad()),
            },
            _ => return Err(bad()),
        };
        Ok(Criterion {
            line,
            lhs_src: lhs_src.to_string(),
            rhs_src: rhs_src.to_string(),
            lhs,
            rhs,
        })
    }

    /// Compare the criterion against the machine. Ok means it holds.
    pub fn eval(&self, core: &Core, symbols: &symbols::SymbolTable) -> Result<(), Error> {
        let actual = match &self.lhs {
            Lhs::Reg16(r) => core.reg.get_r16(*r),
            Lhs::Reg8(r) => core.reg.get_r8(*r) as u16,
            Lhs::Sym(name) => match symbols.variable(name) {
                Some(var) => match var.width {
                    Width::Byte => core.mem.read_u8(core.reg.ds, var.offset) as u16,
                    Width::Word => core.mem.read_u16(core.reg.ds, var.offset),
                },
                None => {
                    return Err(Error::new(
                        ErrorKind::Test,
                        Some(Pos::new(self.line, 0, self.lhs_src.len())),
                        format!("test criterion names unknown variable \"{}\"", name).as_str(),
                    ))
                }
            },
            Lhs::Addr(a) => {
                if self.rhs > 0xff {
                    core.mem.read_u16(core.reg.ds, *a)
                } else {
                    core.mem.read_u8(core.reg.ds, *a) as u16
                }
            }
        };
        if actual == self.rhs {
            Ok(())
        } else {
            Err(Error::new(
                ErrorKind::Test,
                Some(Pos::new(self.line, 0, self.lhs_src.len())),
                format!(
                    "{} (0x{:04x}) != {} (0x{:04x})",
                    self.lhs_src, actual, self.rhs_src, self.rhs
                )
                .as_str(),
            ))
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "line {}: {} = {}", self.line, self.lhs_src, self.rhs_src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(src: &str) -> (Core, assembler::Program) {
        let program = assembler::Assembler::new().assemble_str(src).unwrap();
        let mut core = Core::new();
        core.load_program(&program);
        core.run(10_000).unwrap();
        (core, program)
    }

    #[test]
    fn register_criteria() {
        let (core, p) = machine("mov ax, 0x1234\nhlt");
        assert!(Criterion::parse(1, "ax", "0x1234").unwrap().eval(&core, &p.symbols).is_ok());
        assert!(Criterion::parse(1, "al", "0x34").unwrap().eval(&core, &p.symbols).is_ok());
        let e = Criterion::parse(1, "bx", "1").unwrap().eval(&core, &p.symbols).unwrap_err();
        assert_eq!(e.kind, ErrorKind::Test);
        assert!(e.msg.contains("!="));
    }

    #[test]
    fn variable_criteria_use_declared_width() {
        let (core, p) = machine("jmp start\nsmall db 0\nbig dw 0\nstart: mov small, 0xab\nmov w.big, 0xbeef\nhlt");
        assert!(Criterion::parse(1, "small", "0xab").unwrap().eval(&core, &p.symbols).is_ok());
        assert!(Criterion::parse(1, "big", "0xbeef").unwrap().eval(&core, &p.symbols).is_ok());
        assert!(Criterion::parse(1, "[big]", "0xbeef").unwrap().eval(&core, &p.symbols).is_ok());
        let e = Criterion::parse(1, "nosuch", "1").unwrap().eval(&core, &p.symbols).unwrap_err();
        assert!(e.msg.contains("unknown variable"));
    }

    #[test]
    fn literal_address_criteria() {
        let (core, p) = machine("mov b.[0x80], 0x7f\nmov w.[0x90], 0x1234\nhlt");
        assert!(Criterion::parse(1, "[0x80]", "0x7f").unwrap().eval(&core, &p.symbols).is_ok());
        assert!(Criterion::parse(1, "[0x90]", "0x1234").unwrap().eval(&core, &p.symbols).is_ok());
    }

    #[test]
    fn malformed_criteria_are_rejected() {
        assert!(Criterion::parse(1, "ax+1", "5").is_err());
        assert!(Criterion::parse(1, "ax", "bx").is_err());
        assert!(Criterion::parse(1, "[", "5").is_err());
    }
}
