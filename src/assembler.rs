//! Building an 8086 program is a three-step process:
//!
//!  1. Pass one walks the statements computing the size of every
//!     instruction and data directive, assigning offsets to labels and
//!     variables along the way. Sizes never depend on symbol values
//!     (displacement and immediate widths derive from literals and
//!     declared variable widths), so one pass suffices.
//!  2. Pass two emits machine code. Every symbolic reference is emitted
//!     as placeholder bytes plus a patch request recording where the
//!     bytes live and how to compute them (absolute word, rel8, rel16).
//!  3. The patch phase resolves every request against the completed
//!     symbol table and rewrites the placeholders in the image.
//!
//! Errors are collected per line rather than short-circuiting, so one
//! bad statement does not hide the rest.
use super::*;
use operand::{AddrExpr, IndexBase, Operand};
use regex::Regex;
use symbols::SymbolTable;
use std::fs;
use std::io;

/// The machine code bytes produced for one source line, with the line's
/// offset within the program image. Lines that emit nothing (blank,
/// comment, label-only) carry an empty byte vector.
#[derive(Debug, Clone)]
pub struct EncodedInstruction {
    pub line: usize,
    pub offset: u16,
    pub bytes: Vec<u8>,
    pub src: String,
}

/// A fully assembled program.
#[derive(Debug)]
pub struct Program {
    pub image: Vec<u8>,
    pub lines: Vec<EncodedInstruction>,
    pub symbols: SymbolTable,
    pub criteria: Vec<criteria::Criterion>,
}

impl Program {
    /// Source line whose encoding starts at the given offset, if any.
    pub fn line_at_offset(&self, offset: u16) -> Option<usize> {
        self.lines
            .iter()
            .find(|l| l.offset == offset && !l.bytes.is_empty())
            .map(|l| l.line)
    }
    pub fn write_listing(&self, w: &mut dyn io::Write) -> Result<(), Error> {
        for l in &self.lines {
            if l.bytes.is_empty() && config::ARGS.code_only {
                continue;
            }
            let hex = l
                .bytes
                .iter()
                .map(|b| format!("{:02x}", b))
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(w, "{:04x}  {:18} {}", l.offset, hex, l.src)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatchKind {
    /// absolute 16-bit offset
    Abs16,
    /// signed 8-bit displacement relative to the next instruction
    Rel8,
    /// signed 16-bit displacement relative to the next instruction
    Rel16,
}

/// A pending symbol reference: `at` is the image index of the
/// placeholder bytes, `next` the offset of the following instruction
/// (the base for relative displacements).
#[derive(Debug)]
struct Patch {
    at: usize,
    name: String,
    kind: PatchKind,
    next: u16,
    pos: Pos,
}

enum Body {
    Empty,
    Instruction {
        desc: &'static instructions::Descriptor,
        operands: Vec<Operand>,
        pos: Pos,
    },
    Data {
        name: String,
        name_pos: Pos,
        width: Width,
        values: Vec<Imm>,
    },
}

struct Statement {
    line: usize,
    src: String,
    label: Option<(String, Pos)>,
    body: Body,
}

/// The container for our assembler methods.
pub struct Assembler {
    // matches a test criterion comment (";! lhs = rhs"), either on its
    // own line or trailing an instruction
    re_criterion: Regex,
}

impl Assembler {
    pub fn new() -> Assembler {
        Assembler {
            re_criterion: Regex::new(r";![ \t]*([^\s=]+)[ \t]*=[ \t]*([^\s]+)[ \t]*.*$").unwrap(),
        }
    }

    /// Attempt to load and assemble a program from a file with the given path.
    pub fn assemble_file(&self, path: &str) -> Result<Program, Vec<Error>> {
        let src = fs::read_to_string(path).map_err(|e| vec![Error::from(e)])?;
        self.assemble_str(&src)
    }

    /// Assemble source text into a Program.
    pub fn assemble_str(&self, src: &str) -> Result<Program, Vec<Error>> {
        let mut errors: Vec<Error> = Vec::new();
        let mut statements: Vec<Statement> = Vec::new();
        let mut criteria: Vec<criteria::Criterion> = Vec::new();

        for (i, raw) in src.lines().enumerate() {
            let line_num = i + 1;
            let empty = |src: &str| Statement {
                line: line_num,
                src: src.to_string(),
                label: None,
                body: Body::Empty,
            };
            if let Some(c) = self.re_criterion.captures(raw) {
                match criteria::Criterion::parse(line_num, &c[1], &c[2]) {
                    Ok(tc) => criteria.push(tc),
                    Err(e) => errors.push(e),
                }
            }
            // the lexer drops the criterion along with the rest of the comment
            match lexer::tokenize_line(raw, line_num).and_then(|t| parse_statement(line_num, raw, &t)) {
                Ok(s) => statements.push(s),
                Err(e) => {
                    errors.push(e);
                    statements.push(empty(raw));
                }
            }
        }

        // pass one: offsets and symbols
        let mut symbols = SymbolTable::default();
        let mut offsets = vec![0u16; statements.len()];
        let mut offset = 0u16;
        for (i, stmt) in statements.iter().enumerate() {
            offsets[i] = offset;
            if let Some((name, pos)) = &stmt.label {
                if let Err(e) = symbols.define_label(name, offset, *pos) {
                    errors.push(e);
                }
            }
            match &stmt.body {
                Body::Empty => {}
                Body::Data {
                    name,
                    name_pos,
                    width,
                    values,
                } => {
                    if let Err(e) = symbols.define_variable(name, offset, *width, *name_pos) {
                        errors.push(e);
                    }
                    offset = offset.wrapping_add(width.bytes() * values.len() as u16);
                }
                Body::Instruction { desc, operands, pos } => {
                    // measure by encoding into a scratch buffer
                    let mut scratch = Vec::new();
                    let mut scratch_patches = Vec::new();
                    match encode_instruction(desc, operands, &symbols, offset, &mut scratch, &mut scratch_patches, *pos)
                    {
                        Ok(()) => offset = offset.wrapping_add(scratch.len() as u16),
                        Err(e) => errors.push(e),
                    }
                }
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        // pass two: emit code and patch requests
        let mut image: Vec<u8> = Vec::new();
        let mut patches: Vec<Patch> = Vec::new();
        let mut ranges: Vec<(usize, usize)> = Vec::new();
        for (i, stmt) in statements.iter().enumerate() {
            let start = image.len();
            match &stmt.body {
                Body::Empty => {}
                Body::Data { width, values, .. } => {
                    for v in values {
                        match width {
                            Width::Byte => image.push(v.lsb()),
                            Width::Word => push_u16(&mut image, v.u16()),
                        }
                    }
                }
                Body::Instruction { desc, operands, pos } => {
                    if let Err(e) =
                        encode_instruction(desc, operands, &symbols, offsets[i], &mut image, &mut patches, *pos)
                    {
                        errors.push(e);
                    }
                }
            }
            ranges.push((start, image.len()));
        }

        // patch phase: resolve every recorded symbol reference
        for p in &patches {
            let target = match symbols.resolve(&p.name) {
                Some(t) => t,
                None => {
                    errors.push(
                        asm_err!(
                            crate::ErrorKind::UndefinedSymbol,
                            p.pos,
                            "undefined symbol \"{}\"",
                            p.name
                        )
                        .with_suggestions(symbols.suggestions()),
                    );
                    continue;
                }
            };
            match p.kind {
                PatchKind::Abs16 => {
                    image[p.at] = target as u8;
                    image[p.at + 1] = (target >> 8) as u8;
                }
                PatchKind::Rel16 => {
                    let delta = target.wrapping_sub(p.next);
                    image[p.at] = delta as u8;
                    image[p.at + 1] = (delta >> 8) as u8;
                }
                PatchKind::Rel8 => match rel8_delta(target, p.next, p.pos) {
                    Ok(b) => image[p.at] = b,
                    Err(e) => errors.push(e),
                },
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        let lines = statements
            .into_iter()
            .zip(ranges)
            .enumerate()
            .map(|(i, (stmt, (start, end)))| EncodedInstruction {
                line: stmt.line,
                offset: offsets[i],
                bytes: image[start..end].to_vec(),
                src: stmt.src,
            })
            .collect();

        Ok(Program {
            image,
            lines,
            symbols,
            criteria,
        })
    }
}

fn parse_statement(line_num: usize, src: &str, tokens: &[lexer::Token]) -> Result<Statement, Error> {
    use lexer::TokenKind;
    let mut label = None;
    let mut toks = tokens;
    if toks.len() >= 2 && toks[1].kind == TokenKind::Colon {
        if let TokenKind::Ident(name) = &toks[0].kind {
            label = Some((name.clone(), toks[0].pos));
            toks = &toks[2..];
        }
    }
    let body = if toks.is_empty() {
        Body::Empty
    } else {
        match &toks[0].kind {
            TokenKind::Mnemonic(name) => {
                let desc = instructions::name_to_descriptor(name)
                    .ok_or_else(|| syntax_err!(toks[0].pos, "invalid operation \"{}\"", name))?;
                Body::Instruction {
                    desc,
                    operands: operand::parse_operands(&toks[1..])?,
                    pos: toks[0].pos,
                }
            }
            TokenKind::Ident(name) => {
                let dir = match toks.get(1).map(|t| &t.kind) {
                    Some(TokenKind::Ident(d)) => d,
                    _ => {
                        return Err(syntax_err!(toks[0].pos, "invalid operation \"{}\"", name)
                            .with_suggestions(instructions::suggestions()))
                    }
                };
                let width = match dir.to_ascii_lowercase().as_str() {
                    "db" => Width::Byte,
                    "dw" => Width::Word,
                    _ => {
                        return Err(asm_err!(
                            crate::ErrorKind::UnknownDirective,
                            toks[1].pos,
                            "unknown directive \"{}\"",
                            dir
                        ))
                    }
                };
                let mut values = Vec::new();
                let mut want_value = true;
                for t in &toks[2..] {
                    match (&t.kind, want_value) {
                        (TokenKind::Number(n), true) => {
                            let v = match width {
                                Width::Byte => n
                                    .narrowed()
                                    .ok_or_else(|| syntax_err!(t.pos, "value {} does not fit in a byte", n))?,
                                Width::Word => n.widened(),
                            };
                            values.push(v);
                            want_value = false;
                        }
                        (TokenKind::Comma, false) => want_value = true,
                        _ => return Err(syntax_err!(t.pos, "malformed data directive")),
                    }
                }
                if values.is_empty() || want_value {
                    return Err(syntax_err!(toks[1].pos, "data directive needs at least one value"));
                }
                Body::Data {
                    name: name.clone(),
                    name_pos: toks[0].pos,
                    width,
                    values,
                }
            }
            _ => return Err(syntax_err!(toks[0].pos, "expected an instruction or data directive")),
        }
    };
    Ok(Statement {
        line: line_num,
        src: src.to_string(),
        label,
        body,
    })
}

fn push_u16(out: &mut Vec<u8>, v: u16) {
    out.push(v as u8);
    out.push((v >> 8) as u8);
}

fn modrm(mode: u8, reg: u8, rm: u8) -> u8 { (mode << 6) | (reg << 3) | rm }

fn rel8_delta(target: u16, next: u16, pos: Pos) -> Result<u8, Error> {
    let delta = target.wrapping_sub(next) as i16;
    if !(-128..=127).contains(&delta) {
        return Err(syntax_err!(
            pos,
            "jump target is out of short range ({} bytes); use JMP",
            delta
        ));
    }
    Ok(delta as u8)
}

/// Intrinsic width of an operand: registers are fixed, memory operands
/// take an explicit qualifier or the declared width of the variable they
/// name, immediates are flexible.
fn op_width(op: &Operand, symbols: &SymbolTable) -> Option<Width> {
    match op {
        Operand::Reg16(_) => Some(Width::Word),
        Operand::Reg8(_) => Some(Width::Byte),
        Operand::Imm(_) => None,
        Operand::Direct { width, addr } => width.or_else(|| match addr {
            AddrExpr::Sym(name) => symbols.variable(name).map(|v| v.width),
            AddrExpr::Literal(_) => None,
        }),
        Operand::Indirect { width, .. } => *width,
    }
}

/// An `AmbiguousWidth` error carrying every register, variable and
/// constant that could pin the width down.
fn ambiguous_width(symbols: &SymbolTable, pos: Pos) -> Error {
    asm_err!(
        crate::ErrorKind::AmbiguousWidth,
        pos,
        "cannot determine operand width; qualify with b. or w."
    )
    .with_suggestions(symbols.operand_suggestions(None))
}

fn resolve_pair_width(dst: &Operand, src: &Operand, symbols: &SymbolTable, pos: Pos) -> Result<Width, Error> {
    let w = match (op_width(dst, symbols), op_width(src, symbols)) {
        (Some(a), Some(b)) if a != b => {
            // suggest source operands of the destination's width
            return Err(asm_err!(
                crate::ErrorKind::UnsupportedCombination,
                pos,
                "operand width mismatch ({} vs {})",
                a,
                b
            )
            .with_suggestions(symbols.operand_suggestions(Some(a))));
        }
        (Some(a), _) => a,
        (None, Some(b)) => b,
        (None, None) => return Err(ambiguous_width(symbols, pos)),
    };
    if w == Width::Byte {
        if let Operand::Imm(Imm::Word(v)) = src {
            return Err(syntax_err!(pos, "value 0x{:04x} does not fit in a byte operand", v)
                .with_suggestions(vec![Suggestion::Constant8(0)]));
        }
    }
    Ok(w)
}

/// Emit the ModRM byte (with the given reg field) and any trailing
/// address bytes for a memory operand.
fn push_mem(reg_field: u8, mem: &Operand, out: &mut Vec<u8>, patches: &mut Vec<Patch>, pos: Pos) {
    match mem {
        Operand::Direct { addr, .. } => {
            out.push(modrm(0b00, reg_field, 0b110));
            match addr {
                AddrExpr::Literal(a) => push_u16(out, *a),
                AddrExpr::Sym(name) => {
                    patches.push(Patch {
                        at: out.len(),
                        name: name.clone(),
                        kind: PatchKind::Abs16,
                        next: 0,
                        pos,
                    });
                    push_u16(out, 0);
                }
            }
        }
        Operand::Indirect { base, disp, .. } => {
            let rm = base.rm();
            // [bp] has no mod-00 encoding; it gets a zero disp8 instead
            if *disp == 0 && *base != IndexBase::Bp {
                out.push(modrm(0b00, reg_field, rm));
            } else if *disp <= 0x7f {
                out.push(modrm(0b01, reg_field, rm));
                out.push(*disp as u8);
            } else {
                out.push(modrm(0b10, reg_field, rm));
                push_u16(out, *disp);
            }
        }
        _ => unreachable!("push_mem requires a memory operand"),
    }
}

fn expect_count(desc: &instructions::Descriptor, ops: &[Operand], n: usize, pos: Pos) -> Result<(), Error> {
    if ops.len() != n {
        return Err(syntax_err!(
            pos,
            "{} expects {} operand(s), found {}",
            desc.name,
            n,
            ops.len()
        ));
    }
    Ok(())
}

fn unsupported(desc: &instructions::Descriptor, ops: &[Operand], symbols: &SymbolTable, pos: Pos) -> Error {
    let list = ops.iter().map(|o| o.to_string()).collect::<Vec<_>>().join(", ");
    asm_err!(
        crate::ErrorKind::UnsupportedCombination,
        pos,
        "unsupported operand combination for {}: {}",
        desc.name,
        list
    )
    .with_suggestions(symbols.operand_suggestions(None))
}

/// Encode one instruction at program offset `base`, appending machine
/// code to `out` and symbol references to `patches`. Called twice per
/// instruction: once against a scratch buffer to size it (pass one) and
/// once for real (pass two); both calls see the same operand and width
/// inputs, so the two encodings always agree in length.
fn encode_instruction(
    desc: &instructions::Descriptor,
    ops: &[Operand],
    symbols: &SymbolTable,
    base: u16,
    out: &mut Vec<u8>,
    patches: &mut Vec<Patch>,
    pos: Pos,
) -> Result<(), Error> {
    use instructions::Family;
    use registers::{Reg16, Reg8};

    // a memory-to-memory pairing is never encodable
    if ops.len() == 2 && ops[0].is_mem() && ops[1].is_mem() {
        return Err(asm_err!(
            crate::ErrorKind::UnsupportedCombination,
            pos,
            "{} cannot take two memory operands",
            desc.name
        ));
    }

    match desc.family {
        Family::Alu { base: op_base, group } => {
            expect_count(desc, ops, 2, pos)?;
            let (dst, src) = (&ops[0], &ops[1]);
            let w = resolve_pair_width(dst, src, symbols, pos)?;
            let wbit = (w == Width::Word) as u8;
            match (dst, src) {
                (Operand::Reg8(d), Operand::Reg8(s)) => {
                    out.push(op_base + 2);
                    out.push(modrm(0b11, d.idx(), s.idx()));
                }
                (Operand::Reg16(d), Operand::Reg16(s)) => {
                    out.push(op_base + 3);
                    out.push(modrm(0b11, d.idx(), s.idx()));
                }
                (Operand::Reg8(d), m) if m.is_mem() => {
                    out.push(op_base + 2);
                    push_mem(d.idx(), m, out, patches, pos);
                }
                (Operand::Reg16(d), m) if m.is_mem() => {
                    out.push(op_base + 3);
                    push_mem(d.idx(), m, out, patches, pos);
                }
                (m, Operand::Reg8(s)) if m.is_mem() => {
                    out.push(op_base);
                    push_mem(s.idx(), m, out, patches, pos);
                }
                (m, Operand::Reg16(s)) if m.is_mem() => {
                    out.push(op_base + 1);
                    push_mem(s.idx(), m, out, patches, pos);
                }
                (Operand::Reg8(Reg8::AL), Operand::Imm(i)) => {
                    out.push(op_base + 4);
                    out.push(i.lsb());
                }
                (Operand::Reg16(Reg16::AX), Operand::Imm(i)) => {
                    out.push(op_base + 5);
                    push_u16(out, i.u16());
                }
                (Operand::Reg8(d), Operand::Imm(i)) => {
                    out.push(0x80);
                    out.push(modrm(0b11, group, d.idx()));
                    out.push(i.lsb());
                }
                (Operand::Reg16(d), Operand::Imm(i)) => {
                    out.push(0x81);
                    out.push(modrm(0b11, group, d.idx()));
                    push_u16(out, i.u16());
                }
                (m, Operand::Imm(i)) if m.is_mem() => {
                    out.push(0x80 + wbit);
                    push_mem(group, m, out, patches, pos);
                    match w {
                        Width::Byte => out.push(i.lsb()),
                        Width::Word => push_u16(out, i.u16()),
                    }
                }
                _ => return Err(unsupported(desc, ops, symbols, pos)),
            }
        }
        Family::Mov => {
            expect_count(desc, ops, 2, pos)?;
            let (dst, src) = (&ops[0], &ops[1]);
            let w = resolve_pair_width(dst, src, symbols, pos)?;
            let wbit = (w == Width::Word) as u8;
            match (dst, src) {
                (Operand::Reg8(d), Operand::Imm(i)) => {
                    out.push(0xb0 + d.idx());
                    out.push(i.lsb());
                }
                (Operand::Reg16(d), Operand::Imm(i)) => {
                    out.push(0xb8 + d.idx());
                    push_u16(out, i.u16());
                }
                (Operand::Reg8(d), Operand::Reg8(s)) => {
                    out.push(0x8a);
                    out.push(modrm(0b11, d.idx(), s.idx()));
                }
                (Operand::Reg16(d), Operand::Reg16(s)) => {
                    out.push(0x8b);
                    out.push(modrm(0b11, d.idx(), s.idx()));
                }
                (Operand::Reg8(d), m) if m.is_mem() => {
                    out.push(0x8a);
                    push_mem(d.idx(), m, out, patches, pos);
                }
                (Operand::Reg16(d), m) if m.is_mem() => {
                    out.push(0x8b);
                    push_mem(d.idx(), m, out, patches, pos);
                }
                (m, Operand::Reg8(s)) if m.is_mem() => {
                    out.push(0x88);
                    push_mem(s.idx(), m, out, patches, pos);
                }
                (m, Operand::Reg16(s)) if m.is_mem() => {
                    out.push(0x89);
                    push_mem(s.idx(), m, out, patches, pos);
                }
                (m, Operand::Imm(i)) if m.is_mem() => {
                    out.push(0xc6 + wbit);
                    push_mem(0, m, out, patches, pos);
                    match w {
                        Width::Byte => out.push(i.lsb()),
                        Width::Word => push_u16(out, i.u16()),
                    }
                }
                _ => return Err(unsupported(desc, ops, symbols, pos)),
            }
        }
        Family::Test => {
            expect_count(desc, ops, 2, pos)?;
            let (dst, src) = (&ops[0], &ops[1]);
            let w = resolve_pair_width(dst, src, symbols, pos)?;
            let wbit = (w == Width::Word) as u8;
            match (dst, src) {
                (Operand::Reg8(Reg8::AL), Operand::Imm(i)) => {
                    out.push(0xa8);
                    out.push(i.lsb());
                }
                (Operand::Reg16(Reg16::AX), Operand::Imm(i)) => {
                    out.push(0xa9);
                    push_u16(out, i.u16());
                }
                (Operand::Reg8(d), Operand::Reg8(s)) => {
                    out.push(0x84);
                    out.push(modrm(0b11, s.idx(), d.idx()));
                }
                (Operand::Reg16(d), Operand::Reg16(s)) => {
                    out.push(0x85);
                    out.push(modrm(0b11, s.idx(), d.idx()));
                }
                // TEST is symmetric; either side may be the memory operand
                (m, Operand::Reg8(r)) | (Operand::Reg8(r), m) if m.is_mem() => {
                    out.push(0x84);
                    push_mem(r.idx(), m, out, patches, pos);
                }
                (m, Operand::Reg16(r)) | (Operand::Reg16(r), m) if m.is_mem() => {
                    out.push(0x85);
                    push_mem(r.idx(), m, out, patches, pos);
                }
                (Operand::Reg8(d), Operand::Imm(i)) => {
                    out.push(0xf6);
                    out.push(modrm(0b11, 0, d.idx()));
                    out.push(i.lsb());
                }
                (Operand::Reg16(d), Operand::Imm(i)) => {
                    out.push(0xf7);
                    out.push(modrm(0b11, 0, d.idx()));
                    push_u16(out, i.u16());
                }
                (m, Operand::Imm(i)) if m.is_mem() => {
                    out.push(0xf6 + wbit);
                    push_mem(0, m, out, patches, pos);
                    match w {
                        Width::Byte => out.push(i.lsb()),
                        Width::Word => push_u16(out, i.u16()),
                    }
                }
                _ => return Err(unsupported(desc, ops, symbols, pos)),
            }
        }
        Family::Xchg => {
            expect_count(desc, ops, 2, pos)?;
            let (dst, src) = (&ops[0], &ops[1]);
            resolve_pair_width(dst, src, symbols, pos)?;
            match (dst, src) {
                (Operand::Reg16(Reg16::AX), Operand::Reg16(s)) => out.push(0x90 + s.idx()),
                (Operand::Reg16(d), Operand::Reg16(Reg16::AX)) => out.push(0x90 + d.idx()),
                (Operand::Reg16(d), Operand::Reg16(s)) => {
                    out.push(0x87);
                    out.push(modrm(0b11, d.idx(), s.idx()));
                }
                (Operand::Reg8(d), Operand::Reg8(s)) => {
                    out.push(0x86);
                    out.push(modrm(0b11, d.idx(), s.idx()));
                }
                (m, Operand::Reg8(r)) | (Operand::Reg8(r), m) if m.is_mem() => {
                    out.push(0x86);
                    push_mem(r.idx(), m, out, patches, pos);
                }
                (m, Operand::Reg16(r)) | (Operand::Reg16(r), m) if m.is_mem() => {
                    out.push(0x87);
                    push_mem(r.idx(), m, out, patches, pos);
                }
                _ => return Err(unsupported(desc, ops, symbols, pos)),
            }
        }
        Family::Lea | Family::Les => {
            expect_count(desc, ops, 2, pos)?;
            match (&ops[0], &ops[1]) {
                (Operand::Reg16(d), m) if m.is_mem() => {
                    out.push(if desc.family == Family::Lea { 0x8d } else { 0xc4 });
                    push_mem(d.idx(), m, out, patches, pos);
                }
                _ => return Err(unsupported(desc, ops, symbols, pos)),
            }
        }
        Family::Unary { group } => {
            expect_count(desc, ops, 1, pos)?;
            match &ops[0] {
                Operand::Reg8(r) => {
                    out.push(0xf6);
                    out.push(modrm(0b11, group, r.idx()));
                }
                Operand::Reg16(r) => {
                    out.push(0xf7);
                    out.push(modrm(0b11, group, r.idx()));
                }
                m if m.is_mem() => {
                    let w = op_width(m, symbols).ok_or_else(|| ambiguous_width(symbols, pos))?;
                    out.push(0xf6 + (w == Width::Word) as u8);
                    push_mem(group, m, out, patches, pos);
                }
                _ => return Err(unsupported(desc, ops, symbols, pos)),
            }
        }
        Family::IncDec { short_base, group } => {
            expect_count(desc, ops, 1, pos)?;
            match &ops[0] {
                Operand::Reg16(r) => out.push(short_base + r.idx()),
                Operand::Reg8(r) => {
                    out.push(0xfe);
                    out.push(modrm(0b11, group, r.idx()));
                }
                m if m.is_mem() => {
                    let w = op_width(m, symbols).ok_or_else(|| ambiguous_width(symbols, pos))?;
                    out.push(0xfe + (w == Width::Word) as u8);
                    push_mem(group, m, out, patches, pos);
                }
                _ => return Err(unsupported(desc, ops, symbols, pos)),
            }
        }
        Family::Push | Family::Pop => {
            expect_count(desc, ops, 1, pos)?;
            let is_push = desc.family == Family::Push;
            match &ops[0] {
                Operand::Reg16(r) => out.push(if is_push { 0x50 } else { 0x58 } + r.idx()),
                m if m.is_mem() => {
                    // the stack moves words; an explicit byte qualifier is an error
                    if op_width(m, symbols) == Some(Width::Byte) {
                        return Err(asm_err!(
                            crate::ErrorKind::UnsupportedCombination,
                            pos,
                            "{} requires a word operand",
                            desc.name
                        ));
                    }
                    if is_push {
                        out.push(0xff);
                        push_mem(6, m, out, patches, pos);
                    } else {
                        out.push(0x8f);
                        push_mem(0, m, out, patches, pos);
                    }
                }
                _ => return Err(unsupported(desc, ops, symbols, pos)),
            }
        }
        Family::Jcc(cond) => {
            expect_count(desc, ops, 1, pos)?;
            encode_rel(desc, 0x70 + cond.offset(), PatchKind::Rel8, &ops[0], base, out, patches, pos)?;
        }
        Family::Jcxz => {
            expect_count(desc, ops, 1, pos)?;
            encode_rel(desc, 0xe3, PatchKind::Rel8, &ops[0], base, out, patches, pos)?;
        }
        Family::Loop => {
            expect_count(desc, ops, 1, pos)?;
            encode_rel(desc, 0xe2, PatchKind::Rel8, &ops[0], base, out, patches, pos)?;
        }
        Family::Jmp => {
            expect_count(desc, ops, 1, pos)?;
            encode_rel(desc, 0xe9, PatchKind::Rel16, &ops[0], base, out, patches, pos)?;
        }
        Family::Call => {
            expect_count(desc, ops, 1, pos)?;
            encode_rel(desc, 0xe8, PatchKind::Rel16, &ops[0], base, out, patches, pos)?;
        }
        Family::Ret => {
            expect_count(desc, ops, 0, pos)?;
            out.push(0xc3);
        }
        Family::Int => {
            expect_count(desc, ops, 1, pos)?;
            match &ops[0] {
                Operand::Imm(Imm::Byte(v)) => {
                    out.push(0xcd);
                    out.push(*v);
                }
                Operand::Imm(Imm::Word(_)) => {
                    return Err(syntax_err!(pos, "interrupt vector must fit in a byte"))
                }
                _ => return Err(unsupported(desc, ops, symbols, pos)),
            }
        }
        Family::In => {
            expect_count(desc, ops, 2, pos)?;
            match (&ops[0], &ops[1]) {
                (Operand::Reg8(Reg8::AL), Operand::Imm(Imm::Byte(port))) => {
                    out.push(0xe4);
                    out.push(*port);
                }
                _ => {
                    return Err(asm_err!(
                        crate::ErrorKind::UnsupportedCombination,
                        pos,
                        "IN supports only AL and an immediate port"
                    ))
                }
            }
        }
        Family::Out => {
            expect_count(desc, ops, 2, pos)?;
            match (&ops[0], &ops[1]) {
                (Operand::Imm(Imm::Byte(port)), Operand::Reg8(Reg8::AL)) => {
                    out.push(0xe6);
                    out.push(*port);
                }
                _ => {
                    return Err(asm_err!(
                        crate::ErrorKind::UnsupportedCombination,
                        pos,
                        "OUT supports only an immediate port and AL"
                    ))
                }
            }
        }
        Family::Hlt => {
            expect_count(desc, ops, 0, pos)?;
            out.push(0xf4);
        }
        Family::Nop => {
            expect_count(desc, ops, 0, pos)?;
            out.push(0x90);
        }
    }
    Ok(())
}

/// Emit a relative jump/call: opcode byte plus a rel8 or rel16 field,
/// either computed immediately (literal target) or left to the patch
/// phase (symbolic target).
#[allow(clippy::too_many_arguments)]
fn encode_rel(
    desc: &instructions::Descriptor,
    opcode: u8,
    kind: PatchKind,
    target: &Operand,
    base: u16,
    out: &mut Vec<u8>,
    patches: &mut Vec<Patch>,
    pos: Pos,
) -> Result<(), Error> {
    let size = if kind == PatchKind::Rel8 { 2 } else { 3 };
    let next = base.wrapping_add(size);
    out.push(opcode);
    let literal = match target {
        Operand::Direct {
            addr: AddrExpr::Sym(name),
            ..
        } => {
            patches.push(Patch {
                at: out.len(),
                name: name.clone(),
                kind,
                next,
                pos,
            });
            match kind {
                PatchKind::Rel8 => out.push(0),
                _ => push_u16(out, 0),
            }
            return Ok(());
        }
        Operand::Direct {
            addr: AddrExpr::Literal(a),
            ..
        } => *a,
        Operand::Imm(i) => i.u16(),
        _ => {
            return Err(asm_err!(
                crate::ErrorKind::UnsupportedCombination,
                pos,
                "{} expects a label or offset",
                desc.name
            ))
        }
    };
    match kind {
        PatchKind::Rel8 => out.push(rel8_delta(literal, next, pos)?),
        _ => push_u16(out, literal.wrapping_sub(next)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assemble(src: &str) -> Result<Program, Vec<Error>> { Assembler::new().assemble_str(src) }
    fn image(src: &str) -> Vec<u8> { assemble(src).unwrap().image }
    fn first_error(src: &str) -> Error {
        let mut errors = assemble(src).unwrap_err();
        errors.remove(0)
    }

    #[test]
    fn mov_register_forms() {
        assert_eq!(image("mov ax, cx"), vec![0x8b, 0xc1]);
        assert_eq!(image("mov bl, dh"), vec![0x8a, 0xde]);
        assert_eq!(image("mov ax, 0x1234"), vec![0xb8, 0x34, 0x12]);
        assert_eq!(image("mov al, 5"), vec![0xb0, 0x05]);
        assert_eq!(image("mov di, 0"), vec![0xbf, 0x00, 0x00]);
    }

    #[test]
    fn mov_memory_forms() {
        assert_eq!(image("mov [0x100], ax"), vec![0x89, 0x06, 0x00, 0x01]);
        assert_eq!(image("mov cl, [bx+si]"), vec![0x8a, 0x08]);
        assert_eq!(image("mov [bx+0x20], dx"), vec![0x89, 0x57, 0x20]);
        assert_eq!(image("mov [bx+0x1234], dx"), vec![0x89, 0x97, 0x34, 0x12]);
        // [bp] forces a zero disp8
        assert_eq!(image("mov ax, [bp]"), vec![0x8b, 0x46, 0x00]);
        assert_eq!(image("mov w.[0x80], 0x1234"), vec![0xc7, 0x06, 0x80, 0x00, 0x34, 0x12]);
    }

    #[test]
    fn alu_forms() {
        assert_eq!(image("add ax, bx"), vec![0x03, 0xc3]);
        assert_eq!(image("add al, 1"), vec![0x04, 0x01]);
        assert_eq!(image("add ax, 0x100"), vec![0x05, 0x00, 0x01]);
        assert_eq!(image("or bx, 3"), vec![0x81, 0xcb, 0x03, 0x00]);
        assert_eq!(image("and cl, 0x0f"), vec![0x80, 0xe1, 0x0f]);
        assert_eq!(image("cmp dx, [0x10]"), vec![0x3b, 0x16, 0x10, 0x00]);
        assert_eq!(image("sub b.[bx], 2"), vec![0x80, 0x2f, 0x02]);
        assert_eq!(image("xor si, si"), vec![0x33, 0xf6]);
    }

    #[test]
    fn single_operand_forms() {
        assert_eq!(image("inc ax"), vec![0x40]);
        assert_eq!(image("dec di"), vec![0x4f]);
        assert_eq!(image("inc cl"), vec![0xfe, 0xc1]);
        assert_eq!(image("not ax"), vec![0xf7, 0xd0]);
        assert_eq!(image("neg bl"), vec![0xf6, 0xdb]);
        assert_eq!(image("div bl"), vec![0xf6, 0xf3]);
        assert_eq!(image("mul cx"), vec![0xf7, 0xe1]);
        assert_eq!(image("push dx"), vec![0x52]);
        assert_eq!(image("pop dx"), vec![0x5a]);
        assert_eq!(image("push w.[0x40]"), vec![0xff, 0x36, 0x40, 0x00]);
    }

    #[test]
    fn misc_forms() {
        assert_eq!(image("xchg ax, bx"), vec![0x93]);
        assert_eq!(image("xchg cl, dl"), vec![0x86, 0xca]);
        assert_eq!(image("lea si, [bx+di+4]"), vec![0x8d, 0x71, 0x04]);
        assert_eq!(image("int 0x21"), vec![0xcd, 0x21]);
        assert_eq!(image("in al, 0x60"), vec![0xe4, 0x60]);
        assert_eq!(image("out 0x60, al"), vec![0xe6, 0x60]);
        assert_eq!(image("test al, 1"), vec![0xa8, 0x01]);
        assert_eq!(image("test bx, cx"), vec![0x85, 0xcb]);
        assert_eq!(image("hlt"), vec![0xf4]);
        assert_eq!(image("nop"), vec![0x90]);
        assert_eq!(image("ret"), vec![0xc3]);
    }

    #[test]
    fn forward_jump_is_patched() {
        let img = image("mov ax, 0\njmp done\nmov ax, 1\ndone: hlt");
        assert_eq!(
            img,
            vec![0xb8, 0x00, 0x00, 0xe9, 0x03, 0x00, 0xb8, 0x01, 0x00, 0xf4]
        );
    }

    #[test]
    fn backward_conditional_jump() {
        let img = image("top: dec cx\njnz top\nhlt");
        assert_eq!(img, vec![0x49, 0x75, 0xfd, 0xf4]);
    }

    #[test]
    fn call_and_loop() {
        let img = image("call fn\nhlt\nfn: ret");
        assert_eq!(img, vec![0xe8, 0x01, 0x00, 0xf4, 0xc3]);
        let img = image("top: loop top");
        assert_eq!(img, vec![0xe2, 0xfe]);
        let img = image("top: jcxz out\njmp top\nout: hlt");
        assert_eq!(img, vec![0xe3, 0x03, 0xe9, 0xfb, 0xff, 0xf4]);
    }

    #[test]
    fn data_directives_emit_inline_and_type_variables() {
        let p = assemble("counter db 2\nwide dw 0x1234, 7\nmov counter, 5\nhlt").unwrap();
        assert_eq!(&p.image[..5], &[0x02, 0x34, 0x12, 0x07, 0x00]);
        // byte width inferred from the variable's declaration
        assert_eq!(&p.image[5..], &[0xc6, 0x06, 0x00, 0x00, 0x05, 0xf4]);
        assert_eq!(p.symbols.variable("wide").map(|v| v.offset), Some(1));
    }

    #[test]
    fn variable_reference_from_register_width() {
        // address patched, width taken from AX
        let p = assemble("mov ax, value\nhlt\nvalue dw 0xbeef").unwrap();
        assert_eq!(p.image, vec![0x8b, 0x06, 0x05, 0x00, 0xf4, 0xef, 0xbe]);
    }

    #[test]
    fn error_taxonomy() {
        assert_eq!(first_error("mov [0x100], [0x200]").kind, ErrorKind::UnsupportedCombination);
        assert_eq!(first_error("mov [0x100], 5").kind, ErrorKind::AmbiguousWidth);
        assert_eq!(first_error("mov ax, bl").kind, ErrorKind::UnsupportedCombination);
        assert_eq!(first_error("x: jmp nowhere").kind, ErrorKind::UndefinedSymbol);
        assert_eq!(first_error("foo dq 5").kind, ErrorKind::UnknownDirective);
        assert_eq!(first_error("a db 1\na db 2").kind, ErrorKind::DuplicateSymbol);
        assert_eq!(first_error("mov ax, #5").kind, ErrorKind::Lex);
        assert_eq!(first_error("frob ax, 5").kind, ErrorKind::Syntax);
    }

    #[test]
    fn errors_are_collected_per_line() {
        let errors = assemble("mov [1], [2]\nhlt\nfrob ax\nmov ax, #3").unwrap_err();
        assert_eq!(errors.len(), 3);
        let lines: Vec<usize> = errors.iter().map(|e| e.pos.unwrap().line).collect();
        assert_eq!(lines, vec![3, 4, 1]); // parse errors surface first, then encode errors
    }

    #[test]
    fn undefined_symbol_suggests_known_names() {
        let errors = assemble("total dw 0\nstart: mov ax, totl\nhlt").unwrap_err();
        let e = &errors[0];
        assert_eq!(e.kind, ErrorKind::UndefinedSymbol);
        assert!(e.suggestions.contains(&Suggestion::Variable16("total".to_string())));
        assert!(e.suggestions.contains(&Suggestion::Label("start".to_string())));
    }

    #[test]
    fn operand_errors_carry_completion_hints() {
        // width mismatch: hints match the destination's width
        let e = first_error("wide dw 1\nmov ax, cl");
        assert_eq!(e.kind, ErrorKind::UnsupportedCombination);
        assert!(e.suggestions.contains(&Suggestion::Register16("CX")));
        assert!(e.suggestions.contains(&Suggestion::Variable16("wide".to_string())));
        assert!(e.suggestions.contains(&Suggestion::Constant16(0)));
        assert!(!e.suggestions.contains(&Suggestion::Register8("CL")));

        // ambiguous width: anything could pin the width down
        let e = first_error("mov [0x100], 5");
        assert_eq!(e.kind, ErrorKind::AmbiguousWidth);
        assert!(e.suggestions.contains(&Suggestion::Register16("AX")));
        assert!(e.suggestions.contains(&Suggestion::Register8("AL")));
        assert!(e.suggestions.contains(&Suggestion::Constant8(0)));

        // unencodable pairing
        let e = first_error("lea si, ax");
        assert_eq!(e.kind, ErrorKind::UnsupportedCombination);
        assert!(e.suggestions.contains(&Suggestion::Register16("BX")));

        // word literal in a byte slot
        let e = first_error("mov cl, 0x1234");
        assert_eq!(e.kind, ErrorKind::Syntax);
        assert_eq!(e.suggestions, vec![Suggestion::Constant8(0)]);
    }

    #[test]
    fn criteria_are_captured() {
        let p = assemble("mov ax, 3\nhlt\n;! ax = 3\n;! [0x10] = 0x99").unwrap();
        assert_eq!(p.criteria.len(), 2);
    }

    #[test]
    fn criterion_may_trail_an_instruction() {
        let p = assemble("mov ax, 3\nhlt ;! ax = 3\n;! [0x10] = 0").unwrap();
        assert_eq!(p.criteria.len(), 2);
        assert_eq!(p.criteria[0].line, 2);
        assert_eq!(p.image, vec![0xb8, 0x03, 0x00, 0xf4]);
    }

    #[test]
    fn line_map_matches_offsets() {
        let p = assemble("\nmov ax, 1\n\nmov bx, 2\nhlt").unwrap();
        assert_eq!(p.line_at_offset(0), Some(2));
        assert_eq!(p.line_at_offset(3), Some(4));
        assert_eq!(p.line_at_offset(6), Some(5));
        assert_eq!(p.line_at_offset(1), None);
    }

    #[test]
    fn short_jump_out_of_range() {
        let mut src = String::from("start: mov ax, 0\n");
        for _ in 0..60 {
            src.push_str("mov ax, 0\n"); // 3 bytes each
        }
        src.push_str("jz start\n");
        let e = first_error(&src);
        assert_eq!(e.kind, ErrorKind::Syntax);
        assert!(e.msg.contains("short range"));
    }
}
