//! Tokenizer for assembly source lines.
//!
//! Mnemonics and register names are case-insensitive. Numeric literals may
//! be written as `0x1f`, `1fh`, `101b`, `17o` or plain decimal. A `b.` or
//! `w.` prefix token qualifies the width of whatever follows it. Everything
//! from `;` to the end of the line is a comment.
use super::*;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Mnemonic(&'static str),
    Reg16(registers::Reg16),
    Reg8(registers::Reg8),
    Number(Imm),
    Ident(String),
    BytePtr,
    WordPtr,
    Comma,
    Colon,
    Plus,
    OpenBracket,
    CloseBracket,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Pos,
}

fn word_char(c: char) -> bool { c.is_ascii_alphanumeric() || c == '_' || c == '.' }

/// Tokenize a single source line. The line number is only used to build
/// error and token positions.
pub fn tokenize_line(line: &str, line_num: usize) -> Result<Vec<Token>, Error> {
    let bytes = line.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        if c == ';' {
            break;
        }
        let pos = Pos::new(line_num, i, 1);
        let punct = match c {
            ',' => Some(TokenKind::Comma),
            ':' => Some(TokenKind::Colon),
            '+' => Some(TokenKind::Plus),
            '[' => Some(TokenKind::OpenBracket),
            ']' => Some(TokenKind::CloseBracket),
            _ => None,
        };
        if let Some(kind) = punct {
            tokens.push(Token { kind, pos });
            i += 1;
            continue;
        }
        if word_char(c) {
            let start = i;
            while i < bytes.len() && word_char(bytes[i] as char) {
                i += 1;
            }
            let mut word = &line[start..i];
            let mut wstart = start;
            // a "b." or "w." prefix is a width qualifier for what follows
            if word.len() >= 2 && word.as_bytes()[1] == b'.' {
                let q = word.as_bytes()[0].to_ascii_lowercase();
                if q == b'b' || q == b'w' {
                    tokens.push(Token {
                        kind: if q == b'b' { TokenKind::BytePtr } else { TokenKind::WordPtr },
                        pos: Pos::new(line_num, wstart, 2),
                    });
                    word = &word[2..];
                    wstart += 2;
                    if word.is_empty() {
                        continue;
                    }
                }
            }
            let pos = Pos::new(line_num, wstart, word.len());
            tokens.push(Token {
                kind: classify_word(word, pos)?,
                pos,
            });
            continue;
        }
        return Err(lex_err!(pos, "unrecognized character '{}'", c));
    }
    Ok(tokens)
}

fn classify_word(word: &str, pos: Pos) -> Result<TokenKind, Error> {
    if word.as_bytes()[0].is_ascii_digit() {
        return Ok(TokenKind::Number(parse_number(word, pos)?));
    }
    let upper = word.to_ascii_uppercase();
    if let Some(desc) = instructions::name_to_descriptor(upper.as_str()) {
        return Ok(TokenKind::Mnemonic(desc.name));
    }
    if let Some(r) = registers::Reg16::from_str(word) {
        return Ok(TokenKind::Reg16(r));
    }
    if let Some(r) = registers::Reg8::from_str(word) {
        return Ok(TokenKind::Reg8(r));
    }
    Ok(TokenKind::Ident(word.to_string()))
}

fn parse_number(word: &str, pos: Pos) -> Result<Imm, Error> {
    let lower = word.to_ascii_lowercase();
    let (digits, radix) = if let Some(hex) = lower.strip_prefix("0x") {
        (hex, 16)
    } else if let Some(hex) = lower.strip_suffix('h') {
        (hex, 16)
    } else if let Some(bin) = lower.strip_suffix('b') {
        (bin, 2)
    } else if let Some(oct) = lower.strip_suffix('o') {
        (oct, 8)
    } else {
        (lower.as_str(), 10)
    };
    if digits.is_empty() {
        return Err(lex_err!(pos, "malformed numeric literal \"{}\"", word));
    }
    match u32::from_str_radix(digits, radix) {
        Ok(v) if v <= 0xffff => Ok(Imm::from_literal(v as u16)),
        Ok(_) => Err(lex_err!(pos, "numeric literal \"{}\" does not fit in 16 bits", word)),
        Err(_) => Err(lex_err!(pos, "malformed numeric literal \"{}\"", word)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use registers::{Reg16, Reg8};

    fn kinds(line: &str) -> Vec<TokenKind> {
        tokenize_line(line, 1)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn numeric_radices() {
        assert_eq!(kinds("0x1f"), vec![TokenKind::Number(Imm::Byte(0x1f))]);
        assert_eq!(kinds("1fh"), vec![TokenKind::Number(Imm::Byte(0x1f))]);
        assert_eq!(kinds("0ffffh"), vec![TokenKind::Number(Imm::Word(0xffff))]);
        assert_eq!(kinds("101b"), vec![TokenKind::Number(Imm::Byte(5))]);
        assert_eq!(kinds("17o"), vec![TokenKind::Number(Imm::Byte(15))]);
        assert_eq!(kinds("256"), vec![TokenKind::Number(Imm::Word(256))]);
    }

    #[test]
    fn mnemonics_and_registers_ignore_case() {
        assert_eq!(
            kinds("MoV aX, bL"),
            vec![
                TokenKind::Mnemonic("MOV"),
                TokenKind::Reg16(Reg16::AX),
                TokenKind::Comma,
                TokenKind::Reg8(Reg8::BL),
            ]
        );
    }

    #[test]
    fn width_qualifiers() {
        assert_eq!(
            kinds("b.[0x100]"),
            vec![
                TokenKind::BytePtr,
                TokenKind::OpenBracket,
                TokenKind::Number(Imm::Word(0x100)),
                TokenKind::CloseBracket,
            ]
        );
        assert_eq!(
            kinds("w.count"),
            vec![TokenKind::WordPtr, TokenKind::Ident("count".to_string())]
        );
    }

    #[test]
    fn comments_end_the_line() {
        assert_eq!(kinds("hlt ; the rest & is ignored !"), vec![TokenKind::Mnemonic("HLT")]);
        assert!(kinds("   ; whole-line comment").is_empty());
    }

    #[test]
    fn label_definition_shape() {
        assert_eq!(
            kinds("loop_top:"),
            vec![TokenKind::Ident("loop_top".to_string()), TokenKind::Colon]
        );
    }

    #[test]
    fn bad_characters_carry_positions() {
        let e = tokenize_line("mov ax, #5", 3).unwrap_err();
        assert_eq!(e.kind, ErrorKind::Lex);
        assert_eq!(e.pos, Some(Pos::new(3, 8, 1)));
        let e = tokenize_line("mov ax, 0xzz", 1).unwrap_err();
        assert_eq!(e.kind, ErrorKind::Lex);
    }
}
