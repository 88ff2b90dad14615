//! Tokenizer for the textual IR. Every instruction statement ends in `;`,
//! which is what lets the parser skip over an unrecognized statement
//! without understanding it (used while pre-scanning block headers and
//! function signatures).

use crate::error::TextError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tok {
    Ident(String),
    IntLit { value: i64, width: Option<u32> },
    At,
    Percent,
    Colon,
    Comma,
    Eq,
    Arrow,
    FatArrow,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LAngle,
    RAngle,
    Semi,
}

pub fn lex(text: &str) -> Result<(Vec<Tok>, Vec<usize>), TextError> {
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    let mut line = 1usize;
    let mut toks = Vec::new();
    let mut lines = Vec::new();

    while i < chars.len() {
        let c = chars[i];
        if c == '\n' {
            line += 1;
            i += 1;
            continue;
        }
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }

        let at_line = line;
        match c {
            '@' => {
                toks.push(Tok::At);
                lines.push(at_line);
                i += 1;
            }
            '%' => {
                toks.push(Tok::Percent);
                lines.push(at_line);
                i += 1;
            }
            ':' => {
                toks.push(Tok::Colon);
                lines.push(at_line);
                i += 1;
            }
            ',' => {
                toks.push(Tok::Comma);
                lines.push(at_line);
                i += 1;
            }
            '(' => {
                toks.push(Tok::LParen);
                lines.push(at_line);
                i += 1;
            }
            ')' => {
                toks.push(Tok::RParen);
                lines.push(at_line);
                i += 1;
            }
            '{' => {
                toks.push(Tok::LBrace);
                lines.push(at_line);
                i += 1;
            }
            '}' => {
                toks.push(Tok::RBrace);
                lines.push(at_line);
                i += 1;
            }
            '[' => {
                toks.push(Tok::LBracket);
                lines.push(at_line);
                i += 1;
            }
            ']' => {
                toks.push(Tok::RBracket);
                lines.push(at_line);
                i += 1;
            }
            '<' => {
                toks.push(Tok::LAngle);
                lines.push(at_line);
                i += 1;
            }
            '>' => {
                toks.push(Tok::RAngle);
                lines.push(at_line);
                i += 1;
            }
            ';' => {
                toks.push(Tok::Semi);
                lines.push(at_line);
                i += 1;
            }
            '-' if chars.get(i + 1).map_or(false, |d| d.is_ascii_digit()) => {
                let (value, width, consumed) = lex_number(&chars[i..], at_line)?;
                toks.push(Tok::IntLit { value, width });
                lines.push(at_line);
                i += consumed;
            }
            '-' if chars.get(i + 1) == Some(&'>') => {
                toks.push(Tok::Arrow);
                lines.push(at_line);
                i += 2;
            }
            '=' if chars.get(i + 1) == Some(&'>') => {
                toks.push(Tok::FatArrow);
                lines.push(at_line);
                i += 2;
            }
            '=' => {
                toks.push(Tok::Eq);
                lines.push(at_line);
                i += 1;
            }
            d if d.is_ascii_digit() => {
                let (value, width, consumed) = lex_number(&chars[i..], at_line)?;
                toks.push(Tok::IntLit { value, width });
                lines.push(at_line);
                i += consumed;
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut j = i;
                while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_' || chars[j] == '.') {
                    j += 1;
                }
                let s: String = chars[i..j].iter().collect();
                toks.push(Tok::Ident(s));
                lines.push(at_line);
                i = j;
            }
            other => {
                return Err(TextError::Expected {
                    line,
                    expected: "token".to_string(),
                    found: other.to_string(),
                })
            }
        }
    }

    Ok((toks, lines))
}

fn lex_number(rest: &[char], line: usize) -> Result<(i64, Option<u32>, usize), TextError> {
    let mut j = 0;
    let neg = rest[0] == '-';
    if neg {
        j += 1;
    }
    let digits_start = j;
    while j < rest.len() && rest[j].is_ascii_digit() {
        j += 1;
    }
    if j == digits_start {
        let text: String = rest.iter().take(j + 1).collect();
        return Err(TextError::InvalidInteger { line, text });
    }
    let digits: String = rest[digits_start..j].iter().collect();
    let magnitude: i64 = digits
        .parse()
        .map_err(|_| TextError::InvalidInteger { line, text: digits.clone() })?;
    let value = if neg { -magnitude } else { magnitude };

    let mut width = None;
    if rest.get(j) == Some(&'i') && rest.get(j + 1).map_or(false, |d| d.is_ascii_digit()) {
        let wstart = j + 1;
        let mut k = wstart;
        while k < rest.len() && rest[k].is_ascii_digit() {
            k += 1;
        }
        let wdigits: String = rest[wstart..k].iter().collect();
        width = Some(
            wdigits
                .parse()
                .map_err(|_| TextError::InvalidInteger { line, text: wdigits.clone() })?,
        );
        j = k;
    }

    Ok((value, width, j))
}
