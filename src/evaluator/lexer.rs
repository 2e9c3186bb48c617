//! Tokenizer producing logical lines
//!
//! Physical lines are joined while brackets are open or a line ends with a
//! backslash. Running out of physical lines in either state means the
//! statement is incomplete, not wrong.

use super::parser::SyntaxError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tok {
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),
    Op(&'static str),
}

#[derive(Debug, Clone)]
pub(crate) struct Token {
    pub tok: Tok,
    /// 1-based physical line
    pub line: usize,
    /// 0-based character column within that line
    pub col: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct LogicalLine {
    /// Line number of the first physical line
    pub line: usize,
    pub indent: usize,
    pub tokens: Vec<Token>,
    /// Text of the first physical line, for error display
    pub text: String,
}

/// Result of splitting source into logical lines
pub(crate) enum Lexed {
    Lines(Vec<LogicalLine>),
    /// Source stopped inside a logical line, which is kept as the last entry
    Incomplete(Vec<LogicalLine>),
}

const OPERATORS: &[&str] = &[
    "**=", "//=", "**", "//", "==", "!=", "<=", ">=", "+=", "-=", "*=", "/=", "%=", "+", "-",
    "*", "/", "%", "<", ">", "=", "(", ")", "[", "]", ",", ":", ".",
];

pub(crate) fn tokenize(source: &str) -> Result<Lexed, SyntaxError> {
    let mut lines = Vec::new();
    let mut pending: Option<LogicalLine> = None;
    let mut depth = 0usize;

    for (idx, raw) in source.split('\n').enumerate() {
        let lineno = idx + 1;
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        let chars: Vec<char> = raw.chars().collect();

        let start = if pending.is_some() {
            0
        } else {
            let trimmed = raw.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            pending = Some(LogicalLine {
                line: lineno,
                indent: indent_width(raw),
                tokens: Vec::new(),
                text: raw.to_string(),
            });
            raw.len() - trimmed.len()
        };
        let start = raw[..start].chars().count();

        let Some(current) = pending.as_mut() else {
            continue;
        };
        let continued = scan_line(&chars, start, lineno, raw, &mut depth, &mut current.tokens)?;
        if depth == 0 && !continued {
            if let Some(done) = pending.take() {
                lines.push(done);
            }
        }
    }

    if let Some(partial) = pending {
        lines.push(partial);
        return Ok(Lexed::Incomplete(lines));
    }
    Ok(Lexed::Lines(lines))
}

fn indent_width(raw: &str) -> usize {
    let mut width = 0;
    for c in raw.chars() {
        match c {
            ' ' => width += 1,
            '\t' => width = (width / 8 + 1) * 8,
            _ => break,
        }
    }
    width
}

/// Scan one physical line; returns whether it ends with a backslash continuation
fn scan_line(
    chars: &[char],
    start: usize,
    lineno: usize,
    raw: &str,
    depth: &mut usize,
    tokens: &mut Vec<Token>,
) -> Result<bool, SyntaxError> {
    let error = |col: usize, message: &str| SyntaxError::new(message, lineno, col, raw);
    let mut i = start;

    while i < chars.len() {
        let c = chars[i];
        let col = i;

        if c == ' ' || c == '\t' {
            i += 1;
            continue;
        }
        if c == '#' {
            break;
        }
        if c == '\\' {
            if chars[i + 1..].iter().all(|c| c.is_whitespace()) {
                return Ok(true);
            }
            return Err(error(col, "unexpected character after line continuation character"));
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) {
            let begin = i;
            let mut is_float = false;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '_') {
                i += 1;
            }
            if i < chars.len() && chars[i] == '.' {
                is_float = true;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    is_float = true;
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            if i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                return Err(error(begin, "invalid decimal literal"));
            }
            let text: String = chars[begin..i].iter().filter(|c| **c != '_').collect();
            let tok = if is_float {
                text.parse::<f64>()
                    .map(Tok::Float)
                    .map_err(|_| error(begin, "invalid decimal literal"))?
            } else {
                match text.parse::<i64>() {
                    Ok(v) => Tok::Int(v),
                    Err(_) => return Err(error(begin, "integer literal too large")),
                }
            };
            tokens.push(Token { tok, line: lineno, col: begin });
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let begin = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let name: String = chars[begin..i].iter().collect();
            tokens.push(Token {
                tok: Tok::Name(name),
                line: lineno,
                col: begin,
            });
            continue;
        }

        if c == '\'' || c == '"' {
            let begin = i;
            let quote = c;
            let mut value = String::new();
            i += 1;
            loop {
                let Some(&ch) = chars.get(i) else {
                    return Err(error(
                        begin,
                        &format!("unterminated string literal (detected at line {})", lineno),
                    ));
                };
                i += 1;
                if ch == quote {
                    break;
                }
                if ch == '\\' {
                    let Some(&escaped) = chars.get(i) else {
                        return Err(error(
                            begin,
                            &format!("unterminated string literal (detected at line {})", lineno),
                        ));
                    };
                    i += 1;
                    match escaped {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '0' => value.push('\0'),
                        '\\' | '\'' | '"' => value.push(escaped),
                        other => {
                            value.push('\\');
                            value.push(other);
                        }
                    }
                } else {
                    value.push(ch);
                }
            }
            tokens.push(Token {
                tok: Tok::Str(value),
                line: lineno,
                col: begin,
            });
            continue;
        }

        let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
        let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(**op)) else {
            return Err(error(col, "invalid syntax"));
        };
        match *op {
            "(" | "[" => *depth += 1,
            ")" | "]" => {
                if *depth == 0 {
                    return Err(error(col, &format!("unmatched '{}'", op)));
                }
                *depth -= 1;
            }
            _ => {}
        }
        tokens.push(Token {
            tok: Tok::Op(op),
            line: lineno,
            col,
        });
        i += op.chars().count();
    }

    Ok(false)
}
