//! Statement and expression parser
//!
//! [`compile`] mirrors the interactive compiler: it accepts exactly one
//! top-level statement and answers "incomplete" when the statement could still
//! be continued by more lines.

use super::lexer::{tokenize, Lexed, LogicalLine, Tok, Token};
use std::sync::Arc;

/// Keywords that open an indented block
const COMPOUND_KEYWORDS: &[&str] = &["def", "if", "elif", "else", "while", "for", "class", "try"];

/// Nesting levels one logical line may open: brackets, unary operators and
/// each link of an operator or call chain all count.
#[cfg(not(debug_assertions))]
pub(crate) const MAX_NESTING_DEPTH: u16 = 200;
/// Unoptimised frames are much larger, so debug builds stop earlier
#[cfg(debug_assertions)]
pub(crate) const MAX_NESTING_DEPTH: u16 = 50;

const RESERVED: &[&str] = &[
    "and", "as", "assert", "async", "await", "break", "class", "continue", "def", "del", "elif",
    "else", "except", "finally", "for", "from", "global", "if", "import", "in", "is", "lambda",
    "nonlocal", "not", "or", "pass", "raise", "return", "try", "while", "with", "yield",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl BinOp {
    pub(crate) fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "**",
        }
    }

    fn from_augmented(op: &str) -> Option<Self> {
        Some(match op {
            "+=" => Self::Add,
            "-=" => Self::Sub,
            "*=" => Self::Mul,
            "/=" => Self::Div,
            "//=" => Self::FloorDiv,
            "%=" => Self::Mod,
            "**=" => Self::Pow,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn from_op(op: &str) -> Option<Self> {
        Some(match op {
            "==" => Self::Eq,
            "!=" => Self::Ne,
            "<" => Self::Lt,
            "<=" => Self::Le,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            _ => return None,
        })
    }

    pub(crate) fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    None,
    Name(String),
    List(Vec<Expr>),
    Neg(Box<Expr>),
    Pos(Box<Expr>),
    Not(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Index(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone)]
pub(crate) enum Target {
    Name(String),
    Index(Expr, Expr),
}

#[derive(Debug)]
pub(crate) struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub(crate) struct Stmt {
    pub kind: StmtKind,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub(crate) enum StmtKind {
    Expr(Expr),
    Assign(Vec<Target>, Expr),
    AugAssign(Target, BinOp, Expr),
    Del(Vec<Target>),
    Pass,
    Return(Option<Expr>),
    Raise(Option<Expr>),
    Def(Arc<FunctionDef>),
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        orelse: Vec<Stmt>,
    },
}

#[derive(Debug)]
pub(crate) struct Program {
    pub body: Vec<Stmt>,
}

pub(crate) enum Compiled {
    Program(Program),
    Incomplete,
}

/// Compile-time error with enough context to render Python-style
#[derive(Debug, Clone)]
pub(crate) struct SyntaxError {
    pub kind: &'static str,
    pub message: String,
    pub line: usize,
    pub col: usize,
    pub text: String,
    /// Raised only because the source ran out
    pub at_end: bool,
    /// Raised at the end of a logical line rather than at a token
    pub out_of_tokens: bool,
}

impl SyntaxError {
    pub(crate) fn new(message: &str, line: usize, col: usize, text: &str) -> Self {
        Self {
            kind: "SyntaxError",
            message: message.to_string(),
            line,
            col,
            text: text.to_string(),
            at_end: false,
            out_of_tokens: false,
        }
    }

    fn indentation(message: String, line: usize, text: &str) -> Self {
        Self {
            kind: "IndentationError",
            message,
            line,
            col: 0,
            text: text.to_string(),
            at_end: false,
            out_of_tokens: false,
        }
    }

    pub(crate) fn render(&self, filename: &str) -> String {
        let mut out = format!("  File \"{}\", line {}\n", filename, self.line);
        let stripped = self.text.trim_start();
        if !stripped.is_empty() {
            let offset = self.text.chars().count() - stripped.chars().count();
            out.push_str(&format!("    {}\n", stripped.trim_end()));
            out.push_str(&format!("    {}^\n", " ".repeat(self.col.saturating_sub(offset))));
        }
        out.push_str(&format!("{}: {}\n", self.kind, self.message));
        out
    }
}

type ParseResult<T> = Result<T, SyntaxError>;

/// Compile one interactive statement
pub(crate) fn compile(source: &str) -> ParseResult<Compiled> {
    let lines = match tokenize(source)? {
        Lexed::Lines(lines) => lines,
        Lexed::Incomplete(partial) => {
            // Unfinished brackets still fail early on a token that can never fit
            return match (Parser { lines: &partial, pos: 0 }).parse_program() {
                Err(e) if !e.at_end && !e.out_of_tokens => Err(e),
                _ => Ok(Compiled::Incomplete),
            };
        }
    };

    let has_compound = lines.iter().any(|line| {
        matches!(line.tokens.first().map(|t| &t.tok),
            Some(Tok::Name(name)) if COMPOUND_KEYWORDS.contains(&name.as_str()))
    });
    let ends_with_blank = source
        .rsplit('\n')
        .next()
        .map_or(true, |last| last.trim().is_empty());

    let parsed = Parser { lines: &lines, pos: 0 }.parse_program();

    // A block stays open until an empty line arrives
    if has_compound && !ends_with_blank {
        return match parsed {
            Ok(_) => Ok(Compiled::Incomplete),
            Err(e) if e.at_end => Ok(Compiled::Incomplete),
            Err(e) => Err(e),
        };
    }
    parsed.map(Compiled::Program)
}

struct Parser<'a> {
    lines: &'a [LogicalLine],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn parse_program(&mut self) -> ParseResult<Program> {
        let Some(first) = self.lines.first() else {
            return Ok(Program { body: Vec::new() });
        };
        if first.indent > 0 {
            return Err(SyntaxError::indentation(
                "unexpected indent".to_string(),
                first.line,
                &first.text,
            ));
        }
        let stmt = self.parse_statement(false)?;
        if let Some(extra) = self.lines.get(self.pos) {
            return Err(SyntaxError::new(
                "multiple statements found while compiling a single statement",
                extra.line,
                extra.indent,
                &extra.text,
            ));
        }
        Ok(Program { body: vec![stmt] })
    }

    fn parse_block(&mut self, indent: usize, in_function: bool) -> ParseResult<Vec<Stmt>> {
        let mut body = Vec::new();
        while let Some(line) = self.lines.get(self.pos) {
            if line.indent < indent {
                break;
            }
            if line.indent > indent {
                return Err(SyntaxError::indentation(
                    "unexpected indent".to_string(),
                    line.line,
                    &line.text,
                ));
            }
            body.push(self.parse_statement(in_function)?);
        }
        Ok(body)
    }

    fn parse_statement(&mut self, in_function: bool) -> ParseResult<Stmt> {
        let lines = self.lines;
        let line = &lines[self.pos];
        self.pos += 1;
        let mut cur = Cursor::new(line);

        match cur.peek_name() {
            Some("def") => self.parse_def(cur, line),
            Some("if") => self.parse_if(cur, line, in_function),
            Some("elif") | Some("else") => Err(cur.error_here()),
            _ => {
                let stmt = parse_simple(&mut cur, in_function)?;
                cur.expect_end()?;
                Ok(stmt)
            }
        }
    }

    fn parse_def(&mut self, mut cur: Cursor<'a>, line: &'a LogicalLine) -> ParseResult<Stmt> {
        cur.advance();
        let name = cur.expect_identifier()?;
        cur.expect_op("(")?;
        let mut params: Vec<String> = Vec::new();
        while !cur.eat_op(")") {
            let param_token = cur.peek().cloned();
            let param = cur.expect_identifier()?;
            if params.contains(&param) {
                let col = param_token.map_or(0, |t| t.col);
                return Err(SyntaxError::new(
                    &format!("duplicate argument '{}' in function definition", param),
                    line.line,
                    col,
                    &line.text,
                ));
            }
            params.push(param);
            if !cur.eat_op(",") {
                cur.expect_op(")")?;
                break;
            }
        }
        cur.expect_op(":")?;
        let body = self.parse_body(&mut cur, line, true, "function definition")?;
        Ok(Stmt {
            kind: StmtKind::Def(Arc::new(FunctionDef { name, params, body })),
            line: line.line,
        })
    }

    fn parse_if(
        &mut self,
        mut cur: Cursor<'a>,
        line: &'a LogicalLine,
        in_function: bool,
    ) -> ParseResult<Stmt> {
        let mut branches = Vec::new();
        let mut orelse = Vec::new();

        cur.advance();
        let cond = cur.expr()?;
        cur.expect_op(":")?;
        branches.push((cond, self.parse_body(&mut cur, line, in_function, "'if' statement")?));

        while let Some(next) = self.lines.get(self.pos) {
            if next.indent != line.indent {
                break;
            }
            let mut clause = Cursor::new(next);
            match clause.peek_name() {
                Some("elif") => {
                    self.pos += 1;
                    clause.advance();
                    let cond = clause.expr()?;
                    clause.expect_op(":")?;
                    let body = self.parse_body(&mut clause, next, in_function, "'elif' statement")?;
                    branches.push((cond, body));
                }
                Some("else") => {
                    self.pos += 1;
                    clause.advance();
                    clause.expect_op(":")?;
                    orelse = self.parse_body(&mut clause, next, in_function, "'else' statement")?;
                    break;
                }
                _ => break,
            }
        }

        Ok(Stmt {
            kind: StmtKind::If { branches, orelse },
            line: line.line,
        })
    }

    /// Body after a `:`, either inline or as an indented block
    fn parse_body(
        &mut self,
        cur: &mut Cursor<'a>,
        header: &LogicalLine,
        in_function: bool,
        what: &str,
    ) -> ParseResult<Vec<Stmt>> {
        if !cur.at_end() {
            let stmt = parse_simple(cur, in_function)?;
            cur.expect_end()?;
            return Ok(vec![stmt]);
        }

        let message = format!(
            "expected an indented block after {} on line {}",
            what, header.line
        );
        match self.lines.get(self.pos) {
            Some(next) if next.indent > header.indent => self.parse_block(next.indent, in_function),
            Some(next) => Err(SyntaxError::indentation(message, next.line, &next.text)),
            None => {
                let mut err = SyntaxError::indentation(message, header.line + 1, "");
                err.at_end = true;
                Err(err)
            }
        }
    }
}

fn parse_simple(cur: &mut Cursor<'_>, in_function: bool) -> ParseResult<Stmt> {
    let line = cur.current_line();
    let kind = match cur.peek_name() {
        Some("pass") => {
            cur.advance();
            StmtKind::Pass
        }
        Some("return") => {
            if !in_function {
                return Err(cur.error_with("'return' outside function"));
            }
            cur.advance();
            StmtKind::Return(if cur.at_end() { None } else { Some(cur.expr()?) })
        }
        Some("raise") => {
            cur.advance();
            StmtKind::Raise(if cur.at_end() { None } else { Some(cur.expr()?) })
        }
        Some("del") => {
            cur.advance();
            let mut targets = Vec::new();
            loop {
                let expr = cur.expr()?;
                targets.push(cur.to_target(expr)?);
                if !cur.eat_op(",") {
                    break;
                }
            }
            StmtKind::Del(targets)
        }
        _ => {
            let expr = cur.expr()?;
            if let Some(op) = cur.peek_op().and_then(BinOp::from_augmented) {
                cur.advance();
                let target = cur.to_target(expr)?;
                StmtKind::AugAssign(target, op, cur.expr()?)
            } else if cur.eat_op("=") {
                let mut targets = vec![cur.to_target(expr)?];
                let mut value = cur.expr()?;
                while cur.eat_op("=") {
                    targets.push(cur.to_target(value)?);
                    value = cur.expr()?;
                }
                StmtKind::Assign(targets, value)
            } else {
                StmtKind::Expr(expr)
            }
        }
    };
    Ok(Stmt { kind, line })
}

/// Token cursor over one logical line
struct Cursor<'a> {
    line: &'a LogicalLine,
    pos: usize,
    /// Remaining nesting budget; reaching zero is a syntax error
    depth_remaining: u16,
}

impl<'a> Cursor<'a> {
    fn new(line: &'a LogicalLine) -> Self {
        Self {
            line,
            pos: 0,
            depth_remaining: MAX_NESTING_DEPTH,
        }
    }

    /// Spend one level of the nesting budget
    fn descend(&mut self) -> ParseResult<()> {
        if self.depth_remaining == 0 {
            return Err(self.error_with("too many nested parentheses"));
        }
        self.depth_remaining -= 1;
        Ok(())
    }

    fn ascend(&mut self, levels: u16) {
        self.depth_remaining += levels;
    }

    fn tokens(&self) -> &'a [Token] {
        &self.line.tokens
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens().get(self.pos)
    }

    fn peek_op(&self) -> Option<&'static str> {
        match self.peek().map(|t| &t.tok) {
            Some(Tok::Op(op)) => Some(op),
            _ => None,
        }
    }

    fn peek_name(&self) -> Option<&'a str> {
        match self.peek().map(|t| &t.tok) {
            Some(Tok::Name(name)) => Some(name.as_str()),
            _ => None,
        }
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens().len()
    }

    fn current_line(&self) -> usize {
        self.peek().map_or(self.line.line, |t| t.line)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.peek_op() == Some(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_name(&mut self, name: &str) -> bool {
        if self.peek_name() == Some(name) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> ParseResult<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.error_here())
        }
    }

    fn expect_end(&self) -> ParseResult<()> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.error_here())
        }
    }

    fn expect_identifier(&mut self) -> ParseResult<String> {
        match self.peek_name() {
            Some(name) if !is_reserved(name) => {
                self.pos += 1;
                Ok(name.to_string())
            }
            _ => Err(self.error_here()),
        }
    }

    fn error_here(&self) -> SyntaxError {
        self.error_with("invalid syntax")
    }

    fn error_with(&self, message: &str) -> SyntaxError {
        match self.peek() {
            Some(token) => {
                let text = if token.line == self.line.line {
                    self.line.text.as_str()
                } else {
                    ""
                };
                SyntaxError::new(message, token.line, token.col, text)
            }
            None => {
                let (line, text) = match self.tokens().last() {
                    Some(last) if last.line != self.line.line => (last.line, ""),
                    _ => (self.line.line, self.line.text.as_str()),
                };
                let mut err = SyntaxError::new(message, line, text.trim_end().chars().count(), text);
                err.out_of_tokens = true;
                err
            }
        }
    }

    fn to_target(&self, expr: Expr) -> ParseResult<Target> {
        match expr {
            Expr::Name(name) => Ok(Target::Name(name)),
            Expr::Index(obj, index) => Ok(Target::Index(*obj, *index)),
            _ => Err(self.error_with("cannot assign to expression")),
        }
    }

    fn expr(&mut self) -> ParseResult<Expr> {
        self.descend()?;
        let expr = self.or_expr()?;
        self.ascend(1);
        Ok(expr)
    }

    fn or_expr(&mut self) -> ParseResult<Expr> {
        let mut left = self.and_expr()?;
        let mut levels = 0;
        while self.eat_name("or") {
            self.descend()?;
            levels += 1;
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        self.ascend(levels);
        Ok(left)
    }

    fn and_expr(&mut self) -> ParseResult<Expr> {
        let mut left = self.not_expr()?;
        let mut levels = 0;
        while self.eat_name("and") {
            self.descend()?;
            levels += 1;
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        self.ascend(levels);
        Ok(left)
    }

    fn not_expr(&mut self) -> ParseResult<Expr> {
        if self.eat_name("not") {
            self.descend()?;
            let operand = self.not_expr()?;
            self.ascend(1);
            return Ok(Expr::Not(Box::new(operand)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        let left = self.sum()?;
        let mut rest = Vec::new();
        while let Some(op) = self.peek_op().and_then(CmpOp::from_op) {
            self.advance();
            rest.push((op, self.sum()?));
        }
        if rest.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare(Box::new(left), rest))
        }
    }

    fn sum(&mut self) -> ParseResult<Expr> {
        let mut left = self.term()?;
        let mut levels = 0;
        loop {
            let op = match self.peek_op() {
                Some("+") => BinOp::Add,
                Some("-") => BinOp::Sub,
                _ => break,
            };
            self.advance();
            self.descend()?;
            levels += 1;
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.ascend(levels);
        Ok(left)
    }

    fn term(&mut self) -> ParseResult<Expr> {
        let mut left = self.factor()?;
        let mut levels = 0;
        loop {
            let op = match self.peek_op() {
                Some("*") => BinOp::Mul,
                Some("/") => BinOp::Div,
                Some("//") => BinOp::FloorDiv,
                Some("%") => BinOp::Mod,
                _ => break,
            };
            self.advance();
            self.descend()?;
            levels += 1;
            let right = self.factor()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.ascend(levels);
        Ok(left)
    }

    fn factor(&mut self) -> ParseResult<Expr> {
        let negate = if self.eat_op("-") {
            true
        } else if self.eat_op("+") {
            false
        } else {
            return self.power();
        };
        self.descend()?;
        let operand = Box::new(self.factor()?);
        self.ascend(1);
        Ok(if negate {
            Expr::Neg(operand)
        } else {
            Expr::Pos(operand)
        })
    }

    fn power(&mut self) -> ParseResult<Expr> {
        let base = self.postfix()?;
        if self.eat_op("**") {
            self.descend()?;
            let exponent = self.factor()?;
            self.ascend(1);
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.atom()?;
        let mut levels = 0;
        loop {
            if matches!(self.peek_op(), Some("(") | Some("[")) {
                self.descend()?;
                levels += 1;
            }
            if self.eat_op("(") {
                let (args, kwargs) = self.call_args()?;
                expr = Expr::Call {
                    func: Box::new(expr),
                    args,
                    kwargs,
                };
            } else if self.eat_op("[") {
                let index = self.expr()?;
                self.expect_op("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                self.ascend(levels);
                return Ok(expr);
            }
        }
    }

    fn call_args(&mut self) -> ParseResult<(Vec<Expr>, Vec<(String, Expr)>)> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        while !self.eat_op(")") {
            let is_keyword = matches!(
                (self.peek_name(), self.tokens().get(self.pos + 1).map(|t| &t.tok)),
                (Some(_), Some(Tok::Op("=")))
            );
            if is_keyword {
                let name = self.expect_identifier()?;
                self.advance();
                kwargs.push((name, self.expr()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.error_with("positional argument follows keyword argument"));
                }
                args.push(self.expr()?);
            }
            if !self.eat_op(",") {
                self.expect_op(")")?;
                break;
            }
        }
        Ok((args, kwargs))
    }

    fn atom(&mut self) -> ParseResult<Expr> {
        let Some(token) = self.peek() else {
            return Err(self.error_here());
        };
        let expr = match &token.tok {
            Tok::Int(v) => Expr::Int(*v),
            Tok::Float(v) => Expr::Float(*v),
            Tok::Str(s) => {
                let mut value = s.clone();
                self.advance();
                while let Some(Tok::Str(next)) = self.peek().map(|t| &t.tok) {
                    value.push_str(next);
                    self.advance();
                }
                return Ok(Expr::Str(value));
            }
            Tok::Name(name) => match name.as_str() {
                "True" => Expr::Bool(true),
                "False" => Expr::Bool(false),
                "None" => Expr::None,
                other if is_reserved(other) => return Err(self.error_here()),
                other => Expr::Name(other.to_string()),
            },
            Tok::Op("(") => {
                self.advance();
                let inner = self.expr()?;
                self.expect_op(")")?;
                return Ok(inner);
            }
            Tok::Op("[") => {
                self.advance();
                let mut items = Vec::new();
                while !self.eat_op("]") {
                    items.push(self.expr()?);
                    if !self.eat_op(",") {
                        self.expect_op("]")?;
                        break;
                    }
                }
                return Ok(Expr::List(items));
            }
            Tok::Op(_) => return Err(self.error_here()),
        };
        self.advance();
        Ok(expr)
    }
}

fn is_reserved(name: &str) -> bool {
    RESERVED.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(source: &str) -> Program {
        match compile(source) {
            Ok(Compiled::Program(p)) => p,
            Ok(Compiled::Incomplete) => panic!("incomplete: {source:?}"),
            Err(e) => panic!("syntax error for {source:?}: {e:?}"),
        }
    }

    fn syntax_error(source: &str) -> SyntaxError {
        match compile(source) {
            Err(e) => e,
            Ok(_) => panic!("expected syntax error for {source:?}"),
        }
    }

    #[test]
    fn test_precedence() {
        let p = program("-2 ** 2 + 3 * 4");
        let StmtKind::Expr(Expr::Binary(BinOp::Add, left, right)) = &p.body[0].kind else {
            panic!("unexpected tree {:?}", p.body[0].kind);
        };
        assert!(matches!(**left, Expr::Neg(_)));
        assert!(matches!(**right, Expr::Binary(BinOp::Mul, _, _)));
    }

    #[test]
    fn test_assignment_targets() {
        let p = program("a = b = 1");
        assert!(matches!(&p.body[0].kind, StmtKind::Assign(targets, _) if targets.len() == 2));

        let p = program("xs[0] += 1");
        assert!(matches!(&p.body[0].kind, StmtKind::AugAssign(Target::Index(_, _), BinOp::Add, _)));

        let err = syntax_error("1 = 2");
        assert_eq!(err.message, "cannot assign to expression");
    }

    #[test]
    fn test_keyword_arguments() {
        let p = program("print(1, 2, sep='-', end='')");
        let StmtKind::Expr(Expr::Call { args, kwargs, .. }) = &p.body[0].kind else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 2);
        assert_eq!(kwargs.len(), 2);
    }

    #[test]
    fn test_compound_waits_for_blank_line() {
        assert!(matches!(compile("if x:"), Ok(Compiled::Incomplete)));
        assert!(matches!(compile("if x: y"), Ok(Compiled::Incomplete)));
        assert!(matches!(compile("if x:\n    y\nelse:"), Ok(Compiled::Incomplete)));
        assert!(matches!(compile("if x:\n    y\n"), Ok(Compiled::Program(_))));
    }

    #[test]
    fn test_return_outside_function() {
        let err = syntax_error("return 1");
        assert_eq!(err.message, "'return' outside function");
    }

    #[test]
    fn test_unexpected_indent() {
        let err = syntax_error("  x = 1");
        assert_eq!(err.kind, "IndentationError");
        assert_eq!(err.message, "unexpected indent");
    }

    #[test]
    fn test_deep_nesting_is_a_syntax_error() {
        let depth = MAX_NESTING_DEPTH as usize + 10;
        let source = format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
        let err = syntax_error(&source);
        assert_eq!(err.kind, "SyntaxError");
        assert_eq!(err.message, "too many nested parentheses");

        let err = syntax_error(&format!("{}1", "-".repeat(depth)));
        assert_eq!(err.message, "too many nested parentheses");

        let chain = vec!["1"; depth].join(" + ");
        assert_eq!(syntax_error(&chain).message, "too many nested parentheses");

        let calls = format!("f{}", "()".repeat(depth));
        assert_eq!(syntax_error(&calls).message, "too many nested parentheses");

        // Unclosed brackets past the budget are reported, not waited on
        let open = format!("{}1", "[".repeat(depth));
        assert_eq!(syntax_error(&open).message, "too many nested parentheses");
    }

    #[test]
    fn test_budget_is_returned_between_siblings() {
        let depth = MAX_NESTING_DEPTH as usize / 2;
        let nested = format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
        program(&format!("[{}, {}, {}]", nested, nested, nested));
        program(&format!("a = {} + {}", nested, nested));
    }

    #[test]
    fn test_render_points_at_token() {
        let err = syntax_error("x = = 1");
        assert_eq!(
            err.render("<console>"),
            "  File \"<console>\", line 1\n    x = = 1\n        ^\nSyntaxError: invalid syntax\n"
        );
    }
}
