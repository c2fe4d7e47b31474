//! Line parser and indentation block builder
//!
//! Each non-blank line is parsed on its own with the pest grammar, giving
//! either a simple statement or a block header. The block builder then folds
//! the flat line list into nested statements using indentation.

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use std::sync::Arc;

use super::ast::{BinOp, CmpOp, Expr, Handler, Stmt, StmtKind, Target, UnaryOp};
use crate::frontend::SyntaxError;

#[derive(Parser)]
#[grammar = "script/script.pest"]
struct ScriptParser;

/// Keywords that open a block, used to word the missing-colon error
const BLOCK_KEYWORDS: &[&str] = &[
    "if", "elif", "else", "while", "for", "def", "class", "try", "except", "finally",
];

pub type ParseResult<T> = Result<T, SyntaxError>;

/* ===================== Public API ===================== */

/// Parse a whole program into its top-level statements
pub fn parse_program(text: &str) -> ParseResult<Vec<Stmt>> {
    let mut lines = Vec::new();
    for (idx, raw) in text.split('\n').enumerate() {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        let content = raw.trim_start();
        if content.is_empty() || content.starts_with('#') {
            continue;
        }
        let indent = raw.chars().count() - content.chars().count();
        lines.push(parse_line(idx + 1, indent, content)?);
    }

    BlockBuilder::new(lines).program()
}

/* ===================== Lines ===================== */

#[derive(Debug)]
enum Header {
    If(Expr),
    Elif(Expr),
    Else,
    While(Expr),
    For(String, Expr),
    Def(String, Vec<String>),
    Class(String, Vec<Expr>),
    Try,
    Except(Option<String>, Option<String>),
    Finally,
}

impl Header {
    fn keyword(&self) -> &'static str {
        match self {
            Header::If(_) => "if",
            Header::Elif(_) => "elif",
            Header::Else => "else",
            Header::While(_) => "while",
            Header::For(..) => "for",
            Header::Def(..) => "def",
            Header::Class(..) => "class",
            Header::Try => "try",
            Header::Except(..) => "except",
            Header::Finally => "finally",
        }
    }
}

#[derive(Debug)]
enum LineKind {
    Simple(StmtKind),
    Header(Header),
}

#[derive(Debug)]
struct ParsedLine {
    number: usize,
    indent: usize,
    kind: LineKind,
}

/// Location helper bound to one source line
#[derive(Clone, Copy)]
struct LineCtx {
    number: usize,
    indent: usize,
}

impl LineCtx {
    fn error_at(&self, pair: &Pair<Rule>, message: impl Into<String>) -> SyntaxError {
        let (_, col) = pair.as_span().start_pos().line_col();
        SyntaxError::new(self.number, self.indent + col, message)
    }

    fn internal(&self, what: &str) -> SyntaxError {
        SyntaxError::new(self.number, self.indent + 1, format!("malformed {}", what))
    }
}

fn parse_line(number: usize, indent: usize, content: &str) -> ParseResult<ParsedLine> {
    let ctx = LineCtx { number, indent };
    let mut pairs = ScriptParser::parse(Rule::line, content).map_err(|e| convert_error(&ctx, content, e))?;
    let line = pairs.next().ok_or_else(|| ctx.internal("line"))?;
    let stmt = line
        .into_inner()
        .find(|p| p.as_rule() != Rule::EOI)
        .ok_or_else(|| ctx.internal("line"))?;

    let kind = match stmt.as_rule() {
        Rule::if_header
        | Rule::elif_header
        | Rule::else_header
        | Rule::while_header
        | Rule::for_header
        | Rule::def_header
        | Rule::class_header
        | Rule::try_header
        | Rule::except_header
        | Rule::finally_header => LineKind::Header(build_header(&ctx, stmt)?),
        _ => LineKind::Simple(build_simple(&ctx, stmt)?),
    };
    Ok(ParsedLine {
        number,
        indent,
        kind,
    })
}

fn convert_error(ctx: &LineCtx, content: &str, err: pest::error::Error<Rule>) -> SyntaxError {
    let col = match err.line_col {
        pest::error::LineColLocation::Pos((_, col)) => col,
        pest::error::LineColLocation::Span((_, col), _) => col,
    };

    let code = content.split('#').next().unwrap_or(content).trim_end();
    let opens_block = BLOCK_KEYWORDS.iter().any(|kw| {
        code.strip_prefix(kw)
            .is_some_and(|rest| !rest.starts_with(|c: char| c.is_alphanumeric() || c == '_'))
    });
    let message = if opens_block && !code.ends_with(':') {
        "expected ':'"
    } else {
        "invalid syntax"
    };
    SyntaxError::new(ctx.number, ctx.indent + col, message)
}

/* ===================== Statement builders ===================== */

/// Inner pairs with keyword tokens dropped
fn operands(pair: Pair<Rule>) -> Vec<Pair<Rule>> {
    pair.into_inner()
        .filter(|p| {
            !matches!(
                p.as_rule(),
                Rule::kw_if
                    | Rule::kw_elif
                    | Rule::kw_else
                    | Rule::kw_while
                    | Rule::kw_for
                    | Rule::kw_in
                    | Rule::kw_def
                    | Rule::kw_class
                    | Rule::kw_try
                    | Rule::kw_except
                    | Rule::kw_as
                    | Rule::kw_finally
                    | Rule::kw_return
                    | Rule::kw_raise
                    | Rule::kw_global
            )
        })
        .collect()
}

fn build_header(ctx: &LineCtx, pair: Pair<Rule>) -> ParseResult<Header> {
    let rule = pair.as_rule();
    let mut inner = operands(pair).into_iter();

    let header = match rule {
        Rule::if_header => Header::If(build_expr(ctx, next(ctx, &mut inner, "if")?)?),
        Rule::elif_header => Header::Elif(build_expr(ctx, next(ctx, &mut inner, "elif")?)?),
        Rule::else_header => Header::Else,
        Rule::while_header => Header::While(build_expr(ctx, next(ctx, &mut inner, "while")?)?),
        Rule::for_header => {
            let var = next(ctx, &mut inner, "for")?.as_str().to_string();
            let iter = build_expr(ctx, next(ctx, &mut inner, "for")?)?;
            Header::For(var, iter)
        }
        Rule::def_header => {
            let name = next(ctx, &mut inner, "def")?.as_str().to_string();
            let params: Vec<String> = match inner.next() {
                Some(params) => params.into_inner().map(|p| p.as_str().to_string()).collect(),
                None => Vec::new(),
            };
            for (i, param) in params.iter().enumerate() {
                if params[..i].contains(param) {
                    return Err(SyntaxError::new(
                        ctx.number,
                        ctx.indent + 1,
                        format!("duplicate argument '{}' in function definition", param),
                    ));
                }
            }
            Header::Def(name, params)
        }
        Rule::class_header => {
            let name = next(ctx, &mut inner, "class")?.as_str().to_string();
            let bases = inner.map(|p| build_expr(ctx, p)).collect::<ParseResult<_>>()?;
            Header::Class(name, bases)
        }
        Rule::try_header => Header::Try,
        Rule::except_header => {
            let class = inner.next().map(|p| p.as_str().to_string());
            let binding = inner.next().map(|p| p.as_str().to_string());
            Header::Except(class, binding)
        }
        Rule::finally_header => Header::Finally,
        _ => return Err(ctx.internal("block header")),
    };
    Ok(header)
}

fn build_simple(ctx: &LineCtx, pair: Pair<Rule>) -> ParseResult<StmtKind> {
    let rule = pair.as_rule();
    let kind = match rule {
        Rule::pass_stmt => StmtKind::Pass,
        Rule::break_stmt => StmtKind::Break,
        Rule::continue_stmt => StmtKind::Continue,
        Rule::return_stmt => {
            let value = operands(pair).into_iter().next().map(|p| build_expr(ctx, p)).transpose()?;
            StmtKind::Return(value)
        }
        Rule::raise_stmt => {
            let value = operands(pair).into_iter().next().map(|p| build_expr(ctx, p)).transpose()?;
            StmtKind::Raise(value)
        }
        Rule::global_stmt => {
            StmtKind::Global(operands(pair).iter().map(|p| p.as_str().to_string()).collect())
        }
        Rule::assign => {
            let mut inner = pair.into_inner();
            let target = build_target(ctx, next(ctx, &mut inner, "assignment")?)?;
            let value = build_expr(ctx, next(ctx, &mut inner, "assignment")?)?;
            StmtKind::Assign { target, value }
        }
        Rule::aug_assign => {
            let mut inner = pair.into_inner();
            let target = build_target(ctx, next(ctx, &mut inner, "assignment")?)?;
            let op = match next(ctx, &mut inner, "assignment")?.as_str() {
                "+=" => BinOp::Add,
                "-=" => BinOp::Sub,
                "*=" => BinOp::Mul,
                _ => BinOp::Div,
            };
            let value = build_expr(ctx, next(ctx, &mut inner, "assignment")?)?;
            StmtKind::AugAssign { target, op, value }
        }
        Rule::expr_stmt => {
            let mut inner = pair.into_inner();
            StmtKind::Expr(build_expr(ctx, next(ctx, &mut inner, "expression")?)?)
        }
        _ => return Err(ctx.internal("statement")),
    };
    Ok(kind)
}

fn build_target(ctx: &LineCtx, pair: Pair<Rule>) -> ParseResult<Target> {
    let location = pair.clone();
    let mut inner = pair.into_inner();
    let expr = build_expr(ctx, next(ctx, &mut inner, "assignment target")?)?;
    match expr {
        Expr::Name(name) => Ok(Target::Name(name)),
        Expr::Index(object, index) => Ok(Target::Index(*object, *index)),
        Expr::Attr(object, attr) => Ok(Target::Attr(*object, attr)),
        _ => Err(ctx.error_at(&location, "cannot assign to expression")),
    }
}

fn next<'i>(
    ctx: &LineCtx,
    inner: &mut impl Iterator<Item = Pair<'i, Rule>>,
    what: &str,
) -> ParseResult<Pair<'i, Rule>> {
    inner.next().ok_or_else(|| ctx.internal(what))
}

/* ===================== Expression builders ===================== */

fn build_expr(ctx: &LineCtx, pair: Pair<Rule>) -> ParseResult<Expr> {
    match pair.as_rule() {
        Rule::expr | Rule::target => {
            let mut inner = pair.into_inner();
            build_expr(ctx, next(ctx, &mut inner, "expression")?)
        }
        Rule::or_expr | Rule::and_expr => {
            let is_or = pair.as_rule() == Rule::or_expr;
            let mut operands = pair
                .into_inner()
                .filter(|p| !matches!(p.as_rule(), Rule::kw_or | Rule::kw_and));
            let mut expr = build_expr(ctx, next(ctx, &mut operands, "boolean expression")?)?;
            for rhs in operands {
                let rhs = Box::new(build_expr(ctx, rhs)?);
                expr = if is_or {
                    Expr::Or(Box::new(expr), rhs)
                } else {
                    Expr::And(Box::new(expr), rhs)
                };
            }
            Ok(expr)
        }
        Rule::not_expr => {
            let mut inner = pair.into_inner();
            let first = next(ctx, &mut inner, "not")?;
            if first.as_rule() == Rule::kw_not {
                let operand = build_expr(ctx, next(ctx, &mut inner, "not")?)?;
                Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)))
            } else {
                build_expr(ctx, first)
            }
        }
        Rule::comparison => {
            let mut inner = pair.into_inner();
            let lhs = build_expr(ctx, next(ctx, &mut inner, "comparison")?)?;
            let Some(op) = inner.next() else {
                return Ok(lhs);
            };
            let op = match op.as_str() {
                "==" => CmpOp::Eq,
                "!=" => CmpOp::Ne,
                "<" => CmpOp::Lt,
                "<=" => CmpOp::Le,
                ">" => CmpOp::Gt,
                ">=" => CmpOp::Ge,
                _ => CmpOp::In,
            };
            let rhs = build_expr(ctx, next(ctx, &mut inner, "comparison")?)?;
            Ok(Expr::Compare(op, Box::new(lhs), Box::new(rhs)))
        }
        Rule::sum | Rule::term => {
            let mut inner = pair.into_inner();
            let mut expr = build_expr(ctx, next(ctx, &mut inner, "arithmetic")?)?;
            while let Some(op) = inner.next() {
                let op = match op.as_str() {
                    "+" => BinOp::Add,
                    "-" => BinOp::Sub,
                    "*" => BinOp::Mul,
                    "/" => BinOp::Div,
                    "//" => BinOp::FloorDiv,
                    _ => BinOp::Mod,
                };
                let rhs = build_expr(ctx, next(ctx, &mut inner, "arithmetic")?)?;
                expr = Expr::Binary(op, Box::new(expr), Box::new(rhs));
            }
            Ok(expr)
        }
        Rule::unary => {
            let mut inner = pair.into_inner();
            let first = next(ctx, &mut inner, "unary")?;
            if first.as_rule() == Rule::neg_op {
                let operand = build_expr(ctx, next(ctx, &mut inner, "unary")?)?;
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(operand)))
            } else {
                build_expr(ctx, first)
            }
        }
        Rule::power => {
            let mut inner = pair.into_inner();
            let base = build_expr(ctx, next(ctx, &mut inner, "power")?)?;
            match inner.next() {
                Some(exp) => Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(build_expr(ctx, exp)?))),
                None => Ok(base),
            }
        }
        Rule::postfix_expr => {
            let mut inner = pair.into_inner();
            let mut expr = build_expr(ctx, next(ctx, &mut inner, "expression")?)?;
            for suffix in inner {
                expr = match suffix.as_rule() {
                    Rule::call_args => {
                        let args = suffix
                            .into_inner()
                            .map(|p| build_expr(ctx, p))
                            .collect::<ParseResult<_>>()?;
                        Expr::Call(Box::new(expr), args)
                    }
                    Rule::index => {
                        let mut idx = suffix.into_inner();
                        let index = build_expr(ctx, next(ctx, &mut idx, "subscript")?)?;
                        Expr::Index(Box::new(expr), Box::new(index))
                    }
                    Rule::attribute => {
                        let mut attr = suffix.into_inner();
                        let name = next(ctx, &mut attr, "attribute")?.as_str().to_string();
                        Expr::Attr(Box::new(expr), name)
                    }
                    _ => return Err(ctx.internal("expression")),
                };
            }
            Ok(expr)
        }
        Rule::list => {
            let items = pair
                .into_inner()
                .map(|p| build_expr(ctx, p))
                .collect::<ParseResult<_>>()?;
            Ok(Expr::List(items))
        }
        Rule::name => Ok(Expr::Name(pair.as_str().to_string())),
        Rule::kw_true => Ok(Expr::Bool(true)),
        Rule::kw_false => Ok(Expr::Bool(false)),
        Rule::kw_none => Ok(Expr::None),
        Rule::int => pair
            .as_str()
            .parse()
            .map(Expr::Int)
            .map_err(|_| ctx.error_at(&pair, "integer literal is too large")),
        Rule::float => pair
            .as_str()
            .parse()
            .map(Expr::Float)
            .map_err(|_| ctx.error_at(&pair, "invalid float literal")),
        Rule::string => {
            let mut inner = pair.into_inner();
            let chars = next(ctx, &mut inner, "string")?;
            Ok(Expr::Str(unescape(chars.as_str())))
        }
        _ => Err(ctx.error_at(&pair, "invalid syntax")),
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(c @ ('\\' | '\'' | '"')) => out.push(c),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/* ===================== Block builder ===================== */

struct BlockBuilder {
    lines: Vec<ParsedLine>,
    pos: usize,
    /// Indentation of every open block, outermost first
    levels: Vec<usize>,
}

impl BlockBuilder {
    fn new(lines: Vec<ParsedLine>) -> Self {
        Self {
            lines,
            pos: 0,
            levels: Vec::new(),
        }
    }

    fn program(mut self) -> ParseResult<Vec<Stmt>> {
        if let Some(first) = self.lines.first() {
            if first.indent > 0 {
                return Err(SyntaxError::new(first.number, first.indent + 1, "unexpected indent"));
            }
        }
        self.block(0)
    }

    fn peek(&self) -> Option<&ParsedLine> {
        self.lines.get(self.pos)
    }

    /// Statements at exactly `indent`, stopping at the first dedent
    fn block(&mut self, indent: usize) -> ParseResult<Vec<Stmt>> {
        self.levels.push(indent);
        let mut body = Vec::new();

        while let Some(line) = self.peek() {
            if line.indent < indent {
                if !self.levels.contains(&line.indent) {
                    return Err(SyntaxError::new(
                        line.number,
                        line.indent + 1,
                        "unindent does not match any outer indentation level",
                    ));
                }
                break;
            }
            if line.indent > indent {
                return Err(SyntaxError::new(line.number, line.indent + 1, "unexpected indent"));
            }
            body.push(self.statement()?);
        }

        self.levels.pop();
        Ok(body)
    }

    /// Body of a block header at (`number`, `indent`)
    fn suite(&mut self, number: usize, indent: usize, keyword: &str) -> ParseResult<Vec<Stmt>> {
        match self.peek() {
            Some(line) if line.indent > indent => {
                let inner = line.indent;
                self.block(inner)
            }
            Some(line) => Err(SyntaxError::new(
                line.number,
                line.indent + 1,
                format!("expected an indented block after '{}' statement on line {}", keyword, number),
            )),
            None => Err(SyntaxError::new(
                number,
                indent + 1,
                format!("expected an indented block after '{}' statement", keyword),
            )),
        }
    }

    /// Keyword of the next line if it is a header at exactly `indent`
    fn continuation(&self, indent: usize) -> Option<&'static str> {
        match self.peek() {
            Some(ParsedLine {
                indent: i,
                kind: LineKind::Header(h),
                ..
            }) if *i == indent => Some(h.keyword()),
            _ => None,
        }
    }

    /// Consume the next line, which must be a header
    fn take_header(&mut self) -> (usize, Header) {
        let idx = self.pos;
        self.pos += 1;
        let line = &mut self.lines[idx];
        match &mut line.kind {
            LineKind::Header(h) => (line.number, std::mem::replace(h, Header::Else)),
            LineKind::Simple(_) => (line.number, Header::Else),
        }
    }

    fn statement(&mut self) -> ParseResult<Stmt> {
        let idx = self.pos;
        let (number, indent) = (self.lines[idx].number, self.lines[idx].indent);
        if let LineKind::Simple(kind) = &mut self.lines[idx].kind {
            let kind = std::mem::replace(kind, StmtKind::Pass);
            self.pos += 1;
            return Ok(Stmt::new(kind, number));
        }
        let (_, header) = self.take_header();
        let keyword = header.keyword();

        let kind = match header {
            Header::If(test) => {
                let mut branches = vec![(test, self.suite(number, indent, keyword)?)];
                let mut orelse = Vec::new();
                loop {
                    match self.continuation(indent) {
                        Some("elif") => {
                            let (line, header) = self.take_header();
                            let Header::Elif(test) = header else { break };
                            branches.push((test, self.suite(line, indent, "elif")?));
                        }
                        Some("else") => {
                            let (line, _) = self.take_header();
                            orelse = self.suite(line, indent, "else")?;
                            break;
                        }
                        _ => break,
                    }
                }
                StmtKind::If { branches, orelse }
            }
            Header::While(test) => StmtKind::While {
                test,
                body: self.suite(number, indent, keyword)?,
            },
            Header::For(var, iter) => StmtKind::For {
                var,
                iter,
                body: self.suite(number, indent, keyword)?,
            },
            Header::Def(name, params) => StmtKind::Def {
                name,
                params,
                body: Arc::new(self.suite(number, indent, keyword)?),
            },
            Header::Class(name, bases) => StmtKind::Class {
                name,
                bases,
                body: self.suite(number, indent, keyword)?,
            },
            Header::Try => self.try_statement(number, indent)?,
            _ => {
                return Err(SyntaxError::new(
                    number,
                    indent + 1,
                    format!("'{}' without a matching block", keyword),
                ))
            }
        };
        Ok(Stmt::new(kind, number))
    }

    fn try_statement(&mut self, number: usize, indent: usize) -> ParseResult<StmtKind> {
        let body = self.suite(number, indent, "try")?;
        let mut handlers = Vec::new();
        let mut finally = Vec::new();
        let mut has_finally = false;

        while self.continuation(indent) == Some("except") {
            let (line, header) = self.take_header();
            let Header::Except(class, binding) = header else { break };
            let body = self.suite(line, indent, "except")?;
            handlers.push(Handler {
                class,
                binding,
                body,
            });
        }
        if self.continuation(indent) == Some("finally") {
            let (line, _) = self.take_header();
            finally = self.suite(line, indent, "finally")?;
            has_finally = true;
        }

        if handlers.is_empty() && !has_finally {
            let (line, col) = self
                .peek()
                .map_or((number, indent + 1), |l| (l.number, l.indent + 1));
            return Err(SyntaxError::new(line, col, "expected 'except' or 'finally' block"));
        }
        Ok(StmtKind::Try {
            body,
            handlers,
            finally,
        })
    }
}
