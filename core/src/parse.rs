//! Recursive-descent parser over BlockScript's C-like grammar, built with
//! `nom` + `nom_locate`: a `Parse` trait with a `parse`/`parse_node` split,
//! `VerboseError` for diagnostics, and `context()` calls marking every
//! grammar rule so syntax errors report something a user can act on.
//!
//! A prepass (`preprocess`) strips `#include "path"` (resolved through a
//! host-supplied file-open callback) and expands `#define NAME value`
//! macros before the token grammar ever sees the text.

use crate::{
    ast::{
        ArgDec, ArgList, BinOp, ElseIfTail, ElseTail, EnumDef, Expr, FunDec, Identifier, Literal,
        Node, Program, Stmt, StmtList, StructDef, TreeModifier, TypeExpr, UnOp, VarDec,
    },
    error::{CompileError, SourceErrorWrapper, WithSource},
    strings::{Symbol, StringPool},
    util::{RawSpan, Span},
};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while1},
    character::complete::{
        alpha1, alphanumeric1, char, digit1, multispace0, multispace1, none_of,
    },
    combinator::{all_consuming, cut, map, map_res, opt, recognize, value},
    error::{context, ErrorKind, ParseError, VerboseError, VerboseErrorKind},
    multi::{fold_many0, many0, many0_count, separated_list0},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult, Offset, Slice,
};
use std::collections::HashMap;

type ParseResult<'a, T> = IResult<RawSpan<'a>, T, VerboseError<RawSpan<'a>>>;

/// Strip C-style line (`//`) and block (`/* */`) comments and surrounding
/// whitespace before and after a token.
fn ws(input: RawSpan) -> ParseResult<'_, ()> {
    value(
        (),
        many0_count(alt((
            value((), multispace1),
            value((), tuple((tag("//"), many0(none_of("\r\n"))))),
            value((), tuple((tag("/*"), take_until("*/"), tag("*/")))),
        ))),
    )(input)
}

fn lexeme<'a, O, F>(mut inner: F) -> impl FnMut(RawSpan<'a>) -> ParseResult<'a, O>
where
    F: FnMut(RawSpan<'a>) -> ParseResult<'a, O>,
{
    move |input| {
        let (input, _) = ws(input)?;
        let (input, out) = inner(input)?;
        Ok((input, out))
    }
}

fn sym<'a>(s: &'static str) -> impl FnMut(RawSpan<'a>) -> ParseResult<'a, RawSpan<'a>> {
    lexeme(move |i| tag(s)(i))
}

fn kw<'a>(s: &'static str) -> impl FnMut(RawSpan<'a>) -> ParseResult<'a, RawSpan<'a>> {
    lexeme(move |i| terminated(tag(s), nom::combinator::peek(not_ident_char))(i))
}

fn not_ident_char(input: RawSpan) -> ParseResult<'_, ()> {
    match input.fragment().chars().next() {
        Some(c) if c.is_alphanumeric() || c == '_' => {
            Err(nom::Err::Error(VerboseError::from_error_kind(input, ErrorKind::Not)))
        }
        _ => Ok((input, ())),
    }
}

/// A trait for parsing into AST nodes.
/// Parsing never interns strings itself -- it carries raw `&str` names up
/// through the tree and interns them lazily the first time [`Ident::parse`]
//// is reached, via a [`StringPool`] threaded through a [`ParseCtx`].
trait Parse<'a>: Sized {
    fn parse(ctx: &ParseCtx, input: RawSpan<'a>) -> ParseResult<'a, Self>;

    fn parse_node(ctx: &ParseCtx, input: RawSpan<'a>) -> ParseResult<'a, Node<Self, Span>> {
        let (i, value) = Self::parse(ctx, input)?;
        let index = input.offset(&i);
        let raw_span = input.slice(..index);
        Ok((i, Node(value, Span::from_raw_span(&raw_span))))
    }
}

/// Shared, interior-mutable parsing context: the string pool every
/// identifier gets interned into. A `RefCell` rather than threading
/// `&mut StringPool` through every combinator keeps the parser functions
/// composable with `nom`'s combinators, which require `Fn`/`FnMut` closures
/// that can't easily carry a unique borrow.
pub(crate) struct ParseCtx {
    pool: std::cell::RefCell<StringPool>,
}

impl ParseCtx {
    fn new(pool: StringPool) -> Self {
        ParseCtx {
            pool: std::cell::RefCell::new(pool),
        }
    }

    fn intern(&self, s: &str) -> Symbol {
        self.pool
            .borrow_mut()
            .intern(s)
            .unwrap_or_else(|_| self.pool.borrow_mut().manufacture_temp("overlong"))
    }

    fn into_pool(self) -> StringPool {
        self.pool.into_inner()
    }
}

fn raw_ident(input: RawSpan) -> ParseResult<'_, RawSpan> {
    lexeme(recognize(pair(
        alt((alpha1, recognize(char('_')))),
        many0_count(alt((alphanumeric1, recognize(char('_'))))),
    )))(input)
}

const KEYWORDS: &[&str] = &[
    "return", "if", "else", "while", "struct", "enum", "modifier", "sizeof", "static_array",
];

fn ident(ctx: &ParseCtx, input: RawSpan) -> ParseResult<'_, Symbol> {
    let (i, raw) = raw_ident(input)?;
    let text = *raw.fragment();
    if KEYWORDS.contains(&text) {
        return Err(nom::Err::Error(VerboseError::from_error_kind(input, ErrorKind::Tag)));
    }
    Ok((i, ctx.intern(text)))
}

fn int_literal(input: RawSpan) -> ParseResult<'_, i32> {
    lexeme(map_res(
        recognize(pair(opt(char('-')), digit1)),
        |s: RawSpan| s.fragment().parse::<i32>(),
    ))(input)
}

fn float_literal(input: RawSpan) -> ParseResult<'_, f32> {
    lexeme(map_res(
        recognize(tuple((opt(char('-')), digit1, char('.'), digit1))),
        |s: RawSpan| s.fragment().parse::<f32>(),
    ))(input)
}

fn string_literal(input: RawSpan) -> ParseResult<'_, String> {
    lexeme(delimited(
        char('"'),
        map(many0(none_of("\"")), |cs| cs.into_iter().collect()),
        char('"'),
    ))(input)
}

// ===== Types =====

fn type_expr(ctx: &ParseCtx, input: RawSpan) -> ParseResult<'_, TypeExpr> {
    alt((
        map(
            preceded(
                kw("static_array"),
                cut(delimited(
                    sym("<"),
                    tuple((
                        |i| type_expr(ctx, i),
                        preceded(sym(","), int_literal),
                    )),
                    sym(">"),
                )),
            ),
            |(child, len)| TypeExpr::StaticArray(Box::new(child), len as u32),
        ),
        map(|i| ident(ctx, i), TypeExpr::Named),
    ))(input)
}

fn arg_dec(ctx: &ParseCtx, input: RawSpan) -> ParseResult<'_, ArgDec> {
    map(
        pair(|i| type_expr(ctx, i), |i| ident(ctx, i)),
        |(ty, name)| ArgDec { ty, name },
    )(input)
}

fn arg_list(ctx: &ParseCtx, input: RawSpan) -> ParseResult<'_, ArgList> {
    delimited(
        sym("("),
        separated_list0(sym(","), |i| arg_dec(ctx, i)),
        sym(")"),
    )(input)
}

// ===== Expressions =====
//
// Precedence (low to high):
//   assignment -> or -> and -> equality -> relational -> additive
//     -> multiplicative -> unary -> postfix (`. [ ->`) -> primary

fn expr(ctx: &ParseCtx, input: RawSpan) -> ParseResult<'_, Node<Expr<Span>, Span>> {
    context("expression", |i| assignment(ctx, i))(input)
}

fn assignment(ctx: &ParseCtx, input: RawSpan) -> ParseResult<'_, Node<Expr<Span>, Span>> {
    let start = input;
    let (i, lhs) = or_expr(ctx, input)?;
    let (i, rhs) = opt(preceded(sym("="), |i| assignment(ctx, i)))(i)?;
    Ok(match rhs {
        Some(rhs) => {
            let span = Span::from_raw_span(&start.slice(..start.offset(&i)));
            (i, Node(Expr::Binop(BinOp::Assign, Box::new(lhs), Box::new(rhs)), span))
        }
        None => (i, lhs),
    })
}

macro_rules! left_assoc_level {
    ($name:ident, $next:expr, $( $tok:literal => $op:expr ),+ $(,)?) => {
        fn $name<'a>(ctx: &ParseCtx, input: RawSpan<'a>) -> ParseResult<'a, Node<Expr<Span>, Span>> {
            let start = input;
            let (mut i, mut lhs) = ($next)(ctx, input)?;
            loop {
                let attempt = alt(( $( map(sym($tok), |_| $op) ),+ ))(i);
                match attempt {
                    Ok((next_i, op)) => {
                        let (next_i, rhs) = ($next)(ctx, next_i)?;
                        let span = Span::from_raw_span(&start.slice(..start.offset(&next_i)));
                        lhs = Node(Expr::Binop(op, Box::new(lhs), Box::new(rhs)), span);
                        i = next_i;
                    }
                    Err(_) => break,
                }
            }
            Ok((i, lhs))
        }
    };
}

left_assoc_level!(or_expr, and_expr, "||" => BinOp::Or);
left_assoc_level!(and_expr, equality_expr, "&&" => BinOp::And);
left_assoc_level!(equality_expr, relational_expr, "==" => BinOp::Eq, "!=" => BinOp::Ne);
left_assoc_level!(
    relational_expr, additive_expr,
    "<=" => BinOp::Le, ">=" => BinOp::Ge, "<" => BinOp::Lt, ">" => BinOp::Gt,
);
left_assoc_level!(additive_expr, multiplicative_expr, "+" => BinOp::Add, "-" => BinOp::Sub);
left_assoc_level!(multiplicative_expr, unary_expr, "*" => BinOp::Mul, "/" => BinOp::Div, "%" => BinOp::Mod);

fn unary_expr(ctx: &ParseCtx, input: RawSpan) -> ParseResult<'_, Node<Expr<Span>, Span>> {
    let start = input;
    if let Ok((i, _)) = sym("-")(input) {
        let (i, e) = unary_expr(ctx, i)?;
        let span = Span::from_raw_span(&start.slice(..start.offset(&i)));
        return Ok((i, Node(Expr::Unop(UnOp::Neg, Box::new(e)), span)));
    }
    if let Ok((i, _)) = sym("!")(input) {
        let (i, e) = unary_expr(ctx, i)?;
        let span = Span::from_raw_span(&start.slice(..start.offset(&i)));
        return Ok((i, Node(Expr::Unop(UnOp::Not, Box::new(e)), span)));
    }
    postfix_expr(ctx, input)
}

fn postfix_expr(ctx: &ParseCtx, input: RawSpan) -> ParseResult<'_, Node<Expr<Span>, Span>> {
    let start = input;
    let (mut i, mut node) = primary_expr(ctx, input)?;
    loop {
        if let Ok((field_start, _)) = sym(".")(i) {
            if let Ok((next_i, name)) = ident(ctx, field_start) {
                let field_span =
                    Span::from_raw_span(&field_start.slice(..field_start.offset(&next_i)));
                let field = Node(Expr::Idd(Identifier::unresolved(name)), field_span);
                let span = Span::from_raw_span(&start.slice(..start.offset(&next_i)));
                node = Node(Expr::Binop(BinOp::Access, Box::new(node), Box::new(field)), span);
                i = next_i;
                continue;
            }
        }
        if let Ok((next_i, _)) = sym("->")(i) {
            let (next_i, name) = cut(|i| ident(ctx, i))(next_i)?;
            let (next_i, args) = cut(|i| paren_exp_list(ctx, i))(next_i)?;
            let span = Span::from_raw_span(&start.slice(..start.offset(&next_i)));
            node = Node(
                Expr::MethodCall { receiver: Box::new(node), name, args, resolved: None },
                span,
            );
            i = next_i;
            continue;
        }
        if let Ok((next_i, index)) = delimited(sym("["), |i| expr(ctx, i), sym("]"))(i) {
            let span = Span::from_raw_span(&start.slice(..start.offset(&next_i)));
            node = Node(Expr::Binop(BinOp::Access, Box::new(node), Box::new(index)), span);
            i = next_i;
            continue;
        }
        break;
    }
    Ok((i, node))
}

fn paren_exp_list(ctx: &ParseCtx, input: RawSpan) -> ParseResult<'_, Vec<Node<Expr<Span>, Span>>> {
    delimited(
        sym("("),
        separated_list0(sym(","), |i| expr(ctx, i)),
        sym(")"),
    )(input)
}

fn primary_expr(ctx: &ParseCtx, input: RawSpan) -> ParseResult<'_, Node<Expr<Span>, Span>> {
    context(
        "primary expression",
        alt((
            |i| <Expr<Span> as Parse>::parse_node(ctx, i),
            delimited(sym("("), |i| expr(ctx, i), sym(")")),
        )),
    )(input)
}

impl<'a> Parse<'a> for Expr<Span> {
    fn parse(ctx: &ParseCtx, input: RawSpan<'a>) -> ParseResult<'a, Self> {
        alt((
            map(
                preceded(kw("sizeof"), cut(delimited(sym("("), |i| type_expr(ctx, i), sym(")")))),
                Expr::Sizeof,
            ),
            map(float_literal, |f| Expr::Imm(Literal::Float(f))),
            map(int_literal, |v| Expr::Imm(Literal::Int(v))),
            map(string_literal, Expr::StrImm),
            map(
                pair(|i| ident(ctx, i), |i| paren_exp_list(ctx, i)),
                |(name, args)| Expr::FunCall { name, args, resolved: None },
            ),
            map(|i| ident(ctx, i), |name| Expr::Idd(Identifier::unresolved(name))),
        ))(input)
    }
}

// ===== Statements =====

fn block(ctx: &ParseCtx, input: RawSpan) -> ParseResult<'_, StmtList<Span>> {
    delimited(sym("{"), |i| stmt_list(ctx, i), sym("}"))(input)
}

fn stmt_list(ctx: &ParseCtx, input: RawSpan) -> ParseResult<'_, StmtList<Span>> {
    many0(|i| <Stmt<Span> as Parse>::parse_node(ctx, i))(input)
}

fn else_tail(ctx: &ParseCtx, input: RawSpan) -> ParseResult<'_, ElseTail<Span>> {
    let (i, else_ifs) = many0(preceded(
        pair(kw("else"), kw("if")),
        map(
            pair(delimited(sym("("), |i| expr(ctx, i), sym(")")), |i| block(ctx, i)),
            |(cond, body)| ElseIfTail { cond, body },
        ),
    ))(input)?;
    let (i, else_body) = opt(preceded(kw("else"), |i| block(ctx, i)))(i)?;
    Ok((i, ElseTail { else_ifs, else_body }))
}

impl<'a> Parse<'a> for Stmt<Span> {
    fn parse(ctx: &ParseCtx, input: RawSpan<'a>) -> ParseResult<'a, Self> {
        alt((
            context(
                "return statement",
                map(
                    delimited(kw("return"), opt(|i| expr(ctx, i)), cut(sym(";"))),
                    Stmt::Return,
                ),
            ),
            context(
                "while statement",
                map(
                    pair(
                        preceded(kw("while"), cut(delimited(sym("("), |i| expr(ctx, i), sym(")")))),
                        |i| block(ctx, i),
                    ),
                    |(cond, body)| Stmt::While(cond, body),
                ),
            ),
            context(
                "if statement",
                map(
                    tuple((
                        preceded(kw("if"), cut(delimited(sym("("), |i| expr(ctx, i), sym(")")))),
                        |i| block(ctx, i),
                        |i| else_tail(ctx, i),
                    )),
                    |(cond, body, tail)| {
                        let tail = if tail.else_ifs.is_empty() && tail.else_body.is_none() {
                            None
                        } else {
                            Some(tail)
                        };
                        Stmt::If(cond, body, tail)
                    },
                ),
            ),
            context(
                "struct definition",
                map(
                    preceded(
                        kw("struct"),
                        cut(pair(
                            |i| ident(ctx, i),
                            delimited(sym("{"), many0(terminated(|i| arg_dec(ctx, i), sym(";"))), sym("}")),
                        )),
                    ),
                    |(name, fields)| Stmt::StructDef(StructDef { name, fields }),
                ),
            ),
            context(
                "enum definition",
                map(
                    preceded(
                        kw("enum"),
                        cut(pair(
                            |i| ident(ctx, i),
                            delimited(
                                sym("{"),
                                separated_list0(
                                    sym(","),
                                    pair(|i| ident(ctx, i), opt(preceded(sym("="), int_literal))),
                                ),
                                sym("}"),
                            ),
                        )),
                    ),
                    |(name, variants)| Stmt::EnumDef(EnumDef { name, variants }),
                ),
            ),
            context(
                "tree modifier",
                map(
                    preceded(kw("modifier"), cut(pair(|i| ident(ctx, i), |i| block(ctx, i)))),
                    |(name, body)| Stmt::TreeModifier(TreeModifier { name, body }),
                ),
            ),
            context("function or variable declaration", |i| declaration_stmt(ctx, i)),
            context(
                "expression statement",
                map(terminated(|i| expr(ctx, i), cut(sym(";"))), Stmt::Exp),
            ),
        ))(input)
    }
}

/// `type IDENT` followed by either `"(" arg_list ")" (stmt_list | ";")` (a
/// function declaration/definition) or `("=" exp)? ";"` (a variable
/// declaration). Both start identically, so the two are parsed as one rule
/// and split on what follows the name.
fn declaration_stmt(ctx: &ParseCtx, input: RawSpan) -> ParseResult<'_, Stmt<Span>> {
    let (i, (return_type, name)) = pair(|i| type_expr(ctx, i), |i| ident(ctx, i))(input)?;
    if let Ok((i, params)) = arg_list(ctx, i) {
        let (i, body) = cut(alt((map(|i| block(ctx, i), Some), map(sym(";"), |_| None))))(i)?;
        return Ok((i, Stmt::FunDec(FunDec { return_type, name, params, body })));
    }
    let (i, init) = cut(opt(preceded(sym("="), |i| expr(ctx, i))))(i)?;
    let (i, _) = cut(sym(";"))(i)?;
    Ok((i, Stmt::VarDec(VarDec { ty: return_type, name, init })))
}

impl<'a> Parse<'a> for Program<Span> {
    fn parse(ctx: &ParseCtx, input: RawSpan<'a>) -> ParseResult<'a, Self> {
        context(
            "program",
            map(
                all_consuming(terminated(|i| stmt_list(ctx, i), ws)),
                |body| Program { body },
            ),
        )(input)
    }
}

// ===== Preprocessor =====

/// Strips `#include "path"` (resolved via `include_resolver`) and expands
/// `#define NAME value` macros over the raw source text, before the token
/// grammar runs: `#include` file inclusion and `#define` macro
/// substitution.
pub(crate) fn preprocess(
    source: &str,
    include_resolver: &dyn Fn(&str) -> Option<String>,
) -> String {
    let mut defines: HashMap<String, String> = HashMap::new();
    let mut expanded_lines = Vec::new();

    fn process_lines(
        text: &str,
        defines: &mut HashMap<String, String>,
        include_resolver: &dyn Fn(&str) -> Option<String>,
        out: &mut Vec<String>,
    ) {
        for line in text.lines() {
            let trimmed = line.trim_start();
            if let Some(rest) = trimmed.strip_prefix("#include") {
                let path = rest.trim().trim_matches('"');
                if let Some(included) = include_resolver(path) {
                    process_lines(&included, defines, include_resolver, out);
                }
                continue;
            }
            if let Some(rest) = trimmed.strip_prefix("#define") {
                let mut parts = rest.trim().splitn(2, char::is_whitespace);
                if let Some(name) = parts.next() {
                    let value = parts.next().unwrap_or("").trim().to_string();
                    defines.insert(name.to_string(), value);
                }
                continue;
            }
            let mut expanded = line.to_string();
            for (name, value) in defines.iter() {
                expanded = replace_word(&expanded, name, value);
            }
            out.push(expanded);
        }
    }

    fn replace_word(haystack: &str, name: &str, value: &str) -> String {
        let mut result = String::with_capacity(haystack.len());
        let mut rest = haystack;
        while let Some(idx) = rest.find(name) {
            let before_ok = rest[..idx]
                .chars()
                .last()
                .map(|c| !c.is_alphanumeric() && c != '_')
                .unwrap_or(true);
            let after = &rest[idx + name.len()..];
            let after_ok = after
                .chars()
                .next()
                .map(|c| !c.is_alphanumeric() && c != '_')
                .unwrap_or(true);
            if before_ok && after_ok {
                result.push_str(&rest[..idx]);
                result.push_str(value);
                rest = after;
            } else {
                result.push_str(&rest[..idx + name.len()]);
                rest = after;
            }
        }
        result.push_str(rest);
        result
    }

    process_lines(source, &mut defines, include_resolver, &mut expanded_lines);
    expanded_lines.join("\n")
}

/// Parse a full program, returning the source AST plus the pool every
/// identifier in it was interned into.
pub(crate) fn parse(
    source: &str,
    pool: StringPool,
) -> Result<(Program<Span>, StringPool), Vec<SourceErrorWrapper<CompileError>>> {
    let ctx = ParseCtx::new(pool);
    match Program::parse(&ctx, RawSpan::new(source)) {
        Ok((_, program)) => Ok((program, ctx.into_pool())),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let (raw_span, context) = e
                .errors
                .iter()
                .filter_map(|err| match err {
                    (span, VerboseErrorKind::Context(context)) => Some((span, context)),
                    _ => None,
                })
                .next()
                .unwrap_or_else(|| {
                    // Fall back to the first error span with a generic
                    // message rather than panicking -- unlike the assembly
                    // grammar, not every combinator here is wrapped in
                    // `context()`.
                    let (span, _) = e.errors.first().expect("nom reported zero errors");
                    (span, &"valid statement")
                });
            Err(vec![SourceErrorWrapper::new(
                CompileError::Syntax { expected: context },
                Span::from_position(raw_span),
                source,
            )])
        }
        Err(nom::Err::Incomplete(_)) => unreachable!(),
    }
}

impl crate::Compiler<()> {
    /// Parses (after preprocessing) the compiler's source text into an
    /// abstract syntax tree, and the string pool it populated.
    pub(crate) fn parse(
        self,
    ) -> Result<crate::Compiler<Program<Span>>, WithSource<CompileError>> {
        let resolver = self.host.include_resolver();
        let preprocessed = preprocess(&self.source, resolver.as_ref());
        match parse(&preprocessed, self.strings) {
            Ok((program, strings)) => Ok(crate::Compiler {
                source: self.source,
                host: self.host,
                strings,
                symtab: self.symtab,
                ast: program,
            }),
            Err(errors) => Err(WithSource::new(errors, self.source)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Program<Span> {
        parse(src, StringPool::new()).unwrap().0
    }

    #[test]
    fn parses_arithmetic_assignment() {
        let program = parse_ok("int x = 2 + 3 * 4;");
        assert_eq!(program.body.len(), 1);
        match program.body[0].value() {
            Stmt::Exp(e) => match e.value() {
                Expr::Binop(BinOp::Assign, _, rhs) => match rhs.value() {
                    Expr::Binop(BinOp::Add, _, _) => {}
                    other => panic!("expected Add, got {:?}", other),
                },
                other => panic!("expected Assign, got {:?}", other),
            },
            other => panic!("expected Exp, got {:?}", other),
        }
    }

    #[test]
    fn parses_function_with_recursion() {
        let program = parse_ok(
            "int fact(int n) { if (n <= 1) { return 1; } return n * fact(n - 1); }",
        );
        assert_eq!(program.body.len(), 1);
        assert!(matches!(program.body[0].value(), Stmt::FunDec(_)));
    }

    #[test]
    fn parses_while_loop() {
        let program = parse_ok("int s = 0; int i = 0; while (i < 4) { s = s + i; i = i + 1; }");
        assert_eq!(program.body.len(), 3);
        assert!(matches!(program.body[2].value(), Stmt::While(..)));
    }

    #[test]
    fn parses_struct_and_field_assignment() {
        let program = parse_ok("struct P { int a; float b; } P p; p.a = 7; p.b = 0.5;");
        assert!(matches!(program.body[0].value(), Stmt::StructDef(_)));
    }

    #[test]
    fn parses_vector_constructor_and_swizzle() {
        let program =
            parse_ok("float4 v = float4(1.0, 2.0, 3.0, 4.0); float2 w = v.zx;");
        assert_eq!(program.body.len(), 2);
    }

    #[test]
    fn define_macro_expands_before_parsing() {
        let expanded = preprocess("#define N 4\nint x = N;", &|_| None);
        assert_eq!(expanded.trim(), "int x = 4;");
    }

    #[test]
    fn syntax_error_reports_a_position() {
        let err = parse("int x = ;", StringPool::new()).unwrap_err();
        assert_eq!(err.len(), 1);
    }
}
