//! Parser for rill source code.
//!
//! Transforms a token stream from the lexer into an Abstract Syntax Tree.
//! Uses chumsky for parser combinators. Special forms (`var`, `set`, `del`,
//! `fn`, `if`) are parsed as ordinary word lists first and then lowered by
//! their head word, so their argument shapes are checked in one place.

use std::sync::Arc;

use crate::ast::{
    Chunk, ClosureDef, Command, Compound, FnDef, Form, IfClause, IfForm, Namespace, Pipeline,
    Primary, PrimaryKind, SetForm, TableItem, VarDecl, VarForm, VarName,
};
use crate::lexer::{self, Token};
use chumsky::{input::ValueInput, prelude::*};

/// Span type used throughout the parser.
pub type Span = SimpleSpan;

type ParserExtra<'tokens> = extra::Err<Rich<'tokens, Token, Span>>;

/// Parse error with location and context.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub span: Span,
    pub message: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {:?}", self.message, self.span)
    }
}

impl std::error::Error for ParseError {}

/// Parse rill source code into a chunk.
pub fn parse(source: &str) -> Result<Chunk, Vec<ParseError>> {
    let tokens = lexer::tokenize(source).map_err(|errs| {
        errs.into_iter()
            .map(|e| ParseError {
                span: (e.span.start..e.span.end).into(),
                message: format!("lexer error: {}", e.token),
            })
            .collect::<Vec<_>>()
    })?;

    let tokens: Vec<(Token, Span)> = tokens
        .into_iter()
        .map(|spanned| (spanned.token, (spanned.span.start..spanned.span.end).into()))
        .collect();

    let end_span: Span = (source.len()..source.len()).into();

    let parser = chunk_parser().then_ignore(end());
    let result = parser.parse(tokens.as_slice().map(end_span, |(t, s)| (t, s)));

    result.into_result().map_err(|errs| {
        errs.into_iter()
            .map(|e| ParseError {
                span: *e.span(),
                message: e.to_string(),
            })
            .collect()
    })
}

/// Split a lexed variable (`x`, `up:x`) into namespace and name.
pub fn parse_var_name(raw: &str) -> Result<VarName, String> {
    match raw.split_once(':') {
        None => Ok(VarName::simple(raw)),
        Some((prefix, name)) => Namespace::from_prefix(prefix)
            .map(|ns| VarName::qualified(ns, name))
            .ok_or_else(|| format!("unknown namespace {}:", prefix)),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Parser Combinators - generic over input type
// ═══════════════════════════════════════════════════════════════════════════

/// A chunk: pipelines separated by `;`, newlines or blank space.
fn chunk_parser<'tokens, I>() -> impl Parser<'tokens, I, Chunk, ParserExtra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
{
    recursive(|chunk| {
        let compound = compound_parser(chunk);
        let pipeline = pipeline_parser(form_parser(compound));
        let padding = select! { t if Token::is_separator(&t) => () }.repeated();

        padding
            .clone()
            .ignore_then(pipeline.then_ignore(padding).repeated().collect::<Vec<_>>())
            .map(|pipelines| Chunk { pipelines })
    })
    .boxed()
}

/// `form | form | ...`; a newline may follow the pipe.
fn pipeline_parser<'tokens, I, F>(
    form: F,
) -> impl Parser<'tokens, I, Arc<Pipeline>, ParserExtra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
    F: Parser<'tokens, I, Form, ParserExtra<'tokens>> + Clone + 'tokens,
{
    let space = just(Token::Space).repeated();
    let gap = choice((just(Token::Space), just(Token::Newline))).repeated();

    form.clone()
        .then(
            space
                .ignore_then(just(Token::Pipe))
                .ignore_then(gap)
                .ignore_then(form)
                .repeated()
                .collect::<Vec<_>>(),
        )
        .map(|(first, rest)| {
            let forms = std::iter::once(first).chain(rest).map(Arc::new).collect();
            Arc::new(Pipeline { forms })
        })
        .labelled("pipeline")
        .boxed()
}

/// One word of a form before lowering.
#[derive(Debug, Clone, PartialEq)]
enum Word {
    Compound(Compound),
    Eq,
}

/// Space-separated words, lowered into a [`Form`] by the head word.
fn form_parser<'tokens, I, C>(
    compound: C,
) -> impl Parser<'tokens, I, Form, ParserExtra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
    C: Parser<'tokens, I, Compound, ParserExtra<'tokens>> + Clone + 'tokens,
{
    let word = choice((compound.map(Word::Compound), just(Token::Eq).to(Word::Eq)));

    word.clone()
        .then(
            just(Token::Space)
                .repeated()
                .ignore_then(word)
                .repeated()
                .collect::<Vec<_>>(),
        )
        .try_map(|(head, args), span| lower_form(head, args).map_err(|msg| Rich::custom(span, msg)))
        .labelled("command")
        .boxed()
}

/// Adjacent primaries with optional subscripts.
fn compound_parser<'tokens, I, C>(
    chunk: C,
) -> impl Parser<'tokens, I, Compound, ParserExtra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
    C: Parser<'tokens, I, Chunk, ParserExtra<'tokens>> + Clone + 'tokens,
{
    recursive(|compound| {
        // Whitespace inside brackets may span lines.
        let gap = choice((just(Token::Space), just(Token::Newline))).repeated();

        let bareword = select! { Token::Bareword(s) => PrimaryKind::Bareword(s) };
        let quoted = select! {
            Token::String(s) => PrimaryKind::Quoted(s),
            Token::RawString(s) => PrimaryKind::Quoted(s),
        };
        let variable = select! { Token::Variable(v) => v }.try_map(|raw: String, span| {
            parse_var_name(&raw)
                .map(PrimaryKind::Variable)
                .map_err(|msg| Rich::custom(span, msg))
        });

        let table_item = choice((
            just(Token::Amp)
                .ignore_then(compound.clone())
                .then_ignore(gap.clone())
                .then(compound.clone())
                .map(|(k, v)| TableItem::Pair(k, v)),
            compound.clone().map(TableItem::Item),
        ));
        let table = gap
            .clone()
            .ignore_then(table_item.then_ignore(gap.clone()).repeated().collect::<Vec<_>>())
            .delimited_by(just(Token::LBracket), just(Token::RBracket))
            .map(PrimaryKind::Table)
            .labelled("table");

        // `{a b}`: the first element must touch the brace.
        let braced = just(Token::LBrace)
            .ignore_then(compound.clone())
            .then(
                gap.clone()
                    .ignore_then(compound.clone())
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .then_ignore(gap.clone())
            .then_ignore(just(Token::RBrace))
            .map(|(first, rest)| {
                PrimaryKind::Braced(std::iter::once(first).chain(rest).collect())
            })
            .labelled("braced list");

        let param = select! {
            Token::Variable(v) => v,
            Token::Bareword(b) => b,
        };
        let params = just(Token::Pipe)
            .ignore_then(gap.clone().ignore_then(param).repeated().collect::<Vec<_>>())
            .then_ignore(gap.clone())
            .then_ignore(just(Token::Pipe));
        let closure = just(Token::LBrace)
            .ignore_then(gap.clone())
            .ignore_then(params.or_not())
            .then(chunk.clone())
            .then_ignore(just(Token::RBrace))
            .map(|(params, body)| {
                PrimaryKind::Closure(Arc::new(ClosureDef {
                    params: params.unwrap_or_default(),
                    body: Arc::new(body),
                }))
            })
            .labelled("closure");

        let capture = chunk
            .clone()
            .delimited_by(just(Token::LParen), just(Token::RParen))
            .map(|c| PrimaryKind::Capture(Arc::new(c)));
        let status_capture = chunk
            .clone()
            .delimited_by(just(Token::QuestionParen), just(Token::RParen))
            .map(|c| PrimaryKind::StatusCapture(Arc::new(c)));

        let index = compound
            .clone()
            .delimited_by(
                just(Token::LBracket).then(gap.clone()),
                gap.clone().then(just(Token::RBracket)),
            )
            .labelled("subscript");

        let primary = choice((
            bareword,
            quoted,
            variable,
            table,
            braced,
            closure,
            capture,
            status_capture,
        ))
        .then(index.repeated().collect::<Vec<_>>())
        .map(|(kind, indices)| Primary { kind, indices });

        primary
            .repeated()
            .at_least(1)
            .collect::<Vec<_>>()
            .map(|primaries| Compound { primaries })
            .boxed()
    })
}

// ═══════════════════════════════════════════════════════════════════════════
// Lowering of special forms
// ═══════════════════════════════════════════════════════════════════════════

fn lower_form(head: Word, args: Vec<Word>) -> Result<Form, String> {
    let head = match head {
        Word::Compound(c) => c,
        Word::Eq => return Err("unexpected '='".to_string()),
    };

    match head.as_bareword() {
        Some("var") => lower_var(args),
        Some("set") => lower_set(args),
        Some("del") => lower_del(args),
        Some("fn") => lower_fn(args),
        Some("if") => lower_if(args),
        _ => {
            // A stray `=` in argument position is just the text "=".
            let args = args
                .into_iter()
                .map(|w| match w {
                    Word::Compound(c) => c,
                    Word::Eq => bareword("="),
                })
                .collect();
            Ok(Form::Command(Command { head, args }))
        }
    }
}

fn bareword(s: &str) -> Compound {
    Compound {
        primaries: vec![Primary {
            kind: PrimaryKind::Bareword(s.to_string()),
            indices: vec![],
        }],
    }
}

/// Split words at the first `=`. Everything after it must be a compound.
fn split_at_eq(args: Vec<Word>) -> Result<(Vec<Compound>, Option<Vec<Compound>>), String> {
    let mut lhs = Vec::new();
    let mut iter = args.into_iter();
    for word in iter.by_ref() {
        match word {
            Word::Compound(c) => lhs.push(c),
            Word::Eq => {
                let rhs = iter
                    .map(|w| match w {
                        Word::Compound(c) => Ok(c),
                        Word::Eq => Err("duplicate '='".to_string()),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                return Ok((lhs, Some(rhs)));
            }
        }
    }
    Ok((lhs, None))
}

fn expect_variable(word: &Compound, form: &str) -> Result<VarName, String> {
    word.as_variable()
        .cloned()
        .ok_or_else(|| format!("{}: expected a variable name", form))
}

fn lower_var(args: Vec<Word>) -> Result<Form, String> {
    let (lhs, values) = split_at_eq(args)?;
    let mut decls: Vec<VarDecl> = Vec::new();
    // Start of the names that the next type annotation applies to.
    let mut untyped_from = 0;

    for word in &lhs {
        if let Some(name) = word.as_variable() {
            decls.push(VarDecl {
                name: name.clone(),
                kind: None,
            });
        } else if let Some(kind) = word.as_bareword() {
            if untyped_from == decls.len() {
                return Err(format!("var: type {} does not follow a name", kind));
            }
            for decl in &mut decls[untyped_from..] {
                decl.kind = Some(kind.to_string());
            }
            untyped_from = decls.len();
        } else {
            return Err("var: expected a variable name or type".to_string());
        }
    }

    if decls.is_empty() {
        return Err("var: no names".to_string());
    }
    Ok(Form::Var(VarForm { decls, values }))
}

fn lower_set(args: Vec<Word>) -> Result<Form, String> {
    let (lhs, values) = split_at_eq(args)?;
    let values = values.ok_or_else(|| "set: missing '='".to_string())?;
    let names = lhs
        .iter()
        .map(|w| expect_variable(w, "set"))
        .collect::<Result<Vec<_>, _>>()?;
    if names.is_empty() {
        return Err("set: no names".to_string());
    }
    Ok(Form::Set(SetForm { names, values }))
}

fn lower_del(args: Vec<Word>) -> Result<Form, String> {
    let names = args
        .into_iter()
        .map(|w| match w {
            Word::Compound(c) => expect_variable(&c, "del"),
            Word::Eq => Err("del: unexpected '='".to_string()),
        })
        .collect::<Result<Vec<_>, _>>()?;
    if names.is_empty() {
        return Err("del: no names".to_string());
    }
    Ok(Form::Del(names))
}

fn compounds(args: Vec<Word>, form: &str) -> Result<Vec<Compound>, String> {
    args.into_iter()
        .map(|w| match w {
            Word::Compound(c) => Ok(c),
            Word::Eq => Err(format!("{}: unexpected '='", form)),
        })
        .collect()
}

fn lower_fn(args: Vec<Word>) -> Result<Form, String> {
    let mut words = compounds(args, "fn")?;
    let body = words
        .pop()
        .and_then(|w| w.as_closure().cloned())
        .ok_or_else(|| "fn: body must be a closure literal".to_string())?;
    if words.is_empty() {
        return Err("fn: missing name".to_string());
    }
    let name = words.remove(0);
    let name = name
        .as_bareword()
        .ok_or_else(|| "fn: name must be a bareword".to_string())?
        .to_string();

    let mut params = Vec::with_capacity(words.len() + body.params.len());
    for word in &words {
        match (word.as_variable(), word.as_bareword()) {
            (Some(v), _) if v.namespace.is_none() => params.push(v.name.clone()),
            (_, Some(b)) => params.push(b.to_string()),
            _ => return Err("fn: parameters must be plain names".to_string()),
        }
    }
    params.extend(body.params.iter().cloned());

    Ok(Form::Fn(FnDef {
        name,
        closure: Arc::new(ClosureDef {
            params,
            body: body.body.clone(),
        }),
    }))
}

fn lower_if(args: Vec<Word>) -> Result<Form, String> {
    let words = compounds(args, "if")?;
    let mut iter = words.into_iter().peekable();
    let mut clauses = Vec::new();
    let mut else_body = None;

    loop {
        let mut conditions = Vec::new();
        let body = loop {
            let word = iter
                .next()
                .ok_or_else(|| "if: missing body".to_string())?;
            match word.as_closure() {
                Some(def) => break def.clone(),
                None => conditions.push(word),
            }
        };
        if conditions.is_empty() {
            return Err("if: missing condition".to_string());
        }
        clauses.push(IfClause { conditions, body });

        match iter.next() {
            None => break,
            Some(w) if w.as_bareword() == Some("else") => {}
            Some(_) => return Err("if: expected 'else' after body".to_string()),
        }

        if iter.peek().and_then(|w| w.as_bareword()) == Some("if") {
            iter.next();
            continue;
        }
        let body = iter
            .next()
            .and_then(|w| w.as_closure().cloned())
            .ok_or_else(|| "else: body must be a closure literal".to_string())?;
        if iter.next().is_some() {
            return Err("if: unexpected words after else body".to_string());
        }
        else_body = Some(body);
        break;
    }

    Ok(Form::If(IfForm { clauses, else_body }))
}
