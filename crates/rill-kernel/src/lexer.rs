//! Lexer for rill source code.
//!
//! Converts source text into a stream of tokens using the logos lexer generator.
//! Horizontal whitespace is kept as a [`Token::Space`] token: adjacency is
//! significant, since `a$x'b'` is a single compound word while `a $x 'b'` is
//! three separate words.

use logos::{Logos, Span};
use std::fmt;

/// A token with its span in the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub token: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(token: T, span: Span) -> Self {
        Self { token, span }
    }
}

/// Lexer error types.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LexerError {
    #[default]
    UnexpectedCharacter,
    UnterminatedString,
    InvalidEscape,
}

impl fmt::Display for LexerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexerError::UnexpectedCharacter => write!(f, "unexpected character"),
            LexerError::UnterminatedString => write!(f, "unterminated string"),
            LexerError::InvalidEscape => write!(f, "invalid escape sequence"),
        }
    }
}

/// Tokens produced by the rill lexer.
///
/// Words carry their processed text. Quoted strings have their quotes removed
/// and escapes resolved; variables are stored without the leading `$`.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(error = LexerError)]
pub enum Token {
    // ═══════════════════════════════════════════════════════════════════
    // Whitespace and separators
    // ═══════════════════════════════════════════════════════════════════
    #[regex(r"[ \t\r]+")]
    Space,

    #[token("\n")]
    Newline,

    /// Comment: `# ...` to end of line
    #[regex(r"#[^\n]*", allow_greedy = true)]
    Comment,

    #[token(";")]
    Semi,

    #[token("|")]
    Pipe,

    /// Introduces a key in a table literal: `&key value`
    #[token("&")]
    Amp,

    #[token("=")]
    Eq,

    // ═══════════════════════════════════════════════════════════════════
    // Brackets
    // ═══════════════════════════════════════════════════════════════════
    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    /// Status capture opener: `?(`
    #[token("?(")]
    QuestionParen,

    // ═══════════════════════════════════════════════════════════════════
    // Words
    // ═══════════════════════════════════════════════════════════════════

    /// Double-quoted string: `"..."` with C-style escapes, no interpolation.
    #[regex(r#""([^"\\]|\\(.|\n))*""#, lex_string)]
    String(String),

    /// Single-quoted `'...'` or backquoted `` `...` `` string.
    /// Doubling the quote character escapes it.
    #[regex(r"'([^']|'')*'", lex_single_string)]
    #[regex(r"`([^`]|``)*`", lex_back_string)]
    RawString(String),

    /// Unterminated quote, always an error.
    #[regex(r#""([^"\\]|\\(.|\n))*"#, lex_unterminated)]
    #[regex(r"'([^']|'')*", lex_unterminated)]
    #[regex(r"`([^`]|``)*", lex_unterminated)]
    UnterminatedString,

    /// Variable reference: `$name` or `$ns:name`, stored as `name` / `ns:name`.
    #[regex(r"\$[A-Za-z_][A-Za-z0-9_\-]*(:[A-Za-z_][A-Za-z0-9_\-]*)?", lex_variable)]
    Variable(String),

    /// Unquoted word. May contain `=` and `#` after its first character.
    #[regex(r#"([^\s;|&(){}\[\]'"`$=#?]|\?[^\s;|&(){}\[\]'"`$(])[^\s;|&(){}\[\]'"`$]*"#, lex_bareword)]
    Bareword(String),
}

impl Token {
    /// Whether this token can only appear between words.
    pub fn is_separator(&self) -> bool {
        matches!(self, Token::Space | Token::Newline | Token::Semi)
    }
}

fn lex_string(lex: &mut logos::Lexer<Token>) -> Result<String, LexerError> {
    parse_string_literal(lex.slice())
}

fn lex_single_string(lex: &mut logos::Lexer<Token>) -> String {
    unquote_raw(lex.slice(), '\'')
}

fn lex_back_string(lex: &mut logos::Lexer<Token>) -> String {
    unquote_raw(lex.slice(), '`')
}

fn lex_unterminated(_lex: &mut logos::Lexer<Token>) -> Result<(), LexerError> {
    Err(LexerError::UnterminatedString)
}

/// `$NAME` → `NAME`
fn lex_variable(lex: &mut logos::Lexer<Token>) -> String {
    lex.slice()[1..].to_string()
}

fn lex_bareword(lex: &mut logos::Lexer<Token>) -> String {
    lex.slice().to_string()
}

/// Strip surrounding quotes from a raw string and collapse doubled quotes.
fn unquote_raw(source: &str, quote: char) -> String {
    let inner = &source[1..source.len() - 1];
    let doubled: String = [quote, quote].iter().collect();
    inner.replace(&doubled, &quote.to_string())
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Space => write!(f, "whitespace"),
            Token::Newline => write!(f, "newline"),
            Token::Comment => write!(f, "comment"),
            Token::Semi => write!(f, ";"),
            Token::Pipe => write!(f, "|"),
            Token::Amp => write!(f, "&"),
            Token::Eq => write!(f, "="),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::QuestionParen => write!(f, "?("),
            Token::String(s) => write!(f, "\"{}\"", s),
            Token::RawString(s) => write!(f, "'{}'", s),
            Token::UnterminatedString => write!(f, "unterminated string"),
            Token::Variable(v) => write!(f, "${}", v),
            Token::Bareword(w) => write!(f, "{}", w),
        }
    }
}

/// Tokenize source code into a vector of spanned tokens.
///
/// Comments are dropped. Returns every lexer error with its position.
pub fn tokenize(source: &str) -> Result<Vec<Spanned<Token>>, Vec<Spanned<LexerError>>> {
    let lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (result, span) in lexer.spanned() {
        match result {
            Ok(Token::Comment) => {}
            Ok(token) => tokens.push(Spanned::new(token, span)),
            Err(err) => errors.push(Spanned::new(err, span)),
        }
    }

    if errors.is_empty() {
        Ok(tokens)
    } else {
        Err(errors)
    }
}

/// Extract the content of a double-quoted string token, processing escapes.
///
/// Supports `\n \t \r \a \b \f \v \e \\ \"`, three-digit octal `\ooo`,
/// `\xHH` and `\uHHHH`. Unknown escapes keep their backslash so regex
/// patterns like `"\."` survive.
pub fn parse_string_literal(source: &str) -> Result<String, LexerError> {
    if source.len() < 2 || !source.starts_with('"') || !source.ends_with('"') {
        return Err(LexerError::UnterminatedString);
    }

    let inner = &source[1..source.len() - 1];
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('a') => result.push('\x07'),
            Some('b') => result.push('\x08'),
            Some('f') => result.push('\x0c'),
            Some('v') => result.push('\x0b'),
            Some('e') => result.push('\x1b'),
            Some('\\') => result.push('\\'),
            Some('"') => result.push('"'),
            Some(d @ '0'..='7') => {
                let mut digits = String::from(d);
                for _ in 0..2 {
                    match chars.next() {
                        Some(o @ '0'..='7') => digits.push(o),
                        _ => return Err(LexerError::InvalidEscape),
                    }
                }
                result.push(code_point(&digits, 8)?);
            }
            Some('x') => result.push(code_point(&take_hex(&mut chars, 2)?, 16)?),
            Some('u') => result.push(code_point(&take_hex(&mut chars, 4)?, 16)?),
            Some(next) => {
                result.push('\\');
                result.push(next);
            }
            None => return Err(LexerError::InvalidEscape),
        }
    }

    Ok(result)
}

fn take_hex(chars: &mut impl Iterator<Item = char>, count: usize) -> Result<String, LexerError> {
    let mut hex = String::with_capacity(count);
    for _ in 0..count {
        match chars.next() {
            Some(h) if h.is_ascii_hexdigit() => hex.push(h),
            _ => return Err(LexerError::InvalidEscape),
        }
    }
    Ok(hex)
}

fn code_point(digits: &str, radix: u32) -> Result<char, LexerError> {
    u32::from_str_radix(digits, radix)
        .ok()
        .and_then(char::from_u32)
        .ok_or(LexerError::InvalidEscape)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Token> {
        tokenize(source)
            .expect("lexer should succeed")
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    fn word(s: &str) -> Token {
        Token::Bareword(s.to_string())
    }

    #[test]
    fn simple_command() {
        assert_eq!(
            lex("put 233 lorem"),
            vec![word("put"), Token::Space, word("233"), Token::Space, word("lorem")]
        );
    }

    #[test]
    fn arithmetic_heads_are_barewords() {
        assert_eq!(lex("+"), vec![word("+")]);
        assert_eq!(lex("/"), vec![word("/")]);
        assert_eq!(lex("*"), vec![word("*")]);
        assert_eq!(lex("-"), vec![word("-")]);
    }

    #[test]
    fn sed_expression_is_one_word() {
        assert_eq!(lex("s/l/1/g"), vec![word("s/l/1/g")]);
    }

    #[test]
    fn equals_inside_word() {
        assert_eq!(lex("a=b"), vec![word("a=b")]);
        assert_eq!(lex("= b"), vec![Token::Eq, Token::Space, word("b")]);
    }

    #[test]
    fn hash_inside_word_is_not_comment() {
        assert_eq!(lex("a#b"), vec![word("a#b")]);
        assert_eq!(lex("a #b"), vec![word("a"), Token::Space]);
    }

    #[test]
    fn variables() {
        assert_eq!(lex("$x"), vec![Token::Variable("x".into())]);
        assert_eq!(lex("$up:x"), vec![Token::Variable("up:x".into())]);
        assert_eq!(
            lex("$x[1]"),
            vec![Token::Variable("x".into()), Token::LBracket, word("1"), Token::RBracket]
        );
    }

    #[test]
    fn compound_has_no_space() {
        assert_eq!(
            lex("a$x'b'"),
            vec![word("a"), Token::Variable("x".into()), Token::RawString("b".into())]
        );
    }

    #[test]
    fn raw_strings() {
        assert_eq!(lex("'it''s'"), vec![Token::RawString("it's".into())]);
        assert_eq!(lex("`such \\\"``literal`"), vec![Token::RawString("such \\\"`literal".into())]);
        assert_eq!(lex("''"), vec![Token::RawString(String::new())]);
    }

    #[test]
    fn double_quoted_escapes() {
        assert_eq!(
            lex(r#""much \n\033[31;1m$cool\033[m""#),
            vec![Token::String("much \n\x1b[31;1m$cool\x1b[m".into())]
        );
        assert_eq!(lex(r#""\x41é""#), vec![Token::String("Aé".into())]);
    }

    #[test]
    fn unknown_escape_is_preserved() {
        assert_eq!(lex(r#""a\.b""#), vec![Token::String("a\\.b".into())]);
    }

    #[test]
    fn unterminated_strings() {
        for source in ["\"abc", "'abc", "`abc", "'abc''"] {
            let errs = tokenize(source).expect_err(source);
            assert_eq!(errs[0].token, LexerError::UnterminatedString, "{source}");
        }
    }

    #[test]
    fn bad_octal_escape() {
        assert!(tokenize(r#""\08""#).is_err());
    }

    #[test]
    fn status_capture_opener() {
        assert_eq!(
            lex("?(true)"),
            vec![Token::QuestionParen, word("true"), Token::RParen]
        );
    }

    #[test]
    fn pipes_and_separators() {
        assert_eq!(
            lex("true|false;x\ny"),
            vec![
                word("true"),
                Token::Pipe,
                word("false"),
                Token::Semi,
                word("x"),
                Token::Newline,
                word("y"),
            ]
        );
    }

    #[test]
    fn table_literal() {
        assert_eq!(
            lex("[a &k v]"),
            vec![
                Token::LBracket,
                word("a"),
                Token::Space,
                Token::Amp,
                word("k"),
                Token::Space,
                word("v"),
                Token::RBracket,
            ]
        );
    }

    #[test]
    fn comment_stops_at_newline() {
        assert_eq!(
            lex("a #c\nb"),
            vec![word("a"), Token::Space, Token::Newline, word("b")]
        );
    }

    #[test]
    fn spans_are_byte_offsets() {
        let tokens = tokenize("put $x").expect("lex");
        assert_eq!(tokens[2].span, 4..6);
    }
}
