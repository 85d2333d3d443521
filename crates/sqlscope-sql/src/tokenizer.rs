//! Dialect-parameterized SQL tokenizer
//!
//! Single forward pass over the text. Every byte of the input ends up in
//! exactly one token, so concatenating the token texts gives back the
//! original string. The scanner never fails: anything it cannot classify
//! becomes an `Unknown` or single-character `Symbol` token.

use crate::interval::Interval;
use serde::Serialize;
use std::ops::Range;
use sqlscope_core::DialectRules;

/// Token category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Space,
    Symbol,
    Keyword,
    Name,
    Value,
    Comment,
    Command,
    Unknown,
    /// End-of-input sentinel, never part of a token list
    End,
}

/// A typed slice of the source text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Byte offset of the first character
    pub start: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, start: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            start,
        }
    }

    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }

    pub fn interval(&self) -> Interval {
        Interval::new(self.start, self.end())
    }

    /// Neither whitespace nor comment
    pub fn is_significant(&self) -> bool {
        !matches!(self.kind, TokenKind::Space | TokenKind::Comment | TokenKind::End)
    }

    /// Keyword or name spelling `word`, ignoring case
    pub fn is_word(&self, word: &str) -> bool {
        matches!(self.kind, TokenKind::Keyword | TokenKind::Name) && self.text.eq_ignore_ascii_case(word)
    }

    pub fn is_symbol(&self, symbol: &str) -> bool {
        self.kind == TokenKind::Symbol && self.text == symbol
    }
}

const SYMBOLS: &[char] = &[
    '"', '?', '%', '&', '\'', '(', ')', '|', '*', '+', ',', '-', '.', '/', ':', ';', '<', '=', '>',
    '!', '~', '`', '[', ']', '#',
];

const TWO_CHAR_SYMBOLS: &[(char, char)] = &[
    ('<', '>'),
    ('<', '='),
    ('>', '='),
    ('|', '|'),
    ('(', ')'),
    ('!', '='),
    (':', '='),
    ('.', '*'),
];

fn is_space(c: char) -> bool {
    c.is_whitespace()
}

fn is_digit(c: char) -> bool {
    c.is_numeric()
}

fn is_symbol(c: char) -> bool {
    SYMBOLS.contains(&c)
}

fn is_letter(c: char) -> bool {
    !is_space(c) && !is_digit(c) && !is_symbol(c)
}

/// Streaming tokenizer over one text
pub struct Tokenizer<'a> {
    text: &'a str,
    rules: &'a DialectRules,
    pos: usize,
    finished: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(text: &'a str, rules: &'a DialectRules) -> Self {
        Self {
            text,
            rules,
            pos: 0,
            finished: false,
        }
    }

    /// Scan the next token; returns an `End` token once the text is consumed
    pub fn next_token(&mut self) -> Token {
        let start = self.pos;
        let Some(c) = self.peek_char() else {
            return Token::new(TokenKind::End, "", start);
        };

        let kind = if is_space(c) {
            self.eat_while(is_space);
            TokenKind::Space
        } else if c == ';' {
            self.bump();
            TokenKind::Symbol
        } else if is_digit(c) {
            self.scan_number(c)
        } else if self.at_line_comment() {
            self.eat_until_line_end();
            TokenKind::Comment
        } else if is_letter(c) {
            self.scan_word()
        } else if c == '/' {
            self.scan_slash()
        } else if c == '\'' || self.rules.quote_opening(self.rest()).is_some() {
            self.scan_quoted(c)
        } else if is_symbol(c) {
            self.scan_symbol(c)
        } else {
            self.bump();
            TokenKind::Unknown
        };

        Token::new(kind, &self.text[start..self.pos], start)
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek_char() {
            self.pos += c.len_utf8();
        }
    }

    fn eat_while(&mut self, pred: impl Fn(char) -> bool) {
        while let Some(c) = self.peek_char() {
            if !pred(c) {
                break;
            }
            self.bump();
        }
    }

    fn eat_until_line_end(&mut self) {
        self.eat_while(|c| c != '\n' && c != '\r');
    }

    fn at_line_comment(&self) -> bool {
        let rest = self.rest();
        self.rules
            .line_comments
            .iter()
            .any(|marker| !marker.is_empty() && rest.starts_with(marker.as_str()))
    }

    fn scan_number(&mut self, first: char) -> TokenKind {
        let start = self.pos;
        self.bump();

        if first == '0' && matches!(self.peek_char(), Some('x' | 'X')) {
            self.bump();
            self.eat_while(|c| c.is_ascii_hexdigit());
        } else {
            while let Some(c) = self.peek_char() {
                if is_digit(c) || c == '.' {
                    self.bump();
                } else if matches!(c, 'e' | 'E') && self.exponent_follows() {
                    self.bump();
                    if matches!(self.peek_char(), Some('+' | '-')) {
                        self.bump();
                    }
                } else {
                    break;
                }
            }
        }

        if self.peek_char().is_some_and(is_letter) && self.rules.is_identifier_start(first) {
            self.pos = start;
            return self.scan_word();
        }

        TokenKind::Value
    }

    fn exponent_follows(&self) -> bool {
        match self.peek_nth(1) {
            Some('+' | '-') => self.peek_nth(2).is_some_and(is_digit),
            Some(c) => is_digit(c),
            None => false,
        }
    }

    fn scan_word(&mut self) -> TokenKind {
        let start = self.pos;

        while let Some(c) = self.peek_char() {
            if is_letter(c) || is_digit(c) {
                self.bump();
            } else if self.rules.is_separator(c) {
                self.bump();
                if c == self.rules.struct_separator && self.peek_char() == Some('*') {
                    self.bump();
                }
            } else {
                break;
            }
        }

        let word = &self.text[start..self.pos];
        if self.rules.is_command(word) {
            self.eat_until_line_end();
            TokenKind::Command
        } else if self.rules.is_keyword(word) {
            TokenKind::Keyword
        } else {
            TokenKind::Name
        }
    }

    fn scan_slash(&mut self) -> TokenKind {
        if self.peek_nth(1) != Some('*') {
            self.bump();
            return TokenKind::Symbol;
        }

        self.pos += 2;
        match self.rest().find("*/") {
            Some(idx) => self.pos += idx + 2,
            // unterminated block comment runs to end of input
            None => self.pos = self.text.len(),
        }
        TokenKind::Comment
    }

    fn scan_quoted(&mut self, first: char) -> TokenKind {
        let start = self.pos;
        let rules = self.rules;

        let (open, close, kind, escape) = if first == '\'' {
            ("'", "'", TokenKind::Value, rules.escape_char)
        } else {
            match rules.quote_opening(self.rest()) {
                Some(pair) => (pair.open.as_str(), pair.close.as_str(), TokenKind::Name, rules.escape_char),
                None => {
                    self.bump();
                    return TokenKind::Symbol;
                }
            }
        };

        self.pos += open.len();
        loop {
            let rest = self.rest();
            if rest.is_empty() {
                // unterminated: fall back to the opening character alone
                self.pos = start + first.len_utf8();
                return TokenKind::Symbol;
            }

            if let Some(esc) = escape {
                if let Some(after) = rest.strip_prefix(esc) {
                    if after.starts_with(close) {
                        self.pos += esc.len_utf8() + close.len();
                        continue;
                    }
                    if after.starts_with(esc) {
                        self.pos += esc.len_utf8() * 2;
                        continue;
                    }
                }
            }

            if rest.starts_with(close) {
                self.pos += close.len();
                if self.rest().starts_with(close) {
                    self.pos += close.len();
                    continue;
                }
                return kind;
            }

            self.bump();
        }
    }

    fn scan_symbol(&mut self, first: char) -> TokenKind {
        let next = self.peek_nth(1);
        self.bump();

        if let Some(second) = next {
            if TWO_CHAR_SYMBOLS.contains(&(first, second)) {
                self.bump();
            }
        }

        TokenKind::Symbol
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.finished {
            return None;
        }

        let token = self.next_token();
        if token.kind == TokenKind::End {
            self.finished = true;
            return None;
        }
        Some(token)
    }
}

/// Tokenize a whole text
pub fn tokenize(text: &str, rules: &DialectRules) -> Vec<Token> {
    Tokenizer::new(text, rules).collect()
}

/// Remove comments, keeping neighbouring tokens apart
pub fn strip_comments(text: &str, rules: &DialectRules) -> String {
    let mut out = String::with_capacity(text.len());

    for token in Tokenizer::new(text, rules) {
        if token.kind == TokenKind::Comment {
            if out.chars().last().is_some_and(|c| !c.is_whitespace()) {
                out.push(' ');
            }
            continue;
        }
        out.push_str(&token.text);
    }

    out
}

/// Split a token stream on top-level `;`
///
/// Each interval runs from the first to the last significant token of a
/// statement; empty statements are dropped.
pub fn split_statements(tokens: &[Token]) -> Vec<Interval> {
    let mut statements = Vec::new();
    let mut current: Option<Interval> = None;
    let mut depth = 0usize;

    for token in tokens.iter().filter(|t| t.is_significant()) {
        if token.is_symbol(";") && depth == 0 {
            statements.extend(current.take());
            continue;
        }

        if token.is_symbol("(") {
            depth += 1;
        } else if token.is_symbol(")") {
            depth = depth.saturating_sub(1);
        }

        current = Some(match current {
            Some(interval) => interval.hull(&token.interval()),
            None => token.interval(),
        });
    }

    statements.extend(current);
    statements
}

/// Token range of the statement governing `offset`
///
/// Statements are separated by top-level `;`; an offset at a separator
/// belongs to the statement before it. The range excludes the separators.
pub fn statement_at(tokens: &[Token], offset: usize) -> Range<usize> {
    let mut start = 0;
    let mut depth = 0usize;

    for (index, token) in tokens.iter().enumerate() {
        if token.is_symbol("(") {
            depth += 1;
        } else if token.is_symbol(")") {
            depth = depth.saturating_sub(1);
        } else if token.is_symbol(";") && depth == 0 {
            if offset <= token.start {
                return start..index;
            }
            start = index + 1;
        }
    }

    start..tokens.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sqlscope_core::{DialectConfig, DialectRules};

    fn kinds(tokens: &[Token]) -> Vec<(TokenKind, &str)> {
        tokens.iter().map(|t| (t.kind, t.text.as_str())).collect()
    }

    fn significant(tokens: &[Token]) -> Vec<(TokenKind, &str)> {
        tokens
            .iter()
            .filter(|t| t.kind != TokenKind::Space)
            .map(|t| (t.kind, t.text.as_str()))
            .collect()
    }

    #[test]
    fn simple_select_scenario() {
        let rules = DialectRules::ansi();
        let tokens = tokenize("SELECT a, b FROM t WHERE a = 1", &rules);

        use TokenKind::*;
        assert_eq!(
            kinds(&tokens),
            vec![
                (Keyword, "SELECT"),
                (Space, " "),
                (Name, "a"),
                (Symbol, ","),
                (Space, " "),
                (Name, "b"),
                (Space, " "),
                (Keyword, "FROM"),
                (Space, " "),
                (Name, "t"),
                (Space, " "),
                (Keyword, "WHERE"),
                (Space, " "),
                (Name, "a"),
                (Space, " "),
                (Symbol, "="),
                (Space, " "),
                (Value, "1"),
            ]
        );
    }

    #[test]
    fn round_trip_reconstructs_input() {
        let rules = DialectRules::for_dialect(DialectConfig::MySql);
        let inputs = [
            "",
            "SELECT * FROM t -- trailing comment",
            "select 'it''s', 'a\\'b', `weird``name` from x;",
            "/* unterminated block",
            "'unterminated string",
            "SELECT ü.straße, 名前 FROM 表 WHERE x <> 0x1F AND y >= 1.5e-3",
            "DELIMITER $$\nCREATE PROCEDURE p() BEGIN SELECT 1; END$$",
            "a\u{0}b\u{7}",
            "# hash comment\nSELECT 1",
        ];

        for input in inputs {
            let tokens = tokenize(input, &rules);
            let rebuilt: String = tokens.iter().map(|t| t.text.as_str()).collect();
            assert_eq!(rebuilt, input);

            let mut expected_start = 0;
            for token in &tokens {
                assert_eq!(token.start, expected_start, "gap before {token:?}");
                assert!(!token.text.is_empty());
                expected_start = token.end();
            }
        }
    }

    #[test]
    fn tokenization_is_idempotent() {
        let rules = DialectRules::ansi();
        let text = "WITH x AS (SELECT 1) SELECT * FROM x";
        assert_eq!(tokenize(text, &rules), tokenize(text, &rules));
    }

    #[test]
    fn end_sentinel_is_not_returned() {
        let rules = DialectRules::ansi();
        let mut tokenizer = Tokenizer::new("x", &rules);
        assert_eq!(tokenizer.next_token().kind, TokenKind::Name);
        assert_eq!(tokenizer.next_token().kind, TokenKind::End);
        assert_eq!(tokenizer.next_token().kind, TokenKind::End);

        let tokens = tokenize("x", &rules);
        assert!(tokens.iter().all(|t| t.kind != TokenKind::End));
    }

    #[test]
    fn numbers_and_hex() {
        let rules = DialectRules::ansi();
        let tokens = tokenize("1.25 0xFF 3e10 7e", &rules);

        use TokenKind::*;
        assert_eq!(
            significant(&tokens),
            vec![(Value, "1.25"), (Value, "0xFF"), (Value, "3e10"), (Value, "7"), (Name, "e")]
        );
    }

    #[test]
    fn digit_leading_identifiers_follow_dialect() {
        let ansi = DialectRules::ansi();
        let mysql = DialectRules::for_dialect(DialectConfig::MySql);

        use TokenKind::*;
        assert_eq!(significant(&tokenize("1st_col", &ansi)), vec![(Value, "1"), (Name, "st_col")]);
        assert_eq!(significant(&tokenize("1st_col", &mysql)), vec![(Name, "1st_col")]);
    }

    #[test]
    fn words_absorb_separators_and_star() {
        let rules = DialectRules::ansi();
        let tokens = tokenize("SELECT t.*, s.t.col, t. FROM t", &rules);

        use TokenKind::*;
        assert_eq!(
            significant(&tokens),
            vec![
                (Keyword, "SELECT"),
                (Name, "t.*"),
                (Symbol, ","),
                (Name, "s.t.col"),
                (Symbol, ","),
                (Name, "t."),
                (Keyword, "FROM"),
                (Name, "t"),
            ]
        );
    }

    #[test]
    fn comments() {
        let rules = DialectRules::for_dialect(DialectConfig::MySql);
        let tokens = tokenize("a -- one\n# two\n/* three */ / b", &rules);

        use TokenKind::*;
        assert_eq!(
            significant(&tokens),
            vec![
                (Name, "a"),
                (Comment, "-- one"),
                (Comment, "# two"),
                (Comment, "/* three */"),
                (Symbol, "/"),
                (Name, "b"),
            ]
        );

        let unterminated = tokenize("x /* never closed", &rules);
        assert_eq!(unterminated.last().unwrap().kind, Comment);
        assert_eq!(unterminated.last().unwrap().text, "/* never closed");
    }

    #[test]
    fn quoted_literals_and_identifiers() {
        let rules = DialectRules::for_dialect(DialectConfig::MySql);
        let tokens = tokenize(r"'it''s' 'a\'b' 'c\\' `x``y`", &rules);

        use TokenKind::*;
        assert_eq!(
            significant(&tokens),
            vec![(Value, "'it''s'"), (Value, r"'a\'b'"), (Value, r"'c\\'"), (Name, "`x``y`")]
        );
    }

    #[test]
    fn asymmetric_identifier_quotes() {
        let rules = DialectRules::for_dialect(DialectConfig::MsSql);
        let tokens = tokenize("SELECT [Order Id] FROM [dbo].[Orders]", &rules);

        use TokenKind::*;
        assert_eq!(
            significant(&tokens),
            vec![
                (Keyword, "SELECT"),
                (Name, "[Order Id]"),
                (Keyword, "FROM"),
                (Name, "[dbo]"),
                (Symbol, "."),
                (Name, "[Orders]"),
            ]
        );
    }

    #[test]
    fn unterminated_quote_falls_back_to_symbol() {
        let rules = DialectRules::ansi();
        let tokens = tokenize("SELECT 'abc", &rules);

        use TokenKind::*;
        assert_eq!(
            significant(&tokens),
            vec![(Keyword, "SELECT"), (Symbol, "'"), (Name, "abc")]
        );
    }

    #[test]
    fn two_character_symbols() {
        let rules = DialectRules::ansi();
        let tokens = tokenize("a<>b<=c>=d||e!=f:=g now() <", &rules);
        let symbols: Vec<&str> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Symbol)
            .map(|t| t.text.as_str())
            .collect();

        assert_eq!(symbols, vec!["<>", "<=", ">=", "||", "!=", ":=", "()", "<"]);
    }

    #[test]
    fn semicolon_never_combines() {
        let rules = DialectRules::ansi();
        let tokens = tokenize(";;", &rules);
        assert_eq!(kinds(&tokens), vec![(TokenKind::Symbol, ";"), (TokenKind::Symbol, ";")]);
    }

    #[test]
    fn command_swallows_rest_of_line() {
        let rules = DialectRules::for_dialect(DialectConfig::MySql);
        let tokens = tokenize("delimiter //\nSELECT 1", &rules);
        assert_eq!(tokens[0].kind, TokenKind::Command);
        assert_eq!(tokens[0].text, "delimiter //");
    }

    #[test]
    fn control_characters_are_letters() {
        let rules = DialectRules::ansi();
        let tokens = tokenize("a\u{1}b", &rules);
        assert_eq!(kinds(&tokens), vec![(TokenKind::Name, "a\u{1}b")]);
    }

    #[test]
    fn escaped_closers_stay_inside_quoted_identifiers() {
        let rules = DialectRules::for_dialect(DialectConfig::MySql);
        let tokens = tokenize("`a\\`b` x", &rules);
        assert_eq!(
            significant(&tokens),
            vec![(TokenKind::Name, "`a\\`b`"), (TokenKind::Name, "x")]
        );
    }

    #[test]
    fn non_ascii_letters_form_names() {
        let rules = DialectRules::ansi();
        let tokens = tokenize("SELECT größe FROM tabelle", &rules);
        assert_eq!(tokens[2].kind, TokenKind::Name);
        assert_eq!(tokens[2].text, "größe");
        assert_eq!(tokens[2].start, 7);
    }

    #[test]
    fn statements_split_on_top_level_semicolons() {
        let rules = DialectRules::ansi();
        let text = "SELECT 1; \n SELECT (2;3) ;; -- tail\n";
        let tokens = tokenize(text, &rules);
        let statements = split_statements(&tokens);

        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].slice(text), "SELECT 1");
        assert_eq!(statements[1].slice(text), "SELECT (2;3)");
    }

    #[test]
    fn statement_at_picks_the_enclosing_statement() {
        let rules = DialectRules::ansi();
        let text = "SELECT 1; \n SELECT (2;3) ;; -- tail\n";
        let tokens = tokenize(text, &rules);
        let at = |offset: usize| -> String {
            tokens[statement_at(&tokens, offset)].iter().map(|t| t.text.as_str()).collect()
        };

        assert_eq!(at(0), "SELECT 1");
        // on the separator
        assert_eq!(at(8), "SELECT 1");
        assert_eq!(at(9), " \n SELECT (2;3) ");
        assert_eq!(at(21), " \n SELECT (2;3) ");
        assert_eq!(at(26), "");
        assert_eq!(at(text.len()), " -- tail\n");
    }

    #[test]
    fn comments_are_stripped_without_gluing_tokens() {
        let rules = DialectRules::ansi();
        assert_eq!(strip_comments("SELECT/*x*/a -- c\nFROM t", &rules), "SELECT a \nFROM t");
    }
}
