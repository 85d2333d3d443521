//! Recovery-oriented syntax outline
//!
//! The editor needs a tree on every keystroke, including for statements
//! that are half typed. This parser works on the dialect token stream,
//! recognises only the constructs the node model cares about (WITH lists,
//! CTEs, SELECT cores and their clauses, FROM items, subqueries) and never
//! fails: whatever it cannot place is absorbed by the enclosing clause.
//!
//! Symbol references are collected in the same pass.

use crate::interval::Interval;
use crate::tokenizer::{tokenize, Token, TokenKind};
use serde::Serialize;
use sqlscope_core::DialectRules;

const CLAUSE_KEYWORDS: &[&str] = &[
    "FROM", "WHERE", "GROUP", "HAVING", "WINDOW", "QUALIFY", "ORDER", "LIMIT", "OFFSET", "FETCH",
    "FOR", "INTO",
];

const SET_OPERATORS: &[&str] = &["UNION", "INTERSECT", "EXCEPT", "MINUS"];

const JOIN_KEYWORDS: &[&str] = &[
    "JOIN", "INNER", "LEFT", "RIGHT", "FULL", "OUTER", "CROSS", "NATURAL", "STRAIGHT_JOIN", "APPLY",
];

/// Keywords after which a non-query statement names a table
const TABLE_INTRODUCERS: &[&str] = &["FROM", "INTO", "UPDATE", "JOIN", "TABLE"];

/// One segment of a dotted name
///
/// For every part but the first the interval starts at the separator, so a
/// cursor right after `t.` lands on the (possibly empty) member part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamePart {
    pub name: String,
    pub quoted: bool,
    pub interval: Interval,
}

impl NamePart {
    pub fn new(name: impl Into<String>, quoted: bool, interval: Interval) -> Self {
        Self {
            name: name.into(),
            quoted,
            interval,
        }
    }
}

/// What a symbol reference names
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SymbolKind {
    /// Table reference in a FROM list, with its alias
    Table { alias: Option<NamePart> },
    /// Column reference in a value expression
    Column,
    /// Name followed by an argument list
    Function,
    /// Name defined by a WITH list entry
    CteName,
    /// Output name given to a projection item or CTE column
    ColumnAlias,
    /// Alias of a derived table or table function
    DerivedAlias,
}

/// A named reference collected during the outline pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolRef {
    pub kind: SymbolKind,
    pub parts: Vec<NamePart>,
    pub interval: Interval,
}

impl SymbolRef {
    /// Unquoted name parts
    pub fn path(&self) -> Vec<String> {
        self.parts.iter().map(|p| p.name.clone()).collect()
    }

    /// Last name part
    pub fn name(&self) -> &str {
        self.parts.last().map(|p| p.name.as_str()).unwrap_or("")
    }
}

/// Clause regions that become lexical scopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ClauseKind {
    Projection,
    Into,
    From,
    JoinCondition,
    Where,
    GroupBy,
    Having,
    Window,
    Qualify,
    OrderBy,
    Limit,
    /// Whole body of a statement the outline does not model
    Statement,
    /// Stand-alone filter expression
    Condition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Clause {
    pub kind: ClauseKind,
    pub interval: Interval,
}

impl Clause {
    pub fn new(kind: ClauseKind, interval: Interval) -> Self {
        Self { kind, interval }
    }
}

/// One entry of a SELECT list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectionItem {
    pub interval: Interval,
    pub alias: Option<String>,
    /// Path of a plain column reference
    pub column: Option<Vec<String>>,
    /// Qualifier of a wildcard (`t.*`), empty for a bare `*`
    pub wildcard: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StatementKind {
    Query,
    /// Statement introduced by the given (uppercased) word
    Other(String),
    Empty,
    Condition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SyntaxKind {
    Statement(StatementKind),
    With { recursive: bool },
    Cte { name: String, columns: Vec<String> },
    Select { projection: Vec<ProjectionItem> },
    /// Parenthesised query; `derived` when it appears as a FROM item
    Subquery { alias: Option<String>, derived: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyntaxNode {
    pub kind: SyntaxKind,
    pub interval: Interval,
    pub clauses: Vec<Clause>,
    pub children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    fn new(kind: SyntaxKind, interval: Interval) -> Self {
        Self {
            kind,
            interval,
            clauses: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Depth-first pre-order walk
    pub fn walk(&self, visit: &mut dyn FnMut(&SyntaxNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

/// Outline of one statement plus the symbols found in it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyntaxTree {
    pub root: SyntaxNode,
    pub symbols: Vec<SymbolRef>,
}

/// Outline of the first statement in `text`
pub fn parse_outline(text: &str, rules: &DialectRules) -> SyntaxTree {
    let tokens = tokenize(text, rules);
    parse_tokens(&tokens, rules)
}

/// Outline of the first statement in a token slice
pub fn parse_tokens(tokens: &[Token], rules: &DialectRules) -> SyntaxTree {
    let mut parser = OutlineParser::new(tokens, rules);
    let root = parser.parse_statement();
    SyntaxTree {
        root,
        symbols: parser.finish(),
    }
}

/// Outline of a stand-alone condition (the body of a filter box)
pub fn parse_condition(text: &str, rules: &DialectRules) -> SyntaxTree {
    let tokens = tokenize(text, rules);
    let mut parser = OutlineParser::new(&tokens, rules);
    let mut children = Vec::new();

    while parser.peek().is_some() {
        let before = parser.pos;
        parser.parse_region(&mut children, OutlineParser::never);
        if parser.pos == before {
            parser.advance();
        }
    }

    let interval = Interval::new(0, parser.last_end());
    let mut root = SyntaxNode::new(SyntaxKind::Statement(StatementKind::Condition), interval);
    root.clauses.push(Clause::new(ClauseKind::Condition, interval));
    root.children = children;

    SyntaxTree {
        root,
        symbols: parser.finish(),
    }
}

struct OutlineParser<'a> {
    rules: &'a DialectRules,
    tokens: Vec<&'a Token>,
    pos: usize,
    base: usize,
    symbols: Vec<SymbolRef>,
}

impl<'a> OutlineParser<'a> {
    fn new(tokens: &'a [Token], rules: &'a DialectRules) -> Self {
        Self {
            rules,
            tokens: tokens.iter().filter(|t| t.is_significant()).collect(),
            pos: 0,
            base: tokens.first().map(|t| t.start).unwrap_or(0),
            symbols: Vec::new(),
        }
    }

    fn finish(mut self) -> Vec<SymbolRef> {
        self.symbols.sort_by_key(|s| s.interval.start);
        self.symbols
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos).copied()
    }

    fn peek_nth(&self, n: usize) -> Option<&'a Token> {
        self.tokens.get(self.pos + n).copied()
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn start_offset(&self) -> usize {
        self.peek().map(|t| t.start).unwrap_or_else(|| self.last_end())
    }

    fn last_end(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|t| t.end())
            .unwrap_or(self.base)
    }

    fn at_keyword(&self, word: &str) -> bool {
        self.peek()
            .is_some_and(|t| t.kind == TokenKind::Keyword && t.text.eq_ignore_ascii_case(word))
    }

    fn at_any_keyword(&self, words: &[&str]) -> bool {
        words.iter().any(|w| self.at_keyword(w))
    }

    fn at_word(&self, word: &str) -> bool {
        self.peek().is_some_and(|t| t.is_word(word))
    }

    fn at_symbol(&self, symbol: &str) -> bool {
        self.peek().is_some_and(|t| t.is_symbol(symbol))
    }

    fn at_open(&self) -> bool {
        self.at_symbol("(") || self.at_symbol("()")
    }

    fn at_statement_end(&self) -> bool {
        self.peek().map_or(true, |t| t.is_symbol(";"))
    }

    fn at_set_operator(&self) -> bool {
        self.at_any_keyword(SET_OPERATORS)
    }

    fn subquery_follows(&self) -> bool {
        self.at_symbol("(")
            && self.peek_nth(1).is_some_and(|t| {
                t.kind == TokenKind::Keyword
                    && (t.text.eq_ignore_ascii_case("SELECT") || t.text.eq_ignore_ascii_case("WITH"))
            })
    }

    fn after_within(&self) -> bool {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .is_some_and(|t| t.is_word("WITHIN"))
    }

    fn clause_kind(&self) -> Option<ClauseKind> {
        let token = self.peek()?;
        if token.kind != TokenKind::Keyword {
            return None;
        }

        let kind = match token.text.to_ascii_uppercase().as_str() {
            "FROM" => ClauseKind::From,
            "INTO" => ClauseKind::Into,
            "WHERE" => ClauseKind::Where,
            "GROUP" if !self.after_within() => ClauseKind::GroupBy,
            "HAVING" => ClauseKind::Having,
            "WINDOW" => ClauseKind::Window,
            "QUALIFY" => ClauseKind::Qualify,
            "ORDER" => ClauseKind::OrderBy,
            "LIMIT" | "OFFSET" | "FETCH" | "FOR" => ClauseKind::Limit,
            _ => return None,
        };
        Some(kind)
    }

    fn at_clause_boundary(&self) -> bool {
        self.at_statement_end()
            || self.at_symbol(")")
            || self.at_set_operator()
            || (self.at_any_keyword(CLAUSE_KEYWORDS) && self.clause_kind().is_some())
    }

    fn at_item_boundary(&self) -> bool {
        self.at_symbol(",") || self.at_clause_boundary()
    }

    fn at_join_condition_end(&self) -> bool {
        self.at_clause_boundary() || self.at_symbol(",") || self.at_any_keyword(JOIN_KEYWORDS)
    }

    fn at_other_boundary(&self) -> bool {
        self.at_keyword("SELECT") || self.at_keyword("WITH") || self.at_any_keyword(TABLE_INTRODUCERS)
    }

    fn never(&self) -> bool {
        false
    }

    fn is_simple_name(&self, token: &Token) -> bool {
        if token.kind != TokenKind::Name {
            return false;
        }
        let (_, quoted) = self.rules.unquote(&token.text);
        quoted || !token.text.chars().any(|c| self.rules.is_separator(c))
    }

    fn parse_statement(&mut self) -> SyntaxNode {
        if self.at_statement_end() {
            let at = self.start_offset();
            let mut root = SyntaxNode::new(SyntaxKind::Statement(StatementKind::Empty), Interval::empty_at(at));
            root.clauses.push(Clause::new(ClauseKind::Statement, Interval::empty_at(at)));
            return root;
        }

        let start = self.start_offset();
        let mut children = Vec::new();

        let kind = if self.at_keyword("WITH") || self.at_keyword("SELECT") || self.subquery_follows() {
            self.parse_query_into(&mut children);
            while !self.at_statement_end() {
                let before = self.pos;
                self.parse_region(&mut children, Self::never);
                if self.pos == before {
                    self.advance();
                }
            }
            StatementKind::Query
        } else {
            let keyword = self.peek().map(|t| t.text.to_ascii_uppercase()).unwrap_or_default();
            self.parse_other(&mut children);
            StatementKind::Other(keyword)
        };

        let interval = Interval::new(start, self.last_end().max(start));
        let mut root = SyntaxNode::new(SyntaxKind::Statement(kind.clone()), interval);
        if matches!(kind, StatementKind::Other(_)) {
            root.clauses.push(Clause::new(ClauseKind::Statement, interval));
        }
        root.children = children;
        root
    }

    fn parse_other(&mut self, children: &mut Vec<SyntaxNode>) {
        while !self.at_statement_end() {
            if self.at_keyword("SELECT") || self.at_keyword("WITH") {
                self.parse_query_into(children);
            } else if self.at_any_keyword(TABLE_INTRODUCERS) {
                self.advance();
                if self.peek().is_some_and(|t| t.kind == TokenKind::Name) {
                    let (parts, interval) = self.read_path();
                    let alias = if self.at_open() {
                        self.parse_parenthesized(children);
                        None
                    } else {
                        self.parse_alias_part()
                    };
                    self.symbols.push(SymbolRef {
                        kind: SymbolKind::Table { alias },
                        parts,
                        interval,
                    });
                }
            } else {
                let before = self.pos;
                self.parse_region(children, Self::at_other_boundary);
                if self.pos == before {
                    self.advance();
                }
            }
        }
    }

    fn parse_query_into(&mut self, children: &mut Vec<SyntaxNode>) {
        if self.at_keyword("WITH") {
            children.push(self.parse_with());
        }
        self.parse_query_body(children);
    }

    fn parse_query_body(&mut self, children: &mut Vec<SyntaxNode>) {
        loop {
            if self.at_keyword("SELECT") {
                children.push(self.parse_select());
            } else if self.subquery_follows() {
                children.push(self.parse_subquery(false));
            } else {
                break;
            }

            if !self.at_set_operator() {
                break;
            }
            self.advance();
            if self.at_keyword("ALL") || self.at_keyword("DISTINCT") {
                self.advance();
            }
        }
    }

    fn parse_with(&mut self) -> SyntaxNode {
        let start = self.start_offset();
        self.advance();

        let recursive = self.at_word("RECURSIVE");
        if recursive {
            self.advance();
        }

        let mut children = Vec::new();
        while self.peek().is_some_and(|t| t.kind == TokenKind::Name) {
            children.push(self.parse_cte());
            if !self.at_symbol(",") {
                break;
            }
            self.advance();
        }

        let mut node = SyntaxNode::new(SyntaxKind::With { recursive }, Interval::new(start, self.last_end()));
        node.children = children;
        node
    }

    fn parse_cte(&mut self) -> SyntaxNode {
        let start = self.start_offset();
        let mut name = String::new();

        if let Some(token) = self.advance() {
            let (unquoted, quoted) = self.rules.unquote(&token.text);
            name = unquoted.clone();
            self.symbols.push(SymbolRef {
                kind: SymbolKind::CteName,
                parts: vec![NamePart::new(unquoted, quoted, token.interval())],
                interval: token.interval(),
            });
        }

        let mut columns = Vec::new();
        if self.at_symbol("(") {
            self.advance();
            while let Some(token) = self.peek() {
                if token.is_symbol(")") {
                    self.advance();
                    break;
                }
                if token.is_symbol(";") {
                    break;
                }
                if token.kind == TokenKind::Name {
                    let (column, quoted) = self.rules.unquote(&token.text);
                    columns.push(column.clone());
                    self.symbols.push(SymbolRef {
                        kind: SymbolKind::ColumnAlias,
                        parts: vec![NamePart::new(column, quoted, token.interval())],
                        interval: token.interval(),
                    });
                }
                self.advance();
            }
        } else if self.at_symbol("()") {
            self.advance();
        }

        if self.at_keyword("AS") {
            self.advance();
        }
        if self.at_keyword("NOT") {
            self.advance();
        }
        if self.at_word("MATERIALIZED") {
            self.advance();
        }

        let mut children = Vec::new();
        if self.at_symbol("(") {
            self.advance();
            self.parse_query_into(&mut children);
            self.parse_region(&mut children, Self::never);
            if self.at_symbol(")") {
                self.advance();
            }
        } else if self.at_symbol("()") {
            self.advance();
        }

        let interval = Interval::new(start, self.last_end().max(start));
        let mut node = SyntaxNode::new(SyntaxKind::Cte { name, columns }, interval);
        node.children = children;
        node
    }

    fn parse_subquery(&mut self, derived: bool) -> SyntaxNode {
        let start = self.start_offset();
        self.advance();

        let mut children = Vec::new();
        self.parse_query_into(&mut children);
        self.parse_region(&mut children, Self::never);
        if self.at_symbol(")") {
            self.advance();
        }

        let interval = Interval::new(start, self.last_end().max(start));
        let mut node = SyntaxNode::new(SyntaxKind::Subquery { alias: None, derived }, interval);
        node.children = children;
        node
    }

    fn parse_select(&mut self) -> SyntaxNode {
        let start = self.start_offset();
        self.advance();

        let mut children = Vec::new();
        let mut clauses = vec![Clause::new(ClauseKind::Projection, Interval::empty_at(start))];

        self.skip_select_modifiers(&mut children);
        let projection = self.parse_projection(&mut children);

        while !self.at_statement_end() && !self.at_symbol(")") && !self.at_set_operator() {
            let clause_start = self.start_offset();
            match self.clause_kind() {
                Some(ClauseKind::From) => {
                    self.advance();
                    clauses.push(Clause::new(ClauseKind::From, Interval::empty_at(clause_start)));
                    self.parse_from_list(&mut clauses, &mut children);
                }
                Some(kind) => {
                    self.advance();
                    if matches!(kind, ClauseKind::GroupBy | ClauseKind::OrderBy) && self.at_keyword("BY") {
                        self.advance();
                    }
                    clauses.push(Clause::new(kind, Interval::empty_at(clause_start)));
                    self.parse_region(&mut children, Self::at_clause_boundary);
                }
                None => {
                    // stray token, kept in the current clause
                    let before = self.pos;
                    self.parse_region(&mut children, Self::at_clause_boundary);
                    if self.pos == before {
                        self.advance();
                    }
                }
            }
        }

        let end = self.last_end().max(start);
        close_clauses(&mut clauses, end);

        let mut node = SyntaxNode::new(SyntaxKind::Select { projection }, Interval::new(start, end));
        node.clauses = clauses;
        node.children = children;
        node
    }

    fn skip_select_modifiers(&mut self, children: &mut Vec<SyntaxNode>) {
        loop {
            if self.at_keyword("DISTINCT") {
                self.advance();
                if self.at_keyword("ON") && self.peek_nth(1).is_some_and(|t| t.is_symbol("(")) {
                    self.advance();
                    self.parse_parenthesized(children);
                }
            } else if self.at_keyword("ALL") {
                self.advance();
            } else if self.at_keyword("TOP") {
                self.advance();
                if self.at_open() {
                    self.parse_parenthesized(children);
                } else if self.peek().is_some_and(|t| t.kind == TokenKind::Value) {
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    fn parse_projection(&mut self, children: &mut Vec<SyntaxNode>) -> Vec<ProjectionItem> {
        let mut items = Vec::new();

        loop {
            if self.at_clause_boundary() {
                break;
            }

            let first_token = self.pos;
            let first_symbol = self.symbols.len();
            self.parse_region(children, Self::at_item_boundary);
            if self.pos > first_token {
                items.push(self.projection_item(first_token, self.pos, first_symbol));
            }

            if !self.at_symbol(",") {
                break;
            }
            self.advance();
        }

        items
    }

    fn projection_item(&mut self, from: usize, to: usize, first_symbol: usize) -> ProjectionItem {
        let tokens: Vec<&Token> = self.tokens[from..to].to_vec();
        let n = tokens.len();
        let interval = Interval::new(tokens[0].start, tokens[n - 1].end());

        let mut expr_len = n;
        let mut alias_token = None;
        if n >= 2 && self.is_simple_name(tokens[n - 1]) {
            let prev = tokens[n - 2];
            if prev.is_word("AS") {
                alias_token = Some(tokens[n - 1]);
                expr_len = n - 2;
            } else if ends_value(prev) {
                alias_token = Some(tokens[n - 1]);
                expr_len = n - 1;
            }
        }

        let mut alias = None;
        if let Some(token) = alias_token {
            // the region scan took the alias for a column reference
            if let Some(symbol) = self.symbols[first_symbol..]
                .iter_mut()
                .rev()
                .find(|s| s.interval == token.interval())
            {
                symbol.kind = SymbolKind::ColumnAlias;
            }
            alias = Some(self.rules.unquote(&token.text).0);
        }

        let mut column = None;
        let mut wildcard = None;
        let expr = &tokens[..expr_len];
        if expr.len() == 1 && expr[0].is_symbol("*") {
            wildcard = Some(Vec::new());
        } else if let (Some(first), Some(last)) = (expr.first(), expr.last()) {
            let expr_interval = Interval::new(first.start, last.end());
            let reference = self.symbols[first_symbol..]
                .iter()
                .find(|s| s.kind == SymbolKind::Column && s.interval == expr_interval);

            if let Some(reference) = reference {
                let mut path = reference.path();
                if path.last().is_some_and(|p| p == "*") {
                    path.pop();
                    wildcard = Some(path);
                } else {
                    column = Some(path);
                }
            }
        }

        ProjectionItem {
            interval,
            alias,
            column,
            wildcard,
        }
    }

    fn parse_from_list(&mut self, clauses: &mut Vec<Clause>, children: &mut Vec<SyntaxNode>) {
        while let Some(token) = self.peek() {
            if self.at_clause_boundary() {
                break;
            }

            if token.is_symbol(",") || self.at_any_keyword(JOIN_KEYWORDS) || self.at_keyword("LATERAL") {
                self.advance();
            } else if self.at_keyword("ON") {
                self.advance();
                self.parse_region(children, Self::at_join_condition_end);
                let end = self.peek().map_or_else(|| self.last_end(), |t| t.start);
                clauses.push(Clause::new(ClauseKind::JoinCondition, Interval::new(token.start, end.max(token.end()))));
            } else if self.at_keyword("USING") {
                self.advance();
                if self.at_open() {
                    self.parse_parenthesized(children);
                }
            } else {
                let before = self.pos;
                self.parse_table_item(clauses, children);
                if self.pos == before {
                    self.advance();
                }
            }
        }
    }

    fn parse_table_item(&mut self, clauses: &mut Vec<Clause>, children: &mut Vec<SyntaxNode>) {
        let Some(token) = self.peek() else {
            return;
        };

        if token.is_symbol("(") {
            if self.subquery_follows() {
                let mut node = self.parse_subquery(true);
                let alias = self.parse_derived_alias();
                if let SyntaxKind::Subquery { alias: slot, .. } = &mut node.kind {
                    *slot = alias;
                }
                children.push(node);
            } else {
                // parenthesised join group
                self.advance();
                self.parse_from_list(clauses, children);
                if self.at_symbol(")") {
                    self.advance();
                }
                self.parse_derived_alias();
            }
        } else if token.kind == TokenKind::Name {
            let (parts, interval) = self.read_path();
            if self.at_open() {
                self.symbols.push(SymbolRef {
                    kind: SymbolKind::Function,
                    parts,
                    interval,
                });
                self.parse_parenthesized(children);
                self.parse_derived_alias();
            } else {
                let alias = self.parse_alias_part();
                self.symbols.push(SymbolRef {
                    kind: SymbolKind::Table { alias },
                    parts,
                    interval,
                });
            }
        }
    }

    fn parse_alias_part(&mut self) -> Option<NamePart> {
        let explicit = self.at_keyword("AS");
        let candidate = if explicit { self.peek_nth(1) } else { self.peek() };

        match candidate {
            Some(token) if self.is_simple_name(token) => {
                if explicit {
                    self.advance();
                }
                self.advance();
                let (name, quoted) = self.rules.unquote(&token.text);
                Some(NamePart::new(name, quoted, token.interval()))
            }
            _ => {
                if explicit {
                    self.advance();
                }
                None
            }
        }
    }

    fn parse_derived_alias(&mut self) -> Option<String> {
        let part = self.parse_alias_part()?;
        self.symbols.push(SymbolRef {
            kind: SymbolKind::DerivedAlias,
            parts: vec![part.clone()],
            interval: part.interval,
        });
        if self.at_open() {
            self.skip_balanced();
        }
        Some(part.name)
    }

    fn parse_parenthesized(&mut self, children: &mut Vec<SyntaxNode>) {
        if self.at_symbol("()") {
            self.advance();
            return;
        }
        if !self.at_symbol("(") {
            return;
        }

        self.advance();
        self.parse_region(children, Self::never);
        if self.at_symbol(")") {
            self.advance();
        }
    }

    fn skip_balanced(&mut self) {
        if self.at_symbol("()") {
            self.advance();
            return;
        }

        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            if token.is_symbol(";") {
                break;
            }
            self.advance();
            if token.is_symbol("(") {
                depth += 1;
            } else if token.is_symbol(")") {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    break;
                }
            }
        }
    }

    /// Scan a value-expression region, recording references and nested
    /// subqueries, until `stop` holds at parenthesis depth zero
    fn parse_region(&mut self, children: &mut Vec<SyntaxNode>, stop: fn(&Self) -> bool) {
        let mut depth = 0usize;

        while let Some(token) = self.peek() {
            if token.is_symbol(";") || (depth == 0 && stop(self)) {
                break;
            }

            if token.is_symbol("(") {
                if self.subquery_follows() {
                    children.push(self.parse_subquery(false));
                    continue;
                }
                depth += 1;
            } else if token.is_symbol(")") {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            } else if token.kind == TokenKind::Name {
                self.parse_reference();
                continue;
            }

            self.advance();
        }
    }

    fn parse_reference(&mut self) {
        let (parts, interval) = self.read_path();
        let kind = if self.at_open() {
            SymbolKind::Function
        } else {
            SymbolKind::Column
        };
        self.symbols.push(SymbolRef { kind, parts, interval });
    }

    /// Read a dotted name made of adjacent tokens (`a.b`, `"s".t`, `[x].[y]`, `t.*`)
    fn read_path(&mut self) -> (Vec<NamePart>, Interval) {
        let Some(first) = self.advance() else {
            return (Vec::new(), Interval::empty_at(self.last_end()));
        };

        let mut parts = Vec::new();
        self.split_name(first, None, &mut parts);
        let mut end = first.end();

        while let Some(next) = self.peek() {
            if next.start != end {
                break;
            }

            let trailing_separator = parts.last().is_some_and(|p| p.name.is_empty() && !p.quoted);
            if next.kind == TokenKind::Symbol
                && next.text.starts_with(self.rules.struct_separator)
                && !trailing_separator
            {
                self.advance();
                let member = if next.text.len() > 1 { "*" } else { "" };
                parts.push(NamePart::new(member, false, next.interval()));
                end = next.end();
            } else if next.kind == TokenKind::Name && trailing_separator {
                self.advance();
                let lead = parts.pop().map(|p| p.interval.start);
                self.split_name(next, lead, &mut parts);
                end = next.end();
            } else {
                break;
            }
        }

        (parts, Interval::new(first.start, end))
    }

    fn split_name(&self, token: &Token, lead: Option<usize>, parts: &mut Vec<NamePart>) {
        let (unquoted, quoted) = self.rules.unquote(&token.text);
        if quoted {
            let interval = Interval::new(lead.unwrap_or(token.start), token.end());
            parts.push(NamePart::new(unquoted, true, interval));
            return;
        }

        let mut part_start = lead.unwrap_or(token.start);
        let mut name_from = 0;
        for (idx, c) in token.text.char_indices() {
            if self.rules.is_separator(c) {
                let at = token.start + idx;
                parts.push(NamePart::new(&token.text[name_from..idx], false, Interval::new(part_start, at)));
                part_start = at;
                name_from = idx + c.len_utf8();
            }
        }
        parts.push(NamePart::new(&token.text[name_from..], false, Interval::new(part_start, token.end())));
    }
}

/// Token that can end a value expression, so a following bare name is an alias
fn ends_value(token: &Token) -> bool {
    matches!(token.kind, TokenKind::Name | TokenKind::Value)
        || token.is_symbol(")")
        || token.is_symbol("()")
        || token.is_word("END")
}

/// Top-level clauses run up to the next one; the last runs to `end`
fn close_clauses(clauses: &mut [Clause], end: usize) {
    let top: Vec<usize> = clauses
        .iter()
        .enumerate()
        .filter(|(_, c)| c.kind != ClauseKind::JoinCondition)
        .map(|(i, _)| i)
        .collect();

    for pair in top.windows(2) {
        let next_start = clauses[pair[1]].interval.start;
        clauses[pair[0]].interval = Interval::new(clauses[pair[0]].interval.start, next_start);
    }
    if let Some(&last) = top.last() {
        let start = clauses[last].interval.start;
        clauses[last].interval = Interval::new(start, end.max(start));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sqlscope_core::{DialectConfig, DialectRules};

    fn symbols_of(tree: &SyntaxTree, pred: impl Fn(&SymbolKind) -> bool) -> Vec<String> {
        tree.symbols
            .iter()
            .filter(|s| pred(&s.kind))
            .map(|s| s.path().join("."))
            .collect()
    }

    fn clause_kinds(node: &SyntaxNode) -> Vec<ClauseKind> {
        node.clauses.iter().map(|c| c.kind).collect()
    }

    #[test]
    fn select_with_cte() {
        let rules = DialectRules::ansi();
        let tree = parse_outline("WITH recent AS (SELECT id FROM orders) SELECT r.id FROM recent r", &rules);

        assert_eq!(tree.root.kind, SyntaxKind::Statement(StatementKind::Query));
        assert_eq!(tree.root.children.len(), 2);

        let with = &tree.root.children[0];
        assert_eq!(with.kind, SyntaxKind::With { recursive: false });
        assert_eq!(
            with.children[0].kind,
            SyntaxKind::Cte {
                name: "recent".to_string(),
                columns: Vec::new()
            }
        );
        assert!(matches!(with.children[0].children[0].kind, SyntaxKind::Select { .. }));

        assert_eq!(symbols_of(&tree, |k| *k == SymbolKind::CteName), vec!["recent"]);
        assert_eq!(
            symbols_of(&tree, |k| matches!(k, SymbolKind::Table { .. })),
            vec!["orders", "recent"]
        );
        assert_eq!(symbols_of(&tree, |k| *k == SymbolKind::Column), vec!["id", "r.id"]);
    }

    #[test]
    fn clauses_cover_the_select() {
        let rules = DialectRules::ansi();
        let text = "SELECT a FROM t JOIN u ON t.id = u.id WHERE a > 1 GROUP BY a ORDER BY a LIMIT 5";
        let tree = parse_outline(text, &rules);
        let select = &tree.root.children[0];

        assert_eq!(
            clause_kinds(select),
            vec![
                ClauseKind::Projection,
                ClauseKind::From,
                ClauseKind::JoinCondition,
                ClauseKind::Where,
                ClauseKind::GroupBy,
                ClauseKind::OrderBy,
                ClauseKind::Limit,
            ]
        );

        assert_eq!(select.clauses[0].interval.slice(text), "SELECT a ");
        assert_eq!(select.clauses[2].interval.slice(text), "ON t.id = u.id ");
        assert_eq!(select.clauses[6].interval.slice(text), "LIMIT 5");
        assert_eq!(select.interval, Interval::new(0, text.len()));
    }

    #[test]
    fn table_aliases() {
        let rules = DialectRules::ansi();
        let tree = parse_outline("SELECT * FROM orders o, customers AS c", &rules);

        let aliases: Vec<Option<String>> = tree
            .symbols
            .iter()
            .filter_map(|s| match &s.kind {
                SymbolKind::Table { alias } => Some(alias.as_ref().map(|a| a.name.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(aliases, vec![Some("o".to_string()), Some("c".to_string())]);
    }

    #[test]
    fn projection_items() {
        let rules = DialectRules::ansi();
        let tree = parse_outline("SELECT t.*, a, b AS bee, count(*) n, * FROM t", &rules);

        let SyntaxKind::Select { projection } = &tree.root.children[0].kind else {
            panic!("expected select");
        };

        assert_eq!(projection.len(), 5);
        assert_eq!(projection[0].wildcard, Some(vec!["t".to_string()]));
        assert_eq!(projection[1].column, Some(vec!["a".to_string()]));
        assert_eq!(projection[2].alias.as_deref(), Some("bee"));
        assert_eq!(projection[2].column, Some(vec!["b".to_string()]));
        assert_eq!(projection[3].alias.as_deref(), Some("n"));
        assert_eq!(projection[3].column, None);
        assert_eq!(projection[4].wildcard, Some(Vec::new()));

        assert_eq!(symbols_of(&tree, |k| *k == SymbolKind::ColumnAlias), vec!["bee", "n"]);
        assert_eq!(symbols_of(&tree, |k| *k == SymbolKind::Function), vec!["count"]);
    }

    #[test]
    fn derived_tables_and_expression_subqueries() {
        let rules = DialectRules::ansi();
        let text = "SELECT x.a FROM (SELECT a FROM t) x WHERE x.a IN (SELECT b FROM u)";
        let tree = parse_outline(text, &rules);
        let select = &tree.root.children[0];

        assert_eq!(select.children.len(), 2);
        assert_eq!(
            select.children[0].kind,
            SyntaxKind::Subquery {
                alias: Some("x".to_string()),
                derived: true
            }
        );
        assert_eq!(select.children[0].interval.slice(text), "(SELECT a FROM t)");
        assert_eq!(
            select.children[1].kind,
            SyntaxKind::Subquery {
                alias: None,
                derived: false
            }
        );
    }

    #[test]
    fn member_parts_start_at_the_separator() {
        let rules = DialectRules::ansi();
        let text = "SELECT s.t.col, t. FROM t";
        let tree = parse_outline(text, &rules);

        let full = &tree.symbols[0];
        assert_eq!(full.path(), vec!["s", "t", "col"]);
        assert_eq!(full.parts[1].interval.slice(text), ".t");
        assert_eq!(full.parts[2].interval.slice(text), ".col");

        let partial = &tree.symbols[1];
        assert_eq!(partial.path(), vec!["t", ""]);
        assert_eq!(partial.parts[1].interval.slice(text), ".");
    }

    #[test]
    fn quoted_paths_join_adjacent_tokens() {
        let rules = DialectRules::for_dialect(DialectConfig::MsSql);
        let text = "SELECT o.[Order Id] FROM [dbo].[Orders] o";
        let tree = parse_outline(text, &rules);

        let table = tree
            .symbols
            .iter()
            .find(|s| matches!(s.kind, SymbolKind::Table { .. }))
            .unwrap();
        assert_eq!(table.path(), vec!["dbo", "Orders"]);
        assert!(table.parts[1].quoted);
        assert_eq!(table.parts[1].interval.slice(text), ".[Orders]");

        let column = tree.symbols.iter().find(|s| s.kind == SymbolKind::Column).unwrap();
        assert_eq!(column.path(), vec!["o", "Order Id"]);
    }

    #[test]
    fn other_statements_collect_tables() {
        let rules = DialectRules::ansi();
        let tree = parse_outline("UPDATE orders SET status = 'x' WHERE id = 1", &rules);

        assert_eq!(tree.root.kind, SyntaxKind::Statement(StatementKind::Other("UPDATE".to_string())));
        assert_eq!(clause_kinds(&tree.root), vec![ClauseKind::Statement]);
        assert_eq!(symbols_of(&tree, |k| matches!(k, SymbolKind::Table { .. })), vec!["orders"]);
    }

    #[test]
    fn malformed_input_never_panics() {
        let rules = DialectRules::ansi();
        for text in [
            "",
            "   ",
            ";",
            "SELECT",
            "SELECT a, FROM",
            "SELECT (",
            "(((",
            ")))",
            "SELECT * FROM (SELECT",
            "WITH",
            "WITH x AS (",
            "SELECT a FROM t WHERE (b",
            "SELECT CASE WHEN a THEN b END c FROM t t2 JOIN ON",
            "SELECT a FROM t UNION",
        ] {
            let tree = parse_outline(text, &rules);
            tree.root.walk(&mut |node| {
                for child in &node.children {
                    assert!(node.interval.covers(&child.interval), "{text:?}: {node:?}");
                }
            });
        }
    }

    #[test]
    fn condition_fragment() {
        let rules = DialectRules::ansi();
        let tree = parse_condition("status = 'open' AND total > ", &rules);

        assert_eq!(tree.root.kind, SyntaxKind::Statement(StatementKind::Condition));
        assert_eq!(clause_kinds(&tree.root), vec![ClauseKind::Condition]);
        assert_eq!(symbols_of(&tree, |k| *k == SymbolKind::Column), vec!["status", "total"]);
    }
}
