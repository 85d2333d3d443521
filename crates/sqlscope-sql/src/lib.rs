//! SQL lexical and semantic analysis
//!
//! This crate handles:
//! - Tokenizing SQL text under dialect-specific lexical rules
//! - Building a node model of nested queries with lexical scopes
//! - Propagating data contexts (CTEs, FROM sources, result tuples)
//! - Resolving any cursor offset to its scope, item and symbol origin
//! - Injecting WHERE and ORDER BY clauses into SELECT statements

pub mod interval;
pub mod tokenizer;
pub mod syntax;
pub mod model;
pub mod resolver;
pub mod parser;
pub mod filter;
pub mod rewriter;

pub use interval::Interval;
pub use tokenizer::{split_statements, statement_at, strip_comments, tokenize, Token, TokenKind, Tokenizer};
pub use syntax::{parse_condition, parse_outline, SyntaxTree};
pub use model::{
    analyze, analyze_at, AnalyzedQuery, ConnectionContext, DataContext, LexicalScope, LexicalScopeItem, NodeId,
    OriginKind, QueryNode, SymbolOrigin,
};
pub use resolver::{Resolution, ResolutionSummary, ResolveOptions};
pub use parser::{InterruptFlag, ParseError, ParsePool, ParsedSql, SqlParser, StatementParser};
pub use filter::{CompareOp, FilterCondition, FilterValue, OrderingColumn, Predicate, QueryFilter, SourceAttribute};
pub use rewriter::{RewriteError, StatementRewriter};
