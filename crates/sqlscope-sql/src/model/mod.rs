//! Node model tree, data contexts and lexical scopes

pub mod context;
pub mod node;
mod propagate;
pub mod scope;

pub use context::{
    ColumnType, ConnectionContext, ContextLayer, ContextSummary, DataContext, NamedRowset, ResultColumn,
    RowsSource, RowsSourceKind,
};
pub use node::{build_model, AnalyzedQuery, NodeId, QueryModel, QueryNode};
pub use scope::{ItemRole, LexicalScope, LexicalScopeItem, OriginKind, OriginSummary, SymbolOrigin};

use crate::syntax::{parse_outline, parse_tokens};
use crate::tokenizer::{statement_at, tokenize};
use sqlscope_core::DialectRules;

/// Outline, build and propagate the first statement of `text`
pub fn analyze(
    text: &str,
    rules: &DialectRules,
    root_context: &DataContext,
    connection: ConnectionContext,
) -> AnalyzedQuery {
    build_model(parse_outline(text, rules)).propagate_context(root_context, connection)
}

/// Like [`analyze`], for the statement of a script that contains `offset`
///
/// Offsets in the result stay relative to the whole text.
pub fn analyze_at(
    text: &str,
    offset: usize,
    rules: &DialectRules,
    root_context: &DataContext,
    connection: ConnectionContext,
) -> AnalyzedQuery {
    let tokens = tokenize(text, rules);
    let statement = &tokens[statement_at(&tokens, offset)];
    build_model(parse_tokens(statement, rules)).propagate_context(root_context, connection)
}
