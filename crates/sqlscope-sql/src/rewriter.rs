//! Statement rewriter
//!
//! Injects filter conditions into the WHERE clause and sort columns into
//! the ORDER BY clause of a single SELECT statement. The statement is
//! parsed on the timeout-guarded pool, mutated as an AST, and by default
//! only the rewritten clauses are spliced back into the original text.

use crate::filter::{OrderingColumn, QueryFilter, SourceAttribute};
use crate::parser::{ParseError, ParsePool, SqlParser};
use crate::tokenizer::{strip_comments, tokenize, Token, TokenKind};
use sqlparser::ast::{BinaryOperator, Expr, OrderBy, OrderByExpr, Query, SetExpr, Statement, TableFactor, TableWithJoins};
use sqlparser::dialect::Dialect;
use sqlparser::parser::{Parser, ParserError};
use sqlparser::tokenizer::Token as SqlToken;
use sqlscope_core::{Config, DialectRules, RewriterConfig};
use std::time::Duration;

/// Reasons a filter could not be injected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RewriteError {
    #[error("statement parse timed out after {0:?}")]
    ParseTimeout(Duration),

    #[error("failed to parse statement: {0}")]
    ParseError(String),

    #[error("'{0}' does not match any table in the FROM clause")]
    UnresolvedTableReference(String),

    #[error("unsupported statement: {0}")]
    UnsupportedStatementShape(String),

    #[error("invalid ordering: {0}")]
    InvalidOrdering(String),

    #[error("value {0} has no SQL literal")]
    UnrepresentableValue(String),

    #[error("parse pool is closed")]
    PoolClosed,

    #[error("failed to start parse pool: {0}")]
    PoolStartup(String),
}

impl From<ParseError> for RewriteError {
    fn from(error: ParseError) -> Self {
        match error {
            ParseError::Timeout(timeout) => RewriteError::ParseTimeout(timeout),
            ParseError::Syntax(message) => RewriteError::ParseError(message),
            ParseError::Interrupted => RewriteError::ParseError(error.to_string()),
            ParseError::PoolClosed => RewriteError::PoolClosed,
        }
    }
}

/// A FROM item a condition can be attached to
#[derive(Debug, Clone)]
struct SourceRef {
    /// Unquoted name parts; empty for derived tables
    name: Vec<String>,
    alias: Option<String>,
    /// How the source is referenced in column qualifiers, quoting kept
    qualifier: String,
}

impl SourceRef {
    fn matches(&self, entity: &str) -> bool {
        self.alias.as_deref() == Some(entity) || self.name.last().map(String::as_str) == Some(entity)
    }
}

pub struct StatementRewriter {
    rules: DialectRules,
    parser: SqlParser,
    pool: ParsePool,
    preserve_formatting: bool,
}

impl StatementRewriter {
    pub fn new(rules: DialectRules, config: &RewriterConfig) -> Result<Self, RewriteError> {
        let parser = SqlParser::from_dialect(&rules.dialect);
        let pool = ParsePool::new(parser, config).map_err(|e| RewriteError::PoolStartup(e.to_string()))?;
        Ok(Self::with_pool(rules, pool, config.preserve_formatting))
    }

    pub fn from_config(config: &Config) -> Result<Self, RewriteError> {
        Self::new(config.dialect_rules(), &config.rewriter)
    }

    /// Rewriter on an existing pool
    pub fn with_pool(rules: DialectRules, pool: ParsePool, preserve_formatting: bool) -> Self {
        Self {
            parser: SqlParser::from_dialect(&rules.dialect),
            rules,
            pool,
            preserve_formatting,
        }
    }

    pub fn rules(&self) -> &DialectRules {
        &self.rules
    }

    /// Add the filter's conditions and orderings to `sql`
    pub fn inject_filter(&self, sql: &str, filter: &QueryFilter) -> Result<String, RewriteError> {
        let result = self.rewrite(sql, filter);

        match &result {
            Ok(rewritten) => tracing::debug!(
                conditions = filter.conditions.len(),
                orderings = filter.orderings.len(),
                bytes = rewritten.len(),
                "Injected filter"
            ),
            Err(error) => tracing::warn!(%error, "Filter injection aborted"),
        }

        result
    }

    fn rewrite(&self, sql: &str, filter: &QueryFilter) -> Result<String, RewriteError> {
        let text = self.prepare(sql);
        let mut statements = self.pool.parse(&text)?.statements;

        if statements.len() != 1 {
            return Err(RewriteError::UnsupportedStatementShape(format!(
                "expected a single statement, found {}",
                statements.len()
            )));
        }
        let mut statement = statements.remove(0);

        let Statement::Query(query) = &mut statement else {
            return Err(RewriteError::UnsupportedStatementShape(
                "only SELECT queries can be filtered".to_string(),
            ));
        };

        let dialect = self.parser.dialect();
        let (where_clause, order_clause) = self.apply(query, filter, &*dialect)?;

        if !self.preserve_formatting {
            return Ok(statement.to_string());
        }

        Ok(splice(&text, &self.rules, where_clause, order_clause))
    }

    /// Comment-free text without trailing semicolons
    fn prepare(&self, sql: &str) -> String {
        let stripped = strip_comments(sql, &self.rules);
        let mut text = stripped.trim();
        while let Some(rest) = text.strip_suffix(';') {
            text = rest.trim_end();
        }
        text.to_string()
    }

    /// Mutate the query; returns the re-rendered WHERE condition and ORDER BY
    /// list, when they changed
    fn apply(
        &self,
        query: &mut Query,
        filter: &QueryFilter,
        dialect: &dyn Dialect,
    ) -> Result<(Option<String>, Option<String>), RewriteError> {
        let SetExpr::Select(select) = query.body.as_mut() else {
            return Err(RewriteError::UnsupportedStatementShape(
                "query body must be a plain SELECT".to_string(),
            ));
        };

        let sources = collect_sources(&select.from);

        let mut where_clause = None;
        if !filter.conditions.is_empty() {
            let mut selection = select.selection.take().map(|existing| match existing {
                Expr::Nested(_) => existing,
                other => Expr::Nested(Box::new(other)),
            });

            for condition in &filter.conditions {
                if let Some(value) = condition.predicate.values().into_iter().find(|v| !v.is_representable()) {
                    return Err(RewriteError::UnrepresentableValue(format!("{value:?}")));
                }

                let column = self.column_text(&condition.attribute, &sources)?;
                let text = format!("{column} {}", condition.predicate.render(&self.rules));
                let expr = guard_precedence(parse_fragment(dialect, &text, |p| p.parse_expr())?);

                selection = Some(match selection {
                    Some(acc) => Expr::BinaryOp {
                        left: Box::new(acc),
                        op: BinaryOperator::And,
                        right: Box::new(expr),
                    },
                    None => expr,
                });
            }

            select.selection = selection;
            where_clause = select.selection.as_ref().map(ToString::to_string);
        }

        let mut additions: Vec<OrderByExpr> = Vec::new();
        for ordering in &filter.orderings {
            let text = self.ordering_text(ordering, &sources, &filter.result_columns)?;
            additions.push(parse_fragment(dialect, &text, |p| p.parse_order_by_expr())?);
        }
        if let Some(expression) = filter.order_expression.as_deref().map(str::trim) {
            if !expression.is_empty() {
                additions.extend(parse_fragment(dialect, expression, |p| {
                    p.parse_comma_separated(Parser::parse_order_by_expr)
                })?);
            }
        }

        let mut order_clause = None;
        if !additions.is_empty() {
            let order_by = query.order_by.get_or_insert_with(|| OrderBy {
                exprs: Vec::new(),
                interpolate: None,
            });
            order_by.exprs.extend(additions);

            let rendered: Vec<String> = order_by.exprs.iter().map(ToString::to_string).collect();
            order_clause = Some(rendered.join(", "));
        }

        Ok((where_clause, order_clause))
    }

    fn owner<'s>(&self, attribute: &SourceAttribute, sources: &'s [SourceRef]) -> Option<&'s SourceRef> {
        match &attribute.entity {
            Some(entity) => sources.iter().find(|s| s.matches(entity)),
            None if sources.len() == 1 => sources.first(),
            None => None,
        }
    }

    /// Column reference for a condition, qualified when several sources exist
    fn column_text(&self, attribute: &SourceAttribute, sources: &[SourceRef]) -> Result<String, RewriteError> {
        let column = self.rules.quote_identifier(&attribute.name);

        match self.owner(attribute, sources) {
            Some(owner) if sources.len() > 1 => Ok(format!("{}.{column}", owner.qualifier)),
            Some(_) => Ok(column),
            None if attribute.dynamic => Ok(column),
            None => Err(RewriteError::UnresolvedTableReference(
                attribute.entity.clone().unwrap_or_else(|| attribute.name.clone()),
            )),
        }
    }

    /// ORDER BY item: a column reference when the name is usable, else the
    /// result position
    fn ordering_text(
        &self,
        ordering: &OrderingColumn,
        sources: &[SourceRef],
        result_columns: &[String],
    ) -> Result<String, RewriteError> {
        let attribute = &ordering.attribute;
        let name = &attribute.name;

        let duplicated = result_columns.iter().filter(|c| c.eq_ignore_ascii_case(name)).count() > 1;
        let by_name = self.rules.is_valid_bare_identifier(name) && !duplicated;

        let reference = if by_name {
            match self.owner(attribute, sources) {
                Some(owner) if sources.len() > 1 => Some(format!("{}.{name}", owner.qualifier)),
                Some(_) => Some(name.clone()),
                None if attribute.dynamic => Some(name.clone()),
                None => match &attribute.entity {
                    Some(entity) => return Err(RewriteError::UnresolvedTableReference(entity.clone())),
                    None if sources.len() > 1 => None,
                    None => Some(name.clone()),
                },
            }
        } else {
            None
        };

        let reference = match reference {
            Some(reference) => reference,
            None if ordering.position >= 1 => ordering.position.to_string(),
            None => {
                return Err(RewriteError::InvalidOrdering(format!(
                    "'{name}' cannot be referenced by name and has no result position"
                )))
            }
        };

        let direction = if ordering.descending { "DESC" } else { "ASC" };
        Ok(format!("{reference} {direction}"))
    }
}

impl std::fmt::Debug for StatementRewriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementRewriter")
            .field("dialect", &self.rules.dialect)
            .field("pool", &self.pool)
            .field("preserve_formatting", &self.preserve_formatting)
            .finish()
    }
}

/// Parse a whole fragment with `parse`, rejecting trailing input
fn parse_fragment<T>(
    dialect: &dyn Dialect,
    text: &str,
    parse: impl FnOnce(&mut Parser<'_>) -> Result<T, ParserError>,
) -> Result<T, RewriteError> {
    let fragment_error = |e: ParserError| RewriteError::ParseError(format!("{text}: {e}"));

    let mut parser = Parser::new(dialect).try_with_sql(text).map_err(fragment_error)?;
    let value = parse(&mut parser).map_err(fragment_error)?;

    let next = parser.peek_token();
    if !matches!(next.token, SqlToken::EOF) {
        return Err(RewriteError::ParseError(format!(
            "{text}: unexpected trailing input at {}",
            next.token
        )));
    }

    Ok(value)
}

/// Keep an OR inside its own condition when it gets ANDed
fn guard_precedence(expr: Expr) -> Expr {
    match expr {
        Expr::BinaryOp {
            op: BinaryOperator::Or,
            ..
        } => Expr::Nested(Box::new(expr)),
        other => other,
    }
}

fn collect_sources(from: &[TableWithJoins]) -> Vec<SourceRef> {
    let mut sources = Vec::new();
    for table in from {
        collect_factor(&table.relation, &mut sources);
        for join in &table.joins {
            collect_factor(&join.relation, &mut sources);
        }
    }
    sources
}

fn collect_factor(factor: &TableFactor, sources: &mut Vec<SourceRef>) {
    match factor {
        TableFactor::Table { name, alias, .. } => {
            let alias_ident = alias.as_ref().map(|a| &a.name);
            sources.push(SourceRef {
                name: name.0.iter().map(|i| i.value.clone()).collect(),
                alias: alias_ident.map(|a| a.value.clone()),
                qualifier: alias_ident.map_or_else(|| name.to_string(), ToString::to_string),
            });
        }
        TableFactor::Derived { alias: Some(alias), .. } => {
            sources.push(SourceRef {
                name: Vec::new(),
                alias: Some(alias.name.value.clone()),
                qualifier: alias.name.to_string(),
            });
        }
        TableFactor::NestedJoin { table_with_joins, .. } => {
            sources.extend(collect_sources(std::slice::from_ref(table_with_joins.as_ref())));
        }
        _ => {}
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Where,
    /// GROUP BY, HAVING, WINDOW, QUALIFY
    Grouping,
    OrderBy,
    /// LIMIT, OFFSET, FETCH, FOR
    Limit,
}

/// Top-level clause keywords of the main SELECT, skipping any WITH list
fn clause_markers(tokens: &[&Token]) -> Vec<(Marker, usize)> {
    let mut markers = Vec::new();
    let mut depth = 0usize;
    let mut in_with = tokens.first().is_some_and(|t| t.is_word("WITH"));

    for (index, token) in tokens.iter().enumerate() {
        if token.is_symbol("(") {
            depth += 1;
            continue;
        }
        if token.is_symbol(")") {
            depth = depth.saturating_sub(1);
            continue;
        }
        if depth > 0 {
            continue;
        }
        if in_with {
            in_with = !token.is_word("SELECT");
            continue;
        }
        if token.kind != TokenKind::Keyword {
            continue;
        }

        let followed_by_by = tokens.get(index + 1).is_some_and(|t| t.is_word("BY"));
        let marker = match token.text.to_ascii_uppercase().as_str() {
            "WHERE" => Marker::Where,
            "GROUP" if followed_by_by => Marker::Grouping,
            "HAVING" | "WINDOW" | "QUALIFY" => Marker::Grouping,
            "ORDER" if followed_by_by => Marker::OrderBy,
            "LIMIT" | "OFFSET" | "FETCH" | "FOR" => Marker::Limit,
            _ => continue,
        };
        markers.push((marker, index));
    }

    markers
}

struct Edit {
    start: usize,
    end: usize,
    text: String,
}

/// Replace or insert the rewritten clause bodies in the original text
///
/// An existing clause keeps its keyword as written; only the body after it
/// is replaced.
fn splice(text: &str, rules: &DialectRules, where_clause: Option<String>, order_clause: Option<String>) -> String {
    let tokens = tokenize(text, rules);
    let significant: Vec<&Token> = tokens.iter().filter(|t| t.is_significant()).collect();
    let markers = clause_markers(&significant);
    let text_end = significant.last().map_or(text.len(), |t| t.end());

    // end of the clause starting at marker `at`: last token before the next marker
    let clause_end = |at: usize, stops: &[Marker]| {
        markers
            .iter()
            .find(|(kind, index)| *index > at && stops.contains(kind))
            .map_or(text_end, |(_, index)| significant[index - 1].end())
    };
    let insertion = |clause: String, before: &[Marker]| match markers.iter().find(|(kind, _)| before.contains(kind)) {
        Some(&(_, index)) => {
            let at = significant[index].start;
            Edit {
                start: at,
                end: at,
                text: format!("{clause} "),
            }
        }
        None => Edit {
            start: text_end,
            end: text_end,
            text: format!(" {clause}"),
        },
    };

    // body of the clause whose keyword spans `words` tokens from `at`
    let replacement = |at: usize, words: usize, stops: &[Marker], body: String| {
        let keyword_end = significant[at + words - 1].end();
        let end = clause_end(at, stops);
        match significant.get(at + words) {
            Some(first) if first.start < end => Edit {
                start: first.start,
                end,
                text: body,
            },
            _ => Edit {
                start: keyword_end,
                end: end.max(keyword_end),
                text: format!(" {body}"),
            },
        }
    };

    let mut edits = Vec::new();

    if let Some(condition) = where_clause {
        let after_where = [Marker::Grouping, Marker::OrderBy, Marker::Limit];
        edits.push(match markers.iter().find(|(kind, _)| *kind == Marker::Where) {
            Some(&(_, index)) => replacement(index, 1, &after_where, condition),
            None => insertion(format!("WHERE {condition}"), &after_where),
        });
    }

    if let Some(items) = order_clause {
        edits.push(match markers.iter().find(|(kind, _)| *kind == Marker::OrderBy) {
            Some(&(_, index)) => replacement(index, 2, &[Marker::Limit], items),
            None => insertion(format!("ORDER BY {items}"), &[Marker::Limit]),
        });
    }

    // later edits first so earlier offsets stay valid; equal starts keep
    // WHERE ahead of ORDER BY
    edits.sort_by_key(|e| e.start);
    let mut output = text.to_string();
    for edit in edits.iter().rev() {
        output.replace_range(edit.start..edit.end, &edit.text);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{CompareOp, FilterValue, Predicate};
    use crate::parser::{InterruptFlag, StatementParser};
    use pretty_assertions::assert_eq;

    fn rewriter() -> StatementRewriter {
        StatementRewriter::new(DialectRules::ansi(), &RewriterConfig::default()).unwrap()
    }

    fn equals(value: &str) -> Predicate {
        Predicate::Compare {
            op: CompareOp::Eq,
            value: FilterValue::Text(value.to_string()),
        }
    }

    fn open_orders() -> QueryFilter {
        QueryFilter::default().with_condition(SourceAttribute::new("status"), equals("open"))
    }

    #[test]
    fn adds_a_where_clause() {
        let result = rewriter().inject_filter("SELECT * FROM orders o", &open_orders()).unwrap();
        assert_eq!(result, "SELECT * FROM orders o WHERE status = 'open'");
    }

    #[test]
    fn extends_an_existing_where_clause() {
        let result = rewriter()
            .inject_filter("SELECT * FROM orders o WHERE total > 0", &open_orders())
            .unwrap();
        assert_eq!(result, "SELECT * FROM orders o WHERE (total > 0) AND status = 'open'");
    }

    #[test]
    fn strips_comments_and_semicolons() {
        let result = rewriter()
            .inject_filter("SELECT id FROM orders -- everything\n;", &open_orders())
            .unwrap();
        assert_eq!(result, "SELECT id FROM orders WHERE status = 'open'");
    }

    #[test]
    fn keeps_surrounding_layout() {
        let sql = "select id\n  from orders  o\n where total>0\n limit 5";
        let result = rewriter().inject_filter(sql, &open_orders()).unwrap();
        assert_eq!(
            result,
            "select id\n  from orders  o\n where (total > 0) AND status = 'open'\n limit 5"
        );
    }

    #[test]
    fn existing_clause_keywords_keep_their_spelling() {
        let filter = open_orders().with_ordering(SourceAttribute::new("total"), 2, true);
        let sql = "select id, total from orders Where total > 0 order  by id limit 3";

        let result = rewriter().inject_filter(sql, &filter).unwrap();
        assert_eq!(
            result,
            "select id, total from orders Where (total > 0) AND status = 'open' order  by id, total DESC limit 3"
        );
    }

    #[test]
    fn qualifies_columns_when_joined() {
        let sql = "SELECT o.id FROM orders o JOIN customers c ON c.id = o.customer_id ORDER BY o.id LIMIT 10";
        let filter = QueryFilter::default()
            .with_condition(SourceAttribute::of("c", "country"), equals("NZ"))
            .with_ordering(SourceAttribute::of("o", "total"), 2, true);

        let result = rewriter().inject_filter(sql, &filter).unwrap();
        assert_eq!(
            result,
            "SELECT o.id FROM orders o JOIN customers c ON c.id = o.customer_id WHERE c.country = 'NZ' ORDER BY o.id, o.total DESC LIMIT 10"
        );
    }

    #[test]
    fn table_names_match_as_well_as_aliases() {
        let sql = "SELECT * FROM orders JOIN customers c ON c.id = orders.customer_id";
        let filter = QueryFilter::default().with_condition(SourceAttribute::of("orders", "status"), equals("open"));

        let result = rewriter().inject_filter(sql, &filter).unwrap();
        assert!(result.ends_with("WHERE orders.status = 'open'"), "{result}");
    }

    #[test]
    fn unresolved_owners_are_rejected() {
        let rewriter = rewriter();

        let unknown_table = QueryFilter::default().with_condition(SourceAttribute::of("x", "status"), equals("open"));
        assert_eq!(
            rewriter.inject_filter("SELECT * FROM orders o", &unknown_table),
            Err(RewriteError::UnresolvedTableReference("x".to_string()))
        );

        // no entity and more than one source
        assert_eq!(
            rewriter.inject_filter("SELECT * FROM orders o, customers c", &open_orders()),
            Err(RewriteError::UnresolvedTableReference("status".to_string()))
        );

        let mut dynamic = open_orders();
        dynamic.conditions[0].attribute.dynamic = true;
        assert_eq!(
            rewriter.inject_filter("SELECT * FROM orders o, customers c", &dynamic).unwrap(),
            "SELECT * FROM orders o, customers c WHERE status = 'open'"
        );
    }

    #[test]
    fn only_plain_selects_are_accepted() {
        let rewriter = rewriter();
        for sql in [
            "UPDATE orders SET status = 'x'",
            "SELECT 1 UNION SELECT 2",
            "SELECT 1; SELECT 2",
        ] {
            assert!(
                matches!(
                    rewriter.inject_filter(sql, &open_orders()),
                    Err(RewriteError::UnsupportedStatementShape(_))
                ),
                "{sql}"
            );
        }
    }

    #[test]
    fn cte_statements_filter_the_main_select() {
        let sql = "WITH recent AS (SELECT * FROM orders WHERE total > 0 ORDER BY id) SELECT * FROM recent";
        let result = rewriter().inject_filter(sql, &open_orders()).unwrap();
        assert_eq!(
            result,
            "WITH recent AS (SELECT * FROM orders WHERE total > 0 ORDER BY id) SELECT * FROM recent WHERE status = 'open'"
        );
    }

    #[test]
    fn orderings_fall_back_to_positions() {
        let sql = "SELECT o.id, c.id FROM orders o, customers c";
        let mut filter = QueryFilter::default().with_ordering(SourceAttribute::new("id"), 2, false);
        filter.result_columns = vec!["id".to_string(), "id".to_string()];

        let result = rewriter().inject_filter(sql, &filter).unwrap();
        assert_eq!(result, "SELECT o.id, c.id FROM orders o, customers c ORDER BY 2 ASC");

        let spaced = QueryFilter::default().with_ordering(SourceAttribute::new("order total"), 3, true);
        let result = rewriter().inject_filter("SELECT * FROM t", &spaced).unwrap();
        assert_eq!(result, "SELECT * FROM t ORDER BY 3 DESC");

        let hopeless = QueryFilter::default().with_ordering(SourceAttribute::new("order total"), 0, true);
        assert!(matches!(
            rewriter().inject_filter("SELECT * FROM t", &hopeless),
            Err(RewriteError::InvalidOrdering(_))
        ));
    }

    #[test]
    fn where_and_order_go_before_limit() {
        let filter = open_orders().with_ordering(SourceAttribute::new("id"), 1, false);
        let result = rewriter().inject_filter("SELECT * FROM t LIMIT 5", &filter).unwrap();
        assert_eq!(result, "SELECT * FROM t WHERE status = 'open' ORDER BY id ASC LIMIT 5");
    }

    #[test]
    fn order_expression_comes_last() {
        let mut filter = QueryFilter::default().with_ordering(SourceAttribute::new("id"), 1, true);
        filter.order_expression = Some("length(name) DESC, created_at".to_string());

        let result = rewriter().inject_filter("SELECT * FROM t", &filter).unwrap();
        assert_eq!(result, "SELECT * FROM t ORDER BY id DESC, length(name) DESC, created_at");

        filter.order_expression = Some("id DESC garbage garbage".to_string());
        assert!(matches!(
            rewriter().inject_filter("SELECT * FROM t", &filter),
            Err(RewriteError::ParseError(_))
        ));
    }

    #[test]
    fn canonical_output_renders_the_whole_statement() {
        let config = RewriterConfig {
            preserve_formatting: false,
            ..RewriterConfig::default()
        };
        let rewriter = StatementRewriter::new(DialectRules::ansi(), &config).unwrap();

        let result = rewriter.inject_filter("select * from orders o", &open_orders()).unwrap();
        assert_eq!(result, "SELECT * FROM orders AS o WHERE status = 'open'");
    }

    #[test]
    fn infinite_values_are_rejected() {
        let filter = QueryFilter::default().with_condition(
            SourceAttribute::new("total"),
            Predicate::Compare {
                op: CompareOp::Gt,
                value: FilterValue::Float(f64::INFINITY),
            },
        );

        assert_eq!(
            rewriter().inject_filter("SELECT * FROM orders", &filter),
            Err(RewriteError::UnrepresentableValue("Float(inf)".to_string()))
        );
    }

    #[test]
    fn syntax_errors_are_reported() {
        assert!(matches!(
            rewriter().inject_filter("SELECT FROM WHERE", &open_orders()),
            Err(RewriteError::ParseError(_))
        ));
    }

    /// Never finishes until interrupted
    struct StuckParser;

    impl StatementParser for StuckParser {
        fn parse_statements(&self, _sql: &str, interrupt: &InterruptFlag) -> Result<Vec<Statement>, ParseError> {
            while !interrupt.is_raised() {
                std::thread::sleep(Duration::from_millis(5));
            }
            Err(ParseError::Interrupted)
        }
    }

    #[test]
    fn slow_parses_time_out() {
        let config = RewriterConfig {
            parse_timeout_ms: 30,
            ..RewriterConfig::default()
        };
        let pool = ParsePool::new(StuckParser, &config).unwrap();
        let rewriter = StatementRewriter::with_pool(DialectRules::ansi(), pool, true);

        assert_eq!(
            rewriter.inject_filter("SELECT * FROM orders", &open_orders()),
            Err(RewriteError::ParseTimeout(Duration::from_millis(30)))
        );
    }
}
