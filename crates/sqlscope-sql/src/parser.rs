//! SQL parsing using datafusion-sqlparser-rs
//!
//! Statements are parsed on a small dedicated pool so that a pathological
//! input can never hold the caller past its timeout. The parser checks an
//! interrupt flag between statements; the pool raises it when the caller
//! gives up.

use sqlparser::ast::{Query, Statement};
use sqlparser::dialect::{
    BigQueryDialect, Dialect, GenericDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect,
    SnowflakeDialect,
};
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token as SqlToken;
use sqlscope_core::{DialectConfig, RewriterConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};

/// Cooperative cancellation signal shared with a running parse
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Anything that can turn SQL text into statements on a pool thread
pub trait StatementParser: Send + Sync + 'static {
    fn parse_statements(&self, sql: &str, interrupt: &InterruptFlag) -> Result<Vec<Statement>, ParseError>;
}

/// SQL parser with configurable dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlParser {
    dialect: DialectConfig,
}

impl SqlParser {
    /// Create a new SQL parser with the default (generic) dialect
    pub fn new() -> Self {
        Self::from_dialect(&DialectConfig::Ansi)
    }

    /// Create a SQL parser for BigQuery
    pub fn bigquery() -> Self {
        Self::from_dialect(&DialectConfig::BigQuery)
    }

    /// Create a SQL parser for PostgreSQL
    pub fn postgres() -> Self {
        Self::from_dialect(&DialectConfig::Postgres)
    }

    /// Create a SQL parser for Snowflake
    pub fn snowflake() -> Self {
        Self::from_dialect(&DialectConfig::Snowflake)
    }

    /// Create a SQL parser for MySQL
    pub fn mysql() -> Self {
        Self::from_dialect(&DialectConfig::MySql)
    }

    /// Create a SQL parser for SQL Server
    pub fn mssql() -> Self {
        Self::from_dialect(&DialectConfig::MsSql)
    }

    /// Create a parser from a dialect config
    pub fn from_dialect(dialect: &DialectConfig) -> Self {
        Self { dialect: *dialect }
    }

    pub fn dialect_config(&self) -> DialectConfig {
        self.dialect
    }

    /// Grammar object for this dialect
    pub fn dialect(&self) -> Box<dyn Dialect> {
        match self.dialect {
            DialectConfig::Ansi => Box::new(GenericDialect {}),
            DialectConfig::Postgres => Box::new(PostgreSqlDialect {}),
            DialectConfig::MySql => Box::new(MySqlDialect {}),
            DialectConfig::BigQuery => Box::new(BigQueryDialect {}),
            DialectConfig::Snowflake => Box::new(SnowflakeDialect {}),
            DialectConfig::MsSql => Box::new(MsSqlDialect {}),
        }
    }

    /// Parse SQL string into AST on the calling thread
    pub fn parse(&self, sql: &str) -> Result<ParsedSql, ParseError> {
        let statements = self.parse_statements(sql, &InterruptFlag::default())?;
        Ok(ParsedSql {
            sql: sql.to_string(),
            statements,
        })
    }
}

impl StatementParser for SqlParser {
    fn parse_statements(&self, sql: &str, interrupt: &InterruptFlag) -> Result<Vec<Statement>, ParseError> {
        let dialect = self.dialect();
        let mut parser = Parser::new(&*dialect).try_with_sql(sql)?;
        let mut statements = Vec::new();
        let mut expecting_delimiter = false;

        loop {
            if interrupt.is_raised() {
                return Err(ParseError::Interrupted);
            }

            while parser.consume_token(&SqlToken::SemiColon) {
                expecting_delimiter = false;
            }

            let next = parser.peek_token();
            if matches!(next.token, SqlToken::EOF) {
                break;
            }
            if expecting_delimiter {
                return Err(ParseError::Syntax(format!(
                    "Expected end of statement, found: {}",
                    next.token
                )));
            }

            statements.push(parser.parse_statement()?);
            expecting_delimiter = true;
        }

        Ok(statements)
    }
}

/// Successfully parsed SQL with AST
#[derive(Debug, Clone)]
pub struct ParsedSql {
    /// Text handed to the parser
    pub sql: String,

    /// Parsed statements
    pub statements: Vec<Statement>,
}

impl ParsedSql {
    /// Get the first statement
    pub fn first_statement(&self) -> Option<&Statement> {
        self.statements.first()
    }

    /// Check if this is a SELECT statement
    pub fn is_select(&self) -> bool {
        matches!(self.first_statement(), Some(Statement::Query(_)))
    }

    /// Get the query if this is a SELECT statement
    pub fn as_query(&self) -> Option<&Query> {
        match self.first_statement() {
            Some(Statement::Query(query)) => Some(query.as_ref()),
            _ => None,
        }
    }

    /// Count the number of statements
    pub fn statement_count(&self) -> usize {
        self.statements.len()
    }
}

/// SQL parsing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("parse did not finish within {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Syntax(String),

    #[error("parse interrupted")]
    Interrupted,

    #[error("parse pool is closed")]
    PoolClosed,
}

impl From<sqlparser::parser::ParserError> for ParseError {
    fn from(error: sqlparser::parser::ParserError) -> Self {
        ParseError::Syntax(error.to_string())
    }
}

/// Bounded pool running statement parses under a hard timeout
pub struct ParsePool {
    runtime: Option<Runtime>,
    parser: Arc<dyn StatementParser>,
    timeout: Duration,
}

impl ParsePool {
    pub fn new(parser: impl StatementParser, config: &RewriterConfig) -> std::io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(config.worker_threads.max(1))
            .thread_name("sqlscope-parse")
            .build()?;

        tracing::debug!(
            workers = config.worker_threads,
            timeout_ms = config.parse_timeout_ms,
            "Started parse pool"
        );

        Ok(Self {
            runtime: Some(runtime),
            parser: Arc::new(parser),
            timeout: config.parse_timeout(),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Parse `sql` on the pool, waiting at most the configured timeout
    ///
    /// On timeout the interrupt flag is raised and the task is abandoned;
    /// the pool itself stays usable. The caller waits on a channel rather
    /// than the pool's runtime, so this may be called from async code too.
    pub fn parse(&self, sql: &str) -> Result<ParsedSql, ParseError> {
        let runtime = self.runtime.as_ref().ok_or(ParseError::PoolClosed)?;

        let interrupt = InterruptFlag::default();
        let task_interrupt = interrupt.clone();
        let parser = Arc::clone(&self.parser);
        let text = sql.to_string();

        let (sender, receiver) = mpsc::sync_channel(1);

        let handle = runtime.spawn_blocking(move || {
            // the caller may have given up already
            let _ = sender.send(parser.parse_statements(&text, &task_interrupt));
        });

        match receiver.recv_timeout(self.timeout) {
            Ok(result) => Ok(ParsedSql {
                sql: sql.to_string(),
                statements: result?,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(ParseError::Syntax("parse task failed".to_string())),
            Err(RecvTimeoutError::Timeout) => {
                interrupt.raise();
                handle.abort();
                tracing::warn!(timeout = ?self.timeout, bytes = sql.len(), "Statement parse timed out");
                Err(ParseError::Timeout(self.timeout))
            }
        }
    }

    /// Stop accepting work; running parses finish in the background
    pub fn shutdown(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.runtime.is_none()
    }
}

impl Drop for ParsePool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ParsePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsePool")
            .field("timeout", &self.timeout)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    #[test]
    fn parse_simple_select() {
        let parser = SqlParser::new();
        let sql = "SELECT id, name FROM users WHERE active = true";

        let parsed = parser.parse(sql).unwrap();
        assert_eq!(parsed.statement_count(), 1);
        assert!(parsed.is_select());
    }

    #[test]
    fn parse_with_cte() {
        let parser = SqlParser::new();
        let sql = r#"
            WITH active_users AS (
                SELECT * FROM users WHERE active = true
            )
            SELECT id, name FROM active_users
        "#;

        let parsed = parser.parse(sql).unwrap();
        assert!(parsed.is_select());
        assert!(parsed.as_query().unwrap().with.is_some());
    }

    #[test]
    fn parse_invalid_sql() {
        let parser = SqlParser::new();
        let result = parser.parse("SELECT FROM WHERE");

        match result {
            Err(ParseError::Syntax(message)) => assert!(message.contains("Expected")),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn multiple_statements_need_delimiters() {
        let parser = SqlParser::new();
        assert_eq!(parser.parse("SELECT 1;; SELECT 2;").unwrap().statement_count(), 2);
        assert!(parser.parse("SELECT 1 SELECT 2").is_err());
    }

    #[test]
    fn raised_flag_stops_before_the_next_statement() {
        let interrupt = InterruptFlag::default();
        interrupt.raise();
        let result = SqlParser::new().parse_statements("SELECT 1", &interrupt);
        assert_eq!(result.unwrap_err(), ParseError::Interrupted);
    }

    #[test]
    fn different_dialects() {
        let sql = "SELECT id FROM users";

        for parser in [
            SqlParser::new(),
            SqlParser::bigquery(),
            SqlParser::postgres(),
            SqlParser::snowflake(),
            SqlParser::mysql(),
            SqlParser::mssql(),
        ] {
            assert!(parser.parse(sql).is_ok(), "{:?}", parser.dialect_config());
        }
    }

    /// Spins on "slow" input until interrupted, otherwise parses normally
    struct SlowParser {
        interrupted: Arc<AtomicUsize>,
    }

    impl StatementParser for SlowParser {
        fn parse_statements(&self, sql: &str, interrupt: &InterruptFlag) -> Result<Vec<Statement>, ParseError> {
            if sql.contains("slow") {
                while !interrupt.is_raised() {
                    std::thread::sleep(Duration::from_millis(5));
                }
                self.interrupted.fetch_add(1, Ordering::SeqCst);
                return Err(ParseError::Interrupted);
            }
            SqlParser::new().parse_statements(sql, interrupt)
        }
    }

    #[tokio::test]
    async fn parse_from_inside_an_async_runtime() {
        let pool = ParsePool::new(SqlParser::new(), &config(500)).unwrap();
        let parsed = pool.parse("SELECT id FROM users").unwrap();
        assert!(parsed.is_select());
    }

    struct PanickingParser;

    impl StatementParser for PanickingParser {
        fn parse_statements(&self, _sql: &str, _interrupt: &InterruptFlag) -> Result<Vec<Statement>, ParseError> {
            panic!("parser bug");
        }
    }

    #[test]
    fn panicking_parse_is_an_error() {
        let pool = ParsePool::new(PanickingParser, &config(500)).unwrap();
        assert_eq!(
            pool.parse("SELECT 1").unwrap_err(),
            ParseError::Syntax("parse task failed".to_string())
        );
    }

    fn config(timeout_ms: u64) -> RewriterConfig {
        RewriterConfig {
            parse_timeout_ms: timeout_ms,
            worker_threads: 2,
            ..RewriterConfig::default()
        }
    }

    #[test]
    fn timeout_then_normal_parse_on_the_same_pool() {
        let interrupted = Arc::new(AtomicUsize::new(0));
        let pool = ParsePool::new(
            SlowParser {
                interrupted: Arc::clone(&interrupted),
            },
            &config(50),
        )
        .unwrap();

        let started = Instant::now();
        assert_eq!(
            pool.parse("SELECT slow").unwrap_err(),
            ParseError::Timeout(Duration::from_millis(50))
        );
        assert!(started.elapsed() < Duration::from_secs(1));

        let deadline = Instant::now() + Duration::from_secs(2);
        while interrupted.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(interrupted.load(Ordering::SeqCst), 1);

        let parsed = pool.parse("SELECT id FROM users").unwrap();
        assert!(parsed.is_select());
    }

    #[test]
    fn closed_pool_rejects_work() {
        let mut pool = ParsePool::new(SqlParser::new(), &config(1000)).unwrap();
        pool.shutdown();
        assert!(pool.is_closed());
        assert_eq!(pool.parse("SELECT 1").unwrap_err(), ParseError::PoolClosed);
    }

    #[test]
    fn syntax_errors_come_back_from_the_pool() {
        let pool = ParsePool::new(SqlParser::new(), &config(1000)).unwrap();
        assert!(matches!(pool.parse("SELECT FROM WHERE"), Err(ParseError::Syntax(_))));
    }
}
