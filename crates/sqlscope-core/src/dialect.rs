//! Dialect rules consumed by the tokenizer and the rewriter
//!
//! A dialect is plain configuration: quote pairs, separators, comment
//! markers and a keyword classifier. Nothing here knows about parsing.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// SQL dialect selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectConfig {
    /// Generic ANSI SQL
    Ansi,

    /// PostgreSQL SQL dialect
    Postgres,

    /// MySQL / MariaDB SQL dialect
    MySql,

    /// BigQuery SQL dialect
    BigQuery,

    /// Snowflake SQL dialect
    Snowflake,

    /// Microsoft SQL Server (T-SQL)
    MsSql,
}

impl Default for DialectConfig {
    fn default() -> Self {
        Self::Ansi
    }
}

impl std::fmt::Display for DialectConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Ansi => "ansi",
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::BigQuery => "bigquery",
            Self::Snowflake => "snowflake",
            Self::MsSql => "mssql",
        };
        f.write_str(name)
    }
}

/// Reserved words shared by every dialect preset
pub const ANSI_KEYWORDS: &[&str] = &[
    "ALL", "ALTER", "AND", "ANY", "AS", "ASC", "BEGIN", "BETWEEN", "BY", "CASE", "CAST",
    "CHECK", "COLLATE", "COLUMN", "COMMIT", "CONSTRAINT", "CREATE", "CROSS", "CURRENT_DATE",
    "CURRENT_TIME", "CURRENT_TIMESTAMP", "DEFAULT", "DELETE", "DESC", "DISTINCT", "DROP",
    "ELSE", "END", "ESCAPE", "EXCEPT", "EXISTS", "FALSE", "FETCH", "FOR", "FOREIGN", "FROM",
    "FULL", "GRANT", "GROUP", "HAVING", "ILIKE", "IN", "INNER", "INSERT", "INTERSECT",
    "INTERVAL", "INTO", "IS", "JOIN", "LATERAL", "LEFT", "LIKE", "LIMIT", "MERGE", "NATURAL",
    "NOT", "NULL", "NULLS", "OFFSET", "ON", "ONLY", "OR", "ORDER", "OUTER", "OVER",
    "PARTITION", "PRIMARY", "QUALIFY", "RECURSIVE", "REFERENCES", "RETURNING", "RIGHT",
    "ROLLBACK", "ROWS", "SELECT", "SET", "SOME", "TABLE", "THEN", "TO", "TRUE", "TRUNCATE",
    "UNION", "UNIQUE", "UPDATE", "USING", "VALUES", "VIEW", "WHEN", "WHERE", "WINDOW",
    "WITH",
];

/// Opening and closing quote strings of a quoted identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotePair {
    pub open: String,
    pub close: String,
}

impl QuotePair {
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            open: open.into(),
            close: close.into(),
        }
    }

    /// Same string opens and closes
    pub fn symmetric(quote: impl Into<String>) -> Self {
        let quote = quote.into();
        Self {
            open: quote.clone(),
            close: quote,
        }
    }
}

/// Lexical rules of a dialect
#[derive(Debug, Clone)]
pub struct DialectRules {
    /// Which grammar the statement parser should use
    pub dialect: DialectConfig,

    /// Escape character inside string literals (`\` in MySQL)
    pub escape_char: Option<char>,

    /// Separator between a composite name and its member (`a.b`)
    pub struct_separator: char,

    /// Extra characters separating catalog parts of a name
    pub catalog_separators: Vec<char>,

    /// Identifier quotes, tried in order
    pub identifier_quotes: Vec<QuotePair>,

    /// Single-line comment markers (`--`, `#`)
    pub line_comments: Vec<String>,

    /// Words that swallow the rest of their line (`DELIMITER`)
    pub commands: Vec<String>,

    /// Identifiers may start with a digit (`1st_quarter` in MySQL)
    pub digit_identifiers: bool,

    keywords: HashSet<String>,
}

impl DialectRules {
    /// Rules for generic ANSI SQL
    pub fn ansi() -> Self {
        Self {
            dialect: DialectConfig::Ansi,
            escape_char: None,
            struct_separator: '.',
            catalog_separators: Vec::new(),
            identifier_quotes: vec![QuotePair::symmetric("\"")],
            line_comments: vec!["--".to_string()],
            commands: Vec::new(),
            digit_identifiers: false,
            keywords: ANSI_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Preset rules for a dialect
    pub fn for_dialect(dialect: DialectConfig) -> Self {
        let mut rules = Self::ansi();
        rules.dialect = dialect;

        match dialect {
            DialectConfig::Ansi => {}
            DialectConfig::Postgres => {
                rules.add_keywords(["ARRAY", "ANALYSE", "ANALYZE", "DO", "PLACING", "SIMILAR"]);
            }
            DialectConfig::MySql => {
                rules.escape_char = Some('\\');
                rules.identifier_quotes = vec![QuotePair::symmetric("`")];
                rules.line_comments = vec!["--".to_string(), "#".to_string()];
                rules.commands = vec!["DELIMITER".to_string()];
                rules.digit_identifiers = true;
                rules.add_keywords(["DIV", "MOD", "REGEXP", "RLIKE", "STRAIGHT_JOIN", "XOR"]);
            }
            DialectConfig::BigQuery => {
                rules.escape_char = Some('\\');
                rules.identifier_quotes = vec![QuotePair::symmetric("`")];
                rules.line_comments = vec!["--".to_string(), "#".to_string()];
                rules.add_keywords(["ARRAY", "STRUCT", "UNNEST"]);
            }
            DialectConfig::Snowflake => {
                rules.line_comments = vec!["--".to_string(), "//".to_string()];
                rules.add_keywords(["ILIKE", "MINUS", "SAMPLE"]);
            }
            DialectConfig::MsSql => {
                rules.identifier_quotes = vec![QuotePair::new("[", "]"), QuotePair::symmetric("\"")];
                rules.commands = vec!["GO".to_string()];
                rules.add_keywords(["TOP", "APPLY", "PIVOT", "UNPIVOT"]);
            }
        }

        rules
    }

    /// Register additional keywords (case-insensitive)
    pub fn add_keywords<I, S>(&mut self, keywords: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for keyword in keywords {
            self.keywords.insert(keyword.as_ref().to_ascii_uppercase());
        }
    }

    /// Keyword classifier
    pub fn is_keyword(&self, word: &str) -> bool {
        self.keywords.contains(&word.to_ascii_uppercase())
    }

    /// Check if the uppercased word is a line command
    pub fn is_command(&self, word: &str) -> bool {
        self.commands.iter().any(|c| c.eq_ignore_ascii_case(word))
    }

    /// Struct or catalog separator
    pub fn is_separator(&self, c: char) -> bool {
        c == self.struct_separator || self.catalog_separators.contains(&c)
    }

    /// Identifier quote pair opening at the start of `rest`
    pub fn quote_opening(&self, rest: &str) -> Option<&QuotePair> {
        self.identifier_quotes
            .iter()
            .find(|q| !q.open.is_empty() && rest.starts_with(q.open.as_str()))
    }

    /// Whether `c` may start an unquoted identifier
    pub fn is_identifier_start(&self, c: char) -> bool {
        c.is_alphabetic() || c == '_' || (self.digit_identifiers && c.is_numeric())
    }

    /// Whether `c` may continue an unquoted identifier
    pub fn is_identifier_part(&self, c: char) -> bool {
        c.is_alphanumeric() || c == '_' || c == '$'
    }

    /// Name usable without quotes: identifier characters only and not a keyword
    pub fn is_valid_bare_identifier(&self, name: &str) -> bool {
        let mut chars = name.chars();
        let Some(first) = chars.next() else {
            return false;
        };

        self.is_identifier_start(first)
            && chars.all(|c| self.is_identifier_part(c))
            && !self.is_keyword(name)
    }

    /// Quote a name with the first identifier quote when it cannot stay bare
    pub fn quote_identifier(&self, name: &str) -> String {
        if self.is_valid_bare_identifier(name) {
            return name.to_string();
        }

        match self.identifier_quotes.first() {
            Some(pair) => {
                let doubled = format!("{}{}", pair.close, pair.close);
                format!("{}{}{}", pair.open, name.replace(pair.close.as_str(), &doubled), pair.close)
            }
            None => name.to_string(),
        }
    }

    /// Strip identifier quotes, undoubling escaped closers
    ///
    /// Returns the bare name and whether it was quoted.
    pub fn unquote(&self, text: &str) -> (String, bool) {
        for pair in &self.identifier_quotes {
            let min_len = pair.open.len() + pair.close.len();
            if text.len() >= min_len && text.starts_with(pair.open.as_str()) && text.ends_with(pair.close.as_str()) {
                let inner = &text[pair.open.len()..text.len() - pair.close.len()];
                let doubled = format!("{}{}", pair.close, pair.close);
                return (inner.replace(&doubled, &pair.close), true);
            }
        }

        (text.to_string(), false)
    }
}

impl Default for DialectRules {
    fn default() -> Self {
        Self::ansi()
    }
}
