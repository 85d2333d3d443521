//! Filter requests consumed by the statement rewriter

use serde::{Deserialize, Serialize};
use sqlscope_core::DialectRules;

/// A column as the caller knows it: its name and, optionally, the table
/// (name or alias) it belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceAttribute {
    pub name: String,

    #[serde(default)]
    pub entity: Option<String>,

    /// Computed attribute that does not belong to any FROM item
    #[serde(default)]
    pub dynamic: bool,
}

impl SourceAttribute {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity: None,
            dynamic: false,
        }
    }

    pub fn of(entity: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity: Some(entity.into()),
            dynamic: false,
        }
    }
}

/// Literal on the right-hand side of a predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl FilterValue {
    /// Every value except an infinite or NaN float has a SQL literal
    pub fn is_representable(&self) -> bool {
        match self {
            FilterValue::Float(value) => value.is_finite(),
            _ => true,
        }
    }

    /// SQL literal text
    pub fn render(&self, rules: &DialectRules) -> String {
        match self {
            FilterValue::Null => "NULL".to_string(),
            FilterValue::Bool(true) => "TRUE".to_string(),
            FilterValue::Bool(false) => "FALSE".to_string(),
            FilterValue::Integer(value) => value.to_string(),
            FilterValue::Float(value) => value.to_string(),
            FilterValue::Text(text) => string_literal(text, rules),
        }
    }
}

fn string_literal(text: &str, rules: &DialectRules) -> String {
    let mut escaped = text.replace('\'', "''");
    if let Some(escape) = rules.escape_char {
        escaped = escaped.replace(escape, &format!("{escape}{escape}"));
    }
    format!("'{escaped}'")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "<>",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }
}

/// Right-hand side of a condition, rendered after the column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    Compare { op: CompareOp, value: FilterValue },
    IsNull,
    IsNotNull,
    In { values: Vec<FilterValue> },
    Like { pattern: String },
    /// Used verbatim, e.g. `BETWEEN 1 AND 5`
    Raw { sql: String },
}

impl Predicate {
    /// Literal operands of the predicate
    pub fn values(&self) -> Vec<&FilterValue> {
        match self {
            Predicate::Compare { value, .. } => vec![value],
            Predicate::In { values } => values.iter().collect(),
            _ => Vec::new(),
        }
    }

    pub fn render(&self, rules: &DialectRules) -> String {
        match self {
            Predicate::Compare { op, value } => format!("{} {}", op.symbol(), value.render(rules)),
            Predicate::IsNull => "IS NULL".to_string(),
            Predicate::IsNotNull => "IS NOT NULL".to_string(),
            Predicate::In { values } if values.is_empty() => "IN (NULL)".to_string(),
            Predicate::In { values } => {
                let rendered: Vec<String> = values.iter().map(|v| v.render(rules)).collect();
                format!("IN ({})", rendered.join(", "))
            }
            Predicate::Like { pattern } => format!("LIKE {}", string_literal(pattern, rules)),
            Predicate::Raw { sql } => sql.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub attribute: SourceAttribute,
    pub predicate: Predicate,
}

/// Requested sort column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderingColumn {
    pub attribute: SourceAttribute,

    /// 1-based position in the result, used when the column cannot be
    /// referenced by name
    #[serde(default)]
    pub position: usize,

    #[serde(default)]
    pub descending: bool,
}

/// Everything to inject into one statement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    #[serde(default)]
    pub conditions: Vec<FilterCondition>,

    #[serde(default)]
    pub orderings: Vec<OrderingColumn>,

    /// Free-form ORDER BY list appended after the orderings
    #[serde(default)]
    pub order_expression: Option<String>,

    /// Output column names of the statement, in order
    #[serde(default)]
    pub result_columns: Vec<String>,
}

impl QueryFilter {
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
            && self.orderings.is_empty()
            && self.order_expression.as_deref().map_or(true, |e| e.trim().is_empty())
    }

    pub fn with_condition(mut self, attribute: SourceAttribute, predicate: Predicate) -> Self {
        self.conditions.push(FilterCondition { attribute, predicate });
        self
    }

    pub fn with_ordering(mut self, attribute: SourceAttribute, position: usize, descending: bool) -> Self {
        self.orderings.push(OrderingColumn {
            attribute,
            position,
            descending,
        });
        self
    }
}
