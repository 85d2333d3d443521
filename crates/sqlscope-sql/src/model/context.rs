//! Data contexts
//!
//! A `DataContext` is an immutable chain of layers. Each layer adds one kind
//! of information (connection, CTE definitions, FROM sources, projected
//! columns) on top of its parent. Contexts are shared through `Arc` and
//! never edited; deriving a new layer leaves the parent untouched.

use crate::interval::Interval;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Catalog and schema the statement runs against
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionContext {
    pub catalog: Option<String>,
    pub schema: Option<String>,
}

impl ConnectionContext {
    pub fn new(catalog: Option<String>, schema: Option<String>) -> Self {
        Self { catalog, schema }
    }
}

/// A CTE visible to the statement body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedRowset {
    pub name: String,
    pub columns: Vec<String>,
    pub interval: Interval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RowsSourceKind {
    Table,
    Cte,
    Derived,
}

/// One FROM contributor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowsSource {
    /// Name path as written (`[schema, table]`); empty for derived tables
    pub path: Vec<String>,
    pub alias: Option<String>,
    pub kind: RowsSourceKind,
    /// Known output columns, empty when unknown
    pub columns: Vec<String>,
    pub interval: Interval,
}

impl RowsSource {
    /// Name the source is referenced by in the query
    pub fn reference_name(&self) -> &str {
        self.alias
            .as_deref()
            .or_else(|| self.path.last().map(String::as_str))
            .unwrap_or("")
    }

    /// Whether a column qualifier designates this source
    ///
    /// An aliased source is only reachable through its alias; otherwise the
    /// qualifier must match a suffix of the name path.
    pub fn matches(&self, qualifier: &[String]) -> bool {
        if qualifier.is_empty() {
            return false;
        }

        if let Some(alias) = &self.alias {
            return qualifier.len() == 1 && qualifier[0].eq_ignore_ascii_case(alias);
        }

        qualifier.len() <= self.path.len()
            && self.path[self.path.len() - qualifier.len()..]
                .iter()
                .zip(qualifier)
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.eq_ignore_ascii_case(name))
    }
}

/// Coarse type of a projected column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ColumnType {
    Unknown,
    /// The column maps onto a known column of the named source
    Resolved(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultColumn {
    pub name: String,
    /// Reference name of the source it came from, when known
    pub source: Option<String>,
    pub ty: ColumnType,
}

impl ResultColumn {
    pub fn unknown(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: None,
            ty: ColumnType::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextLayer {
    Empty,
    Connection(ConnectionContext),
    NamedRowsets(Vec<NamedRowset>),
    RowsSources(Vec<RowsSource>),
    ResultTuple(Vec<ResultColumn>),
}

impl ContextLayer {
    fn label(&self) -> &'static str {
        match self {
            ContextLayer::Empty => "empty",
            ContextLayer::Connection(_) => "connection",
            ContextLayer::NamedRowsets(_) => "ctes",
            ContextLayer::RowsSources(_) => "sources",
            ContextLayer::ResultTuple(_) => "result",
        }
    }
}

struct ContextNode {
    layer: ContextLayer,
    parent: Option<DataContext>,
}

/// Immutable, shareable chain of context layers
#[derive(Clone)]
pub struct DataContext(Arc<ContextNode>);

impl DataContext {
    pub fn empty() -> Self {
        Self(Arc::new(ContextNode {
            layer: ContextLayer::Empty,
            parent: None,
        }))
    }

    fn derive(&self, layer: ContextLayer) -> Self {
        Self(Arc::new(ContextNode {
            layer,
            parent: Some(self.clone()),
        }))
    }

    pub fn with_connection(&self, connection: ConnectionContext) -> Self {
        self.derive(ContextLayer::Connection(connection))
    }

    pub fn with_named_rowsets(&self, rowsets: Vec<NamedRowset>) -> Self {
        self.derive(ContextLayer::NamedRowsets(rowsets))
    }

    pub fn with_rows_sources(&self, sources: Vec<RowsSource>) -> Self {
        self.derive(ContextLayer::RowsSources(sources))
    }

    pub fn with_result_tuple(&self, columns: Vec<ResultColumn>) -> Self {
        self.derive(ContextLayer::ResultTuple(columns))
    }

    pub fn layer(&self) -> &ContextLayer {
        &self.0.layer
    }

    pub fn parent(&self) -> Option<&DataContext> {
        self.0.parent.as_ref()
    }

    /// This context followed by its ancestors
    pub fn ancestors(&self) -> impl Iterator<Item = &DataContext> {
        std::iter::successors(Some(self), |c| c.parent())
    }

    /// Number of layers in the chain
    pub fn depth(&self) -> usize {
        self.ancestors().count()
    }

    pub fn ptr_eq(&self, other: &DataContext) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Whether this context itself is a projected result
    pub fn is_result(&self) -> bool {
        matches!(self.layer(), ContextLayer::ResultTuple(_))
    }

    pub fn connection(&self) -> Option<&ConnectionContext> {
        self.ancestors().find_map(|c| match c.layer() {
            ContextLayer::Connection(connection) => Some(connection),
            _ => None,
        })
    }

    /// Innermost CTE definition with the given name
    pub fn find_cte(&self, name: &str) -> Option<&NamedRowset> {
        self.ancestors().find_map(|c| match c.layer() {
            ContextLayer::NamedRowsets(rowsets) => {
                rowsets.iter().rev().find(|r| r.name.eq_ignore_ascii_case(name))
            }
            _ => None,
        })
    }

    /// Every CTE in scope, innermost first
    pub fn visible_ctes(&self) -> Vec<&NamedRowset> {
        self.ancestors()
            .filter_map(|c| match c.layer() {
                ContextLayer::NamedRowsets(rowsets) => Some(rowsets.iter().rev()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// FROM sources in scope, innermost query first; outer ones are
    /// reachable from correlated subqueries
    pub fn visible_sources(&self) -> Vec<&RowsSource> {
        self.ancestors()
            .filter_map(|c| match c.layer() {
                ContextLayer::RowsSources(sources) => Some(sources.iter()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn find_source(&self, qualifier: &[String]) -> Option<&RowsSource> {
        self.visible_sources().into_iter().find(|s| s.matches(qualifier))
    }

    /// Columns of the nearest projected result
    pub fn result_columns(&self) -> Option<&[ResultColumn]> {
        self.ancestors().find_map(|c| match c.layer() {
            ContextLayer::ResultTuple(columns) => Some(columns.as_slice()),
            _ => None,
        })
    }

    /// Flattened view for display and JSON output
    pub fn summary(&self) -> ContextSummary {
        ContextSummary {
            layers: self.ancestors().map(|c| c.layer().label()).collect(),
            connection: self.connection().cloned(),
            ctes: self.visible_ctes().iter().map(|r| r.name.clone()).collect(),
            sources: self
                .visible_sources()
                .iter()
                .map(|s| s.reference_name().to_string())
                .collect(),
            result_columns: self
                .result_columns()
                .map(|columns| columns.iter().map(|c| c.name.clone()).collect())
                .unwrap_or_default(),
        }
    }
}

impl Default for DataContext {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for DataContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.ancestors().map(|c| c.layer().label()))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextSummary {
    pub layers: Vec<&'static str>,
    pub connection: Option<ConnectionContext>,
    pub ctes: Vec<String>,
    pub sources: Vec<String>,
    pub result_columns: Vec<String>,
}
