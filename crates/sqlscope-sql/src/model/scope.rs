//! Lexical scopes, positioned items and symbol origins

use super::context::{ContextSummary, DataContext};
use crate::interval::Interval;
use crate::syntax::ClauseKind;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OriginKind {
    TableList,
    ColumnList,
    ProcedureList,
    CompositeFieldList,
    ReservedKeywordList,
}

/// Where the names valid at a position come from
#[derive(Debug, Clone)]
pub enum SymbolOrigin {
    /// Tables and CTEs, optionally under a schema/catalog qualifier
    TableList {
        context: DataContext,
        qualifier: Vec<String>,
    },
    /// Columns of the visible sources, or of one source when `rowset` is set
    ColumnList {
        context: DataContext,
        rowset: Option<String>,
    },
    ProcedureList {
        context: DataContext,
    },
    /// Fields of a composite value reached through `path`
    CompositeFieldList {
        context: DataContext,
        path: Vec<String>,
    },
    ReservedKeywordList {
        context: DataContext,
    },
}

impl SymbolOrigin {
    pub fn context(&self) -> &DataContext {
        match self {
            SymbolOrigin::TableList { context, .. }
            | SymbolOrigin::ColumnList { context, .. }
            | SymbolOrigin::ProcedureList { context }
            | SymbolOrigin::CompositeFieldList { context, .. }
            | SymbolOrigin::ReservedKeywordList { context } => context,
        }
    }

    pub fn kind(&self) -> OriginKind {
        match self {
            SymbolOrigin::TableList { .. } => OriginKind::TableList,
            SymbolOrigin::ColumnList { .. } => OriginKind::ColumnList,
            SymbolOrigin::ProcedureList { .. } => OriginKind::ProcedureList,
            SymbolOrigin::CompositeFieldList { .. } => OriginKind::CompositeFieldList,
            SymbolOrigin::ReservedKeywordList { .. } => OriginKind::ReservedKeywordList,
        }
    }

    pub fn summary(&self) -> OriginSummary {
        let (qualifier, rowset) = match self {
            SymbolOrigin::TableList { qualifier, .. } => (qualifier.clone(), None),
            SymbolOrigin::ColumnList { rowset, .. } => (Vec::new(), rowset.clone()),
            SymbolOrigin::CompositeFieldList { path, .. } => (path.clone(), None),
            _ => (Vec::new(), None),
        };

        OriginSummary {
            kind: self.kind(),
            qualifier,
            rowset,
            context: self.context().summary(),
        }
    }
}

/// Serializable view of an origin
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OriginSummary {
    pub kind: OriginKind,
    pub qualifier: Vec<String>,
    pub rowset: Option<String>,
    pub context: ContextSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ItemRole {
    /// Table name or one of its schema/catalog qualifiers
    TableName,
    TableAlias,
    /// Column name, its source qualifier or a composite member
    ColumnName,
    FunctionName,
    CteName,
    ColumnAlias,
    DerivedAlias,
}

/// One positioned name part
#[derive(Debug, Clone)]
pub struct LexicalScopeItem {
    pub interval: Interval,
    pub name: String,
    pub role: ItemRole,
    pub origin: Option<SymbolOrigin>,
}

/// Region of a node that shares one symbol origin
#[derive(Debug, Clone)]
pub struct LexicalScope {
    pub kind: ClauseKind,
    pub interval: Interval,
    /// Sorted by start offset
    pub items: Vec<LexicalScopeItem>,
    pub origin: Option<SymbolOrigin>,
}

impl LexicalScope {
    /// Item governing `offset`: the last one starting before it, as long as
    /// the offset is at most one past its end
    pub fn item_at(&self, offset: usize) -> Option<&LexicalScopeItem> {
        find_item(&self.items, offset)
    }
}

pub(crate) fn find_item(items: &[LexicalScopeItem], offset: usize) -> Option<&LexicalScopeItem> {
    let count = items.partition_point(|item| item.interval.start < offset);
    let candidates = &items[..count];
    let last_start = candidates.last()?.interval.start;

    // several items may share a start (a zero-width part next to a name)
    candidates
        .iter()
        .rev()
        .take_while(|item| item.interval.start == last_start)
        .find(|item| offset <= item.interval.end)
}
