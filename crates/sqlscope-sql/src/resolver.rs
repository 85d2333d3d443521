//! Offset resolution
//!
//! Maps a cursor offset in an analysed statement to the node, scope,
//! lexical item and symbol origin that govern it. Resolution is total:
//! every offset, including ones past the end of the text, yields a result.

use crate::interval::Interval;
use crate::model::scope::find_item;
use crate::model::{
    AnalyzedQuery, ContextSummary, DataContext, ItemRole, LexicalScope, LexicalScopeItem, NodeId,
    OriginSummary, SymbolOrigin,
};
use crate::syntax::ClauseKind;
use serde::Serialize;

/// Caller-supplied inputs to resolution
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Context used as the nearest result when the descent path has none,
    /// e.g. the result of an enclosing query the text is embedded in
    pub base_context: Option<DataContext>,
}

impl ResolveOptions {
    pub fn with_base_context(context: DataContext) -> Self {
        Self {
            base_context: Some(context),
        }
    }
}

/// Everything known about one offset
#[derive(Debug, Clone)]
pub struct Resolution<'q> {
    pub offset: usize,
    /// Deepest node on the descent path
    pub node: NodeId,
    pub nearest_result_context: DataContext,
    pub deepest_context: DataContext,
    pub scope: Option<&'q LexicalScope>,
    pub lexical_item: Option<&'q LexicalScopeItem>,
    pub symbol_origin: Option<&'q SymbolOrigin>,
}

impl Resolution<'_> {
    pub fn summary(&self) -> ResolutionSummary {
        ResolutionSummary {
            offset: self.offset,
            node: self.node,
            scope: self.scope.map(|s| ScopeSummary {
                kind: s.kind,
                interval: s.interval,
            }),
            item: self.lexical_item.map(|i| ItemSummary {
                name: i.name.clone(),
                role: i.role,
                interval: i.interval,
            }),
            origin: self.symbol_origin.map(SymbolOrigin::summary),
            nearest_result: self.nearest_result_context.summary(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeSummary {
    pub kind: ClauseKind,
    pub interval: Interval,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemSummary {
    pub name: String,
    pub role: ItemRole,
    pub interval: Interval,
}

/// Serializable view of a [`Resolution`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionSummary {
    pub offset: usize,
    pub node: NodeId,
    pub scope: Option<ScopeSummary>,
    pub item: Option<ItemSummary>,
    pub origin: Option<OriginSummary>,
    pub nearest_result: ContextSummary,
}

impl AnalyzedQuery {
    pub fn resolve(&self, offset: usize) -> Resolution<'_> {
        self.resolve_with(offset, &ResolveOptions::default())
    }

    pub fn resolve_with(&self, offset: usize, options: &ResolveOptions) -> Resolution<'_> {
        let root = self.root();
        let path = descend(self, offset);
        let deepest = path.last().copied().unwrap_or(NodeId::ROOT);

        let scope = path
            .iter()
            .rev()
            .find_map(|&id| self.nodes[id.0].scope_at(offset));

        let lexical_item = scope
            .and_then(|s| s.item_at(offset))
            .or_else(|| find_item(&self.items, offset));

        let symbol_origin = lexical_item
            .and_then(|i| i.origin.as_ref())
            .or_else(|| {
                if offset > root.interval.end {
                    root.tail_origin.as_ref()
                } else {
                    None
                }
            })
            .or_else(|| scope.and_then(|s| s.origin.as_ref()));

        let nearest_result_context = path
            .iter()
            .rev()
            .map(|&id| &self.nodes[id.0].result_context)
            .find(|c| c.is_result())
            .or(options.base_context.as_ref())
            .unwrap_or(&root.given_context)
            .clone();

        let resolution = Resolution {
            offset,
            node: deepest,
            nearest_result_context,
            deepest_context: self.nodes[deepest.0].given_context.clone(),
            scope,
            lexical_item,
            symbol_origin,
        };

        tracing::debug!(
            offset,
            node = deepest.0,
            scope = ?resolution.scope.map(|s| s.kind),
            origin = ?resolution.symbol_origin.map(SymbolOrigin::kind),
            "Resolved offset"
        );

        resolution
    }
}

/// Root-to-leaf path of the nodes containing `offset`
///
/// A child that ends exactly at the offset is taken when no child contains
/// it, so a cursor right after a subquery still lands inside it.
pub(crate) fn descend(query: &AnalyzedQuery, offset: usize) -> Vec<NodeId> {
    let mut path = vec![NodeId::ROOT];
    let mut current = query.root();

    loop {
        let children = || current.children.iter().map(|c| &query.nodes[c.0]);
        let next = children()
            .find(|c| c.interval.contains(offset))
            .or_else(|| children().find(|c| c.interval.end == offset));

        match next {
            Some(child) => {
                path.push(child.id);
                current = child;
            }
            None => break,
        }
    }

    path
}
