//! Node model tree
//!
//! Nodes live in one arena vector and refer to each other by index. The
//! tree is built from a syntax outline and later consumed by context
//! propagation, which yields the immutable [`AnalyzedQuery`].

use super::context::DataContext;
use super::scope::{ItemRole, LexicalScope, LexicalScopeItem, SymbolOrigin};
use crate::interval::Interval;
use crate::syntax::{ClauseKind, SymbolKind, SymbolRef, SyntaxKind, SyntaxNode, SyntaxTree};
use serde::Serialize;
use std::ops::Range;

/// Index of a node in its model's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);
}

/// Item before propagation: which part of its symbol it stands for
#[derive(Debug, Clone)]
pub(crate) struct PendingItem {
    pub interval: Interval,
    pub name: String,
    pub role: ItemRole,
    /// `None` for the alias of a table reference
    pub part: Option<usize>,
}

#[derive(Debug, Clone)]
pub(crate) struct PendingScope {
    pub kind: ClauseKind,
    pub interval: Interval,
    pub items: Vec<usize>,
}

#[derive(Debug, Clone)]
pub(crate) struct ModelNode {
    pub kind: SyntaxKind,
    pub interval: Interval,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub scopes: Vec<PendingScope>,
    /// Symbols whose deepest covering node is this one, with their scope
    pub symbols: Vec<(usize, Option<usize>)>,
}

/// Built but not yet analysed tree
///
/// The only way forward is [`QueryModel::propagate_context`], which
/// consumes the model.
#[derive(Debug, Clone)]
pub struct QueryModel {
    pub(crate) nodes: Vec<ModelNode>,
    pub(crate) symbols: Vec<SymbolRef>,
    pub(crate) items: Vec<PendingItem>,
    /// Range of `items` produced by each symbol
    pub(crate) symbol_items: Vec<Range<usize>>,
}

impl QueryModel {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root_interval(&self) -> Interval {
        self.nodes.first().map(|n| n.interval).unwrap_or_default()
    }

    pub fn kind(&self, id: NodeId) -> Option<&SyntaxKind> {
        self.nodes.get(id.0).map(|n| &n.kind)
    }

    pub fn symbols(&self) -> &[SymbolRef] {
        &self.symbols
    }
}

/// Arena tree for one analysed statement
#[derive(Debug, Clone)]
pub struct QueryNode {
    pub id: NodeId,
    pub kind: SyntaxKind,
    pub interval: Interval,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub scopes: Vec<LexicalScope>,
    pub given_context: DataContext,
    pub result_context: DataContext,
    pub tail_origin: Option<SymbolOrigin>,
}

impl QueryNode {
    /// Scope governing `offset` within this node
    ///
    /// Narrowest scope touching the offset; a scope the offset is strictly
    /// inside (or at the end of) wins over one that merely starts there.
    pub fn scope_at(&self, offset: usize) -> Option<&LexicalScope> {
        let narrowest = |pred: &dyn Fn(&LexicalScope) -> bool| {
            self.scopes
                .iter()
                .filter(|s| pred(s))
                .fold(None::<&LexicalScope>, |best, s| match best {
                    Some(b) if b.interval.len() <= s.interval.len() => Some(b),
                    _ => Some(s),
                })
        };

        narrowest(&|s| s.interval.start < offset && offset <= s.interval.end)
            .or_else(|| narrowest(&|s| s.interval.touches(offset)))
    }
}

/// Analysed statement: every node carries its contexts and origins
#[derive(Debug, Clone)]
pub struct AnalyzedQuery {
    pub(crate) nodes: Vec<QueryNode>,
    /// Every item of the statement, sorted by start
    pub(crate) items: Vec<LexicalScopeItem>,
}

impl AnalyzedQuery {
    pub fn root(&self) -> &QueryNode {
        &self.nodes[0]
    }

    pub fn node(&self, id: NodeId) -> Option<&QueryNode> {
        self.nodes.get(id.0)
    }

    pub fn nodes(&self) -> &[QueryNode] {
        &self.nodes
    }

    pub fn items(&self) -> &[LexicalScopeItem] {
        &self.items
    }

    pub fn tail_origin(&self) -> Option<&SymbolOrigin> {
        self.root().tail_origin.as_ref()
    }
}

/// Lay out a syntax outline as an arena tree and attach its symbols
pub fn build_model(tree: SyntaxTree) -> QueryModel {
    let SyntaxTree { root, symbols } = tree;

    let mut nodes = Vec::new();
    push_node(&mut nodes, root, None);

    let mut items = Vec::new();
    let mut ranges = Vec::with_capacity(symbols.len());
    for (index, symbol) in symbols.iter().enumerate() {
        let home = deepest_covering(&nodes, symbol.interval);
        let node = &mut nodes[home.0];
        let scope = narrowest_scope(&node.scopes, symbol.interval);
        node.symbols.push((index, scope));

        let first = items.len();
        for item in symbol_items(symbol) {
            if let Some(scope) = scope {
                node.scopes[scope].items.push(items.len());
            }
            items.push(item);
        }
        ranges.push(first..items.len());
    }

    for node in &mut nodes {
        for scope in &mut node.scopes {
            scope.items.sort_by_key(|&i| items[i].interval.start);
        }
    }

    tracing::debug!(nodes = nodes.len(), items = items.len(), "Built query model");

    QueryModel {
        nodes,
        symbols,
        items,
        symbol_items: ranges,
    }
}

fn push_node(nodes: &mut Vec<ModelNode>, syntax: SyntaxNode, parent: Option<NodeId>) -> NodeId {
    let id = NodeId(nodes.len());
    let SyntaxNode {
        kind,
        interval,
        clauses,
        children,
    } = syntax;

    nodes.push(ModelNode {
        kind,
        interval,
        parent,
        children: Vec::new(),
        scopes: clauses
            .into_iter()
            .map(|c| PendingScope {
                kind: c.kind,
                interval: c.interval,
                items: Vec::new(),
            })
            .collect(),
        symbols: Vec::new(),
    });

    for child in children {
        let child_id = push_node(nodes, child, Some(id));
        nodes[id.0].children.push(child_id);
    }

    id
}

fn deepest_covering(nodes: &[ModelNode], interval: Interval) -> NodeId {
    let mut current = NodeId::ROOT;
    while let Some(&child) = nodes[current.0]
        .children
        .iter()
        .find(|c| nodes[c.0].interval.covers(&interval))
    {
        current = child;
    }
    current
}

fn narrowest_scope(scopes: &[PendingScope], interval: Interval) -> Option<usize> {
    scopes
        .iter()
        .enumerate()
        .filter(|(_, s)| s.interval.covers(&interval))
        .min_by_key(|(i, s)| (s.interval.len(), *i))
        .map(|(i, _)| i)
}

fn symbol_items(symbol: &SymbolRef) -> Vec<PendingItem> {
    let role = match symbol.kind {
        SymbolKind::Table { .. } => ItemRole::TableName,
        SymbolKind::Column => ItemRole::ColumnName,
        SymbolKind::Function => ItemRole::FunctionName,
        SymbolKind::CteName => ItemRole::CteName,
        SymbolKind::ColumnAlias => ItemRole::ColumnAlias,
        SymbolKind::DerivedAlias => ItemRole::DerivedAlias,
    };

    let mut items: Vec<PendingItem> = symbol
        .parts
        .iter()
        .enumerate()
        .map(|(part, p)| PendingItem {
            interval: p.interval,
            name: p.name.clone(),
            role,
            part: Some(part),
        })
        .collect();

    if let SymbolKind::Table { alias: Some(alias) } = &symbol.kind {
        items.push(PendingItem {
            interval: alias.interval,
            name: alias.name.clone(),
            role: ItemRole::TableAlias,
            part: None,
        });
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse_outline;
    use sqlscope_core::DialectRules;

    fn model(text: &str) -> QueryModel {
        build_model(parse_outline(text, &DialectRules::ansi()))
    }

    #[test]
    fn arena_links_are_consistent() {
        let model = model("WITH c AS (SELECT 1 AS x) SELECT x FROM c WHERE x IN (SELECT x FROM c)");

        assert!(matches!(model.kind(NodeId::ROOT), Some(SyntaxKind::Statement(_))));
        for (i, node) in model.nodes.iter().enumerate() {
            for child in &node.children {
                assert_eq!(model.nodes[child.0].parent, Some(NodeId(i)));
                assert!(node.interval.covers(&model.nodes[child.0].interval));
            }
            for pair in node.children.windows(2) {
                let (a, b) = (&model.nodes[pair[0].0], &model.nodes[pair[1].0]);
                assert!(a.interval.end <= b.interval.start);
            }
        }
    }

    #[test]
    fn each_symbol_owns_a_contiguous_item_range() {
        let model = model("SELECT s.o.total, f(x) FROM db.sales.orders o");

        assert_eq!(model.symbol_items.len(), model.symbols.len());
        let mut next = 0;
        for (symbol, range) in model.symbols.iter().zip(&model.symbol_items) {
            assert_eq!(range.start, next);
            let names: Vec<&str> = model.items[range.clone()].iter().map(|i| i.name.as_str()).collect();
            let mut expected: Vec<&str> = symbol.parts.iter().map(|p| p.name.as_str()).collect();
            if let SymbolKind::Table { alias: Some(alias) } = &symbol.kind {
                expected.push(alias.name.as_str());
            }
            assert_eq!(names, expected);
            next = range.end;
        }
        assert_eq!(next, model.items.len());
    }

    #[test]
    fn symbols_land_in_the_deepest_node() {
        let text = "SELECT a FROM t WHERE a IN (SELECT b FROM u)";
        let model = model(text);

        let inner = model
            .nodes
            .iter()
            .rposition(|n| matches!(n.kind, SyntaxKind::Select { .. }))
            .unwrap();
        let names: Vec<&str> = model.nodes[inner]
            .symbols
            .iter()
            .map(|(s, _)| model.symbols[*s].name())
            .collect();
        assert_eq!(names, vec!["b", "u"]);
    }

    #[test]
    fn items_sit_in_the_narrowest_scope() {
        let text = "SELECT o.id FROM orders o JOIN items i ON i.order_id = o.id";
        let model = model(text);
        let select = &model.nodes[1];

        let join = select
            .scopes
            .iter()
            .find(|s| s.kind == ClauseKind::JoinCondition)
            .unwrap();
        let names: Vec<&str> = join.items.iter().map(|&i| model.items[i].name.as_str()).collect();
        assert_eq!(names, vec!["i", "order_id", "o", "id"]);

        let from = select.scopes.iter().find(|s| s.kind == ClauseKind::From).unwrap();
        let roles: Vec<ItemRole> = from.items.iter().map(|&i| model.items[i].role).collect();
        assert_eq!(
            roles,
            vec![
                ItemRole::TableName,
                ItemRole::TableAlias,
                ItemRole::TableName,
                ItemRole::TableAlias
            ]
        );
    }
}
