//! Context propagation
//!
//! One top-down pass threads a `DataContext` through the tree. Every node
//! receives a given context from its parent and produces a result context
//! from its own content and its children only.

use super::context::{
    ColumnType, ConnectionContext, DataContext, NamedRowset, ResultColumn, RowsSource, RowsSourceKind,
};
use super::node::{AnalyzedQuery, ModelNode, NodeId, QueryModel, QueryNode};
use super::scope::{LexicalScope, LexicalScopeItem, SymbolOrigin};
use crate::interval::Interval;
use crate::syntax::{ClauseKind, ProjectionItem, StatementKind, SymbolKind, SymbolRef, SyntaxKind};

/// Contexts computed for one node
struct NodeContexts {
    given: DataContext,
    result: DataContext,
    /// FROM sources layered on the given context (SELECT and other statements)
    rows: Option<DataContext>,
}

impl QueryModel {
    /// Thread contexts through the tree and fill in every origin
    ///
    /// `root_context` seeds the root's given context, which is then bound
    /// to `connection`.
    pub fn propagate_context(self, root_context: &DataContext, connection: ConnectionContext) -> AnalyzedQuery {
        let mut contexts: Vec<Option<NodeContexts>> = (0..self.nodes.len()).map(|_| None).collect();
        let given = root_context.with_connection(connection);

        let mut pass = Propagation {
            model: &self,
            contexts: &mut contexts,
        };
        pass.visit(NodeId::ROOT, given);

        let QueryModel {
            nodes,
            symbols,
            items,
            symbol_items,
        } = self;
        let mut analyzed_nodes = Vec::with_capacity(nodes.len());
        let mut all_items = Vec::with_capacity(items.len());
        let mut item_origins: Vec<Option<SymbolOrigin>> = vec![None; items.len()];

        for (index, node) in nodes.iter().enumerate() {
            let ctx = contexts[index].take().unwrap_or_else(|| NodeContexts {
                given: DataContext::empty(),
                result: DataContext::empty(),
                rows: None,
            });

            for &(symbol, scope) in &node.symbols {
                let clause = scope.map(|s| node.scopes[s].kind);
                let value_context = value_context(&ctx, clause);
                for item_index in symbol_items[symbol].clone() {
                    item_origins[item_index] =
                        item_origin(&symbols[symbol], items[item_index].part, &ctx.given, &value_context);
                }
            }

            let scopes = node
                .scopes
                .iter()
                .map(|scope| LexicalScope {
                    kind: scope.kind,
                    interval: scope.interval,
                    items: scope
                        .items
                        .iter()
                        .map(|&i| scoped_item(&items[i], &item_origins[i]))
                        .collect(),
                    origin: scope_origin(scope.kind, &ctx),
                })
                .collect::<Vec<_>>();

            let tail_origin = scopes
                .iter()
                .filter(|s| s.interval.touches(node.interval.end))
                .min_by_key(|s| s.interval.len())
                .and_then(|s| s.origin.clone());

            analyzed_nodes.push(QueryNode {
                id: NodeId(index),
                kind: node.kind.clone(),
                interval: node.interval,
                parent: node.parent,
                children: node.children.clone(),
                scopes,
                given_context: ctx.given,
                result_context: ctx.result,
                tail_origin,
            });
        }

        for (index, item) in items.iter().enumerate() {
            all_items.push(scoped_item(item, &item_origins[index]));
        }
        all_items.sort_by_key(|i| i.interval.start);

        let mut analyzed = AnalyzedQuery {
            nodes: analyzed_nodes,
            items: all_items,
        };
        analyzed.nodes[0].tail_origin = root_tail_origin(&analyzed);

        tracing::debug!(
            nodes = analyzed.nodes.len(),
            items = analyzed.items.len(),
            "Propagated data contexts"
        );

        analyzed
    }
}

fn scoped_item(item: &super::node::PendingItem, origin: &Option<SymbolOrigin>) -> LexicalScopeItem {
    LexicalScopeItem {
        interval: item.interval,
        name: item.name.clone(),
        role: item.role,
        origin: origin.clone(),
    }
}

/// Origin governing the end of the root interval
fn root_tail_origin(query: &AnalyzedQuery) -> Option<SymbolOrigin> {
    let end = query.root().interval.end;
    let path = crate::resolver::descend(query, end);

    path.iter()
        .rev()
        .find_map(|&id| query.nodes[id.0].scope_at(end))
        .and_then(|scope| scope.origin.clone())
        .or_else(|| {
            path.last()
                .and_then(|&id| query.nodes[id.0].tail_origin.clone())
        })
}

/// Context value references resolve against
fn value_context(ctx: &NodeContexts, clause: Option<ClauseKind>) -> DataContext {
    match clause {
        Some(ClauseKind::OrderBy) => ctx.result.clone(),
        _ => ctx.rows.clone().unwrap_or_else(|| ctx.given.clone()),
    }
}

fn scope_origin(kind: ClauseKind, ctx: &NodeContexts) -> Option<SymbolOrigin> {
    let rows = || ctx.rows.clone().unwrap_or_else(|| ctx.given.clone());

    match kind {
        ClauseKind::Projection
        | ClauseKind::JoinCondition
        | ClauseKind::Where
        | ClauseKind::GroupBy
        | ClauseKind::Having
        | ClauseKind::Window
        | ClauseKind::Qualify => Some(SymbolOrigin::ColumnList {
            context: rows(),
            rowset: None,
        }),
        ClauseKind::From => Some(SymbolOrigin::TableList {
            context: ctx.given.clone(),
            qualifier: Vec::new(),
        }),
        ClauseKind::OrderBy => Some(SymbolOrigin::ColumnList {
            context: ctx.result.clone(),
            rowset: None,
        }),
        ClauseKind::Condition => Some(SymbolOrigin::ColumnList {
            context: ctx.given.clone(),
            rowset: None,
        }),
        ClauseKind::Statement => Some(SymbolOrigin::ReservedKeywordList {
            context: ctx.given.clone(),
        }),
        ClauseKind::Into | ClauseKind::Limit => None,
    }
}

fn item_origin(
    symbol: &SymbolRef,
    part: Option<usize>,
    given: &DataContext,
    values: &DataContext,
) -> Option<SymbolOrigin> {
    let part = part?;
    let path = symbol.path();

    match &symbol.kind {
        SymbolKind::Table { .. } => Some(SymbolOrigin::TableList {
            context: given.clone(),
            qualifier: path[..part].to_vec(),
        }),
        SymbolKind::Function if part + 1 == path.len() => Some(SymbolOrigin::ProcedureList {
            context: values.clone(),
        }),
        SymbolKind::Function => Some(SymbolOrigin::TableList {
            context: given.clone(),
            qualifier: path[..part].to_vec(),
        }),
        SymbolKind::Column => Some(column_part_origin(&path, part, values)),
        SymbolKind::CteName | SymbolKind::ColumnAlias | SymbolKind::DerivedAlias => None,
    }
}

/// Origin of one part of a column path
///
/// The longest prefix naming a visible source is the qualifier; the part
/// after it is the column and anything further is a composite member.
fn column_part_origin(path: &[String], part: usize, context: &DataContext) -> SymbolOrigin {
    let table_list = |upto: usize| SymbolOrigin::TableList {
        context: context.clone(),
        qualifier: path[..upto].to_vec(),
    };
    let composite = |upto: usize| SymbolOrigin::CompositeFieldList {
        context: context.clone(),
        path: path[..upto].to_vec(),
    };

    let source = (1..path.len())
        .rev()
        .find_map(|k| context.find_source(&path[..k]).map(|s| (k, s.reference_name().to_string())));

    if let Some((k, rowset)) = source {
        return match part.cmp(&k) {
            std::cmp::Ordering::Less => table_list(part),
            std::cmp::Ordering::Equal => SymbolOrigin::ColumnList {
                context: context.clone(),
                rowset: Some(rowset),
            },
            std::cmp::Ordering::Greater => composite(part),
        };
    }

    if path.len() == 1 || (part == 0 && !has_qualifier_shape(path, context)) {
        return SymbolOrigin::ColumnList {
            context: context.clone(),
            rowset: None,
        };
    }

    if !has_qualifier_shape(path, context) {
        return composite(part);
    }

    if part + 1 < path.len() {
        table_list(part)
    } else {
        SymbolOrigin::ColumnList {
            context: context.clone(),
            rowset: Some(path[..part].join(".")),
        }
    }
}

/// Whether an unresolved multi-part path reads as `qualifier.column`
/// rather than `column.member`
fn has_qualifier_shape(path: &[String], context: &DataContext) -> bool {
    let first = &path[0];
    !context.visible_sources().iter().any(|s| s.has_column(first))
}

struct Propagation<'m, 'c> {
    model: &'m QueryModel,
    contexts: &'c mut Vec<Option<NodeContexts>>,
}

impl Propagation<'_, '_> {
    fn node(&self, id: NodeId) -> &ModelNode {
        &self.model.nodes[id.0]
    }

    fn visit(&mut self, id: NodeId, given: DataContext) -> DataContext {
        let kind = self.node(id).kind.clone();

        let contexts = match &kind {
            SyntaxKind::Statement(StatementKind::Other(_)) => self.visit_other(id, given),
            SyntaxKind::Statement(_) | SyntaxKind::Cte { .. } | SyntaxKind::Subquery { .. } => {
                let result = self.visit_query(id, given.clone());
                NodeContexts {
                    given,
                    result,
                    rows: None,
                }
            }
            SyntaxKind::With { recursive } => {
                let result = self.visit_with(id, given.clone(), *recursive);
                NodeContexts {
                    given,
                    result,
                    rows: None,
                }
            }
            SyntaxKind::Select { projection } => self.visit_select(id, given, projection),
        };

        let result = contexts.result.clone();
        self.contexts[id.0] = Some(contexts);
        result
    }

    /// Optional WITH followed by query bodies; the first body names the result
    fn visit_query(&mut self, id: NodeId, given: DataContext) -> DataContext {
        let mut current = given.clone();
        let mut result = None;

        for child in self.node(id).children.clone() {
            let child_result = self.visit(child, current.clone());
            if matches!(self.node(child).kind, SyntaxKind::With { .. }) {
                current = child_result;
            } else if result.is_none() {
                result = Some(child_result);
            }
        }

        result.unwrap_or(given)
    }

    fn visit_with(&mut self, id: NodeId, given: DataContext, recursive: bool) -> DataContext {
        let mut current = given;

        for child in self.node(id).children.clone() {
            let (name, declared) = match &self.node(child).kind {
                SyntaxKind::Cte { name, columns } => (name.clone(), columns.clone()),
                _ => {
                    self.visit(child, current.clone());
                    continue;
                }
            };
            let interval = self.node(child).interval;

            let body_context = if recursive {
                current.with_named_rowsets(vec![NamedRowset {
                    name: name.clone(),
                    columns: declared.clone(),
                    interval,
                }])
            } else {
                current.clone()
            };

            let body = self.visit(child, body_context);
            let columns = if declared.is_empty() {
                body.result_columns()
                    .map(|cols| cols.iter().map(|c| c.name.clone()).collect())
                    .unwrap_or_default()
            } else {
                declared
            };

            current = current.with_named_rowsets(vec![NamedRowset {
                name,
                columns,
                interval,
            }]);
        }

        current
    }

    fn visit_select(&mut self, id: NodeId, given: DataContext, projection: &[ProjectionItem]) -> NodeContexts {
        let children = self.node(id).children.clone();
        let mut sources: Vec<RowsSource> = Vec::new();
        let mut derived_aliases = Vec::new();

        for &child in &children {
            if let SyntaxKind::Subquery {
                alias,
                derived: true,
            } = &self.node(child).kind
            {
                let alias = alias.clone();
                let interval = self.node(child).interval;
                let result = self.visit(child, given.clone());
                derived_aliases.extend(alias.clone());
                sources.push(RowsSource {
                    path: Vec::new(),
                    alias,
                    kind: RowsSourceKind::Derived,
                    columns: column_names(&result),
                    interval,
                });
            }
        }

        sources.extend(self.table_sources(id, &given, &derived_aliases));
        sources.sort_by_key(|s| s.interval.start);

        let rows = given.with_rows_sources(sources.clone());

        for &child in &children {
            if !matches!(self.node(child).kind, SyntaxKind::Subquery { derived: true, .. }) {
                self.visit(child, rows.clone());
            }
        }

        let columns = projection
            .iter()
            .flat_map(|item| project(item, &sources))
            .collect();

        NodeContexts {
            given,
            result: rows.with_result_tuple(columns),
            rows: Some(rows),
        }
    }

    fn visit_other(&mut self, id: NodeId, given: DataContext) -> NodeContexts {
        let sources = self.table_sources(id, &given, &[]);
        let rows = given.with_rows_sources(sources);

        let mut current = given.clone();
        for child in self.node(id).children.clone() {
            let result = self.visit(child, current.clone());
            if matches!(self.node(child).kind, SyntaxKind::With { .. }) {
                current = result;
            }
        }

        NodeContexts {
            result: given.clone(),
            given,
            rows: Some(rows),
        }
    }

    /// Sources contributed by table references and aliased table functions
    fn table_sources(&self, id: NodeId, given: &DataContext, derived_aliases: &[String]) -> Vec<RowsSource> {
        let mut sources = Vec::new();

        for &(index, _) in &self.node(id).symbols {
            let symbol = &self.model.symbols[index];
            match &symbol.kind {
                SymbolKind::Table { alias } => {
                    let path = symbol.path();
                    let cte = match path.as_slice() {
                        [name] => given.find_cte(name),
                        _ => None,
                    };
                    let end = alias.as_ref().map_or(symbol.interval.end, |a| a.interval.end);

                    sources.push(RowsSource {
                        kind: if cte.is_some() {
                            RowsSourceKind::Cte
                        } else {
                            RowsSourceKind::Table
                        },
                        columns: cte.map(|c| c.columns.clone()).unwrap_or_default(),
                        path,
                        alias: alias.as_ref().map(|a| a.name.clone()),
                        interval: symbol.interval.hull(&Interval::empty_at(end)),
                    });
                }
                SymbolKind::DerivedAlias if !derived_aliases.iter().any(|a| a == symbol.name()) => {
                    sources.push(RowsSource {
                        path: Vec::new(),
                        alias: Some(symbol.name().to_string()),
                        kind: RowsSourceKind::Derived,
                        columns: Vec::new(),
                        interval: symbol.interval,
                    });
                }
                _ => {}
            }
        }

        sources
    }
}

fn column_names(context: &DataContext) -> Vec<String> {
    context
        .result_columns()
        .map(|cols| cols.iter().map(|c| c.name.clone()).collect())
        .unwrap_or_default()
}

/// Result columns contributed by one projection item
fn project(item: &ProjectionItem, sources: &[RowsSource]) -> Vec<ResultColumn> {
    if let Some(qualifier) = &item.wildcard {
        return sources
            .iter()
            .filter(|s| qualifier.is_empty() || s.matches(qualifier))
            .flat_map(|s| {
                s.columns.iter().map(|c| ResultColumn {
                    name: c.clone(),
                    source: Some(s.reference_name().to_string()),
                    ty: ColumnType::Resolved(s.reference_name().to_string()),
                })
            })
            .collect();
    }

    let column = item.column.as_deref().and_then(|path| path.split_last());
    let name = item
        .alias
        .clone()
        .or_else(|| column.map(|(name, _)| name.clone()))
        .unwrap_or_else(|| "?column?".to_string());

    let Some((column_name, qualifier)) = column else {
        return vec![ResultColumn::unknown(name)];
    };

    let source = if qualifier.is_empty() {
        let owners: Vec<&RowsSource> = sources.iter().filter(|s| s.has_column(column_name)).collect();
        match (owners.as_slice(), sources) {
            ([owner], _) => Some(*owner),
            ([], [only]) => Some(only),
            _ => None,
        }
    } else {
        sources.iter().find(|s| s.matches(qualifier))
    };

    let ty = match source {
        Some(s) if s.has_column(column_name) => ColumnType::Resolved(s.reference_name().to_string()),
        _ => ColumnType::Unknown,
    };

    vec![ResultColumn {
        name,
        source: source.map(|s| s.reference_name().to_string()),
        ty,
    }]
}
