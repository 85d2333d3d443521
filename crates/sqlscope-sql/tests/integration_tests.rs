//! End-to-end analysis and rewriting

use pretty_assertions::assert_eq;
use sqlscope_core::{Config, DialectConfig, DialectRules};
use sqlscope_sql::{
    analyze, split_statements, tokenize, ConnectionContext, DataContext, OriginKind, QueryFilter,
    StatementRewriter, SymbolOrigin,
};

#[test]
fn tokenize_and_split_a_script() {
    let rules = DialectRules::for_dialect(DialectConfig::MsSql);
    let script = "SELECT [order id] FROM [dbo].[Orders]; -- first\nSELECT 1;\n;";

    let tokens = tokenize(script, &rules);
    let rebuilt: String = tokens.iter().map(|t| t.text.as_str()).collect();
    assert_eq!(rebuilt, script);

    let statements: Vec<&str> = split_statements(&tokens)
        .into_iter()
        .map(|interval| interval.slice(script))
        .collect();
    assert_eq!(statements, vec!["SELECT [order id] FROM [dbo].[Orders]", "SELECT 1"]);
}

#[test]
fn completion_inside_a_cte_backed_query() {
    let rules = DialectRules::ansi();
    let text = "WITH recent AS (SELECT id, total FROM orders) SELECT r. FROM recent r";
    let query = analyze(text, &rules, &DataContext::empty(), ConnectionContext::default());

    let offset = text.find("r. ").unwrap() + 2;
    let resolution = query.resolve(offset);

    match resolution.symbol_origin {
        Some(SymbolOrigin::ColumnList { context, rowset }) => {
            assert_eq!(rowset.as_deref(), Some("r"));
            let summary = context.summary();
            assert!(summary.ctes.contains(&"recent".to_string()));
            assert_eq!(summary.sources, vec!["r"]);
        }
        other => panic!("unexpected origin {other:?}"),
    }

    let from_offset = text.rfind("recent").unwrap() + 2;
    assert_eq!(
        query.resolve(from_offset).symbol_origin.map(|o| o.kind()),
        Some(OriginKind::TableList)
    );
}

#[test]
fn connection_context_reaches_every_origin() {
    let rules = DialectRules::ansi();
    let connection = ConnectionContext::new(Some("warehouse".into()), Some("sales".into()));
    let text = "SELECT a FROM t WHERE ";
    let query = analyze(text, &rules, &DataContext::empty(), connection.clone());

    for offset in 0..=text.len() {
        if let Some(origin) = query.resolve(offset).symbol_origin {
            assert_eq!(origin.context().connection(), Some(&connection), "offset {offset}");
        }
    }
}

#[test]
fn inject_filter_from_config_and_json() {
    let config = Config::from_toml(
        r#"
dialect = "postgres"

[rewriter]
parse_timeout_ms = 500
worker_threads = 1
"#,
    )
    .unwrap();
    let rewriter = StatementRewriter::from_config(&config).unwrap();

    let filter: QueryFilter = serde_json::from_str(
        r#"{
            "conditions": [
                {"attribute": {"name": "owner", "entity": "o"}, "predicate": {"kind": "compare", "op": "eq", "value": "it's"}},
                {"attribute": {"name": "deleted_at", "entity": "o"}, "predicate": {"kind": "is_null"}}
            ],
            "orderings": [{"attribute": {"name": "created_at", "entity": "o"}, "position": 2, "descending": true}]
        }"#,
    )
    .unwrap();

    let sql = "SELECT o.id, o.created_at\nFROM orders o\nJOIN users u ON u.id = o.user_id\nLIMIT 20;";
    let result = rewriter.inject_filter(sql, &filter).unwrap();

    assert_eq!(
        result,
        "SELECT o.id, o.created_at\nFROM orders o\nJOIN users u ON u.id = o.user_id\n\
         WHERE o.owner = 'it''s' AND o.deleted_at IS NULL ORDER BY o.created_at DESC LIMIT 20"
    );
}
