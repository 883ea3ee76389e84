use sqlir::models::enums::DatabaseType;
use sqlir::query_ir::{
    AggregateFunction, ComparisonOperator, GenerateOptions, Literal, Operand, ParseOptions, QueryIR, SelectItem,
    emit_sql, ir_json_to_sql, ir_to_sql, is_dirty, parse_sql_to_ir, sql_to_ir,
};

fn parse(sql: &str) -> QueryIR {
    parse_sql_to_ir(sql, &ParseOptions::default()).expect("parse ok")
}

fn emit(ir: &QueryIR) -> String {
    emit_sql(ir, &GenerateOptions::default()).expect("emit ok")
}

#[test]
fn grouped_count_with_order_and_limit() {
    let resp = sql_to_ir(
        "SELECT u.name, COUNT(*) AS total FROM users u WHERE u.active = true GROUP BY u.name ORDER BY total DESC LIMIT 10",
        None,
    );
    assert!(resp.success, "{:?}", resp.error);
    let ir = resp.ir.expect("ir");

    let json = serde_json::to_value(&ir.select[1]).unwrap();
    assert_eq!(json["type"], "aggregate");
    assert_eq!(json["aggregate"], "COUNT");
    assert!(json["column"].is_null());
    assert_eq!(json["alias"], "total");

    let sql = ir_to_sql(&ir).sql.expect("sql");
    assert!(sql.contains("COUNT(*)"), "{}", sql);
    assert!(sql.contains("GROUP BY u.name"), "{}", sql);
    assert!(sql.contains("ORDER BY total DESC"), "{}", sql);
    assert!(sql.contains("LIMIT 10"), "{}", sql);
    assert!(sql.contains("u.active = TRUE"), "{}", sql);
}

#[test]
fn between_is_rejected_with_hint() {
    let resp = sql_to_ir("SELECT * FROM users WHERE age BETWEEN 20 AND 30", None);
    assert!(!resp.success);
    assert!(resp.unsupported_features.iter().any(|f| f == "BETWEEN (use >= and <= instead)"));
    assert!(resp.hint.is_some());
}

#[test]
fn count_distinct_from_json_document() {
    let doc = r#"{
        "select": [{"type": "aggregate", "aggregate": "COUNT_DISTINCT", "column": "user_id", "alias": "unique_users"}],
        "from": {"table": "orders"}
    }"#;
    let resp = ir_json_to_sql(doc, &GenerateOptions::default());
    assert!(resp.success, "{:?}", resp.error);
    assert!(resp.sql.unwrap().contains("COUNT(DISTINCT user_id) AS unique_users"));
}

#[test]
fn round_trip_is_stable() {
    let inputs = [
        "SELECT id, name FROM users WHERE status = 'active' AND age >= 21 ORDER BY name ASC LIMIT 5",
        "SELECT DISTINCT u.id FROM users u LEFT JOIN orders o ON u.id = o.user_id WHERE o.total > 100",
        "SELECT region, SUM(total) AS revenue FROM sales GROUP BY region HAVING SUM(total) > 1000",
        "SELECT * FROM events WHERE kind = :kind OR kind IS NULL",
        "SELECT * FROM t WHERE id IN (1, 2, 3)",
    ];
    for sql in inputs {
        let first = parse(sql);
        let regenerated = emit(&first);
        let second = parse(&regenerated);
        assert!(!is_dirty(Some(&first), &second), "{} -> {}", sql, regenerated);
        assert_eq!(regenerated, emit(&second));
    }
}

#[test]
fn count_star_and_count_column_are_different() {
    let star = parse("SELECT COUNT(*) FROM orders");
    let col = parse("SELECT COUNT(id) FROM orders");
    match (&star.select[0], &col.select[0]) {
        (SelectItem::Aggregate(a), SelectItem::Aggregate(b)) => {
            assert_eq!(a.aggregate, AggregateFunction::Count);
            assert_eq!(a.column, None);
            assert_eq!(b.column.as_deref(), Some("id"));
        }
        other => panic!("unexpected projection {:?}", other),
    }
    assert!(emit(&star).contains("COUNT(*)"));
    assert!(emit(&col).contains("COUNT(id)"));
}

#[test]
fn every_unsupported_construct_fails() {
    let cases = [
        "SELECT * FROM a UNION SELECT * FROM b",
        "WITH x AS (SELECT 1) SELECT * FROM x",
        "SELECT * FROM (SELECT id FROM t) s",
        "SELECT * FROM t WHERE id IN (SELECT id FROM u)",
        "SELECT ROW_NUMBER() OVER (ORDER BY id) FROM t",
        "SELECT CASE WHEN a > 1 THEN 1 ELSE 0 END FROM t",
        "SELECT * FROM t WHERE name NOT LIKE 'a%'",
        "SELECT * FROM t WHERE (a = 1 OR b = 2) AND c = 3",
        "SELECT a + b FROM t",
        "SELECT * FROM t LIMIT 10 OFFSET 5",
        "SELECT * FROM a RIGHT JOIN b ON a.id = b.id",
        "SELECT UPPER(name) FROM t",
        "SELECT COUNT(a + b) FROM t",
        "SELECT * FROM t WHERE EXISTS (SELECT 1 FROM u)",
    ];
    for sql in cases {
        let resp = sql_to_ir(sql, None);
        assert!(!resp.success, "expected rejection for {}", sql);
        assert!(resp.ir.is_none());
        assert!(!resp.unsupported_features.is_empty(), "no feature listed for {}", sql);
    }
}

#[test]
fn non_select_and_garbage_are_errors() {
    for sql in ["DELETE FROM users", "SELEC * FORM users", "", "SELECT 1; SELECT 2"] {
        let resp = sql_to_ir(sql, None);
        assert!(!resp.success, "{}", sql);
        assert!(resp.error.is_some());
    }
}

#[test]
fn literals_keep_their_type() {
    let ir = parse("SELECT * FROM people WHERE age > 100 AND name = 'O''Brien' AND score = -1.5");
    let conditions = &ir.filter.as_ref().unwrap().conditions;
    assert!(matches!(&conditions[0].operand, Some(Operand::Value(Literal::Number(n))) if n.as_i64() == Some(100)));
    assert_eq!(conditions[1].operand, Some(Operand::Value(Literal::String("O'Brien".into()))));

    let json = serde_json::to_value(&ir).unwrap();
    assert_eq!(json["where"]["conditions"][0]["value"], serde_json::json!(100));

    let sql = emit(&ir);
    assert!(sql.contains("age > 100"), "{}", sql);
    assert!(sql.contains("name = 'O''Brien'"), "{}", sql);
}

#[test]
fn parameters_survive_the_round_trip() {
    let ir = parse("SELECT * FROM orders WHERE status = :status AND region IN (:regions)");
    assert_eq!(ir.parameters(), vec!["status".to_string(), "regions".to_string()]);
    let conditions = &ir.filter.as_ref().unwrap().conditions;
    assert_eq!(conditions[1].operator, ComparisonOperator::In);
    let sql = emit(&ir);
    assert!(sql.contains("status = :status"), "{}", sql);
    assert!(sql.contains("region IN (:regions)"), "{}", sql);
}

#[test]
fn dirty_tracking_ignores_key_order() {
    let a: QueryIR = serde_json::from_str(r#"{"select":[{"type":"column","column":"id"}],"from":{"table":"t"},"limit":5}"#).unwrap();
    let b: QueryIR = serde_json::from_str(r#"{"limit":5,"from":{"table":"t"},"select":[{"column":"id","type":"column"}]}"#).unwrap();
    assert!(!is_dirty(Some(&a), &b));
    assert!(is_dirty(None, &b));

    let mut c = b.clone();
    c.limit = Some(6);
    assert!(is_dirty(Some(&a), &c));
}

#[test]
fn malformed_ir_never_panics() {
    let opts = GenerateOptions::default();
    let no_from = ir_json_to_sql(r#"{"select":[{"type":"column","column":"a"}]}"#, &opts);
    assert!(!no_from.success);

    let bad_aggregate = ir_json_to_sql(
        r#"{"select":[{"type":"aggregate","aggregate":"MEDIAN","column":"a"}],"from":{"table":"t"}}"#,
        &opts,
    );
    assert!(!bad_aggregate.success);

    let not_json = ir_json_to_sql("{", &opts);
    assert!(!not_json.success);

    let empty_column = ir_json_to_sql(
        r#"{"select":[{"type":"column","column":"*"}],"from":{"table":"t"},
            "where":{"operator":"AND","conditions":[{"column":"","operator":"=","value":"test"}]}}"#,
        &opts,
    );
    assert_eq!(empty_column.sql.as_deref(), Some("SELECT * FROM t WHERE  = 'test'"));
}

#[test]
fn reference_alias_table_round_trips() {
    let opts = ParseOptions::default().with_references(vec!["orders_5".to_string()]);
    let ir = parse_sql_to_ir("SELECT o.id FROM @orders_5 o WHERE o.total > 10", &opts).expect("ok");
    let sql = emit(&ir);
    assert!(sql.contains("FROM @orders_5 o"), "{}", sql);
}

#[test]
fn dialects_quote_and_render_booleans() {
    let ir = parse("SELECT \"order\" FROM t WHERE flag = true");
    let mssql = emit_sql(&ir, &GenerateOptions { pretty: false, database_type: DatabaseType::MsSQL }).unwrap();
    assert_eq!(mssql, "SELECT [order] FROM t WHERE flag = 1");

    let pretty = emit_sql(&ir, &GenerateOptions { pretty: true, database_type: DatabaseType::PostgreSQL }).unwrap();
    assert!(pretty.contains('\n'));
}

#[test]
fn quoted_mixed_case_identifiers_round_trip() {
    let options = ParseOptions::for_database(DatabaseType::PostgreSQL);
    let pg = GenerateOptions { pretty: false, database_type: DatabaseType::PostgreSQL };

    let ir = parse_sql_to_ir(r#"SELECT "UserId" FROM "Users""#, &options).expect("parse ok");
    let sql = emit_sql(&ir, &pg).expect("emit ok");
    assert_eq!(sql, r#"SELECT "UserId" FROM "Users""#);
    assert_eq!(parse_sql_to_ir(&sql, &options).expect("reparse ok"), ir);

    // unquoted names fold, so they come back bare
    let folded = parse_sql_to_ir("SELECT UserId FROM Users", &options).expect("parse ok");
    assert_eq!(emit_sql(&folded, &pg).expect("emit ok"), "SELECT userid FROM users");
}

#[test]
fn quoted_reserved_words_round_trip() {
    let ir = parse(r#"SELECT "from", "order" FROM t"#);
    let sql = emit(&ir);
    assert_eq!(sql, r#"SELECT "from", "order" FROM t"#);
    assert_eq!(parse(&sql), ir);
}

#[test]
fn high_precision_decimals_are_rejected_not_rounded() {
    let resp = sql_to_ir("SELECT * FROM t WHERE x = 0.12345678901234567890", None);
    assert!(!resp.success);
    assert!(resp.ir.is_none());
    assert!(
        resp.unsupported_features.iter().any(|f| f.contains("0.12345678901234567890")),
        "{:?}",
        resp.unsupported_features
    );
    assert!(resp.hint.is_some());

    let exact = parse("SELECT * FROM t WHERE price = 19.99");
    assert!(emit(&exact).contains("price = 19.99"), "{}", emit(&exact));
}
