//! End-to-end compilation: validation gating, planning, and golden SQL.

use prism::prelude::*;

fn nestle_catalog() -> Catalog {
    Catalog::from_toml_str(
        r#"
tenant = "nestle"

[time]
column = "invoice_date"
default_trend_dimension = "month_name"

[synonyms]
revenue = "secondary_sales_value"

[metrics.secondary_sales_value]
aggregation = "SUM(net_value)"
table = "fact_secondary_sales"
format = "currency"
dimensions = ["brand_name", "state_name", "channel_name", "month_name", "territory_code"]

[dimensions.brand_name]
table = "dim_product"
join_key = "product_key"
level = "product"

[dimensions.state_name]
table = "dim_geography"
join_key = "geography_key"
level = "geography"

[dimensions.channel_name]
table = "dim_channel"
join_key = "channel_key"
level = "channel"

[dimensions.month_name]
table = "dim_date"
join_key = "date_key"
level = "time"

[dimensions.territory_code]
table = "fact_secondary_sales"
join_key = "territory_code"
level = "geography"
"#,
    )
    .unwrap()
}

fn brand_ranking(limit: u64) -> StructuredQuery {
    StructuredQuery::new(
        Intent::Ranking(SortSpec {
            limit: Some(limit),
            ..SortSpec::default()
        }),
        "secondary_sales_value",
        TimeWindow::Named("last_4_weeks".into()),
    )
    .with_group_by(vec!["brand_name"])
}

fn compile_ok(query: &StructuredQuery, scope: &AccessScope) -> CompiledSql {
    compile(query, scope, &nestle_catalog(), &CompileOptions::default()).unwrap()
}

#[test]
fn too_many_dimensions_never_reaches_the_builder() {
    let query = brand_ranking(5).with_group_by(vec![
        "brand_name",
        "state_name",
        "channel_name",
        "month_name",
        "territory_code",
    ]);

    let err = compile(
        &query,
        &AccessScope::national(),
        &nestle_catalog(),
        &CompileOptions::default(),
    )
    .unwrap_err();

    // Validation failure, not a build failure: the builder was never
    // invoked.
    match err {
        CompileError::Invalid(errors) => {
            assert!(errors
                .iter()
                .any(|e| e.kind == ValidationErrorKind::TooManyDimensions));
        }
        CompileError::Build(_) => panic!("builder ran on an invalid query"),
    }
}

#[test]
fn snapshot_compiles_without_grouping() {
    let query = StructuredQuery::new(
        Intent::Snapshot,
        "secondary_sales_value",
        TimeWindow::Named("mtd".into()),
    )
    .with_group_by(vec!["brand_name"]);

    let compiled = compile_ok(&query, &AccessScope::national());
    assert!(compiled.query.group_by.is_empty());
    assert!(!compiled.sql.contains("GROUP BY"));
    assert!(!compiled.sql.contains("JOIN"));
}

#[test]
fn compilation_is_deterministic() {
    let query = brand_ranking(5)
        .with_filter(ValueFilter::user(
            "state_name",
            vec![FilterValue::Str("Kerala".into())],
        ));
    let scope = AccessScope::geographic(AccessLevel::Territory, vec!["S1"]);

    let first = compile_ok(&query, &scope);
    let second = compile_ok(&query, &scope);
    assert_eq!(first.sql, second.sql);
    assert_eq!(first.query, second.query);
}

#[test]
fn golden_nestle_ranking_sql() {
    let compiled = compile_ok(&brand_ranking(5), &AccessScope::national());
    assert_eq!(
        compiled.sql,
        "SELECT\n  \
           \"product\".\"brand_name\",\n  \
           SUM(\"f\".\"net_value\") AS \"secondary_sales_value\"\n\
         FROM \"client_nestle\".\"fact_secondary_sales\" AS \"f\"\n\
         LEFT OUTER JOIN \"client_nestle\".\"dim_product\" AS \"product\" \
           ON \"f\".\"product_key\" = \"product\".\"product_key\"\n\
         WHERE \"f\".\"invoice_date\" >= CURRENT_DATE - INTERVAL '28 days'\n\
         GROUP BY \"product\".\"brand_name\"\n\
         ORDER BY \"secondary_sales_value\" DESC\n\
         LIMIT 5"
    );
}

#[test]
fn territory_scope_adds_exactly_one_predicate() {
    let national = compile_ok(&brand_ranking(5), &AccessScope::national());
    let scoped = compile_ok(
        &brand_ranking(5),
        &AccessScope::geographic(AccessLevel::Territory, vec!["S1"]),
    );

    // Identical SQL except for the appended RLS predicate.
    let expected = national.sql.replace(
        "\nGROUP BY",
        " AND \"f\".\"territory_code\" = 'S1'\nGROUP BY",
    );
    assert_eq!(scoped.sql, expected);
}

#[test]
fn ranking_defaults_fill_in() {
    let query = StructuredQuery::new(
        Intent::Ranking(SortSpec::default()),
        "secondary_sales_value",
        TimeWindow::Named("last_4_weeks".into()),
    )
    .with_group_by(vec!["brand_name"]);

    let compiled = compile_ok(&query, &AccessScope::national());
    assert!(compiled.sql.ends_with("LIMIT 10"));
    assert!(compiled
        .sql
        .contains("ORDER BY \"secondary_sales_value\" DESC"));
}

#[test]
fn trend_injects_time_dimension() {
    let query = StructuredQuery::new(
        Intent::Trend {
            time_dimension: None,
        },
        "secondary_sales_value",
        TimeWindow::Named("ytd".into()),
    )
    .with_group_by(vec!["brand_name"]);

    let compiled = compile_ok(&query, &AccessScope::national());
    assert!(compiled.sql.contains("\"date\".\"month_name\""));
    assert!(compiled.sql.contains("ORDER BY \"date\".\"month_name\" ASC"));
    // Injected dimension leads the grouping.
    assert!(compiled.sql.contains(
        "GROUP BY \"date\".\"month_name\", \"product\".\"brand_name\""
    ));
}

#[test]
fn synonym_resolves_to_canonical_metric() {
    let mut query = brand_ranking(5);
    query.metric = "revenue".into();

    let compiled = compile_ok(&query, &AccessScope::national());
    assert!(compiled
        .sql
        .contains("SUM(\"f\".\"net_value\") AS \"secondary_sales_value\""));
}

#[test]
fn diagnostic_intent_is_rejected() {
    let query = StructuredQuery::new(
        Intent::Diagnostic,
        "secondary_sales_value",
        TimeWindow::Named("last_4_weeks".into()),
    );

    let err = compile(
        &query,
        &AccessScope::national(),
        &nestle_catalog(),
        &CompileOptions::default(),
    )
    .unwrap_err();

    match err {
        CompileError::Invalid(errors) => {
            assert_eq!(errors[0].kind, ValidationErrorKind::UnsupportedIntent);
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn injection_attempts_stay_quoted() {
    let query = brand_ranking(5).with_filter(ValueFilter::user(
        "brand_name",
        vec![FilterValue::Str("x'; DROP TABLE users; --".into())],
    ));

    let compiled = compile_ok(&query, &AccessScope::national());
    assert!(compiled
        .sql
        .contains("\"product\".\"brand_name\" = 'x''; DROP TABLE users; --'"));
}

#[test]
fn postgres_dialect_renders_same_shape() {
    let options = CompileOptions {
        dialect: Dialect::Postgres,
    };
    let compiled = compile(
        &brand_ranking(5),
        &AccessScope::national(),
        &nestle_catalog(),
        &options,
    )
    .unwrap();

    assert_eq!(compiled.dialect, Dialect::Postgres);
    assert!(compiled
        .sql
        .starts_with("SELECT\n  \"product\".\"brand_name\""));
}
