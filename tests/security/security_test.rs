//! Row-level security through the full pipeline: one predicate, always
//! last, never maskable by user input.

use prism::prelude::*;

fn nestle_catalog() -> Catalog {
    Catalog::from_toml_str(
        r#"
tenant = "nestle"

[time]
column = "invoice_date"
default_trend_dimension = "month_name"

[metrics.secondary_sales_value]
aggregation = "SUM(net_value)"
table = "fact_secondary_sales"
dimensions = ["brand_name", "state_name", "month_name", "territory_code", "zone_name", "so_code"]

[dimensions.brand_name]
table = "dim_product"
join_key = "product_key"

[dimensions.state_name]
table = "dim_geography"
join_key = "geography_key"

[dimensions.zone_name]
table = "dim_geography"
join_key = "geography_key"

[dimensions.month_name]
table = "dim_date"
join_key = "date_key"

[dimensions.territory_code]
table = "fact_secondary_sales"
join_key = "territory_code"

[dimensions.so_code]
table = "fact_secondary_sales"
join_key = "so_code"
"#,
    )
    .unwrap()
}

fn brand_ranking() -> StructuredQuery {
    StructuredQuery::new(
        Intent::Ranking(SortSpec {
            limit: Some(5),
            ..SortSpec::default()
        }),
        "secondary_sales_value",
        TimeWindow::Named("last_4_weeks".into()),
    )
    .with_group_by(vec!["brand_name"])
}

fn compile_with(scope: &AccessScope, query: &StructuredQuery) -> CompiledSql {
    compile(query, scope, &nestle_catalog(), &CompileOptions::default()).unwrap()
}

#[test]
fn national_scope_leaves_sql_unfiltered() {
    let compiled = compile_with(&AccessScope::national(), &brand_ranking());
    assert!(!compiled.sql.contains("territory_code"));
    assert!(!compiled.sql.contains("so_code"));
}

#[test]
fn scoped_query_carries_exactly_one_rls_predicate_last() {
    let scope = AccessScope::geographic(AccessLevel::Territory, vec!["S1"]);
    let compiled = compile_with(&scope, &brand_ranking());

    let rls = "\"f\".\"territory_code\" = 'S1'";
    assert_eq!(compiled.sql.matches(rls).count(), 1);

    // Last predicate in the WHERE clause: directly before GROUP BY.
    let where_clause = compiled
        .sql
        .split("\nWHERE ")
        .nth(1)
        .unwrap()
        .split("\nGROUP BY")
        .next()
        .unwrap();
    assert!(where_clause.ends_with(rls));
}

#[test]
fn rls_lands_after_user_filters() {
    let query = brand_ranking().with_filter(ValueFilter::user(
        "state_name",
        vec![
            FilterValue::Str("Tamil Nadu".into()),
            FilterValue::Str("Kerala".into()),
        ],
    ));
    let scope = AccessScope::geographic(AccessLevel::Territory, vec!["S1"]);
    let compiled = compile_with(&scope, &query);

    let user = compiled.sql.find("\"geography\".\"state_name\" IN").unwrap();
    let rls = compiled.sql.find("\"f\".\"territory_code\"").unwrap();
    assert!(user < rls);
}

#[test]
fn user_filter_on_rls_dimension_cannot_mask_the_scope() {
    // The caller tries to widen their own territory filter; the scope
    // predicate still lands last and still applies.
    let query = brand_ranking().with_filter(ValueFilter::user(
        "territory_code",
        vec![
            FilterValue::Str("S1".into()),
            FilterValue::Str("S2".into()),
            FilterValue::Str("S3".into()),
        ],
    ));
    let scope = AccessScope::geographic(AccessLevel::Territory, vec!["S1"]);
    let compiled = compile_with(&scope, &query);

    let user = compiled
        .sql
        .find("\"f\".\"territory_code\" IN ('S1', 'S2', 'S3')")
        .unwrap();
    let rls = compiled.sql.find("\"f\".\"territory_code\" = 'S1'").unwrap();
    assert!(user < rls);
}

#[test]
fn multiple_codes_render_as_in_list() {
    let scope = AccessScope::geographic(AccessLevel::State, vec!["Tamil Nadu", "Kerala"]);
    let compiled = compile_with(&scope, &brand_ranking());
    assert!(compiled
        .sql
        .contains("\"geography\".\"state_name\" IN ('Tamil Nadu', 'Kerala')"));
}

#[test]
fn hierarchy_codes_take_precedence_over_geography() {
    let scope = AccessScope {
        level: AccessLevel::State,
        hierarchy: Some((HierarchyLevel::So, vec!["SO42".into()])),
        codes: vec!["Kerala".into()],
    };
    let compiled = compile_with(&scope, &brand_ranking());

    assert!(compiled.sql.contains("\"f\".\"so_code\" = 'SO42'"));
    assert!(!compiled.sql.contains("Kerala"));
}

#[test]
fn empty_code_lists_fall_through_to_unfiltered() {
    let scope = AccessScope {
        level: AccessLevel::Territory,
        hierarchy: Some((HierarchyLevel::Asm, vec![])),
        codes: vec![],
    };
    let scoped = compile_with(&scope, &brand_ranking());
    let national = compile_with(&AccessScope::national(), &brand_ranking());
    assert_eq!(scoped.sql, national.sql);
}

#[test]
fn rls_codes_are_escaped_like_any_literal() {
    let scope = AccessScope::geographic(AccessLevel::Territory, vec!["S1'; DROP TABLE f; --"]);
    let compiled = compile_with(&scope, &brand_ranking());
    assert!(compiled
        .sql
        .contains("\"f\".\"territory_code\" = 'S1''; DROP TABLE f; --'"));
}
