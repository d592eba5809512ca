//! Diagnostic workflow: trend math, failure isolation, memoization,
//! deterministic ordering, and deadline handling.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use prism::diagnostic::executor::Row;
use prism::diagnostic::{ExecutionError, Executor, QueryResult, TrendDirection};
use prism::prelude::*;
use serde_json::{json, Value};

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
dimensions = ["brand_name", "state_name", "channel_name", "month_name"]

[dimensions.brand_name]
table = "dim_product"
join_key = "product_key"

[dimensions.state_name]
table = "dim_geography"
join_key = "geography_key"

[dimensions.channel_name]
table = "dim_channel"
join_key = "channel_key"

[dimensions.month_name]
table = "dim_date"
join_key = "date_key"
"#,
    )
    .unwrap()
}

fn diagnostic_query() -> StructuredQuery {
    StructuredQuery::new(
        Intent::Diagnostic,
        "secondary_sales_value",
        TimeWindow::Named("last_4_weeks".into()),
    )
}

fn row(pairs: Vec<(&str, Value)>) -> Row {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Scripted warehouse stand-in. Routes on the generated SQL: a prior
/// window carries the 56-day lower bound, contribution queries carry
/// their dimension's column.
struct StubExecutor {
    calls: Mutex<Vec<String>>,
    fail_on: Option<&'static str>,
    prior_total: f64,
    delay: Option<Duration>,
}

impl StubExecutor {
    fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_on: None,
            prior_total: 100.0,
            delay: None,
        }
    }

    fn executed(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

const METRIC: &str = "secondary_sales_value";

fn ranking_rows(dimension: &str, prior: bool) -> Vec<Row> {
    let table: &[(&str, f64, f64)] = match dimension {
        // (label, current, prior)
        "brand_name" => &[("KitKat", 80.0, 85.0), ("Milo", 50.0, 90.0)],
        "state_name" => &[("Tamil Nadu", 60.0, 70.0)],
        "channel_name" => &[("GT", 40.0, 45.0)],
        _ => &[],
    };
    table
        .iter()
        .map(|(label, cur, pri)| {
            row(vec![
                (dimension, json!(label)),
                (METRIC, json!(if prior { *pri } else { *cur })),
            ])
        })
        .collect()
}

#[async_trait]
impl Executor for StubExecutor {
    async fn execute(&self, sql: &str) -> Result<QueryResult, ExecutionError> {
        self.calls.lock().unwrap().push(sql.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(fragment) = self.fail_on {
            if sql.contains(fragment) {
                return Err(ExecutionError::Failed("warehouse says no".into()));
            }
        }

        let prior = sql.contains("INTERVAL '56 days'");
        let rows = if !sql.contains("GROUP BY") {
            let total = if prior { self.prior_total } else { 80.0 };
            vec![row(vec![(METRIC, json!(total))])]
        } else if sql.contains("brand_name") {
            ranking_rows("brand_name", prior)
        } else if sql.contains("state_name") {
            ranking_rows("state_name", prior)
        } else if sql.contains("channel_name") {
            ranking_rows("channel_name", prior)
        } else {
            vec![]
        };

        Ok(QueryResult::from_rows(rows, Duration::from_millis(3)))
    }
}

fn orchestrator(stub: Arc<StubExecutor>) -> Orchestrator {
    Orchestrator::new(stub)
}

#[tokio::test]
async fn full_diagnosis_synthesizes_in_candidate_order() {
    let stub = Arc::new(StubExecutor::new());
    let result = orchestrator(Arc::clone(&stub))
        .diagnose(
            &diagnostic_query(),
            &AccessScope::national(),
            &nestle_catalog(),
            Duration::from_secs(5),
        )
        .await;

    assert!(!result.partial);
    assert_eq!(result.direction, TrendDirection::Decreasing);
    assert_eq!(result.change_pct, Some(-20.0));

    let dims: Vec<&str> = result
        .insights
        .iter()
        .map(|i| i.dimension.as_str())
        .collect();
    assert_eq!(dims, vec!["brand_name", "state_name", "channel_name"]);

    // Milo fell 90 -> 50, the largest absolute swing on brand.
    assert_eq!(result.insights[0].top_contributor, "Milo");
    assert_eq!(result.insights[0].value, 50.0);
    assert_eq!(result.insights[0].delta, -40.0);
}

#[tokio::test]
async fn recommendations_follow_the_rule_table() {
    let stub = Arc::new(StubExecutor::new());
    let result = orchestrator(stub)
        .diagnose(
            &diagnostic_query(),
            &AccessScope::national(),
            &nestle_catalog(),
            Duration::from_secs(5),
        )
        .await;

    // 20% drop crosses the 5% threshold; variance rule always fires when
    // insights exist. Brand has the widest spread (80 vs 50).
    assert_eq!(result.recommendations.len(), 2);
    assert!(result.recommendations[0]
        .message
        .starts_with("Investigate immediately"));
    assert!(result.recommendations[1]
        .message
        .contains("brand_name"));
}

#[tokio::test]
async fn each_distinct_statement_executes_once() {
    let stub = Arc::new(StubExecutor::new());
    orchestrator(Arc::clone(&stub))
        .diagnose(
            &diagnostic_query(),
            &AccessScope::national(),
            &nestle_catalog(),
            Duration::from_secs(5),
        )
        .await;

    // 2 trend snapshots + 3 dimensions x 2 windows, all distinct.
    let mut executed = stub.executed();
    assert_eq!(executed.len(), 8);
    executed.sort();
    executed.dedup();
    assert_eq!(executed.len(), 8);
}

#[tokio::test]
async fn one_failing_dimension_yields_two_insights_and_partial() {
    let stub = Arc::new(StubExecutor {
        fail_on: Some("channel_name"),
        ..StubExecutor::new()
    });
    let result = orchestrator(stub)
        .diagnose(
            &diagnostic_query(),
            &AccessScope::national(),
            &nestle_catalog(),
            Duration::from_secs(5),
        )
        .await;

    assert!(result.partial);
    assert_eq!(result.insights.len(), 2);
    let dims: Vec<&str> = result
        .insights
        .iter()
        .map(|i| i.dimension.as_str())
        .collect();
    assert_eq!(dims, vec!["brand_name", "state_name"]);
    // The trend stage was unaffected.
    assert_eq!(result.change_pct, Some(-20.0));
}

#[tokio::test]
async fn zero_baseline_reports_flat_without_dividing() {
    let stub = Arc::new(StubExecutor {
        prior_total: 0.0,
        ..StubExecutor::new()
    });
    let result = orchestrator(stub)
        .diagnose(
            &diagnostic_query(),
            &AccessScope::national(),
            &nestle_catalog(),
            Duration::from_secs(5),
        )
        .await;

    assert_eq!(result.direction, TrendDirection::Flat);
    assert_eq!(result.change_pct, None);
    assert!(!result.partial);
}

#[tokio::test]
async fn deadline_abandons_inflight_work() {
    let stub = Arc::new(StubExecutor {
        delay: Some(Duration::from_secs(2)),
        ..StubExecutor::new()
    });
    let result = orchestrator(stub)
        .diagnose(
            &diagnostic_query(),
            &AccessScope::national(),
            &nestle_catalog(),
            Duration::from_millis(20),
        )
        .await;

    assert!(result.partial);
    assert!(result.insights.is_empty());
    assert_eq!(result.change_pct, None);
    assert_eq!(result.direction, TrendDirection::Flat);
}

#[tokio::test]
async fn rls_scope_applies_to_every_sub_query() {
    let stub = Arc::new(StubExecutor::new());
    let catalog = Catalog::from_toml_str(
        &nestle_toml_with_territory(),
    )
    .unwrap();

    orchestrator(Arc::clone(&stub))
        .diagnose(
            &diagnostic_query(),
            &AccessScope::geographic(AccessLevel::Territory, vec!["S1"]),
            &catalog,
            Duration::from_secs(5),
        )
        .await;

    for sql in stub.executed() {
        assert!(
            sql.contains("\"f\".\"territory_code\" = 'S1'"),
            "sub-query missing RLS predicate: {sql}"
        );
    }
}

fn nestle_toml_with_territory() -> String {
    r#"
tenant = "nestle"

[time]
column = "invoice_date"
default_trend_dimension = "month_name"

[metrics.secondary_sales_value]
aggregation = "SUM(net_value)"
table = "fact_secondary_sales"
dimensions = ["brand_name", "state_name", "channel_name", "month_name"]

[dimensions.brand_name]
table = "dim_product"
join_key = "product_key"

[dimensions.state_name]
table = "dim_geography"
join_key = "geography_key"

[dimensions.channel_name]
table = "dim_channel"
join_key = "channel_key"

[dimensions.month_name]
table = "dim_date"
join_key = "date_key"

[dimensions.territory_code]
table = "fact_secondary_sales"
join_key = "territory_code"
"#
    .to_string()
}
