//! The diagnostic orchestrator: a four-stage workflow over the
//! single-query pipeline.
//!
//! Stages: trend confirmation, contribution analysis, insight
//! synthesis, recommendation generation. Sub-queries are compiled up
//! front, deduplicated by SQL text so each distinct statement executes
//! at most once per invocation, and dispatched concurrently with a
//! bound derived from the candidate count. Insights are re-ordered from
//! the fixed candidate list, so output is deterministic under any
//! completion order.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::executor::{ExecutionError, Executor, QueryResult, Row};
use super::{DiagnosticResult, Insight, Recommendation, TrendDirection};
use crate::catalog::Catalog;
use crate::compile::{compile, CompileOptions};
use crate::query::{
    FilterOrigin, Intent, SortSpec, StructuredQuery, TimeWindow, ValueFilter, WindowBounds,
};
use crate::security::AccessScope;

/// Tuning knobs for a diagnostic run.
#[derive(Debug, Clone)]
pub struct DiagnosticConfig {
    /// Dimensions to run contribution analysis over, in output order.
    pub candidate_dimensions: Vec<String>,
    /// Top-N per contribution ranking.
    pub top_n: u64,
    /// |change_pct| above this triggers an action recommendation.
    pub change_threshold_pct: f64,
    /// |change_pct| below this reads as flat.
    pub flat_threshold_pct: f64,
    /// Concurrent sub-query bound. `None` means the candidate count.
    pub max_concurrency: Option<usize>,
    pub options: CompileOptions,
}

impl Default for DiagnosticConfig {
    fn default() -> Self {
        Self {
            candidate_dimensions: vec![
                "brand_name".into(),
                "state_name".into(),
                "channel_name".into(),
            ],
            top_n: 10,
            change_threshold_pct: 5.0,
            flat_threshold_pct: 1.0,
            max_concurrency: None,
            options: CompileOptions::default(),
        }
    }
}

/// Drives the diagnostic workflow against an injected executor.
pub struct Orchestrator {
    executor: Arc<dyn Executor>,
    config: DiagnosticConfig,
}

/// One sub-query's place in the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Task {
    TrendCurrent,
    TrendPrior,
    /// Contribution ranking for candidate dimension `i`.
    RankCurrent(usize),
    RankPrior(usize),
}

impl Orchestrator {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            executor,
            config: DiagnosticConfig::default(),
        }
    }

    pub fn with_config(executor: Arc<dyn Executor>, config: DiagnosticConfig) -> Self {
        Self { executor, config }
    }

    /// Run the diagnostic workflow. Never fails: compile and execution
    /// failures drop the affected insight and set `partial`; exceeding
    /// `deadline` abandons in-flight work and returns what completed.
    pub async fn diagnose(
        &self,
        query: &StructuredQuery,
        scope: &AccessScope,
        catalog: &Catalog,
        deadline: Duration,
    ) -> DiagnosticResult {
        let deadline_at = Instant::now() + deadline;
        let mut partial = false;

        let Some(bounds) = query.window.resolve() else {
            warn!(metric = %query.metric, "diagnostic window unresolvable");
            return DiagnosticResult {
                direction: TrendDirection::Flat,
                change_pct: None,
                insights: vec![],
                recommendations: vec![],
                partial: true,
            };
        };
        let prior = bounds.prior();

        // Compile every sub-query up front. A compile failure costs only
        // its own task.
        let mut tasks: Vec<(Task, Option<String>)> = Vec::new();
        let mut push = |task: Task, sub: StructuredQuery, partial: &mut bool| {
            match compile(&sub, scope, catalog, &self.config.options) {
                Ok(compiled) => tasks.push((task, Some(compiled.sql))),
                Err(err) => {
                    warn!(?task, %err, "diagnostic sub-query failed to compile");
                    *partial = true;
                    tasks.push((task, None));
                }
            }
        };

        push(
            Task::TrendCurrent,
            self.snapshot_query(query, &bounds),
            &mut partial,
        );
        push(
            Task::TrendPrior,
            self.snapshot_query(query, &prior),
            &mut partial,
        );
        for (i, dim) in self.config.candidate_dimensions.iter().enumerate() {
            push(
                Task::RankCurrent(i),
                self.ranking_query(query, dim, &bounds),
                &mut partial,
            );
            push(
                Task::RankPrior(i),
                self.ranking_query(query, dim, &prior),
                &mut partial,
            );
        }

        // Request-scoped memoization: each distinct statement runs once.
        let unique: Vec<String> = {
            let mut seen = BTreeMap::new();
            for (_, sql) in &tasks {
                if let Some(sql) = sql {
                    seen.entry(sql.clone()).or_insert(());
                }
            }
            seen.into_keys().collect()
        };
        debug!(
            sub_queries = tasks.len(),
            distinct = unique.len(),
            "dispatching diagnostic sub-queries"
        );

        let results = self
            .execute_all(unique, deadline_at, &mut partial)
            .await;

        // Stage 1: trend confirmation.
        let (direction, change_pct) = match (
            lookup(&tasks, &results, Task::TrendCurrent),
            lookup(&tasks, &results, Task::TrendPrior),
        ) {
            (Some(cur), Some(pri)) => trend(
                scalar(cur, &query.metric),
                scalar(pri, &query.metric),
                self.config.flat_threshold_pct,
            ),
            _ => {
                partial = true;
                (TrendDirection::Flat, None)
            }
        };

        // Stages 2+3: contribution analysis, synthesized in candidate
        // order regardless of completion order.
        let mut insights = Vec::new();
        let mut spreads: Vec<(String, f64)> = Vec::new();
        for (i, dim) in self.config.candidate_dimensions.iter().enumerate() {
            match (
                lookup(&tasks, &results, Task::RankCurrent(i)),
                lookup(&tasks, &results, Task::RankPrior(i)),
            ) {
                (Some(cur), Some(pri)) => {
                    if let Some(insight) =
                        synthesize(dim, &cur.rows, &pri.rows, &query.metric)
                    {
                        spreads.push((dim.clone(), spread(&cur.rows, &query.metric)));
                        insights.push(insight);
                    }
                }
                _ => partial = true,
            }
        }

        // Stage 4: recommendations, ordered by the rule table.
        let recommendations =
            self.recommend(&query.metric, direction, change_pct, &spreads);

        DiagnosticResult {
            direction,
            change_pct,
            insights,
            recommendations,
            partial,
        }
    }

    /// Snapshot of the metric over explicit bounds, carrying the user's
    /// filters. Security re-applies inside `compile`.
    fn snapshot_query(&self, query: &StructuredQuery, bounds: &WindowBounds) -> StructuredQuery {
        let mut sub = StructuredQuery::new(
            Intent::Snapshot,
            &query.metric,
            TimeWindow::Bounds(bounds.clone()),
        );
        sub.filters = user_filters(query);
        sub
    }

    /// Top-N breakdown of the metric by one candidate dimension.
    fn ranking_query(
        &self,
        query: &StructuredQuery,
        dimension: &str,
        bounds: &WindowBounds,
    ) -> StructuredQuery {
        let mut sub = StructuredQuery::new(
            Intent::Ranking(SortSpec {
                metric: None,
                limit: Some(self.config.top_n),
                ..SortSpec::default()
            }),
            &query.metric,
            TimeWindow::Bounds(bounds.clone()),
        )
        .with_group_by(vec![dimension]);
        sub.filters = user_filters(query);
        sub
    }

    /// Execute the deduplicated statements with bounded concurrency,
    /// stopping at the deadline. Completed results are kept; in-flight
    /// dispatches are dropped.
    async fn execute_all(
        &self,
        statements: Vec<String>,
        deadline_at: Instant,
        partial: &mut bool,
    ) -> BTreeMap<String, Result<QueryResult, ExecutionError>> {
        let bound = self
            .config
            .max_concurrency
            .unwrap_or_else(|| self.config.candidate_dimensions.len())
            .max(1);

        let mut in_flight = stream::iter(statements.into_iter().map(|sql| {
            let executor = Arc::clone(&self.executor);
            async move {
                let outcome = executor.execute(&sql).await;
                (sql, outcome)
            }
        }))
        .buffer_unordered(bound);

        let mut results = BTreeMap::new();
        loop {
            let remaining = deadline_at.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, in_flight.next()).await {
                Ok(Some((sql, outcome))) => {
                    if let Err(err) = &outcome {
                        warn!(%err, "diagnostic sub-query failed");
                        *partial = true;
                    }
                    results.insert(sql, outcome);
                }
                Ok(None) => break,
                Err(_) => {
                    warn!("diagnostic deadline exceeded, abandoning in-flight sub-queries");
                    *partial = true;
                    break;
                }
            }
        }
        results
    }

    fn recommend(
        &self,
        metric: &str,
        direction: TrendDirection,
        change_pct: Option<f64>,
        spreads: &[(String, f64)],
    ) -> Vec<Recommendation> {
        let mut recommendations = Vec::new();

        if let Some(pct) = change_pct {
            if pct.abs() > self.config.change_threshold_pct {
                match direction {
                    TrendDirection::Decreasing => recommendations.push(Recommendation::new(
                        format!(
                            "Investigate immediately: {metric} fell {:.1}% versus the prior period",
                            pct.abs()
                        ),
                    )),
                    TrendDirection::Increasing => recommendations.push(Recommendation::new(
                        format!(
                            "Scale what is working: {metric} grew {:.1}% versus the prior period",
                            pct.abs()
                        ),
                    )),
                    TrendDirection::Flat => {}
                }
            }
        }

        let widest = spreads.iter().max_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.0.cmp(&a.0))
        });
        if let Some((dimension, _)) = widest {
            recommendations.push(Recommendation::new(format!(
                "Focus analysis on {dimension}: its values show the widest spread"
            )));
        }

        recommendations
    }
}

/// The successful result backing a task, if it compiled, executed, and
/// did not fail.
fn lookup<'a>(
    tasks: &[(Task, Option<String>)],
    results: &'a BTreeMap<String, Result<QueryResult, ExecutionError>>,
    task: Task,
) -> Option<&'a QueryResult> {
    let sql = tasks.iter().find(|(t, _)| *t == task)?.1.as_ref()?;
    results.get(sql)?.as_ref().ok()
}

fn user_filters(query: &StructuredQuery) -> Vec<ValueFilter> {
    query
        .filters
        .iter()
        .filter(|f| f.origin == FilterOrigin::User)
        .cloned()
        .collect()
}

/// The single aggregate value of a snapshot result. Empty results read
/// as zero.
fn scalar(result: &QueryResult, metric: &str) -> f64 {
    result
        .rows
        .first()
        .and_then(|row| row.get(metric))
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0)
}

/// Direction and percent change, guarding a zero baseline.
fn trend(current: f64, prior: f64, flat_threshold: f64) -> (TrendDirection, Option<f64>) {
    if prior == 0.0 {
        return (TrendDirection::Flat, None);
    }
    let pct = (current - prior) / prior * 100.0;
    let direction = if pct.abs() < flat_threshold {
        TrendDirection::Flat
    } else if pct > 0.0 {
        TrendDirection::Increasing
    } else {
        TrendDirection::Decreasing
    };
    (direction, Some(pct))
}

/// Label-to-value map of one contribution ranking.
fn contributions(rows: &[Row], dimension: &str, metric: &str) -> BTreeMap<String, f64> {
    rows.iter()
        .filter_map(|row| {
            let label = match row.get(dimension)? {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let value = row.get(metric).and_then(|v| v.as_f64())?;
            Some((label, value))
        })
        .collect()
}

/// The top contributor by absolute delta between windows. Ties break on
/// label so the outcome is deterministic.
fn synthesize(dimension: &str, current: &[Row], prior: &[Row], metric: &str) -> Option<Insight> {
    let cur = contributions(current, dimension, metric);
    let pri = contributions(prior, dimension, metric);

    let mut labels: Vec<&String> = cur.keys().chain(pri.keys()).collect();
    labels.sort();
    labels.dedup();

    let top = labels.into_iter().max_by(|a, b| {
        let delta_a = (cur.get(*a).unwrap_or(&0.0) - pri.get(*a).unwrap_or(&0.0)).abs();
        let delta_b = (cur.get(*b).unwrap_or(&0.0) - pri.get(*b).unwrap_or(&0.0)).abs();
        delta_a
            .partial_cmp(&delta_b)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.cmp(a))
    })?;

    let value = *cur.get(top).unwrap_or(&0.0);
    let delta = value - pri.get(top).unwrap_or(&0.0);
    Some(Insight {
        dimension: dimension.to_string(),
        top_contributor: top.clone(),
        value,
        delta,
    })
}

/// Population variance of the current contribution values.
fn spread(rows: &[Row], metric: &str) -> f64 {
    let values: Vec<f64> = rows
        .iter()
        .filter_map(|row| row.get(metric).and_then(|v| v.as_f64()))
        .collect();
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}
