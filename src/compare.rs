//! Pure transformation from a raw [`SearchResponse`] into a render-ready
//! view-model. No network or storage access happens here; the display layer
//! consumes the output as-is.

use std::collections::BTreeSet;

use crate::api::types::{
    SearchComparison, SearchMetrics, SearchMode, SearchResponse, SearchResponseLite, SearchResult,
};

/// Marker for a missing numeric field. Rendered instead of `0` so an absent
/// metric is never mistaken for a real zero score.
pub const NO_VALUE: &str = "-";

const SNIPPET_CHARS: usize = 160;

/// Ranking-quality metrics, in display order. Each is only meaningful when
/// the server had ground-truth labels for the query.
const RANKING_METRICS: &[(&str, fn(&SearchMetrics) -> Option<f64>)] = &[
    ("Accuracy@k", |m| m.accuracy_at_k),
    ("Precision@k", |m| m.precision_at_k),
    ("Recall@k", |m| m.recall_at_k),
    ("F1@k", |m| m.f1_at_k),
    ("MRR", |m| m.mrr),
    ("NDCG@k", |m| m.ndcg_at_k),
    ("Spearman", |m| m.spearman),
    ("Answer similarity", |m| m.answer_similarity),
];

#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub rank: usize,
    pub doc_id: String,
    pub score: String,
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricValue {
    pub label: &'static str,
    pub value: String,
}

/// Ordered algorithm explanation, or an explicit placeholder when the server
/// sent no debug steps.
#[derive(Debug, Clone, PartialEq)]
pub enum StepList {
    Ordered(Vec<String>),
    NotAvailable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineView {
    pub label: &'static str,
    pub doc_count: usize,
    pub best_score: String,
    pub latency: String,
    pub k: String,
    pub candidate_k: String,
    pub results: Vec<ResultRow>,
    /// Empty unless the pipeline's metrics are qrels-backed (`has_labels`).
    pub ranking_metrics: Vec<MetricValue>,
    pub steps: StepList,
    pub answer: Option<String>,
}

/// One row of the side-by-side metric table. `delta` is quantum minus
/// classical in percentage points, or [`NO_VALUE`] when either side is absent.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaRow {
    pub label: &'static str,
    pub classical: String,
    pub quantum: String,
    pub delta: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonView {
    pub classical: PipelineView,
    pub quantum: PipelineView,
    pub deltas: Vec<DeltaRow>,
    pub overlap_at_k: u64,
    pub jaccard_at_k: f64,
    pub jaccard_display: String,
    pub classical_mean_score: String,
    pub quantum_mean_score: String,
    /// Explains the absence of ranking metrics when neither pipeline had
    /// ground-truth labels, so the table is never bare.
    pub narrative: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Layout {
    Single(PipelineView),
    SideBySide(ComparisonView),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchView {
    pub query: String,
    pub mode: SearchMode,
    pub layout: Layout,
}

/// Build the view-model for a search response. A missing `comparison` block
/// is single-pipeline mode, never an error, regardless of what `mode` claims.
pub fn assemble(response: &SearchResponse) -> SearchView {
    let layout = match &response.comparison {
        Some(comparison) => Layout::SideBySide(assemble_comparison(response, comparison)),
        None => Layout::Single(assemble_pipeline(
            pipeline_label(response.mode),
            &response.results,
            response.metrics.as_ref(),
            response.algorithm_details.as_ref(),
            response.answer.clone(),
        )),
    };
    SearchView {
        query: response.query.clone(),
        mode: response.mode,
        layout,
    }
}

/// Intersection size and Jaccard similarity of two result lists, computed on
/// `doc_id` *sets*: duplicates within one pipeline are not double-counted.
/// An empty union yields 0, not a division error.
pub fn overlap_and_jaccard(a: &[SearchResult], b: &[SearchResult]) -> (u64, f64) {
    let a_ids: BTreeSet<&str> = a.iter().map(|r| r.doc_id.as_str()).collect();
    let b_ids: BTreeSet<&str> = b.iter().map(|r| r.doc_id.as_str()).collect();
    let intersection = a_ids.intersection(&b_ids).count() as u64;
    let union = a_ids.union(&b_ids).count() as u64;
    let jaccard = if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    };
    (intersection, jaccard)
}

fn pipeline_label(mode: SearchMode) -> &'static str {
    match mode {
        SearchMode::Quantum => "Quantum-inspired",
        SearchMode::Classical | SearchMode::Compare => "Classical",
    }
}

fn assemble_comparison(response: &SearchResponse, comparison: &SearchComparison) -> ComparisonView {
    let classical = assemble_lite("Classical", &comparison.classical);
    let quantum = assemble_lite("Quantum-inspired", &comparison.quantum);

    // Server-supplied comparatives are authoritative; derive from the result
    // sets only when absent.
    let (derived_overlap, derived_jaccard) =
        overlap_and_jaccard(&comparison.classical.results, &comparison.quantum.results);
    let comparative = response.comparison_metrics.as_ref();
    let overlap_at_k = comparative
        .and_then(|c| c.overlap_at_k)
        .unwrap_or(derived_overlap);
    let jaccard_at_k = comparative
        .and_then(|c| c.jaccard_at_k)
        .unwrap_or(derived_jaccard);

    let classical_mean_score = comparative
        .and_then(|c| c.classical_mean_score)
        .or_else(|| mean_score(&comparison.classical.results));
    let quantum_mean_score = comparative
        .and_then(|c| c.quantum_mean_score)
        .or_else(|| mean_score(&comparison.quantum.results));

    let deltas = delta_rows(
        comparison.classical.metrics.as_ref(),
        comparison.quantum.metrics.as_ref(),
    );
    let narrative = if deltas.is_empty() {
        Some(missing_labels_narrative())
    } else {
        None
    };

    ComparisonView {
        classical,
        quantum,
        deltas,
        overlap_at_k,
        jaccard_at_k,
        jaccard_display: format!("{:.1}%", jaccard_at_k * 100.0),
        classical_mean_score: fmt_opt_score(classical_mean_score),
        quantum_mean_score: fmt_opt_score(quantum_mean_score),
        narrative,
    }
}

fn assemble_lite(label: &'static str, lite: &SearchResponseLite) -> PipelineView {
    assemble_pipeline(
        label,
        &lite.results,
        lite.metrics.as_ref(),
        lite.algorithm_details.as_ref(),
        lite.answer.clone(),
    )
}

fn assemble_pipeline(
    label: &'static str,
    results: &[SearchResult],
    metrics: Option<&SearchMetrics>,
    details: Option<&crate::api::types::AlgorithmDetails>,
    answer: Option<String>,
) -> PipelineView {
    let rows = results
        .iter()
        .enumerate()
        .map(|(i, r)| ResultRow {
            rank: i + 1,
            doc_id: r.doc_id.clone(),
            score: format!("{:.3}", r.score),
            snippet: snippet(&r.text),
        })
        .collect();

    let steps = match details.map(|d| d.steps()) {
        Some(steps) if !steps.is_empty() => StepList::Ordered(steps),
        _ => StepList::NotAvailable,
    };

    PipelineView {
        label,
        doc_count: results.len(),
        best_score: fmt_opt_score(best_score(results)),
        latency: metrics
            .map(|m| format!("{:.1} ms", m.latency_ms))
            .unwrap_or_else(|| NO_VALUE.to_string()),
        k: metrics
            .map(|m| m.k.to_string())
            .unwrap_or_else(|| NO_VALUE.to_string()),
        candidate_k: metrics
            .map(|m| m.candidate_k.to_string())
            .unwrap_or_else(|| NO_VALUE.to_string()),
        results: rows,
        ranking_metrics: ranking_values(metrics),
        steps,
        answer,
    }
}

/// Ranking rows are built only for qrels-backed metrics; without labels the
/// list stays empty rather than showing misleading zeros.
fn ranking_values(metrics: Option<&SearchMetrics>) -> Vec<MetricValue> {
    let Some(metrics) = metrics else {
        return Vec::new();
    };
    if !metrics.has_labels {
        return Vec::new();
    }
    RANKING_METRICS
        .iter()
        .copied()
        .map(|(label, get)| MetricValue {
            label,
            value: fmt_opt_score(get(metrics)),
        })
        .collect()
}

fn delta_rows(
    classical: Option<&SearchMetrics>,
    quantum: Option<&SearchMetrics>,
) -> Vec<DeltaRow> {
    let (Some(c), Some(q)) = (classical, quantum) else {
        return Vec::new();
    };
    if !c.has_labels || !q.has_labels {
        return Vec::new();
    }
    RANKING_METRICS
        .iter()
        .copied()
        .filter_map(|(label, get)| {
            let cv = get(c);
            let qv = get(q);
            // A row exists when either side reports the metric; the delta
            // itself needs both.
            if cv.is_none() && qv.is_none() {
                return None;
            }
            let delta = match (cv, qv) {
                (Some(cv), Some(qv)) => format!("{:+.1} pp", (qv - cv) * 100.0),
                _ => NO_VALUE.to_string(),
            };
            Some(DeltaRow {
                label,
                classical: fmt_opt_score(cv),
                quantum: fmt_opt_score(qv),
                delta,
            })
        })
        .collect()
}

fn missing_labels_narrative() -> String {
    "No ground-truth labels exist for this query, so ranking-quality metrics \
     (precision, recall, NDCG, MRR, Spearman) are not computed. Latency, \
     retrieved counts and ranking overlap are shown as comparative proxies."
        .to_string()
}

fn best_score(results: &[SearchResult]) -> Option<f64> {
    results
        .iter()
        .map(|r| r.score)
        .fold(None, |best, score| match best {
            Some(b) if b >= score => Some(b),
            _ => Some(score),
        })
}

fn mean_score(results: &[SearchResult]) -> Option<f64> {
    if results.is_empty() {
        return None;
    }
    Some(results.iter().map(|r| r.score).sum::<f64>() / results.len() as f64)
}

fn fmt_opt_score(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.3}", v),
        None => NO_VALUE.to_string(),
    }
}

fn snippet(text: &str) -> String {
    if text.chars().count() <= SNIPPET_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(SNIPPET_CHARS).collect();
    format!("{}…", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::{AlgorithmDetails, ComparisonMetrics, SearchComparison};

    fn result(doc_id: &str, score: f64) -> SearchResult {
        SearchResult {
            doc_id: doc_id.into(),
            text: format!("text of {doc_id}"),
            score,
        }
    }

    fn metrics(latency_ms: f64, has_labels: bool) -> SearchMetrics {
        SearchMetrics {
            latency_ms,
            k: 5,
            candidate_k: 20,
            has_labels,
            ..SearchMetrics::default()
        }
    }

    fn lite(results: Vec<SearchResult>, metrics: Option<SearchMetrics>) -> SearchResponseLite {
        SearchResponseLite {
            results,
            answer: None,
            metrics,
            algorithm_details: None,
        }
    }

    fn compare_response(
        classical: SearchResponseLite,
        quantum: SearchResponseLite,
    ) -> SearchResponse {
        SearchResponse {
            query: "impact of X".into(),
            mode: SearchMode::Compare,
            results: classical.results.clone(),
            answer: None,
            metrics: None,
            comparison: Some(SearchComparison { classical, quantum }),
            comparison_metrics: None,
            algorithm_details: None,
        }
    }

    #[test]
    fn overlap_and_jaccard_on_sets() {
        let a = vec![result("d1", 0.9), result("d2", 0.8)];
        let b = vec![result("d2", 0.7), result("d3", 0.6)];
        let (overlap, jaccard) = overlap_and_jaccard(&a, &b);
        assert_eq!(overlap, 1);
        assert!((jaccard - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn duplicates_within_one_pipeline_not_double_counted() {
        let a = vec![result("d1", 0.9), result("d1", 0.8), result("d2", 0.7)];
        let b = vec![result("d1", 0.6)];
        let (overlap, jaccard) = overlap_and_jaccard(&a, &b);
        assert_eq!(overlap, 1);
        assert!((jaccard - 0.5).abs() < 1e-9);
    }

    #[test]
    fn empty_union_yields_zero_jaccard() {
        let (overlap, jaccard) = overlap_and_jaccard(&[], &[]);
        assert_eq!(overlap, 0);
        assert_eq!(jaccard, 0.0);
    }

    #[test]
    fn absent_comparison_never_builds_two_columns() {
        let response = SearchResponse {
            query: "q".into(),
            mode: SearchMode::Classical,
            results: vec![result("d1", 0.5)],
            answer: None,
            metrics: Some(metrics(12.0, false)),
            comparison: None,
            comparison_metrics: None,
            algorithm_details: None,
        };
        let view = assemble(&response);
        let Layout::Single(pipeline) = view.layout else {
            panic!("expected single-pipeline layout");
        };
        assert_eq!(pipeline.doc_count, 1);
        assert_eq!(pipeline.latency, "12.0 ms");
        assert!(pipeline.ranking_metrics.is_empty());
        assert_eq!(pipeline.steps, StepList::NotAvailable);
    }

    #[test]
    fn both_columns_present_even_with_zero_results() {
        let response = compare_response(
            lite(vec![result("d1", 0.82)], Some(metrics(120.0, false))),
            lite(vec![], None),
        );
        let view = assemble(&response);
        let Layout::SideBySide(cmp) = view.layout else {
            panic!("expected side-by-side layout");
        };
        assert_eq!(cmp.classical.doc_count, 1);
        assert_eq!(cmp.quantum.doc_count, 0);
        assert_eq!(cmp.quantum.best_score, NO_VALUE);
        assert_eq!(cmp.quantum.latency, NO_VALUE);
        assert_eq!(cmp.quantum_mean_score, NO_VALUE);
    }

    #[test]
    fn derived_overlap_and_jaccard_when_server_silent() {
        let response = compare_response(
            lite(
                vec![result("d1", 0.9), result("d2", 0.8)],
                Some(metrics(120.0, false)),
            ),
            lite(
                vec![result("d2", 0.7), result("d3", 0.6)],
                Some(metrics(340.0, false)),
            ),
        );
        let view = assemble(&response);
        let Layout::SideBySide(cmp) = view.layout else {
            panic!("expected side-by-side layout");
        };
        assert_eq!(cmp.overlap_at_k, 1);
        assert_eq!(cmp.jaccard_display, "33.3%");
    }

    #[test]
    fn server_comparatives_override_derived_values() {
        let mut response = compare_response(
            lite(vec![result("d1", 0.9)], Some(metrics(10.0, false))),
            lite(vec![result("d2", 0.8)], Some(metrics(20.0, false))),
        );
        response.comparison_metrics = Some(ComparisonMetrics {
            overlap_at_k: Some(4),
            jaccard_at_k: Some(0.5),
            classical_mean_score: Some(0.75),
            quantum_mean_score: None,
            common_doc_ids: None,
        });
        let view = assemble(&response);
        let Layout::SideBySide(cmp) = view.layout else {
            panic!("expected side-by-side layout");
        };
        assert_eq!(cmp.overlap_at_k, 4);
        assert_eq!(cmp.jaccard_display, "50.0%");
        assert_eq!(cmp.classical_mean_score, "0.750");
        // Missing quantum mean falls back to the client-derived value.
        assert_eq!(cmp.quantum_mean_score, "0.800");
    }

    #[test]
    fn narrative_fallback_without_ground_truth() {
        let response = compare_response(
            lite(vec![result("d1", 0.82)], Some(metrics(120.0, false))),
            lite(vec![result("d2", 0.79)], Some(metrics(340.0, false))),
        );
        let view = assemble(&response);
        let Layout::SideBySide(cmp) = view.layout else {
            panic!("expected side-by-side layout");
        };
        assert!(cmp.deltas.is_empty());
        let narrative = cmp.narrative.expect("narrative fallback expected");
        assert!(narrative.contains("ground-truth"));
    }

    #[test]
    fn delta_rows_for_metrics_present_in_both() {
        let mut classical = metrics(100.0, true);
        classical.recall_at_k = Some(0.60);
        classical.ndcg_at_k = Some(0.50);
        let mut quantum = metrics(200.0, true);
        quantum.recall_at_k = Some(0.70);
        // NDCG missing on the quantum side.

        let response = compare_response(
            lite(vec![result("d1", 0.9)], Some(classical)),
            lite(vec![result("d2", 0.8)], Some(quantum)),
        );
        let view = assemble(&response);
        let Layout::SideBySide(cmp) = view.layout else {
            panic!("expected side-by-side layout");
        };
        assert!(cmp.narrative.is_none());

        let recall = cmp
            .deltas
            .iter()
            .find(|row| row.label == "Recall@k")
            .expect("recall row");
        assert_eq!(recall.classical, "0.600");
        assert_eq!(recall.quantum, "0.700");
        assert_eq!(recall.delta, "+10.0 pp");

        let ndcg = cmp
            .deltas
            .iter()
            .find(|row| row.label == "NDCG@k")
            .expect("ndcg row");
        assert_eq!(ndcg.quantum, NO_VALUE);
        assert_eq!(ndcg.delta, NO_VALUE);

        // Metrics absent on both sides get no row at all.
        assert!(cmp.deltas.iter().all(|row| row.label != "Spearman"));
    }

    #[test]
    fn ranking_rows_hidden_without_labels_even_if_values_present() {
        let mut m = metrics(10.0, false);
        m.recall_at_k = Some(0.4);
        let view = assemble(&SearchResponse {
            query: "q".into(),
            mode: SearchMode::Classical,
            results: vec![result("d1", 0.5)],
            answer: None,
            metrics: Some(m),
            comparison: None,
            comparison_metrics: None,
            algorithm_details: None,
        });
        let Layout::Single(pipeline) = view.layout else {
            panic!("expected single layout");
        };
        assert!(pipeline.ranking_metrics.is_empty());
    }

    #[test]
    fn debug_steps_become_ordered_list() {
        let details = AlgorithmDetails {
            algorithm: "classical-sbert-cosine".into(),
            comparator: "cosine".into(),
            candidate_strategy: "full ranking".into(),
            description: "encode and rank".into(),
            debug: Some(serde_json::json!({
                "steps": ["encode query", "rank documents", 42, "return top-k"]
            })),
        };
        let view = assemble(&SearchResponse {
            query: "q".into(),
            mode: SearchMode::Classical,
            results: vec![],
            answer: None,
            metrics: None,
            comparison: None,
            comparison_metrics: None,
            algorithm_details: Some(details),
        });
        let Layout::Single(pipeline) = view.layout else {
            panic!("expected single layout");
        };
        assert_eq!(
            pipeline.steps,
            StepList::Ordered(vec![
                "encode query".into(),
                "rank documents".into(),
                "return top-k".into(),
            ])
        );
    }
}
