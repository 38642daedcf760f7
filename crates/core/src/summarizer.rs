use crate::error::PipelineError;
use crate::models::{CellValue, Column, ColumnStats, DatasetSummary, QualityScore, Relation};
use std::collections::{BTreeMap, HashMap, HashSet};

pub const RECOMMEND_MISSING_VALUES: &str =
    "Address missing values to improve data completeness.";
pub const RECOMMEND_LOW_VARIABILITY: &str =
    "Some columns may lack variability. Consider enrichment.";

const COMPLETENESS_THRESHOLD: f64 = 0.9;
const UNIQUE_RATIO_THRESHOLD: f64 = 0.2;

/// Deterministic structural summary of a relation: shape plus per-column
/// null counts.
pub fn summarize(relation: &Relation) -> DatasetSummary {
    let null_counts = relation
        .columns
        .iter()
        .map(|column| (column.name.clone(), column.null_count()))
        .collect();

    DatasetSummary {
        row_count: relation.row_count(),
        column_names: relation.column_names(),
        null_counts,
    }
}

/// Quality scoring over a relation snapshot.
///
/// `completeness = 1 - total_nulls / (rows * columns)` and
/// `unique_ratio = mean(distinct non-null values per column) / rows`.
/// A relation with zero rows or zero columns cannot be scored and yields
/// `EmptyDataset` rather than dividing by zero.
pub fn quality(relation: &Relation) -> Result<QualityScore, PipelineError> {
    let rows = relation.row_count();
    let cols = relation.columns.len();
    if rows == 0 || cols == 0 {
        return Err(PipelineError::EmptyDataset);
    }

    let total_nulls: usize = relation.columns.iter().map(Column::null_count).sum();
    let completeness = 1.0 - total_nulls as f64 / (rows * cols) as f64;

    let mean_distinct = relation
        .columns
        .iter()
        .map(|column| {
            column
                .values
                .iter()
                .filter_map(CellValue::canonical)
                .collect::<HashSet<_>>()
                .len() as f64
        })
        .sum::<f64>()
        / cols as f64;
    let unique_ratio = mean_distinct / rows as f64;

    Ok(QualityScore {
        completeness,
        unique_ratio,
    })
}

/// Deterministic advisory rule table. Rules are independent and the
/// output order is stable.
pub fn recommend(score: &QualityScore) -> Vec<String> {
    let mut advisories = Vec::new();
    if score.completeness < COMPLETENESS_THRESHOLD {
        advisories.push(RECOMMEND_MISSING_VALUES.to_string());
    }
    if score.unique_ratio < UNIQUE_RATIO_THRESHOLD {
        advisories.push(RECOMMEND_LOW_VARIABILITY.to_string());
    }
    advisories
}

/// One insight per non-numeric column: its most frequent non-null value.
/// Columns without any non-null value are skipped.
pub fn key_insights(relation: &Relation) -> Vec<String> {
    let mut insights = Vec::new();

    for column in &relation.columns {
        if column.is_numeric() {
            continue;
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        let mut order: Vec<&str> = Vec::new();
        for value in &column.values {
            if let CellValue::Text(text) = value {
                let entry = counts.entry(text.as_str()).or_insert(0);
                if *entry == 0 {
                    order.push(text.as_str());
                }
                *entry += 1;
            }
        }

        // First-seen value wins frequency ties, keeping output stable.
        let mut mode: Option<(&str, usize)> = None;
        for candidate in &order {
            let count = counts.get(candidate).copied().unwrap_or(0);
            if mode.map_or(true, |(_, best)| count > best) {
                mode = Some((candidate, count));
            }
        }
        if let Some((most_common, _)) = mode {
            insights.push(format!(
                "Most common value in {}: {}",
                column.name, most_common
            ));
        }
    }

    insights
}

/// Per-numeric-column descriptive statistics (count/mean/std/min/
/// quartiles/max). Columns without numeric values are omitted; an empty
/// map means the relation has no numeric columns.
pub fn describe_numeric(relation: &Relation) -> BTreeMap<String, ColumnStats> {
    let mut described = BTreeMap::new();

    for column in relation.numeric_columns() {
        let mut values = column.numbers();
        if values.is_empty() {
            continue;
        }
        values.sort_by(f64::total_cmp);

        let count = values.len();
        let mean = values.iter().sum::<f64>() / count as f64;
        let std = if count > 1 {
            let variance = values
                .iter()
                .map(|value| (value - mean).powi(2))
                .sum::<f64>()
                / (count - 1) as f64;
            variance.sqrt()
        } else {
            0.0
        };

        described.insert(
            column.name.clone(),
            ColumnStats {
                count,
                mean,
                std,
                min: values[0],
                q25: percentile(&values, 0.25),
                q50: percentile(&values, 0.50),
                q75: percentile(&values, 0.75),
                max: values[count - 1],
            },
        );
    }

    described
}

/// Linear-interpolation percentile over sorted values.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    sorted[lower] + weight * (sorted[upper] - sorted[lower])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, values: Vec<CellValue>) -> Column {
        Column {
            name: name.to_string(),
            values,
        }
    }

    fn text(value: &str) -> CellValue {
        CellValue::Text(value.to_string())
    }

    fn clean_relation() -> Relation {
        Relation {
            columns: vec![
                column("team", vec![text("ajax"), text("psv"), text("az")]),
                column(
                    "points",
                    vec![
                        CellValue::Number(81.0),
                        CellValue::Number(79.0),
                        CellValue::Number(65.0),
                    ],
                ),
            ],
        }
    }

    #[test]
    fn summarize_reports_shape_and_nulls() {
        let mut relation = clean_relation();
        relation.columns[1].values[2] = CellValue::Null;

        let summary = summarize(&relation);
        assert_eq!(summary.row_count, 3);
        assert_eq!(summary.column_names, vec!["team", "points"]);
        assert_eq!(summary.null_counts["team"], 0);
        assert_eq!(summary.null_counts["points"], 1);
    }

    #[test]
    fn clean_distinct_relation_scores_perfectly() {
        let score = quality(&clean_relation()).unwrap();
        assert_eq!(score.completeness, 1.0);
        assert_eq!(score.unique_ratio, 1.0);
    }

    #[test]
    fn completeness_counts_nulls_over_all_cells() {
        let mut relation = clean_relation();
        relation.columns[1].values[2] = CellValue::Null;

        let score = quality(&relation).unwrap();
        assert!((score.completeness - (1.0 - 1.0 / 6.0)).abs() < 1e-12);
    }

    #[test]
    fn empty_relation_cannot_be_scored() {
        let relation = Relation { columns: vec![] };
        assert!(matches!(quality(&relation), Err(PipelineError::EmptyDataset)));

        let headers_only = Relation {
            columns: vec![column("team", vec![])],
        };
        assert!(matches!(
            quality(&headers_only),
            Err(PipelineError::EmptyDataset)
        ));
    }

    #[test]
    fn recommend_fires_only_the_missing_values_rule() {
        let advisories = recommend(&QualityScore {
            completeness: 0.85,
            unique_ratio: 0.5,
        });
        assert_eq!(advisories, vec![RECOMMEND_MISSING_VALUES.to_string()]);
    }

    #[test]
    fn recommend_fires_both_rules() {
        let advisories = recommend(&QualityScore {
            completeness: 0.5,
            unique_ratio: 0.1,
        });
        assert_eq!(
            advisories,
            vec![
                RECOMMEND_MISSING_VALUES.to_string(),
                RECOMMEND_LOW_VARIABILITY.to_string(),
            ]
        );
    }

    #[test]
    fn recommend_is_empty_for_perfect_scores() {
        let advisories = recommend(&QualityScore {
            completeness: 1.0,
            unique_ratio: 1.0,
        });
        assert!(advisories.is_empty());
    }

    #[test]
    fn completeness_threshold_is_strict() {
        let below = recommend(&QualityScore {
            completeness: 0.899,
            unique_ratio: 1.0,
        });
        assert_eq!(below, vec![RECOMMEND_MISSING_VALUES.to_string()]);

        let above = recommend(&QualityScore {
            completeness: 0.901,
            unique_ratio: 1.0,
        });
        assert!(above.is_empty());
    }

    #[test]
    fn key_insights_report_most_frequent_categorical_value() {
        let relation = Relation {
            columns: vec![
                column("team", vec![text("ajax"), text("ajax"), text("psv")]),
                column("points", vec![CellValue::Number(1.0); 3]),
            ],
        };
        let insights = key_insights(&relation);
        assert_eq!(insights, vec!["Most common value in team: ajax".to_string()]);
    }

    #[test]
    fn key_insights_skip_columns_without_values() {
        let relation = Relation {
            columns: vec![column("empty", vec![]), column("nulls", vec![CellValue::Null])],
        };
        assert!(key_insights(&relation).is_empty());
    }

    #[test]
    fn key_insights_break_frequency_ties_by_first_appearance() {
        let relation = Relation {
            columns: vec![column("team", vec![text("psv"), text("ajax")])],
        };
        let insights = key_insights(&relation);
        assert_eq!(insights, vec!["Most common value in team: psv".to_string()]);
    }

    #[test]
    fn describe_numeric_matches_known_quartiles() {
        let relation = Relation {
            columns: vec![column(
                "points",
                vec![
                    CellValue::Number(1.0),
                    CellValue::Number(2.0),
                    CellValue::Number(3.0),
                    CellValue::Number(4.0),
                ],
            )],
        };
        let stats = &describe_numeric(&relation)["points"];
        assert_eq!(stats.count, 4);
        assert_eq!(stats.mean, 2.5);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 4.0);
        assert!((stats.q25 - 1.75).abs() < 1e-12);
        assert!((stats.q50 - 2.5).abs() < 1e-12);
        assert!((stats.q75 - 3.25).abs() < 1e-12);
        // Sample standard deviation of 1..4.
        assert!((stats.std - 1.2909944487358056).abs() < 1e-12);
    }

    #[test]
    fn describe_numeric_ignores_text_columns() {
        let relation = clean_relation();
        let stats = describe_numeric(&relation);
        assert_eq!(stats.len(), 1);
        assert!(stats.contains_key("points"));
    }
}
