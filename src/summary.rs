//! Extraction of structured fields from model-written markdown.
//!
//! The model is asked for fixed headings, but nothing guarantees it
//! complies. Every function here degrades to empty output rather than
//! failing.

use serde::{Deserialize, Serialize};

pub const KEY_FEATURES_HEADING: &str = "## Key Features";
pub const USE_CASES_HEADING: &str = "## Industry Use Cases";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResult {
    pub markdown: String,
    pub key_features: Vec<String>,
    pub industry_use_cases: Vec<String>,
}

pub fn parse_summary(markdown: &str) -> SummaryResult {
    SummaryResult {
        markdown: markdown.to_string(),
        key_features: key_features(markdown),
        industry_use_cases: industry_use_cases(markdown),
    }
}

/// Text between `heading` and the next `##`, or the end of input.
fn section<'a>(markdown: &'a str, heading: &str) -> Option<&'a str> {
    let start = markdown.find(heading)? + heading.len();
    let rest = &markdown[start..];
    let end = rest.find("##").unwrap_or(rest.len());
    Some(&rest[..end])
}

pub fn key_features(markdown: &str) -> Vec<String> {
    let Some(body) = section(markdown, KEY_FEATURES_HEADING) else {
        return Vec::new();
    };

    body.lines()
        .filter_map(|line| strip_list_marker(line.trim()))
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_list_marker(line: &str) -> Option<&str> {
    if let Some(rest) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
        return Some(rest.trim());
    }

    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return Some(rest.trim());
        }
    }

    None
}

pub fn industry_use_cases(markdown: &str) -> Vec<String> {
    let Some(body) = section(markdown, USE_CASES_HEADING) else {
        return Vec::new();
    };

    body.lines()
        .map(str::trim)
        .filter(|line| line.contains('|'))
        .map(table_cells)
        .filter(|cells| !cells.is_empty() && !is_separator_row(cells))
        // first remaining row is the header
        .skip(1)
        .map(|cells| cells.join(" | "))
        .collect()
}

fn table_cells(line: &str) -> Vec<&str> {
    line.split('|')
        .map(str::trim)
        .filter(|cell| !cell.is_empty())
        .collect()
}

fn is_separator_row(cells: &[&str]) -> bool {
    cells
        .iter()
        .all(|cell| cell.chars().all(|c| c == '-' || c == ':' || c == ' '))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Google Cloud shipped several updates this week.

## Key Features
1. **BigQuery vector search GA**: semantic search over warehouse data.
2. Cloud Run GPU support
- Spanner graph queries

## Industry Use Cases
| Industry | Use Case | Benefits/ROI | Product Feature |
|----------|----------|--------------|-----------------|
| Retail | Product recommendations | +12% conversion | BigQuery vector search |
| Healthcare | Imaging inference | Lower latency | Cloud Run GPUs |

## Closing Notes
Nothing else | to report.
";

    #[test]
    fn use_case_rows_skip_header_and_separator() {
        let rows = industry_use_cases(SAMPLE);
        assert_eq!(
            rows,
            vec![
                "Retail | Product recommendations | +12% conversion | BigQuery vector search",
                "Healthcare | Imaging inference | Lower latency | Cloud Run GPUs",
            ]
        );
    }

    #[test]
    fn key_features_accept_numbered_and_bulleted_items() {
        let features = key_features(SAMPLE);
        assert_eq!(features.len(), 3);
        assert!(features[0].starts_with("**BigQuery vector search GA**"));
        assert_eq!(features[1], "Cloud Run GPU support");
        assert_eq!(features[2], "Spanner graph queries");
    }

    #[test]
    fn missing_headings_yield_empty_lists() {
        let result = parse_summary("Just a paragraph | with a pipe.\n\n## Something Else\n- item");
        assert!(result.key_features.is_empty());
        assert!(result.industry_use_cases.is_empty());
        assert_eq!(result.markdown, "Just a paragraph | with a pipe.\n\n## Something Else\n- item");
    }

    #[test]
    fn section_runs_to_end_of_input_without_following_heading() {
        let text = "## Industry Use Cases\n| Industry | Use Case |\n| --- | :---: |\n| Finance | Fraud detection |";
        assert_eq!(industry_use_cases(text), vec!["Finance | Fraud detection"]);
    }

    #[test]
    fn table_without_rows_is_empty() {
        assert!(industry_use_cases("## Industry Use Cases\nNo table was produced.").is_empty());
    }

    #[test]
    fn result_serializes_with_camel_case_fields() {
        let json = serde_json::to_value(parse_summary(SAMPLE)).unwrap();
        assert!(json.get("keyFeatures").is_some());
        assert!(json.get("industryUseCases").is_some());
    }
}
