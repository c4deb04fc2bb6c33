use crate::warehouse::ReleaseNote;

const INSTRUCTIONS: &str = "You are a cloud solutions analyst. Summarize the following Google Cloud release notes for a technical and business audience.

Follow these rules:
1. Start with a short overview paragraph.
2. Add a section titled \"## Key Features\" listing the most important changes as bullet points, ranked by customer impact (highest impact first).
3. Balance coverage across products: do not let a single product dominate the list when several products are present.
4. Add a section titled \"## Industry Use Cases\" containing a markdown table with the columns: Industry | Use Case | Benefits/ROI | Product Feature. Prefer use cases that combine features from more than one product.
5. Use only information present in the release notes.

Release notes:

";

/// Renders one note as a fixed-template block.
pub fn format_note(note: &ReleaseNote) -> String {
    format!(
        "Product: {}\nType: {}\nDescription: {}",
        note.product_name, note.release_note_type, note.description
    )
}

pub fn build_prompt(notes: &[ReleaseNote]) -> String {
    let blocks: Vec<String> = notes.iter().map(format_note).collect();
    let body = blocks.join("\n\n");

    let mut result = String::with_capacity(INSTRUCTIONS.len() + body.len());
    result.push_str(INSTRUCTIONS);
    result.push_str(&body);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn note(product: &str, kind: &str, description: &str) -> ReleaseNote {
        ReleaseNote {
            product_name: product.into(),
            release_note_type: kind.into(),
            description: description.into(),
            published_at: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        }
    }

    #[test]
    fn note_block_has_fixed_layout() {
        let block = format_note(&note("BigQuery", "FEATURE", "Vector search is GA."));
        assert_eq!(block, "Product: BigQuery\nType: FEATURE\nDescription: Vector search is GA.");
    }

    #[test]
    fn prompt_separates_notes_with_blank_lines() {
        let prompt = build_prompt(&[
            note("BigQuery", "FEATURE", "One."),
            note("Cloud Run", "FIX", "Two."),
        ]);

        assert!(prompt.contains("Description: One.\n\nProduct: Cloud Run"));
        assert!(prompt.ends_with("Description: Two."));
    }

    #[test]
    fn prompt_requests_ranked_features_and_use_case_table() {
        let prompt = build_prompt(&[note("BigQuery", "FEATURE", "x")]);
        assert!(prompt.contains("## Key Features"));
        assert!(prompt.contains("customer impact"));
        assert!(prompt.contains("## Industry Use Cases"));
        assert!(prompt.contains("Industry | Use Case | Benefits/ROI | Product Feature"));
    }
}
