use crate::parsing::squash_whitespace;

/// Progressively simpler queries for one address, most specific first:
/// the full text, its first two comma segments, the first segment, then the
/// last segment (usually the neighbourhood). Each gets `region` appended and
/// duplicates are dropped.
pub fn query_variants(text: &str, region: &str) -> Vec<String> {
    let text = squash_whitespace(text);
    let text = text.trim_matches(|c: char| c == ',' || c.is_whitespace());
    if text.is_empty() {
        return Vec::new();
    }

    let segments: Vec<&str> = text
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let mut candidates = vec![text.to_string()];
    if segments.len() >= 2 {
        candidates.push(segments[..2].join(", "));
    }
    if let Some(first) = segments.first() {
        candidates.push(first.to_string());
    }
    if let Some(last) = segments.last() {
        candidates.push(last.to_string());
    }

    let region = region.trim();
    let mut variants: Vec<String> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let query = if region.is_empty() {
            candidate
        } else {
            format!("{candidate}, {region}")
        };
        if !variants.contains(&query) {
            variants.push(query);
        }
    }
    variants
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simplifies_in_order() {
        let variants = query_variants("SQS 308 Bloco C, Asa Sul, Brasília", "DF, Brasil");
        assert_eq!(
            variants,
            vec![
                "SQS 308 Bloco C, Asa Sul, Brasília, DF, Brasil",
                "SQS 308 Bloco C, Asa Sul, DF, Brasil",
                "SQS 308 Bloco C, DF, Brasil",
                "Brasília, DF, Brasil",
            ]
        );
    }

    #[test]
    fn duplicates_are_dropped() {
        assert_eq!(
            query_variants("Sudoeste", "Brasília, DF, Brasil"),
            vec!["Sudoeste, Brasília, DF, Brasil"]
        );
        assert_eq!(
            query_variants("QI 9, Lago Sul", ""),
            vec!["QI 9, Lago Sul", "QI 9", "Lago Sul"]
        );
    }

    #[test]
    fn blank_text_has_no_queries() {
        assert!(query_variants("  , ", "DF").is_empty());
    }
}
