//! Search query generation.
//!
//! Four base templates cover the common ways release dates surface in search
//! results. A retry broadens the set with two more specific templates aimed
//! at discography databases and original-pressing pages.

/// Builds search queries for an artist/title pair.
pub struct QueryBuilder;

impl QueryBuilder {
    pub fn new() -> Self {
        Self
    }

    /// The four base query templates.
    pub fn base_queries(&self, artist: &str, title: &str) -> Vec<String> {
        vec![
            format!("\"{artist}\" \"{title}\" original release year"),
            format!("{artist} {title} song release date"),
            format!("{artist} {title} single discography"),
            format!("{artist} {title} wikipedia"),
        ]
    }

    /// Two more specific templates added when a retry broadens the search.
    pub fn broadened_queries(&self, artist: &str, title: &str) -> Vec<String> {
        vec![
            format!("\"{artist}\" \"{title}\" first released single vinyl"),
            format!("{artist} {title} discogs musicbrainz year"),
        ]
    }

    /// Queries for the given pass: base on the first pass, broadened
    /// additions afterwards. Already-issued queries are skipped so the
    /// state's query list stays append-only without duplicates.
    pub fn queries_for_pass(
        &self,
        artist: &str,
        title: &str,
        retry_count: u32,
        already_issued: &[String],
    ) -> Vec<String> {
        let candidates = if retry_count == 0 {
            self.base_queries(artist, title)
        } else {
            self.broadened_queries(artist, title)
        };
        candidates
            .into_iter()
            .filter(|q| !already_issued.contains(q))
            .collect()
    }
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_queries_count_and_content() {
        let queries = QueryBuilder::new().base_queries("The Kinks", "Lola");
        assert_eq!(queries.len(), 4);
        assert!(queries[0].contains("The Kinks"));
        assert!(queries[0].contains("Lola"));
        assert!(queries.iter().any(|q| q.contains("wikipedia")));
    }

    #[test]
    fn test_broadened_queries_are_distinct_from_base() {
        let builder = QueryBuilder::new();
        let base = builder.base_queries("A", "T");
        let broadened = builder.broadened_queries("A", "T");
        assert_eq!(broadened.len(), 2);
        for q in &broadened {
            assert!(!base.contains(q));
        }
    }

    #[test]
    fn test_queries_for_first_pass() {
        let queries = QueryBuilder::new().queries_for_pass("A", "T", 0, &[]);
        assert_eq!(queries.len(), 4);
    }

    #[test]
    fn test_queries_for_retry_pass() {
        let builder = QueryBuilder::new();
        let issued = builder.base_queries("A", "T");
        let queries = builder.queries_for_pass("A", "T", 1, &issued);
        assert_eq!(queries.len(), 2);
    }

    #[test]
    fn test_already_issued_skipped() {
        let builder = QueryBuilder::new();
        let mut issued = builder.base_queries("A", "T");
        issued.extend(builder.broadened_queries("A", "T"));
        let queries = builder.queries_for_pass("A", "T", 2, &issued);
        assert!(queries.is_empty());
    }
}
