//! Advanced search expression

use crate::config::SearchConfig;

/// Build the advanced search expression for one identifier
///
/// ```
/// use scopus_harvester::config::SearchConfig;
/// use scopus_harvester::workflow::build_search_query;
///
/// let query = build_search_query("01426001", &SearchConfig::default());
/// assert!(query.starts_with("ISSN ( 01426001 ) AND"));
/// ```
pub fn build_search_query(code: &str, filters: &SearchConfig) -> String {
    format!(
        "ISSN ( {} ) AND ( LIMIT-TO ( DOCTYPE , \"{}\" ) ) AND ( LIMIT-TO ( LANGUAGE , \"{}\" ) ) AND ( LIMIT-TO ( SRCTYPE , \"{}\" ) )",
        code, filters.document_type, filters.language, filters.source_type
    )
}
