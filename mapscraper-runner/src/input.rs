//! Query input files
//!
//! One query per line. Blank lines and lines starting with `#` are skipped.
//! A line may carry its own job id after a `#!#` separator:
//!
//! ```text
//! coffee shops in brooklyn
//! bakeries in queens #!# bakeries-queens
//! ```

use mapscraper_core::domain::job::Job;
use std::path::Path;

use crate::config::JobTemplate;
use crate::error::RunnerError;

const ID_SEPARATOR: &str = "#!#";

/// One query read from an input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputQuery {
    pub query: String,
    pub id: Option<String>,
}

pub fn parse_queries(content: &str) -> Vec<InputQuery> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with('#') || line.starts_with(ID_SEPARATOR))
        .filter_map(|line| {
            let (query, id) = match line.split_once(ID_SEPARATOR) {
                Some((query, id)) => (query.trim(), Some(id.trim())),
                None => (line, None),
            };
            if query.is_empty() {
                return None;
            }
            Some(InputQuery {
                query: query.to_string(),
                id: id.filter(|id| !id.is_empty()).map(str::to_string),
            })
        })
        .collect()
}

/// Reads an input file and builds one validated job per query
pub async fn read_jobs(path: &Path, template: &JobTemplate) -> Result<Vec<Job>, RunnerError> {
    let content = tokio::fs::read_to_string(path).await?;

    parse_queries(&content)
        .into_iter()
        .map(|input| -> Result<Job, RunnerError> {
            let params = template.params_for(&input.query)?;
            Ok(match input.id {
                Some(id) => Job::new(id, params),
                None => Job::with_generated_id(params),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_blank_and_comment_lines() {
        let queries = parse_queries("coffee\n\n# comment\n  tea  \n");
        assert_eq!(
            queries,
            vec![
                InputQuery { query: "coffee".into(), id: None },
                InputQuery { query: "tea".into(), id: None },
            ]
        );
    }

    #[test]
    fn test_parse_custom_ids() {
        let queries = parse_queries("bakeries #!# b-1\npizza #!#\n#!# orphan");
        assert_eq!(queries[0].id.as_deref(), Some("b-1"));
        assert_eq!(queries[0].query, "bakeries");
        assert_eq!(queries[1].id, None);
        assert_eq!(queries.len(), 2);
    }

    #[tokio::test]
    async fn test_read_jobs_applies_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queries.txt");
        std::fs::write(&path, "coffee #!# c\ntea\n").unwrap();

        let jobs = read_jobs(&path, &JobTemplate::default()).await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id(), "c");
        assert_eq!(jobs[0].language(), "en");
        assert_ne!(jobs[1].id(), jobs[0].id());
    }

    #[tokio::test]
    async fn test_read_jobs_missing_file() {
        let err = read_jobs(Path::new("/nonexistent/queries.txt"), &JobTemplate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Io(_)));
    }
}
