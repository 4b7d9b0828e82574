//! Job domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Inclusive bounds for the crawl depth of a job
pub const MAX_DEPTH_RANGE: (i64, i64) = (0, 10);

/// Inclusive bounds for the map zoom level of a job
pub const ZOOM_RANGE: (i64, i64) = (0, 21);

/// One scrape request.
///
/// A `Job` can only be built from validated [`JobParams`], so every value of
/// this type satisfies the ingestion rules. Fields are read-only once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawJob")]
pub struct Job {
    id: String,
    query: String,
    language: String,
    max_depth: u8,
    extract_email: bool,
    geo_coordinates: String,
    zoom: u8,
}

impl Job {
    /// Builds a job from a caller-generated id and validated parameters
    pub fn new(id: impl Into<String>, params: JobParams) -> Self {
        Self {
            id: id.into(),
            query: params.query,
            language: params.language,
            max_depth: params.max_depth,
            extract_email: params.extract_email,
            geo_coordinates: params.geo_coordinates,
            zoom: params.zoom,
        }
    }

    /// Builds a job with a fresh UUID v4 id
    pub fn with_generated_id(params: JobParams) -> Self {
        Self::new(Uuid::new_v4().to_string(), params)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn max_depth(&self) -> u8 {
        self.max_depth
    }

    pub fn extract_email(&self) -> bool {
        self.extract_email
    }

    pub fn geo_coordinates(&self) -> &str {
        &self.geo_coordinates
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    /// Returns the parameter set of this job, without its id
    pub fn params(&self) -> JobParams {
        JobParams {
            query: self.query.clone(),
            language: self.language.clone(),
            max_depth: self.max_depth,
            extract_email: self.extract_email,
            geo_coordinates: self.geo_coordinates.clone(),
            zoom: self.zoom,
        }
    }
}

/// Validated parameters of a job
///
/// Obtained only through [`JobParams::new`], which checks every rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobParams {
    query: String,
    language: String,
    max_depth: u8,
    extract_email: bool,
    geo_coordinates: String,
    zoom: u8,
}

impl JobParams {
    /// Validates raw parameters.
    ///
    /// All rules are evaluated; the error lists every violation in the order
    /// query, language, max_depth, zoom.
    pub fn new(
        query: impl Into<String>,
        language: impl Into<String>,
        max_depth: i64,
        extract_email: bool,
        geo_coordinates: impl Into<String>,
        zoom: i64,
    ) -> Result<Self, ValidationError> {
        let query = query.into();
        let language = language.into();
        let mut violations = Vec::new();

        if query.trim().is_empty() {
            violations.push("query is required".to_string());
        }

        if language.trim().is_empty() {
            violations.push("language is required".to_string());
        }

        let max_depth = match bounded(max_depth, MAX_DEPTH_RANGE) {
            Some(depth) => depth,
            None => {
                violations.push(format!(
                    "max_depth must be between {} and {}",
                    MAX_DEPTH_RANGE.0, MAX_DEPTH_RANGE.1
                ));
                0
            }
        };

        let zoom = match bounded(zoom, ZOOM_RANGE) {
            Some(zoom) => zoom,
            None => {
                violations.push(format!(
                    "zoom must be between {} and {}",
                    ZOOM_RANGE.0, ZOOM_RANGE.1
                ));
                0
            }
        };

        if !violations.is_empty() {
            return Err(ValidationError { violations });
        }

        Ok(Self {
            query,
            language,
            max_depth,
            extract_email,
            geo_coordinates: geo_coordinates.into(),
            zoom,
        })
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Returns a copy of these parameters targeting another query
    pub fn with_query(&self, query: impl Into<String>) -> Result<Self, ValidationError> {
        Self::new(
            query,
            self.language.clone(),
            self.max_depth.into(),
            self.extract_email,
            self.geo_coordinates.clone(),
            self.zoom.into(),
        )
    }
}

fn bounded(value: i64, (min, max): (i64, i64)) -> Option<u8> {
    if value < min || value > max {
        return None;
    }
    u8::try_from(value).ok()
}

/// Every rule a job request violated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    violations: Vec<String>,
}

impl ValidationError {
    pub fn violations(&self) -> &[String] {
        &self.violations
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed: {}", self.violations.join(", "))
    }
}

impl std::error::Error for ValidationError {}

/// Queue state of a persisted job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    New,
    Working,
    Ok,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::New => "new",
            JobStatus::Working => "working",
            JobStatus::Ok => "ok",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Serialized Form
// =============================================================================

/// Wire shape of a job; converted back through validation
#[derive(Deserialize)]
struct RawJob {
    id: String,
    query: String,
    language: String,
    max_depth: i64,
    #[serde(default)]
    extract_email: bool,
    #[serde(default)]
    geo_coordinates: String,
    zoom: i64,
}

impl TryFrom<RawJob> for Job {
    type Error = ValidationError;

    fn try_from(raw: RawJob) -> Result<Self, Self::Error> {
        let params = JobParams::new(
            raw.query,
            raw.language,
            raw.max_depth,
            raw.extract_email,
            raw.geo_coordinates,
            raw.zoom,
        )?;
        Ok(Job::new(raw.id, params))
    }
}
