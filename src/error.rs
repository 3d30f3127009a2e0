use thiserror::Error;

/// Failures raised while turning raw inputs into enriched districts.
///
/// Everything here aborts the load. The only recoverable condition (a
/// missing living-population record) never becomes an error; the joiner
/// backfills it instead.
#[derive(Debug, Error, PartialEq)]
pub enum ReconcileError {
    /// `adm_nm` did not have a third whitespace-delimited token.
    #[error("district name '{name}' has fewer than 3 tokens")]
    MalformedDistrictName { name: String },

    /// No registered-population row for a retained district.
    #[error("no registered population for district '{key}'")]
    MissingRegistered { key: String },

    /// A feature lacks one of the string properties the join relies on.
    #[error("feature is missing string property '{property}'")]
    MissingProperty { property: String },

    /// A count that is still not numeric after stripping separators.
    #[error("cannot parse count '{value}'")]
    InvalidCount { value: String },

    /// Living-population code that is not exactly 8 ASCII digits.
    #[error("administrative code '{code}' is not 8 digits")]
    InvalidAdminCode { code: String },

    #[error("district geometry must be a GeoJSON FeatureCollection")]
    NotAFeatureCollection,
}
