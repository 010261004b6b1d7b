//! Constants shared across the engine.
//!
//! Default delimiters, default render limits, and the thresholds used when
//! suggesting names in error reports.

/// Opens a comment region.
pub const DEFAULT_COMMENT_OPEN: &str = "{#";

/// Closes a comment region.
pub const DEFAULT_COMMENT_CLOSE: &str = "#}";

/// Opens an execute (tag) region.
pub const DEFAULT_EXECUTE_OPEN: &str = "{%";

/// Closes an execute (tag) region.
pub const DEFAULT_EXECUTE_CLOSE: &str = "%}";

/// Opens a print region.
pub const DEFAULT_PRINT_OPEN: &str = "{{";

/// Closes a print region.
pub const DEFAULT_PRINT_CLOSE: &str = "}}";

/// Opens an interpolation inside a double-quoted string.
pub const DEFAULT_INTERPOLATION_OPEN: &str = "#{";

/// Closes an interpolation inside a double-quoted string.
pub const DEFAULT_INTERPOLATION_CLOSE: &str = "}";

/// Whitespace-trim marker placed just inside a delimiter.
pub const DEFAULT_WHITESPACE_TRIM: &str = "-";

/// Default locale tag exposed to templates as `locale`.
pub const DEFAULT_LOCALE: &str = "en";

/// Escaping strategy applied by autoescaping when none is named.
pub const DEFAULT_ESCAPING_STRATEGY: &str = "html";

/// Maximum rendered size; negative disables the budget.
pub const UNLIMITED_RENDERED_SIZE: i64 = -1;

/// Similarity threshold (as a percentage of the name's length) for suggestions.
///
/// A candidate is suggested when its Levenshtein distance to the missing name is
/// at most this percentage of the missing name's length.
pub const SIMILARITY_THRESHOLD_PERCENT: usize = 50;

/// Upper bound on suggestions listed in an error report.
pub const MAX_SUGGESTIONS: usize = 3;

/// Words that can never be bound as new variable names.
pub const RESERVED_WORDS: &[&str] = &["true", "false", "null", "none"];

/// Name of the per-iteration metadata variable inside `for` loops.
pub const LOOP_VARIABLE: &str = "loop";
