use std::fmt;

/// Machine-readable error codes surfaced by every failing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    MissingPath,
    InputUnreadable,
    MalformedRecord,
    EmptyEventSet,
    MalformedTimestamp,
    TimestampScale,
    DuplicateProductKey,
    IntegrityViolation,
    OutputWriteFailed,
    OutputExists,
    ManifestMismatch,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::MissingPath => "E1002",
            Self::InputUnreadable => "E2001",
            Self::MalformedRecord => "E2002",
            Self::EmptyEventSet => "E2003",
            Self::MalformedTimestamp => "E3001",
            Self::TimestampScale => "E3002",
            Self::DuplicateProductKey => "E4001",
            Self::IntegrityViolation => "E4002",
            Self::OutputWriteFailed => "E5001",
            Self::OutputExists => "E5002",
            Self::ManifestMismatch => "E5003",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::MissingPath => "Required path not configured",
            Self::InputUnreadable => "Input collection unreadable",
            Self::MalformedRecord => "Malformed input record",
            Self::EmptyEventSet => "No review events in input",
            Self::MalformedTimestamp => "Malformed review timestamp",
            Self::TimestampScale => "Timestamp scale mismatch",
            Self::DuplicateProductKey => "Duplicate product key in cohort index",
            Self::IntegrityViolation => "Filtered outputs disagree with keep rule",
            Self::OutputWriteFailed => "Output write failed",
            Self::OutputExists => "Output directory already exists",
            Self::ManifestMismatch => "Output manifest mismatch",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in firstlight.toml and retry."),
            Self::MissingPath => {
                Some("Pass --reviews, --meta and --out, or set them in firstlight.toml.")
            }
            Self::InputUnreadable => Some("Check the input path exists and is readable."),
            Self::MalformedRecord => {
                Some("Every line must be a JSON object with the required review fields.")
            }
            Self::EmptyEventSet => {
                Some("The dataset horizon needs at least one review; check the reviews input.")
            }
            Self::MalformedTimestamp => {
                Some("Timestamps must be non-null, non-negative epoch milliseconds.")
            }
            Self::TimestampScale => Some(
                "Timestamps are read as epoch milliseconds; convert seconds or microseconds first.",
            ),
            Self::DuplicateProductKey => None,
            Self::IntegrityViolation => {
                Some("Filtered outputs must match product_index; re-run `fl curate` on the inputs.")
            }
            Self::OutputWriteFailed => Some("Check disk space and write permissions."),
            Self::OutputExists => Some("Pick a new --out directory or pass --force to replace it."),
            Self::ManifestMismatch => {
                Some("The output directory was modified after the run; re-run `fl curate`.")
            }
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
