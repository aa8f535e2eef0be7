/// Main error type
///
/// Every variant describes a setup or usage mistake of the caller. None of them is raised for
/// numerical trouble: a singular information matrix is handled internally.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Distribution of an attribute neither sums to 1 nor to 100.
    #[error("distribution of attribute {attribute} sums to {sum} but should sum to 1 or 100")]
    DistributionSum {
        /// Attribute name.
        attribute: String,
        /// Found sum of the distribution.
        sum: f64,
    },
    /// Distribution of an attribute holds a negative share.
    #[error("distribution of attribute {attribute} has negative share {share} at level {level}")]
    NegativeShare {
        /// Attribute name.
        attribute: String,
        /// Level of the negative share.
        level: usize,
        /// Found share.
        share: f64,
    },
    /// Number of levels and length of the distribution differ.
    #[error(
        "attribute {attribute} has {levels} levels but its distribution has {distribution_len} entries"
    )]
    LevelCountMismatch {
        /// Attribute name.
        attribute: String,
        /// Declared number of levels.
        levels: usize,
        /// Length of the given distribution.
        distribution_len: usize,
    },
    /// Interaction mode could not be recognized.
    #[error("unknown interaction mode {0:?}, expected must_match or must_differ")]
    UnknownInteractionMode(String),
    /// Row length does not match the number of attributes.
    #[error("row {row} has length {found} but the design has {expected} attributes")]
    RowLength {
        /// Name of the checked row.
        row: &'static str,
        /// Number of attributes.
        expected: usize,
        /// Length of the given row.
        found: usize,
    },
    /// Row value is not a valid level index of its column.
    #[error("value {value} in column {column} exceeds the maximal level {max_level}")]
    LevelOutOfRange {
        /// Column of the violating value.
        column: usize,
        /// Violating value.
        value: usize,
        /// Largest valid level index of the column.
        max_level: usize,
    },
    /// Row index is outside of the current matrix.
    #[error("row index {index} is out of range for a design with {nrows} rows")]
    RowIndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Current number of rows.
        nrows: usize,
    },
    /// Attributes are registered after the design matrix got populated.
    #[error("attribute {attribute} cannot be added to a design which already holds {nrows} rows")]
    AttributesFrozen {
        /// Attribute name.
        attribute: String,
        /// Current number of rows.
        nrows: usize,
    },
    /// Exchange algorithm was started without any candidate row.
    #[error("candidate set is empty")]
    EmptyCandidateSet,
}

impl Error {
    /// Returns true if the error stems from validating caller input, which holds for all
    /// variants.
    pub fn is_validation(&self) -> bool {
        match self {
            Error::DistributionSum { .. }
            | Error::NegativeShare { .. }
            | Error::LevelCountMismatch { .. }
            | Error::UnknownInteractionMode(_)
            | Error::RowLength { .. }
            | Error::LevelOutOfRange { .. }
            | Error::RowIndexOutOfRange { .. }
            | Error::AttributesFrozen { .. }
            | Error::EmptyCandidateSet => true,
        }
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

/// Main result type
pub type Result<T> = std::result::Result<T, Error>;
