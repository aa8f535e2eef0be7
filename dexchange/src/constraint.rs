use crate::{Error, Result};
use std::{fmt::Display, str::FromStr};

/// Direction of an interaction constraint from attribute A onto attribute B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionMode {
    /// Rows with `A == level_a` are expected to have `B == level_b`.
    MustMatch,
    /// Rows with `A == level_a` are expected to not have `B == level_b`.
    MustDiffer,
}

impl FromStr for InteractionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "must_match" | "mustmatch" | "match" | "eq" => Ok(Self::MustMatch),
            "must_differ" | "mustdiffer" | "differ" | "neq" => Ok(Self::MustDiffer),
            _ => Err(Error::UnknownInteractionMode(s.to_string())),
        }
    }
}

impl TryFrom<&str> for InteractionMode {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        s.parse()
    }
}

impl Display for InteractionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MustMatch => write!(f, "must_match"),
            Self::MustDiffer => write!(f, "must_differ"),
        }
    }
}

/// One-directional constraint between a level of attribute A and a level of attribute B.
///
/// A mutual incompatibility needs both directions registered.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionConstraint {
    /// Name of the conditioning attribute.
    pub attribute_a: String,
    /// Name of the constrained attribute.
    pub attribute_b: String,
    /// Conditioning level of attribute A.
    pub level_a: usize,
    /// Constrained level of attribute B.
    pub level_b: usize,
    /// Constraint direction.
    pub mode: InteractionMode,
}

impl InteractionConstraint {
    /// Returns true if a row with value `a` in column A and `b` in column B violates the
    /// constraint.
    pub fn is_violated_by(&self, a: usize, b: usize) -> bool {
        if a != self.level_a {
            return false;
        }
        match self.mode {
            InteractionMode::MustMatch => b != self.level_b,
            InteractionMode::MustDiffer => b == self.level_b,
        }
    }
}

impl Display for InteractionConstraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self.mode {
            InteractionMode::MustMatch => "=>",
            InteractionMode::MustDiffer => "=> not",
        };
        write!(
            f,
            "{}({}) {} {}({})",
            self.attribute_a, self.level_a, op, self.attribute_b, self.level_b
        )
    }
}

/// List of registered interaction constraints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintCatalog {
    constraints: Vec<InteractionConstraint>,
}

impl ConstraintCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an interaction constraint. The mode is either an [InteractionMode] or its textual
    /// form. The attribute names are not resolved here.
    pub fn add<M>(
        &mut self,
        attribute_a: impl Into<String>,
        attribute_b: impl Into<String>,
        level_a: usize,
        level_b: usize,
        mode: M,
    ) -> Result<&InteractionConstraint>
    where
        M: TryInto<InteractionMode>,
        M::Error: Into<Error>,
    {
        let mode = mode.try_into().map_err(Into::into)?;
        self.constraints.push(InteractionConstraint {
            attribute_a: attribute_a.into(),
            attribute_b: attribute_b.into(),
            level_a,
            level_b,
            mode,
        });
        Ok(&self.constraints[self.constraints.len() - 1])
    }

    /// Number of constraints.
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// Returns true if no constraint is registered.
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Iterates over the constraints in registration order.
    pub fn iter(&self) -> std::slice::Iter<'_, InteractionConstraint> {
        self.constraints.iter()
    }
}

impl<'a> IntoIterator for &'a ConstraintCatalog {
    type Item = &'a InteractionConstraint;
    type IntoIter = std::slice::Iter<'a, InteractionConstraint>;

    fn into_iter(self) -> Self::IntoIter {
        self.constraints.iter()
    }
}
