use crate::{Error, Result};
use nalgebra::DVector;

const SUM_EPS: f64 = 1e-8;

/// Discrete design attribute with its levels `0..levels` and the targeted share of each level.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// Identifier of the attribute. Uniqueness is not checked and lies with the caller.
    pub name: String,
    /// Number of levels.
    pub levels: usize,
    /// Targeted fraction per level, summing to one.
    pub distribution: DVector<f64>,
}

impl Attribute {
    /// Creates an attribute. A distribution given in percent (sum of 100) is normalized to
    /// fractions.
    pub fn new(name: impl Into<String>, levels: usize, distribution: Vec<f64>) -> Result<Self> {
        let name = name.into();
        let mut distribution = DVector::from_vec(distribution);
        let sum = distribution.sum();
        if (sum - 100.).abs() <= 100. * SUM_EPS {
            distribution /= 100.;
        } else if !((sum - 1.).abs() <= SUM_EPS) {
            // also rejects a NaN sum
            return Err(Error::DistributionSum {
                attribute: name,
                sum,
            });
        }
        if let Some((level, &share)) = distribution.iter().enumerate().find(|(_, s)| **s < 0.) {
            return Err(Error::NegativeShare {
                attribute: name,
                level,
                share,
            });
        }
        if distribution.len() != levels {
            return Err(Error::LevelCountMismatch {
                attribute: name,
                levels,
                distribution_len: distribution.len(),
            });
        }
        Ok(Self {
            name,
            levels,
            distribution,
        })
    }

    /// Returns the exact, fractional target count per level for a design of `n` rows.
    pub fn target_counts(&self, n: usize) -> DVector<f64> {
        &self.distribution * n as f64
    }

    /// Returns the target count per level for `n` rows, rounded half to even.
    pub fn rounded_target_counts(&self, n: usize) -> Vec<usize> {
        self.target_counts(n)
            .iter()
            .map(|c| c.round_ties_even() as usize)
            .collect()
    }
}

/// Ordered list of attributes, one per design column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeCatalog {
    attributes: Vec<Attribute>,
}

impl AttributeCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and appends an attribute.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        levels: usize,
        distribution: Vec<f64>,
    ) -> Result<&Attribute> {
        let attribute = Attribute::new(name, levels, distribution)?;
        self.attributes.push(attribute);
        Ok(&self.attributes[self.attributes.len() - 1])
    }

    /// Returns the column of the first attribute with the given name.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Returns true if no attribute is registered.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Iterates over the attributes in column order.
    pub fn iter(&self) -> std::slice::Iter<'_, Attribute> {
        self.attributes.iter()
    }

    /// Returns the attribute of the given column.
    pub fn get(&self, column: usize) -> Option<&Attribute> {
        self.attributes.get(column)
    }

    /// Checks that `row` holds one valid level index per attribute.
    pub(crate) fn validate_row(&self, row_name: &'static str, row: &[usize]) -> Result<()> {
        if row.len() != self.attributes.len() {
            return Err(Error::RowLength {
                row: row_name,
                expected: self.attributes.len(),
                found: row.len(),
            });
        }
        for (column, (&value, attribute)) in row.iter().zip(&self.attributes).enumerate() {
            if value >= attribute.levels {
                return Err(Error::LevelOutOfRange {
                    column,
                    value,
                    max_level: attribute.levels - 1,
                });
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a AttributeCatalog {
    type Item = &'a Attribute;
    type IntoIter = std::slice::Iter<'a, Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.attributes.iter()
    }
}
