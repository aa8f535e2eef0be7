use crate::{
    Attribute, AttributeCatalog, ConstraintCatalog, Error, InteractionConstraint, InteractionMode,
    Result, utils,
};
use log::debug;
use nalgebra::{DMatrix, DVector};
use rand::{Rng, seq::SliceRandom};
use std::fmt::Display;

/// Constraint violations of a design.
#[derive(Debug, Clone, PartialEq)]
pub struct Slacks {
    /// One vector per attribute holding `target count - actual count` per level. Positive
    /// entries mark under-represented levels, negative entries over-represented ones.
    pub distribution: Vec<DVector<f64>>,
    /// Number of constraint violating rows summed over all interaction constraints.
    pub interaction: usize,
}

impl Slacks {
    /// Returns the sum of absolute distribution slacks plus the interaction slack.
    pub fn total(&self) -> f64 {
        self.distribution
            .iter()
            .map(|d| d.iter().map(|v| v.abs()).sum::<f64>())
            .sum::<f64>()
            + self.interaction as f64
    }
}

/// Interaction constraint with resolved column positions.
struct ResolvedConstraint<'a> {
    column_a: usize,
    column_b: usize,
    constraint: &'a InteractionConstraint,
}

impl ResolvedConstraint<'_> {
    fn is_violated_by(&self, value: impl Fn(usize) -> usize) -> bool {
        self.constraint
            .is_violated_by(value(self.column_a), value(self.column_b))
    }
}

/// Design matrix of `n` profiles over a set of discrete attributes.
///
/// Rows are profiles, columns are attributes and each cell holds a level index of its attribute.
/// Every mutation increases the [version](DesignMatrix::version) of the design, cached slacks are
/// only handed out if they were computed for the current version.
///
/// ```
/// use dexchange::{DesignMatrix, Result};
/// use rand::{SeedableRng, rngs::StdRng};
///
/// fn main() -> Result<()> {
///     let mut dm = DesignMatrix::new(8);
///     dm.add_attribute("age", 3, vec![25., 50., 25.])?;
///     dm.add_attribute("sex", 2, vec![50., 50.])?;
///     dm.generate_with_rng(&mut StdRng::seed_from_u64(42));
///     assert_eq!(dm.shape(), (8, 2));
///
///     dm.add_row(&[1, 1])?;
///     assert!(dm.slacks().is_none());
///     let slacks = dm.update_slacks();
///     assert_eq!(slacks.distribution.len(), 2);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    n: usize,
    attributes: AttributeCatalog,
    constraints: ConstraintCatalog,
    x: DMatrix<usize>,
    version: u64,
    slacks: Slacks,
    distribution_version: Option<u64>,
    interaction_version: Option<u64>,
}

impl Default for DesignMatrix {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Display for DesignMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let widths: Vec<usize> = self.attributes.iter().map(|a| a.name.len().max(3)).collect();
        let width = (widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1)).max(28);
        let header = self
            .attributes
            .iter()
            .zip(&widths)
            .map(|(a, w)| format!("{:>1$}", a.name, w))
            .collect::<Vec<String>>()
            .join("  ");
        let rows = self
            .x
            .row_iter()
            .map(|r| {
                r.iter()
                    .zip(&widths)
                    .map(|(v, w)| format!("{:>1$}", v, w))
                    .collect::<Vec<String>>()
                    .join("  ")
            })
            .collect::<Vec<String>>()
            .join("\n");
        write!(f, "{:-^1$}\n{header}", " Design Matrix ", width)?;
        if !rows.is_empty() {
            write!(f, "\n{rows}")?;
        }
        write!(f, "\n{:-^1$}", "", width)
    }
}

impl DesignMatrix {
    /// Creates an empty design targeting `n` rows.
    pub fn new(n: usize) -> Self {
        Self {
            n,
            attributes: AttributeCatalog::new(),
            constraints: ConstraintCatalog::new(),
            x: DMatrix::zeros(0, 0),
            version: 0,
            slacks: Slacks {
                distribution: vec![],
                interaction: 0,
            },
            distribution_version: None,
            interaction_version: None,
        }
    }

    /// Sets the targeted number of rows.
    pub fn set_size(&mut self, n: usize) {
        self.n = n;
        self.touch();
    }

    /// Targeted number of rows.
    pub fn size(&self) -> usize {
        self.n
    }

    /// Current shape of the matrix as (rows, attributes).
    pub fn shape(&self) -> (usize, usize) {
        self.x.shape()
    }

    /// Current number of rows.
    pub fn nrows(&self) -> usize {
        self.x.nrows()
    }

    /// Number of attributes.
    pub fn ncols(&self) -> usize {
        self.x.ncols()
    }

    /// Returns the matrix of level indices.
    pub fn x(&self) -> &DMatrix<usize> {
        &self.x
    }

    /// Returns row `index` as level indices.
    pub fn row(&self, index: usize) -> Option<Vec<usize>> {
        (index < self.x.nrows()).then(|| self.x.row(index).iter().copied().collect())
    }

    /// Registered attributes in column order.
    pub fn attributes(&self) -> &AttributeCatalog {
        &self.attributes
    }

    /// Registered interaction constraints.
    pub fn constraints(&self) -> &ConstraintCatalog {
        &self.constraints
    }

    /// Version of the design, increased on every mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    fn touch(&mut self) {
        self.version += 1;
    }

    /// Adds an attribute as new column. Attributes have to be added before the design holds rows.
    pub fn add_attribute(
        &mut self,
        name: impl Into<String>,
        levels: usize,
        distribution: Vec<f64>,
    ) -> Result<&Attribute> {
        let name = name.into();
        if self.x.nrows() > 0 {
            return Err(Error::AttributesFrozen {
                attribute: name,
                nrows: self.x.nrows(),
            });
        }
        let ncols = self.attributes.len() + 1;
        let attribute = self.attributes.add(name, levels, distribution)?;
        self.x = DMatrix::zeros(0, ncols);
        self.version += 1;
        Ok(attribute)
    }

    /// Adds an interaction constraint from `attribute_a` onto `attribute_b`, see
    /// [ConstraintCatalog::add].
    pub fn add_interaction<M>(
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
        let constraint = self
            .constraints
            .add(attribute_a, attribute_b, level_a, level_b, mode)?;
        self.version += 1;
        Ok(constraint)
    }

    /// Generates the initial design with the thread local random generator, see
    /// [DesignMatrix::generate_with_rng].
    pub fn generate(&mut self) {
        self.generate_with_rng(&mut rand::rng());
    }

    /// Generates the initial design with `n` rows.
    ///
    /// Every column is filled independently with level counts as close to the attribute's
    /// distribution as integer rounding allows: the rounded targets are padded with the level of
    /// highest target or reduced by the currently most frequent level until the column has `n`
    /// entries. Each column is shuffled on its own afterwards. Interaction constraints are not
    /// taken into account.
    pub fn generate_with_rng<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let n = self.n;
        let columns: Vec<Vec<usize>> = self
            .attributes
            .iter()
            .map(|attribute| {
                let mut column = Self::level_column(attribute, n);
                column.shuffle(rng);
                column
            })
            .collect();
        self.x = DMatrix::from_fn(n, columns.len(), |r, c| columns[c][r]);
        self.touch();
        self.update_slacks();
    }

    fn level_column(attribute: &Attribute, n: usize) -> Vec<usize> {
        let targets = attribute.rounded_target_counts(n);
        let mut counts = targets.clone();
        let total: usize = counts.iter().sum();
        if total < n {
            counts[first_argmax(&targets)] += n - total;
        } else {
            for _ in n..total {
                let level = first_argmax(&counts);
                counts[level] -= 1;
            }
        }
        counts
            .iter()
            .enumerate()
            .flat_map(|(level, &count)| std::iter::repeat_n(level, count))
            .collect()
    }

    /// Replaces the whole matrix. Every row is validated like in [DesignMatrix::add_row].
    pub fn set_x(&mut self, x: DMatrix<usize>) -> Result<()> {
        if x.ncols() != self.attributes.len() {
            return Err(Error::RowLength {
                row: "x",
                expected: self.attributes.len(),
                found: x.ncols(),
            });
        }
        for row in x.row_iter() {
            let row: Vec<usize> = row.iter().copied().collect();
            self.attributes.validate_row("x", &row)?;
        }
        self.x = x;
        self.touch();
        Ok(())
    }

    /// Appends a row, which has to contain one valid level index per attribute.
    pub fn add_row(&mut self, row: &[usize]) -> Result<()> {
        self.attributes.validate_row("row", row)?;
        let nrows = self.x.nrows();
        let x = std::mem::replace(&mut self.x, DMatrix::zeros(0, 0));
        self.x = x.insert_row(nrows, 0);
        self.x.row_mut(nrows).iter_mut().zip(row).for_each(|(v, r)| *v = *r);
        self.touch();
        Ok(())
    }

    /// Removes row `index` and returns it.
    pub fn del_row(&mut self, index: usize) -> Result<Vec<usize>> {
        let nrows = self.x.nrows();
        if index >= nrows {
            return Err(Error::RowIndexOutOfRange { index, nrows });
        }
        let row = self.x.row(index).iter().copied().collect();
        let x = std::mem::replace(&mut self.x, DMatrix::zeros(0, 0));
        self.x = x.remove_row(index);
        self.touch();
        Ok(row)
    }

    /// Recomputes the distribution slack of every attribute.
    pub fn update_distribution_slack(&mut self) -> &[DVector<f64>] {
        self.slacks.distribution = self
            .attributes
            .iter()
            .enumerate()
            .map(|(column, attribute)| {
                let mut slack = attribute.target_counts(self.n);
                self.x.column(column).iter().for_each(|&level| {
                    slack[level] -= 1.;
                });
                slack
            })
            .collect();
        self.distribution_version = Some(self.version);
        &self.slacks.distribution
    }

    /// Recomputes the number of rows violating the interaction constraints.
    ///
    /// Constraints naming an unknown attribute do not contribute.
    pub fn update_interaction_slack(&mut self) -> usize {
        let resolved = self.resolved_constraints();
        let interaction = self
            .x
            .row_iter()
            .map(|row| {
                resolved
                    .iter()
                    .filter(|c| c.is_violated_by(|column| row[(0, column)]))
                    .count()
            })
            .sum();
        self.slacks.interaction = interaction;
        self.interaction_version = Some(self.version);
        self.slacks.interaction
    }

    /// Recomputes all slacks and returns them.
    pub fn update_slacks(&mut self) -> &Slacks {
        self.update_distribution_slack();
        self.update_interaction_slack();
        &self.slacks
    }

    /// Returns the slacks if they are up to date with the current matrix.
    pub fn slacks(&self) -> Option<&Slacks> {
        (self.distribution_version == Some(self.version)
            && self.interaction_version == Some(self.version))
        .then_some(&self.slacks)
    }

    /// Returns the distribution slacks if they are up to date with the current matrix.
    pub fn distribution_slack(&self) -> Option<&[DVector<f64>]> {
        (self.distribution_version == Some(self.version))
            .then_some(self.slacks.distribution.as_slice())
    }

    /// Returns the interaction slack if it is up to date with the current matrix.
    pub fn interaction_slack(&self) -> Option<usize> {
        (self.interaction_version == Some(self.version)).then_some(self.slacks.interaction)
    }

    /// Returns the slacks the design would have after replacing row `index` by `row`, without
    /// touching the matrix.
    ///
    /// The result equals the slacks after [del_row](DesignMatrix::del_row),
    /// [add_row](DesignMatrix::add_row) and [update_slacks](DesignMatrix::update_slacks).
    pub fn slacks_after_swap(&self, index: usize, row: &[usize]) -> Result<Slacks> {
        let nrows = self.x.nrows();
        if index >= nrows {
            return Err(Error::RowIndexOutOfRange { index, nrows });
        }
        self.attributes.validate_row("row", row)?;
        let base = match self.slacks() {
            Some(slacks) => slacks.clone(),
            None => {
                let mut design = self.clone();
                design.update_slacks().clone()
            }
        };
        Ok(self.swapped_slacks(&base, index, row))
    }

    /// Adjusts `base`, the slacks of the current matrix, for replacing row `index` by `row`.
    /// Both arguments have to be valid.
    pub(crate) fn swapped_slacks(&self, base: &Slacks, index: usize, row: &[usize]) -> Slacks {
        let old = self.x.row(index);
        let mut slacks = base.clone();
        slacks
            .distribution
            .iter_mut()
            .zip(old.iter().zip(row))
            .for_each(|(slack, (&o, &r))| {
                slack[o] += 1.;
                slack[r] -= 1.;
            });
        let resolved = self.resolved_constraints();
        let removed = resolved
            .iter()
            .filter(|c| c.is_violated_by(|column| old[(0, column)]))
            .count();
        let added = resolved
            .iter()
            .filter(|c| c.is_violated_by(|column| row[column]))
            .count();
        slacks.interaction = slacks.interaction + added - removed;
        slacks
    }

    fn resolved_constraints(&self) -> Vec<ResolvedConstraint<'_>> {
        self.constraints
            .iter()
            .filter_map(|constraint| {
                let column_a = self.attributes.position(&constraint.attribute_a);
                let column_b = self.attributes.position(&constraint.attribute_b);
                match (column_a, column_b) {
                    (Some(column_a), Some(column_b)) => Some(ResolvedConstraint {
                        column_a,
                        column_b,
                        constraint,
                    }),
                    _ => {
                        debug!("skipping constraint {constraint} with unknown attribute");
                        None
                    }
                }
            })
            .collect()
    }

    /// Returns the determinant of the information matrix $X^T X$ of the current matrix.
    pub fn information_determinant(&self) -> f64 {
        utils::information_determinant(&self.x)
    }
}

fn first_argmax(values: &[usize]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, 0), |(best_id, best), (id, &v)| {
            if v > best { (id, v) } else { (best_id, best) }
        })
        .0
}
