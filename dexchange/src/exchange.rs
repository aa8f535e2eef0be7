use crate::{DesignMatrix, Error, PenalizedDOptimality, Result, Slacks, utils};
use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use std::fmt::Display;

/// Stop criteria of the exchange algorithm.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeCriteria {
    /// Maximal number of outer iterations.
    pub max_iter: usize,
    /// Stop after a swap whose relative objective improvement is lower equal to given value.
    pub improvement_tolerance: f64,
    /// Minimal number of (row, candidate) pairs for which a scan is evaluated in parallel.
    pub parallel_threshold: usize,
}

impl Default for ExchangeCriteria {
    fn default() -> Self {
        Self {
            max_iter: 100,
            improvement_tolerance: 1e-5,
            parallel_threshold: 4096,
        }
    }
}

/// Terminal state of the exchange algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// No improving swap is left or the last improvement was below tolerance.
    Converged,
    /// The maximal number of iterations is reached.
    IterationLimitReached,
}

impl Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::Converged => write!(f, "converged"),
            Termination::IterationLimitReached => write!(f, "iteration limit reached"),
        }
    }
}

/// Accepted swap of a design row for a candidate row.
#[derive(Debug, Clone, PartialEq)]
pub struct Swap {
    /// Outer iteration in which the swap was accepted, starting at 1.
    pub iteration: usize,
    /// Index of the removed design row.
    pub row: usize,
    /// Index of the inserted candidate row.
    pub candidate: usize,
    /// Relative change of $\det X^T X$ by the Fedorov update, not meaningful if the design was
    /// singular before the swap.
    pub delta: f64,
    /// Relative improvement of the penalized objective.
    pub improvement: f64,
    /// Tracked determinant after the swap.
    pub determinant: f64,
}

/// Result of the exchange algorithm.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeOutcome {
    /// Design matrix at termination.
    pub design: DMatrix<usize>,
    /// Number of outer iterations.
    pub iterations: usize,
    /// Terminal state.
    pub termination: Termination,
    /// Accepted swaps in order.
    pub swaps: Vec<Swap>,
    /// Tracked determinant of $X^T X$ at termination.
    pub determinant: f64,
    /// Penalized objective at termination.
    pub score: f64,
}

impl Display for ExchangeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:-^28}\nTermination: {}\nIterations: {}\nSwaps: {}\nDeterminant: {:.6}\nScore: {:.6}\n{:-^28}",
            " Statistics ",
            self.termination,
            self.iterations,
            self.swaps.len(),
            self.determinant,
            self.score,
            ""
        )
    }
}

/// Candidate pair found by a scan.
#[derive(Debug, Clone, Copy)]
struct Exchange {
    row: usize,
    candidate: usize,
    delta: f64,
    determinant: f64,
    improvement: f64,
}

/// Variances of the current design under $(X^T X)^{-1}$.
struct Variances {
    /// $d(x_i, x_i)$ per design row.
    design: DVector<f64>,
    /// $d(c_j, c_j)$ per candidate row.
    candidates: DVector<f64>,
    /// $d(x_i, c_j)$.
    cross: DMatrix<f64>,
}

impl Variances {
    fn new(x: &DMatrix<usize>, candidates: &DMatrix<f64>) -> Self {
        let xinv = utils::information_inverse(x);
        let xf = utils::model_matrix(x);
        let x_xinv = &xf * &xinv;
        let c_xinv = candidates * &xinv;
        let design = x_xinv.component_mul(&xf).column_sum();
        let candidates_var = c_xinv.component_mul(candidates).column_sum();
        let cross = x_xinv * candidates.transpose();
        Self {
            design,
            candidates: candidates_var,
            cross,
        }
    }

    #[cfg_attr(doc, katexit::katexit)]
    /// Relative change $\Delta$ of $\det X^T X$ when replacing design row $x$ by candidate $c$:
    ///
    /// $$ \Delta = d(c, c) - \left( d(c, c)\, d(x, x) - d(x, c)^2 \right) - d(x, x) $$
    fn delta(&self, row: usize, candidate: usize) -> f64 {
        let d_xx = self.design[row];
        let d_cc = self.candidates[candidate];
        let d_xc = self.cross[(row, candidate)];
        d_cc - (d_cc * d_xx - d_xc * d_xc) - d_xx
    }
}

/// State shared by all pair evaluations of one scan.
struct Scan<'a> {
    design: &'a DesignMatrix,
    candidates: &'a [Vec<usize>],
    objective: &'a PenalizedDOptimality,
    variances: Variances,
    slacks: Slacks,
    determinant: f64,
    penalty: f64,
    /// Information matrix of a singular design, for which swaps are rated by their exact
    /// determinant since $\det X^T X \cdot (1 + \Delta)$ stays zero.
    singular: Option<DMatrix<f64>>,
}

impl Scan<'_> {
    /// Returns the first candidate with the strictly largest positive improvement for `row`.
    fn best_for_row(&self, row: usize) -> Option<Exchange> {
        let old = self.determinant - self.penalty;
        let design_row: Vec<usize> = self.design.x().row(row).iter().copied().collect();
        let mut best: Option<Exchange> = None;
        for (candidate, candidate_row) in self.candidates.iter().enumerate() {
            let delta = self.variances.delta(row, candidate);
            let determinant = match &self.singular {
                Some(xtx) => {
                    utils::swapped_information_determinant(xtx, &design_row, candidate_row)
                }
                None => self.determinant * (1. + delta),
            };
            let new_penalty = if self.objective.is_penalized() {
                let slacks = self.design.swapped_slacks(&self.slacks, row, candidate_row);
                self.objective.penalty(&slacks)
            } else {
                0.
            };
            let new = determinant - new_penalty;
            let improvement = relative_improvement(new, old);
            let threshold = best.map_or(0., |b| b.improvement);
            if improvement > threshold {
                best = Some(Exchange {
                    row,
                    candidate,
                    delta,
                    determinant,
                    improvement,
                });
            }
        }
        best
    }
}

fn relative_improvement(new: f64, old: f64) -> f64 {
    if old == 0. {
        new - old
    } else {
        (new - old) / old.abs()
    }
}

/// Fedorov exchange algorithm with penalized D-optimality.
///
/// Every outer iteration scans all pairs of design rows and candidate rows, evaluates the change
/// of $\det X^T X$ with the closed form update of the Fedorov exchange together with the change
/// of the constraint penalty, and applies the single best improving swap. The search ends as soon
/// as no swap improves the objective, the improvement falls below tolerance or the iteration
/// limit is reached.
///
/// ```
/// use dexchange::{DesignMatrix, FedorovExchange, Result, Termination};
/// use nalgebra::DMatrix;
/// use rand::{SeedableRng, rngs::StdRng};
///
/// fn main() -> Result<()> {
///     let mut dm = DesignMatrix::new(6);
///     dm.add_attribute("price", 3, vec![1. / 3., 1. / 3., 1. / 3.])?;
///     dm.add_attribute("brand", 2, vec![0.5, 0.5])?;
///     dm.generate_with_rng(&mut StdRng::seed_from_u64(1));
///
///     let candidates = DMatrix::from_row_slice(6, 2, &[0, 0, 0, 1, 1, 0, 1, 1, 2, 0, 2, 1]);
///     let outcome = FedorovExchange::new(0.).run(&mut dm, &candidates)?;
///     assert_eq!(outcome.termination, Termination::Converged);
///     assert!(outcome.iterations <= 100);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct FedorovExchange {
    objective: PenalizedDOptimality,
    criteria: ExchangeCriteria,
}

impl FedorovExchange {
    /// Returns the exchange algorithm with given penalty weight and default criteria.
    pub fn new(penalty_weight: f64) -> Self {
        Self {
            objective: PenalizedDOptimality::new(penalty_weight),
            criteria: ExchangeCriteria::default(),
        }
    }

    /// Returns the exchange algorithm with given [ExchangeCriteria].
    pub fn with_criteria(mut self, criteria: ExchangeCriteria) -> Self {
        self.criteria = criteria;
        self
    }

    /// Stop criteria.
    pub fn criteria(&self) -> &ExchangeCriteria {
        &self.criteria
    }

    /// Objective the exchange maximizes.
    pub fn objective(&self) -> &PenalizedDOptimality {
        &self.objective
    }

    /// Improves `design` in place by swapping rows for rows of `candidates`.
    ///
    /// The candidate set has the column layout of the design, typically the full factorial of
    /// all attribute levels.
    pub fn run(
        &self,
        design: &mut DesignMatrix,
        candidates: &DMatrix<usize>,
    ) -> Result<ExchangeOutcome> {
        let candidate_rows = Self::validate_candidates(design, candidates)?;
        let candidates_f = utils::model_matrix(candidates);

        let mut determinant = design.information_determinant();
        let mut swaps: Vec<Swap> = vec![];
        let mut iterations = 0;

        let termination = loop {
            if iterations >= self.criteria.max_iter {
                warn!(
                    "exchange stopped due to reaching iteration limit of {}",
                    self.criteria.max_iter
                );
                break Termination::IterationLimitReached;
            }
            iterations += 1;

            let slacks = design.update_slacks().clone();
            let best = {
                let scan = Scan {
                    design: &*design,
                    candidates: &candidate_rows,
                    objective: &self.objective,
                    variances: Variances::new(design.x(), &candidates_f),
                    penalty: self.objective.penalty(&slacks),
                    slacks,
                    determinant,
                    singular: (determinant.abs() <= f64::EPSILON)
                        .then(|| utils::information_matrix(design.x())),
                };
                self.scan(&scan)
            };
            let Some(best) = best else {
                info!("exchange converged in {iterations} iterations without improving swap");
                break Termination::Converged;
            };

            design.del_row(best.row)?;
            design.add_row(&candidate_rows[best.candidate])?;
            design.update_slacks();
            determinant = best.determinant;
            if determinant.abs() <= f64::EPSILON {
                determinant = design.information_determinant();
            }
            debug!(
                "iteration {iterations}: row {} <- candidate {} | improvement {} | delta {}",
                best.row, best.candidate, best.improvement, best.delta
            );
            swaps.push(Swap {
                iteration: iterations,
                row: best.row,
                candidate: best.candidate,
                delta: best.delta,
                improvement: best.improvement,
                determinant,
            });

            if best.improvement <= self.criteria.improvement_tolerance {
                info!("exchange converged in {iterations} iterations");
                break Termination::Converged;
            }
        };

        let score = self.objective.score(design);
        Ok(ExchangeOutcome {
            design: design.x().clone(),
            iterations,
            termination,
            swaps,
            determinant,
            score,
        })
    }

    /// Returns the best improving exchange over all (row, candidate) pairs. Ties keep the pair
    /// found first in row-major, then candidate order.
    fn scan(&self, scan: &Scan) -> Option<Exchange> {
        let nrows = scan.design.nrows();
        let row_best: Vec<Option<Exchange>> = match nrows * scan.candidates.len() {
            pairs if pairs < self.criteria.parallel_threshold => {
                (0..nrows).map(|row| scan.best_for_row(row)).collect()
            }
            _ => (0..nrows)
                .into_par_iter()
                .map(|row| scan.best_for_row(row))
                .collect(),
        };
        row_best
            .into_iter()
            .flatten()
            .fold(None, |best: Option<Exchange>, e| match best {
                Some(b) if e.improvement <= b.improvement => Some(b),
                _ => Some(e),
            })
    }

    fn validate_candidates(
        design: &DesignMatrix,
        candidates: &DMatrix<usize>,
    ) -> Result<Vec<Vec<usize>>> {
        if candidates.nrows() == 0 {
            return Err(Error::EmptyCandidateSet);
        }
        candidates
            .row_iter()
            .map(|r| {
                let row: Vec<usize> = r.iter().copied().collect();
                design.attributes().validate_row("candidate", &row)?;
                Ok(row)
            })
            .collect()
    }
}

/// Runs the [FedorovExchange] with default criteria on `design`.
pub fn run_fedorov_exchange(
    design: &mut DesignMatrix,
    candidates: &DMatrix<usize>,
    penalty_weight: f64,
) -> Result<ExchangeOutcome> {
    FedorovExchange::new(penalty_weight).run(design, candidates)
}
