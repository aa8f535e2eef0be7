use crate::{DesignMatrix, Slacks, utils};
use nalgebra::DMatrix;

#[cfg_attr(doc, katexit::katexit)]
/// D-optimality criterion penalized by the constraint slacks of a design.
///
/// $$ \mathcal{Obj} := \frac{100 \cdot {(\det X^T X)}^{\frac{1}{k}}}{n} - \lambda \left( \sum_{a}
/// \sum_{l} |s_{a,l}| + |s_I| \right) $$
///
/// with design matrix $X$ of $n$ rows and $k$ attributes, distribution slacks $s_{a,l}$,
/// interaction slack $s_I$ and penalty weight $\lambda$.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PenalizedDOptimality {
    penalty_weight: f64,
}

impl Default for PenalizedDOptimality {
    fn default() -> Self {
        Self::new(0.)
    }
}

impl PenalizedDOptimality {
    /// Instantizes [PenalizedDOptimality] with penalty weight $\lambda$.
    pub fn new(penalty_weight: f64) -> Self {
        Self { penalty_weight }
    }

    /// Penalty weight.
    pub fn penalty_weight(&self) -> f64 {
        self.penalty_weight
    }

    /// Returns true if constraint slacks take part in the objective.
    pub fn is_penalized(&self) -> bool {
        self.penalty_weight != 0.
    }

    /// Returns the unpenalized, scale normalized D-optimality criterion of `x`.
    pub fn criterion(x: &DMatrix<usize>) -> f64 {
        let (n, k) = x.shape();
        if n == 0 || k == 0 {
            return 0.;
        }
        let det = utils::information_determinant(x).max(0.);
        100. * det.powf(1. / k as f64) / n as f64
    }

    /// Returns the weighted penalty of the given slacks.
    pub fn penalty(&self, slacks: &Slacks) -> f64 {
        self.penalty_weight * slacks.total()
    }

    /// Returns the penalized objective of the design. The slacks of the design are recomputed
    /// unless the penalty weight is zero.
    pub fn score(&self, design: &mut DesignMatrix) -> f64 {
        let criterion = Self::criterion(design.x());
        if !self.is_penalized() {
            return criterion;
        }
        let penalty = self.penalty(design.update_slacks());
        criterion - penalty
    }
}
