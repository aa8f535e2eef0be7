#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../../README.md")]
mod attribute;
mod constraint;
mod design_matrix;
mod error;
mod exchange;
mod objective;
mod utils;

pub use attribute::{Attribute, AttributeCatalog};
pub use constraint::{ConstraintCatalog, InteractionConstraint, InteractionMode};
pub use design_matrix::{DesignMatrix, Slacks};
pub use error::{Error, Result};
pub use exchange::{
    ExchangeCriteria, ExchangeOutcome, FedorovExchange, Swap, Termination, run_fedorov_exchange,
};
pub use objective::PenalizedDOptimality;
pub use utils::{information_determinant, information_inverse, information_matrix, model_matrix};
