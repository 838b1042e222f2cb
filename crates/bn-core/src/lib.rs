//! Factor algebra and inference for discrete-and-hybrid Bayesian networks:
//! exact inference by variable elimination, approximate inference by Gibbs
//! sampling, continuous-time substitution-model kernels, and ancestral
//! sequence reconstruction on phylogenetic trees.

pub mod cancellation;
pub mod distributions;
pub mod factor;
pub mod gibbs;
pub mod inference;
pub mod network;
pub mod rate_matrix;
pub mod rng;
pub mod substitution;
pub mod table;
pub mod variable;

pub use cancellation::CancellationToken;
pub use distributions::{Categorical, Dist, Value};
pub use factor::{Cell, Factor, Jdf, Trace};
pub use gibbs::GibbsMode;
pub use inference::{log_likelihood, marginal, mpe};
pub use network::{Evidence, Network, NetworkBuilder, NodeDistribution};
pub use rate_matrix::{ModelHealth, NAMED_MODELS, RateMatrix, named_model};
pub use rng::BnRng;
pub use substitution::{Alignment, GapHandling, Tree, reconstruct};
pub use table::Table;
pub use variable::{Domain, VarKind, Variable};

pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::distributions::{Categorical, Dirichlet, Dist, Gamma, Gaussian, Mixture, Value, VariancePolicy};
    pub use crate::factor::{Cell, Factor, Jdf, Trace};
    pub use crate::gibbs::{GibbsMode, markov_blanket_conditional};
    pub use crate::inference::{log_likelihood, marginal, mpe};
    pub use crate::network::{Evidence, Network, NetworkBuilder, NodeDistribution};
    pub use crate::rate_matrix::{ModelHealth, NAMED_MODELS, RateMatrix, named_model};
    pub use crate::rng::BnRng;
    pub use crate::substitution::{Alignment, GapHandling, Tree, reconstruct};
    pub use crate::table::Table;
    pub use crate::variable::{Domain, VarKind, Variable};
}
