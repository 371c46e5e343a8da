//! Model training
//!
//! - [`LogisticRegression`]: L1/L2 penalized binary logistic regression
//! - [`StratifiedKFold`]: class-preserving fold assignment
//! - [`UnimodalTrainer`]: regularization search and refit for one modality

pub mod cross_validation;
pub mod logistic;
pub mod unimodal;

pub use cross_validation::{CVResults, CVSplit, StratifiedKFold};
pub use logistic::{ClassWeight, LogisticRegression, Penalty};
pub use unimodal::{
    CandidateScore, ModalityModel, StrengthSelection, TrainedModality, UnimodalTrainer,
};
