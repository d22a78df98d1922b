mod features;
mod model;

pub use features::{build_feature_vector, outcome_label, training_set_from, TrainingExample, FEATURE_NAMES};
pub use model::{OutcomeModel, OutcomePredictor};
