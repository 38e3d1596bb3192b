//! Error types with recovery actions.
//!
//! Every fallible operation in the crate returns [`RbmResult`], which pairs the
//! [`RbmError`] with an optional [`RecoveryAction`] telling the caller how the
//! failure can be handled. `PredictionImpossible` is the only error the
//! recommender contract recovers from on its own (by falling back to the
//! default prediction); everything else is surfaced.

use thiserror::Error;

/// Result type used throughout the crate.
///
/// The error side carries the failure and, when one exists, the action that
/// recovers from it.
pub type RbmResult<T> = Result<T, (RbmError, Option<RecoveryAction>)>;

/// Errors raised while tensorizing, training or predicting.
#[derive(Debug, Error)]
pub enum RbmError {
    /// The user or item of a prediction request was not part of the trainset.
    #[error("Prediction impossible: {reason}")]
    PredictionImpossible {
        /// Why the estimate could not be produced.
        reason: String,
    },

    /// Reconstruction or estimation was attempted before the model was trained.
    #[error("Model has not been trained; call fit first")]
    ModelNotTrained,

    /// A hyperparameter is outside its valid range.
    #[error("Invalid configuration: {detail}")]
    InvalidConfig {
        /// Which parameter is wrong and why.
        detail: String,
    },

    /// The rating scale cannot be discretized.
    #[error("Invalid rating scale: {detail}")]
    InvalidRatingScale {
        /// Which bound is wrong and why.
        detail: String,
    },

    /// A rating does not fit into the configured rating scale.
    #[error("Rating {rating} is outside the rating scale [{min}, {max}]")]
    RatingOutOfRange {
        /// The offending rating.
        rating: f32,
        /// Lower bound of the scale.
        min: f32,
        /// Upper bound of the scale.
        max: f32,
    },

    /// A rating lies inside the scale bounds but between two rating levels.
    #[error("Rating {rating} does not fall on a level of the rating scale (step {step})")]
    RatingOffLevel {
        /// The offending rating.
        rating: f32,
        /// Step between adjacent levels.
        step: f32,
    },

    /// The trainset has no users or no items.
    #[error("Empty trainset: {users} users, {items} items")]
    EmptyTrainset {
        /// Number of users found.
        users: usize,
        /// Number of items found.
        items: usize,
    },

    /// A tensor does not match the width the model was sized for.
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Expected shape.
        expected: String,
        /// Actual shape.
        actual: String,
    },

    /// A parameter update produced NaN or infinite values.
    #[error("Numerical instability at epoch {epoch}: {detail}")]
    NumericalInstability {
        /// Epoch (1-indexed) during which the update diverged.
        epoch: usize,
        /// Which parameter block went non-finite.
        detail: String,
    },

    /// A line of a ratings file could not be parsed.
    #[error("Parse error on line {line}: {detail}")]
    Parse {
        /// Line number (1-indexed).
        line: usize,
        /// What was wrong with it.
        detail: String,
    },

    /// Reading ratings failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration or metrics (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Actions a caller can take to recover from an [`RbmError`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecoveryAction {
    /// Fall back to the recommender's default prediction.
    UseDefaultPrediction,

    /// Fit the model (again) before predicting.
    Retrain,

    /// Retrain with the learning rate scaled down by `factor`.
    ReduceLearningRate {
        /// Multiplier to apply to the current learning rate.
        factor: f32,
    },

    /// Clamp out-of-range ratings instead of rejecting them.
    ClampRatings,

    /// The configuration or input data must be corrected by the caller.
    FixInput,
}

impl RbmError {
    /// Creates a `PredictionImpossible` error.
    pub fn prediction_impossible(reason: impl Into<String>) -> Self {
        Self::PredictionImpossible {
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidConfig` error.
    pub fn invalid_config(detail: impl Into<String>) -> Self {
        Self::InvalidConfig {
            detail: detail.into(),
        }
    }

    /// Creates a `ShapeMismatch` error.
    pub fn shape_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Returns the recovery action that usually accompanies this error.
    pub fn recovery_action(&self) -> Option<RecoveryAction> {
        match self {
            Self::PredictionImpossible { .. } => Some(RecoveryAction::UseDefaultPrediction),
            Self::ModelNotTrained => Some(RecoveryAction::Retrain),
            Self::NumericalInstability { .. } => {
                Some(RecoveryAction::ReduceLearningRate { factor: 0.1 })
            }
            Self::RatingOutOfRange { .. } | Self::RatingOffLevel { .. } => {
                Some(RecoveryAction::ClampRatings)
            }
            Self::InvalidConfig { .. }
            | Self::InvalidRatingScale { .. }
            | Self::EmptyTrainset { .. }
            | Self::ShapeMismatch { .. }
            | Self::Parse { .. } => Some(RecoveryAction::FixInput),
            Self::Io(_) | Self::Serialization(_) => None,
        }
    }

    /// Returns true if this is a `PredictionImpossible` error.
    pub fn is_prediction_impossible(&self) -> bool {
        matches!(self, Self::PredictionImpossible { .. })
    }
}

impl From<RbmError> for (RbmError, Option<RecoveryAction>) {
    fn from(error: RbmError) -> Self {
        let action = error.recovery_action();
        (error, action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = RbmError::prediction_impossible("User and/or item is unknown.");
        assert_eq!(
            err.to_string(),
            "Prediction impossible: User and/or item is unknown."
        );

        let err = RbmError::RatingOutOfRange {
            rating: 7.0,
            min: 1.0,
            max: 5.0,
        };
        assert_eq!(err.to_string(), "Rating 7 is outside the rating scale [1, 5]");

        let err = RbmError::RatingOffLevel {
            rating: 3.4,
            step: 1.0,
        };
        assert_eq!(
            err.to_string(),
            "Rating 3.4 does not fall on a level of the rating scale (step 1)"
        );
    }

    #[test]
    fn test_recovery_actions() {
        assert_eq!(
            RbmError::ModelNotTrained.recovery_action(),
            Some(RecoveryAction::Retrain)
        );
        assert_eq!(
            RbmError::prediction_impossible("x").recovery_action(),
            Some(RecoveryAction::UseDefaultPrediction)
        );
        assert!(matches!(
            RbmError::NumericalInstability {
                epoch: 3,
                detail: "weights".into()
            }
            .recovery_action(),
            Some(RecoveryAction::ReduceLearningRate { .. })
        ));
    }

    #[test]
    fn test_question_mark_conversion() {
        fn inner() -> Result<(), RbmError> {
            Err(RbmError::ModelNotTrained)
        }

        fn fails() -> RbmResult<()> {
            inner()?;
            Ok(())
        }

        let (err, action) = fails().unwrap_err();
        assert!(matches!(err, RbmError::ModelNotTrained));
        assert_eq!(action, Some(RecoveryAction::Retrain));
    }
}
