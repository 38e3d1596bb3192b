//! Recommender contract and the RBM-backed rating estimator.
//!
//! [`Recommender`] is the contract every prediction algorithm follows: `fit`
//! on a [`Trainset`], then `estimate` individual `(user, item)` ratings. The
//! provided `predict` and `test` methods wrap `estimate` with the shared
//! behaviour: an unknown user or item falls back to the default prediction
//! (the trainset's global mean) and estimates are clipped to the rating scale.
//!
//! [`RbmAlgorithm`] implements the contract by tensorizing the trainset,
//! training an [`Rbm`] on a seeded user split, and answering each estimate by
//! reconstructing the user's full rating row.

use std::fmt;

use tracing::{debug, info};

use crate::config::RbmConfig;
use crate::error::{RbmError, RbmResult};
use crate::metrics::TrainingReport;
use crate::rbm::{Rbm, RbmBuilder};
use crate::tensor::RatingTensor;
use crate::trainset::Trainset;

/// Extra information attached to a [`Prediction`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionDetails {
    /// The algorithm could not estimate and the default prediction was used.
    pub was_impossible: bool,
    /// Why the estimate was impossible.
    pub reason: Option<String>,
}

/// A single rating prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Raw user id.
    pub uid: String,
    /// Raw item id.
    pub iid: String,
    /// True rating, when known.
    pub r_ui: Option<f32>,
    /// Estimated rating.
    pub est: f32,
    /// How the estimate was obtained.
    pub details: PredictionDetails,
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user: {:<10} item: {:<10} ", self.uid, self.iid)?;
        match self.r_ui {
            Some(r) => write!(f, "r_ui = {r:.2}   ")?,
            None => write!(f, "r_ui = None   ")?,
        }
        write!(f, "est = {:.2}", self.est)?;
        if self.details.was_impossible {
            write!(
                f,
                "   [impossible: {}]",
                self.details.reason.as_deref().unwrap_or("unknown")
            )?;
        }
        Ok(())
    }
}

/// Contract shared by rating prediction algorithms.
pub trait Recommender {
    /// Trains the algorithm on `trainset`.
    ///
    /// A failed fit leaves the state of the previous successful one in place.
    fn fit(&mut self, trainset: Trainset) -> RbmResult<()>;

    /// Estimates the rating of `uid` for `iid`.
    ///
    /// Fails with `PredictionImpossible` when the estimate cannot be made,
    /// which [`Recommender::predict`] turns into the default prediction.
    fn estimate(&self, uid: &str, iid: &str) -> RbmResult<f32>;

    /// The trainset of the last successful `fit`.
    fn trainset(&self) -> Option<&Trainset>;

    /// Whether `predict` logs every prediction at `info` level.
    fn verbose(&self) -> bool {
        false
    }

    /// Prediction used when `estimate` is impossible: the global mean rating.
    fn default_prediction(&self) -> RbmResult<f32> {
        self.trainset()
            .map(Trainset::global_mean)
            .ok_or_else(|| RbmError::ModelNotTrained.into())
    }

    /// Predicts one rating, falling back to the default prediction for
    /// unknown users or items and clipping to the rating scale when `clip`.
    ///
    /// With [`Recommender::verbose`] set, the prediction is logged in its
    /// `Display` form.
    ///
    /// # Errors
    ///
    /// Every error from `estimate` except `PredictionImpossible`.
    fn predict(
        &self,
        uid: &str,
        iid: &str,
        r_ui: Option<f32>,
        clip: bool,
    ) -> RbmResult<Prediction> {
        let mut details = PredictionDetails::default();
        let est = match self.estimate(uid, iid) {
            Ok(est) => est,
            Err((RbmError::PredictionImpossible { reason }, _)) => {
                debug!(uid, iid, %reason, "using default prediction");
                details.was_impossible = true;
                details.reason = Some(reason);
                self.default_prediction()?
            }
            Err(e) => return Err(e),
        };

        let est = match (clip, self.trainset()) {
            (true, Some(trainset)) => trainset.rating_scale().clamp(est),
            _ => est,
        };

        let prediction = Prediction {
            uid: uid.to_string(),
            iid: iid.to_string(),
            r_ui,
            est,
            details,
        };
        if self.verbose() {
            info!("{prediction}");
        }
        Ok(prediction)
    }

    /// Predicts every `(uid, iid, rating)` triple of `testset`, clipped.
    fn test(&self, testset: &[(String, String, f32)]) -> RbmResult<Vec<Prediction>> {
        testset
            .iter()
            .map(|(uid, iid, r)| self.predict(uid, iid, Some(*r), true))
            .collect()
    }
}

/// Rating estimator backed by a softmax-visible RBM.
#[derive(Debug, Clone)]
pub struct RbmAlgorithm {
    config: RbmConfig,
    trainset: Option<Trainset>,
    ratings: Option<RatingTensor>,
    model: Option<Rbm>,
    report: Option<TrainingReport>,
}

impl RbmAlgorithm {
    /// Creates an untrained algorithm.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration does not validate.
    pub fn new(config: RbmConfig) -> RbmResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            trainset: None,
            ratings: None,
            model: None,
            report: None,
        })
    }

    /// The configuration.
    pub fn config(&self) -> &RbmConfig {
        &self.config
    }

    /// The trained model.
    pub fn model(&self) -> Option<&Rbm> {
        self.model.as_ref()
    }

    /// Report of the last training run.
    pub fn report(&self) -> Option<&TrainingReport> {
        self.report.as_ref()
    }

    /// The full (unsplit) rating tensor of the trainset.
    pub fn ratings(&self) -> Option<&RatingTensor> {
        self.ratings.as_ref()
    }

    /// Validation RMSE of the trained model.
    pub fn rmse(&self) -> Option<f32> {
        self.model.as_ref().and_then(Rbm::rmse)
    }
}

impl Recommender for RbmAlgorithm {
    fn fit(&mut self, trainset: Trainset) -> RbmResult<()> {
        let ratings = RatingTensor::from_trainset(&trainset, self.config.out_of_range)?;
        let (train, validation) = ratings.split(self.config.split_ratio, self.config.seed)?;
        info!(
            users = ratings.n_users(),
            items = ratings.n_items(),
            ratings = ratings.n_ratings(),
            levels = ratings.n_levels(),
            train_users = train.n_users(),
            validation_users = validation.n_users(),
            "fitting RBM"
        );

        let mut model = RbmBuilder::new(self.config.clone())?.size(ratings.n_items(), ratings.scale())?;
        let report = model.fit(&train, &validation)?;
        info!(
            epochs = report.epochs_run,
            best_epoch = report.best_epoch,
            rmse = report.final_rmse,
            "fit complete"
        );

        self.trainset = Some(trainset);
        self.model = Some(model);
        self.ratings = Some(ratings);
        self.report = Some(report);
        Ok(())
    }

    fn estimate(&self, uid: &str, iid: &str) -> RbmResult<f32> {
        let (Some(trainset), Some(ratings), Some(model)) =
            (&self.trainset, &self.ratings, &self.model)
        else {
            return Err(RbmError::ModelNotTrained.into());
        };

        let unknown = || RbmError::prediction_impossible("User and/or item is unknown.");
        if !(trainset.knows_user(uid) && trainset.knows_item(iid)) {
            return Err(unknown().into());
        }
        let (user, item) = trainset
            .to_inner_uid(uid)
            .zip(trainset.to_inner_iid(iid))
            .ok_or_else(unknown)?;

        let reconstruction = model.reconstruct(ratings.user(user))?;
        Ok(model.decoder().decode(reconstruction.row(item)))
    }

    fn trainset(&self) -> Option<&Trainset> {
        self.trainset.as_ref()
    }

    fn verbose(&self) -> bool {
        self.config.verbose
    }
}
