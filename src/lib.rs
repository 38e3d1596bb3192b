//! # rbm-recommender-rs
//!
//! Collaborative-filtering rating prediction with a Restricted Boltzmann
//! Machine whose visible units are softmax blocks, one block of rating levels
//! per item.
//!
//! ## Overview
//!
//! Every user is encoded as a one-hot `[items, levels]` slice of a dense rating
//! tensor. An RBM is trained on those slices with one-step contrastive
//! divergence; to estimate a rating the user's slice is pushed up to the hidden
//! layer and back down, and the reconstructed distribution over the item's
//! levels is decoded into a scalar rating.
//!
//! ```text
//!   Trainset ──▶ RatingTensor ──split(seed)──▶ train / validation
//!                     │                              │
//!                     │                              ▼
//!                     │                     Rbm::fit (CD-1, early stopping)
//!                     │                              │
//!                     ▼                              ▼
//!   estimate(u, i): user row ──▶ Rbm::reconstruct ──▶ RatingDecoder ──▶ r̂
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use rbm_recommender_rs::{RatingScale, RbmAlgorithm, RbmConfig, Recommender, Trainset};
//!
//! let scale = RatingScale::integer(1, 5)?;
//! let trainset = Trainset::from_ratings(
//!     scale,
//!     vec![("alice", "heat", 4.0), ("alice", "alien", 2.0), ("bob", "heat", 5.0)],
//! );
//!
//! let config = RbmConfig::builder().n_hidden(20).max_epoch(10).build()?;
//! let mut algo = RbmAlgorithm::new(config)?;
//! algo.fit(trainset)?;
//!
//! let prediction = algo.predict("bob", "alien", None, true)?;
//! println!("{prediction}");
//! # Ok::<(), (rbm_recommender_rs::RbmError, Option<rbm_recommender_rs::RecoveryAction>)>(())
//! ```
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`trainset`] - Rating scale and the sparse ratings an algorithm is fit on
//! - [`tensor`] - One-hot rating tensor and the seeded user split
//! - [`sampling`] - Seeded Bernoulli and categorical sampling for CD-1
//! - [`rbm`] - The model, its two-phase construction and the training loop
//! - [`decoder`] - Reconstructed distribution to scalar rating
//! - [`algorithm`] - The recommender contract and the RBM estimator
//! - [`config`] - Training configuration and serialization
//! - [`error`] - Error types with recovery actions
//! - [`metrics`] - Training metrics collection and accuracy helpers
//!
//! ## Logging
//!
//! Progress is reported through [`tracing`]. Per-epoch lines are emitted at
//! `info` level when `verbose` is set and at `debug` level otherwise; install
//! any subscriber (for example `tracing-subscriber`) to see them.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// Data
pub mod tensor;
pub mod trainset;

// Model
pub mod decoder;
pub mod rbm;
pub mod sampling;

// Recommender surface
pub mod algorithm;

// Ambient
pub mod config;
pub mod error;
pub mod metrics;

// Re-exports for convenient access
pub use algorithm::{Prediction, PredictionDetails, RbmAlgorithm, Recommender};
pub use config::{OutOfRangePolicy, RbmConfig, RbmConfigBuilder};
pub use decoder::{DecodePolicy, RatingDecoder};
pub use error::{RbmError, RbmResult, RecoveryAction};
pub use metrics::{EpochMetrics, MetricsCollector, TrainingReport};
pub use rbm::{Rbm, RbmBuilder, RbmParameters};
pub use tensor::RatingTensor;
pub use trainset::{RatingScale, Trainset};

/// Prelude for glob imports.
pub mod prelude {
    pub use crate::algorithm::{Prediction, RbmAlgorithm, Recommender};
    pub use crate::config::RbmConfig;
    pub use crate::error::{RbmError, RbmResult};
    pub use crate::metrics::{mae, rmse};
    pub use crate::trainset::{RatingScale, Trainset};
}
