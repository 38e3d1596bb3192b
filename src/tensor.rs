//! Dense one-hot rating tensors.
//!
//! The RBM consumes every user as a fixed-width visible vector: for each item a
//! block of `K` slots, one per rating level, with a single `1` at the observed
//! level and zeros everywhere else (including items the user never rated).
//!
//! ```text
//!            item 0        item 1        item 2
//! user 0   [0 0 0 1 0]   [0 0 0 0 0]   [1 0 0 0 0]
//! user 1   [0 0 0 0 0]   [0 1 0 0 0]   [0 0 0 0 1]
//! ```
//!
//! A [`RatingTensor`] is built once per fit from the trainset and is not
//! mutated afterwards.

use std::ops::Range;

use ndarray::{Array1, Array2, Array3, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::config::OutOfRangePolicy;
use crate::error::{RbmError, RbmResult};
use crate::trainset::{RatingScale, Trainset};

/// `[n_users, n_items, n_levels]` binary tensor of observed rating levels.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingTensor {
    data: Array3<f32>,
    scale: RatingScale,
}

impl RatingTensor {
    /// Tensorizes every rating of `trainset`.
    ///
    /// # Errors
    ///
    /// - `EmptyTrainset` if the trainset has no users or no items.
    /// - `RatingOutOfRange` for a rating outside the scale, and
    ///   `RatingOffLevel` for one between two levels, under
    ///   [`OutOfRangePolicy::Reject`].
    pub fn from_trainset(trainset: &Trainset, policy: OutOfRangePolicy) -> RbmResult<Self> {
        let (n_users, n_items) = (trainset.n_users(), trainset.n_items());
        if n_users == 0 || n_items == 0 {
            return Err(RbmError::EmptyTrainset {
                users: n_users,
                items: n_items,
            }
            .into());
        }

        let scale = trainset.rating_scale();
        let mut data = Array3::zeros((n_users, n_items, scale.n_levels()));

        for (u, i, rating) in trainset.all_ratings() {
            let level = match (scale.level_of(rating), policy) {
                (Some(level), _) => level,
                (None, OutOfRangePolicy::Clamp) if !rating.is_nan() => scale.nearest_level(rating),
                (None, _) if scale.is_off_level(rating) => {
                    return Err(RbmError::RatingOffLevel {
                        rating,
                        step: scale.step,
                    }
                    .into())
                }
                (None, _) => {
                    return Err(RbmError::RatingOutOfRange {
                        rating,
                        min: scale.min,
                        max: scale.max,
                    }
                    .into())
                }
            };

            let mut slot = data.slice_mut(ndarray::s![u, i, ..]);
            slot.fill(0.0);
            slot[level] = 1.0;
        }

        Ok(Self { data, scale })
    }

    /// Wraps an existing array; every `(user, item)` slice must be empty or one-hot.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` if the level axis does not match the scale, or if a
    /// slice holds anything but a single `1`.
    pub fn from_array(data: Array3<f32>, scale: RatingScale) -> RbmResult<Self> {
        let levels = data.len_of(Axis(2));
        if levels != scale.n_levels() {
            return Err(RbmError::shape_mismatch(
                format!("{} rating levels", scale.n_levels()),
                format!("{levels} rating levels"),
            )
            .into());
        }

        for user in data.outer_iter() {
            for (i, slot) in user.outer_iter().enumerate() {
                let ones = slot.iter().filter(|&&v| v == 1.0).count();
                let zeros = slot.iter().filter(|&&v| v == 0.0).count();
                if zeros + ones != levels || ones > 1 {
                    return Err(RbmError::shape_mismatch(
                        "one-hot rating slices",
                        format!("item {i} slice {slot}"),
                    )
                    .into());
                }
            }
        }

        Ok(Self { data, scale })
    }

    /// Number of users (first axis).
    pub fn n_users(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    /// Number of items (second axis).
    pub fn n_items(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    /// Number of rating levels (third axis).
    pub fn n_levels(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    /// Flattened width of one user row, `n_items * n_levels`.
    pub fn row_width(&self) -> usize {
        self.n_items() * self.n_levels()
    }

    /// The rating scale the levels refer to.
    pub fn scale(&self) -> RatingScale {
        self.scale
    }

    /// The underlying array.
    pub fn as_array(&self) -> &Array3<f32> {
        &self.data
    }

    /// `[n_items, n_levels]` slice of one user.
    pub fn user(&self, user: usize) -> ArrayView2<'_, f32> {
        self.data.index_axis(Axis(0), user)
    }

    /// Observed rating of `(user, item)`, if any.
    pub fn rating(&self, user: usize, item: usize) -> Option<f32> {
        let slot = self.data.slice(ndarray::s![user, item, ..]);
        slot.iter()
            .position(|&v| v > 0.0)
            .map(|level| self.scale.value_of(level))
    }

    /// Number of observed ratings.
    pub fn n_ratings(&self) -> usize {
        self.data.iter().filter(|&&v| v > 0.0).count()
    }

    /// Flattens users `range` into a `[range.len(), n_items * n_levels]` batch.
    pub fn batch(&self, range: Range<usize>) -> Array2<f32> {
        let width = self.row_width();
        let levels = self.n_levels();
        let start = range.start;
        Array2::from_shape_fn((range.len(), width), |(row, col)| {
            self.data[[start + row, col / levels, col % levels]]
        })
    }

    /// Flattens a single `[n_items, n_levels]` slice into a visible vector.
    pub fn flatten_row(row: ArrayView2<'_, f32>) -> Array1<f32> {
        row.iter().copied().collect()
    }

    /// Splits users into a training and a validation tensor.
    ///
    /// Users are shuffled with a generator seeded from `seed`, then
    /// `ceil((1 - train_ratio) * n_users)` of them go to validation. At least
    /// one user always stays in training; with `train_ratio == 1.0` the
    /// validation tensor is empty.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `train_ratio` is not in `(0, 1]`.
    pub fn split(&self, train_ratio: f64, seed: u64) -> RbmResult<(Self, Self)> {
        if !(train_ratio > 0.0 && train_ratio <= 1.0) {
            return Err(RbmError::invalid_config(format!(
                "split ratio must be in (0, 1], got {train_ratio}"
            ))
            .into());
        }

        let n = self.n_users();
        let n_validation =
            (((1.0 - train_ratio) * n as f64).ceil() as usize).min(n.saturating_sub(1));

        let mut users: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        users.shuffle(&mut rng);

        let (validation, train) = users.split_at(n_validation);
        Ok((self.select_users(train), self.select_users(validation)))
    }

    fn select_users(&self, users: &[usize]) -> Self {
        Self {
            data: self.data.select(Axis(0), users),
            scale: self.scale,
        }
    }
}
