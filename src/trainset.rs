//! Sparse rating data and the rating scale it lives on.
//!
//! A [`Trainset`] maps raw (string) user and item ids to dense inner ids and
//! stores every observed `(user, item, rating)` triple. It is built once and
//! never mutated afterwards; the recommender keeps it to answer
//! `knows_user` / `knows_item` queries and to compute the default prediction.
//!
//! The [`RatingScale`] is the discretization table shared by the tensorizer and
//! the decoder: level `k` stands for the rating `min + k * step`.

use std::collections::HashMap;
use std::io::BufRead;

use serde::{Deserialize, Serialize};

use crate::error::{RbmError, RbmResult};

/// Tolerance used when comparing ratings against grid points and bounds.
const SCALE_EPSILON: f32 = 1e-4;

/// Discrete rating scale, e.g. `1..=5` in steps of `1` or `0.5..=5.0` in steps of `0.5`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingScale {
    /// Lowest rating.
    pub min: f32,
    /// Highest rating.
    pub max: f32,
    /// Distance between two adjacent levels.
    pub step: f32,
}

impl RatingScale {
    /// Creates a validated rating scale.
    ///
    /// # Errors
    ///
    /// Fails if a bound is not finite, `step` is not positive, `max < min`, or
    /// `(max - min) / step` is not a whole number of steps.
    pub fn new(min: f32, max: f32, step: f32) -> RbmResult<Self> {
        let invalid = |detail: String| -> RbmResult<Self> {
            Err(RbmError::InvalidRatingScale { detail }.into())
        };

        if !(min.is_finite() && max.is_finite() && step.is_finite()) {
            return invalid(format!("bounds must be finite (min={min}, max={max}, step={step})"));
        }
        if step <= 0.0 {
            return invalid(format!("step must be positive, got {step}"));
        }
        if max < min {
            return invalid(format!("max ({max}) is below min ({min})"));
        }
        let span = (max - min) / step;
        if (span - span.round()).abs() > SCALE_EPSILON {
            return invalid(format!(
                "range [{min}, {max}] is not a whole number of {step} steps"
            ));
        }

        Ok(Self { min, max, step })
    }

    /// Integer scale `min..=max` with unit steps.
    pub fn integer(min: i32, max: i32) -> RbmResult<Self> {
        Self::new(min as f32, max as f32, 1.0)
    }

    /// Number of discrete levels.
    pub fn n_levels(&self) -> usize {
        ((self.max - self.min) / self.step).round() as usize + 1
    }

    /// Rating value of level `k`.
    pub fn value_of(&self, level: usize) -> f32 {
        self.min + level as f32 * self.step
    }

    /// Level index of `rating`.
    ///
    /// Returns `None` unless `rating` lies inside `[min, max]` and on a level
    /// (within `1e-4`), so `value_of(level_of(r)?) == r` for every accepted `r`.
    pub fn level_of(&self, rating: f32) -> Option<usize> {
        if !self.contains(rating) {
            return None;
        }
        let level = self.nearest_level(rating);
        ((rating - self.value_of(level)).abs() <= SCALE_EPSILON).then_some(level)
    }

    /// Level closest to `rating` after clamping it into the scale.
    ///
    /// NaN maps to level `0`.
    pub fn nearest_level(&self, rating: f32) -> usize {
        let clamped = if rating.is_nan() {
            self.min
        } else {
            self.clamp(rating)
        };
        let level = ((clamped - self.min) / self.step).round() as usize;
        level.min(self.n_levels() - 1)
    }

    /// Whether `rating` is inside the bounds but between two levels.
    pub fn is_off_level(&self, rating: f32) -> bool {
        self.contains(rating) && self.level_of(rating).is_none()
    }

    /// Whether `rating` lies inside the scale bounds.
    pub fn contains(&self, rating: f32) -> bool {
        rating.is_finite()
            && rating >= self.min - SCALE_EPSILON
            && rating <= self.max + SCALE_EPSILON
    }

    /// Clamps `rating` into `[min, max]`.
    pub fn clamp(&self, rating: f32) -> f32 {
        rating.clamp(self.min, self.max)
    }

    /// Middle of the scale.
    pub fn midpoint(&self) -> f32 {
        (self.min + self.max) / 2.0
    }
}

impl Default for RatingScale {
    fn default() -> Self {
        Self {
            min: 1.0,
            max: 5.0,
            step: 1.0,
        }
    }
}

/// Sparse user-item ratings with raw/inner id mappings.
#[derive(Debug, Clone)]
pub struct Trainset {
    ratings: Vec<(usize, usize, f32)>,
    raw2inner_user: HashMap<String, usize>,
    raw2inner_item: HashMap<String, usize>,
    inner2raw_user: Vec<String>,
    inner2raw_item: Vec<String>,
    rating_scale: RatingScale,
    global_mean: f32,
}

impl Trainset {
    /// Builds a trainset from raw `(user, item, rating)` triples.
    ///
    /// Inner ids are assigned in order of first appearance. A repeated
    /// `(user, item)` pair keeps its last rating. Ratings are stored as given;
    /// range checks happen at tensorization time.
    pub fn from_ratings<U, I>(
        rating_scale: RatingScale,
        ratings: impl IntoIterator<Item = (U, I, f32)>,
    ) -> Self
    where
        U: Into<String>,
        I: Into<String>,
    {
        let mut raw2inner_user = HashMap::new();
        let mut raw2inner_item = HashMap::new();
        let mut inner2raw_user = Vec::new();
        let mut inner2raw_item = Vec::new();
        let mut triples: Vec<(usize, usize, f32)> = Vec::new();
        let mut positions: HashMap<(usize, usize), usize> = HashMap::new();

        for (user, item, rating) in ratings {
            let user = user.into();
            let item = item.into();
            let uid = *raw2inner_user.entry(user.clone()).or_insert_with(|| {
                inner2raw_user.push(user);
                inner2raw_user.len() - 1
            });
            let iid = *raw2inner_item.entry(item.clone()).or_insert_with(|| {
                inner2raw_item.push(item);
                inner2raw_item.len() - 1
            });
            match positions.get(&(uid, iid)) {
                Some(&pos) => triples[pos].2 = rating,
                None => {
                    positions.insert((uid, iid), triples.len());
                    triples.push((uid, iid, rating));
                }
            }
        }

        let global_mean = if triples.is_empty() {
            rating_scale.midpoint()
        } else {
            triples.iter().map(|&(_, _, r)| r).sum::<f32>() / triples.len() as f32
        };

        Self {
            ratings: triples,
            raw2inner_user,
            raw2inner_item,
            inner2raw_user,
            inner2raw_item,
            rating_scale,
            global_mean,
        }
    }

    /// Reads `user<sep>item<sep>rating[<sep>...]` lines.
    ///
    /// Empty lines and lines starting with `#` are skipped; extra trailing
    /// fields (timestamps) are ignored.
    ///
    /// # Errors
    ///
    /// Returns `Io` if reading fails and `Parse` for a malformed line.
    pub fn from_reader(
        reader: impl BufRead,
        separator: char,
        rating_scale: RatingScale,
    ) -> RbmResult<Self> {
        let mut triples = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(RbmError::from)?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let mut fields = trimmed.split(separator).map(str::trim);
            let (Some(user), Some(item), Some(rating)) = (fields.next(), fields.next(), fields.next())
            else {
                return Err(RbmError::Parse {
                    line: idx + 1,
                    detail: format!("expected at least 3 fields separated by {separator:?}"),
                }
                .into());
            };
            let rating = rating.parse::<f32>().map_err(|e| RbmError::Parse {
                line: idx + 1,
                detail: format!("invalid rating {rating:?}: {e}"),
            })?;

            triples.push((user.to_string(), item.to_string(), rating));
        }

        Ok(Self::from_ratings(rating_scale, triples))
    }

    /// Number of distinct users.
    pub fn n_users(&self) -> usize {
        self.inner2raw_user.len()
    }

    /// Number of distinct items.
    pub fn n_items(&self) -> usize {
        self.inner2raw_item.len()
    }

    /// Number of stored ratings.
    pub fn n_ratings(&self) -> usize {
        self.ratings.len()
    }

    /// Mean of all ratings (scale midpoint when empty).
    pub fn global_mean(&self) -> f32 {
        self.global_mean
    }

    /// The rating scale of this trainset.
    pub fn rating_scale(&self) -> RatingScale {
        self.rating_scale
    }

    /// Whether the raw user id is part of the trainset.
    pub fn knows_user(&self, raw_uid: &str) -> bool {
        self.raw2inner_user.contains_key(raw_uid)
    }

    /// Whether the raw item id is part of the trainset.
    pub fn knows_item(&self, raw_iid: &str) -> bool {
        self.raw2inner_item.contains_key(raw_iid)
    }

    /// Inner id of a raw user id.
    pub fn to_inner_uid(&self, raw_uid: &str) -> Option<usize> {
        self.raw2inner_user.get(raw_uid).copied()
    }

    /// Inner id of a raw item id.
    pub fn to_inner_iid(&self, raw_iid: &str) -> Option<usize> {
        self.raw2inner_item.get(raw_iid).copied()
    }

    /// Raw id of an inner user id.
    pub fn to_raw_uid(&self, inner_uid: usize) -> Option<&str> {
        self.inner2raw_user.get(inner_uid).map(String::as_str)
    }

    /// Raw id of an inner item id.
    pub fn to_raw_iid(&self, inner_iid: usize) -> Option<&str> {
        self.inner2raw_item.get(inner_iid).map(String::as_str)
    }

    /// Iterates over all `(inner_user, inner_item, rating)` triples.
    pub fn all_ratings(&self) -> impl Iterator<Item = (usize, usize, f32)> + '_ {
        self.ratings.iter().copied()
    }

    /// All ratings as raw-id triples, suitable for [`crate::Recommender::test`].
    pub fn build_testset(&self) -> Vec<(String, String, f32)> {
        self.ratings
            .iter()
            .map(|&(u, i, r)| {
                (
                    self.inner2raw_user[u].clone(),
                    self.inner2raw_item[i].clone(),
                    r,
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_levels() {
        let stars = RatingScale::integer(1, 5).unwrap();
        assert_eq!(stars.n_levels(), 5);
        assert_eq!(stars.value_of(0), 1.0);
        assert_eq!(stars.value_of(4), 5.0);

        let half_stars = RatingScale::new(0.5, 5.0, 0.5).unwrap();
        assert_eq!(half_stars.n_levels(), 10);
        assert_eq!(half_stars.level_of(3.5), Some(6));
        assert!((half_stars.value_of(6) - 3.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_scale_out_of_range() {
        let stars = RatingScale::integer(1, 5).unwrap();
        assert_eq!(stars.level_of(0.0), None);
        assert_eq!(stars.level_of(5.5), None);
        assert_eq!(stars.level_of(f32::NAN), None);
        assert_eq!(stars.level_of(5.0), Some(4));
        assert_eq!(stars.clamp(7.0), 5.0);
    }

    #[test]
    fn test_off_level_ratings() {
        let stars = RatingScale::integer(1, 5).unwrap();
        assert_eq!(stars.level_of(3.4), None);
        assert_eq!(stars.level_of(2.5), None);
        assert!(stars.is_off_level(3.4));
        assert!(!stars.is_off_level(3.0));
        assert!(!stars.is_off_level(7.0));
        assert_eq!(stars.level_of(3.00001), Some(2));

        assert_eq!(stars.nearest_level(3.4), 2);
        assert_eq!(stars.nearest_level(3.6), 3);
        assert_eq!(stars.nearest_level(9.0), 4);
        assert_eq!(stars.nearest_level(-2.0), 0);

        let half_stars = RatingScale::new(0.5, 5.0, 0.5).unwrap();
        assert_eq!(half_stars.level_of(2.5), Some(4));
        assert_eq!(half_stars.level_of(2.75), None);
    }

    #[test]
    fn test_invalid_scales() {
        assert!(RatingScale::new(1.0, 5.0, 0.0).is_err());
        assert!(RatingScale::new(5.0, 1.0, 1.0).is_err());
        assert!(RatingScale::new(1.0, 5.0, 0.3).is_err());
        assert!(RatingScale::new(f32::NAN, 5.0, 1.0).is_err());
    }

    #[test]
    fn test_id_mapping() {
        let trainset = Trainset::from_ratings(
            RatingScale::default(),
            vec![("1", "10", 4.0), ("2", "10", 2.0), ("1", "20", 3.0)],
        );

        assert_eq!(trainset.n_users(), 2);
        assert_eq!(trainset.n_items(), 2);
        assert_eq!(trainset.n_ratings(), 3);
        assert!(trainset.knows_user("1"));
        assert!(!trainset.knows_user("3"));
        assert!(trainset.knows_item("20"));
        assert!(!trainset.knows_item("99"));
        assert_eq!(trainset.to_inner_uid("2"), Some(1));
        assert_eq!(trainset.to_raw_iid(1), Some("20"));
        assert!((trainset.global_mean() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_repeated_pair_keeps_last_rating() {
        let trainset = Trainset::from_ratings(
            RatingScale::default(),
            vec![("1", "10", 2.0), ("1", "20", 4.0), ("1", "10", 5.0)],
        );

        assert_eq!(trainset.n_ratings(), 2);
        assert!((trainset.global_mean() - 4.5).abs() < 1e-6);
        assert_eq!(
            trainset.build_testset(),
            vec![
                ("1".to_string(), "10".to_string(), 5.0),
                ("1".to_string(), "20".to_string(), 4.0),
            ]
        );
    }

    #[test]
    fn test_from_reader() {
        let data = "# user,item,rating,timestamp\n1,10,5,978300760\n\n2,10,3,978302109\n3,20,4\n";
        let trainset = Trainset::from_reader(data.as_bytes(), ',', RatingScale::default()).unwrap();

        assert_eq!(trainset.n_ratings(), 3);
        assert_eq!(trainset.n_users(), 3);
        assert_eq!(trainset.n_items(), 2);
        assert_eq!(trainset.to_raw_uid(2), Some("3"));
    }

    #[test]
    fn test_from_reader_parse_error() {
        let data = "1,10,5\n2,10\n";
        let (err, _) = Trainset::from_reader(data.as_bytes(), ',', RatingScale::default())
            .unwrap_err();
        assert!(matches!(err, RbmError::Parse { line: 2, .. }));
    }
}
