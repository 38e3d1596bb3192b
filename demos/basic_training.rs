//! Basic RBM training example.
//!
//! Builds a small synthetic ratings set with two taste groups, fits an
//! `RbmAlgorithm` on most of it and scores the held-out ratings.
//!
//! # Running
//!
//! ```bash
//! RUST_LOG=info cargo run --example basic_training
//! ```

use rbm_recommender_rs::prelude::*;
use tracing_subscriber::EnvFilter;

/// Users 0..20 like items 0..10, users 20..40 like items 10..20.
fn synthetic_ratings() -> Vec<(String, String, f32)> {
    let mut ratings = Vec::new();
    for user in 0..40usize {
        let likes_first_half = user < 20;
        for item in 0..20usize {
            if (user * 7 + item * 3) % 4 == 0 {
                continue;
            }
            let liked = (item < 10) == likes_first_half;
            let rating = if liked {
                4.0 + ((user + item) % 2) as f32
            } else {
                1.0 + ((user + item) % 2) as f32
            };
            ratings.push((format!("user{user}"), format!("item{item}"), rating));
        }
    }
    ratings
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    println!("=== RBM Rating Prediction Example ===\n");

    let all = synthetic_ratings();
    let (train, held_out): (Vec<_>, Vec<_>) = all
        .into_iter()
        .enumerate()
        .partition(|(idx, _)| idx % 10 != 0);
    let train: Vec<_> = train.into_iter().map(|(_, r)| r).collect();
    let held_out: Vec<_> = held_out.into_iter().map(|(_, r)| r).collect();

    let scale = RatingScale::integer(1, 5).map_err(|(e, _)| e)?;
    let trainset = Trainset::from_ratings(scale, train);
    println!(
        "Trainset: {} users, {} items, {} ratings (mean {:.2})",
        trainset.n_users(),
        trainset.n_items(),
        trainset.n_ratings(),
        trainset.global_mean()
    );

    let config = RbmConfig::builder()
        .n_hidden(16)
        .learning_rate(0.05)
        .momentum(0.5)
        .batch_size(4)
        .max_epoch(40)
        .early_stopping(true)
        .patience(5)
        .verbose(true)
        .build()
        .map_err(|(e, _)| e)?;

    let mut algo = RbmAlgorithm::new(config).map_err(|(e, _)| e)?;
    algo.fit(trainset).map_err(|(e, _)| e)?;

    if let Some(report) = algo.report() {
        println!(
            "\nTrained {} epochs, best epoch {} (validation RMSE {:.4}), stopped early: {}",
            report.epochs_run, report.best_epoch, report.best_rmse, report.stopped_early
        );
    }

    let predictions = algo.test(&held_out).map_err(|(e, _)| e)?;
    println!("\nSample predictions:");
    for prediction in predictions.iter().take(5) {
        println!("  {prediction}");
    }

    println!(
        "\nHeld-out RMSE: {:.4}  MAE: {:.4}",
        rmse(&predictions).unwrap_or(f32::NAN),
        mae(&predictions).unwrap_or(f32::NAN)
    );

    Ok(())
}
