//! Configuration examples.
//!
//! Demonstrates the builder, validation failures and JSON round-trips of
//! `RbmConfig`.

use rbm_recommender_rs::{OutOfRangePolicy, RbmConfig, RbmError};

fn main() -> Result<(), RbmError> {
    println!("=== RBM Configuration Examples ===\n");

    // Default configuration
    println!("1. Default configuration:");
    print_config(&RbmConfig::default());

    // Mini-batch training with regularization
    println!("\n2. Regularized mini-batch configuration:");
    let regularized = RbmConfig::builder()
        .n_hidden(200)
        .learning_rate(0.01)
        .l1(0.001)
        .l2(0.001)
        .momentum(0.9)
        .batch_size(100)
        .build()
        .map_err(|(e, _)| e)?;
    print_config(&regularized);

    // Early stopping with a minimum improvement
    println!("\n3. Early stopping configuration:");
    let early = RbmConfig::builder()
        .max_epoch(100)
        .early_stopping(true)
        .patience(3)
        .min_improvement(0.001)
        .use_softmax(false)
        .out_of_range(OutOfRangePolicy::Clamp)
        .build()
        .map_err(|(e, _)| e)?;
    print_config(&early);

    // Invalid values are rejected at build time
    println!("\n4. Validation:");
    match RbmConfig::builder().momentum(1.5).build() {
        Ok(_) => println!("  unexpectedly accepted"),
        Err((err, action)) => println!("  rejected: {err} (recovery: {action:?})"),
    }

    // JSON round-trip; missing fields take their defaults
    println!("\n5. JSON:");
    let json = early.to_json().map_err(|(e, _)| e)?;
    println!("{json}");
    let parsed = RbmConfig::from_json(r#"{"n_hidden": 64, "seed": 7}"#).map_err(|(e, _)| e)?;
    println!("  parsed n_hidden={} seed={} max_epoch={}", parsed.n_hidden, parsed.seed, parsed.max_epoch);

    Ok(())
}

fn print_config(config: &RbmConfig) {
    println!("  n_hidden: {}", config.n_hidden);
    println!("  learning_rate: {}", config.learning_rate);
    println!("  l1 / l2: {} / {}", config.l1, config.l2);
    println!("  momentum: {}", config.momentum);
    println!("  batch_size: {}", config.batch_size);
    println!(
        "  early_stopping: {} (patience {})",
        config.early_stopping, config.patience
    );
    println!("  max_epoch: {}", config.max_epoch);
    println!("  decoder: {:?}", config.decode_policy());
}
