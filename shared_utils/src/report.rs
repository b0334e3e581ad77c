//! Report Module
//!
//! Summary table printed once after every media kind has been processed.

use crate::batch::BatchResult;
use crate::progress::{format_bytes, format_duration};
use std::time::Duration;

pub fn size_reduction_percent(input_bytes: u64, output_bytes: u64) -> f64 {
    if input_bytes > 0 {
        (1.0 - output_bytes as f64 / input_bytes as f64) * 100.0
    } else {
        0.0
    }
}

pub fn print_summary_report(
    result: &BatchResult,
    duration: Duration,
    input_bytes: u64,
    output_bytes: u64,
    operation_name: &str,
) {
    let reduction = size_reduction_percent(input_bytes, output_bytes);

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║  📊 {:<56} ║", format!("{} Summary Report", operation_name));
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  📁 Files Processed:    {:>10}                           ║", result.total);
    println!("║  ✅ Succeeded:          {:>10}                           ║", result.succeeded);
    println!("║  ❌ Failed:             {:>10}                           ║", result.failed);
    println!("║  ⏭️  Skipped:            {:>10}                           ║", result.skipped);
    println!("║  📈 Success Rate:       {:>9.1}%                           ║", result.success_rate());
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  💾 Input Size:         {:>10}                           ║", format_bytes(input_bytes));
    println!("║  💾 Output Size:        {:>10}                           ║", format_bytes(output_bytes));
    println!("║  📉 Size Reduction:     {:>9.1}%                           ║", reduction);
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  ⏱️  Total Time:         {:>10}                           ║", format_duration(duration));
    if result.total > 0 {
        let avg_time = duration.as_secs_f64() / result.total as f64;
        println!("║  ⏱️  Avg Time/File:      {:>9.2}s                           ║", avg_time);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");

    if !result.errors.is_empty() {
        println!();
        println!("❌ Errors encountered:");
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        for (path, error) in &result.errors {
            println!("   {} → {}", path.display(), error);
        }
    }
}
