//! Display of planned changes

use colored::Colorize;
use guestconf::{ConfigDiff, GuestRef};

use crate::ui;

/// Print a guest's planned changes under a header line.
pub fn display_plan(guest: &GuestRef, diff: &ConfigDiff) {
    println!();
    println!("{} {}", "┌─".dimmed(), guest.to_string().bold());
    display_diff(diff);
}

/// Print what an update will change.
pub fn display_diff(diff: &ConfigDiff) {
    if diff.is_empty() {
        println!("  {} No changes needed", "✓".green());
        return;
    }

    for (key, requested) in diff.changed.iter() {
        match diff.previous.get(key) {
            Some(previous) => {
                println!("  {} {}", "~".yellow(), key.bold());
                println!("      {} {}", "-".red(), ui::render_value(key, previous).dimmed());
                println!("      {} {}", "+".green(), ui::render_value(key, requested));
            }
            None => println!("  {} {} = {}", "+".green(), key.bold(), ui::render_value(key, requested)),
        }
    }
    for key in &diff.deleted {
        println!("  {} {}", "-".red(), key.bold());
    }

    let summary = diff.summary();
    println!();
    summary_line(summary.additions, summary.modifications, summary.removals);
}

fn summary_line(additions: usize, modifications: usize, removals: usize) {
    let mut parts = Vec::new();
    if additions > 0 {
        parts.push(format!("{additions} to add").green().to_string());
    }
    if modifications > 0 {
        parts.push(format!("{modifications} to change").yellow().to_string());
    }
    if removals > 0 {
        parts.push(format!("{removals} to delete").red().to_string());
    }
    ui::dim(&parts.join(", "));
}
