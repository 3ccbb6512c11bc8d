//! Update observers for the terminal.

use colored::Colorize;
use guestconf::{GuestRef, UpdateObserver, UpdatePhase, UpdateWarning};
use indicatif::{ProgressBar, ProgressStyle};

/// Prints phase transitions at `-v` and warnings always (unless quiet).
pub struct TerminalObserver {
    pub verbose: bool,
    pub quiet: bool,
}

impl UpdateObserver for TerminalObserver {
    fn on_phase(&self, guest: &GuestRef, phase: UpdatePhase) {
        log::debug!("{guest}: {phase}");
        if self.verbose && !self.quiet {
            println!("  {} {guest}: {phase}", "→".cyan());
        }
    }

    fn on_warning(&self, guest: &GuestRef, warning: &UpdateWarning) {
        // Reports print warnings after the fact; only unguarded writes are
        // announced before they happen.
        if matches!(warning, UpdateWarning::Unguarded { .. }) && !self.quiet {
            println!("  {} {guest}: {warning}", "⚠".yellow());
        }
    }
}

/// Advances a progress bar once per guest update that reaches a terminal phase.
pub struct BatchProgress {
    bar: ProgressBar,
}

impl BatchProgress {
    pub fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("  {spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("━╸─"),
        );
        Self { bar }
    }

    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    pub fn bar(&self) -> ProgressBar {
        self.bar.clone()
    }
}

impl UpdateObserver for BatchProgress {
    fn on_phase(&self, guest: &GuestRef, phase: UpdatePhase) {
        log::debug!("{guest}: {phase}");
        if phase.is_terminal() {
            let symbol = match phase {
                UpdatePhase::NoOp => "○",
                UpdatePhase::Verified => "✓",
                _ => "✗",
            };
            self.bar.set_message(format!("{symbol} {guest}"));
            self.bar.inc(1);
        }
    }

    fn on_warning(&self, guest: &GuestRef, warning: &UpdateWarning) {
        log::warn!("{guest}: {warning}");
    }
}
