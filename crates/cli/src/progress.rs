use console::style;
use elif_migrate::{Direction, Progress, StepOutcome};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress bar over a migration batch
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }
}

impl Progress for BarProgress {
    fn begin(&self, direction: Direction, total: usize) {
        if total == 0 {
            return;
        }
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        if let Ok(bar_style) = ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix:.bold} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
        {
            self.bar.set_style(bar_style.progress_chars("=> "));
        }
        self.bar.set_prefix(match direction {
            Direction::Up => "Migrating",
            Direction::Down => "Rolling back",
        });
        self.bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        self.bar.enable_steady_tick(Duration::from_millis(120));
    }

    fn step(&self, id: &str, outcome: &StepOutcome) {
        let line = match outcome {
            StepOutcome::Completed { .. } => format!("{} {}", style("✓").green(), id),
            StepOutcome::Skipped => format!("{} {} (empty script)", style("-").yellow(), id),
        };
        self.bar.println(line);
        self.bar.set_message(id.to_string());
        self.bar.inc(1);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
