use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use super::types::StepResultStatus;

/// Visual progress monitor for step execution
///
/// Shows one overall bar for the run plus a spinner per running step. When
/// disabled every call is a no-op.
pub struct ProgressMonitor {
    /// Multi-progress container
    multi: MultiProgress,
    /// Overall progress bar
    overall: ProgressBar,
    /// Per-step spinners
    step_bars: Mutex<HashMap<String, ProgressBar>>,
    /// Whether monitoring is enabled
    enabled: bool,
}

impl ProgressMonitor {
    pub fn new(total_steps: usize, enabled: bool) -> Self {
        if !enabled {
            return Self {
                multi: MultiProgress::new(),
                overall: ProgressBar::hidden(),
                step_bars: Mutex::new(HashMap::new()),
                enabled: false,
            };
        }

        let multi = MultiProgress::new();
        let overall = multi.add(ProgressBar::new(total_steps as u64));

        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} steps ({percent}%) {msg}")
        {
            overall.set_style(style.progress_chars("█▓▒░  "));
        }
        overall.set_message("Starting...");

        Self {
            multi,
            overall,
            step_bars: Mutex::new(HashMap::new()),
            enabled: true,
        }
    }

    fn bars(&self) -> std::sync::MutexGuard<'_, HashMap<String, ProgressBar>> {
        match self.step_bars.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Count steps that will never run (disabled) towards completion.
    pub fn skip(&self, count: usize) {
        if self.enabled && count > 0 {
            self.overall.inc(count as u64);
        }
    }

    pub fn step_started(&self, step_id: &str) {
        if !self.enabled {
            return;
        }

        let bar = self.multi.add(ProgressBar::new_spinner());
        if let Ok(style) = ProgressStyle::default_spinner().template("  {spinner:.green} {msg}") {
            bar.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
        }
        bar.set_message(format!("⏳ {}", step_id));
        bar.enable_steady_tick(Duration::from_millis(100));

        self.bars().insert(step_id.to_string(), bar);
    }

    pub fn step_finished(&self, step_id: &str, status: StepResultStatus, duration_ms: u64) {
        if !self.enabled {
            return;
        }

        if let Some(bar) = self.bars().remove(step_id) {
            let icon = match status {
                StepResultStatus::Success => "✅",
                StepResultStatus::PartialSuccessDueToDependencyFailure => "⚠️",
                _ => "❌",
            };
            bar.finish_with_message(format!("{} {} ({}ms)", icon, step_id, duration_ms));
        }

        self.overall.inc(1);
    }

    pub fn finish(&self, failed_steps: usize) {
        if !self.enabled {
            return;
        }

        let msg = if failed_steps == 0 {
            "✅ All steps completed".to_string()
        } else {
            format!("❌ {} step(s) did not succeed", failed_steps)
        };

        self.overall.finish_with_message(msg);
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        for (_, bar) in self.bars().drain() {
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_monitor_is_inert() {
        let monitor = ProgressMonitor::new(3, false);

        monitor.skip(1);
        monitor.step_started("a");
        monitor.step_finished("a", StepResultStatus::Success, 100);
        monitor.finish(0);
        assert!(monitor.bars().is_empty());
    }

    #[test]
    fn finished_steps_release_their_spinner() {
        let monitor = ProgressMonitor::new(2, true);

        monitor.step_started("a");
        monitor.step_started("b");
        monitor.step_finished("a", StepResultStatus::Success, 100);
        monitor.step_finished("b", StepResultStatus::Failure, 200);

        assert!(monitor.bars().is_empty());
        monitor.finish(1);
    }
}
