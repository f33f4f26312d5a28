use std::collections::HashMap;
use std::fmt::{Display, Formatter, Write};
use std::time::{Duration, Instant};

use console::Style;

const ANSI_GREEN: Style = Style::new().green();
const ANSI_RED: Style = Style::new().red();
const ANSI_YELLOW: Style = Style::new().yellow();

#[derive(Debug, Clone)]
pub struct TaskExecution {
    pub start: Instant,
    pub duration: Duration,
}

/// Outcome of a single [`super::LocalScheduler::run`].
#[derive(Debug, Default)]
pub struct Diagnostics {
    /// Timings of every task that was started, including failed ones.
    pub execution_times: HashMap<String, TaskExecution>,
    /// Failed tasks with their rendered error chain.
    pub failed: Vec<(String, String)>,
    /// Tasks never started because a prerequisite failed.
    pub skipped: Vec<String>,
}

impl Diagnostics {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn ran(&self, task: &str) -> bool {
        self.execution_times.contains_key(task)
    }

    /// Tasks ordered by their start time.
    pub fn timeline(&self) -> Vec<(&str, &TaskExecution)> {
        let mut tasks: Vec<_> = self
            .execution_times
            .iter()
            .map(|(name, exec)| (name.as_str(), exec))
            .collect();
        tasks.sort_by_key(|(_, exec)| exec.start);
        tasks
    }

    /// The `n` longest running tasks, longest first.
    pub fn slowest(&self, n: usize) -> Vec<(&str, Duration)> {
        let mut tasks: Vec<_> = self
            .execution_times
            .iter()
            .map(|(name, exec)| (name.as_str(), exec.duration))
            .collect();
        tasks.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        tasks.truncate(n);
        tasks
    }

    pub fn render_failures(&self) -> String {
        let mut f = String::new();

        for (task, error) in &self.failed {
            let _ = writeln!(f, "{} {}", ANSI_RED.apply_to("✗"), task);
            for line in error.lines() {
                let _ = writeln!(f, "    {line}");
            }
        }

        if !self.skipped.is_empty() {
            let _ = writeln!(f, "skipped: {}", self.skipped.join(", "));
        }

        f
    }
}

impl Display for Diagnostics {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let ran = self.execution_times.len().saturating_sub(self.failed.len());

        write!(
            f,
            "{} succeeded, {} failed, {} skipped",
            ANSI_GREEN.apply_to(ran),
            ANSI_RED.apply_to(self.failed.len()),
            ANSI_YELLOW.apply_to(self.skipped.len()),
        )?;

        for (name, duration) in self.slowest(3) {
            write!(f, "\n  {name} {duration:.2?}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exec(start: Instant, offset: u64, millis: u64) -> TaskExecution {
        TaskExecution {
            start: start + Duration::from_millis(offset),
            duration: Duration::from_millis(millis),
        }
    }

    #[test]
    fn test_timeline_and_slowest() {
        let now = Instant::now();
        let diagnostics = Diagnostics {
            execution_times: HashMap::from([
                ("app:styles".to_string(), exec(now, 5, 40)),
                ("app:preBuild".to_string(), exec(now, 50, 0)),
                ("app:templates".to_string(), exec(now, 0, 10)),
            ]),
            ..Default::default()
        };

        let order: Vec<_> = diagnostics.timeline().into_iter().map(|(name, _)| name).collect();
        assert_eq!(order, ["app:templates", "app:styles", "app:preBuild"]);

        let slowest: Vec<_> = diagnostics.slowest(2).into_iter().map(|(name, _)| name).collect();
        assert_eq!(slowest, ["app:styles", "app:templates"]);
    }

    #[test]
    fn test_render_failures() {
        let diagnostics = Diagnostics {
            failed: vec![("app:styles".to_string(), "line one\nline two".to_string())],
            skipped: vec!["app:preBuild".to_string(), "app:build".to_string()],
            ..Default::default()
        };

        let text = diagnostics.render_failures();
        assert!(text.contains("app:styles\n    line one\n    line two\n"));
        assert!(text.ends_with("skipped: app:preBuild, app:build\n"));
        assert!(!diagnostics.is_success());
    }
}
