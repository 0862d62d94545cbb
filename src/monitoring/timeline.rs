//! Execution Timeline
//!
//! Builds step timings from an execution's step records for
//! reports and Gantt charts.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::workflow::model::{ExecutionStatus, WorkflowExecution};

/// Width of the Gantt chart bar area in characters.
const CHART_WIDTH: f64 = 50.0;

/// Timing of one step record, relative to the execution start.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub step_id: String,
    pub agent_id: String,
    pub status: ExecutionStatus,
    /// Milliseconds from execution start to step start
    pub start_ms: i64,
    /// Milliseconds from execution start to step end; None while running
    pub end_ms: Option<i64>,
}

impl TimelineEntry {
    pub fn duration_ms(&self) -> Option<i64> {
        self.end_ms.map(|end| end - self.start_ms)
    }
}

/// Step timings of one workflow execution.
#[derive(Debug, Clone)]
pub struct ExecutionTimeline {
    entries: Vec<TimelineEntry>,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
}

impl ExecutionTimeline {
    /// Builds a timeline from the step records of an execution, sorted by
    /// start time.
    pub fn from_execution(execution: &WorkflowExecution) -> Self {
        let start = execution.start_time;
        let mut entries: Vec<TimelineEntry> = execution
            .step_executions
            .iter()
            .map(|record| TimelineEntry {
                step_id: record.step_id.clone(),
                agent_id: record.agent_id.clone(),
                status: record.status,
                start_ms: (record.start_time - start).num_milliseconds().max(0),
                end_ms: record
                    .end_time
                    .map(|end| (end - start).num_milliseconds().max(0)),
            })
            .collect();
        entries.sort_by_key(|e| e.start_ms);

        Self {
            entries,
            start_time: start,
            end_time: execution.end_time,
        }
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    /// Total milliseconds covered: the execution duration if finished,
    /// otherwise the latest step end.
    pub fn total_ms(&self) -> i64 {
        match self.end_time {
            Some(end) => (end - self.start_time).num_milliseconds().max(0),
            None => self
                .entries
                .iter()
                .filter_map(|e| e.end_ms)
                .max()
                .unwrap_or(0),
        }
    }

    /// Generates an ASCII Gantt chart.
    ///
    /// Completed steps are drawn with `#`, failed ones with `x`. Steps still
    /// running are omitted.
    pub fn gantt_chart(&self) -> String {
        let mut output = String::from("\nExecution Timeline:\n\n");

        let total_time = self.total_ms();
        if total_time <= 0 && self.entries.is_empty() {
            return output;
        }

        let scale = CHART_WIDTH / total_time.max(1) as f64;

        for entry in &self.entries {
            let Some(end) = entry.end_ms else {
                continue;
            };
            let start_pos = (entry.start_ms as f64 * scale) as usize;
            let width = ((end - entry.start_ms) as f64 * scale).max(1.0) as usize;
            let mark = if entry.status == ExecutionStatus::Failed { "x" } else { "#" };

            let mut bar = " ".repeat(start_pos);
            bar.push_str(&mark.repeat(width));

            output.push_str(&format!(
                "{:12} |{}| ({} ms)\n",
                truncate(&entry.step_id, 12),
                bar,
                end - entry.start_ms
            ));
        }

        output.push_str(&format!("\nTotal: {} ms\n", total_time));
        output
    }

    /// Returns step durations in milliseconds, keyed by step id.
    pub fn durations(&self) -> HashMap<String, i64> {
        self.entries
            .iter()
            .filter_map(|e| e.duration_ms().map(|d| (e.step_id.clone(), d)))
            .collect()
    }
}

/// Pads or truncates a string to exactly `max_len` characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        format!("{:width$}", s, width = max_len)
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::model::{Context, WorkflowStep, WorkflowStepExecution};
    use chrono::Duration;

    fn record(
        execution: &WorkflowExecution,
        step_id: &str,
        start_ms: i64,
        end_ms: Option<i64>,
        status: ExecutionStatus,
    ) -> WorkflowStepExecution {
        let mut record = WorkflowStepExecution::begin(&execution.id, &WorkflowStep::new(step_id, "fs"));
        record.start_time = execution.start_time + Duration::milliseconds(start_ms);
        record.end_time = end_ms.map(|ms| execution.start_time + Duration::milliseconds(ms));
        record.status = status;
        record
    }

    fn sample_execution() -> WorkflowExecution {
        let mut execution = WorkflowExecution::start("wf", Context::new(), "tester");
        let second = record(&execution, "step2", 60, Some(100), ExecutionStatus::Failed);
        let first = record(&execution, "step1", 0, Some(50), ExecutionStatus::Completed);
        execution.step_executions = vec![second, first];
        execution.end_time = Some(execution.start_time + Duration::milliseconds(100));
        execution
    }

    #[test]
    fn test_entries_sorted_by_start() {
        let timeline = ExecutionTimeline::from_execution(&sample_execution());
        let ids: Vec<_> = timeline.entries().iter().map(|e| e.step_id.as_str()).collect();
        assert_eq!(ids, vec!["step1", "step2"]);
        assert_eq!(timeline.total_ms(), 100);
    }

    #[test]
    fn test_durations() {
        let timeline = ExecutionTimeline::from_execution(&sample_execution());
        let durations = timeline.durations();
        assert_eq!(durations["step1"], 50);
        assert_eq!(durations["step2"], 40);
    }

    #[test]
    fn test_gantt_chart_generation() {
        let chart = ExecutionTimeline::from_execution(&sample_execution()).gantt_chart();
        assert!(chart.contains("step1"));
        assert!(chart.contains("step2"));
        assert!(chart.contains("(50 ms)"));
        assert!(chart.contains('x'));
        assert!(chart.contains("Total: 100 ms"));
    }

    #[test]
    fn test_running_step_has_no_duration() {
        let mut execution = WorkflowExecution::start("wf", Context::new(), "tester");
        let running = record(&execution, "step1", 10, None, ExecutionStatus::Running);
        execution.step_executions.push(running);

        let timeline = ExecutionTimeline::from_execution(&execution);
        assert!(timeline.durations().is_empty());
        assert_eq!(timeline.total_ms(), 0);
        assert!(!timeline.gantt_chart().contains("step1"));
    }

    #[test]
    fn test_gantt_chart_empty() {
        let execution = WorkflowExecution::start("wf", Context::new(), "tester");
        let chart = ExecutionTimeline::from_execution(&execution).gantt_chart();
        assert!(chart.contains("Timeline"));
        assert!(!chart.contains("Total"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 8), "short   ");
        assert_eq!(truncate("a_very_long_step_id", 12), "a_very_lo...");
        assert_eq!(truncate("ünïcödé_step_name", 8), "ünïcö...");
    }
}
