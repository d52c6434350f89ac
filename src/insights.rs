//! Summary statistics over one user's task set.
//!
//! Everything here is recomputed from the live task list on every request;
//! nothing is persisted or cached.

use crate::models::{Priority, Task, TaskStatus};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInsight {
    pub total_tasks: usize,
    pub pending_tasks: usize,
    pub in_progress_tasks: usize,
    pub completed_tasks: usize,
    pub completion_rate: u8,
    pub most_recent_task: Option<String>,
    pub tasks_by_month: BTreeMap<String, usize>,
    pub priority_distribution: BTreeMap<Priority, usize>,
}

impl TaskInsight {
    /// `tasks_by_month` ordered oldest month first.
    pub fn months_chronological(&self) -> Vec<(&str, usize)> {
        let mut months: Vec<(&str, usize)> = self
            .tasks_by_month
            .iter()
            .map(|(label, count)| (label.as_str(), *count))
            .collect();
        months.sort_by_key(|(label, _)| parse_month_label(label));
        months
    }
}

pub fn compute_insights(tasks: &[Task]) -> TaskInsight {
    let mut insight = TaskInsight {
        total_tasks: tasks.len(),
        ..TaskInsight::default()
    };

    for task in tasks {
        match task.status {
            TaskStatus::Pending => insight.pending_tasks += 1,
            TaskStatus::InProgress => insight.in_progress_tasks += 1,
            TaskStatus::Done => insight.completed_tasks += 1,
        }
    }

    insight.completion_rate = completion_rate(insight.completed_tasks, insight.total_tasks);

    // Stable sort on a copy of the references, so ties keep input order.
    let mut by_recency: Vec<&Task> = tasks.iter().collect();
    by_recency.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    insight.most_recent_task = by_recency.first().map(|task| task.title.clone());

    for task in tasks {
        *insight
            .tasks_by_month
            .entry(month_label(task.created_at))
            .or_insert(0) += 1;

        let priority = task.extras.priority.unwrap_or(Priority::Medium);
        *insight.priority_distribution.entry(priority).or_insert(0) += 1;
    }

    insight
}

/// Percentage of completed tasks, rounded half-up; 0 for an empty set.
pub fn completion_rate(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let rate = (200 * completed + total) / (2 * total);
    rate.min(100) as u8
}

/// "January 2024" style label, always in UTC.
pub fn month_label(at: DateTime<Utc>) -> String {
    at.format("%B %Y").to_string()
}

fn parse_month_label(label: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(&format!("1 {}", label), "%d %B %Y").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskExtras;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn task(title: &str, status: TaskStatus, created: (i32, u32, u32)) -> Task {
        let at = Utc
            .with_ymd_and_hms(created.0, created.1, created.2, 12, 0, 0)
            .unwrap();
        Task {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: String::new(),
            status,
            extras: TaskExtras::default(),
            owner_id: "user-1".to_string(),
            created_at: at,
            updated_at: at,
        }
    }

    fn with_priority(mut task: Task, priority: Priority) -> Task {
        task.extras.priority = Some(priority);
        task
    }

    #[test]
    fn test_empty_task_list() {
        let insight = compute_insights(&[]);
        assert_eq!(insight.total_tasks, 0);
        assert_eq!(insight.completion_rate, 0);
        assert_eq!(insight.most_recent_task, None);
        assert!(insight.tasks_by_month.is_empty());
        assert!(insight.priority_distribution.is_empty());
    }

    #[test]
    fn test_status_buckets_sum_to_total() {
        let tasks = vec![
            task("a", TaskStatus::Pending, (2024, 1, 1)),
            task("b", TaskStatus::InProgress, (2024, 1, 2)),
            task("c", TaskStatus::Done, (2024, 1, 3)),
            task("d", TaskStatus::Done, (2024, 1, 4)),
        ];
        let insight = compute_insights(&tasks);
        assert_eq!(insight.total_tasks, 4);
        assert_eq!(insight.pending_tasks, 1);
        assert_eq!(insight.in_progress_tasks, 1);
        assert_eq!(insight.completed_tasks, 2);
        assert_eq!(
            insight.pending_tasks + insight.in_progress_tasks + insight.completed_tasks,
            insight.total_tasks
        );
        assert_eq!(insight.completion_rate, 50);
    }

    #[test]
    fn test_completion_rate_rounds_half_up() {
        assert_eq!(completion_rate(1, 3), 33);
        assert_eq!(completion_rate(2, 3), 67);
        assert_eq!(completion_rate(1, 8), 13); // 12.5
        assert_eq!(completion_rate(1, 200), 1); // 0.5
        assert_eq!(completion_rate(0, 5), 0);
        assert_eq!(completion_rate(5, 5), 100);
    }

    #[test]
    fn test_completion_rate_stays_in_bounds() {
        for total in 1..=40usize {
            for completed in 0..=total {
                let rate = completion_rate(completed, total);
                assert!(rate <= 100);
                // rate * total lies in (100c - total/2, 100c + total/2]
                let diff = 2 * (rate as i64 * total as i64 - 100 * completed as i64);
                assert!(
                    diff > -(total as i64) && diff <= total as i64,
                    "{}/{}",
                    completed,
                    total
                );
            }
        }
    }

    #[test]
    fn test_tasks_by_month_labels() {
        let tasks = vec![
            task("jan", TaskStatus::Pending, (2024, 1, 15)),
            task("feb", TaskStatus::Pending, (2024, 2, 20)),
        ];
        let insight = compute_insights(&tasks);
        let expected: BTreeMap<String, usize> = [
            ("January 2024".to_string(), 1),
            ("February 2024".to_string(), 1),
        ]
        .into_iter()
        .collect();
        assert_eq!(insight.tasks_by_month, expected);
    }

    #[test]
    fn test_skipped_months_are_not_zero_filled() {
        let tasks = vec![
            task("a", TaskStatus::Pending, (2024, 1, 15)),
            task("b", TaskStatus::Pending, (2024, 4, 2)),
            task("c", TaskStatus::Pending, (2024, 4, 9)),
        ];
        let insight = compute_insights(&tasks);
        assert_eq!(insight.tasks_by_month.len(), 2);
        assert_eq!(insight.tasks_by_month["April 2024"], 2);
        assert_eq!(
            insight.months_chronological(),
            vec![("January 2024", 1), ("April 2024", 2)]
        );
    }

    #[test]
    fn test_missing_priority_counts_as_medium() {
        let tasks = vec![
            task("plain", TaskStatus::Pending, (2024, 1, 1)),
            with_priority(task("hot", TaskStatus::Pending, (2024, 1, 2)), Priority::High),
            with_priority(task("mid", TaskStatus::Done, (2024, 1, 3)), Priority::Medium),
        ];
        let insight = compute_insights(&tasks);
        assert_eq!(insight.priority_distribution[&Priority::Medium], 2);
        assert_eq!(insight.priority_distribution[&Priority::High], 1);
        assert!(!insight.priority_distribution.contains_key(&Priority::Low));
    }

    #[test]
    fn test_most_recent_task_and_input_order_untouched() {
        let tasks = vec![
            task("old", TaskStatus::Pending, (2023, 12, 1)),
            task("newest", TaskStatus::Pending, (2024, 3, 1)),
            task("middle", TaskStatus::Pending, (2024, 1, 1)),
        ];
        let before: Vec<String> = tasks.iter().map(|t| t.title.clone()).collect();
        let insight = compute_insights(&tasks);
        assert_eq!(insight.most_recent_task.as_deref(), Some("newest"));
        let after: Vec<String> = tasks.iter().map(|t| t.title.clone()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_most_recent_tie_keeps_first_in_input() {
        let tasks = vec![
            task("first", TaskStatus::Pending, (2024, 5, 1)),
            task("second", TaskStatus::Pending, (2024, 5, 1)),
        ];
        assert_eq!(
            compute_insights(&tasks).most_recent_task.as_deref(),
            Some("first")
        );
    }

    #[test]
    fn test_json_shape() {
        let tasks = vec![task("only", TaskStatus::Done, (2024, 1, 15))];
        let value = serde_json::to_value(compute_insights(&tasks)).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "totalTasks": 1,
                "pendingTasks": 0,
                "inProgressTasks": 0,
                "completedTasks": 1,
                "completionRate": 100,
                "mostRecentTask": "only",
                "tasksByMonth": { "January 2024": 1 },
                "priorityDistribution": { "medium": 1 }
            })
        );
        let empty = serde_json::to_value(compute_insights(&[])).unwrap();
        assert_eq!(empty["mostRecentTask"], serde_json::Value::Null);
    }
}
