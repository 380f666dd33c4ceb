use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use utoipa::ToSchema;

use super::{Priority, Todo};

/// Filter criteria for listing todos. Criteria combine with AND; `None` means no constraint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TodoFilter {
    pub completed: Option<bool>,
    pub priority: Option<Priority>,
    pub overdue_only: bool,
}

impl TodoFilter {
    pub fn matches(&self, todo: &Todo, today: NaiveDate) -> bool {
        self.completed.is_none_or(|completed| todo.completed == completed)
            && self.priority.is_none_or(|priority| todo.priority == priority)
            && (!self.overdue_only || todo.is_overdue(today))
    }
}

/// Applies `filter` and orders the result newest first.
/// Todos created at the same instant are ordered by descending ID.
pub fn filter_todos<I>(todos: I, filter: &TodoFilter, today: NaiveDate) -> Vec<Todo>
where
    I: IntoIterator<Item = Todo>,
{
    let mut matching: Vec<Todo> = todos
        .into_iter()
        .filter(|todo| filter.matches(todo, today))
        .collect();
    matching.sort_by_key(|todo| Reverse((todo.created_at, todo.id)));
    matching
}

/// Aggregate counts over a todo collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TodoStatistics {
    pub total: u64,
    pub completed: u64,
    pub pending: u64,
    pub overdue: u64,
}

pub fn statistics<'a, I>(todos: I, today: NaiveDate) -> TodoStatistics
where
    I: IntoIterator<Item = &'a Todo>,
{
    let mut stats = TodoStatistics::default();
    for todo in todos {
        stats.total += 1;
        if todo.completed {
            stats.completed += 1;
        }
        if todo.is_overdue(today) {
            stats.overdue += 1;
        }
    }
    stats.pending = stats.total - stats.completed;
    stats
}
