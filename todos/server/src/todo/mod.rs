use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

pub mod api;
pub mod query;
pub mod service;
pub mod store;

pub use query::{TodoFilter, TodoStatistics};
pub use service::{TodoService, TodoServiceError};
pub use store::{InMemoryTodoStore, SeaOrmTodoStore, StoreError, TodoStore};

/// Identifier assigned by the store when a todo is created.
pub type TodoId = i64;

/// Maximum number of characters allowed in a title.
pub const TITLE_MAX_CHARS: usize = 200;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    /// Japanese label shown next to the priority in the UI.
    pub fn display_ja(&self) -> &'static str {
        match self {
            Priority::Low => "低",
            Priority::Medium => "中",
            Priority::High => "高",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Priority::ALL
            .into_iter()
            .find(|priority| priority.as_str() == value)
            .ok_or_else(|| {
                ValidationError::new(
                    "priority",
                    format!(
                        "Priority must be one of {}",
                        Priority::ALL.map(|p| p.as_str()).join(", ")
                    ),
                )
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Todo {
    pub id: TodoId,
    pub title: String,
    pub description: String,
    pub completed: bool,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Todo {
    /// A todo is overdue when it has a due date strictly before `today` and is not completed.
    /// Todos without a due date are never overdue.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        match self.due_date {
            Some(due_date) => !self.completed && due_date < today,
            None => false,
        }
    }
}

/// A validated todo, ready to be inserted by a [`TodoStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTodo {
    pub title: String,
    pub description: String,
    pub completed: bool,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
}

/// A JSON body field that may be absent, explicitly `null`, or carry a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldInput<T> {
    Absent,
    Null,
    Value(T),
}

impl<T> Default for FieldInput<T> {
    fn default() -> Self {
        FieldInput::Absent
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for FieldInput<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Only called when the key is present; absent keys use `Default`.
        Option::<T>::deserialize(deserializer)
            .map(|value| value.map_or(FieldInput::Null, FieldInput::Value))
    }
}

impl<T> FieldInput<T> {
    /// Absent is `None`; `null` is rejected.
    pub fn optional(self, field: &str) -> Result<Option<T>, ValidationError> {
        match self {
            FieldInput::Absent => Ok(None),
            FieldInput::Null => Err(ValidationError::new(field, NULL_MESSAGE)),
            FieldInput::Value(value) => Ok(Some(value)),
        }
    }

    /// Both absent and `null` are rejected.
    pub fn required(self, field: &str) -> Result<T, ValidationError> {
        match self {
            FieldInput::Absent => Err(ValidationError::new(field, REQUIRED_MESSAGE)),
            other => other
                .optional(field)?
                .ok_or_else(|| ValidationError::new(field, NULL_MESSAGE)),
        }
    }
}

impl<T> From<T> for FieldInput<T> {
    fn from(value: T) -> Self {
        FieldInput::Value(value)
    }
}

const REQUIRED_MESSAGE: &str = "This field is required.";
const NULL_MESSAGE: &str = "This field may not be null.";

/// Unvalidated input for creating (or fully replacing) a todo.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CreateTodo {
    #[serde(default)]
    #[schema(value_type = String, required = true)]
    pub title: FieldInput<String>,
    #[serde(default)]
    #[schema(value_type = String)]
    pub description: FieldInput<String>,
    #[serde(default)]
    #[schema(value_type = bool)]
    pub completed: FieldInput<bool>,
    /// One of `low`, `medium`, `high`. Defaults to `medium`.
    #[serde(default)]
    #[schema(value_type = String)]
    pub priority: FieldInput<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

impl CreateTodo {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: FieldInput::Value(title.into()),
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = FieldInput::Value(priority.as_str().to_string());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = FieldInput::Value(description.into());
        self
    }

    pub fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = FieldInput::Value(completed);
        self
    }

    /// Validates every field and collects all failures.
    pub fn validate(self) -> Result<NewTodo, ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let title = errors
            .check(self.title.required("title"))
            .and_then(|title| errors.check(validate_title(&title)));
        let description = errors.check(self.description.optional("description"));
        let completed = errors.check(self.completed.optional("completed"));
        let priority = errors
            .check(self.priority.optional("priority"))
            .and_then(|raw| match raw {
                Some(raw) => errors.check(raw.parse::<Priority>()),
                None => Some(Priority::default()),
            });

        match (title, description, completed, priority) {
            (Some(title), Some(description), Some(completed), Some(priority))
                if errors.is_empty() =>
            {
                Ok(NewTodo {
                    title,
                    description: description.unwrap_or_default(),
                    completed: completed.unwrap_or_default(),
                    priority,
                    due_date: self.due_date,
                })
            }
            _ => Err(errors),
        }
    }
}

/// Partial update of a todo. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct TodoPatch {
    #[serde(default)]
    #[schema(value_type = String)]
    pub title: FieldInput<String>,
    #[serde(default)]
    #[schema(value_type = String)]
    pub description: FieldInput<String>,
    #[serde(default)]
    #[schema(value_type = bool)]
    pub completed: FieldInput<bool>,
    #[serde(default)]
    #[schema(value_type = String)]
    pub priority: FieldInput<String>,
    /// `null` clears the due date.
    #[serde(default, deserialize_with = "present_or_null")]
    #[schema(value_type = Option<NaiveDate>)]
    pub due_date: Option<Option<NaiveDate>>,
}

impl TodoPatch {
    /// Validates the present fields, then applies them to `todo`.
    /// Nothing is applied if any field is invalid.
    pub fn apply(self, todo: &mut Todo) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let title = errors
            .check(self.title.optional("title"))
            .flatten()
            .and_then(|title| errors.check(validate_title(&title)));
        let description = errors.check(self.description.optional("description")).flatten();
        let completed = errors.check(self.completed.optional("completed")).flatten();
        let priority = errors
            .check(self.priority.optional("priority"))
            .flatten()
            .and_then(|priority| errors.check(priority.parse::<Priority>()));
        if !errors.is_empty() {
            return Err(errors);
        }

        if let Some(title) = title {
            todo.title = title;
        }
        if let Some(description) = description {
            todo.description = description;
        }
        if let Some(completed) = completed {
            todo.completed = completed;
        }
        if let Some(priority) = priority {
            todo.priority = priority;
        }
        if let Some(due_date) = self.due_date {
            todo.due_date = due_date;
        }
        Ok(())
    }
}

/// Distinguishes an explicit `null` (`Some(None)`) from an absent field (`None`).
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Checks the title rules and returns the trimmed title.
pub fn validate_title(title: &str) -> Result<String, ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::new("title", "Title cannot be empty"));
    }
    if title.chars().count() > TITLE_MAX_CHARS {
        return Err(ValidationError::new(
            "title",
            format!("Title must be {TITLE_MAX_CHARS} characters or less"),
        ));
    }
    Ok(title.trim().to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// All validation failures of one request, grouped by field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn push(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Field name to messages, in field order.
    pub fn by_field(&self) -> BTreeMap<String, Vec<String>> {
        let mut fields: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for error in &self.errors {
            fields
                .entry(error.field.clone())
                .or_default()
                .push(error.message.clone());
        }
        fields
    }

    fn check<T>(&mut self, result: Result<T, ValidationError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.push(error);
                None
            }
        }
    }
}

impl From<ValidationError> for ValidationErrors {
    fn from(error: ValidationError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.errors.iter().map(ToString::to_string).collect();
        f.write_str(&messages.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}
