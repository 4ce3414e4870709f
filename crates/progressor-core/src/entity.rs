//! Entity schema shared by the repository and the progress engine.
//!
//! Records travel between layers as plain attribute mappings ([`Record`]);
//! the typed structs below are `serde` views over those mappings.

use crate::error::{ProgressorError, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// A row as a column-name → value mapping.
pub type Record = Map<String, Value>;

/// Storage-mapped entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    User,
    UserState,
    Workspace,
    Task,
}

/// SQL storage class of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Real,
    Boolean,
}

/// A declared column of an entity.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
}

const fn col(name: &'static str, ty: ColumnType, nullable: bool) -> Column {
    Column {
        name,
        ty,
        nullable,
        primary_key: false,
    }
}

const fn key(name: &'static str, ty: ColumnType) -> Column {
    Column {
        name,
        ty,
        nullable: false,
        primary_key: true,
    }
}

const USER_COLUMNS: &[Column] = &[
    key("username", ColumnType::Text),
    col("active", ColumnType::Boolean, false),
    col("telegram_username", ColumnType::Text, true),
];

const USER_STATE_COLUMNS: &[Column] = &[
    key("telegram_username", ColumnType::Text),
    col("state", ColumnType::Text, true),
];

const WORKSPACE_COLUMNS: &[Column] = &[
    key("id", ColumnType::Integer),
    col("name", ColumnType::Text, false),
    col("description", ColumnType::Text, true),
    col("owner_name", ColumnType::Text, false),
];

const TASK_COLUMNS: &[Column] = &[
    key("id", ColumnType::Integer),
    col("workspace_id", ColumnType::Integer, false),
    col("parent_id", ColumnType::Integer, true),
    col("name", ColumnType::Text, false),
    col("description", ColumnType::Text, true),
    col("completed", ColumnType::Boolean, false),
    col("weight", ColumnType::Real, false),
    col("owner_name", ColumnType::Text, false),
];

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::User,
        EntityKind::UserState,
        EntityKind::Workspace,
        EntityKind::Task,
    ];

    /// Type name as written by users and in messages.
    pub fn type_name(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::UserState => "UserState",
            Self::Workspace => "Workspace",
            Self::Task => "Task",
        }
    }

    /// Lowercased type name, the entity segment of cache keys.
    pub fn name(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::UserState => "userstate",
            Self::Workspace => "workspace",
            Self::Task => "task",
        }
    }

    /// SQL table name.
    pub fn table(self) -> &'static str {
        match self {
            Self::User => "users",
            Self::UserState => "user_state",
            Self::Workspace => "workspaces",
            Self::Task => "tasks",
        }
    }

    pub fn columns(self) -> &'static [Column] {
        match self {
            Self::User => USER_COLUMNS,
            Self::UserState => USER_STATE_COLUMNS,
            Self::Workspace => WORKSPACE_COLUMNS,
            Self::Task => TASK_COLUMNS,
        }
    }

    pub fn column(self, name: &str) -> Option<&'static Column> {
        self.columns().iter().find(|c| c.name == name)
    }

    /// Like [`column`](Self::column), but an unknown name is an error.
    pub fn require_column(self, name: &str) -> Result<&'static Column, ProgressorError> {
        self.column(name)
            .ok_or_else(|| ProgressorError::InvalidField {
                entity: self.type_name().to_string(),
                field: name.to_string(),
            })
    }

    pub fn primary_key(self) -> &'static Column {
        // Every column list starts with its key.
        &self.columns()[0]
    }

    /// Kinds whose rows disappear with a deleted row of this kind.
    pub fn cascades_to(self) -> &'static [EntityKind] {
        match self {
            Self::User => &[EntityKind::UserState, EntityKind::Workspace, EntityKind::Task],
            Self::UserState => &[],
            Self::Workspace => &[EntityKind::Task],
            Self::Task => &[EntityKind::Task],
        }
    }

    /// Whether a childless node of this kind is scored by its own flag.
    pub fn is_leaf_kind(self) -> bool {
        matches!(self, Self::Task)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

impl FromStr for EntityKind {
    type Err = ProgressorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|k| k.type_name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ProgressorError::InvalidType(wanted.to_string()))
    }
}

impl Column {
    /// Convert `value` to this column's storage class.
    pub fn coerce(&self, value: &Value) -> Result<Value, ValidationError> {
        let mismatch = || {
            ValidationError::new(
                self.name,
                format!("expected {}, got {value}", self.ty.describe()),
            )
        };
        match (self.ty, value) {
            (_, Value::Null) if self.nullable => Ok(Value::Null),
            (_, Value::Null) => Err(ValidationError::new(self.name, "must not be null")),
            (ColumnType::Text, Value::String(_)) => Ok(value.clone()),
            (ColumnType::Integer, Value::Number(n)) => {
                n.as_i64().map(Value::from).ok_or_else(mismatch)
            }
            (ColumnType::Real, Value::Number(n)) => {
                n.as_f64().map(Value::from).ok_or_else(mismatch)
            }
            (ColumnType::Boolean, Value::Bool(_)) => Ok(value.clone()),
            (ColumnType::Boolean, Value::Number(n)) => match n.as_i64() {
                Some(0) => Ok(Value::Bool(false)),
                Some(1) => Ok(Value::Bool(true)),
                _ => Err(mismatch()),
            },
            _ => Err(mismatch()),
        }
    }
}

impl ColumnType {
    fn describe(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Real => "number",
            Self::Boolean => "boolean",
        }
    }
}

/// Primary-key value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl RecordId {
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(i) => Value::from(*i),
            Self::Text(s) => Value::from(s.as_str()),
        }
    }

    /// Read the primary key of `kind` out of `record`.
    pub fn of(kind: EntityKind, record: &Record) -> Option<Self> {
        match record.get(kind.primary_key().name)? {
            Value::Number(n) => n.as_i64().map(Self::Int),
            Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RecordId {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for RecordId {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for RecordId {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Build a [`Record`] from `key => value` pairs. Values are single
/// `json!` tokens; wrap compound expressions in parentheses.
#[macro_export]
macro_rules! record {
    ($($key:expr => $value:tt),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut map = $crate::entity::Record::new();
        $( map.insert(($key).to_string(), $crate::serde_json::json!($value)); )*
        map
    }};
}

/// Typed view over a record of `kind`.
pub trait Entity: Serialize + for<'de> Deserialize<'de> {
    const KIND: EntityKind;

    fn from_record(record: Record) -> Result<Self, ProgressorError> {
        Ok(serde_json::from_value(Value::Object(record))?)
    }

    fn into_record(self) -> Result<Record, ProgressorError> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(ProgressorError::Storage(format!(
                "{} did not serialize to a mapping: {other}",
                Self::KIND
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub active: bool,
    pub telegram_username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserState {
    pub telegram_username: String,
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub owner_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub workspace_id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub completed: bool,
    pub weight: f64,
    pub owner_name: String,
}

impl Entity for User {
    const KIND: EntityKind = EntityKind::User;
}

impl Entity for UserState {
    const KIND: EntityKind = EntityKind::UserState;
}

impl Entity for Workspace {
    const KIND: EntityKind = EntityKind::Workspace;
}

impl Entity for Task {
    const KIND: EntityKind = EntityKind::Task;
}
