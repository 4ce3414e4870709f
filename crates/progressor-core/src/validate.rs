//! Parsing and validation of `Field - Value` chat messages.

use crate::error::ValidationError;
use std::collections::HashMap;

pub const NAME_FIELD: &str = "Name";
pub const DESCRIPTION_FIELD: &str = "Description";
pub const WEIGHT_FIELD: &str = "Weight";
pub const WORKSPACE_NAME_FIELD: &str = "Workspace Name";
pub const PARENT_NAME_FIELD: &str = "Parent Name";
pub const COMPLETED_FIELD: &str = "Completed";

const MAX_TASK_NAME: usize = 100;
const MAX_WORKSPACE_NAME: usize = 255;
const MAX_DESCRIPTION: usize = 1000;
const MIN_WEIGHT: f64 = 0.0;
const MAX_WEIGHT: f64 = 100.0;
const DEFAULT_WEIGHT: f64 = 1.0;

/// Split `Field - Value` lines into a map. Lines without a `-` are skipped.
pub fn parse_fields(text: &str) -> HashMap<String, String> {
    text.lines()
        .filter_map(|line| {
            let (field, value) = line.split_once('-')?;
            let field = field.trim();
            (!field.is_empty()).then(|| (field.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// A workspace about to be created.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceDraft {
    pub name: String,
    pub description: Option<String>,
}

/// A task about to be created.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDraft {
    pub name: String,
    pub description: Option<String>,
    pub weight: f64,
    pub workspace_name: String,
    pub parent_name: Option<String>,
    pub completed: bool,
}

impl WorkspaceDraft {
    /// A bare message is the name; `Field - Value` lines are read as fields.
    pub fn from_message(text: &str) -> Result<Self, ValidationError> {
        let fields = parse_fields(text);
        if !fields.contains_key(NAME_FIELD) {
            let name = required_text(NAME_FIELD, Some(text.trim()), MAX_WORKSPACE_NAME)?;
            return Ok(Self {
                name,
                description: None,
            });
        }
        Self::from_fields(&fields)
    }

    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, ValidationError> {
        Ok(Self {
            name: required_text(NAME_FIELD, field(fields, NAME_FIELD), MAX_WORKSPACE_NAME)?,
            description: optional_text(
                DESCRIPTION_FIELD,
                field(fields, DESCRIPTION_FIELD),
                MAX_DESCRIPTION,
            )?,
        })
    }
}

impl TaskDraft {
    pub fn from_message(text: &str) -> Result<Self, ValidationError> {
        Self::from_fields(&parse_fields(text))
    }

    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, ValidationError> {
        Ok(Self {
            name: required_text(NAME_FIELD, field(fields, NAME_FIELD), MAX_TASK_NAME)?,
            description: optional_text(
                DESCRIPTION_FIELD,
                field(fields, DESCRIPTION_FIELD),
                MAX_DESCRIPTION,
            )?,
            weight: field(fields, WEIGHT_FIELD)
                .map(parse_weight)
                .transpose()?
                .unwrap_or(DEFAULT_WEIGHT),
            workspace_name: required_text(
                WORKSPACE_NAME_FIELD,
                field(fields, WORKSPACE_NAME_FIELD),
                MAX_TASK_NAME,
            )?,
            parent_name: optional_text(
                PARENT_NAME_FIELD,
                field(fields, PARENT_NAME_FIELD),
                MAX_TASK_NAME,
            )?,
            completed: field(fields, COMPLETED_FIELD)
                .map(parse_completed)
                .transpose()?
                .unwrap_or(false),
        })
    }
}

fn field<'a>(fields: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    fields.get(name).map(String::as_str)
}

fn required_text(name: &str, value: Option<&str>, max: usize) -> Result<String, ValidationError> {
    match value.map(str::trim) {
        None | Some("") => Err(ValidationError::new(name, "field required")),
        Some(v) => check_length(name, v, max).map(str::to_string),
    }
}

fn optional_text(
    name: &str,
    value: Option<&str>,
    max: usize,
) -> Result<Option<String>, ValidationError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => check_length(name, v, max).map(|v| Some(v.to_string())),
    }
}

fn check_length<'a>(name: &str, value: &'a str, max: usize) -> Result<&'a str, ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::new(
            name,
            format!("string should have at most {max} characters"),
        ));
    }
    Ok(value)
}

/// Parse a weight in `[0, 100]`.
pub fn parse_weight(raw: &str) -> Result<f64, ValidationError> {
    let weight: f64 = raw
        .trim()
        .replace(',', ".")
        .parse()
        .map_err(|_| ValidationError::new(WEIGHT_FIELD, format!("'{raw}' is not a number")))?;
    if !weight.is_finite() || !(MIN_WEIGHT..=MAX_WEIGHT).contains(&weight) {
        return Err(ValidationError::new(
            WEIGHT_FIELD,
            format!("must be between {MIN_WEIGHT} and {MAX_WEIGHT}, got {raw}"),
        ));
    }
    Ok(weight)
}

/// Parse a yes/no answer (Russian or English).
pub fn parse_completed(raw: &str) -> Result<bool, ValidationError> {
    match raw.trim().to_lowercase().as_str() {
        "да" | "yes" | "y" | "true" | "1" | "+" => Ok(true),
        "нет" | "no" | "n" | "false" | "0" | "-" => Ok(false),
        _ => Err(ValidationError::new(
            COMPLETED_FIELD,
            format!("'{raw}' is not a yes/no value"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fields_valid_input() {
        let fields = parse_fields("Field1 - Value1\nField2 - Value2");
        assert_eq!(fields.len(), 2);
        assert_eq!(fields["Field1"], "Value1");
        assert_eq!(fields["Field2"], "Value2");
    }

    #[test]
    fn test_parse_fields_trims_whitespace() {
        let fields = parse_fields("  Field1  -  Value1  ");
        assert_eq!(fields["Field1"], "Value1");
    }

    #[test]
    fn test_parse_fields_empty_and_invalid() {
        assert!(parse_fields("").is_empty());
        assert!(parse_fields("This is not a valid message").is_empty());
    }

    #[test]
    fn test_parse_fields_mixed_input() {
        let fields = parse_fields("Field1 - Value1\nThis is an invalid line\nField2 - Value2");
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn test_parse_fields_complex_value() {
        let fields = parse_fields("Field1 - This is a complex value with 123 and !@#");
        assert_eq!(fields["Field1"], "This is a complex value with 123 and !@#");
    }

    #[test]
    fn test_task_draft_success() {
        let draft = TaskDraft::from_message(
            "Name - My Task\nWorkspace Name - My Workspace\nWeight - 50\nParent Name - Root",
        )
        .unwrap();
        assert_eq!(draft.name, "My Task");
        assert_eq!(draft.workspace_name, "My Workspace");
        assert_eq!(draft.weight, 50.0);
        assert_eq!(draft.parent_name.as_deref(), Some("Root"));
        assert!(!draft.completed);
    }

    #[test]
    fn test_task_draft_defaults() {
        let draft = TaskDraft::from_message("Name - T\nWorkspace Name - W").unwrap();
        assert_eq!(draft.weight, 1.0);
        assert_eq!(draft.parent_name, None);
        assert_eq!(draft.description, None);
    }

    #[test]
    fn test_task_draft_invalid_weight() {
        let err = TaskDraft::from_message("Name - T\nWorkspace Name - W\nWeight - 150")
            .unwrap_err();
        assert_eq!(err.field, "Weight");
        assert!(err.message.contains("100"));
    }

    #[test]
    fn test_task_draft_name_too_long() {
        let text = format!("Name - {}\nWorkspace Name - W", "A".repeat(101));
        let err = TaskDraft::from_message(&text).unwrap_err();
        assert_eq!(err.field, "Name");
        assert!(err.message.contains("string"));
    }

    #[test]
    fn test_task_draft_requires_workspace() {
        let err = TaskDraft::from_message("Name - T").unwrap_err();
        assert_eq!(err.field, "Workspace Name");
    }

    #[test]
    fn test_task_draft_completed_values() {
        let yes = TaskDraft::from_message("Name - T\nWorkspace Name - W\nCompleted - Да").unwrap();
        assert!(yes.completed);
        let no = TaskDraft::from_message("Name - T\nWorkspace Name - W\nCompleted - Нет").unwrap();
        assert!(!no.completed);
        assert!(TaskDraft::from_message("Name - T\nWorkspace Name - W\nCompleted - maybe").is_err());
    }

    #[test]
    fn test_workspace_draft_bare_name() {
        let draft = WorkspaceDraft::from_message("  Fitness  ").unwrap();
        assert_eq!(draft.name, "Fitness");
        assert_eq!(draft.description, None);
    }

    #[test]
    fn test_workspace_draft_with_fields() {
        let draft =
            WorkspaceDraft::from_message("Name - Fitness\nDescription - Get fit by summer")
                .unwrap();
        assert_eq!(draft.name, "Fitness");
        assert_eq!(draft.description.as_deref(), Some("Get fit by summer"));
    }

    #[test]
    fn test_workspace_draft_empty_is_rejected() {
        assert!(WorkspaceDraft::from_message("   ").is_err());
    }

    #[test]
    fn test_parse_weight_bounds() {
        assert_eq!(parse_weight("0").unwrap(), 0.0);
        assert_eq!(parse_weight("100").unwrap(), 100.0);
        assert_eq!(parse_weight("2,5").unwrap(), 2.5);
        assert!(parse_weight("-1").is_err());
        assert!(parse_weight("abc").is_err());
    }
}
