//! Pipeline definitions.
//!
//! A [`PipelineMeta`] is plain data: it serializes to and from the JSON used
//! in service catalogs, and optimizations edit it before a pipeline is
//! built. Nothing here runs rows.

use super::PipelineError;
use crate::condition::Condition;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tapline_common::types::{ColumnMeta, LogicalType, RowSchema, Value};

/// A declared pipeline parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Parameter name, referenced as `${NAME}`.
    pub name: String,
    /// Value used when the caller supplies none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

impl ParameterDef {
    /// Creates a parameter without a default.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_value: None,
        }
    }

    /// Sets the default value.
    #[must_use]
    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

/// A column extracted from JSON documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentField {
    /// Output column name.
    pub name: String,
    /// Dotted path inside the document; defaults to the column name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Output column type.
    #[serde(rename = "type")]
    pub logical_type: LogicalType,
}

impl DocumentField {
    /// Creates a field read from the top-level key of the same name.
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            path: None,
            logical_type,
        }
    }

    /// Reads the field from a different document path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Returns the document path.
    #[must_use]
    pub fn path(&self) -> &str {
        self.path.as_deref().unwrap_or(&self.name)
    }
}

/// What a step does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepKind {
    /// Emits a fixed grid of rows.
    Rows {
        /// Output schema.
        schema: RowSchema,
        /// Row data, one JSON array per row.
        #[serde(default)]
        rows: Vec<Vec<serde_json::Value>>,
    },
    /// Emits consecutive integers, forever when no count is given.
    Sequence {
        /// Output column name.
        column: String,
        /// First value.
        #[serde(default)]
        start: i64,
        /// Number of rows.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        count: Option<u64>,
    },
    /// Scans an in-memory JSON document collection.
    Documents {
        /// Columns extracted from each document.
        fields: Vec<DocumentField>,
        /// The collection.
        #[serde(default)]
        documents: Vec<serde_json::Value>,
        /// Native filter, as JSON text.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        query: Option<String>,
    },
    /// Emits rows written into the pipeline's [`RowInput`](super::RowInput).
    Injector {
        /// Schema of the injected rows.
        schema: RowSchema,
    },
    /// Drops rows that do not satisfy a condition.
    Filter {
        /// Condition evaluated per row.
        condition: Condition,
    },
    /// Keeps only the named columns, in order.
    Select {
        /// Column names; empty keeps every column.
        columns: Vec<String>,
    },
    /// Passes at most `count` rows, then finishes the pipeline.
    Limit {
        /// Maximum rows.
        count: u64,
    },
}

impl StepKind {
    /// Returns whether this kind produces rows rather than transforming them.
    #[must_use]
    pub fn is_source(&self) -> bool {
        matches!(
            self,
            Self::Rows { .. } | Self::Sequence { .. } | Self::Documents { .. } | Self::Injector { .. }
        )
    }

    /// Returns a short label for logs and listings.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Rows { .. } => "rows",
            Self::Sequence { .. } => "sequence",
            Self::Documents { .. } => "documents",
            Self::Injector { .. } => "injector",
            Self::Filter { .. } => "filter",
            Self::Select { .. } => "select",
            Self::Limit { .. } => "limit",
        }
    }

    fn output_schema(&self, input: Option<&RowSchema>) -> Result<RowSchema, String> {
        match self {
            Self::Rows { schema, .. } | Self::Injector { schema } => Ok(schema.clone()),
            Self::Sequence { column, .. } => {
                Ok(RowSchema::new(vec![ColumnMeta::new(column.clone(), LogicalType::Int64)]))
            }
            Self::Documents { fields, .. } => Ok(RowSchema::new(
                fields
                    .iter()
                    .map(|f| ColumnMeta::new(f.name.clone(), f.logical_type))
                    .collect(),
            )),
            Self::Filter { .. } | Self::Limit { .. } => {
                input.cloned().ok_or_else(|| "needs an input step".to_string())
            }
            Self::Select { columns } => {
                let input = input.ok_or_else(|| "needs an input step".to_string())?;
                if columns.is_empty() || (columns.len() == 1 && columns[0] == "*") {
                    return Ok(input.clone());
                }
                input
                    .project(columns)
                    .map(|(schema, _)| schema)
                    .map_err(|missing| format!("unknown column '{missing}'"))
            }
        }
    }
}

/// A named step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepMeta {
    /// Step name, unique within the pipeline.
    pub name: String,
    /// Step configuration.
    #[serde(flatten)]
    pub kind: StepKind,
}

impl StepMeta {
    /// Creates a step.
    pub fn new(name: impl Into<String>, kind: StepKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// A pipeline definition: a source step followed by transforms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineMeta {
    /// Pipeline name.
    pub name: String,
    /// Declared parameters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterDef>,
    /// Steps in execution order.
    pub steps: Vec<StepMeta>,
}

impl PipelineMeta {
    /// Creates an empty pipeline definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            steps: Vec::new(),
        }
    }

    /// Appends a step.
    #[must_use]
    pub fn with_step(mut self, name: impl Into<String>, kind: StepKind) -> Self {
        self.steps.push(StepMeta::new(name, kind));
        self
    }

    /// Declares a parameter.
    #[must_use]
    pub fn with_parameter(mut self, parameter: ParameterDef) -> Self {
        self.declare_parameter(parameter);
        self
    }

    /// Declares a parameter, replacing any earlier declaration of the same name.
    pub fn declare_parameter(&mut self, parameter: ParameterDef) {
        match self.parameters.iter_mut().find(|p| p.name == parameter.name) {
            Some(existing) => *existing = parameter,
            None => self.parameters.push(parameter),
        }
    }

    /// Returns whether a parameter is declared.
    #[must_use]
    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters.iter().any(|p| p.name == name)
    }

    /// Finds a step by name.
    #[must_use]
    pub fn find_step(&self, name: &str) -> Option<&StepMeta> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Finds a step by name for editing.
    pub fn find_step_mut(&mut self, name: &str) -> Option<&mut StepMeta> {
        self.steps.iter_mut().find(|s| s.name == name)
    }

    /// Checks the shape of the pipeline and derives every step's output schema.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Build`] if the pipeline is empty, does not
    /// start with exactly one source, repeats a step name, or selects an
    /// unknown column.
    pub fn output_schemas(&self) -> Result<Vec<RowSchema>, PipelineError> {
        let build_error = |message: String| PipelineError::Build {
            pipeline: self.name.clone(),
            message,
        };
        if self.steps.is_empty() {
            return Err(build_error("no steps".to_string()));
        }

        let mut schemas: Vec<RowSchema> = Vec::with_capacity(self.steps.len());
        for (i, step) in self.steps.iter().enumerate() {
            if (i == 0) != step.kind.is_source() {
                return Err(build_error(if i == 0 {
                    format!("first step '{}' must be a source", step.name)
                } else {
                    format!("step '{}' is a source but is not first", step.name)
                }));
            }
            if self.steps[..i].iter().any(|s| s.name == step.name) {
                return Err(build_error(format!("duplicate step name '{}'", step.name)));
            }
            let schema = step
                .kind
                .output_schema(schemas.last())
                .map_err(|e| build_error(format!("step '{}': {e}", step.name)))?;
            schemas.push(schema);
        }
        Ok(schemas)
    }

    /// Returns the output schema of the named step.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline is invalid or has no such step.
    pub fn step_schema(&self, name: &str) -> Result<RowSchema, PipelineError> {
        let index = self
            .steps
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| PipelineError::Build {
                pipeline: self.name.clone(),
                message: format!("no step named '{name}'"),
            })?;
        let mut schemas = self.output_schemas()?;
        Ok(schemas.swap_remove(index))
    }

    /// Merges declared defaults with supplied values; supplied values win.
    #[must_use]
    pub fn resolve_parameters(&self, supplied: &IndexMap<String, String>) -> IndexMap<String, String> {
        let mut resolved: IndexMap<String, String> = self
            .parameters
            .iter()
            .filter_map(|p| p.default_value.clone().map(|v| (p.name.clone(), v)))
            .collect();
        for (name, value) in supplied {
            resolved.insert(name.clone(), value.clone());
        }
        resolved
    }

    /// Returns a copy with `${NAME}` references in step configuration replaced.
    ///
    /// Parameters are resolved with [`resolve_parameters`](Self::resolve_parameters).
    /// References to unknown names are left as written. Values spliced into
    /// a document query are JSON-escaped, so they can only ever form part
    /// of a string literal there.
    #[must_use]
    pub fn with_substitutions(&self, supplied: &IndexMap<String, String>) -> PipelineMeta {
        let params = self.resolve_parameters(supplied);
        let mut meta = self.clone();
        if params.is_empty() {
            return meta;
        }
        let escaped: IndexMap<String, String> = params
            .iter()
            .map(|(name, value)| (name.clone(), json_escape(value)))
            .collect();
        let replace = |s: &str| substitute(s, &params);
        for step in &mut meta.steps {
            match &mut step.kind {
                StepKind::Documents { query: Some(query), .. } => {
                    *query = substitute(query.as_str(), &escaped);
                }
                StepKind::Filter { condition } => condition.map_strings(&replace),
                StepKind::Rows { rows, .. } => {
                    for cell in rows.iter_mut().flatten() {
                        if let serde_json::Value::String(s) = cell {
                            *s = replace(s.as_str());
                        }
                    }
                }
                _ => {}
            }
        }
        meta
    }
}

/// Replaces `${NAME}` references with parameter values.
///
/// Unknown names and unterminated references are left as written.
#[must_use]
pub fn substitute(text: &str, params: &IndexMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match params.get(name) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 1]),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Escapes `value` for use between the quotes of a JSON string.
fn json_escape(value: &str) -> String {
    let quoted = serde_json::Value::String(value.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

/// Converts rows into the JSON grid stored by a [`StepKind::Rows`] step.
#[must_use]
pub fn rows_to_json(rows: &[tapline_common::types::Row]) -> Vec<Vec<serde_json::Value>> {
    rows.iter()
        .map(|row| row.values().iter().map(Value::to_json).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Operator;

    fn params(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn sample() -> PipelineMeta {
        PipelineMeta::new("people")
            .with_parameter(ParameterDef::new("CITY").with_default("Oslo"))
            .with_step(
                "scan",
                StepKind::Documents {
                    fields: vec![
                        DocumentField::new("name", LogicalType::String),
                        DocumentField::new("city", LogicalType::String).with_path("address.city"),
                    ],
                    documents: vec![],
                    query: Some(r#"{"address.city": {"$eq": "${CITY}"}}"#.to_string()),
                },
            )
            .with_step(
                "only_named",
                StepKind::Filter {
                    condition: Condition::compare("name", Operator::Neq, "${SKIP}"),
                },
            )
            .with_step(
                "out",
                StepKind::Select {
                    columns: vec!["city".to_string()],
                },
            )
    }

    #[test]
    fn test_substitute() {
        let p = params(&[("A", "1")]);
        assert_eq!(substitute("x=${A}, y=${B}", &p), "x=1, y=${B}");
        assert_eq!(substitute("open ${A", &p), "open ${A");
        assert_eq!(substitute("", &p), "");
    }

    #[test]
    fn test_substitutions_use_defaults_and_overrides() {
        let meta = sample();
        let built = meta.with_substitutions(&IndexMap::new());
        let StepKind::Documents { query, .. } = &built.steps[0].kind else {
            panic!("expected documents step");
        };
        assert_eq!(query.as_deref(), Some(r#"{"address.city": {"$eq": "Oslo"}}"#));

        let built = meta.with_substitutions(&params(&[("CITY", "Rome"), ("SKIP", "bob")]));
        let StepKind::Documents { query, .. } = &built.steps[0].kind else {
            panic!("expected documents step");
        };
        assert!(query.as_deref().unwrap().contains("Rome"));
        let StepKind::Filter { condition } = &built.steps[1].kind else {
            panic!("expected filter step");
        };
        assert_eq!(condition.to_string(), "name <> 'bob'");
    }

    #[test]
    fn test_document_query_values_are_escaped() {
        let meta = sample();
        let built = meta.with_substitutions(&params(&[("CITY", r#"O"slo\"#), ("SKIP", r#"a"b"#)]));
        let StepKind::Documents { query, .. } = &built.steps[0].kind else {
            panic!("expected documents step");
        };
        let parsed: serde_json::Value = serde_json::from_str(query.as_deref().unwrap()).unwrap();
        assert_eq!(parsed, serde_json::json!({"address.city": {"$eq": "O\"slo\\"}}));

        let injected = meta.with_substitutions(&params(&[("CITY", r#"x"}, "name": {"$ne": ""#)]));
        let StepKind::Documents { query, .. } = &injected.steps[0].kind else {
            panic!("expected documents step");
        };
        let parsed: serde_json::Value = serde_json::from_str(query.as_deref().unwrap()).unwrap();
        assert_eq!(parsed.as_object().unwrap().len(), 1);
        assert_eq!(parsed["address.city"]["$eq"], r#"x"}, "name": {"$ne": ""#);

        // Other steps take the value as written.
        let StepKind::Filter { condition } = &built.steps[1].kind else {
            panic!("expected filter step");
        };
        assert_eq!(condition.to_string(), "name <> 'a\"b'");
    }

    #[test]
    fn test_schemas() {
        let meta = sample();
        let schema = meta.step_schema("out").unwrap();
        assert_eq!(schema.names(), vec!["city"]);
        assert_eq!(meta.step_schema("scan").unwrap().len(), 2);
        assert!(meta.step_schema("nope").is_err());
    }

    #[test]
    fn test_shape_errors() {
        let meta = PipelineMeta::new("bad").with_step("limit", StepKind::Limit { count: 1 });
        assert!(matches!(meta.output_schemas(), Err(PipelineError::Build { .. })));

        let meta = PipelineMeta::new("bad")
            .with_step("a", StepKind::Sequence { column: "n".into(), start: 0, count: None })
            .with_step("a", StepKind::Limit { count: 1 });
        let err = meta.output_schemas().unwrap_err();
        assert!(err.to_string().contains("duplicate"));

        let meta = PipelineMeta::new("bad")
            .with_step("a", StepKind::Sequence { column: "n".into(), start: 0, count: None })
            .with_step("b", StepKind::Select { columns: vec!["m".into()] });
        assert!(meta.output_schemas().unwrap_err().to_string().contains("unknown column 'm'"));
    }

    #[test]
    fn test_json_definition() {
        let json = r#"{
            "name": "numbers",
            "parameters": [{"name": "LIMIT", "default_value": "10"}],
            "steps": [
                {"name": "gen", "kind": "sequence", "column": "n", "count": 100},
                {"name": "grid", "kind": "limit", "count": 5}
            ]
        }"#;
        let meta: PipelineMeta = serde_json::from_str(json).unwrap();
        assert_eq!(meta.steps.len(), 2);
        assert_eq!(meta.steps[1].kind, StepKind::Limit { count: 5 });
        assert!(meta.has_parameter("LIMIT"));

        let again: PipelineMeta =
            serde_json::from_str(&serde_json::to_string(&meta).unwrap()).unwrap();
        assert_eq!(again, meta);
    }

    #[test]
    fn test_declare_parameter_replaces() {
        let mut meta = sample();
        meta.declare_parameter(ParameterDef::new("CITY"));
        assert_eq!(meta.parameters.len(), 1);
        assert_eq!(meta.parameters[0].default_value, None);
    }
}
