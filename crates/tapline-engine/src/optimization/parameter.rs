//! Parameter push-down.
//!
//! Maps service columns onto pipeline parameters. `init` declares the
//! parameters so `${NAME}` references resolve; at query time a
//! `column = literal` conjunct in the WHERE clause supplies the value when
//! the caller did not.

use super::{
    Activation, ActivationContext, Optimization, OptimizationDescriptor, OptimizationKind,
    OptimizationPreview,
};
use serde::{Deserialize, Serialize};
use tapline_common::utils::error::Result;
use tapline_core::condition::{Operand, Operator};
use tapline_core::execution::{ParameterDef, PipelineMeta};

/// Suffix appended to a column name when no parameter name is given.
pub const PARAMETER_SUFFIX: &str = "_PARAM";

/// Default value format; `%s` is replaced by the literal.
pub const DEFAULT_FORMAT: &str = "%s";

/// One column to parameter mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterMapping {
    /// Service column read from the WHERE clause.
    pub column: String,
    /// Pipeline parameter to set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
    /// Value format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl ParameterMapping {
    /// Maps `column` onto the parameter `<COLUMN>_PARAM`.
    pub fn for_column(column: impl Into<String>) -> Self {
        let column = column.into();
        Self {
            parameter: Some(default_parameter_name(&column)),
            column,
            format: None,
        }
    }

    /// Sets the parameter name.
    #[must_use]
    pub fn with_parameter(mut self, parameter: impl Into<String>) -> Self {
        self.parameter = Some(parameter.into());
        self
    }

    /// Sets the value format.
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Returns the parameter name, derived from the column when unset.
    #[must_use]
    pub fn parameter_name(&self) -> String {
        self.parameter
            .clone()
            .unwrap_or_else(|| default_parameter_name(&self.column))
    }

    /// Returns whether both names are non-empty.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.column.trim().is_empty() && !self.parameter_name().trim().is_empty()
    }

    /// Formats a literal for the parameter.
    #[must_use]
    pub fn format_value(&self, value: &str) -> String {
        self.format
            .as_deref()
            .unwrap_or(DEFAULT_FORMAT)
            .replacen("%s", value, 1)
    }
}

/// Upper-cases the column and appends [`PARAMETER_SUFFIX`].
fn default_parameter_name(column: &str) -> String {
    format!("{}{PARAMETER_SUFFIX}", column.trim().to_uppercase())
}

/// The parameter push-down optimization.
pub struct ParameterPushdown {
    descriptor: OptimizationDescriptor,
    mappings: Vec<ParameterMapping>,
}

impl ParameterPushdown {
    /// Creates the optimization, discarding invalid mappings.
    #[must_use]
    pub fn new(descriptor: OptimizationDescriptor) -> Self {
        let mappings = match &descriptor.kind {
            OptimizationKind::ParameterPushdown { definitions } => definitions
                .iter()
                .filter(|mapping| {
                    let valid = mapping.is_valid();
                    if !valid {
                        tracing::warn!(
                            optimization = %descriptor.name,
                            column = %mapping.column,
                            "discarding parameter mapping without a column or parameter name"
                        );
                    }
                    valid
                })
                .cloned()
                .collect(),
            _ => Vec::new(),
        };
        Self {
            descriptor,
            mappings,
        }
    }

    /// Returns the mappings that survived validation.
    #[must_use]
    pub fn mappings(&self) -> &[ParameterMapping] {
        &self.mappings
    }

    /// Returns the parameter values the WHERE clause implies.
    fn derive(&self, ctx: &ActivationContext<'_>) -> Vec<(String, String)> {
        let Some(condition) = &ctx.query.condition else {
            return Vec::new();
        };
        let conjuncts = condition.conjuncts();
        let mut derived = Vec::new();
        for mapping in &self.mappings {
            let parameter = mapping.parameter_name();
            if ctx.params.contains_key(&parameter) {
                continue;
            }
            let literal = conjuncts.iter().find_map(|atom| {
                let eligible = atom.column.eq_ignore_ascii_case(&mapping.column)
                    && atom.operator == Operator::Eq
                    && !atom.negated;
                match &atom.operand {
                    Operand::Literal(value) if eligible && !value.is_null() => {
                        Some(value.to_string())
                    }
                    _ => None,
                }
            });
            if let Some(literal) = literal {
                derived.push((parameter, mapping.format_value(&literal)));
            }
        }
        derived
    }
}

impl Optimization for ParameterPushdown {
    fn descriptor(&self) -> &OptimizationDescriptor {
        &self.descriptor
    }

    fn init(&self, meta: &mut PipelineMeta) -> Result<()> {
        for mapping in &self.mappings {
            let name = mapping.parameter_name();
            if !meta.has_parameter(&name) {
                meta.declare_parameter(ParameterDef::new(name));
            }
        }
        Ok(())
    }

    fn activate(&self, ctx: &mut ActivationContext<'_>) -> Result<Activation> {
        for (parameter, value) in self.derive(ctx) {
            tracing::debug!(
                optimization = %self.descriptor.name,
                parameter = %parameter,
                value = %value,
                "derived parameter from WHERE clause"
            );
            ctx.params.insert(parameter.clone(), value);
            ctx.derived_params.push(parameter);
        }
        Ok(Activation::PassThrough)
    }

    fn preview(&self, ctx: &mut ActivationContext<'_>) -> OptimizationPreview {
        let mut preview = OptimizationPreview::new(&self.descriptor);
        preview.before = render_params(ctx);
        for (parameter, value) in self.derive(ctx) {
            ctx.params.insert(parameter.clone(), value);
            ctx.derived_params.push(parameter);
        }
        preview.after = render_params(ctx);
        preview
    }
}

fn render_params(ctx: &ActivationContext<'_>) -> String {
    ctx.params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ")
}
