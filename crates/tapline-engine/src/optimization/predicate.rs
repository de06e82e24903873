//! Predicate push-down.
//!
//! Translates the WHERE clause into a document filter and merges it into
//! the native query of a `Documents` step, so fewer documents leave the
//! scan. Columns are addressed by the document paths the scan reads them
//! from, unless a field mapping overrides them. The result pipeline still
//! evaluates the original WHERE clause, which keeps push-down a pure
//! optimization.

use super::{
    Activation, ActivationContext, Optimization, OptimizationDescriptor, OptimizationKind,
    OptimizationPreview,
};
use indexmap::IndexMap;
use tapline_common::utils::error::{Error, Result};
use tapline_core::condition::resolver::SchemaResolver;
use tapline_core::execution::StepKind;
use tapline_core::predicate::{DocumentDialect, PredicateTranslator};

/// The predicate push-down optimization.
pub struct PredicatePushdown {
    descriptor: OptimizationDescriptor,
    required: bool,
}

impl PredicatePushdown {
    /// Creates the optimization.
    #[must_use]
    pub fn new(descriptor: OptimizationDescriptor) -> Self {
        let required = matches!(
            descriptor.kind,
            OptimizationKind::PredicatePushdown { required: true, .. }
        );
        Self { descriptor, required }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::Optimization {
            name: self.descriptor.name.clone(),
            message: message.into(),
        }
    }

    /// Computes the current and rewritten native query.
    ///
    /// Returns `Ok(None)` when the query has no WHERE clause.
    fn rewrite(&self, ctx: &ActivationContext<'_>) -> Result<Option<(String, String)>> {
        let Some(condition) = &ctx.query.condition else {
            return Ok(None);
        };
        let step_name = &self.descriptor.step_name;
        let index = ctx
            .meta
            .steps
            .iter()
            .position(|s| &s.name == step_name)
            .ok_or_else(|| self.error(format!("no step named '{step_name}'")))?;
        let StepKind::Documents { query, fields, .. } = &ctx.meta.steps[index].kind else {
            return Err(self.error(format!("step '{step_name}' is not a document scan")));
        };

        // Filtering before a limit would change which rows the limit keeps.
        let downstream_limit = ctx.meta.steps[index + 1..]
            .iter()
            .take_while(|s| s.name != ctx.service.step_name)
            .any(|s| matches!(s.kind, StepKind::Limit { .. }));
        if downstream_limit {
            return Err(self.error("a limit step sits between the scan and the service step"));
        }

        let schema = ctx.meta.step_schema(step_name)?;
        let resolver = SchemaResolver::new(schema);
        let mapping = match self.field_mapping() {
            Some(mapping) => mapping.clone(),
            None => fields
                .iter()
                .map(|f| (f.name.clone(), f.path().to_string()))
                .collect(),
        };
        let dialect = DocumentDialect::new().with_field_mapping(mapping);
        let translated = PredicateTranslator::new(&dialect, &resolver).translate(condition)?;
        let translated = serde_json::to_string(&translated)?;

        let before = query.clone().unwrap_or_default();
        let after = match before.trim() {
            "" | "{}" => translated,
            existing => format!(r#"{{"$and":[{existing},{translated}]}}"#),
        };
        Ok(Some((before, after)))
    }

    fn set_query(ctx: &mut ActivationContext<'_>, step_name: &str, text: String) {
        if let Some(step) = ctx.meta.find_step_mut(step_name) {
            if let StepKind::Documents { query, .. } = &mut step.kind {
                *query = Some(text);
            }
        }
    }

    /// Returns the configured field mapping.
    #[must_use]
    pub fn field_mapping(&self) -> Option<&IndexMap<String, String>> {
        match &self.descriptor.kind {
            OptimizationKind::PredicatePushdown { field_mapping, .. } => field_mapping.as_ref(),
            _ => None,
        }
    }
}

impl Optimization for PredicatePushdown {
    fn descriptor(&self) -> &OptimizationDescriptor {
        &self.descriptor
    }

    fn activate(&self, ctx: &mut ActivationContext<'_>) -> Result<Activation> {
        match self.rewrite(ctx) {
            Ok(Some((_, after))) => {
                tracing::debug!(
                    optimization = %self.descriptor.name,
                    step = %self.descriptor.step_name,
                    filter = %after,
                    "pushed predicate into document scan"
                );
                Self::set_query(ctx, &self.descriptor.step_name, after);
                Ok(Activation::Modified)
            }
            Ok(None) => Ok(Activation::PassThrough),
            Err(e) if self.required => Err(match e {
                Error::UnsupportedPredicate(_) => e,
                other => self.error(other.to_string()),
            }),
            Err(e) => {
                tracing::warn!(
                    optimization = %self.descriptor.name,
                    error = %e,
                    "predicate not pushed down, scanning unfiltered"
                );
                Ok(Activation::PassThrough)
            }
        }
    }

    fn preview(&self, ctx: &mut ActivationContext<'_>) -> OptimizationPreview {
        let mut preview = OptimizationPreview::new(&self.descriptor);
        match self.rewrite(ctx) {
            Ok(Some((before, after))) => {
                preview.before = before;
                preview.after = after.clone();
                Self::set_query(ctx, &self.descriptor.step_name, after);
            }
            Ok(None) => {}
            Err(e) => preview.errors.push(e.to_string()),
        }
        preview
    }
}
