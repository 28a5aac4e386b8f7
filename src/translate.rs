//! Library entry point: trace plus metadata in, SQL text out.
//!
//! ```text
//! filter trace ──► segment ─► assemble ─► structure ──┐
//!                                                      ├─► classify ─► build ─► render
//! selection trace ──► evaluate ───────────────────────┘
//! ```
//!
//! Nested query operands run through the same pipeline up to `build`, with
//! the same metadata and registry, and are rendered inside their parent.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::cache::TranslationCache;
use crate::cfg::{evaluate_selection, structure_filter};
use crate::classifier::function_registry::FunctionRegistry;
use crate::classifier::query_classifier::classify_query;
use crate::error::Result;
use crate::generator::ir::QueryAst;
use crate::generator::query_builder::build_query;
use crate::metadata::{AliasContext, EntityMetadata};
use crate::output::{Dialect, QuoteStyle, RenderedQuery, Renderer};
use crate::trace::{Literal, Opcode, QueryTrace};

static BUILTIN_REGISTRY: Lazy<FunctionRegistry> = Lazy::new(FunctionRegistry::new);

/// Rendering options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslateOptions {
    /// Identifier quoting.
    pub quote: QuoteStyle,
    /// Replace string and numeric literals with numbered placeholders.
    pub parameterize: bool,
}

/// Configured translation pipeline over one metadata provider.
pub struct Translator<'a, M: EntityMetadata + ?Sized> {
    metadata: &'a M,
    registry: &'a FunctionRegistry,
    options: TranslateOptions,
    cache: Option<&'a TranslationCache>,
}

impl<'a, M: EntityMetadata + ?Sized> Translator<'a, M> {
    /// Translator with the built-in function registry, default options and
    /// no cache.
    pub fn new(metadata: &'a M) -> Self {
        Self {
            metadata,
            registry: &BUILTIN_REGISTRY,
            options: TranslateOptions::default(),
            cache: None,
        }
    }

    /// Use a custom function registry.
    #[must_use]
    pub fn with_registry(mut self, registry: &'a FunctionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Use the given options.
    #[must_use]
    pub fn with_options(mut self, options: TranslateOptions) -> Self {
        self.options = options;
        self
    }

    /// Memoize successful translations. Ignored when the metadata provider
    /// has no fingerprint.
    #[must_use]
    pub fn with_cache(mut self, cache: &'a TranslationCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Translate one trace.
    #[instrument(level = "debug", skip_all, name = "trace2sql::translate")]
    pub fn translate(&self, trace: &QueryTrace) -> Result<RenderedQuery> {
        let cached = self
            .cache
            .and_then(|cache| self.fingerprint(trace).map(|key| (cache, key)));

        if let Some((cache, key)) = &cached {
            if let Some(hit) = cache.get(key) {
                debug!("cache hit");
                return Ok(hit.as_ref().clone());
            }
        }

        let rendered = self.run(trace)?;
        if let Some((cache, key)) = cached {
            cache.insert(key, rendered.clone());
        }
        Ok(rendered)
    }

    fn run(&self, trace: &QueryTrace) -> Result<RenderedQuery> {
        let ast = self.plan(trace)?;
        let rendered =
            Renderer::new(Dialect::new(self.options.quote), self.options.parameterize).render(&ast);
        debug!(sql = %rendered.sql, parameters = rendered.parameters.len(), "rendered");
        Ok(rendered)
    }

    #[instrument(
        level = "trace",
        skip_all,
        name = "trace2sql::plan",
        fields(entities = trace.entities.len())
    )]
    fn plan(&self, trace: &QueryTrace) -> Result<QueryAst> {
        let filter = if trace.has_filter() {
            Some(structure_filter(&trace.filter)?)
        } else {
            None
        };
        let selection = evaluate_selection(&trace.selection)?;
        let aliases = AliasContext::bind(&trace.entities, self.metadata)?;
        let subqueries = |nested: &QueryTrace| self.plan(nested);
        let classified =
            classify_query(selection, filter, &aliases, self.registry, Some(&subqueries))?;
        build_query(classified, &aliases)
    }

    fn fingerprint(&self, trace: &QueryTrace) -> Option<String> {
        // Non-finite floats all serialize as `null`.
        if has_non_finite_float(trace) {
            return None;
        }
        let metadata = self.metadata.fingerprint()?;
        let trace = serde_json::to_string(trace).ok()?;
        let options = serde_json::to_string(&self.options).ok()?;
        Some(format!(
            "{trace}\n{metadata}\n{}\n{options}",
            self.registry.fingerprint()
        ))
    }
}

fn has_non_finite_float(trace: &QueryTrace) -> bool {
    trace
        .selection
        .iter()
        .chain(&trace.filter)
        .any(|instruction| match &instruction.opcode {
            Opcode::LoadConst {
                value: Literal::Float(value),
            } => !value.is_finite(),
            Opcode::LoadSubquery { query } => has_non_finite_float(query),
            _ => false,
        })
}

/// Translate with the built-in function registry and default options.
pub fn translate<M: EntityMetadata + ?Sized>(
    trace: &QueryTrace,
    metadata: &M,
) -> Result<RenderedQuery> {
    Translator::new(metadata).translate(trace)
}
