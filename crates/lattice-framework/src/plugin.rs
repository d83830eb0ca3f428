//! Plugin declarations and their runtime counterpart.
//!
//! A plugin groups modules behind one shared plugin compiler: definitions
//! a child declares with plugin visibility become visible to every sibling
//! module. The plugin additionally carries its own mediator (consulted for
//! `on_error` when a child fails without handling it) and may expose
//! mediator events to the rest of the application.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use lattice_core::{Compiler, ServiceArc};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{MiddlewareResult, PluginDefinitionError, PluginResult};
use crate::events::{ExposedMediator, Mediator, ON_ERROR_EVENT};
use crate::invocation::Invocation;
use crate::middleware::BoxedMiddleware;
use crate::module::{Module, ModuleSpec, Runnable, ScopeLinks};
use crate::state::State;

// ============================================================================
// PluginSpec
// ============================================================================

/// The declarative description of one plugin.
#[derive(Clone, Default)]
pub struct PluginSpec {
    name: String,
    modules: Vec<ModuleSpec>,
    mediator: Vec<(String, BoxedMiddleware)>,
    exposed_mediators: Vec<String>,
}

impl PluginSpec {
    /// Starts a spec for the named plugin.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Declares the plugin's child modules.
    pub fn with_modules(mut self, modules: Vec<ModuleSpec>) -> Self {
        self.modules = modules;
        self
    }

    /// Appends one child module.
    pub fn add_module(mut self, module: ModuleSpec) -> Self {
        self.modules.push(module);
        self
    }

    /// Binds a plugin-level mediator event handler.
    pub fn on_mediator(mut self, event: impl Into<String>, handler: BoxedMiddleware) -> Self {
        self.mediator.push((event.into(), handler));
        self
    }

    /// Declares an event name exposed to the rest of the application.
    pub fn expose(mut self, event: impl Into<String>) -> Self {
        self.exposed_mediators.push(event.into());
        self
    }

    /// The plugin name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The child module specs.
    pub fn modules(&self) -> &[ModuleSpec] {
        &self.modules
    }

    /// The exposed event names.
    pub fn exposed_mediators(&self) -> &[String] {
        &self.exposed_mediators
    }
}

impl std::fmt::Debug for PluginSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginSpec")
            .field("name", &self.name)
            .field("modules", &self.modules.len())
            .field("exposed_mediators", &self.exposed_mediators)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Runtime plugin
// ============================================================================

/// A constructed plugin: its compiler, its child modules, its events.
pub struct Plugin {
    name: String,
    compiler: Arc<Compiler>,
    modules: Vec<Module>,
    mediator: Mediator,
    exposed: Vec<String>,
}

impl Plugin {
    /// Constructs the runtime plugin from a validated spec.
    ///
    /// Child modules are constructed with the plugin compiler as parent;
    /// exposed event names are declared on the application's
    /// [`ExposedMediator`].
    pub(crate) fn build(
        spec: &PluginSpec,
        links: &ScopeLinks,
        config: &Value,
        exposed: &ExposedMediator,
    ) -> PluginResult<Plugin> {
        if spec.name.is_empty() {
            return Err(PluginDefinitionError::EmptyName);
        }
        let mut seen = HashSet::new();
        for module in &spec.modules {
            if !seen.insert(module.name().to_string()) {
                return Err(PluginDefinitionError::Module {
                    plugin: spec.name.clone(),
                    source: crate::error::ModuleDefinitionError::Duplicate(
                        module.name().to_string(),
                    ),
                });
            }
        }

        let compiler = Arc::new(Compiler::scoped(
            spec.name(),
            None,
            Some(Arc::clone(&links.root)),
            Some(Arc::clone(&links.shared)),
        ));

        let mut modules = Vec::with_capacity(spec.modules.len());
        for module_spec in &spec.modules {
            let module = Module::build(
                module_spec,
                Some(Arc::clone(&compiler)),
                links,
                config,
                Some(spec.name()),
            )
            .map_err(|source| PluginDefinitionError::Module {
                plugin: spec.name.clone(),
                source,
            })?;
            modules.push(module);
        }

        let mut mediator = Mediator::new(spec.name());
        for (event, handler) in &spec.mediator {
            mediator.add(event.clone(), handler.clone())?;
        }

        for event in &spec.exposed_mediators {
            exposed.add(event.clone())?;
        }

        debug!(plugin = spec.name(), modules = modules.len(), "Plugin constructed");
        Ok(Plugin {
            name: spec.name().to_string(),
            compiler,
            modules,
            mediator,
            exposed: spec.exposed_mediators.clone(),
        })
    }

    /// The plugin name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` when the plugin has child modules.
    pub fn has_modules(&self) -> bool {
        !self.modules.is_empty()
    }

    /// Returns `true` when the plugin binds any mediator events.
    pub fn has_mediators(&self) -> bool {
        !self.mediator.is_empty()
    }

    /// Returns `true` when the plugin exposes mediator events.
    pub fn has_exposed_mediators(&self) -> bool {
        !self.exposed.is_empty()
    }

    /// The plugin's compiler, shared by every child module as parent scope.
    pub fn compiler(&self) -> &Arc<Compiler> {
        &self.compiler
    }

    /// The exposed event names, used to undeclare them on removal.
    pub(crate) fn exposed(&self) -> &[String] {
        &self.exposed
    }

    /// Runs every child module sequentially, in declaration order.
    ///
    /// A child failure unhandled at the module level consults the plugin's
    /// `on_error` mediator event; a successful handler lets the remaining
    /// modules run.
    pub async fn run(&self, http: Option<&ServiceArc>) -> MiddlewareResult<Map<String, Value>> {
        let mut aggregate = Map::new();
        for module in &self.modules {
            match module.run(http).await {
                Ok(state) => {
                    aggregate.insert(module.name().to_string(), Value::Object(state));
                }
                Err(error) => {
                    if !self.mediator.has(ON_ERROR_EVENT) {
                        return Err(error);
                    }
                    warn!(
                        plugin = %self.name,
                        module = module.name(),
                        error = %error,
                        "Module failed, handling plugin on_error"
                    );
                    let invocation =
                        Invocation::new(State::new()).with_error(Arc::new(error));
                    self.mediator.emit(ON_ERROR_EVENT, invocation).await?;
                }
            }
        }
        Ok(aggregate)
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("modules", &self.modules.len())
            .field("exposed", &self.exposed)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Runnable for Plugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run_contrib(
        &self,
        http: Option<&ServiceArc>,
    ) -> MiddlewareResult<Map<String, Value>> {
        self.run(http).await
    }
}
