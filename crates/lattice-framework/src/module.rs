//! Module declarations and their runtime counterpart.
//!
//! A [`ModuleSpec`] is the declarative description of one module: its
//! service definitions, its event handlers, and its five middleware
//! blocks. Adding the spec to a tree constructs a runtime [`Module`]:
//! the module compiler is created and linked, every definition is
//! registered into the scope its visibility names (running compiler
//! passes as it lands), and the blocks are prepared for execution.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use lattice_core::{validate_list, Caller, Compiler, Definition, ServiceArc, Visibility};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::engine::{self, Entry};
use crate::error::{MiddlewareResult, ModuleDefinitionError, ModuleResult};
use crate::events::{Emitter, Mediator, ON_ERROR_EVENT};
use crate::expression;
use crate::invocation::Invocation;
use crate::middleware::{Block, BoxedMiddleware, Middleware};
use crate::state::State;

/// Want names satisfied ambiently through [`Invocation`] itself; declaring
/// them is redundant and rejected at add time.
const AMBIENT_NAMES: [&str; 2] = ["state", "http"];

// ============================================================================
// Scope links
// ============================================================================

/// The root and shared compilers every module and plugin links against.
#[derive(Clone)]
pub struct ScopeLinks {
    pub root: Arc<Compiler>,
    pub shared: Arc<Compiler>,
}

impl ScopeLinks {
    /// Creates a fresh pair of root and shared compilers.
    pub fn new() -> Self {
        Self {
            root: Arc::new(Compiler::standalone("root")),
            shared: Arc::new(Compiler::standalone("shared")),
        }
    }
}

impl Default for ScopeLinks {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// ModuleSpec
// ============================================================================

/// The declarative description of one module.
#[derive(Clone, Default)]
pub struct ModuleSpec {
    name: String,
    route: Option<String>,
    model_name: Option<String>,
    dependencies: Vec<Definition>,
    mediator: Vec<(String, BoxedMiddleware)>,
    emitter: Vec<(String, BoxedMiddleware)>,
    blocks: [Vec<Middleware>; 5],
}

impl ModuleSpec {
    /// Starts a spec for the named module.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    // ─── Builder methods ─────────────────────────────────────────────────────

    /// Marks the module as transport-facing under the given route.
    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    /// Names the data model the module works against.
    pub fn with_model_name(mut self, model: impl Into<String>) -> Self {
        self.model_name = Some(model.into());
        self
    }

    /// Declares the module's service definitions.
    pub fn with_dependencies(mut self, dependencies: Vec<Definition>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Binds a mediator event handler.
    pub fn on_mediator(mut self, event: impl Into<String>, handler: BoxedMiddleware) -> Self {
        self.mediator.push((event.into(), handler));
        self
    }

    /// Binds an emitter event handler.
    pub fn on_emitter(mut self, event: impl Into<String>, handler: BoxedMiddleware) -> Self {
        self.emitter.push((event.into(), handler));
        self
    }

    /// Fills the `security` block.
    pub fn with_security(self, entries: impl IntoIterator<Item = Middleware>) -> Self {
        self.with_block(Block::Security, entries)
    }

    /// Fills the `pre_logic_transformers` block.
    pub fn with_pre_logic_transformers(
        self,
        entries: impl IntoIterator<Item = Middleware>,
    ) -> Self {
        self.with_block(Block::PreLogicTransformers, entries)
    }

    /// Fills the `validators` block.
    pub fn with_validators(self, entries: impl IntoIterator<Item = Middleware>) -> Self {
        self.with_block(Block::Validators, entries)
    }

    /// Fills the `module_logic` block.
    pub fn with_module_logic(self, entries: impl IntoIterator<Item = Middleware>) -> Self {
        self.with_block(Block::ModuleLogic, entries)
    }

    /// Fills the `post_logic_transformers` block.
    pub fn with_post_logic_transformers(
        self,
        entries: impl IntoIterator<Item = Middleware>,
    ) -> Self {
        self.with_block(Block::PostLogicTransformers, entries)
    }

    /// Fills an arbitrary block.
    pub fn with_block(mut self, block: Block, entries: impl IntoIterator<Item = Middleware>) -> Self {
        self.blocks[block.index()] = entries.into_iter().collect();
        self
    }

    // ─── Queries ─────────────────────────────────────────────────────────────

    /// The module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The route, when the module is transport-facing.
    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    /// The declared model name, if any.
    pub fn model_name(&self) -> Option<&str> {
        self.model_name.as_deref()
    }

    /// The declared service definitions.
    pub fn dependencies(&self) -> &[Definition] {
        &self.dependencies
    }

    /// The entries of one block.
    pub fn block(&self, block: Block) -> &[Middleware] {
        &self.blocks[block.index()]
    }

    pub(crate) fn block_mut(&mut self, block: Block) -> &mut Vec<Middleware> {
        &mut self.blocks[block.index()]
    }

    // ─── Validation ──────────────────────────────────────────────────────────

    /// Validates the spec structurally, before any construction side
    /// effect.
    pub(crate) fn validate(&self, in_plugin: bool) -> ModuleResult<()> {
        if self.name.is_empty() {
            return Err(ModuleDefinitionError::EmptyName);
        }
        validate_list(&self.dependencies)?;

        if !in_plugin {
            for definition in &self.dependencies {
                if !definition.is_shared() && definition.visibility() == Visibility::Plugin {
                    return Err(ModuleDefinitionError::PluginScopeOutsidePlugin {
                        module: self.name.clone(),
                        definition: definition.name().to_string(),
                    });
                }
            }
        }

        for block in Block::ORDER {
            let mut seen = HashSet::new();
            for entry in self.block(block) {
                if let Some(name) = entry.name()
                    && !seen.insert(name.to_string())
                {
                    return Err(ModuleDefinitionError::DuplicateMiddleware {
                        module: self.name.clone(),
                        middleware: name.to_string(),
                    });
                }
                self.validate_entry(entry)?;
            }
        }
        Ok(())
    }

    fn validate_entry(&self, entry: &Middleware) -> ModuleResult<()> {
        let wants: &[String] = match entry {
            Middleware::Handler { wants, .. } => wants,
            Middleware::Expression { raw } => {
                return match expression::parse(raw) {
                    Ok(parsed) => {
                        for want in &parsed.wants {
                            self.check_ambient(&parsed.service, want)?;
                        }
                        Ok(())
                    }
                    Err(reason) => Err(ModuleDefinitionError::Expression {
                        module: self.name.clone(),
                        expression: raw.clone(),
                        reason,
                    }),
                };
            }
        };
        for want in wants {
            self.check_ambient(&entry.label(), want)?;
        }
        Ok(())
    }

    fn check_ambient(&self, middleware: &str, want: &str) -> ModuleResult<()> {
        if AMBIENT_NAMES.contains(&want) {
            return Err(ModuleDefinitionError::ReservedWant {
                module: self.name.clone(),
                middleware: middleware.to_string(),
                name: want.to_string(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for ModuleSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleSpec")
            .field("name", &self.name)
            .field("route", &self.route)
            .field("dependencies", &self.dependencies.len())
            .field("mediator_events", &self.mediator.len())
            .field("emitter_events", &self.emitter.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Runtime module
// ============================================================================

/// A constructed module: linked compiler, prepared blocks, bound events.
pub struct Module {
    name: String,
    route: Option<String>,
    caller: Caller,
    compiler: Arc<Compiler>,
    blocks: [Vec<Entry>; 5],
    mediator: Mediator,
    emitter: Emitter,
}

impl Module {
    /// Constructs the runtime module from a validated spec.
    ///
    /// `parent` is the plugin compiler when the module runs inside a
    /// plugin; definitions land in the scope their visibility names, and
    /// compiler passes fire here, at add time.
    pub(crate) fn build(
        spec: &ModuleSpec,
        parent: Option<Arc<Compiler>>,
        links: &ScopeLinks,
        config: &Value,
        plugin: Option<&str>,
    ) -> ModuleResult<Module> {
        spec.validate(plugin.is_some())?;

        let caller = match plugin {
            Some(p) => Caller::in_plugin(spec.name(), p),
            None => Caller::module(spec.name()),
        };
        let compiler = Arc::new(Compiler::scoped(
            spec.name(),
            parent.clone(),
            Some(Arc::clone(&links.root)),
            Some(Arc::clone(&links.shared)),
        ));

        for definition in spec.dependencies() {
            let target = if definition.is_shared() {
                &links.shared
            } else {
                match definition.visibility() {
                    Visibility::Module => &compiler,
                    // Validation guarantees a parent exists here.
                    Visibility::Plugin => parent.as_ref().ok_or_else(|| {
                        ModuleDefinitionError::PluginScopeOutsidePlugin {
                            module: spec.name().to_string(),
                            definition: definition.name().to_string(),
                        }
                    })?,
                    Visibility::Public => &links.root,
                }
            };
            target.register(definition.clone(), config)?;
        }

        let mut mediator = Mediator::new(spec.name());
        for (event, handler) in &spec.mediator {
            mediator.add(event.clone(), handler.clone())?;
        }
        let mut emitter = Emitter::new(spec.name());
        for (event, handler) in &spec.emitter {
            emitter.add(event.clone(), handler.clone())?;
        }

        let blocks = prepare_blocks(spec)?;

        debug!(module = spec.name(), plugin = plugin.unwrap_or("-"), "Module constructed");
        Ok(Module {
            name: spec.name().to_string(),
            route: spec.route.clone(),
            caller,
            compiler,
            blocks,
            mediator,
            emitter,
        })
    }

    /// The module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` when the module is bound to a transport route.
    pub fn is_http(&self) -> bool {
        self.route.is_some()
    }

    /// Returns `true` when the module binds any mediator events.
    pub fn has_mediators(&self) -> bool {
        !self.mediator.is_empty()
    }

    /// Returns `true` when the module binds any emitter events.
    pub fn has_emitters(&self) -> bool {
        !self.emitter.is_empty()
    }

    /// Returns `true` when the module was constructed inside a plugin.
    pub fn is_in_plugin(&self) -> bool {
        self.caller.plugin.is_some()
    }

    /// The module's own compiler.
    pub fn compiler(&self) -> &Arc<Compiler> {
        &self.compiler
    }

    /// The module's emitter, for firing domain events from outside.
    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    /// Runs the five blocks against a fresh state and returns the state's
    /// final contents.
    ///
    /// A failed run first consults the module's own `on_error` mediator
    /// event; a successful handler makes the error handled and the run
    /// completes with whatever state was reached.
    pub async fn run(&self, http: Option<&ServiceArc>) -> MiddlewareResult<Map<String, Value>> {
        let state = State::new();
        debug!(module = %self.name, "Module run started");

        let outcome = engine::run_blocks(
            &self.name,
            &self.blocks,
            &self.compiler,
            &self.caller,
            &state,
            http,
        )
        .await;

        if let Err(error) = outcome {
            if !self.mediator.has(ON_ERROR_EVENT) {
                return Err(error);
            }
            warn!(module = %self.name, error = %error, "Module run failed, handling on_error");
            let mut invocation =
                Invocation::new(state.clone()).with_error(Arc::new(error));
            if let Some(http) = http {
                invocation = invocation.with_http(Arc::clone(http));
            }
            self.mediator.emit(ON_ERROR_EVENT, invocation).await?;
        }

        Ok(state.snapshot())
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("route", &self.route)
            .field("in_plugin", &self.caller.plugin)
            .finish_non_exhaustive()
    }
}

fn prepare_blocks(spec: &ModuleSpec) -> ModuleResult<[Vec<Entry>; 5]> {
    let mut prepared: [Vec<Entry>; 5] = Default::default();
    for block in Block::ORDER {
        for entry in spec.block(block) {
            let entry = match entry {
                Middleware::Handler {
                    name,
                    wants,
                    disabled,
                    service,
                } => Entry::Handler {
                    label: name.clone().unwrap_or_else(|| "<anonymous>".to_string()),
                    wants: wants.clone(),
                    disabled: *disabled,
                    service: service.clone(),
                },
                Middleware::Expression { raw } => {
                    let parsed = expression::parse(raw).map_err(|reason| {
                        ModuleDefinitionError::Expression {
                            module: spec.name().to_string(),
                            expression: raw.clone(),
                            reason,
                        }
                    })?;
                    Entry::Service {
                        label: raw.clone(),
                        service: parsed.service,
                        wants: parsed.wants,
                    }
                }
            };
            prepared[block.index()].push(entry);
        }
    }
    Ok(prepared)
}

// ============================================================================
// Runnable
// ============================================================================

/// A tree entity that can be executed, contributing per-module states to
/// the aggregate run result.
#[async_trait]
pub trait Runnable: Send + Sync {
    /// The entity name.
    fn name(&self) -> &str;

    /// Runs the entity to completion, returning its state contributions
    /// keyed by module name.
    async fn run_contrib(&self, http: Option<&ServiceArc>)
        -> MiddlewareResult<Map<String, Value>>;
}

#[async_trait]
impl Runnable for Module {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run_contrib(
        &self,
        http: Option<&ServiceArc>,
    ) -> MiddlewareResult<Map<String, Value>> {
        let state = self.run(http).await?;
        let mut contrib = Map::new();
        contrib.insert(self.name.clone(), Value::Object(state));
        Ok(contrib)
    }
}
