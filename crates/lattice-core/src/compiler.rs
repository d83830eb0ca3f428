//! The scoped DI container.
//!
//! A [`Compiler`] holds an unresolved-definition map (`self_tree`) and a
//! resolved-instance cache. Compilers are linked into a hierarchy:
//!
//! ```text
//! module compiler ──parent──▶ plugin compiler
//!        │  │
//!        │  └──root──▶ root compiler        (public definitions)
//!        └─────shared──▶ shared compiler    (allow-listed definitions)
//! ```
//!
//! [`compile`](Compiler::compile) searches self → parent → root → shared,
//! instantiates on first access, and memoizes in the scope that owns the
//! definition. The **origin** compiler — the one the request started at —
//! is threaded through every delegation so that a definition's own `wants`
//! always resolve from the requester's point of view.
//!
//! Shared definitions additionally require the caller to pass the
//! permission check described on [`SharedAccess`]; the check runs on every
//! resolution, cached or not.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::definition::{Definition, PassContext, SharedAccess};
use crate::error::{DefinitionError, DefinitionResult, ResolveError, ResolveResult};
use crate::service::{
    InitOutput, ResolvedArgs, ResolvedService, ServiceInit, ServiceMetadata,
};

// =============================================================================
// Caller identity
// =============================================================================

/// The identity a resolution request carries for shared-scope permission
/// checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// The requesting module's name.
    pub module: String,
    /// The surrounding plugin's name, when the module runs inside one.
    pub plugin: Option<String>,
}

impl Caller {
    /// Identity of a standalone module.
    pub fn module(name: impl Into<String>) -> Self {
        Self {
            module: name.into(),
            plugin: None,
        }
    }

    /// Identity of a module running inside a plugin.
    pub fn in_plugin(module: impl Into<String>, plugin: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            plugin: Some(plugin.into()),
        }
    }
}

impl SharedAccess {
    /// Returns `true` when `caller` may resolve a definition carrying this
    /// allow-list: its module is listed, or it runs inside a listed plugin.
    /// The two predicates are independent; either one suffices.
    pub fn grants(&self, caller: &Caller) -> bool {
        if self.grants_module(&caller.module) {
            return true;
        }
        matches!(&caller.plugin, Some(plugin) if self.grants_plugin(plugin))
    }
}

// =============================================================================
// Compiler
// =============================================================================

/// A scoped dependency-injection container with lazy resolution and
/// per-scope memoization.
pub struct Compiler {
    name: String,
    self_tree: RwLock<HashMap<String, Definition>>,
    resolved: RwLock<HashMap<String, ResolvedService>>,
    parent: Option<Arc<Compiler>>,
    root: Option<Arc<Compiler>>,
    shared: Option<Arc<Compiler>>,
    /// Private compilers for inline dependency lists never memoize.
    memoize: bool,
}

impl Compiler {
    /// Creates a standalone compiler with no links — used for the root and
    /// shared scopes.
    pub fn standalone(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            self_tree: RwLock::new(HashMap::new()),
            resolved: RwLock::new(HashMap::new()),
            parent: None,
            root: None,
            shared: None,
            memoize: true,
        }
    }

    /// Creates a compiler linked into the hierarchy.
    pub fn scoped(
        name: impl Into<String>,
        parent: Option<Arc<Compiler>>,
        root: Option<Arc<Compiler>>,
        shared: Option<Arc<Compiler>>,
    ) -> Self {
        Self {
            name: name.into(),
            self_tree: RwLock::new(HashMap::new()),
            resolved: RwLock::new(HashMap::new()),
            parent,
            root,
            shared,
            memoize: true,
        }
    }

    /// Creates the ephemeral private compiler used to resolve a
    /// definition's inline dependency list. Inline definitions are visible
    /// only through this compiler and are never memoized.
    pub(crate) fn private(origin: Arc<Compiler>, definitions: &[Definition]) -> Self {
        let self_tree = definitions
            .iter()
            .map(|d| (d.name().to_string(), d.clone()))
            .collect();
        Self {
            name: format!("{}(private)", origin.name),
            self_tree: RwLock::new(self_tree),
            resolved: RwLock::new(HashMap::new()),
            parent: Some(origin),
            root: None,
            shared: None,
            memoize: false,
        }
    }

    /// The compiler's scope name (used in logs).
    pub fn name(&self) -> &str {
        &self.name
    }

    // ─── Registration ────────────────────────────────────────────────────────

    /// Stores an unresolved definition keyed by name. No validation is
    /// performed here; callers validate first.
    pub fn add(&self, definition: Definition) {
        trace!(
            compiler = %self.name,
            definition = definition.name(),
            "Definition added"
        );
        self.self_tree
            .write()
            .insert(definition.name().to_string(), definition);
    }

    /// Validates and stores a definition, then runs its compiler pass (if
    /// any) exactly once against `config`.
    ///
    /// The pass receives the whole config, or the slice under its declared
    /// property; a missing property is a registration failure.
    pub fn register(&self, definition: Definition, config: &serde_json::Value) -> DefinitionResult<()> {
        definition.validate()?;
        let name = definition.name().to_string();
        let pass = definition.compiler_pass().cloned();
        self.add(definition);

        if let Some(pass) = pass {
            let slice = match pass.property() {
                Some(property) => {
                    config
                        .get(property)
                        .ok_or_else(|| DefinitionError::MissingConfigProperty {
                            definition: name.clone(),
                            property: property.to_string(),
                        })?
                }
                None => config,
            };
            let mut ctx = PassContext::new(self);
            (pass.run())(slice, &mut ctx)?;
            debug!(compiler = %self.name, definition = %name, "Compiler pass executed");
        }
        Ok(())
    }

    // ─── Membership queries ──────────────────────────────────────────────────

    /// Returns `true` when this compiler's own tree holds `name`.
    pub fn has_own(&self, name: &str) -> bool {
        self.self_tree.read().contains_key(name)
    }

    /// Returns `true` when `name` is defined anywhere along the
    /// self → parent → root → shared chain.
    pub fn has(&self, name: &str) -> bool {
        if self.has_own(name) {
            return true;
        }
        if self.parent.as_ref().is_some_and(|p| p.has(name)) {
            return true;
        }
        if self.root.as_ref().is_some_and(|r| r.has(name)) {
            return true;
        }
        self.shared.as_ref().is_some_and(|s| s.has_own(name))
    }

    /// Returns `true` when `name` is already resolved anywhere along the
    /// chain.
    pub fn is_resolved(&self, name: &str) -> bool {
        if self.resolved.read().contains_key(name) {
            return true;
        }
        if self.parent.as_ref().is_some_and(|p| p.is_resolved(name)) {
            return true;
        }
        if self.root.as_ref().is_some_and(|r| r.is_resolved(name)) {
            return true;
        }
        self.shared
            .as_ref()
            .is_some_and(|s| s.resolved.read().contains_key(name))
    }

    /// Returns the diagnostic metadata of a service resolved in this
    /// compiler's own scope.
    pub fn metadata_of(&self, name: &str) -> Option<Arc<ServiceMetadata>> {
        self.resolved.read().get(name).map(|r| Arc::clone(&r.metadata))
    }

    fn shared_access_of(&self, name: &str) -> Option<SharedAccess> {
        self.self_tree
            .read()
            .get(name)
            .and_then(|d| d.shared_access().cloned())
    }

    // ─── Resolution ──────────────────────────────────────────────────────────

    /// Resolves `name` through the compiler chain.
    ///
    /// `origin` is the compiler the request started at; it is threaded
    /// through every delegation so the resolved definition's own `wants`
    /// search from the requester. `caller` carries the identity used for
    /// shared-scope permission checks.
    ///
    /// Typical entry point: `compiler.compile(name, &compiler, &caller)`.
    pub fn compile<'a>(
        self: &'a Arc<Self>,
        name: &'a str,
        origin: &'a Arc<Compiler>,
        caller: &'a Caller,
    ) -> BoxFuture<'a, ResolveResult<ResolvedService>> {
        Box::pin(async move {
            if name.is_empty() {
                return Err(ResolveError::InvalidName);
            }

            // Own cache first: instantiation is write-once per scope.
            if let Some(resolved) = self.resolved.read().get(name).cloned() {
                return Ok(resolved);
            }

            let definition = self.self_tree.read().get(name).cloned();
            if let Some(definition) = definition {
                let resolved = self.instantiate(&definition, origin, caller).await?;
                if self.memoize && definition.cache() {
                    let mut cache = self.resolved.write();
                    // First instantiation wins; concurrent awaiters converge
                    // on the cached instance.
                    return Ok(cache
                        .entry(name.to_string())
                        .or_insert(resolved)
                        .clone());
                }
                return Ok(resolved);
            }

            if let Some(parent) = &self.parent
                && parent.has(name)
            {
                return parent.compile(name, origin, caller).await;
            }

            if let Some(root) = &self.root
                && root.has(name)
            {
                return root.compile(name, origin, caller).await;
            }

            if let Some(shared) = &self.shared
                && shared.has_own(name)
            {
                if let Some(access) = shared.shared_access_of(name)
                    && !access.grants(caller)
                {
                    return Err(ResolveError::Unauthorized {
                        service: name.to_string(),
                        module: caller.module.clone(),
                        plugin: caller.plugin.clone(),
                    });
                }
                return shared.compile(name, origin, caller).await;
            }

            Err(ResolveError::NotFound(name.to_string()))
        })
    }

    /// Instantiates a definition found in this compiler's own tree.
    async fn instantiate(
        self: &Arc<Self>,
        definition: &Definition,
        origin: &Arc<Compiler>,
        caller: &Caller,
    ) -> ResolveResult<ResolvedService> {
        trace!(
            compiler = %self.name,
            service = definition.name(),
            "Instantiating service"
        );

        // Inline dependency lists resolve through an ephemeral private
        // compiler layered over the origin.
        let scope: Arc<Compiler> = if definition.has_dependencies() {
            Arc::new(Compiler::private(
                Arc::clone(origin),
                definition.dependencies(),
            ))
        } else {
            Arc::clone(origin)
        };

        let args = resolve_wants(&scope, definition.wanted(), caller).await?;

        let output = match definition.init() {
            ServiceInit::Sync(init) => init(args),
            ServiceInit::Async(init) => init(args).await,
        }
        .map_err(|e| ResolveError::Init {
            service: definition.name().to_string(),
            message: e.to_string(),
        })?;

        // Injection adapters trigger a second resolution pass.
        let instance = match output {
            InitOutput::Instance(instance) => instance,
            InitOutput::Constructor { wants, build } => {
                let args = resolve_wants(&scope, &wants, caller).await?;
                build(args).map_err(|e| ResolveError::Init {
                    service: definition.name().to_string(),
                    message: e.to_string(),
                })?
            }
            InitOutput::Property { wants, assign } => {
                let args = resolve_wants(&scope, &wants, caller).await?;
                assign(args).map_err(|e| ResolveError::Init {
                    service: definition.name().to_string(),
                    message: e.to_string(),
                })?
            }
            InitOutput::Method { wants, bind } => {
                let args = resolve_wants(&scope, &wants, caller).await?;
                bind(args).map_err(|e| ResolveError::Init {
                    service: definition.name().to_string(),
                    message: e.to_string(),
                })?
            }
        };

        debug!(
            compiler = %self.name,
            service = definition.name(),
            cached = definition.cache() && self.memoize,
            "Service resolved"
        );

        Ok(ResolvedService {
            instance,
            metadata: Arc::new(ServiceMetadata {
                name: definition.name().to_string(),
                wants: definition.wanted().to_vec(),
                exposure: definition.exposure_description(),
            }),
        })
    }
}

impl std::fmt::Debug for Compiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compiler")
            .field("name", &self.name)
            .field("definitions", &self.self_tree.read().len())
            .field("resolved", &self.resolved.read().len())
            .field("has_parent", &self.parent.is_some())
            .field("has_root", &self.root.is_some())
            .field("has_shared", &self.shared.is_some())
            .finish()
    }
}

/// Resolves a list of declared names from `scope`, collecting them into a
/// [`ResolvedArgs`] bag.
async fn resolve_wants(
    scope: &Arc<Compiler>,
    wants: &[String],
    caller: &Caller,
) -> ResolveResult<ResolvedArgs> {
    let mut args = ResolvedArgs::new();
    for want in wants {
        let resolved = scope.compile(want, scope, caller).await?;
        args.insert(want.clone(), resolved.instance);
    }
    Ok(args)
}
