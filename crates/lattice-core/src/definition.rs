//! Service definitions — the declarative description of one injectable
//! service.
//!
//! A [`Definition`] names a service, declares the dependency names its init
//! function needs (`wants`), and says where the service is visible: a
//! [`Visibility`] tier (`module` / `plugin` / `public`) **or** a
//! [`SharedAccess`] allow-list. The two are mutually exclusive; declaring
//! both is a validation error surfaced at registration time.
//!
//! # Example
//!
//! ```rust,ignore
//! let repo = Definition::sync("user_repository", |args| {
//!     let db = args.get::<Database>("database")?;
//!     Ok(InitOutput::instance(UserRepository::new(db)))
//! })
//! .wants(["database"])
//! .with_scope(Visibility::Public);
//! ```

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use crate::compiler::Compiler;
use crate::error::{BoxError, DefinitionError, DefinitionResult};
use crate::service::{InitOutput, ResolvedArgs, ServiceInit};

// =============================================================================
// Visibility and shared access
// =============================================================================

/// The visibility tier of a scoped definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    /// Visible only inside the declaring module's compiler (the default).
    #[default]
    Module,
    /// Registered into the surrounding plugin's compiler; visible to every
    /// module of that plugin.
    Plugin,
    /// Registered into the root compiler; visible everywhere.
    Public,
}

impl Visibility {
    /// Returns the tier name used in logs and metadata.
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Module => "module",
            Visibility::Plugin => "plugin",
            Visibility::Public => "public",
        }
    }
}

/// An explicit allow-list for a shared definition.
///
/// Shared definitions live only in the shared compiler; resolution requires
/// the caller to appear in one of the lists. A definition carrying both
/// lists grants access via **either** predicate independently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharedAccess {
    /// Module names allowed to resolve the definition.
    pub modules: Vec<String>,
    /// Plugin names whose modules are allowed to resolve the definition.
    pub plugins: Vec<String>,
}

impl SharedAccess {
    /// Creates an allow-list for the given modules.
    pub fn modules<I, S>(modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            modules: modules.into_iter().map(Into::into).collect(),
            plugins: Vec::new(),
        }
    }

    /// Creates an allow-list for the given plugins.
    pub fn plugins<I, S>(plugins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            modules: Vec::new(),
            plugins: plugins.into_iter().map(Into::into).collect(),
        }
    }

    /// Extends the allow-list with plugin names.
    pub fn and_plugins<I, S>(mut self, plugins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.plugins.extend(plugins.into_iter().map(Into::into));
        self
    }

    /// Returns `true` when the named module is allowed.
    pub fn grants_module(&self, module: &str) -> bool {
        self.modules.iter().any(|m| m == module)
    }

    /// Returns `true` when the named plugin is allowed.
    pub fn grants_plugin(&self, plugin: &str) -> bool {
        self.plugins.iter().any(|p| p == plugin)
    }
}

// =============================================================================
// Definition
// =============================================================================

/// The declarative description of one injectable service.
#[derive(Clone)]
pub struct Definition {
    name: String,
    scope: Option<Visibility>,
    shared: Option<SharedAccess>,
    wants: Vec<String>,
    init: ServiceInit,
    cache: bool,
    dependencies: Vec<Definition>,
    compiler_pass: Option<CompilerPass>,
}

impl Definition {
    /// Creates a definition with a synchronous init function.
    pub fn sync<F>(name: impl Into<String>, init: F) -> Self
    where
        F: Fn(ResolvedArgs) -> Result<InitOutput, BoxError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            scope: None,
            shared: None,
            wants: Vec::new(),
            init: ServiceInit::Sync(Arc::new(init)),
            cache: true,
            dependencies: Vec::new(),
            compiler_pass: None,
        }
    }

    /// Creates a definition with an asynchronous init function.
    pub fn asynchronous<F, Fut>(name: impl Into<String>, init: F) -> Self
    where
        F: Fn(ResolvedArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<InitOutput, BoxError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            scope: None,
            shared: None,
            wants: Vec::new(),
            init: ServiceInit::Async(Arc::new(move |args| Box::pin(init(args)))),
            cache: true,
            dependencies: Vec::new(),
            compiler_pass: None,
        }
    }

    // ─── Builder methods ─────────────────────────────────────────────────────

    /// Declares the dependency names resolved before init runs.
    pub fn wants<I, S>(mut self, wants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.wants = wants.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the visibility tier. Mutually exclusive with
    /// [`shared_with`](Self::shared_with).
    pub fn with_scope(mut self, scope: Visibility) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Publishes the definition into the shared compiler under an explicit
    /// allow-list. Mutually exclusive with [`with_scope`](Self::with_scope).
    pub fn shared_with(mut self, access: SharedAccess) -> Self {
        self.shared = Some(access);
        self
    }

    /// Opts out of per-scope memoization; every resolution re-runs init.
    pub fn without_cache(mut self) -> Self {
        self.cache = false;
        self
    }

    /// Attaches inline private definitions, resolvable only while this
    /// definition instantiates. They are never memoized and never shared.
    pub fn with_dependencies(mut self, dependencies: Vec<Definition>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Attaches a one-time registration hook (see [`CompilerPass`]).
    pub fn with_compiler_pass(mut self, pass: CompilerPass) -> Self {
        self.compiler_pass = Some(pass);
        self
    }

    // ─── Queries ─────────────────────────────────────────────────────────────

    /// The definition name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared dependency names.
    pub fn wanted(&self) -> &[String] {
        &self.wants
    }

    /// The effective visibility tier; defaults to [`Visibility::Module`]
    /// when neither `scope` nor `shared` was declared.
    pub fn visibility(&self) -> Visibility {
        self.scope.unwrap_or_default()
    }

    /// The shared allow-list, if the definition is shared.
    pub fn shared_access(&self) -> Option<&SharedAccess> {
        self.shared.as_ref()
    }

    /// Returns `true` when the definition is published via an allow-list.
    pub fn is_shared(&self) -> bool {
        self.shared.is_some()
    }

    /// Returns `true` when the named module appears in the allow-list.
    pub fn is_shared_with_module(&self, module: &str) -> bool {
        self.shared
            .as_ref()
            .is_some_and(|s| s.grants_module(module))
    }

    /// Returns `true` when the named plugin appears in the allow-list.
    pub fn is_shared_with_plugin(&self, plugin: &str) -> bool {
        self.shared
            .as_ref()
            .is_some_and(|s| s.grants_plugin(plugin))
    }

    /// Returns `true` when inline private definitions are attached.
    pub fn has_dependencies(&self) -> bool {
        !self.dependencies.is_empty()
    }

    /// The inline private definitions.
    pub fn dependencies(&self) -> &[Definition] {
        &self.dependencies
    }

    /// Whether resolutions of this definition are memoized per scope.
    pub fn cache(&self) -> bool {
        self.cache
    }

    /// The init function.
    pub fn init(&self) -> &ServiceInit {
        &self.init
    }

    /// The attached compiler pass, if any.
    pub fn compiler_pass(&self) -> Option<&CompilerPass> {
        self.compiler_pass.as_ref()
    }

    /// A human-readable exposure description used in service metadata.
    pub(crate) fn exposure_description(&self) -> String {
        match &self.shared {
            Some(access) => format!(
                "shared with modules [{}] and plugins [{}]",
                access.modules.join(", "),
                access.plugins.join(", ")
            ),
            None => format!("{} scope", self.visibility().as_str()),
        }
    }

    // ─── Validation ──────────────────────────────────────────────────────────

    /// Validates the definition structurally.
    ///
    /// Checks the name, the scope/shared mutual exclusion, and recursively
    /// validates inline dependencies (including duplicate names within the
    /// inline list).
    pub fn validate(&self) -> DefinitionResult<()> {
        if self.name.is_empty() {
            return Err(DefinitionError::EmptyName);
        }
        if self.scope.is_some() && self.shared.is_some() {
            return Err(DefinitionError::ScopeAndShared(self.name.clone()));
        }
        validate_list(&self.dependencies)?;
        Ok(())
    }
}

impl std::fmt::Debug for Definition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Definition")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("shared", &self.shared)
            .field("wants", &self.wants)
            .field("cache", &self.cache)
            .field("dependencies", &self.dependencies.len())
            .field("has_compiler_pass", &self.compiler_pass.is_some())
            .finish()
    }
}

/// Validates every definition in a list and rejects duplicate names.
pub fn validate_list(definitions: &[Definition]) -> DefinitionResult<()> {
    for (i, definition) in definitions.iter().enumerate() {
        definition.validate()?;
        if definitions[..i].iter().any(|d| d.name == definition.name) {
            return Err(DefinitionError::Duplicate(definition.name.clone()));
        }
    }
    Ok(())
}

// =============================================================================
// Compiler pass
// =============================================================================

/// The restricted registration capability handed to a compiler pass.
///
/// A pass can only register sibling definitions into the scope that
/// triggered it; it structurally cannot compile anything — the type simply
/// has no such method.
pub struct PassContext<'a> {
    compiler: &'a Compiler,
}

impl<'a> PassContext<'a> {
    pub(crate) fn new(compiler: &'a Compiler) -> Self {
        Self { compiler }
    }

    /// Validates and registers a sibling definition into the triggering
    /// scope.
    pub fn register(&mut self, definition: Definition) -> DefinitionResult<()> {
        definition.validate()?;
        self.compiler.add(definition);
        Ok(())
    }
}

/// The pass function stored inside a [`CompilerPass`].
pub type PassFn =
    Arc<dyn Fn(&Value, &mut PassContext<'_>) -> DefinitionResult<()> + Send + Sync>;

/// A one-time hook run when its definition is registered into a scope.
///
/// The pass receives the application config (or the slice under
/// [`property`](Self::on_property) when set) and a restricted
/// [`PassContext`]. It runs exactly once per distinct registration — a
/// definition removed and re-added runs its pass again.
///
/// # Example
///
/// ```rust,ignore
/// let pass = CompilerPass::on_property("database", |config, ctx| {
///     ctx.register(Definition::sync("connection_pool", move |_| {
///         Ok(InitOutput::instance(Pool::from_config(config)?))
///     }))
/// });
/// ```
#[derive(Clone)]
pub struct CompilerPass {
    property: Option<String>,
    run: PassFn,
}

impl CompilerPass {
    /// Creates a pass that receives the whole application config.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn(&Value, &mut PassContext<'_>) -> DefinitionResult<()> + Send + Sync + 'static,
    {
        Self {
            property: None,
            run: Arc::new(run),
        }
    }

    /// Creates a pass that receives only the named config property.
    ///
    /// Registration fails with [`DefinitionError::MissingConfigProperty`]
    /// when the application config has no such property.
    pub fn on_property<F>(property: impl Into<String>, run: F) -> Self
    where
        F: Fn(&Value, &mut PassContext<'_>) -> DefinitionResult<()> + Send + Sync + 'static,
    {
        Self {
            property: Some(property.into()),
            run: Arc::new(run),
        }
    }

    /// The config property the pass is restricted to, if any.
    pub fn property(&self) -> Option<&str> {
        self.property.as_deref()
    }

    pub(crate) fn run(&self) -> &PassFn {
        &self.run
    }
}

impl std::fmt::Debug for CompilerPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilerPass")
            .field("property", &self.property)
            .finish_non_exhaustive()
    }
}
