//! The application shell.
//!
//! An [`App`] owns the whole object graph: configuration, the root and
//! shared compilers, the module and plugin trees, the exposed-mediator
//! surface and the lifecycle handlers. Nothing is global; dropping the app
//! drops every scope and cached service with it.
//!
//! # Example
//!
//! ```rust,ignore
//! use lattice_runtime::App;
//!
//! #[tokio::main]
//! async fn main() -> lattice_runtime::AppResult<()> {
//!     let mut app = App::from_default_config()?;
//!     app.add_module(orders_module())?;
//!     app.add_plugin(billing_plugin())?;
//!     let states = app.run().await?;
//!     println!("{states:?}");
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use lattice_core::ServiceArc;
use lattice_framework::{
    BoxedMiddleware, ExposedMediator, Invocation, MiddlewareError, ModuleSpec, ModuleTree,
    PluginSpec, PluginTree, ScopeLinks, State,
};
use serde_json::{Map, Value};
use tower::Service;
use tracing::{info, warn};

use crate::config::{AppConfig, ConfigLoader};
use crate::error::{AppError, AppResult};
use crate::logging;

/// What the execution factory supplies for one startup: the opaque
/// transport bundle handed to every middleware as the `http` ambient.
#[derive(Default)]
pub struct ExecutionContext {
    pub http: Option<ServiceArc>,
}

impl ExecutionContext {
    /// A context with no transport bundle — process mode.
    pub fn process() -> Self {
        Self::default()
    }

    /// A context carrying an opaque transport bundle.
    pub fn with_http(http: ServiceArc) -> Self {
        Self { http: Some(http) }
    }
}

/// The assembled application.
pub struct App {
    config: AppConfig,
    links: ScopeLinks,
    exposed: Arc<ExposedMediator>,
    modules: ModuleTree,
    plugins: PluginTree,
    on_app_started: Option<BoxedMiddleware>,
    catch_error: Option<BoxedMiddleware>,
    on_exit: Option<BoxedMiddleware>,
}

impl App {
    /// Creates an app over the given configuration.
    pub fn new(config: AppConfig) -> Self {
        let links = ScopeLinks::new();
        let exposed = Arc::new(ExposedMediator::new());
        let modules = ModuleTree::new(links.clone(), config.custom.clone());
        let plugins = PluginTree::new(links.clone(), config.custom.clone(), Arc::clone(&exposed));
        Self {
            config,
            links,
            exposed,
            modules,
            plugins,
            on_app_started: None,
            catch_error: None,
            on_exit: None,
        }
    }

    /// Creates an app from layered configuration (defaults, config file,
    /// `LATTICE_*` environment).
    pub fn from_default_config() -> AppResult<Self> {
        let config = ConfigLoader::new().load()?;
        Ok(Self::new(config))
    }

    /// Initializes logging from the app's configuration. Tolerant of
    /// double initialization.
    pub fn init_logging(&self) {
        logging::init_from_config(&self.config.logging);
    }

    /// The app configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The root and shared compilers.
    pub fn links(&self) -> &ScopeLinks {
        &self.links
    }

    /// The cross-plugin event surface.
    pub fn exposed_mediator(&self) -> &Arc<ExposedMediator> {
        &self.exposed
    }

    // ─── Lifecycle handlers ──────────────────────────────────────────────────

    /// Binds the handler fired after both trees complete successfully.
    pub fn on_app_started(mut self, handler: BoxedMiddleware) -> Self {
        self.on_app_started = Some(handler);
        self
    }

    /// Binds the last-resort error handler. A successful invocation makes
    /// the error handled; startup then returns the partial aggregate.
    pub fn catch_error(mut self, handler: BoxedMiddleware) -> Self {
        self.catch_error = Some(handler);
        self
    }

    /// Binds the handler fired when startup completes, successfully or
    /// not. Its own errors are logged and discarded.
    pub fn on_exit(mut self, handler: BoxedMiddleware) -> Self {
        self.on_exit = Some(handler);
        self
    }

    // ─── Module API ──────────────────────────────────────────────────────────

    /// Validates and registers a standalone module; compiler passes fire
    /// now.
    pub fn add_module(&mut self, spec: ModuleSpec) -> AppResult<()> {
        self.modules.add(spec)?;
        Ok(())
    }

    /// Merges middleware overrides into a registered module.
    pub fn override_module(&mut self, patch: ModuleSpec) -> AppResult<()> {
        self.modules.override_module(patch)?;
        Ok(())
    }

    /// Returns a detached clone of a registered module spec.
    pub fn get_module(&self, name: &str) -> Option<ModuleSpec> {
        self.modules.get(name)
    }

    /// Removes a module.
    pub fn remove_module(&mut self, name: &str) -> AppResult<()> {
        self.modules.remove(name)?;
        Ok(())
    }

    /// Returns `true` when the named module is registered.
    pub fn has_module(&self, name: &str) -> bool {
        self.modules.has(name)
    }

    /// Module names, in insertion order.
    pub fn module_names(&self) -> Vec<String> {
        self.modules.names()
    }

    // ─── Plugin API ──────────────────────────────────────────────────────────

    /// Validates and registers a plugin, declaring its exposed events.
    pub fn add_plugin(&mut self, spec: PluginSpec) -> AppResult<()> {
        self.plugins.add(spec)?;
        Ok(())
    }

    /// Returns a detached clone of a registered plugin spec.
    pub fn get_plugin(&self, name: &str) -> Option<PluginSpec> {
        self.plugins.get(name)
    }

    /// Removes a plugin, undeclaring its exposed events.
    pub fn remove_plugin(&mut self, name: &str) -> AppResult<()> {
        self.plugins.remove(name)?;
        Ok(())
    }

    /// Returns `true` when the named plugin is registered.
    pub fn has_plugin(&self, name: &str) -> bool {
        self.plugins.has(name)
    }

    /// Plugin names, in insertion order.
    pub fn plugin_names(&self) -> Vec<String> {
        self.plugins.names()
    }

    // ─── Startup ─────────────────────────────────────────────────────────────

    /// Runs the application in process mode: no transport bundle.
    pub async fn run(&self) -> AppResult<Map<String, Value>> {
        self.startup(ExecutionContext::process()).await
    }

    /// Runs the application: the plugin tree first, then the module tree,
    /// then `on_app_started`.
    ///
    /// An unhandled tree error consults `catch_error`; a successful
    /// handler makes the run return the partial aggregate (skipping
    /// `on_app_started`). `on_exit` fires on every path.
    pub async fn startup(&self, ctx: ExecutionContext) -> AppResult<Map<String, Value>> {
        info!(
            plugins = self.plugins.names().len(),
            modules = self.modules.names().len(),
            env = self.config.framework.env.as_str(),
            "Application starting"
        );
        let http = ctx.http;

        let mut aggregate = Map::new();

        let outcome = self.plugins.run(http.as_ref()).await;
        aggregate.extend(outcome.states);
        let mut failure = outcome.error;

        if failure.is_none() {
            let outcome = self.modules.run(http.as_ref()).await;
            aggregate.extend(outcome.states);
            failure = outcome.error;
        }

        if failure.is_none()
            && let Some(handler) = &self.on_app_started
            && let Err(e) = handler.clone().call(Invocation::new(State::new())).await
        {
            failure = Some(e);
        }

        let result = match failure {
            None => {
                info!("Application started");
                Ok(aggregate)
            }
            Some(error) => self.handle_failure(error, aggregate).await,
        };

        if let Some(handler) = &self.on_exit
            && let Err(e) = handler.clone().call(Invocation::new(State::new())).await
        {
            warn!(error = %e, "on_exit handler failed");
        }

        result
    }

    async fn handle_failure(
        &self,
        error: MiddlewareError,
        aggregate: Map<String, Value>,
    ) -> AppResult<Map<String, Value>> {
        let Some(handler) = &self.catch_error else {
            return Err(AppError::Middleware(error));
        };
        warn!(error = %error, "Startup failed, invoking catch_error");

        let invocation = Invocation::new(State::new()).with_error(Arc::new(error));
        match handler.clone().call(invocation).await {
            Ok(_) => Ok(aggregate),
            Err(e) => Err(AppError::Lifecycle {
                event: "catch_error".to_string(),
                message: e.to_string(),
            }),
        }
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("modules", &self.modules.names())
            .field("plugins", &self.plugins.names())
            .field("env", &self.config.framework.env)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::Flow;
    use lattice_framework::{middleware_sync, Middleware};
    use parking_lot::Mutex;
    use serde_json::json;

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> BoxedMiddleware {
        let log = Arc::clone(log);
        middleware_sync(move |_| {
            log.lock().push(tag);
            Ok(Flow::Continue)
        })
    }

    #[tokio::test]
    async fn startup_runs_plugins_then_modules_then_lifecycle() {
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut app = App::new(AppConfig::default())
            .on_app_started(recorder(&log, "started"))
            .on_exit(recorder(&log, "exit"));
        app.add_plugin(PluginSpec::new("billing").add_module(
            ModuleSpec::new("invoices")
                .with_module_logic([Middleware::service(recorder(&log, "plugin_module"))]),
        ))
        .unwrap();
        app.add_module(
            ModuleSpec::new("orders")
                .with_module_logic([Middleware::service(recorder(&log, "module"))]),
        )
        .unwrap();

        let states = app.run().await.unwrap();
        assert_eq!(
            *log.lock(),
            vec!["plugin_module", "module", "started", "exit"]
        );
        assert!(states.contains_key("invoices"));
        assert!(states.contains_key("orders"));
    }

    #[tokio::test]
    async fn catch_error_keeps_partial_aggregate_and_skips_on_app_started() {
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut app = App::new(AppConfig::default())
            .on_app_started(recorder(&log, "started"))
            .catch_error(recorder(&log, "caught"))
            .on_exit(recorder(&log, "exit"));
        app.add_module(
            ModuleSpec::new("healthy").with_module_logic([Middleware::sync(|invocation| {
                invocation.state().set("ok", true);
                Ok(Flow::Continue)
            })]),
        )
        .unwrap();
        app.add_module(
            ModuleSpec::new("broken").with_module_logic([Middleware::sync(|_| {
                Err(MiddlewareError::failure("boom"))
            })]),
        )
        .unwrap();

        let states = app.run().await.unwrap();
        assert_eq!(states["healthy"]["ok"], json!(true));
        assert!(!states.contains_key("broken"));
        assert_eq!(*log.lock(), vec!["caught", "exit"]);
    }

    #[tokio::test]
    async fn unhandled_failure_is_returned_and_on_exit_still_fires() {
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut app = App::new(AppConfig::default()).on_exit(recorder(&log, "exit"));
        app.add_module(
            ModuleSpec::new("broken").with_module_logic([Middleware::sync(|_| {
                Err(MiddlewareError::failure("boom"))
            })]),
        )
        .unwrap();

        let err = app.run().await.unwrap_err();
        assert!(matches!(err, AppError::Middleware(_)));
        assert_eq!(*log.lock(), vec!["exit"]);
    }

    #[tokio::test]
    async fn http_bundle_reaches_middleware() {
        let mut app = App::new(AppConfig::default());
        app.add_module(
            ModuleSpec::new("gateway").with_module_logic([Middleware::sync(|invocation| {
                let present = invocation.http().is_some();
                invocation.state().set("http", present);
                Ok(Flow::Continue)
            })]),
        )
        .unwrap();

        let ctx = ExecutionContext::with_http(Arc::new("bundle".to_string()));
        let states = app.startup(ctx).await.unwrap();
        assert_eq!(states["gateway"]["http"], json!(true));
    }

    #[tokio::test]
    async fn entity_apis_delegate_to_the_trees() {
        let mut app = App::new(AppConfig::default());
        app.add_module(ModuleSpec::new("orders")).unwrap();
        app.add_plugin(PluginSpec::new("billing").expose("invoice_created"))
            .unwrap();

        assert!(app.has_module("orders"));
        assert!(app.has_plugin("billing"));
        assert_eq!(app.module_names(), vec!["orders".to_string()]);
        assert_eq!(app.plugin_names(), vec!["billing".to_string()]);
        assert!(app.get_module("orders").is_some());
        assert!(app.exposed_mediator().has("invoice_created"));

        app.remove_plugin("billing").unwrap();
        assert!(!app.exposed_mediator().has("invoice_created"));
        app.remove_module("orders").unwrap();
        assert!(app.module_names().is_empty());
    }

    #[tokio::test]
    async fn custom_config_slice_reaches_compiler_passes() {
        use lattice_core::{CompilerPass, Definition, InitOutput};

        let config = AppConfig {
            custom: json!({"limits": {"max": 7}}),
            ..Default::default()
        };
        let mut app = App::new(config);
        app.add_module(
            ModuleSpec::new("limited")
                .with_dependencies(vec![Definition::sync("svc", |_| {
                    Ok(InitOutput::instance(()))
                })
                .with_compiler_pass(CompilerPass::on_property("limits", |slice, ctx| {
                    let max = slice["max"].as_u64().unwrap_or(0);
                    ctx.register(Definition::sync("max_limit", move |_| {
                        Ok(InitOutput::instance(max))
                    }))
                }))])
                .with_module_logic([Middleware::sync(|invocation| {
                    let max = invocation.args().get::<u64>("max_limit")?;
                    invocation.state().set("max", *max);
                    Ok(Flow::Continue)
                })
                .wants(["max_limit"])]),
        )
        .unwrap();

        let states = app.run().await.unwrap();
        assert_eq!(states["limited"]["max"], json!(7));
    }
}
