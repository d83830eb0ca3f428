//! Insertion-ordered trees of modules and plugins.
//!
//! A tree stores the cloned spec next to the constructed runtime entity.
//! `add` validates and constructs immediately — compiler passes fire here,
//! not at run time. `run` executes every entity strictly sequentially in
//! insertion order, collecting each module's final state into an aggregate
//! keyed by module name.

use std::sync::Arc;

use lattice_core::ServiceArc;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{MiddlewareError, ModuleDefinitionError, ModuleResult,
    PluginDefinitionError, PluginResult};
use crate::events::ExposedMediator;
use crate::middleware::{Block, Middleware};
use crate::module::{Module, ModuleSpec, Runnable, ScopeLinks};
use crate::plugin::{Plugin, PluginSpec};

/// The result of one tree run: everything that completed, plus the error
/// that stopped the run early, if any.
#[derive(Debug, Default)]
pub struct RunOutcome {
    /// Final per-module states, keyed by module name, in completion order.
    pub states: Map<String, Value>,
    /// The first unhandled error, when the run stopped early.
    pub error: Option<MiddlewareError>,
}

impl RunOutcome {
    /// Returns `true` when every entity completed.
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

async fn run_entities<'a, R: Runnable + 'a>(
    entities: impl Iterator<Item = (&'a str, &'a R)>,
    http: Option<&ServiceArc>,
) -> RunOutcome {
    let mut outcome = RunOutcome::default();
    for (name, entity) in entities {
        match entity.run_contrib(http).await {
            Ok(contrib) => {
                outcome.states.extend(contrib);
            }
            Err(error) => {
                debug!(entity = name, error = %error, "Tree run stopped");
                outcome.error = Some(error);
                break;
            }
        }
    }
    outcome
}

// ============================================================================
// ModuleTree
// ============================================================================

struct ModuleEntry {
    spec: ModuleSpec,
    module: Module,
}

/// The application's standalone modules, in insertion order.
pub struct ModuleTree {
    links: ScopeLinks,
    config: Value,
    entries: Vec<ModuleEntry>,
}

impl ModuleTree {
    /// Creates an empty tree over the given scope links and config.
    pub fn new(links: ScopeLinks, config: Value) -> Self {
        Self {
            links,
            config,
            entries: Vec::new(),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.spec.name() == name)
    }

    /// Validates, stores and constructs a module. Compiler passes of its
    /// definitions fire now.
    pub fn add(&mut self, spec: ModuleSpec) -> ModuleResult<()> {
        if self.has(spec.name()) {
            return Err(ModuleDefinitionError::Duplicate(spec.name().to_string()));
        }
        let module = Module::build(&spec, None, &self.links, &self.config, None)?;
        info!(module = spec.name(), "Module added");
        self.entries.push(ModuleEntry { spec, module });
        Ok(())
    }

    /// Merges middleware overrides into an existing module and
    /// reconstructs it.
    ///
    /// For each block: an override entry whose name matches an existing
    /// named entry replaces it in place; anything else is appended.
    /// Dependencies and events are not affected by overrides.
    pub fn override_module(&mut self, patch: ModuleSpec) -> ModuleResult<()> {
        let index = self
            .position(patch.name())
            .ok_or_else(|| ModuleDefinitionError::NotFound(patch.name().to_string()))?;

        let mut merged = self.entries[index].spec.clone();
        for block in Block::ORDER {
            for entry in patch.block(block).iter().cloned() {
                merge_entry(merged.block_mut(block), entry);
            }
        }

        let module = Module::build(&merged, None, &self.links, &self.config, None)?;
        info!(module = merged.name(), "Module overridden");
        self.entries[index] = ModuleEntry {
            spec: merged,
            module,
        };
        Ok(())
    }

    /// Removes a module; re-adding later reconstructs it from scratch.
    pub fn remove(&mut self, name: &str) -> ModuleResult<()> {
        let index = self
            .position(name)
            .ok_or_else(|| ModuleDefinitionError::NotFound(name.to_string()))?;
        self.entries.remove(index);
        info!(module = name, "Module removed");
        Ok(())
    }

    /// Returns `true` when a module with this name is registered.
    pub fn has(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Returns a detached clone of a registered spec.
    pub fn get(&self, name: &str) -> Option<ModuleSpec> {
        self.position(name).map(|i| self.entries[i].spec.clone())
    }

    /// Returns the constructed runtime module.
    pub fn module(&self, name: &str) -> Option<&Module> {
        self.position(name).map(|i| &self.entries[i].module)
    }

    /// Module names, in insertion order.
    pub fn names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.spec.name().to_string())
            .collect()
    }

    /// Returns `true` when no modules are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs every module sequentially, in insertion order.
    pub async fn run(&self, http: Option<&ServiceArc>) -> RunOutcome {
        run_entities(
            self.entries.iter().map(|e| (e.spec.name(), &e.module)),
            http,
        )
        .await
    }
}

/// Applies one override entry to a block, replacing in place when a named
/// entry matches.
fn merge_entry(block: &mut Vec<Middleware>, entry: Middleware) {
    let target = entry
        .name()
        .and_then(|name| block.iter().position(|m| m.name() == Some(name)));
    match target {
        Some(i) => block[i] = entry,
        None => block.push(entry),
    }
}

// ============================================================================
// PluginTree
// ============================================================================

struct PluginEntry {
    spec: PluginSpec,
    plugin: Plugin,
}

/// The application's plugins, in insertion order.
pub struct PluginTree {
    links: ScopeLinks,
    config: Value,
    exposed: Arc<ExposedMediator>,
    entries: Vec<PluginEntry>,
}

impl PluginTree {
    /// Creates an empty tree over the given scope links, config and
    /// exposed-event surface.
    pub fn new(links: ScopeLinks, config: Value, exposed: Arc<ExposedMediator>) -> Self {
        Self {
            links,
            config,
            exposed,
            entries: Vec::new(),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.spec.name() == name)
    }

    /// Validates, stores and constructs a plugin, declaring its exposed
    /// events.
    pub fn add(&mut self, spec: PluginSpec) -> PluginResult<()> {
        if self.has(spec.name()) {
            return Err(PluginDefinitionError::Duplicate(spec.name().to_string()));
        }
        let plugin = Plugin::build(&spec, &self.links, &self.config, &self.exposed)?;
        info!(plugin = spec.name(), "Plugin added");
        self.entries.push(PluginEntry { spec, plugin });
        Ok(())
    }

    /// Removes a plugin, undeclaring its exposed events; re-adding later
    /// reconstructs it from scratch.
    pub fn remove(&mut self, name: &str) -> PluginResult<()> {
        let index = self
            .position(name)
            .ok_or_else(|| PluginDefinitionError::NotFound(name.to_string()))?;
        let entry = self.entries.remove(index);
        for event in entry.plugin.exposed() {
            self.exposed.remove(event);
        }
        info!(plugin = name, "Plugin removed");
        Ok(())
    }

    /// Returns `true` when a plugin with this name is registered.
    pub fn has(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Returns a detached clone of a registered spec.
    pub fn get(&self, name: &str) -> Option<PluginSpec> {
        self.position(name).map(|i| self.entries[i].spec.clone())
    }

    /// Returns the constructed runtime plugin.
    pub fn plugin(&self, name: &str) -> Option<&Plugin> {
        self.position(name).map(|i| &self.entries[i].plugin)
    }

    /// Plugin names, in insertion order.
    pub fn names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.spec.name().to_string())
            .collect()
    }

    /// Returns `true` when no plugins are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs every plugin sequentially, in insertion order.
    pub async fn run(&self, http: Option<&ServiceArc>) -> RunOutcome {
        run_entities(
            self.entries.iter().map(|e| (e.spec.name(), &e.plugin)),
            http,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MiddlewareError;
    use crate::middleware::{middleware_sync, Middleware};
    use lattice_core::{
        CompilerPass, Definition, Flow, InitOutput, SharedAccess, Visibility,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn tree() -> ModuleTree {
        ModuleTree::new(ScopeLinks::new(), json!({}))
    }

    fn marker(block: &'static str) -> Middleware {
        Middleware::sync(move |invocation| {
            invocation.state().with(|map| {
                let trail = map.entry("trail").or_insert_with(|| json!([]));
                if let Some(items) = trail.as_array_mut() {
                    items.push(json!(block));
                }
            });
            Ok(Flow::Continue)
        })
    }

    #[tokio::test]
    async fn blocks_run_in_fixed_order() {
        let mut tree = tree();
        tree.add(
            ModuleSpec::new("orders")
                .with_post_logic_transformers([marker("post")])
                .with_security([marker("security")])
                .with_module_logic([marker("logic")])
                .with_validators([marker("validate")])
                .with_pre_logic_transformers([marker("pre")]),
        )
        .unwrap();

        let outcome = tree.run(None).await;
        assert!(outcome.is_complete());
        assert_eq!(
            outcome.states["orders"]["trail"],
            json!(["security", "pre", "validate", "logic", "post"])
        );
    }

    #[tokio::test]
    async fn skip_block_abandons_current_block_only() {
        let mut tree = tree();
        tree.add(
            ModuleSpec::new("orders")
                .with_validators([
                    Middleware::sync(|_| Ok(Flow::SkipBlock)),
                    marker("unreachable"),
                ])
                .with_module_logic([marker("logic")]),
        )
        .unwrap();

        let outcome = tree.run(None).await;
        assert_eq!(outcome.states["orders"]["trail"], json!(["logic"]));
    }

    #[tokio::test]
    async fn abort_ends_the_module_successfully() {
        let mut tree = tree();
        tree.add(
            ModuleSpec::new("orders")
                .with_security([marker("security"), Middleware::sync(|_| Ok(Flow::Abort))])
                .with_module_logic([marker("unreachable")]),
        )
        .unwrap();

        let outcome = tree.run(None).await;
        assert!(outcome.is_complete());
        assert_eq!(outcome.states["orders"]["trail"], json!(["security"]));
    }

    #[tokio::test]
    async fn disabled_entries_are_skipped() {
        let mut tree = tree();
        tree.add(ModuleSpec::new("orders").with_module_logic([
            marker("kept").named("kept"),
            marker("off").named("off").disabled(),
        ]))
        .unwrap();

        let outcome = tree.run(None).await;
        assert_eq!(outcome.states["orders"]["trail"], json!(["kept"]));
    }

    #[tokio::test]
    async fn state_write_lands_in_the_aggregate() {
        let mut tree = tree();
        tree.add(
            ModuleSpec::new("m").with_module_logic([Middleware::sync(|invocation| {
                invocation.state().set("x", 1);
                Ok(Flow::Continue)
            })]),
        )
        .unwrap();

        let outcome = tree.run(None).await;
        assert_eq!(outcome.states, json!({"m": {"x": 1}}).as_object().cloned().unwrap());
    }

    #[tokio::test]
    async fn modules_run_in_insertion_order_and_share_public_services() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut tree = tree();

        let bump = |counter: Arc<AtomicUsize>| {
            Middleware::sync(move |invocation| {
                let seen = counter.fetch_add(1, Ordering::SeqCst);
                invocation.state().set("rank", seen);
                Ok(Flow::Continue)
            })
        };

        tree.add(
            ModuleSpec::new("first")
                .with_dependencies(vec![Definition::sync("registry", |_| {
                    Ok(InitOutput::instance(AtomicUsize::new(0)))
                })
                .with_scope(Visibility::Public)])
                .with_module_logic([bump(Arc::clone(&counter))]),
        )
        .unwrap();
        tree.add(ModuleSpec::new("second").with_module_logic([bump(Arc::clone(&counter))]))
            .unwrap();

        let outcome = tree.run(None).await;
        assert_eq!(outcome.states["first"]["rank"], json!(0));
        assert_eq!(outcome.states["second"]["rank"], json!(1));

        // The public service is resolvable from the second module's scope.
        let second = tree.module("second").unwrap();
        assert!(second.compiler().has("registry"));
    }

    #[tokio::test]
    async fn shared_definition_is_one_instance_across_allowed_modules() {
        let mut tree = tree();
        tree.add(
            ModuleSpec::new("a")
                .with_dependencies(vec![Definition::sync("ledger", |_| {
                    Ok(InitOutput::instance(AtomicUsize::new(0)))
                })
                .shared_with(SharedAccess::modules(["a", "b"]))])
                .with_module_logic([Middleware::sync(|invocation| {
                    let ledger = invocation.args().get::<AtomicUsize>("ledger")?;
                    ledger.fetch_add(1, Ordering::SeqCst);
                    Ok(Flow::Continue)
                })
                .wants(["ledger"])]),
        )
        .unwrap();
        tree.add(
            ModuleSpec::new("b").with_module_logic([Middleware::sync(|invocation| {
                let ledger = invocation.args().get::<AtomicUsize>("ledger")?;
                invocation
                    .state()
                    .set("total", ledger.fetch_add(1, Ordering::SeqCst) + 1);
                Ok(Flow::Continue)
            })
            .wants(["ledger"])]),
        )
        .unwrap();

        let outcome = tree.run(None).await;
        assert!(outcome.is_complete());
        // Both modules incremented the same instance.
        assert_eq!(outcome.states["b"]["total"], json!(2));
    }

    #[tokio::test]
    async fn shared_permission_denial_stops_the_run() {
        let mut tree = tree();
        tree.add(
            ModuleSpec::new("owner").with_dependencies(vec![Definition::sync(
                "vault",
                |_| Ok(InitOutput::instance(())),
            )
            .shared_with(SharedAccess::modules(["owner"]))]),
        )
        .unwrap();
        tree.add(
            ModuleSpec::new("intruder").with_module_logic([Middleware::sync(|_| {
                Ok(Flow::Continue)
            })
            .wants(["vault"])]),
        )
        .unwrap();

        let outcome = tree.run(None).await;
        let error = outcome.error.unwrap();
        assert!(error.to_string().contains("vault"));
    }

    #[tokio::test]
    async fn expression_entries_resolve_services_at_run_time() {
        let mut tree = tree();
        tree.add(
            ModuleSpec::new("orders")
                .with_dependencies(vec![
                    Definition::sync("limit", |_| Ok(InitOutput::instance(3_usize))),
                    Definition::sync("limiter", |_| {
                        Ok(InitOutput::instance(middleware_sync(|invocation| {
                            let limit = invocation.args().get::<usize>("limit")?;
                            invocation.state().set("limit", *limit);
                            Ok(Flow::Continue)
                        })))
                    }),
                ])
                .with_security([Middleware::expression("limiter(limit)")]),
        )
        .unwrap();

        let outcome = tree.run(None).await;
        assert!(outcome.is_complete());
        assert_eq!(outcome.states["orders"]["limit"], json!(3));
    }

    #[tokio::test]
    async fn expression_target_must_be_callable() {
        let mut tree = tree();
        tree.add(
            ModuleSpec::new("orders")
                .with_dependencies(vec![Definition::sync("limiter", |_| {
                    Ok(InitOutput::instance("not a middleware"))
                })])
                .with_security([Middleware::expression("limiter()")]),
        )
        .unwrap();

        let outcome = tree.run(None).await;
        let error = outcome.error.unwrap();
        assert!(error.to_string().contains("limiter"));
        assert!(matches!(
            error,
            MiddlewareError::Resolve(lattice_core::ResolveError::NotCallable { .. })
        ));
    }

    #[tokio::test]
    async fn unresolvable_want_names_the_middleware() {
        let mut tree = tree();
        tree.add(
            ModuleSpec::new("orders").with_module_logic([Middleware::sync(|_| {
                Ok(Flow::Continue)
            })
            .named("pricing")
            .wants(["missing_rates"])]),
        )
        .unwrap();

        let outcome = tree.run(None).await;
        assert_eq!(
            outcome.error.unwrap().to_string(),
            "cannot resolve argument 'missing_rates' for middleware 'pricing'"
        );
    }

    #[tokio::test]
    async fn module_on_error_handles_failures() {
        let mut tree = tree();
        tree.add(
            ModuleSpec::new("orders")
                .on_mediator(
                    "on_error",
                    middleware_sync(|invocation| {
                        let message = invocation
                            .error()
                            .map(|e| e.to_string())
                            .unwrap_or_default();
                        invocation.state().set("handled", message);
                        Ok(Flow::Continue)
                    }),
                )
                .with_module_logic([Middleware::sync(|_| {
                    Err(MiddlewareError::failure("boom"))
                })]),
        )
        .unwrap();

        let outcome = tree.run(None).await;
        assert!(outcome.is_complete());
        assert_eq!(outcome.states["orders"]["handled"], json!("boom"));
    }

    #[tokio::test]
    async fn add_time_validation_is_synchronous() {
        let mut tree = tree();

        // Reserved ambient want.
        let err = tree
            .add(ModuleSpec::new("m").with_module_logic([
                Middleware::sync(|_| Ok(Flow::Continue)).named("h").wants(["state"]),
            ]))
            .unwrap_err();
        assert!(matches!(err, ModuleDefinitionError::ReservedWant { .. }));

        // Malformed expression.
        let err = tree
            .add(ModuleSpec::new("m").with_security([Middleware::expression("bad(")]))
            .unwrap_err();
        assert!(matches!(err, ModuleDefinitionError::Expression { .. }));

        // Scope and shared together, naming the definition.
        let err = tree
            .add(
                ModuleSpec::new("m").with_dependencies(vec![Definition::sync(
                    "both",
                    |_| Ok(InitOutput::instance(())),
                )
                .with_scope(Visibility::Public)
                .shared_with(SharedAccess::modules(["m"]))]),
            )
            .unwrap_err();
        assert!(err.to_string().contains("both"));

        // Plugin visibility outside a plugin.
        let err = tree
            .add(
                ModuleSpec::new("m").with_dependencies(vec![Definition::sync(
                    "svc",
                    |_| Ok(InitOutput::instance(())),
                )
                .with_scope(Visibility::Plugin)]),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ModuleDefinitionError::PluginScopeOutsidePlugin { .. }
        ));

        // Nothing was registered by the failed adds.
        assert!(tree.is_empty());
    }

    #[tokio::test]
    async fn duplicate_module_names_are_rejected() {
        let mut tree = tree();
        tree.add(ModuleSpec::new("orders")).unwrap();
        let err = tree.add(ModuleSpec::new("orders")).unwrap_err();
        assert!(matches!(err, ModuleDefinitionError::Duplicate(_)));
    }

    #[tokio::test]
    async fn get_returns_a_detached_clone() {
        let mut tree = tree();
        tree.add(ModuleSpec::new("orders").with_module_logic([marker("logic")]))
            .unwrap();

        let mut clone = tree.get("orders").unwrap();
        clone = clone.with_module_logic(std::iter::empty());
        assert!(clone.block(Block::ModuleLogic).is_empty());
        // The registered spec is untouched.
        assert_eq!(tree.get("orders").unwrap().block(Block::ModuleLogic).len(), 1);
    }

    #[tokio::test]
    async fn override_replaces_named_entries_and_appends_the_rest() {
        let mut tree = tree();
        tree.add(ModuleSpec::new("orders").with_module_logic([
            marker("original").named("main"),
            marker("tail"),
        ]))
        .unwrap();

        tree.override_module(ModuleSpec::new("orders").with_module_logic([
            Middleware::sync(|invocation| {
                invocation.state().with(|map| {
                    let trail = map.entry("trail").or_insert_with(|| json!([]));
                    if let Some(items) = trail.as_array_mut() {
                        items.push(json!("replacement"));
                    }
                });
                Ok(Flow::Continue)
            })
            .named("main"),
            marker("appended").named("extra"),
        ]))
        .unwrap();

        let outcome = tree.run(None).await;
        assert_eq!(
            outcome.states["orders"]["trail"],
            json!(["replacement", "tail", "appended"])
        );

        let err = tree
            .override_module(ModuleSpec::new("ghost"))
            .unwrap_err();
        assert!(matches!(err, ModuleDefinitionError::NotFound(_)));
    }

    #[tokio::test]
    async fn compiler_passes_fire_at_add_time_and_rerun_on_readd() {
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_in_pass = Arc::clone(&runs);

        let spec = ModuleSpec::new("configured").with_dependencies(vec![Definition::sync(
            "svc",
            |_| Ok(InitOutput::instance(())),
        )
        .with_compiler_pass(CompilerPass::on_property("limits", move |slice, ctx| {
            runs_in_pass.fetch_add(1, Ordering::SeqCst);
            let max = slice["max"].as_u64().unwrap_or(0);
            ctx.register(Definition::sync("max_limit", move |_| {
                Ok(InitOutput::instance(max))
            }))
        }))]);

        let links = ScopeLinks::new();
        let mut tree = ModuleTree::new(links, json!({"limits": {"max": 9}}));

        tree.add(spec.clone()).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(tree.module("configured").unwrap().compiler().has("max_limit"));

        tree.remove("configured").unwrap();
        tree.add(spec).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn plugin_modules_share_the_plugin_scope() {
        let links = ScopeLinks::new();
        let exposed = Arc::new(ExposedMediator::new());
        let mut tree = PluginTree::new(links, json!({}), Arc::clone(&exposed));

        tree.add(
            PluginSpec::new("billing")
                .add_module(
                    ModuleSpec::new("invoices").with_dependencies(vec![Definition::sync(
                        "tax_rate",
                        |_| Ok(InitOutput::instance(0.2_f64)),
                    )
                    .with_scope(Visibility::Plugin)]),
                )
                .add_module(
                    ModuleSpec::new("receipts").with_module_logic([Middleware::sync(
                        |invocation| {
                            let rate = invocation.args().get::<f64>("tax_rate")?;
                            invocation.state().set("rate", *rate);
                            Ok(Flow::Continue)
                        },
                    )
                    .wants(["tax_rate"])]),
                )
                .expose("invoice_created"),
        )
        .unwrap();

        let outcome = tree.run(None).await;
        assert!(outcome.is_complete());
        assert_eq!(outcome.states["receipts"]["rate"], json!(0.2));
        assert!(exposed.has("invoice_created"));

        // The plugin-scoped definition lives in the plugin compiler itself.
        let plugin = tree.plugin("billing").unwrap();
        assert!(plugin.compiler().has_own("tax_rate"));

        tree.remove("billing").unwrap();
        assert!(!exposed.has("invoice_created"));
    }

    #[tokio::test]
    async fn plugin_on_error_lets_remaining_modules_run() {
        let links = ScopeLinks::new();
        let exposed = Arc::new(ExposedMediator::new());
        let mut tree = PluginTree::new(links, json!({}), exposed);

        tree.add(
            PluginSpec::new("billing")
                .on_mediator("on_error", middleware_sync(|_| Ok(Flow::Continue)))
                .add_module(ModuleSpec::new("broken").with_module_logic([
                    Middleware::sync(|_| Err(MiddlewareError::failure("boom"))),
                ]))
                .add_module(ModuleSpec::new("healthy").with_module_logic([marker("ran")])),
        )
        .unwrap();

        let outcome = tree.run(None).await;
        assert!(outcome.is_complete());
        assert_eq!(outcome.states["healthy"]["trail"], json!(["ran"]));
        // The failed module contributed nothing.
        assert!(!outcome.states.contains_key("broken"));
    }
}
