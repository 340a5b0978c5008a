//! Tool registry
//!
//! Holds every registered tool, initializes them in registration order and
//! enforces that at most one tool is active. The previously active tool is
//! always deactivated before the next one activates.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{json, Value};

use crate::events::{names, EventBus, SubscriptionId};

use super::{RegistryError, Tool, ToolButton, ToolContext};

/// Services every tool may depend on without registering them
pub const BUILTIN_SERVICES: &[&str] = &["event-bus", "annotation-store", "render-surface"];

/// Outcome of `initialize_all`
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitReport {
    pub initialized: Vec<String>,
    /// Tool name and error message
    pub failed: Vec<(String, String)>,
}

impl InitReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Clone)]
pub struct ToolRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    bus: EventBus,
    tools: RwLock<Vec<Arc<dyn Tool>>>,
    initialized: RwLock<HashSet<String>>,
    active: RwLock<Option<String>>,
    /// Serializes activation changes; never held while emitting
    transition: Mutex<()>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

impl ToolRegistry {
    pub fn new(bus: EventBus) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                bus,
                tools: RwLock::new(Vec::new()),
                initialized: RwLock::new(HashSet::new()),
                active: RwLock::new(None),
                transition: Mutex::new(()),
                subscriptions: Mutex::new(Vec::new()),
            }),
        }
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Add a tool after checking its declared capabilities
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        check_capabilities(tool.as_ref())?;

        let mut tools = self.inner.tools.write();
        if tools.iter().any(|t| t.name() == tool.name()) {
            return Err(RegistryError::Duplicate(tool.name().to_string()));
        }
        tracing::debug!("Registered tool {} v{}", tool.name(), tool.version());
        tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.inner.tools.read().iter().find(|t| t.name() == name).cloned()
    }

    /// Registered names in registration order
    pub fn tool_names(&self) -> Vec<String> {
        self.inner.tools.read().iter().map(|t| t.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.tools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_initialized(&self, name: &str) -> bool {
        self.inner.initialized.read().contains(name)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Initialize every tool not yet initialized
    ///
    /// A failing tool is logged and skipped; the others still initialize.
    pub fn initialize_all(&self, context: &ToolContext) -> InitReport {
        let tools: Vec<Arc<dyn Tool>> = self.inner.tools.read().clone();
        let registered: HashSet<String> = tools.iter().map(|t| t.name().to_string()).collect();
        let mut report = InitReport::default();

        for tool in tools {
            let name = tool.name().to_string();
            if self.is_initialized(&name) {
                continue;
            }

            let missing = tool
                .dependencies()
                .into_iter()
                .find(|dep| !BUILTIN_SERVICES.contains(&dep.as_str()) && !registered.contains(dep));
            if let Some(dependency) = missing {
                let e = RegistryError::DependencyMissing {
                    tool: name.clone(),
                    dependency,
                };
                tracing::error!("Skipping tool {}: {}", name, e);
                report.failed.push((name, e.to_string()));
                continue;
            }

            match tool.initialize(context) {
                Ok(()) => {
                    tracing::info!("Initialized tool {}", name);
                    self.inner.initialized.write().insert(name.clone());
                    report.initialized.push(name);
                }
                Err(e) => {
                    tracing::error!("Failed to initialize tool {}: {}", name, e);
                    report.failed.push((name, e.to_string()));
                }
            }
        }

        report
    }

    /// Make `name` the single active tool
    ///
    /// Activating the already active tool is a no-op.
    pub fn activate(&self, name: &str) -> Result<(), RegistryError> {
        let tool = self.get(name).ok_or_else(|| RegistryError::Unknown(name.to_string()))?;
        if !self.is_initialized(name) {
            return Err(RegistryError::NotInitialized(name.to_string()));
        }

        let mut emitted: Vec<(&'static str, Value)> = Vec::new();
        let result = {
            let _transition = self.inner.transition.lock();
            let current = self.inner.active.read().clone();

            match current {
                Some(current) if current == name => Ok(()),
                current => {
                    if let Some(previous) = current.and_then(|c| self.get(&c)) {
                        previous.deactivate();
                        *self.inner.active.write() = None;
                        emitted.push((names::TOOL_DEACTIVATE_SUCCESS, json!({ "name": previous.name() })));
                    }

                    match tool.activate() {
                        Ok(()) => {
                            *self.inner.active.write() = Some(name.to_string());
                            emitted.push((names::TOOL_ACTIVATE_SUCCESS, json!({ "name": name })));
                            Ok(())
                        }
                        Err(source) => Err(RegistryError::Tool {
                            tool: name.to_string(),
                            source,
                        }),
                    }
                }
            }
        };

        for (event, payload) in emitted {
            self.inner.bus.emit_both(event, payload);
        }
        if let Err(e) = &result {
            tracing::warn!("Activation failed: {}", e);
        }
        result
    }

    /// Deactivate the active tool, returning its name
    pub fn deactivate_active(&self) -> Option<String> {
        let previous = {
            let _transition = self.inner.transition.lock();
            let previous = self.inner.active.write().take()?;
            if let Some(tool) = self.get(&previous) {
                tool.deactivate();
            }
            previous
        };
        self.inner
            .bus
            .emit_both(names::TOOL_DEACTIVATE_SUCCESS, json!({ "name": previous }));
        Some(previous)
    }

    pub fn active_tool(&self) -> Option<String> {
        self.inner.active.read().clone()
    }

    /// Toolbar buttons in registration order
    pub fn tool_buttons(&self) -> Vec<ToolButton> {
        let tools: Vec<Arc<dyn Tool>> = self.inner.tools.read().clone();
        tools.iter().map(|t| t.create_tool_button()).collect()
    }

    /// Deactivate, destroy and drop every tool
    pub fn destroy_all(&self) {
        self.deactivate_active();
        let tools: Vec<Arc<dyn Tool>> = std::mem::take(&mut *self.inner.tools.write());
        for tool in tools {
            tool.destroy();
        }
        self.inner.initialized.write().clear();
        for id in self.inner.subscriptions.lock().drain(..) {
            self.inner.bus.off(id);
        }
    }

    // ========================================================================
    // Event wiring
    // ========================================================================

    /// Serve `tool:activate:requested` and `tool:deactivate:requested`
    pub fn listen(&self) {
        let bus = self.inner.bus.clone();
        let mut ids = Vec::new();

        let registry = self.clone();
        ids.push(bus.on(names::TOOL_ACTIVATE_REQUESTED, move |event| {
            match event.payload.get("name").and_then(Value::as_str) {
                // Errors are logged inside `activate`
                Some(name) => {
                    let _ = registry.activate(name);
                }
                None => tracing::warn!("Ignoring tool activation without a name"),
            }
        }));

        let registry = self.clone();
        ids.push(bus.on(names::TOOL_DEACTIVATE_REQUESTED, move |_| {
            registry.deactivate_active();
        }));

        self.inner.subscriptions.lock().extend(ids);
    }
}

/// Check the metadata every tool must declare
fn check_capabilities(tool: &dyn Tool) -> Result<(), RegistryError> {
    let label = if tool.name().trim().is_empty() {
        tool.kind().to_string()
    } else {
        tool.name().to_string()
    };
    let missing = |capability: &'static str| RegistryError::MissingCapability {
        tool: label.clone(),
        capability,
    };

    if tool.name().trim().is_empty() {
        return Err(missing("name"));
    }
    if tool.display_name().trim().is_empty() {
        return Err(missing("displayName"));
    }
    if tool.icon().trim().is_empty() {
        return Err(missing("icon"));
    }
    if tool.version().trim().is_empty() {
        return Err(missing("version"));
    }
    if !is_semver(tool.version()) {
        return Err(RegistryError::InvalidVersion {
            tool: label,
            version: tool.version().to_string(),
        });
    }
    Ok(())
}

fn is_semver(version: &str) -> bool {
    let parts: Vec<&str> = version.split('.').collect();
    parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::Annotation;
    use crate::tools::{testing, AnnotationCard, ToolError, ToolKind};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Records lifecycle calls into a shared log
    struct FakeTool {
        name: String,
        version: String,
        icon: String,
        dependencies: Vec<String>,
        fail_init: bool,
        active: AtomicBool,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl FakeTool {
        fn new(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name: name.to_string(),
                version: "1.0.0".to_string(),
                icon: "icon".to_string(),
                dependencies: Vec::new(),
                fail_init: false,
                active: AtomicBool::new(false),
                log: log.clone(),
            }
        }
    }

    impl Tool for FakeTool {
        fn kind(&self) -> ToolKind {
            ToolKind::Highlight
        }
        fn name(&self) -> &str {
            &self.name
        }
        fn display_name(&self) -> &str {
            "Fake"
        }
        fn icon(&self) -> &str {
            &self.icon
        }
        fn version(&self) -> &str {
            &self.version
        }
        fn dependencies(&self) -> Vec<String> {
            self.dependencies.clone()
        }
        fn initialize(&self, _context: &ToolContext) -> Result<(), ToolError> {
            if self.fail_init {
                return Err(ToolError::InvalidInput("boom".to_string()));
            }
            self.log.lock().push(format!("init:{}", self.name));
            Ok(())
        }
        fn activate(&self) -> Result<(), ToolError> {
            self.active.store(true, Ordering::SeqCst);
            self.log.lock().push(format!("activate:{}", self.name));
            Ok(())
        }
        fn deactivate(&self) {
            self.active.store(false, Ordering::SeqCst);
            self.log.lock().push(format!("deactivate:{}", self.name));
        }
        fn is_active(&self) -> bool {
            self.active.load(Ordering::SeqCst)
        }
        fn create_tool_button(&self) -> ToolButton {
            ToolButton {
                name: self.name.clone(),
                label: "Fake".to_string(),
                icon: self.icon.clone(),
                active: self.is_active(),
            }
        }
        fn create_annotation_card(&self, _annotation: &Annotation) -> Option<AnnotationCard> {
            None
        }
        fn destroy(&self) {
            self.log.lock().push(format!("destroy:{}", self.name));
        }
    }

    fn setup() -> (ToolRegistry, ToolContext, Arc<Mutex<Vec<String>>>) {
        let context = testing::context(testing::surface());
        let registry = ToolRegistry::new(context.bus.clone());
        (registry, context, Arc::new(Mutex::new(Vec::new())))
    }

    #[test]
    fn test_register_rejects_missing_capability() {
        let (registry, _, log) = setup();
        let mut tool = FakeTool::new("fake", &log);
        tool.icon = String::new();

        let err = registry.register(Arc::new(tool)).unwrap_err();
        match err {
            RegistryError::MissingCapability { tool, capability } => {
                assert_eq!(tool, "fake");
                assert_eq!(capability, "icon");
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_rejects_bad_version_and_duplicates() {
        let (registry, _, log) = setup();
        let mut tool = FakeTool::new("fake", &log);
        tool.version = "1.0".to_string();
        assert!(matches!(
            registry.register(Arc::new(tool)),
            Err(RegistryError::InvalidVersion { .. })
        ));

        registry.register(Arc::new(FakeTool::new("fake", &log))).unwrap();
        assert!(matches!(
            registry.register(Arc::new(FakeTool::new("fake", &log))),
            Err(RegistryError::Duplicate(_))
        ));
    }

    #[test]
    fn test_initialize_isolates_failures() {
        let (registry, context, log) = setup();
        let mut broken = FakeTool::new("broken", &log);
        broken.fail_init = true;
        let mut needy = FakeTool::new("needy", &log);
        needy.dependencies = vec!["annotation-store".to_string(), "ocr".to_string()];

        registry.register(Arc::new(broken)).unwrap();
        registry.register(Arc::new(needy)).unwrap();
        registry.register(Arc::new(FakeTool::new("good", &log))).unwrap();

        let report = registry.initialize_all(&context);
        assert_eq!(report.initialized, vec!["good".to_string()]);
        assert_eq!(report.failed.len(), 2);
        assert!(!report.is_clean());
        assert!(registry.is_initialized("good"));
        assert!(!registry.is_initialized("broken"));
        assert!(matches!(registry.activate("broken"), Err(RegistryError::NotInitialized(_))));
    }

    #[test]
    fn test_activation_is_exclusive_and_ordered() {
        let (registry, context, log) = setup();
        let a = Arc::new(FakeTool::new("a", &log));
        let b = Arc::new(FakeTool::new("b", &log));
        registry.register(a.clone()).unwrap();
        registry.register(b.clone()).unwrap();
        registry.initialize_all(&context);
        log.lock().clear();

        registry.activate("a").unwrap();
        registry.activate("a").unwrap();
        registry.activate("b").unwrap();

        assert_eq!(
            *log.lock(),
            vec!["activate:a".to_string(), "deactivate:a".to_string(), "activate:b".to_string()]
        );
        assert!(!a.is_active());
        assert!(b.is_active());
        assert_eq!(registry.active_tool().as_deref(), Some("b"));
        assert!(matches!(registry.activate("zzz"), Err(RegistryError::Unknown(_))));
    }

    #[test]
    fn test_activation_events() {
        let (registry, context, log) = setup();
        registry.register(Arc::new(FakeTool::new("a", &log))).unwrap();
        registry.register(Arc::new(FakeTool::new("b", &log))).unwrap();
        registry.initialize_all(&context);
        registry.listen();

        let seen = Arc::new(Mutex::new(Vec::new()));
        for name in [names::TOOL_ACTIVATE_SUCCESS, names::TOOL_DEACTIVATE_SUCCESS] {
            let seen = seen.clone();
            context.bus.on(name, move |e| {
                seen.lock().push(format!("{}:{}", e.name, e.payload["name"].as_str().unwrap_or("")))
            });
        }

        context.bus.emit(names::TOOL_ACTIVATE_REQUESTED, json!({ "name": "a" }));
        context.bus.emit(names::TOOL_ACTIVATE_REQUESTED, json!({ "name": "b" }));
        context.bus.emit(names::TOOL_DEACTIVATE_REQUESTED, json!({}));

        assert_eq!(
            *seen.lock(),
            vec![
                format!("{}:a", names::TOOL_ACTIVATE_SUCCESS),
                format!("{}:a", names::TOOL_DEACTIVATE_SUCCESS),
                format!("{}:b", names::TOOL_ACTIVATE_SUCCESS),
                format!("{}:b", names::TOOL_DEACTIVATE_SUCCESS),
            ]
        );
        assert_eq!(registry.active_tool(), None);
    }

    #[test]
    fn test_destroy_all() {
        let (registry, context, log) = setup();
        registry.register(Arc::new(FakeTool::new("a", &log))).unwrap();
        registry.initialize_all(&context);
        registry.listen();
        registry.activate("a").unwrap();

        registry.destroy_all();
        assert!(registry.is_empty());
        assert!(log.lock().contains(&"destroy:a".to_string()));
        assert_eq!(context.bus.handler_count(crate::events::Channel::Local, names::TOOL_ACTIVATE_REQUESTED), 0);
    }

    #[test]
    fn test_semver_check() {
        assert!(is_semver("1.0.0"));
        assert!(is_semver("10.2.33"));
        assert!(!is_semver("1.0"));
        assert!(!is_semver("1.0.x"));
        assert!(!is_semver("1..0"));
    }
}
