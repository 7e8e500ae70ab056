use dm_engine::registry::{Constructor, TypeKey, TypeKeyKind, TypeOrigin, TypeRegistry};
use dm_engine::scene::{GameObject, ModuleInstance, Scene};
use glam::Vec2;
use std::collections::BTreeMap;
use std::fmt;

/// Source of constructors for types that already have live instances in the running application.
pub trait LiveTypeSource {
    fn live_constructor(&self, key: &str) -> Option<Constructor>;
}

/// Constructors retained from types that have been live in this process. Survives clearing the
/// workspace, so a type whose registration went away can still be recovered.
#[derive(Debug, Default, Clone)]
pub struct LiveTypeCache {
    entries: BTreeMap<String, Constructor>,
}

impl LiveTypeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remember(&mut self, key: impl Into<String>, constructor: Constructor) {
        self.entries.insert(key.into(), constructor);
    }

    /// Remembers every non-stand-in registry entry the scene's objects and modules use.
    pub fn remember_scene(&mut self, scene: &Scene, registry: &TypeRegistry) {
        for key in Scene::referenced_types(&scene.to_portable()) {
            if let Some(entry) = registry.get(&key) {
                if entry.origin != TypeOrigin::StandIn {
                    self.entries.insert(key, entry.constructor.clone());
                }
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl LiveTypeSource for LiveTypeCache {
    fn live_constructor(&self, key: &str) -> Option<Constructor> {
        self.entries.get(key).cloned()
    }
}

/// Type keys for which neither a live constructor nor a stand-in could be produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedTypes(pub Vec<String>);

impl fmt::Display for UnresolvedTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unresolved types: {}", self.0.join(", "))
    }
}

impl std::error::Error for UnresolvedTypes {}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionReport {
    pub derived: Vec<String>,
    pub stand_ins: Vec<String>,
}

impl ResolutionReport {
    pub fn is_empty(&self) -> bool {
        self.derived.is_empty() && self.stand_ins.is_empty()
    }

    pub fn merge(&mut self, other: ResolutionReport) {
        self.derived.extend(other.derived);
        self.stand_ins.extend(other.stand_ins);
    }
}

pub struct DependencyResolver;

impl DependencyResolver {
    /// Makes every key in `keys` constructible. Registered types are used as-is; otherwise a live
    /// constructor is adopted, and failing that a stand-in is registered.
    pub fn ensure_available<'a>(
        registry: &mut TypeRegistry,
        live: &dyn LiveTypeSource,
        keys: impl IntoIterator<Item = &'a str>,
    ) -> Result<ResolutionReport, UnresolvedTypes> {
        let mut report = ResolutionReport::default();
        let mut unresolved = Vec::new();
        for key in keys {
            if registry.contains(key) {
                continue;
            }
            let Some(kind) = TypeKey::classify(key) else {
                unresolved.push(key.to_string());
                continue;
            };
            if let Some(constructor) = live.live_constructor(key).filter(|c| fits(kind, c)) {
                log::info!("[resolver] adopted live constructor for '{key}'");
                registry.register_with_origin(key, constructor, TypeOrigin::Derived);
                report.derived.push(key.to_string());
                continue;
            }
            log::warn!("[resolver] '{key}' is not available; registering a stand-in");
            registry.register_with_origin(key, stand_in(kind), TypeOrigin::StandIn);
            report.stand_ins.push(key.to_string());
        }
        if unresolved.is_empty() {
            Ok(report)
        } else {
            Err(UnresolvedTypes(unresolved))
        }
    }
}

fn fits(kind: TypeKeyKind<'_>, constructor: &Constructor) -> bool {
    matches!(
        (kind, constructor),
        (TypeKeyKind::Scene, Constructor::Scene(_))
            | (TypeKeyKind::GameObject | TypeKeyKind::ObjectSubtype(_), Constructor::GameObject(_))
            | (TypeKeyKind::Vector2, Constructor::Vector2(_))
            | (TypeKeyKind::ModuleBase, Constructor::ModuleBase(_))
            | (TypeKeyKind::Module(_), Constructor::Module(_))
    )
}

/// Minimal constructor that only preserves the portable structure of the type.
fn stand_in(kind: TypeKeyKind<'_>) -> Constructor {
    match kind {
        TypeKeyKind::Scene => Constructor::Scene(Scene::new),
        TypeKeyKind::GameObject | TypeKeyKind::ObjectSubtype(_) => Constructor::GameObject(GameObject::new),
        TypeKeyKind::Vector2 => Constructor::Vector2(Vec2::new),
        TypeKeyKind::ModuleBase => Constructor::ModuleBase(ModuleInstance::from_record),
        TypeKeyKind::Module(_) => Constructor::passthrough_module(),
    }
}
