use crate::scene::{GameObject, ModuleInstance, ModuleRecord, Scene, Transform};
use glam::Vec2;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Stable registry keys for the engine's portable types.
pub struct TypeKey;

impl TypeKey {
    pub const SCENE: &'static str = "Scene";
    pub const GAME_OBJECT: &'static str = "GameObject";
    pub const VECTOR2: &'static str = "Vector2";
    pub const MODULE: &'static str = "Module";

    const MODULE_PREFIX: &'static str = "module:";
    const OBJECT_PREFIX: &'static str = "object:";

    pub fn core() -> [&'static str; 4] {
        [Self::SCENE, Self::GAME_OBJECT, Self::VECTOR2, Self::MODULE]
    }

    pub fn module(type_name: &str) -> String {
        format!("{}{type_name}", Self::MODULE_PREFIX)
    }

    /// Key for a game object subtype. Plain `GameObject` maps to the core key.
    pub fn object(type_name: &str) -> String {
        if type_name == Self::GAME_OBJECT {
            Self::GAME_OBJECT.to_string()
        } else {
            format!("{}{type_name}", Self::OBJECT_PREFIX)
        }
    }

    pub fn classify(key: &str) -> Option<TypeKeyKind<'_>> {
        match key {
            Self::SCENE => Some(TypeKeyKind::Scene),
            Self::GAME_OBJECT => Some(TypeKeyKind::GameObject),
            Self::VECTOR2 => Some(TypeKeyKind::Vector2),
            Self::MODULE => Some(TypeKeyKind::ModuleBase),
            _ => {
                if let Some(name) = key.strip_prefix(Self::MODULE_PREFIX) {
                    Some(TypeKeyKind::Module(name))
                } else {
                    key.strip_prefix(Self::OBJECT_PREFIX).map(TypeKeyKind::ObjectSubtype)
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKeyKind<'a> {
    Scene,
    GameObject,
    Vector2,
    ModuleBase,
    Module(&'a str),
    ObjectSubtype(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeOrigin {
    /// Registered by the engine or a loaded plugin.
    Native,
    /// Recovered from a type that is already live in the running application.
    Derived,
    /// Synthesized placeholder that only preserves structure.
    StandIn,
}

/// Specializes a base module instance into a concrete module type.
pub type ModuleConstructor = Arc<dyn Fn(ModuleInstance) -> Result<ModuleInstance, String> + Send + Sync>;

#[derive(Clone)]
pub enum Constructor {
    Scene(fn(&str) -> Scene),
    GameObject(fn(&str, Transform) -> GameObject),
    Vector2(fn(f32, f32) -> Vec2),
    ModuleBase(fn(&ModuleRecord) -> ModuleInstance),
    Module(ModuleConstructor),
}

impl Constructor {
    pub fn kind_label(&self) -> &'static str {
        match self {
            Constructor::Scene(_) => "scene",
            Constructor::GameObject(_) => "game object",
            Constructor::Vector2(_) => "vector",
            Constructor::ModuleBase(_) => "module base",
            Constructor::Module(_) => "module",
        }
    }

    /// Constructor that keeps a module's properties untouched.
    pub fn passthrough_module() -> Self {
        Constructor::Module(Arc::new(passthrough))
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Constructor({})", self.kind_label())
    }
}

#[derive(Debug, Clone)]
pub struct TypeEntry {
    pub constructor: Constructor,
    pub origin: TypeOrigin,
}

/// Maps stable type keys to constructors. Populated at startup; the dependency resolver may add
/// derived or stand-in entries before a load.
#[derive(Debug, Default, Clone)]
pub struct TypeRegistry {
    entries: BTreeMap<String, TypeEntry>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self { entries: BTreeMap::new() }
    }

    pub fn with_engine_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(TypeKey::SCENE, Constructor::Scene(Scene::new));
        registry.register(TypeKey::GAME_OBJECT, Constructor::GameObject(GameObject::new));
        registry.register(TypeKey::VECTOR2, Constructor::Vector2(Vec2::new));
        registry.register(TypeKey::MODULE, Constructor::ModuleBase(ModuleInstance::from_record));
        for (name, constructor) in builtin_modules() {
            registry.register(TypeKey::module(name), Constructor::Module(constructor));
        }
        registry
    }

    pub fn register(&mut self, key: impl Into<String>, constructor: Constructor) {
        self.register_with_origin(key, constructor, TypeOrigin::Native);
    }

    pub fn register_with_origin(&mut self, key: impl Into<String>, constructor: Constructor, origin: TypeOrigin) {
        self.entries.insert(key.into(), TypeEntry { constructor, origin });
    }

    pub fn unregister(&mut self, key: &str) -> Option<TypeEntry> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&TypeEntry> {
        self.entries.get(key)
    }

    pub fn missing<'a>(&self, required: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        required.into_iter().filter(|key| !self.entries.contains_key(*key)).map(|key| key.to_string()).collect()
    }

    pub fn stand_ins(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.origin == TypeOrigin::StandIn)
            .map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn passthrough(module: ModuleInstance) -> Result<ModuleInstance, String> {
    Ok(module)
}

fn builtin_modules() -> Vec<(&'static str, ModuleConstructor)> {
    vec![
        ("SpriteRenderer", Arc::new(sprite_renderer) as ModuleConstructor),
        ("BoxCollider", Arc::new(box_collider) as ModuleConstructor),
        ("RigidBody", Arc::new(rigid_body) as ModuleConstructor),
        ("Script", Arc::new(script) as ModuleConstructor),
    ]
}

/// Built-in modules fill missing fields with defaults and keep every other saved value.
fn properties_mut(module: &mut ModuleInstance) -> Option<&mut Map<String, Value>> {
    if module.properties.is_null() {
        module.properties = Value::Object(Map::new());
    }
    let type_name = module.type_name.clone();
    let props = module.properties.as_object_mut();
    if props.is_none() {
        log::debug!("[registry] {type_name} properties are not an object; keeping them as saved");
    }
    props
}

fn number_or_default(props: &mut Map<String, Value>, field: &str, default: f64, min: f64, module: &str) {
    match props.get(field) {
        None | Some(Value::Null) => {
            props.insert(field.to_string(), Value::from(default));
        }
        Some(Value::Number(n)) if n.as_f64().is_some_and(|v| v >= min) => {}
        Some(other) => log::debug!("[registry] {module}.{field} is {other}, expected a number >= {min}"),
    }
}

fn sprite_renderer(mut module: ModuleInstance) -> Result<ModuleInstance, String> {
    if let Some(props) = properties_mut(&mut module) {
        if let Some(other) = props.get("sprite").filter(|sprite| !sprite.is_null() && !sprite.is_string()) {
            log::debug!("[registry] SpriteRenderer.sprite is {other}, expected an asset path");
        }
        number_or_default(props, "layer", 0.0, f64::MIN, "SpriteRenderer");
    }
    Ok(module)
}

fn box_collider(mut module: ModuleInstance) -> Result<ModuleInstance, String> {
    if let Some(props) = properties_mut(&mut module) {
        number_or_default(props, "width", 1.0, 0.0, "BoxCollider");
        number_or_default(props, "height", 1.0, 0.0, "BoxCollider");
    }
    Ok(module)
}

fn rigid_body(mut module: ModuleInstance) -> Result<ModuleInstance, String> {
    if let Some(props) = properties_mut(&mut module) {
        number_or_default(props, "mass", 1.0, 0.0, "RigidBody");
        number_or_default(props, "gravityScale", 1.0, f64::MIN, "RigidBody");
    }
    Ok(module)
}

/// A script attached before its source is chosen has no `source` yet.
fn script(mut module: ModuleInstance) -> Result<ModuleInstance, String> {
    if let Some(props) = properties_mut(&mut module) {
        props.entry("source").or_insert(Value::Null);
    }
    Ok(module)
}
