use crate::registry::{Constructor, TypeEntry, TypeKey, TypeOrigin, TypeRegistry};
use glam::Vec2;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Vec2Data {
    pub x: f32,
    pub y: f32,
}

impl From<Vec2> for Vec2Data {
    fn from(value: Vec2) -> Self {
        Self { x: value.x, y: value.y }
    }
}

impl From<Vec2Data> for Vec2 {
    fn from(value: Vec2Data) -> Self {
        Vec2::new(value.x, value.y)
    }
}

fn default_scale() -> Vec2Data {
    Vec2Data { x: 1.0, y: 1.0 }
}

fn zero() -> Vec2Data {
    Vec2Data { x: 0.0, y: 0.0 }
}

const fn default_true() -> bool {
    true
}

fn default_object_type() -> String {
    TypeKey::GAME_OBJECT.to_string()
}

fn default_scene_type() -> String {
    TypeKey::SCENE.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransformData {
    #[serde(default = "zero")]
    pub position: Vec2Data,
    #[serde(default)]
    pub rotation: f32,
    #[serde(default = "default_scale")]
    pub scale: Vec2Data,
}

impl Default for TransformData {
    fn default() -> Self {
        Self { position: zero(), rotation: 0.0, scale: default_scale() }
    }
}

/// Portable form of a module attached to a game object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleRecord {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub properties: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortableObject {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default = "default_object_type")]
    pub type_name: String,
    #[serde(default)]
    pub transform: TransformData,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub modules: Vec<ModuleRecord>,
    #[serde(default)]
    pub children: Vec<PortableObject>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The stable JSON schema of a scene inside a project manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortableSceneData {
    pub name: String,
    #[serde(rename = "type", default = "default_scene_type")]
    pub type_name: String,
    #[serde(default)]
    pub settings: Value,
    #[serde(default)]
    pub game_objects: Vec<PortableObject>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec2,
    pub rotation: f32,
    pub scale: Vec2,
}

impl Default for Transform {
    fn default() -> Self {
        Self { position: Vec2::ZERO, rotation: 0.0, scale: Vec2::ONE }
    }
}

impl Transform {
    fn to_data(self) -> TransformData {
        TransformData { position: self.position.into(), rotation: self.rotation, scale: self.scale.into() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleInstance {
    pub type_name: String,
    pub enabled: bool,
    pub properties: Value,
    pub origin: TypeOrigin,
    extra: Map<String, Value>,
}

impl ModuleInstance {
    pub fn new(type_name: impl Into<String>, properties: Value) -> Self {
        Self {
            type_name: type_name.into(),
            enabled: true,
            properties,
            origin: TypeOrigin::Native,
            extra: Map::new(),
        }
    }

    pub fn from_record(record: &ModuleRecord) -> Self {
        Self {
            type_name: record.type_name.clone(),
            enabled: record.enabled,
            properties: record.properties.clone(),
            origin: TypeOrigin::Native,
            extra: record.extra.clone(),
        }
    }

    fn to_record(&self) -> ModuleRecord {
        ModuleRecord {
            type_name: self.type_name.clone(),
            enabled: self.enabled,
            properties: self.properties.clone(),
            extra: self.extra.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameObject {
    pub id: String,
    pub name: String,
    pub type_name: String,
    pub transform: Transform,
    pub active: bool,
    pub modules: Vec<ModuleInstance>,
    pub children: Vec<GameObject>,
    pub origin: TypeOrigin,
    extra: Map<String, Value>,
}

impl GameObject {
    pub fn new(name: &str, transform: Transform) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            type_name: TypeKey::GAME_OBJECT.to_string(),
            transform,
            active: true,
            modules: Vec::new(),
            children: Vec::new(),
            origin: TypeOrigin::Native,
            extra: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn find(&self, id: &str) -> Option<&GameObject> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    fn count(&self) -> usize {
        1 + self.children.iter().map(GameObject::count).sum::<usize>()
    }

    fn to_portable(&self) -> PortableObject {
        PortableObject {
            id: self.id.clone(),
            name: self.name.clone(),
            type_name: self.type_name.clone(),
            transform: self.transform.to_data(),
            active: self.active,
            modules: self.modules.iter().map(ModuleInstance::to_record).collect(),
            children: self.children.iter().map(GameObject::to_portable).collect(),
            extra: self.extra.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub name: String,
    pub settings: Value,
    pub objects: Vec<GameObject>,
    stand_ins: BTreeSet<String>,
    extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterializeError {
    /// A referenced type has no registry entry yet.
    MissingType(String),
    Malformed(String),
}

impl fmt::Display for MaterializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaterializeError::MissingType(key) => write!(f, "type '{key}' is not registered"),
            MaterializeError::Malformed(reason) => write!(f, "malformed scene data: {reason}"),
        }
    }
}

impl std::error::Error for MaterializeError {}

impl Scene {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            settings: Value::Object(Map::new()),
            objects: Vec::new(),
            stand_ins: BTreeSet::new(),
            extra: Map::new(),
        }
    }

    /// True when any part of the scene was built from a stand-in type.
    pub fn is_degraded(&self) -> bool {
        !self.stand_ins.is_empty()
    }

    pub fn stand_in_types(&self) -> impl Iterator<Item = &str> {
        self.stand_ins.iter().map(|key| key.as_str())
    }

    pub fn object_count(&self) -> usize {
        self.objects.iter().map(GameObject::count).sum()
    }

    /// Depth-first lookup through the whole object tree.
    pub fn find_object(&self, id: &str) -> Option<&GameObject> {
        self.objects.iter().find_map(|object| object.find(id))
    }

    pub fn to_portable(&self) -> Value {
        let data = PortableSceneData {
            name: self.name.clone(),
            type_name: TypeKey::SCENE.to_string(),
            settings: self.settings.clone(),
            game_objects: self.objects.iter().map(GameObject::to_portable).collect(),
            extra: self.extra.clone(),
        };
        serde_json::to_value(data).unwrap_or(Value::Null)
    }

    pub fn from_portable(value: &Value, registry: &TypeRegistry) -> Result<Self, MaterializeError> {
        let data: PortableSceneData =
            serde_json::from_value(value.clone()).map_err(|err| MaterializeError::Malformed(err.to_string()))?;
        let mut materializer = Materializer { registry, stand_ins: BTreeSet::new() };
        let mut scene = materializer.scene(&data.name)?;
        scene.settings = data.settings;
        scene.extra = data.extra;
        scene.objects = data
            .game_objects
            .iter()
            .map(|object| materializer.object(object))
            .collect::<Result<Vec<_>, _>>()?;
        scene.stand_ins = materializer.stand_ins;
        Ok(scene)
    }

    /// Every registry key a portable scene needs, read leniently so malformed scenes still report
    /// what they reference.
    pub fn referenced_types(value: &Value) -> BTreeSet<String> {
        let mut keys: BTreeSet<String> = TypeKey::core().iter().map(|key| key.to_string()).collect();
        if let Some(objects) = value.get("gameObjects").and_then(Value::as_array) {
            for object in objects {
                collect_object_types(object, &mut keys);
            }
        }
        keys
    }
}

fn collect_object_types(object: &Value, keys: &mut BTreeSet<String>) {
    if let Some(type_name) = object.get("type").and_then(Value::as_str) {
        keys.insert(TypeKey::object(type_name));
    }
    if let Some(modules) = object.get("modules").and_then(Value::as_array) {
        for module in modules {
            if let Some(type_name) = module.get("type").and_then(Value::as_str) {
                keys.insert(TypeKey::module(type_name));
            }
        }
    }
    if let Some(children) = object.get("children").and_then(Value::as_array) {
        for child in children {
            collect_object_types(child, keys);
        }
    }
}

struct Materializer<'a> {
    registry: &'a TypeRegistry,
    stand_ins: BTreeSet<String>,
}

impl<'a> Materializer<'a> {
    fn entry(&mut self, key: &str) -> Result<&'a TypeEntry, MaterializeError> {
        let entry = self.registry.get(key).ok_or_else(|| MaterializeError::MissingType(key.to_string()))?;
        if entry.origin == TypeOrigin::StandIn {
            self.stand_ins.insert(key.to_string());
        }
        Ok(entry)
    }

    fn mismatch(key: &str, entry: &TypeEntry) -> MaterializeError {
        MaterializeError::Malformed(format!(
            "type '{key}' is registered with a {} constructor",
            entry.constructor.kind_label()
        ))
    }

    fn scene(&mut self, name: &str) -> Result<Scene, MaterializeError> {
        let entry = self.entry(TypeKey::SCENE)?;
        match &entry.constructor {
            Constructor::Scene(construct) => Ok(construct(name)),
            _ => Err(Self::mismatch(TypeKey::SCENE, entry)),
        }
    }

    fn vector(&mut self, data: Vec2Data) -> Result<Vec2, MaterializeError> {
        let entry = self.entry(TypeKey::VECTOR2)?;
        match &entry.constructor {
            Constructor::Vector2(construct) => Ok(construct(data.x, data.y)),
            _ => Err(Self::mismatch(TypeKey::VECTOR2, entry)),
        }
    }

    fn object(&mut self, data: &PortableObject) -> Result<GameObject, MaterializeError> {
        let key = TypeKey::object(&data.type_name);
        let entry = self.entry(&key)?;
        let Constructor::GameObject(construct) = &entry.constructor else {
            return Err(Self::mismatch(&key, entry));
        };
        let transform = Transform {
            position: self.vector(data.transform.position)?,
            rotation: data.transform.rotation,
            scale: self.vector(data.transform.scale)?,
        };
        let mut object = construct(&data.name, transform);
        object.id = data.id.clone();
        object.type_name = data.type_name.clone();
        object.active = data.active;
        object.origin = entry.origin;
        object.extra = data.extra.clone();
        object.modules = data.modules.iter().map(|module| self.module(module)).collect::<Result<Vec<_>, _>>()?;
        object.children = data.children.iter().map(|child| self.object(child)).collect::<Result<Vec<_>, _>>()?;
        Ok(object)
    }

    fn module(&mut self, record: &ModuleRecord) -> Result<ModuleInstance, MaterializeError> {
        let base_entry = self.entry(TypeKey::MODULE)?;
        let Constructor::ModuleBase(base) = &base_entry.constructor else {
            return Err(Self::mismatch(TypeKey::MODULE, base_entry));
        };
        let key = TypeKey::module(&record.type_name);
        let entry = self.entry(&key)?;
        let Constructor::Module(specialize) = &entry.constructor else {
            return Err(Self::mismatch(&key, entry));
        };
        let mut module = specialize(base(record)).map_err(MaterializeError::Malformed)?;
        module.origin = entry.origin;
        Ok(module)
    }
}

/// A scene as it travels through a load: either built against the registry, or still the raw
/// bytes waiting for its types to become available.
#[derive(Debug, Clone)]
pub enum PortableScene {
    Materialized(Scene),
    RawPending(Vec<u8>),
}

impl PortableScene {
    pub fn pending(value: &Value) -> serde_json::Result<Self> {
        Ok(PortableScene::RawPending(serde_json::to_vec(value)?))
    }

    pub fn is_materialized(&self) -> bool {
        matches!(self, PortableScene::Materialized(_))
    }

    pub fn try_materialize(&mut self, registry: &TypeRegistry) -> Result<&Scene, MaterializeError> {
        if let PortableScene::RawPending(bytes) = self {
            let value: Value =
                serde_json::from_slice(bytes).map_err(|err| MaterializeError::Malformed(err.to_string()))?;
            let scene = Scene::from_portable(&value, registry)?;
            *self = PortableScene::Materialized(scene);
        }
        match self {
            PortableScene::Materialized(scene) => Ok(scene),
            PortableScene::RawPending(_) => Err(MaterializeError::Malformed("scene is still pending".to_string())),
        }
    }

    pub fn into_scene(self) -> Option<Scene> {
        match self {
            PortableScene::Materialized(scene) => Some(scene),
            PortableScene::RawPending(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_scene() -> Value {
        json!({
            "name": "Level 1",
            "type": "Scene",
            "settings": { "background": "#202020" },
            "gameObjects": [
                {
                    "id": "player",
                    "name": "Player",
                    "transform": { "position": { "x": 4.0, "y": -2.0 }, "rotation": 0.5, "scale": { "x": 1.0, "y": 1.0 } },
                    "modules": [
                        { "type": "SpriteRenderer", "properties": { "sprite": "/sprites/player.png" } },
                        { "type": "Tilemap", "enabled": false, "properties": { "tiles": [1, 2, 3] } }
                    ],
                    "children": [
                        { "id": "weapon", "name": "Weapon", "type": "Pickup", "rarity": "rare" }
                    ]
                }
            ]
        })
    }

    #[test]
    fn reports_missing_module_type() {
        let registry = TypeRegistry::with_engine_defaults();
        let err = Scene::from_portable(&sample_scene(), &registry).expect_err("Tilemap is unknown");
        assert_eq!(err, MaterializeError::MissingType("module:Tilemap".to_string()));
    }

    #[test]
    fn stand_ins_mark_scene_degraded_and_preserve_data() {
        let mut registry = TypeRegistry::with_engine_defaults();
        registry.register_with_origin("module:Tilemap", Constructor::passthrough_module(), TypeOrigin::StandIn);
        registry.register_with_origin(
            "object:Pickup",
            Constructor::GameObject(GameObject::new),
            TypeOrigin::StandIn,
        );
        let scene = Scene::from_portable(&sample_scene(), &registry).expect("materialize");
        assert!(scene.is_degraded());
        assert_eq!(scene.stand_in_types().collect::<Vec<_>>(), vec!["module:Tilemap", "object:Pickup"]);
        assert_eq!(scene.object_count(), 2);

        let weapon = scene.find_object("weapon").expect("nested lookup");
        assert_eq!(weapon.origin, TypeOrigin::StandIn);

        let portable = scene.to_portable();
        assert_eq!(portable["gameObjects"][0]["children"][0]["rarity"], json!("rare"));
        assert_eq!(portable["gameObjects"][0]["modules"][1]["properties"]["tiles"], json!([1, 2, 3]));
        assert_eq!(portable["gameObjects"][0]["modules"][1]["enabled"], json!(false));
    }

    #[test]
    fn referenced_types_walks_children() {
        let keys = Scene::referenced_types(&sample_scene());
        for key in ["Scene", "GameObject", "Vector2", "Module", "module:Tilemap", "object:Pickup"] {
            assert!(keys.contains(key), "missing {key}");
        }
    }

    #[test]
    fn pending_scene_materializes_once_types_exist() {
        let mut registry = TypeRegistry::with_engine_defaults();
        let mut pending = PortableScene::pending(&sample_scene()).expect("encode");
        assert!(pending.try_materialize(&registry).is_err());
        assert!(!pending.is_materialized());

        registry.register("module:Tilemap", Constructor::passthrough_module());
        registry.register("object:Pickup", Constructor::GameObject(GameObject::new));
        let scene = pending.try_materialize(&registry).expect("materialize");
        assert!(!scene.is_degraded());
        assert!(pending.is_materialized());
    }

    #[test]
    fn malformed_scene_is_rejected() {
        let registry = TypeRegistry::with_engine_defaults();
        let err = Scene::from_portable(&json!({ "gameObjects": 3 }), &registry).expect_err("no name");
        assert!(matches!(err, MaterializeError::Malformed(_)));
    }
}
