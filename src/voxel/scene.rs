//! Scene input of the voxelizer
//!
//! A scene is a list of triangle meshes, each with its own transform and a
//! shared material. Geometry is described in JSON (`SceneDescription`); the
//! voxelizer only reads it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use image::RgbaImage;
use serde::Deserialize;

use crate::core::{Error, Result};
use crate::math::Aabb;

/// Material channel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialSlot {
    #[default]
    Diffuse,
    Ambient,
    Specular,
    Emissive,
}

impl MaterialSlot {
    pub const ALL: [MaterialSlot; 4] = [Self::Diffuse, Self::Ambient, Self::Specular, Self::Emissive];

    fn index(self) -> usize {
        self as usize
    }
}

/// Color and optional texture of one material slot
#[derive(Clone, Debug)]
pub struct MaterialChannel {
    pub color: Vec4,
    pub texture: Option<Arc<RgbaImage>>,
}

impl MaterialChannel {
    fn solid(color: Vec4) -> Self {
        Self { color, texture: None }
    }

    /// Channel color, modulated by the nearest texel at `uv` (repeat wrap)
    pub fn sample(&self, uv: Option<Vec2>) -> Vec4 {
        match (&self.texture, uv) {
            (Some(texture), Some(uv)) if texture.width() > 0 && texture.height() > 0 => {
                let (w, h) = texture.dimensions();
                let u = uv.x - uv.x.floor();
                let v = uv.y - uv.y.floor();
                let x = ((u * w as f32) as u32).min(w - 1);
                let y = ((v * h as f32) as u32).min(h - 1);
                let texel = texture.get_pixel(x, y).0;
                let texel = Vec4::new(texel[0] as f32, texel[1] as f32, texel[2] as f32, texel[3] as f32) / 255.0;
                self.color * texel
            }
            _ => self.color,
        }
    }
}

/// Surface material shared between meshes
#[derive(Clone, Debug)]
pub struct Material {
    pub name: String,
    channels: [MaterialChannel; 4],
}

impl Material {
    /// White diffuse, black ambient/specular/emissive
    pub fn new(name: &str) -> Self {
        let black = MaterialChannel::solid(Vec4::new(0.0, 0.0, 0.0, 1.0));
        Self {
            name: name.to_string(),
            channels: [MaterialChannel::solid(Vec4::ONE), black.clone(), black.clone(), black],
        }
    }

    pub fn with_color(mut self, slot: MaterialSlot, color: Vec4) -> Self {
        self.channels[slot.index()].color = color;
        self
    }

    pub fn with_texture(mut self, slot: MaterialSlot, texture: Arc<RgbaImage>) -> Self {
        self.channels[slot.index()].texture = Some(texture);
        self
    }

    pub fn channel(&self, slot: MaterialSlot) -> &MaterialChannel {
        &self.channels[slot.index()]
    }

    pub fn color(&self, slot: MaterialSlot) -> Vec4 {
        self.channels[slot.index()].color
    }
}

/// Indexed triangle mesh
#[derive(Clone, Debug)]
pub struct Mesh {
    pub name: String,
    pub positions: Vec<Vec3>,
    pub uvs: Option<Vec<Vec2>>,
    pub indices: Vec<u32>,
    pub transform: Mat4,
    pub material: Arc<Material>,
}

impl Mesh {
    pub fn new(name: &str, positions: Vec<Vec3>, indices: Vec<u32>, material: Arc<Material>) -> Self {
        Self {
            name: name.to_string(),
            positions,
            uvs: None,
            indices,
            transform: Mat4::IDENTITY,
            material,
        }
    }

    /// Axis-aligned box made of 12 triangles
    pub fn cuboid(name: &str, min: Vec3, max: Vec3, material: Arc<Material>) -> Self {
        let positions = (0..8u32)
            .map(|i| {
                Vec3::new(
                    if i & 1 != 0 { max.x } else { min.x },
                    if i & 2 != 0 { max.y } else { min.y },
                    if i & 4 != 0 { max.z } else { min.z },
                )
            })
            .collect();
        #[rustfmt::skip]
        let indices = vec![
            0, 2, 1, 1, 2, 3, // -z
            4, 5, 6, 5, 7, 6, // +z
            0, 1, 4, 1, 5, 4, // -y
            2, 6, 3, 3, 6, 7, // +y
            0, 4, 2, 2, 4, 6, // -x
            1, 3, 5, 3, 7, 5, // +x
        ];
        Self::new(name, positions, indices, material)
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_uvs(mut self, uvs: Vec<Vec2>) -> Self {
        self.uvs = Some(uvs);
        self
    }

    /// Index count
    pub fn element_count(&self) -> usize {
        self.indices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Vertex indices of triangle `i`
    pub fn triangle(&self, i: usize) -> Option<[u32; 3]> {
        let tri = self.indices.get(i * 3..i * 3 + 3)?;
        Some([tri[0], tri[1], tri[2]])
    }

    /// Bounds of the vertices after `transform`
    pub fn transformed_bounds(&self) -> Aabb {
        Aabb::from_points(self.positions.iter().map(|&p| self.transform.transform_point3(p)))
    }

    fn validate(&self) -> Result<()> {
        if let Some(&bad) = self.indices.iter().find(|&&i| i as usize >= self.positions.len()) {
            return Err(Error::Scene(format!(
                "mesh '{}' index {} exceeds {} vertices",
                self.name,
                bad,
                self.positions.len()
            )));
        }
        if let Some(uvs) = &self.uvs {
            if uvs.len() != self.positions.len() {
                return Err(Error::Scene(format!(
                    "mesh '{}' has {} uvs for {} vertices",
                    self.name,
                    uvs.len(),
                    self.positions.len()
                )));
            }
        }
        if self.indices.len() % 3 != 0 {
            log::warn!(
                "Mesh '{}' has {} indices, not a multiple of 3; trailing indices ignored",
                self.name,
                self.indices.len()
            );
        }
        Ok(())
    }
}

/// Meshes to voxelize
#[derive(Clone, Debug, Default)]
pub struct Scene {
    meshes: Vec<Mesh>,
    bounds: Aabb,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> Result<()> {
        mesh.validate()?;
        if !mesh.positions.is_empty() {
            self.bounds = self.bounds.merged(&mesh.transformed_bounds());
        }
        self.meshes.push(mesh);
        Ok(())
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        self.meshes.iter().map(Mesh::triangle_count).sum()
    }

    /// Bounds of all transformed meshes
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn transformed_min(&self) -> Vec3 {
        self.bounds.min
    }

    pub fn transformed_max(&self) -> Vec3 {
        self.bounds.max
    }

    /// Extent of the transformed scene; zero for an empty scene
    pub fn transformed_size(&self) -> Vec3 {
        if self.bounds.is_valid() { self.bounds.size() } else { Vec3::ZERO }
    }
}

/// JSON scene description
///
/// ```json
/// {
///   "materials": { "brick": { "diffuse": [0.8, 0.3, 0.2, 1.0] } },
///   "meshes": [
///     { "name": "wall", "material": "brick",
///       "geometry": { "type": "cuboid", "min": [0, 0, 0], "max": [4, 2, 1] } }
///   ]
/// }
/// ```
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SceneDescription {
    pub materials: HashMap<String, MaterialDescription>,
    pub meshes: Vec<MeshDescription>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct MaterialDescription {
    pub diffuse: Option<[f32; 4]>,
    pub ambient: Option<[f32; 4]>,
    pub specular: Option<[f32; 4]>,
    pub emissive: Option<[f32; 4]>,
    /// Texture paths, relative to the description file
    pub diffuse_texture: Option<String>,
    pub ambient_texture: Option<String>,
    pub specular_texture: Option<String>,
    pub emissive_texture: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MeshDescription {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub material: Option<String>,
    #[serde(default)]
    pub transform: TransformDescription,
    pub geometry: GeometryDescription,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GeometryDescription {
    Triangles {
        positions: Vec<[f32; 3]>,
        #[serde(default)]
        uvs: Option<Vec<[f32; 2]>>,
        indices: Vec<u32>,
    },
    Cuboid {
        min: [f32; 3],
        max: [f32; 3],
    },
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TransformDescription {
    pub translation: [f32; 3],
    /// Quaternion (x, y, z, w)
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
}

impl Default for TransformDescription {
    fn default() -> Self {
        Self {
            translation: [0.0; 3],
            rotation: [0.0, 0.0, 0.0, 1.0],
            scale: [1.0; 3],
        }
    }
}

impl TransformDescription {
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            Vec3::from(self.scale),
            Quat::from_array(self.rotation).normalize(),
            Vec3::from(self.translation),
        )
    }
}

impl SceneDescription {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Scene(format!("invalid scene description: {}", e)))
    }

    /// Parse a description file and build its scene, textures resolved next to it
    pub fn load(path: &Path) -> Result<Scene> {
        let json = std::fs::read_to_string(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_json(&json)?.into_scene(base_dir)
    }

    pub fn into_scene(self, base_dir: &Path) -> Result<Scene> {
        let mut materials = HashMap::new();
        for (name, desc) in &self.materials {
            materials.insert(name.clone(), Arc::new(desc.build(name, base_dir)?));
        }
        let default_material = Arc::new(Material::new("default"));

        let mut scene = Scene::new();
        for (i, desc) in self.meshes.into_iter().enumerate() {
            let material = match &desc.material {
                Some(name) => materials
                    .get(name)
                    .cloned()
                    .ok_or_else(|| Error::Scene(format!("unknown material '{}'", name)))?,
                None => default_material.clone(),
            };
            let name = if desc.name.is_empty() { format!("mesh{}", i) } else { desc.name };

            let mesh = match desc.geometry {
                GeometryDescription::Triangles { positions, uvs, indices } => {
                    let mesh = Mesh::new(&name, positions.into_iter().map(Vec3::from).collect(), indices, material);
                    match uvs {
                        Some(uvs) => mesh.with_uvs(uvs.into_iter().map(Vec2::from).collect()),
                        None => mesh,
                    }
                }
                GeometryDescription::Cuboid { min, max } => {
                    Mesh::cuboid(&name, Vec3::from(min), Vec3::from(max), material)
                }
            };
            scene.add_mesh(mesh.with_transform(desc.transform.matrix()))?;
        }

        log::debug!(
            "Scene loaded: {} meshes, {} triangles",
            scene.meshes().len(),
            scene.triangle_count()
        );
        Ok(scene)
    }
}

impl MaterialDescription {
    fn build(&self, name: &str, base_dir: &Path) -> Result<Material> {
        let mut material = Material::new(name);
        let slots = [
            (MaterialSlot::Diffuse, self.diffuse, &self.diffuse_texture),
            (MaterialSlot::Ambient, self.ambient, &self.ambient_texture),
            (MaterialSlot::Specular, self.specular, &self.specular_texture),
            (MaterialSlot::Emissive, self.emissive, &self.emissive_texture),
        ];
        for (slot, color, texture) in slots {
            if let Some(color) = color {
                material = material.with_color(slot, Vec4::from(color));
            }
            let Some(file) = texture else {
                continue;
            };
            let path = base_dir.join(file);
            let texture = image::open(&path)
                .map_err(|e| Error::Scene(format!("texture {}: {}", path.display(), e)))?
                .to_rgba8();
            material = material.with_texture(slot, Arc::new(texture));
        }
        Ok(material)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn white() -> Arc<Material> {
        Arc::new(Material::new("white"))
    }

    #[test]
    fn test_material_defaults() {
        let m = Material::new("m");
        assert_eq!(m.color(MaterialSlot::Diffuse), Vec4::ONE);
        assert_eq!(m.color(MaterialSlot::Emissive), Vec4::new(0.0, 0.0, 0.0, 1.0));
        assert!(m.channel(MaterialSlot::Diffuse).texture.is_none());
    }

    #[test]
    fn test_nearest_texel_sample() {
        let mut texture = RgbaImage::new(2, 1);
        texture.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        texture.put_pixel(1, 0, image::Rgba([0, 0, 255, 255]));
        let m = Material::new("t")
            .with_color(MaterialSlot::Diffuse, Vec4::new(1.0, 1.0, 1.0, 0.5))
            .with_texture(MaterialSlot::Diffuse, Arc::new(texture));
        let channel = m.channel(MaterialSlot::Diffuse);

        assert_eq!(channel.sample(Some(Vec2::new(0.25, 0.5))), Vec4::new(1.0, 0.0, 0.0, 0.5));
        assert_eq!(channel.sample(Some(Vec2::new(0.75, 0.5))), Vec4::new(0.0, 0.0, 1.0, 0.5));
        // Repeat wrap
        assert_eq!(channel.sample(Some(Vec2::new(1.25, 0.5))), Vec4::new(1.0, 0.0, 0.0, 0.5));
        // No UVs: plain color
        assert_eq!(channel.sample(None), Vec4::new(1.0, 1.0, 1.0, 0.5));
    }

    #[test]
    fn test_cuboid_bounds() {
        let mesh = Mesh::cuboid("box", Vec3::ZERO, Vec3::new(2.0, 1.0, 4.0), white())
            .with_transform(Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)));
        assert_eq!(mesh.triangle_count(), 12);
        assert_eq!(mesh.element_count(), 36);
        let bounds = mesh.transformed_bounds();
        assert_eq!(bounds.min, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(bounds.max, Vec3::new(3.0, 1.0, 4.0));
    }

    #[test]
    fn test_scene_bounds_and_counts() {
        let mut scene = Scene::new();
        assert_eq!(scene.transformed_size(), Vec3::ZERO);
        scene.add_mesh(Mesh::cuboid("a", Vec3::ZERO, Vec3::ONE, white())).unwrap();
        scene.add_mesh(Mesh::cuboid("b", Vec3::splat(2.0), Vec3::splat(3.0), white())).unwrap();
        assert_eq!(scene.triangle_count(), 24);
        assert_eq!(scene.transformed_min(), Vec3::ZERO);
        assert_eq!(scene.transformed_size(), Vec3::splat(3.0));
    }

    #[test]
    fn test_rejects_bad_indices() {
        let mut scene = Scene::new();
        let mesh = Mesh::new("bad", vec![Vec3::ZERO; 3], vec![0, 1, 3], white());
        assert!(matches!(scene.add_mesh(mesh), Err(Error::Scene(_))));

        let mesh = Mesh::new("uv", vec![Vec3::ZERO; 3], vec![0, 1, 2], white()).with_uvs(vec![Vec2::ZERO]);
        assert!(matches!(scene.add_mesh(mesh), Err(Error::Scene(_))));
    }

    #[test]
    fn test_non_triangular_indices_are_tolerated() {
        let mut scene = Scene::new();
        let mesh = Mesh::new("quad", vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::ONE], vec![0, 1, 2, 3], white());
        scene.add_mesh(mesh).unwrap();
        assert_eq!(scene.triangle_count(), 1);
    }

    #[test]
    fn test_description() {
        let json = r#"{
            "materials": { "red": { "diffuse": [1, 0, 0, 1] } },
            "meshes": [
                { "name": "floor", "material": "red",
                  "transform": { "translation": [0, -1, 0] },
                  "geometry": { "type": "cuboid", "min": [0, 0, 0], "max": [4, 1, 4] } },
                { "geometry": { "type": "triangles",
                                "positions": [[0, 0, 0], [1, 0, 0], [0, 1, 0]],
                                "indices": [0, 1, 2] } }
            ]
        }"#;
        let scene = SceneDescription::from_json(json).unwrap().into_scene(Path::new(".")).unwrap();
        assert_eq!(scene.meshes().len(), 2);
        assert_eq!(scene.meshes()[0].material.color(MaterialSlot::Diffuse), Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(scene.meshes()[1].name, "mesh1");
        assert_eq!(scene.transformed_min(), Vec3::new(0.0, -1.0, 0.0));
        assert_eq!(scene.transformed_max(), Vec3::new(4.0, 0.0, 4.0));
    }

    #[test]
    fn test_description_unknown_material() {
        let json = r#"{ "meshes": [ { "material": "nope",
            "geometry": { "type": "cuboid", "min": [0, 0, 0], "max": [1, 1, 1] } } ] }"#;
        let result = SceneDescription::from_json(json).unwrap().into_scene(Path::new("."));
        assert!(matches!(result, Err(Error::Scene(_))));
    }
}
