//! Immutable scene snapshots used as the light source of one bounce.

use std::sync::atomic::{AtomicU64, Ordering};

use glam::Vec3;

use super::Scene;
use crate::util::BBox3f;

/// One mesh flattened to world space with its unlit colors resolved.
#[derive(Clone, Debug)]
pub struct DrawBatch {
    pub name: String,
    /// World-space vertex positions.
    pub positions: Vec<Vec3>,
    /// Resolved per-vertex colors (material base color times vertex color).
    pub colors: Vec<Vec3>,
    pub indices: Vec<u32>,
    pub double_sided: bool,
    /// World-space bounds of `positions`.
    pub bounds: BBox3f,
}

impl DrawBatch {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Deep copy of a scene taken at the start of a bounce.
///
/// Owns an independent [`Scene`] plus a world-space draw list derived from
/// it. Nothing is exposed mutably, so a snapshot never changes after
/// [`capture`].
#[derive(Debug)]
pub struct Snapshot {
    id: u64,
    generation: u32,
    scene: Scene,
    draws: Vec<DrawBatch>,
}

static NEXT_SNAPSHOT_ID: AtomicU64 = AtomicU64::new(1);

impl Snapshot {
    /// Process-unique id. Backends key cached GPU geometry on it.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Bounce index this snapshot was captured for.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn draws(&self) -> &[DrawBatch] {
        &self.draws
    }

    pub fn triangle_count(&self) -> usize {
        self.draws.iter().map(DrawBatch::triangle_count).sum()
    }
}

/// Deep-copy `scene` into a new snapshot tagged with `generation`.
///
/// Invisible objects are kept in the copied scene but contribute no draws.
/// Triangles referencing out-of-range vertices are dropped.
#[tracing::instrument(skip_all, fields(generation = generation))]
pub fn capture(scene: &Scene, generation: u32) -> Snapshot {
    let scene = scene.clone();
    let mut draws = Vec::new();

    scene.for_each_visible_mesh(|obj, mesh, world| {
        let vertex_count = mesh.vertex_count();
        let positions: Vec<Vec3> = mesh
            .positions
            .iter()
            .map(|p| world.transform_point3(*p))
            .collect();
        let colors = (0..vertex_count).map(|i| mesh.shaded_color(i)).collect();
        let indices: Vec<u32> = mesh
            .indices
            .chunks_exact(3)
            .filter(|tri| tri.iter().all(|&i| (i as usize) < vertex_count))
            .flatten()
            .copied()
            .collect();

        let mut bounds = BBox3f::EMPTY;
        for p in &positions {
            bounds.expand_by_point(*p);
        }

        draws.push(DrawBatch {
            name: obj.name.clone(),
            positions,
            colors,
            indices,
            double_sided: mesh.material.double_sided,
            bounds,
        });
    });

    tracing::debug!(draws = draws.len(), "captured snapshot");
    Snapshot {
        id: NEXT_SNAPSHOT_ID.fetch_add(1, Ordering::Relaxed),
        generation,
        scene,
        draws,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Material, Mesh, SceneObject, VertexColors};
    use glam::Mat4;

    fn tri_scene() -> Scene {
        let mut mesh = Mesh::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            Some(vec![Vec3::Z; 3]),
            vec![0, 1, 2, 0, 1, 7],
        )
        .with_material(Material::vertex_colored());
        mesh.colors = Some(VertexColors::from_values(vec![[0.5, 0.5, 0.5]; 3]));
        let mut scene = Scene::new();
        scene.add(
            SceneObject::mesh("tri", mesh)
                .with_transform(Mat4::from_translation(Vec3::new(0.0, 0.0, -2.0))),
        );
        scene
    }

    #[test]
    fn test_capture_flattens_to_world() {
        let snap = capture(&tri_scene(), 3);
        assert_eq!(snap.generation(), 3);
        assert_eq!(snap.draws().len(), 1);

        let draw = &snap.draws()[0];
        assert_eq!(draw.positions[1], Vec3::new(1.0, 0.0, -2.0));
        assert_eq!(draw.colors[0], Vec3::splat(0.5));
        // Second triangle references vertex 7 and is dropped.
        assert_eq!(draw.indices, vec![0, 1, 2]);
        assert_eq!(draw.bounds.min, Vec3::new(0.0, 0.0, -2.0));
        assert_eq!(draw.bounds.max, Vec3::new(1.0, 1.0, -2.0));
    }

    #[test]
    fn test_capture_is_independent_of_source() {
        let mut scene = tri_scene();
        let snap = capture(&scene, 0);

        let mesh = scene.find_mut("tri").unwrap().mesh.as_mut().unwrap();
        mesh.colors.as_mut().unwrap().set(0, Vec3::ONE);

        let copied = snap.scene().find("tri").unwrap().mesh.as_ref().unwrap();
        assert_eq!(copied.colors.as_ref().unwrap().get(0), Some(Vec3::splat(0.5)));
        assert_eq!(snap.draws()[0].colors[0], Vec3::splat(0.5));
    }

    #[test]
    fn test_invisible_objects_not_drawn() {
        let mut scene = tri_scene();
        scene.find_mut("tri").unwrap().visible = false;
        let snap = capture(&scene, 0);
        assert!(snap.draws().is_empty());
        assert!(snap.scene().find("tri").is_some());
    }

    #[test]
    fn test_snapshot_ids_unique() {
        let scene = tri_scene();
        let a = capture(&scene, 0);
        let b = capture(&scene, 0);
        assert_ne!(a.id(), b.id());
    }
}
