//! Procedural meshes and the demonstration scene used by the CLI and tests.

use std::f32::consts::{FRAC_PI_2, PI, TAU};

use glam::{Mat4, Vec3};

use super::{Material, Mesh, Scene, SceneObject};

/// Name of the baked object in [`demo_scene`].
pub const DEMO_TARGET: &str = "torus";

/// Quad in the XY plane facing +Z, centered at the origin.
pub fn plane(width: f32, height: f32) -> Mesh {
    let (hw, hh) = (width * 0.5, height * 0.5);
    let positions = vec![
        Vec3::new(-hw, -hh, 0.0),
        Vec3::new(hw, -hh, 0.0),
        Vec3::new(hw, hh, 0.0),
        Vec3::new(-hw, hh, 0.0),
    ];
    Mesh::new(positions, Some(vec![Vec3::Z; 4]), vec![0, 1, 2, 0, 2, 3])
}

/// Sphere with outward-facing triangles.
pub fn uv_sphere(radius: f32, segments: u32, rings: u32) -> Mesh {
    let segments = segments.max(3);
    let rings = rings.max(2);
    let mut positions = Vec::new();
    let mut normals = Vec::new();

    for ring in 0..=rings {
        let phi = PI * ring as f32 / rings as f32;
        for seg in 0..=segments {
            let theta = TAU * seg as f32 / segments as f32;
            let n = Vec3::new(phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin());
            positions.push(n * radius);
            normals.push(n);
        }
    }

    Mesh::new(positions, Some(normals), grid_indices(rings, segments))
}

/// Torus around the Y axis with outward-facing triangles.
pub fn torus(radius: f32, tube: f32, radial_segments: u32, tubular_segments: u32) -> Mesh {
    let radial_segments = radial_segments.max(3);
    let tubular_segments = tubular_segments.max(3);
    let mut positions = Vec::new();
    let mut normals = Vec::new();

    for i in 0..=radial_segments {
        let u = TAU * i as f32 / radial_segments as f32;
        let center = Vec3::new(radius * u.cos(), 0.0, radius * u.sin());
        for j in 0..=tubular_segments {
            let v = TAU * j as f32 / tubular_segments as f32;
            let n = Vec3::new(v.cos() * u.cos(), v.sin(), v.cos() * u.sin());
            positions.push(center + n * tube);
            normals.push(n);
        }
    }

    Mesh::new(positions, Some(normals), grid_indices(radial_segments, tubular_segments))
}

/// Triangles for a `(rows + 1) x (cols + 1)` vertex grid.
fn grid_indices(rows: u32, cols: u32) -> Vec<u32> {
    let mut indices = Vec::with_capacity((rows * cols * 6) as usize);
    for row in 0..rows {
        for col in 0..cols {
            let curr = row * (cols + 1) + col;
            let next = curr + cols + 1;
            indices.extend_from_slice(&[curr, curr + 1, next, next, curr + 1, next + 1]);
        }
    }
    indices
}

/// Closed room of the given size with inward-facing walls and an emissive
/// ceiling panel, centered at the origin.
pub fn room(size: f32) -> SceneObject {
    let half = size * 0.5;
    let wall = |name: &str, color: Vec3, transform: Mat4| {
        SceneObject::mesh(name, plane(size, size).with_material(Material::color(color)))
            .with_transform(transform)
    };

    let grey = Vec3::splat(0.15);
    let light = SceneObject::mesh(
        "light",
        plane(size * 0.4, size * 0.4).with_material(Material::color(Vec3::ONE)),
    )
    .with_transform(
        Mat4::from_translation(Vec3::new(0.0, half - 0.01, 0.0)) * Mat4::from_rotation_x(FRAC_PI_2),
    );

    SceneObject::group("room")
        .with_child(wall(
            "floor",
            grey,
            Mat4::from_translation(Vec3::new(0.0, -half, 0.0)) * Mat4::from_rotation_x(-FRAC_PI_2),
        ))
        .with_child(wall(
            "ceiling",
            grey,
            Mat4::from_translation(Vec3::new(0.0, half, 0.0)) * Mat4::from_rotation_x(FRAC_PI_2),
        ))
        .with_child(wall("back", grey, Mat4::from_translation(Vec3::new(0.0, 0.0, -half))))
        .with_child(wall(
            "front",
            grey,
            Mat4::from_translation(Vec3::new(0.0, 0.0, half)) * Mat4::from_rotation_y(PI),
        ))
        .with_child(wall(
            "left",
            Vec3::new(0.4, 0.05, 0.05),
            Mat4::from_translation(Vec3::new(-half, 0.0, 0.0)) * Mat4::from_rotation_y(FRAC_PI_2),
        ))
        .with_child(wall(
            "right",
            Vec3::new(0.05, 0.4, 0.05),
            Mat4::from_translation(Vec3::new(half, 0.0, 0.0)) * Mat4::from_rotation_y(-FRAC_PI_2),
        ))
        .with_child(light)
}

/// Room with a vertex-colored torus in the middle, named [`DEMO_TARGET`].
///
/// `segments` controls the torus tessellation; the vertex count is
/// `(segments + 1) * (segments / 2 + 1)`.
pub fn demo_scene(segments: u32) -> Scene {
    let segments = segments.max(3);
    let torus = torus(0.6, 0.25, segments, (segments / 2).max(3))
        .with_material(Material::vertex_colored());

    let mut scene = Scene::new();
    scene.add(room(3.0));
    scene.add(SceneObject::mesh(DEMO_TARGET, torus).with_transform(Mat4::from_rotation_x(0.4)));
    scene
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face_normals_agree(mesh: &Mesh) -> bool {
        let normals = mesh.normals.as_ref().unwrap();
        mesh.indices.chunks_exact(3).all(|tri| {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| mesh.positions[i as usize]);
            let face = (b - a).cross(c - a);
            if face.length_squared() < 1e-12 {
                return true; // degenerate at poles
            }
            face.dot(normals[tri[0] as usize] + normals[tri[1] as usize] + normals[tri[2] as usize]) > 0.0
        })
    }

    #[test]
    fn test_plane_faces_z() {
        let mesh = plane(2.0, 1.0);
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.triangle_count(), 2);
        assert!(face_normals_agree(&mesh));
    }

    #[test]
    fn test_sphere_winding_outward() {
        let mesh = uv_sphere(1.0, 12, 6);
        assert_eq!(mesh.vertex_count(), 13 * 7);
        assert!(face_normals_agree(&mesh));
    }

    #[test]
    fn test_torus_winding_outward() {
        let mesh = torus(1.0, 0.3, 16, 8);
        assert_eq!(mesh.vertex_count(), 17 * 9);
        assert_eq!(mesh.triangle_count(), 16 * 8 * 2);
        assert!(face_normals_agree(&mesh));
    }

    #[test]
    fn test_demo_scene_layout() {
        let scene = demo_scene(24);
        let target = scene.find(DEMO_TARGET).expect("target");
        assert_eq!(target.mesh.as_ref().unwrap().vertex_count(), 25 * 13);
        assert!(scene.find("light").is_some());

        // Light panel faces down into the room.
        let world = scene.world_transform("light").unwrap();
        let n = world.transform_vector3(Vec3::Z);
        assert!((n - Vec3::NEG_Y).length() < 1e-5);

        // Floor faces up.
        let world = scene.world_transform("floor").unwrap();
        assert!((world.transform_vector3(Vec3::Z) - Vec3::Y).length() < 1e-5);
    }
}
