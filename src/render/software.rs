//! CPU rasterizer backend.
//!
//! Draws the snapshot's world-space triangles with a depth buffer,
//! near-plane clipping, back-face culling and perspective-correct color
//! interpolation. Matches the GPU backend's conventions: `[0, 1]` clip
//! depth, counter-clockwise front faces, top row stored first.

use glam::{Mat4, Vec2, Vec3, Vec4};
use smallvec::SmallVec;

use super::{to_rgba8, RenderBackend, SampleTarget, SampleView, BYTES_PER_PIXEL};
use crate::scene::Snapshot;
use crate::util::{BBox3f, Result};

#[derive(Clone, Copy, Debug)]
struct ClipVertex {
    pos: Vec4,
    color: Vec3,
}

impl ClipVertex {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        Self {
            pos: self.pos.lerp(other.pos, t),
            color: self.color.lerp(other.color, t),
        }
    }
}

/// Vertex after the perspective divide.
#[derive(Clone, Copy, Debug)]
struct ScreenVertex {
    xy: Vec2,
    depth: f32,
    inv_w: f32,
    color_over_w: Vec3,
}

type Polygon = SmallVec<[ClipVertex; 8]>;

/// Software rasterizer. Keeps its depth buffer between samples.
#[derive(Debug, Default)]
pub struct SoftwareRenderer {
    resolution: u32,
    depth: Vec<f32>,
}

impl SoftwareRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn rasterize(&mut self, tri: [ScreenVertex; 3], double_sided: bool, target: &mut SampleTarget) {
        let [v0, v1, v2] = tri;
        let area = edge(v0.xy, v1.xy, v2.xy);
        // Screen y points down, so counter-clockwise (front) faces have negative area.
        if area == 0.0 || (!double_sided && area > 0.0) {
            return;
        }

        let res = self.resolution as f32;
        let min = v0.xy.min(v1.xy).min(v2.xy).max(Vec2::ZERO);
        let max = v0.xy.max(v1.xy).max(v2.xy).min(Vec2::splat(res));
        if min.x >= max.x || min.y >= max.y {
            return;
        }

        // Orient every edge so the interior is positive for either winding.
        let sign = area.signum();
        let edges = [(v1.xy, v2.xy), (v2.xy, v0.xy), (v0.xy, v1.xy)];
        let top_left = edges.map(|(a, b)| is_top_left(a, b, sign));
        let inv_area = 1.0 / area.abs();
        let width = self.resolution as usize;
        let pixels = target.pixels_mut();

        for py in (min.y.floor() as usize)..(max.y.ceil() as usize).min(width) {
            for px in (min.x.floor() as usize)..(max.x.ceil() as usize).min(width) {
                let p = Vec2::new(px as f32 + 0.5, py as f32 + 0.5);
                let w = edges.map(|(a, b)| edge(a, b, p) * sign);
                let covered = (0..3).all(|k| w[k] > 0.0 || (w[k] == 0.0 && top_left[k]));
                if !covered {
                    continue;
                }
                let [b0, b1, b2] = w.map(|e| e * inv_area);

                let depth = b0 * v0.depth + b1 * v1.depth + b2 * v2.depth;
                let idx = py * width + px;
                if !(0.0..=1.0).contains(&depth) || depth >= self.depth[idx] {
                    continue;
                }
                self.depth[idx] = depth;

                let inv_w = b0 * v0.inv_w + b1 * v1.inv_w + b2 * v2.inv_w;
                let color =
                    (v0.color_over_w * b0 + v1.color_over_w * b1 + v2.color_over_w * b2) / inv_w;
                let offset = idx * BYTES_PER_PIXEL;
                pixels[offset..offset + BYTES_PER_PIXEL].copy_from_slice(&to_rgba8(color));
            }
        }
    }

    fn to_screen(&self, v: &ClipVertex) -> ScreenVertex {
        let inv_w = 1.0 / v.pos.w;
        let ndc = v.pos.truncate() * inv_w;
        let res = self.resolution as f32;
        ScreenVertex {
            xy: Vec2::new((ndc.x * 0.5 + 0.5) * res, (0.5 - ndc.y * 0.5) * res),
            depth: ndc.z,
            inv_w,
            color_over_w: v.color * inv_w,
        }
    }
}

impl RenderBackend for SoftwareRenderer {
    fn prepare_target(&mut self, resolution: u32) -> Result<()> {
        self.resolution = resolution;
        self.depth = vec![f32::INFINITY; (resolution as usize).pow(2)];
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all, fields(generation = snapshot.generation()))]
    fn render(&mut self, snapshot: &Snapshot, view: &SampleView, target: &mut SampleTarget) -> Result<()> {
        if self.resolution != target.resolution() {
            self.prepare_target(target.resolution())?;
        }
        self.depth.fill(f32::INFINITY);
        target.clear(to_rgba8(view.background));

        for draw in snapshot.draws() {
            if behind_near_plane(&draw.bounds, &view.view_proj) {
                continue;
            }
            for tri in draw.indices.chunks_exact(3) {
                let polygon: Polygon = tri
                    .iter()
                    .map(|&i| ClipVertex {
                        pos: view.view_proj * draw.positions[i as usize].extend(1.0),
                        color: draw.colors[i as usize],
                    })
                    .collect();

                let clipped = clip_near(&polygon);
                if clipped.len() < 3 {
                    continue;
                }
                let screen: SmallVec<[ScreenVertex; 8]> =
                    clipped.iter().map(|v| self.to_screen(v)).collect();
                for k in 1..screen.len() - 1 {
                    self.rasterize([screen[0], screen[k], screen[k + 1]], draw.double_sided, target);
                }
            }
        }
        Ok(())
    }
}

/// Twice the signed area of triangle `(a, b, p)`.
#[inline]
fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Pixels exactly on an edge belong to the triangle only for top and left
/// edges, so shared edges are drawn once. `sign` orients the edge so the
/// interior is on its positive side. Screen y points down.
#[inline]
fn is_top_left(a: Vec2, b: Vec2, sign: f32) -> bool {
    // Gradient of the oriented edge function points into the triangle.
    let gx = -(b.y - a.y) * sign;
    let gy = (b.x - a.x) * sign;
    gx > 0.0 || (gx == 0.0 && gy > 0.0)
}

/// Whole box on the far side of the near plane.
fn behind_near_plane(bounds: &BBox3f, view_proj: &Mat4) -> bool {
    bounds.is_empty()
        || bounds
            .corners()
            .iter()
            .all(|c| (*view_proj * c.extend(1.0)).z < 0.0)
}

/// Clip a convex polygon against the near plane (`z >= 0` in clip space).
fn clip_near(polygon: &Polygon) -> Polygon {
    let mut out = Polygon::new();
    for (i, curr) in polygon.iter().enumerate() {
        let next = &polygon[(i + 1) % polygon.len()];
        let (dc, dn) = (curr.pos.z, next.pos.z);
        if dc >= 0.0 {
            out.push(*curr);
        }
        if (dc >= 0.0) != (dn >= 0.0) {
            out.push(curr.lerp(next, dc / (dc - dn)));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{capture, primitives, Material, Scene, SceneObject};

    const RES: u32 = 32;

    fn view_from(eye: Vec3, dir: Vec3, background: Vec3) -> SampleView {
        let view = Mat4::look_at_rh(eye, eye + dir, Vec3::Y);
        let proj = Mat4::perspective_rh(90f32.to_radians(), 1.0, 0.01, 100.0);
        SampleView { view, proj, view_proj: proj * view, eye, background }
    }

    fn render(scene: &Scene, view: &SampleView) -> Vec3 {
        let mut renderer = SoftwareRenderer::new();
        renderer.prepare_target(RES).unwrap();
        let mut target = SampleTarget::new(RES);
        renderer.render(&capture(scene, 0), view, &mut target).unwrap();
        target.mean_rgb()
    }

    fn wall_scene(transform: Mat4, material: Material) -> Scene {
        let mut scene = Scene::new();
        scene.add(
            SceneObject::mesh("wall", primitives::plane(10.0, 10.0).with_material(material))
                .with_transform(transform),
        );
        scene
    }

    #[test]
    fn test_empty_snapshot_is_background() {
        let view = view_from(Vec3::ZERO, Vec3::NEG_Z, Vec3::new(0.0, 0.0, 1.0));
        assert_eq!(render(&Scene::new(), &view), Vec3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_front_facing_quad_fills_view() {
        let color = Vec3::new(1.0, 0.25, 0.0);
        let scene = wall_scene(Mat4::from_translation(Vec3::NEG_Z), Material::color(color));
        let mean = render(&scene, &view_from(Vec3::ZERO, Vec3::NEG_Z, Vec3::ZERO));
        assert!((mean - Vec3::new(1.0, 64.0 / 255.0, 0.0)).length() < 1e-6, "{mean:?}");
    }

    #[test]
    fn test_back_face_culled_unless_double_sided() {
        let transform = Mat4::from_translation(Vec3::NEG_Z) * Mat4::from_rotation_y(std::f32::consts::PI);
        let view = view_from(Vec3::ZERO, Vec3::NEG_Z, Vec3::ZERO);

        let culled = wall_scene(transform, Material::color(Vec3::ONE));
        assert_eq!(render(&culled, &view), Vec3::ZERO);

        let double = wall_scene(transform, Material::color(Vec3::ONE).with_double_sided(true));
        assert!((render(&double, &view) - Vec3::ONE).length() < 1e-6);
    }

    #[test]
    fn test_geometry_behind_camera_clipped() {
        let scene = wall_scene(
            Mat4::from_translation(Vec3::Z) * Mat4::from_rotation_y(std::f32::consts::PI),
            Material::color(Vec3::ONE).with_double_sided(true),
        );
        let mean = render(&scene, &view_from(Vec3::ZERO, Vec3::NEG_Z, Vec3::ZERO));
        assert_eq!(mean, Vec3::ZERO);
    }

    #[test]
    fn test_floor_straddling_near_plane_covers_lower_half() {
        let mut scene = Scene::new();
        scene.add(
            SceneObject::mesh(
                "floor",
                primitives::plane(200.0, 200.0).with_material(Material::color(Vec3::ONE)),
            )
            .with_transform(
                Mat4::from_translation(Vec3::NEG_Y)
                    * Mat4::from_rotation_x(-std::f32::consts::FRAC_PI_2),
            ),
        );
        let mean = render(&scene, &view_from(Vec3::ZERO, Vec3::NEG_Z, Vec3::ZERO));
        assert!((mean.x - 0.5).abs() < 1e-6, "{mean:?}");
    }

    #[test]
    fn test_depth_nearest_wins() {
        let mut scene = wall_scene(
            Mat4::from_translation(Vec3::new(0.0, 0.0, -2.0)),
            Material::color(Vec3::new(1.0, 0.0, 0.0)),
        );
        scene.add(
            SceneObject::mesh(
                "near",
                primitives::plane(10.0, 10.0).with_material(Material::color(Vec3::new(0.0, 1.0, 0.0))),
            )
            .with_transform(Mat4::from_translation(Vec3::NEG_Z)),
        );
        let mean = render(&scene, &view_from(Vec3::ZERO, Vec3::NEG_Z, Vec3::ZERO));
        assert!((mean - Vec3::Y).length() < 1e-6, "{mean:?}");
    }

    /// Pixels covered by one triangle on a cleared 4x4 target.
    fn coverage(tri: [Vec2; 3]) -> usize {
        let mut renderer = SoftwareRenderer::new();
        renderer.prepare_target(4).unwrap();
        let mut target = SampleTarget::new(4);
        target.clear([0, 0, 0, 255]);
        let vertex = |xy| ScreenVertex { xy, depth: 0.5, inv_w: 1.0, color_over_w: Vec3::ONE };
        renderer.rasterize(tri.map(vertex), true, &mut target);
        target.pixels().chunks_exact(BYTES_PER_PIXEL).filter(|p| p[0] == 255).count()
    }

    #[test]
    fn test_shared_edge_drawn_once() {
        // The diagonal passes through four pixel centers.
        let (a, b, c, d) = (Vec2::ZERO, Vec2::new(4.0, 0.0), Vec2::splat(4.0), Vec2::new(0.0, 4.0));
        let lower = coverage([a, b, c]);
        let upper = coverage([a, c, d]);
        assert_eq!(lower + upper, 16, "lower {lower} upper {upper}");
        // Winding does not change which side owns the edge.
        assert_eq!(coverage([a, c, b]), lower);
    }

    #[test]
    fn test_behind_near_plane() {
        let view = view_from(Vec3::ZERO, Vec3::NEG_Z, Vec3::ZERO);
        let behind = BBox3f::new(Vec3::new(-1.0, -1.0, 1.0), Vec3::new(1.0, 1.0, 2.0));
        let straddling = BBox3f::new(Vec3::new(-1.0, -1.0, -2.0), Vec3::new(1.0, 1.0, 2.0));
        assert!(behind_near_plane(&behind, &view.view_proj));
        assert!(!behind_near_plane(&straddling, &view.view_proj));
        assert!(behind_near_plane(&BBox3f::EMPTY, &view.view_proj));
    }

    #[test]
    fn test_clip_near_splits_polygon() {
        let v = |z: f32| ClipVertex { pos: Vec4::new(0.0, 0.0, z, 1.0), color: Vec3::ZERO };
        let poly: Polygon = [v(1.0), v(-1.0), v(1.0)].into_iter().collect();
        let clipped = clip_near(&poly);
        assert_eq!(clipped.len(), 4);
        assert!(clipped.iter().all(|c| c.pos.z >= 0.0));
    }
}
