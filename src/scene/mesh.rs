//! Mesh geometry, per-vertex color attribute and unlit material.

use std::ops::Range;

use glam::Vec3;

/// Unlit material used when rendering snapshots.
///
/// The rendered color is `base_color`, multiplied by the per-vertex color
/// when `vertex_colors` is set (black until the mesh has a color attribute).
/// Emitters are simply meshes with a bright `base_color`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Material {
    pub base_color: Vec3,
    pub vertex_colors: bool,
    pub double_sided: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            base_color: Vec3::ONE,
            vertex_colors: false,
            double_sided: false,
        }
    }
}

impl Material {
    /// Flat color, no vertex colors.
    pub fn color(base_color: Vec3) -> Self {
        Self { base_color, ..Self::default() }
    }

    /// White material that displays the mesh's vertex colors.
    pub fn vertex_colored() -> Self {
        Self { vertex_colors: true, ..Self::default() }
    }

    pub fn with_double_sided(mut self, double_sided: bool) -> Self {
        self.double_sided = double_sided;
        self
    }
}

/// Per-vertex RGB attribute with a pending upload range.
///
/// `update_range` is in vertex units and always covers every vertex written
/// since the last [`take_update_range`](Self::take_update_range).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VertexColors {
    data: Vec<[f32; 3]>,
    update_range: Option<Range<usize>>,
    version: u64,
}

impl VertexColors {
    /// Zero-initialised attribute for `vertex_count` vertices.
    pub fn zeroed(vertex_count: usize) -> Self {
        Self {
            data: vec![[0.0; 3]; vertex_count],
            update_range: None,
            version: 0,
        }
    }

    /// Attribute from existing values. Nothing is marked for upload.
    pub fn from_values(values: Vec<[f32; 3]>) -> Self {
        Self { data: values, update_range: None, version: 0 }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Vec3> {
        self.data.get(index).map(|c| Vec3::from_array(*c))
    }

    /// Raw values, three floats per vertex.
    pub fn as_slice(&self) -> &[[f32; 3]] {
        &self.data
    }

    /// Values flattened to `3 * len` floats, ready for a GPU upload.
    pub fn as_floats(&self) -> &[f32] {
        bytemuck::cast_slice(&self.data)
    }

    /// Incremented on every write.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Store `rgb` at `index` and extend the update range over it.
    ///
    /// # Panics
    /// Panics if `index >= len()`.
    pub fn set(&mut self, index: usize, rgb: Vec3) {
        self.data[index] = rgb.to_array();
        self.mark_dirty(index..index + 1);
        self.version += 1;
    }

    /// Extend the pending update range to cover `range`.
    pub fn mark_dirty(&mut self, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        self.update_range = Some(match self.update_range.take() {
            Some(r) => r.start.min(range.start)..r.end.max(range.end),
            None => range,
        });
    }

    /// Pending update range without clearing it.
    pub fn update_range(&self) -> Option<Range<usize>> {
        self.update_range.clone()
    }

    /// Return and clear the pending update range.
    pub fn take_update_range(&mut self) -> Option<Range<usize>> {
        self.update_range.take()
    }
}

/// Indexed triangle mesh.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    /// Vertex positions in object space.
    pub positions: Vec<Vec3>,
    /// Vertex normals in object space.
    pub normals: Option<Vec<Vec3>>,
    /// Per-vertex colors, created by the baker on first use.
    pub colors: Option<VertexColors>,
    /// Triangle list, three indices per face.
    pub indices: Vec<u32>,
    pub material: Material,
}

impl Mesh {
    pub fn new(positions: Vec<Vec3>, normals: Option<Vec<Vec3>>, indices: Vec<u32>) -> Self {
        Self {
            positions,
            normals,
            colors: None,
            indices,
            material: Material::default(),
        }
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Color the mesh shows at vertex `index` when rendered unlit.
    ///
    /// A vertex-colored material without a color attribute (or without an
    /// entry for `index`) renders black, like an unbound vertex attribute.
    pub fn shaded_color(&self, index: usize) -> Vec3 {
        let base = self.material.base_color;
        if !self.material.vertex_colors {
            return base;
        }
        self.colors
            .as_ref()
            .and_then(|c| c.get(index))
            .map_or(Vec3::ZERO, |c| base * c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_colors_update_range_union() {
        let mut c = VertexColors::zeroed(10);
        assert_eq!(c.update_range(), None);

        c.set(4, Vec3::ONE);
        c.set(2, Vec3::ONE);
        assert_eq!(c.update_range(), Some(2..5));
        assert_eq!(c.version(), 2);

        assert_eq!(c.take_update_range(), Some(2..5));
        assert_eq!(c.take_update_range(), None);
    }

    #[test]
    fn test_vertex_colors_floats() {
        let mut c = VertexColors::zeroed(2);
        c.set(1, Vec3::new(0.1, 0.2, 0.3));
        assert_eq!(c.as_floats(), &[0.0, 0.0, 0.0, 0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_shaded_color() {
        let mut mesh = Mesh::new(vec![Vec3::ZERO; 2], None, vec![])
            .with_material(Material::vertex_colored());
        assert_eq!(mesh.shaded_color(0), Vec3::ZERO);

        let mut colors = VertexColors::zeroed(2);
        colors.set(1, Vec3::new(0.5, 0.25, 0.0));
        mesh.colors = Some(colors);
        assert_eq!(mesh.shaded_color(0), Vec3::ZERO);
        assert_eq!(mesh.shaded_color(1), Vec3::new(0.5, 0.25, 0.0));

        mesh.material.vertex_colors = false;
        assert_eq!(mesh.shaded_color(1), Vec3::ONE);
    }
}
