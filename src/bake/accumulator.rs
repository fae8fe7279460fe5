//! Writes samples into the target mesh's color attribute.

use std::ops::Range;

use glam::Vec3;

use crate::scene::VertexColors;

/// Borrowed writer over a mesh's [`VertexColors`].
pub struct Accumulator<'a> {
    colors: &'a mut VertexColors,
    clamp: bool,
}

impl<'a> Accumulator<'a> {
    /// Borrow the color attribute, creating it zero-filled with
    /// `vertex_count` entries if the mesh has none yet.
    pub fn attach(colors: &'a mut Option<VertexColors>, vertex_count: usize) -> Self {
        let colors = colors.get_or_insert_with(|| {
            tracing::debug!(vertex_count, "creating color attribute");
            VertexColors::zeroed(vertex_count)
        });
        Self::new(colors)
    }

    /// Writer over an existing attribute.
    pub fn new(colors: &'a mut VertexColors) -> Self {
        Self { colors, clamp: false }
    }

    /// Clamp every written channel to [0, 1].
    pub fn with_clamp(mut self, clamp: bool) -> Self {
        self.clamp = clamp;
        self
    }

    /// Store `rgb` for vertex `index` and extend the dirty range over it.
    ///
    /// # Panics
    /// Panics if `index` is out of range.
    pub fn write(&mut self, index: usize, rgb: Vec3) {
        let rgb = if self.clamp {
            rgb.clamp(Vec3::ZERO, Vec3::ONE)
        } else {
            rgb
        };
        self.colors.set(index, rgb);
    }

    /// Return and reset the minimal vertex range written since the last flush.
    pub fn flush(&mut self) -> Option<Range<usize>> {
        self.colors.take_update_range()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_creates_zeroed() {
        let mut colors = None;
        Accumulator::attach(&mut colors, 5);
        let colors = colors.expect("created");
        assert_eq!(colors.len(), 5);
        assert_eq!(colors.as_floats(), &[0.0; 15]);
        assert_eq!(colors.update_range(), None);
    }

    #[test]
    fn test_attach_keeps_existing() {
        let mut colors = Some(VertexColors::from_values(vec![[0.25; 3]; 2]));
        let mut acc = Accumulator::attach(&mut colors, 2);
        acc.write(1, Vec3::ONE);
        let colors = colors.unwrap();
        assert_eq!(colors.get(0), Some(Vec3::splat(0.25)));
        assert_eq!(colors.get(1), Some(Vec3::ONE));
    }

    #[test]
    fn test_flush_minimal_range() {
        let mut colors = None;
        let mut acc = Accumulator::attach(&mut colors, 10);
        assert_eq!(acc.flush(), None);

        acc.write(3, Vec3::X);
        acc.write(4, Vec3::Y);
        acc.write(5, Vec3::Z);
        assert_eq!(acc.flush(), Some(3..6));
        assert_eq!(acc.flush(), None);

        acc.write(7, Vec3::ONE);
        assert_eq!(acc.flush(), Some(7..8));
    }

    #[test]
    fn test_new_flushes_earlier_writes() {
        let mut colors = VertexColors::zeroed(4);
        Accumulator::new(&mut colors).write(2, Vec3::ONE);
        let mut acc = Accumulator::new(&mut colors);
        assert_eq!(acc.flush(), Some(2..3));
        assert_eq!(acc.flush(), None);
    }

    #[test]
    fn test_clamp_opt_in() {
        let mut colors = None;
        let mut acc = Accumulator::attach(&mut colors, 2);
        acc.write(0, Vec3::new(1.5, -0.5, 0.5));
        let mut acc = acc.with_clamp(true);
        acc.write(1, Vec3::new(1.5, -0.5, 0.5));

        let colors = colors.unwrap();
        assert_eq!(colors.get(0), Some(Vec3::new(1.5, -0.5, 0.5)));
        assert_eq!(colors.get(1), Some(Vec3::new(1.0, 0.0, 0.5)));
    }
}
