//! Amortized per-tick sampling over the target's vertices.

use std::ops::Range;

use glam::Mat4;
use tracing::{debug, warn};

use super::accumulator::Accumulator;
use super::sampler::Sampler;
use crate::scene::{Mesh, Snapshot};
use crate::util::{normal_matrix, Error, Result};

/// Result of one [`BatchScheduler::run_batch`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Vertices remain in this bounce.
    Continuing,
    /// The cursor reached the vertex count.
    BounceComplete,
}

/// What a batch did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchReport {
    /// Vertices visited, `[cursor_before, cursor_after)`.
    pub range: Range<usize>,
    /// Samples written to the color attribute.
    pub sampled: usize,
    /// Vertices the sampler could not estimate; their colors are untouched.
    pub skipped: usize,
    pub outcome: BatchOutcome,
}

/// Check that `mesh` can be baked: normals present and sized like the
/// positions, and any existing colors sized likewise.
pub fn validate_target(name: &str, mesh: &Mesh) -> Result<()> {
    let expected = mesh.vertex_count();
    let Some(normals) = &mesh.normals else {
        return Err(Error::MissingAttribute {
            object: name.to_string(),
            attribute: "normal",
        });
    };
    if normals.len() != expected {
        return Err(Error::AttributeMismatch {
            object: name.to_string(),
            attribute: "normal",
            expected,
            actual: normals.len(),
        });
    }
    if let Some(colors) = &mesh.colors {
        if colors.len() != expected {
            return Err(Error::AttributeMismatch {
                object: name.to_string(),
                attribute: "color",
                expected,
                actual: colors.len(),
            });
        }
    }
    Ok(())
}

/// The mesh being baked, resolved for one batch.
pub struct BakeTarget<'a> {
    pub name: &'a str,
    pub mesh: &'a mut Mesh,
    /// World transform of the mesh's object.
    pub world: Mat4,
}

impl<'a> BakeTarget<'a> {
    pub fn new(name: &'a str, mesh: &'a mut Mesh, world: Mat4) -> Self {
        Self { name, mesh, world }
    }
}

/// Cursor over the target's vertices for the current bounce.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchScheduler {
    cursor: usize,
    vertex_count: usize,
}

impl BatchScheduler {
    pub fn new(vertex_count: usize) -> Self {
        Self { cursor: 0, vertex_count }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn is_complete(&self) -> bool {
        self.cursor == self.vertex_count
    }

    /// Rewind to the first vertex for the next bounce.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Sample up to `batch_size` vertices from the cursor and write them
    /// into the target's color attribute.
    ///
    /// Does not reset the cursor on completion. On a sampler error the
    /// cursor stops at the failing vertex and the error is returned; earlier
    /// writes in the batch are kept.
    pub fn run_batch<S: Sampler + ?Sized>(
        &mut self,
        batch_size: usize,
        target: BakeTarget<'_>,
        sampler: &mut S,
        snapshot: &Snapshot,
        clamp: bool,
    ) -> Result<BatchReport> {
        let BakeTarget { name, mesh, world } = target;
        validate_target(name, mesh)?;
        if mesh.vertex_count() != self.vertex_count {
            return Err(Error::AttributeMismatch {
                object: name.to_string(),
                attribute: "position",
                expected: self.vertex_count,
                actual: mesh.vertex_count(),
            });
        }
        if batch_size == 0 {
            return Err(Error::config("batch_size must be > 0"));
        }

        let Mesh { positions, normals, colors, .. } = mesh;
        let normals = normals.as_deref().unwrap_or_default();
        let normal_mat = normal_matrix(&world);
        let mut acc = Accumulator::attach(colors, self.vertex_count).with_clamp(clamp);

        let start = self.cursor;
        let end = (start + batch_size).min(self.vertex_count);
        let mut sampled = 0;
        let mut skipped = 0;

        for index in start..end {
            let position = world.transform_point3(positions[index]);
            let normal = (normal_mat * normals[index]).normalize_or_zero();
            match sampler.sample(position, normal, snapshot) {
                Ok(Some(rgb)) => {
                    acc.write(index, rgb);
                    sampled += 1;
                }
                Ok(None) => {
                    warn!(object = name, index, "no sample, vertex skipped");
                    skipped += 1;
                }
                Err(err) => {
                    self.cursor = index;
                    return Err(err);
                }
            }
        }
        self.cursor = end;

        let outcome = if self.is_complete() {
            BatchOutcome::BounceComplete
        } else {
            BatchOutcome::Continuing
        };
        debug!(start, end, sampled, skipped, ?outcome, "batch");
        Ok(BatchReport { range: start..end, sampled, skipped, outcome })
    }
}
