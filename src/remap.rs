//! Renumbering of retained vertices into a contiguous 1-based range.

use crate::classify::RetainedSet;
use crate::error::{Error, Result};
use crate::mesh::Vertex;
use crate::types::Point;

/// Injective map from original 0-based index to output 1-based index.
///
/// Output indices follow ascending original order, so the `k`-th smallest
/// retained index maps to `k`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMapping {
    forward: Vec<Option<usize>>,
    order: Vec<usize>,
}

impl IndexMapping {
    /// Build the mapping over a source array of `source_len` entries.
    pub fn new(retained: &RetainedSet, source_len: usize) -> Result<Self> {
        if let Some(&last) = retained.iter().next_back() {
            if last >= source_len {
                return Err(Error::MeshMismatch(format!(
                    "retained index {} exceeds source length {}",
                    last, source_len
                )));
            }
        }

        let mut forward = vec![None; source_len];
        let mut order = Vec::with_capacity(retained.len());
        for (position, &old) in retained.iter().enumerate() {
            forward[old] = Some(position + 1);
            order.push(old);
        }
        Ok(Self { forward, order })
    }

    /// The 1-based output index of `old`, if it was retained.
    pub fn get(&self, old: usize) -> Option<usize> {
        self.forward.get(old).copied().flatten()
    }

    pub fn contains(&self, old: usize) -> bool {
        self.get(old).is_some()
    }

    /// Original indices in output order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Reorder `items` to output order.
    pub fn apply<T: Clone>(&self, items: &[T]) -> Vec<T> {
        self.order.iter().map(|&old| items[old].clone()).collect()
    }
}

/// Vertices and texture coordinates reordered through a mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct Remapped {
    pub mapping: IndexMapping,
    pub vertices: Vec<Vertex>,
    pub texcoords: Vec<Point>,
}

/// Remap paired vertex and texture arrays; both must share one index space.
pub fn remap(retained: &RetainedSet, vertices: &[Vertex], texcoords: &[Point]) -> Result<Remapped> {
    if vertices.len() != texcoords.len() {
        return Err(Error::MeshMismatch(format!(
            "{} vertices but {} texture coordinates; they must pair one-to-one",
            vertices.len(),
            texcoords.len()
        )));
    }
    let mapping = IndexMapping::new(retained, vertices.len())?;
    let vertices = mapping.apply(vertices);
    let texcoords = mapping.apply(texcoords);
    Ok(Remapped {
        mapping,
        vertices,
        texcoords,
    })
}
