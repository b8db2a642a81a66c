//! Face filtering against the retained vertex set.

use tracing::debug;

use crate::classify::RetainedSet;
use crate::error::{Error, Result};
use crate::mesh::Face;
use crate::remap::IndexMapping;

/// Faces surviving the filter, rewritten to output indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilteredFaces {
    /// 1-based output vertex indices, shared by texture coordinates.
    pub faces: Vec<[usize; 3]>,
    /// Position of each kept face in the source face list.
    pub source: Vec<usize>,
    pub dropped: usize,
}

impl FilteredFaces {
    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}

/// Positions of faces whose three corners are all retained.
pub fn retained_faces(faces: &[Face], retained: &RetainedSet) -> Vec<usize> {
    faces
        .iter()
        .enumerate()
        .filter(|(_, face)| face.vertices.iter().all(|v| retained.contains(v)))
        .map(|(i, _)| i)
        .collect()
}

/// Keep faces with every corner retained and rewrite them through `mapping`.
///
/// Faces with one or two retained corners are dropped whole. A kept face
/// whose corner has no mapping entry is an internal error.
pub fn filter_faces(
    faces: &[Face],
    retained: &RetainedSet,
    mapping: &IndexMapping,
) -> Result<FilteredFaces> {
    let source = retained_faces(faces, retained);
    let mut rewritten = Vec::with_capacity(source.len());

    for &face_idx in &source {
        let face = &faces[face_idx];
        let mut corners = [0usize; 3];
        for (corner, &v) in corners.iter_mut().zip(&face.vertices) {
            *corner = mapping
                .get(v)
                .ok_or(Error::DanglingFaceReference { face: face_idx, index: v })?;
        }
        rewritten.push(corners);
    }

    let dropped = faces.len() - source.len();
    debug!(kept = source.len(), dropped, "filtered faces");
    Ok(FilteredFaces {
        faces: rewritten,
        source,
        dropped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[usize]) -> RetainedSet {
        items.iter().copied().collect()
    }

    #[test]
    fn drops_partial_faces_and_rewrites_kept_ones() {
        let faces = vec![Face::new(0, 1, 4), Face::new(0, 1, 2), Face::new(2, 3, 1)];
        let retained = set(&[0, 1, 2, 3]);
        let mapping = IndexMapping::new(&retained, 5).unwrap();

        let out = filter_faces(&faces, &retained, &mapping).unwrap();
        assert_eq!(out.faces, vec![[1, 2, 3], [3, 4, 2]]);
        assert_eq!(out.source, vec![1, 2]);
        assert_eq!(out.dropped, 1);
    }

    #[test]
    fn rewrites_through_sparse_mapping() {
        let faces = vec![Face::new(9, 5, 7), Face::new(5, 6, 7)];
        let retained = set(&[5, 7, 9]);
        let mapping = IndexMapping::new(&retained, 10).unwrap();
        let out = filter_faces(&faces, &retained, &mapping).unwrap();
        assert_eq!(out.faces, vec![[3, 1, 2]]);
    }

    #[test]
    fn inconsistent_mapping_is_a_dangling_reference() {
        let faces = vec![Face::new(0, 1, 2)];
        let retained = set(&[0, 1, 2]);
        let mapping = IndexMapping::new(&set(&[0, 1]), 3).unwrap();
        let err = filter_faces(&faces, &retained, &mapping).unwrap_err();
        assert!(matches!(
            err,
            Error::DanglingFaceReference { face: 0, index: 2 }
        ));
    }
}
