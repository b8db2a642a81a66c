//! Property-based tests for the extraction invariants.
//!
//! - Every kept face has all three corners retained, and no such face is lost
//! - The index mapping is a bijection onto `1..=N` in ascending order
//! - Retaining more vertices never keeps fewer faces
//! - Centering is idempotent
//! - Written meshes re-parse to the same counts
//! - Classification and nearest-coordinate lookup are deterministic

use approx::abs_diff_eq;
use face_submesh::{
    center_positions, classify_texcoords, filter_faces, mesh_to_string, nearest_index,
    rasterize_polygon, retained_faces, Face, ImageSize, IndexMapping, MaskValues, Mesh, Point,
    RetainedSet, SubMesh, Vertex,
};
use proptest::prelude::*;

// =============================================================================
// STRATEGIES
// =============================================================================

const SOURCE_LEN: usize = 40;

fn retained_set() -> impl Strategy<Value = RetainedSet> {
    prop::collection::btree_set(0..SOURCE_LEN, 0..=SOURCE_LEN / 2)
}

fn faces() -> impl Strategy<Value = Vec<Face>> {
    prop::collection::vec(
        (0..SOURCE_LEN, 0..SOURCE_LEN, 0..SOURCE_LEN).prop_map(|(a, b, c)| Face::new(a, b, c)),
        0..60,
    )
}

fn coordinate() -> impl Strategy<Value = f64> {
    -100.0..100.0f64
}

fn uv() -> impl Strategy<Value = Point> {
    (-0.2..1.2f64, -0.2..1.2f64).prop_map(|(u, v)| Point::new(u, v))
}

fn sub_mesh() -> impl Strategy<Value = SubMesh> {
    (1usize..20).prop_flat_map(|n| {
        (
            prop::collection::vec((coordinate(), coordinate(), coordinate()), n),
            prop::collection::vec((0.0..1.0f64, 0.0..1.0f64), n),
            prop::collection::vec((1..=n, 1..=n, 1..=n), 0..30),
        )
            .prop_map(|(positions, uvs, faces)| SubMesh {
                vertices: positions.into_iter().map(|(x, y, z)| Vertex::new(x, y, z)).collect(),
                texcoords: uvs.into_iter().map(|(u, v)| Point::new(u, v)).collect(),
                faces: faces.into_iter().map(|(a, b, c)| [a, b, c]).collect(),
            })
    })
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    /// Property: the mapping sends the k-th smallest retained index to k
    #[test]
    fn prop_mapping_is_ascending_bijection(retained in retained_set()) {
        let mapping = IndexMapping::new(&retained, SOURCE_LEN).unwrap();
        prop_assert_eq!(mapping.len(), retained.len());
        for (k, &old) in retained.iter().enumerate() {
            prop_assert_eq!(mapping.get(old), Some(k + 1));
        }
        for old in 0..SOURCE_LEN {
            prop_assert_eq!(mapping.contains(old), retained.contains(&old));
        }
        prop_assert!(mapping.order().iter().copied().eq(retained.iter().copied()));
    }

    /// Property: kept faces are exactly the fully retained ones
    #[test]
    fn prop_face_retention(faces in faces(), retained in retained_set()) {
        let mapping = IndexMapping::new(&retained, SOURCE_LEN).unwrap();
        let filtered = filter_faces(&faces, &retained, &mapping).unwrap();

        let expected = faces
            .iter()
            .filter(|f| f.vertices.iter().all(|v| retained.contains(v)))
            .count();
        prop_assert_eq!(filtered.len(), expected);
        prop_assert_eq!(filtered.len() + filtered.dropped, faces.len());

        for (rewritten, &src) in filtered.faces.iter().zip(&filtered.source) {
            for (corner, &old) in rewritten.iter().zip(&faces[src].vertices) {
                prop_assert!((1..=mapping.len()).contains(corner));
                prop_assert_eq!(Some(*corner), mapping.get(old));
            }
        }
    }

    /// Property: a superset of retained vertices keeps a superset of faces
    #[test]
    fn prop_superset_monotonicity(
        faces in faces(),
        base in retained_set(),
        extra in retained_set(),
    ) {
        let superset: RetainedSet = base.union(&extra).copied().collect();
        let small = retained_faces(&faces, &base);
        let large = retained_faces(&faces, &superset);
        for face in &small {
            prop_assert!(large.contains(face));
        }
    }

    /// Property: centering a centered mesh moves nothing
    #[test]
    fn prop_centering_is_idempotent(
        positions in prop::collection::vec((coordinate(), coordinate(), coordinate()), 1..30)
    ) {
        let mut vertices: Vec<Vertex> =
            positions.iter().map(|&(x, y, z)| Vertex::new(x, y, z)).collect();
        center_positions(&mut vertices);
        let once = vertices.clone();
        let shift = center_positions(&mut vertices);

        prop_assert!(abs_diff_eq!(shift.x, 0.0, epsilon = 1e-9));
        prop_assert!(abs_diff_eq!(shift.y, 0.0, epsilon = 1e-9));
        prop_assert!(abs_diff_eq!(shift.z, 0.0, epsilon = 1e-9));
        for (a, b) in once.iter().zip(&vertices) {
            prop_assert!(abs_diff_eq!(a.position.x, b.position.x, epsilon = 1e-9));
            prop_assert!(abs_diff_eq!(a.position.y, b.position.y, epsilon = 1e-9));
            prop_assert!(abs_diff_eq!(a.position.z, b.position.z, epsilon = 1e-9));
        }
    }

    /// Property: a written sub-mesh re-parses with identical counts and faces
    #[test]
    fn prop_serialize_round_trip(mesh in sub_mesh()) {
        let (parsed, report) = Mesh::parse(&mesh_to_string(&mesh));
        prop_assert_eq!(report.malformed_count(), 0);
        prop_assert_eq!(parsed.vertices.len(), mesh.vertices.len());
        prop_assert_eq!(parsed.texcoords.len(), mesh.texcoords.len());
        prop_assert_eq!(parsed.faces.len(), mesh.faces.len());
        for (face, written) in parsed.faces.iter().zip(&mesh.faces) {
            prop_assert_eq!(face.vertices.map(|v| v + 1), *written);
        }
    }

    /// Property: retained coordinates round into the mask, the rest do not
    #[test]
    fn prop_classification_agrees_with_mask(
        texcoords in prop::collection::vec(uv(), 0..50),
        x0 in 0.0..15.0f64,
        y0 in 0.0..15.0f64,
        w in 1.0..15.0f64,
        h in 1.0..15.0f64,
    ) {
        let size = ImageSize::new(20, 20);
        let rect = [
            Point::new(x0, y0),
            Point::new(x0 + w, y0),
            Point::new(x0 + w, y0 + h),
            Point::new(x0, y0 + h),
        ];
        let mask = rasterize_polygon(&rect, size, MaskValues::default());
        let retained = classify_texcoords(&mask, &texcoords);

        for (i, t) in texcoords.iter().enumerate() {
            let inside = size.nearest_pixel(*t).is_some_and(|p| mask.contains(p));
            prop_assert_eq!(retained.contains(&i), inside);
        }
        prop_assert_eq!(&classify_texcoords(&mask, &texcoords), &retained);
    }

    /// Property: the nearest coordinate is minimal and the lowest such index
    #[test]
    fn prop_nearest_index_prefers_lowest(
        points in prop::collection::vec(uv(), 1..30),
        target in uv(),
    ) {
        let best = nearest_index(&points, target).unwrap();
        let best_d = points[best].distance_squared(&target);
        for (j, p) in points.iter().enumerate() {
            let d = p.distance_squared(&target);
            prop_assert!(d >= best_d);
            if j < best {
                prop_assert!(d > best_d);
            }
        }
    }
}

#[test]
fn nearest_index_tie_goes_to_lowest() {
    let points = [Point::new(1.0, 0.0), Point::new(-1.0, 0.0), Point::new(1.0, 0.0)];
    assert_eq!(nearest_index(&points, Point::zero()), Some(0));
    assert_eq!(nearest_index(&[], Point::zero()), None);
}
