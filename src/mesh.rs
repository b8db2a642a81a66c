//! Textured face mesh model and the line-oriented mesh text format.
//!
//! Only the subset of the format the pipeline needs is understood:
//! `v` vertex lines, `vt` texture lines and triangular `f` lines. Corners may
//! be written as `i`, `i/j`, `i//k` or `i/j/k`; indices are 1-based on disk
//! and 0-based in memory.
//!
//! Lines that look like data but fail to parse are skipped and recorded in a
//! [`ParseReport`] rather than aborting the load.

use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::{Point, Point3};

/// Directives that are valid in a mesh file but carry nothing the pipeline uses.
const IGNORED_DIRECTIVES: [&str; 8] = ["vn", "vp", "o", "g", "s", "l", "mtllib", "usemtl"];

/// A mesh vertex: position plus any trailing attributes (`w`, colour) kept verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    pub position: Point3,
    pub extra: Vec<f64>,
}

impl Vertex {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            position: Point3::new(x, y, z),
            extra: Vec::new(),
        }
    }
}

/// A triangular face. Indices are 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Face {
    pub vertices: [usize; 3],
    pub textures: Option<[usize; 3]>,
}

impl Face {
    pub const fn new(a: usize, b: usize, c: usize) -> Self {
        Self {
            vertices: [a, b, c],
            textures: None,
        }
    }
}

/// An in-memory textured mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub texcoords: Vec<Point>,
    pub faces: Vec<Face>,
}

/// A mesh line that was skipped during parsing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MalformedLine {
    /// 1-based line number in the source file.
    pub line: usize,
    pub content: String,
    pub reason: String,
}

/// Summary of a mesh parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParseReport {
    pub vertices: usize,
    pub texcoords: usize,
    pub faces: usize,
    pub ignored: usize,
    pub malformed: Vec<MalformedLine>,
}

impl ParseReport {
    pub fn malformed_count(&self) -> usize {
        self.malformed.len()
    }

    fn record(&mut self, line: usize, content: &str, err: Error) {
        let reason = match err {
            Error::MalformedMeshLine { reason, .. } => reason,
            other => other.to_string(),
        };
        warn!(line, %reason, "skipping malformed mesh line");
        self.malformed.push(MalformedLine {
            line,
            content: content.to_string(),
            reason,
        });
    }
}

enum Line {
    Vertex(Vertex),
    TexCoord(Point),
    Face(Face),
    Ignored,
}

impl Mesh {
    pub fn new(vertices: Vec<Vertex>, texcoords: Vec<Point>, faces: Vec<Face>) -> Self {
        Self {
            vertices,
            texcoords,
            faces,
        }
    }

    /// Load and parse a mesh file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<(Self, ParseReport)> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let (mesh, report) = Self::parse(&text);
        debug!(
            path = %path.display(),
            vertices = report.vertices,
            texcoords = report.texcoords,
            faces = report.faces,
            malformed = report.malformed_count(),
            "loaded mesh"
        );
        Ok((mesh, report))
    }

    /// Parse mesh text. Never fails; bad lines end up in the report.
    pub fn parse(text: &str) -> (Self, ParseReport) {
        let mut mesh = Mesh::default();
        let mut report = ParseReport::default();
        let mut face_lines = Vec::new();

        for (i, raw) in text.lines().enumerate() {
            let line_no = i + 1;
            match parse_line(raw, line_no) {
                Ok(Line::Vertex(v)) => mesh.vertices.push(v),
                Ok(Line::TexCoord(t)) => mesh.texcoords.push(t),
                Ok(Line::Face(f)) => {
                    mesh.faces.push(f);
                    face_lines.push((line_no, raw));
                }
                Ok(Line::Ignored) => report.ignored += 1,
                Err(e) => report.record(line_no, raw, e),
            }
        }

        // Faces may only be checked once every vertex has been seen.
        let (nv, nt) = (mesh.vertices.len(), mesh.texcoords.len());
        let mut kept = Vec::with_capacity(mesh.faces.len());
        for (face, (line_no, raw)) in mesh.faces.iter().zip(face_lines) {
            match check_face_bounds(face, nv, nt, line_no) {
                Ok(()) => kept.push(*face),
                Err(e) => report.record(line_no, raw, e),
            }
        }
        mesh.faces = kept;

        report.vertices = mesh.vertices.len();
        report.texcoords = mesh.texcoords.len();
        report.faces = mesh.faces.len();
        (mesh, report)
    }

    pub fn positions(&self) -> impl Iterator<Item = Point3> + '_ {
        self.vertices.iter().map(|v| v.position)
    }

    /// Center vertex positions on the origin; see [`center_positions`].
    pub fn center(&mut self) -> Point3 {
        center_positions(&mut self.vertices)
    }

    /// Flatten the deepest part of the face; see [`trim_depth`].
    pub fn trim_depth(&mut self, factor: f64) {
        trim_depth(&mut self.vertices, factor)
    }
}

fn malformed(line: usize, reason: impl Into<String>) -> Error {
    Error::MalformedMeshLine {
        line,
        reason: reason.into(),
    }
}

fn parse_line(raw: &str, line: usize) -> Result<Line> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(Line::Ignored);
    }

    let mut tokens = trimmed.split_whitespace();
    let keyword = tokens.next().unwrap_or_default();
    let rest: Vec<&str> = tokens.collect();

    match keyword {
        "v" => parse_vertex(&rest, line).map(Line::Vertex),
        "vt" => parse_texcoord(&rest, line).map(Line::TexCoord),
        "f" => parse_face(&rest, line).map(Line::Face),
        k if IGNORED_DIRECTIVES.contains(&k) => Ok(Line::Ignored),
        k => Err(malformed(line, format!("unknown directive '{}'", k))),
    }
}

fn parse_floats(tokens: &[&str], line: usize) -> Result<Vec<f64>> {
    tokens
        .iter()
        .map(|t| {
            t.parse::<f64>()
                .map_err(|_| malformed(line, format!("'{}' is not a number", t)))
        })
        .collect()
}

fn parse_vertex(tokens: &[&str], line: usize) -> Result<Vertex> {
    let values = parse_floats(tokens, line)?;
    if values.len() < 3 {
        return Err(malformed(
            line,
            format!("vertex needs at least 3 coordinates, found {}", values.len()),
        ));
    }
    Ok(Vertex {
        position: Point3::new(values[0], values[1], values[2]),
        extra: values[3..].to_vec(),
    })
}

fn parse_texcoord(tokens: &[&str], line: usize) -> Result<Point> {
    let values = parse_floats(tokens, line)?;
    if !(2..=3).contains(&values.len()) {
        return Err(malformed(
            line,
            format!("texture coordinate needs 2 or 3 values, found {}", values.len()),
        ));
    }
    Ok(Point::new(values[0], values[1]))
}

/// Parse a 1-based index token into a 0-based index.
fn parse_index(token: &str, line: usize) -> Result<usize> {
    match token.parse::<usize>() {
        Ok(0) | Err(_) => Err(malformed(
            line,
            format!("'{}' is not a positive 1-based index", token),
        )),
        Ok(i) => Ok(i - 1),
    }
}

fn parse_face(tokens: &[&str], line: usize) -> Result<Face> {
    if tokens.len() != 3 {
        return Err(malformed(
            line,
            format!("face must have 3 corners, found {}", tokens.len()),
        ));
    }

    let mut vertices = [0usize; 3];
    let mut textures = [0usize; 3];
    let mut texture_count = 0;

    for (corner, token) in tokens.iter().enumerate() {
        let mut parts = token.split('/');
        let v = parts.next().unwrap_or_default();
        vertices[corner] = parse_index(v, line)?;
        match parts.next() {
            Some(t) if !t.is_empty() => {
                textures[corner] = parse_index(t, line)?;
                texture_count += 1;
            }
            _ => {}
        }
        if let Some(n) = parts.next() {
            if !n.is_empty() {
                parse_index(n, line)?;
            }
        }
        if parts.next().is_some() {
            return Err(malformed(line, format!("corner '{}' has too many parts", token)));
        }
    }

    let textures = match texture_count {
        0 => None,
        3 => Some(textures),
        _ => {
            return Err(malformed(
                line,
                "texture indices must be given for all corners or none",
            ))
        }
    };

    Ok(Face { vertices, textures })
}

fn check_face_bounds(face: &Face, nv: usize, nt: usize, line: usize) -> Result<()> {
    if let Some(&v) = face.vertices.iter().find(|&&v| v >= nv) {
        return Err(malformed(
            line,
            format!("vertex index {} exceeds vertex count {}", v + 1, nv),
        ));
    }
    if let Some(textures) = face.textures {
        if let Some(&t) = textures.iter().find(|&&t| t >= nt) {
            return Err(malformed(
                line,
                format!("texture index {} exceeds texture count {}", t + 1, nt),
            ));
        }
    }
    Ok(())
}

/// Translate positions so each axis is centered on zero.
///
/// The center of an axis is the midpoint of its extent, so centering an
/// already-centered mesh leaves it unchanged. Returns the applied shift.
pub fn center_positions(vertices: &mut [Vertex]) -> Point3 {
    if vertices.is_empty() {
        return Point3::new(0.0, 0.0, 0.0);
    }

    let mut min = [f64::INFINITY; 3];
    let mut max = [f64::NEG_INFINITY; 3];
    for v in vertices.iter() {
        let p = [v.position.x, v.position.y, v.position.z];
        for axis in 0..3 {
            min[axis] = min[axis].min(p[axis]);
            max[axis] = max[axis].max(p[axis]);
        }
    }

    let shift = Point3::new(
        -(min[0] + max[0]) / 2.0,
        -(min[1] + max[1]) / 2.0,
        -(min[2] + max[2]) / 2.0,
    );
    for v in vertices.iter_mut() {
        v.position.x += shift.x;
        v.position.y += shift.y;
        v.position.z += shift.z;
    }
    shift
}

/// Clamp depth values from below at `factor` times the minimum depth.
///
/// A factor of 1.0 is a no-op; smaller factors flatten the back of the scan.
pub fn trim_depth(vertices: &mut [Vertex], factor: f64) {
    if factor >= 1.0 || vertices.is_empty() {
        return;
    }
    let min_z = vertices
        .iter()
        .map(|v| v.position.z)
        .fold(f64::INFINITY, f64::min);
    let floor = min_z * factor;
    for v in vertices.iter_mut() {
        v.position.z = v.position.z.max(floor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SAMPLE: &str = "\
# a small mesh
mtllib face.mtl
v 0 0 0
v 1 0 0 0.5 0.5 0.5
v 1 1 0
v 0 1 0
vt 0.1 0.1
vt 0.9 0.1
vt 0.9 0.9
vt 0.1 0.9
vn 0 0 1
f 1/1 2/2 3/3
f 1/1/1 3/3/1 4/4/1
f 1 2 4
";

    #[test]
    fn parses_all_corner_variants() {
        let (mesh, report) = Mesh::parse(SAMPLE);
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.texcoords.len(), 4);
        assert_eq!(mesh.faces.len(), 3);
        assert!(report.malformed.is_empty());
        assert_eq!(report.ignored, 3);

        assert_eq!(mesh.faces[0].vertices, [0, 1, 2]);
        assert_eq!(mesh.faces[0].textures, Some([0, 1, 2]));
        assert_eq!(mesh.faces[1].vertices, [0, 2, 3]);
        assert_eq!(mesh.faces[2].textures, None);
        assert_eq!(mesh.vertices[1].extra, vec![0.5, 0.5, 0.5]);
    }

    #[test]
    fn malformed_lines_are_counted_not_fatal() {
        let text = "\
v 0 0 0
v 1 0
v 1 1 0
vt 0.5 abc
vt 0.5 0.5
f 1 2
f 1 2 9
f 0 1 2
bogus line
f 1 2 1
";
        let (mesh, report) = Mesh::parse(text);
        assert_eq!(mesh.vertices.len(), 2);
        assert_eq!(mesh.texcoords.len(), 1);
        assert_eq!(mesh.faces, vec![Face::new(0, 1, 0)]);

        let lines: Vec<usize> = report.malformed.iter().map(|m| m.line).collect();
        assert_eq!(lines, vec![2, 4, 6, 8, 9, 7]);
        assert_eq!(report.malformed_count(), 6);
    }

    #[test]
    fn partial_texture_indices_are_malformed() {
        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0 0\nf 1/1 2 3/1\n";
        let (mesh, report) = Mesh::parse(text);
        assert!(mesh.faces.is_empty());
        assert_eq!(report.malformed_count(), 1);
    }

    #[test]
    fn centering_uses_extent_midpoint() {
        let mut vertices = vec![
            Vertex::new(2.0, -1.0, 10.0),
            Vertex::new(4.0, 3.0, 20.0),
            Vertex::new(3.0, 0.0, 12.0),
        ];
        let shift = center_positions(&mut vertices);
        assert_relative_eq!(shift.x, -3.0);
        assert_relative_eq!(shift.y, -1.0);
        assert_relative_eq!(shift.z, -15.0);
        assert_relative_eq!(vertices[0].position.x, -1.0);
        assert_relative_eq!(vertices[1].position.z, 5.0);
    }

    #[test]
    fn centering_is_idempotent() {
        let mut vertices = vec![
            Vertex::new(0.3, -7.1, 1.25),
            Vertex::new(12.9, 4.4, -3.5),
            Vertex::new(5.0, 0.0, 0.1),
        ];
        center_positions(&mut vertices);
        let once = vertices.clone();
        center_positions(&mut vertices);
        for (a, b) in once.iter().zip(&vertices) {
            assert_relative_eq!(a.position.x, b.position.x, epsilon = 1e-12);
            assert_relative_eq!(a.position.y, b.position.y, epsilon = 1e-12);
            assert_relative_eq!(a.position.z, b.position.z, epsilon = 1e-12);
        }
    }

    #[test]
    fn depth_trim_clamps_deepest_points() {
        let mut vertices = vec![
            Vertex::new(0.0, 0.0, -8.0),
            Vertex::new(0.0, 0.0, -4.0),
            Vertex::new(0.0, 0.0, 8.0),
        ];
        trim_depth(&mut vertices, 0.875);
        assert_relative_eq!(vertices[0].position.z, -7.0);
        assert_relative_eq!(vertices[1].position.z, -4.0);
        assert_relative_eq!(vertices[2].position.z, 8.0);
    }
}
