//! polyMesh topology and derived geometry

use nalgebra::Vector3;
use std::collections::HashMap;
use std::path::Path;

use super::tokenizer::Parser;
use super::{FieldMap, FoamError};

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vector3<f64>,
    pub max: Vector3<f64>,
}

impl Aabb {
    pub fn empty() -> Self {
        Self {
            min: Vector3::repeat(f64::INFINITY),
            max: Vector3::repeat(f64::NEG_INFINITY),
        }
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vector3<f64>>) -> Self {
        let mut bounds = Self::empty();
        for p in points {
            bounds.min = bounds.min.inf(p);
            bounds.max = bounds.max.sup(p);
        }
        bounds
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x
    }

    pub fn contains(&self, p: &Vector3<f64>) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }

    pub fn diagonal(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            (self.max - self.min).norm()
        }
    }
}

/// Triangle surface with compact vertex numbering
#[derive(Debug, Clone, Default)]
pub struct TriSurface {
    pub positions: Vec<Vector3<f64>>,
    pub triangles: Vec<[u32; 3]>,
}

/// A named group of boundary faces
#[derive(Debug, Clone)]
pub struct BoundaryPatch {
    pub name: String,
    /// Patch type, e.g. "wall" or "patch"
    pub kind: String,
    pub face_count: usize,
    pub surface: TriSurface,
}

/// Cell-centred samples of the volume mesh
#[derive(Debug, Clone, Default)]
pub struct InternalMesh {
    pub cell_centres: Vec<Vector3<f64>>,
    /// Edge length of a cube with the cell's volume
    pub cell_sizes: Vec<f64>,
    pub fields: FieldMap,
}

impl InternalMesh {
    pub fn cell_count(&self) -> usize {
        self.cell_centres.len()
    }

    pub fn field(&self, name: &str) -> Option<&[Vector3<f64>]> {
        self.fields.get(name).map(|v| v.as_slice())
    }
}

/// One entry of the `boundary` file
#[derive(Debug, Clone)]
pub(crate) struct BoundaryEntry {
    pub name: String,
    pub kind: String,
    pub n_faces: usize,
    pub start_face: usize,
}

pub(crate) fn read_boundary(path: &Path) -> Result<Vec<BoundaryEntry>, FoamError> {
    let mut parser = Parser::open(path)?;
    parser.read_list(|p| {
        let name = p.read_word()?;
        p.expect_punct('{')?;

        let mut kind = String::new();
        let mut n_faces = None;
        let mut start_face = None;
        while !p.at_punct('}') {
            match p.read_word()?.as_str() {
                "type" => {
                    kind = p.read_word()?;
                    p.expect_punct(';')?;
                }
                "nFaces" => {
                    n_faces = Some(p.read_label()?);
                    p.expect_punct(';')?;
                }
                "startFace" => {
                    start_face = Some(p.read_label()?);
                    p.expect_punct(';')?;
                }
                _ => p.skip_entry()?,
            }
        }
        p.expect_punct('}')?;

        match (n_faces, start_face) {
            (Some(n_faces), Some(start_face)) => Ok(BoundaryEntry {
                name,
                kind,
                n_faces,
                start_face,
            }),
            _ => Err(p.error(format!("patch '{}' lacks nFaces or startFace", name))),
        }
    })
}

/// Raw mesh as stored in `polyMesh/`
#[derive(Debug)]
pub(crate) struct PolyMesh {
    points: Vec<Vector3<f64>>,
    faces: Vec<Vec<usize>>,
    owner: Vec<usize>,
    neighbour: Vec<usize>,
    boundary: Vec<BoundaryEntry>,
}

impl PolyMesh {
    pub(crate) fn read(dir: &Path) -> Result<Self, FoamError> {
        let points = Parser::open(&dir.join("points"))?
            .read_list(|p| p.read_vector())?
            .into_iter()
            .map(|v| Vector3::new(v[0], v[1], v[2]))
            .collect::<Vec<_>>();

        let faces_path = dir.join("faces");
        let mut parser = Parser::open(&faces_path)?;
        let faces = parser.read_list(|p| p.read_list(|p| p.read_label()))?;
        if let Some(bad) = faces.iter().flatten().find(|&&i| i >= points.len()) {
            return Err(parser.error(format!(
                "face references point {} but there are {} points",
                bad,
                points.len()
            )));
        }

        let owner_path = dir.join("owner");
        let mut parser = Parser::open(&owner_path)?;
        let owner = parser.read_list(|p| p.read_label())?;
        if owner.len() != faces.len() {
            return Err(parser.error(format!(
                "{} owners for {} faces",
                owner.len(),
                faces.len()
            )));
        }

        let mut parser = Parser::open(&dir.join("neighbour"))?;
        let neighbour = parser.read_list(|p| p.read_label())?;
        if neighbour.len() > faces.len() {
            return Err(parser.error("more neighbours than faces"));
        }

        let boundary_path = dir.join("boundary");
        let boundary = read_boundary(&boundary_path)?;
        if let Some(entry) = boundary
            .iter()
            .find(|e| e.start_face + e.n_faces > faces.len())
        {
            return Err(FoamError::Parse {
                path: boundary_path,
                message: format!("patch '{}' runs past the last face", entry.name),
            });
        }

        Ok(Self {
            points,
            faces,
            owner,
            neighbour,
            boundary,
        })
    }

    pub(crate) fn bounds(&self) -> Aabb {
        Aabb::from_points(&self.points)
    }

    fn cell_count(&self) -> usize {
        self.owner
            .iter()
            .chain(self.neighbour.iter())
            .max()
            .map_or(0, |&max| max + 1)
    }

    /// Centre and area vector of a polygon, using a fan around the vertex average
    fn face_geometry(&self, face: &[usize]) -> (Vector3<f64>, Vector3<f64>) {
        let n = face.len();
        let estimate = face
            .iter()
            .fold(Vector3::zeros(), |acc, &i| acc + self.points[i])
            / n.max(1) as f64;
        if n < 3 {
            return (estimate, Vector3::zeros());
        }

        let mut area_vector = Vector3::zeros();
        let mut weighted_centre = Vector3::zeros();
        let mut total_area = 0.0;
        for k in 0..n {
            let a = self.points[face[k]];
            let b = self.points[face[(k + 1) % n]];
            let s = (a - estimate).cross(&(b - estimate)) * 0.5;
            let area = s.norm();
            area_vector += s;
            weighted_centre += (a + b + estimate) / 3.0 * area;
            total_area += area;
        }

        let centre = if total_area > f64::EPSILON {
            weighted_centre / total_area
        } else {
            estimate
        };
        (centre, area_vector)
    }

    /// Cell centres and sizes from face geometry
    pub(crate) fn internal_mesh(&self) -> InternalMesh {
        let cells = self.cell_count();
        let mut area_sum = vec![0.0; cells];
        let mut centre_sum = vec![Vector3::zeros(); cells];
        let mut volume = vec![0.0; cells];

        for (f, face) in self.faces.iter().enumerate() {
            let (centre, area_vector) = self.face_geometry(face);
            let area = area_vector.norm();
            let flux = centre.dot(&area_vector) / 3.0;

            let owner = self.owner[f];
            area_sum[owner] += area;
            centre_sum[owner] += centre * area;
            volume[owner] += flux;

            if let Some(&nb) = self.neighbour.get(f) {
                area_sum[nb] += area;
                centre_sum[nb] += centre * area;
                volume[nb] -= flux;
            }
        }

        let cell_centres = (0..cells)
            .map(|c| {
                if area_sum[c] > 0.0 {
                    centre_sum[c] / area_sum[c]
                } else {
                    Vector3::zeros()
                }
            })
            .collect();

        let cell_sizes = (0..cells)
            .map(|c| {
                let v = volume[c].abs();
                if v > 1e-300 {
                    v.cbrt()
                } else {
                    (area_sum[c] / 6.0).sqrt()
                }
            })
            .collect();

        InternalMesh {
            cell_centres,
            cell_sizes,
            fields: FieldMap::new(),
        }
    }

    /// Triangulated surface of every patch
    pub(crate) fn boundary_patches(&self) -> Vec<BoundaryPatch> {
        self.boundary
            .iter()
            .map(|entry| {
                let faces = &self.faces[entry.start_face..entry.start_face + entry.n_faces];
                BoundaryPatch {
                    name: entry.name.clone(),
                    kind: entry.kind.clone(),
                    face_count: entry.n_faces,
                    surface: self.triangulate(faces),
                }
            })
            .collect()
    }

    fn triangulate(&self, faces: &[Vec<usize>]) -> TriSurface {
        let mut surface = TriSurface::default();
        let mut remap: HashMap<usize, u32> = HashMap::new();

        let mut local = |global: usize, surface: &mut TriSurface| -> u32 {
            *remap.entry(global).or_insert_with(|| {
                surface.positions.push(self.points[global]);
                (surface.positions.len() - 1) as u32
            })
        };

        for face in faces.iter().filter(|f| f.len() >= 3) {
            let first = local(face[0], &mut surface);
            for k in 1..face.len() - 1 {
                let b = local(face[k], &mut surface);
                let c = local(face[k + 1], &mut surface);
                surface.triangles.push([first, b, c]);
            }
        }
        surface
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_face_geometry_unit_square() {
        let mesh = PolyMesh {
            points: vec![
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(2.0, 0.0, 0.0),
                Vector3::new(2.0, 2.0, 0.0),
                Vector3::new(0.0, 2.0, 0.0),
            ],
            faces: vec![vec![0, 1, 2, 3]],
            owner: vec![0],
            neighbour: vec![],
            boundary: vec![],
        };

        let (centre, area) = mesh.face_geometry(&mesh.faces[0]);
        assert_relative_eq!(centre.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(centre.y, 1.0, epsilon = 1e-12);
        assert_relative_eq!(area.z, 4.0, epsilon = 1e-12);
        assert_relative_eq!(area.x, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_triangulate_reindexes() {
        let mesh = PolyMesh {
            points: (0..6).map(|i| Vector3::new(i as f64, (i % 2) as f64, 0.0)).collect(),
            faces: vec![vec![2, 3, 5, 4]],
            owner: vec![0],
            neighbour: vec![],
            boundary: vec![],
        };

        let surface = mesh.triangulate(&mesh.faces);
        assert_eq!(surface.positions.len(), 4);
        assert_eq!(surface.triangles, vec![[0, 1, 2], [0, 2, 3]]);
        assert_eq!(surface.positions[0], Vector3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn test_aabb() {
        let points = [Vector3::new(-1.0, 0.0, 2.0), Vector3::new(3.0, -2.0, 0.5)];
        let bounds = Aabb::from_points(&points);
        assert_eq!(bounds.min, Vector3::new(-1.0, -2.0, 0.5));
        assert_eq!(bounds.max, Vector3::new(3.0, 0.0, 2.0));
        assert!(bounds.contains(&Vector3::new(0.0, -1.0, 1.0)));
        assert!(!bounds.contains(&Vector3::new(0.0, 1.0, 1.0)));
        assert!(Aabb::empty().is_empty());
        assert_eq!(Aabb::empty().diagonal(), 0.0);
    }

    #[test]
    fn test_read_boundary_skips_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boundary");
        std::fs::write(
            &path,
            r#"FoamFile { version 2.0; format ascii; class polyBoundaryMesh; }
2
(
    car
    {
        type            wall;
        inGroups        List<word> 1(wall);
        nFaces          120;
        startFace       4000;
    }
    inlet
    {
        type            patch;
        physicalType    inlet;
        nFaces          10;
        startFace       4120;
    }
)
"#,
        )
        .unwrap();

        let entries = read_boundary(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "car");
        assert_eq!(entries[0].kind, "wall");
        assert_eq!(entries[0].n_faces, 120);
        assert_eq!(entries[1].start_face, 4120);
    }
}
