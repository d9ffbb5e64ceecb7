//! glTF 2.0 binary container

use serde_json::{json, Value};

use super::ExportError;
use crate::scene::{Scene, SceneNode};

const GLB_MAGIC: u32 = 0x4654_6C67; // "glTF"
const GLB_VERSION: u32 = 2;
const CHUNK_JSON: u32 = 0x4E4F_534A; // "JSON"
const CHUNK_BIN: u32 = 0x004E_4942; // "BIN\0"

const FLOAT: u32 = 5126;
const UNSIGNED_INT: u32 = 5125;
const ARRAY_BUFFER: u32 = 34962;
const ELEMENT_ARRAY_BUFFER: u32 = 34963;
const TRIANGLES: u32 = 4;

/// Accumulates the binary buffer and the JSON arrays that index into it
#[derive(Default)]
struct Builder {
    bin: Vec<u8>,
    buffer_views: Vec<Value>,
    accessors: Vec<Value>,
    meshes: Vec<Value>,
    materials: Vec<Value>,
    nodes: Vec<Value>,
}

impl Builder {
    fn push_view(&mut self, bytes: &[u8], target: u32) -> usize {
        // Every element type here is 4 bytes wide, so views stay aligned
        let offset = self.bin.len();
        self.bin.extend_from_slice(bytes);
        self.buffer_views.push(json!({
            "buffer": 0,
            "byteOffset": offset,
            "byteLength": bytes.len(),
            "target": target,
        }));
        self.buffer_views.len() - 1
    }

    fn push_vec3(&mut self, values: &[[f32; 3]], with_bounds: bool) -> usize {
        let mut bytes = Vec::with_capacity(values.len() * 12);
        for v in values {
            for c in v {
                bytes.extend_from_slice(&c.to_le_bytes());
            }
        }
        let view = self.push_view(&bytes, ARRAY_BUFFER);

        let mut accessor = json!({
            "bufferView": view,
            "componentType": FLOAT,
            "count": values.len(),
            "type": "VEC3",
        });
        if with_bounds {
            let (min, max) = bounds(values);
            accessor["min"] = json!(min);
            accessor["max"] = json!(max);
        }
        self.accessors.push(accessor);
        self.accessors.len() - 1
    }

    fn push_indices(&mut self, indices: &[u32]) -> usize {
        let mut bytes = Vec::with_capacity(indices.len() * 4);
        for i in indices {
            bytes.extend_from_slice(&i.to_le_bytes());
        }
        let view = self.push_view(&bytes, ELEMENT_ARRAY_BUFFER);
        self.accessors.push(json!({
            "bufferView": view,
            "componentType": UNSIGNED_INT,
            "count": indices.len(),
            "type": "SCALAR",
        }));
        self.accessors.len() - 1
    }

    fn push_node(&mut self, node: &SceneNode) {
        let position = self.push_vec3(&node.positions, true);
        let normal = self.push_vec3(&node.normals, false);

        let mut attributes = json!({
            "POSITION": position,
            "NORMAL": normal,
        });
        if let Some(colors) = &node.colors {
            attributes["COLOR_0"] = json!(self.push_vec3(colors, false));
        }
        let indices = self.push_indices(&node.indices);

        self.materials.push(json!({
            "name": node.name,
            "pbrMetallicRoughness": {
                "baseColorFactor": node.base_color,
                "metallicFactor": 0.0,
                "roughnessFactor": 0.9,
            },
        }));
        let material = self.materials.len() - 1;

        self.meshes.push(json!({
            "name": node.name,
            "primitives": [{
                "attributes": attributes,
                "indices": indices,
                "material": material,
                "mode": TRIANGLES,
            }],
        }));
        self.nodes.push(json!({
            "name": node.name,
            "mesh": self.meshes.len() - 1,
        }));
    }
}

fn bounds(values: &[[f32; 3]]) -> ([f32; 3], [f32; 3]) {
    let mut min = [f32::INFINITY; 3];
    let mut max = [f32::NEG_INFINITY; 3];
    for v in values {
        for i in 0..3 {
            min[i] = min[i].min(v[i]);
            max[i] = max[i].max(v[i]);
        }
    }
    (min, max)
}

fn validate(node: &SceneNode) -> Result<(), ExportError> {
    let invalid = |reason: String| ExportError::InvalidMesh {
        node: node.name.clone(),
        reason,
    };

    let count = node.positions.len();
    if node.normals.len() != count {
        return Err(invalid(format!("{} normals for {} positions", node.normals.len(), count)));
    }
    if let Some(colors) = &node.colors
        && colors.len() != count
    {
        return Err(invalid(format!("{} colours for {} positions", colors.len(), count)));
    }
    if node.indices.len() % 3 != 0 {
        return Err(invalid(format!(
            "{} indices is not a whole number of triangles",
            node.indices.len()
        )));
    }
    if let Some(&bad) = node.indices.iter().find(|&&i| i as usize >= count) {
        return Err(invalid(format!("index {} out of range for {} vertices", bad, count)));
    }
    if node.positions.iter().flatten().any(|c| !c.is_finite()) {
        return Err(invalid("non-finite position".to_string()));
    }
    Ok(())
}

/// Encode `scene` as a GLB file.
///
/// Output depends only on the scene, so the same scene always produces the
/// same bytes.
pub fn write_glb(scene: &Scene) -> Result<Vec<u8>, ExportError> {
    if scene.nodes.is_empty() {
        return Err(ExportError::EmptyScene);
    }

    let mut builder = Builder::default();
    for node in &scene.nodes {
        validate(node)?;
        builder.push_node(node);
    }

    let node_indices: Vec<usize> = (0..builder.nodes.len()).collect();
    let document = json!({
        "asset": {
            "version": "2.0",
            "generator": concat!("flowlab ", env!("CARGO_PKG_VERSION")),
        },
        "scene": 0,
        "scenes": [{
            "nodes": node_indices,
            "extras": { "background": scene.background },
        }],
        "nodes": builder.nodes,
        "meshes": builder.meshes,
        "materials": builder.materials,
        "accessors": builder.accessors,
        "bufferViews": builder.buffer_views,
        "buffers": [{ "byteLength": builder.bin.len() }],
    });

    let mut json_chunk = serde_json::to_vec(&document)?;
    pad(&mut json_chunk, b' ');
    let mut bin_chunk = builder.bin;
    pad(&mut bin_chunk, 0);

    let total = 12 + 8 + json_chunk.len() + 8 + bin_chunk.len();
    let total_u32 = u32::try_from(total).map_err(|_| ExportError::TooLarge(total))?;

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&GLB_MAGIC.to_le_bytes());
    out.extend_from_slice(&GLB_VERSION.to_le_bytes());
    out.extend_from_slice(&total_u32.to_le_bytes());

    out.extend_from_slice(&(json_chunk.len() as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    out.extend_from_slice(&json_chunk);

    out.extend_from_slice(&(bin_chunk.len() as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_BIN.to_le_bytes());
    out.extend_from_slice(&bin_chunk);

    Ok(out)
}

fn pad(chunk: &mut Vec<u8>, byte: u8) {
    while chunk.len() % 4 != 0 {
        chunk.push(byte);
    }
}


#[cfg(test)]
mod tests {
    use super::testing::parse_glb;
    use super::*;

    fn triangle(name: &str, colors: bool) -> SceneNode {
        SceneNode {
            name: name.to_string(),
            positions: vec![[0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 1.0, -1.0]],
            normals: vec![[0.0, 0.0, 1.0]; 3],
            indices: vec![0, 1, 2],
            colors: colors.then(|| vec![[1.0, 0.0, 0.0]; 3]),
            base_color: [1.0, 1.0, 1.0, 1.0],
        }
    }

    fn scene(nodes: Vec<SceneNode>) -> Scene {
        Scene {
            background: "#111111".to_string(),
            nodes,
        }
    }

    #[test]
    fn test_container_layout() {
        let bytes = write_glb(&scene(vec![triangle("car", false)])).unwrap();
        assert_eq!(bytes.len() % 4, 0);

        let (json, bin) = parse_glb(&bytes);
        // positions + normals + indices
        assert_eq!(bin.len(), 36 + 36 + 12);
        assert_eq!(json["buffers"][0]["byteLength"], 84);
        assert_eq!(json["asset"]["version"], "2.0");
        assert_eq!(json["scenes"][0]["extras"]["background"], "#111111");
    }

    #[test]
    fn test_position_bounds_and_material() {
        let bytes = write_glb(&scene(vec![triangle("car", false)])).unwrap();
        let (json, _) = parse_glb(&bytes);

        let position = json["meshes"][0]["primitives"][0]["attributes"]["POSITION"]
            .as_u64()
            .unwrap();
        let accessor = &json["accessors"][position as usize];
        assert_eq!(accessor["min"], serde_json::json!([0.0, 0.0, -1.0]));
        assert_eq!(accessor["max"], serde_json::json!([2.0, 1.0, 0.0]));

        let material = &json["materials"][0]["pbrMetallicRoughness"];
        assert_eq!(material["metallicFactor"], 0.0);
        assert_eq!(material["roughnessFactor"], 0.9);
    }

    #[test]
    fn test_vertex_colours_exported() {
        let bytes =
            write_glb(&scene(vec![triangle("car", false), triangle("streamlines", true)])).unwrap();
        let (json, _) = parse_glb(&bytes);

        assert_eq!(json["nodes"].as_array().unwrap().len(), 2);
        assert!(json["meshes"][0]["primitives"][0]["attributes"].get("COLOR_0").is_none());
        assert!(json["meshes"][1]["primitives"][0]["attributes"].get("COLOR_0").is_some());
        assert_eq!(json["meshes"][1]["name"], "streamlines");
    }

    #[test]
    fn test_deterministic() {
        let s = scene(vec![triangle("car", false), triangle("streamlines", true)]);
        assert_eq!(write_glb(&s).unwrap(), write_glb(&s).unwrap());
    }

    #[test]
    fn test_empty_scene() {
        assert!(matches!(write_glb(&scene(vec![])), Err(ExportError::EmptyScene)));
    }

    #[test]
    fn test_bad_index_rejected() {
        let mut node = triangle("car", false);
        node.indices = vec![0, 1, 7];
        let err = write_glb(&scene(vec![node])).unwrap_err();
        assert!(matches!(err, ExportError::InvalidMesh { .. }));
        assert!(err.to_string().contains("out of range"));
    }
}
