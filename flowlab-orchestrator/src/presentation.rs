//! Browser-facing rendering of a visualization

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use crate::ViewerConfig;
use crate::postprocess::Visualization;

/// `<model-viewer>` element showing `glb` inline as a data URI
pub fn viewer_html(glb: &[u8], viewer: &ViewerConfig) -> String {
    let encoded = BASE64.encode(glb);
    format!(
        r#"<script type="module" src="{script}"></script>
<model-viewer src="data:model/gltf-binary;base64,{encoded}"
              style="width: 100%; height: {height}px; background-color: #111;"
              camera-controls auto-rotate shadow-intensity="1">
</model-viewer>"#,
        script = escape_attr(&viewer.script_url),
        encoded = encoded,
        height = viewer.height_px,
    )
}

/// Velocity with two decimals, e.g. `3.00 m/s`
pub fn format_velocity(v: f64) -> String {
    format!("{:.2} m/s", v)
}

/// `Content-Disposition` value offering `name` as a download
pub fn download_disposition(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    format!("attachment; filename=\"{}\"", safe)
}

/// Viewer plus the velocity metric, framed at the configured height
pub fn viewer_fragment(vis: &Visualization, viewer: &ViewerConfig) -> String {
    format!(
        r#"<div class="flow-view" style="height: {frame}px;">
{viewer}
</div>
<div class="flow-metric">
  <span class="label">Top Air Velocity</span>
  <span class="value">{velocity}</span>
</div>"#,
        frame = viewer.frame_height_px,
        viewer = viewer_html(&vis.glb, viewer),
        velocity = format_velocity(vis.max_velocity),
    )
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;").replace('"', "&quot;").replace('<', "&lt;")
}
