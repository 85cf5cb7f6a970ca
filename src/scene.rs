// Scene: the mutation surface over the rendered SVG.
// The engine never touches a DOM directly; a host scene applies the calls (or records them
// as ops for JS to replay in one batch).

use serde::{Deserialize, Serialize};

use crate::discovery::SvgIndex;
use crate::synth::{Fill, LabelLine};
use crate::types::DisconnectedStyle;

/// Root attributes dropped on bind so the plan scales to its container.
pub const FIXED_SIZE_ATTRIBUTES: [&str; 2] = ["width", "height"];

/// Minimal mutation interface over the rendered floor plan.
pub trait Scene {
    /// Handle to a region's shape element.
    type Shape;
    /// Handle to a region's value label element.
    type Label;

    /// Prepare the root element once the scene is bound.
    fn prepare_root(&mut self);

    fn find_region_shape(&self, region: &str) -> Option<Self::Shape>;
    fn find_region_label(&self, region: &str) -> Option<Self::Label>;

    /// Set the shape's fill at full opacity.
    fn set_fill(&mut self, shape: &Self::Shape, fill: &Fill);
    /// Replace the label's content with `lines`, anchored at the label's x.
    fn set_label_lines(&mut self, label: &Self::Label, lines: &[LabelLine]);
    /// Show the disconnected marker for `region`.
    fn set_disconnected_state(&mut self, region: &str, style: &DisconnectedStyle);
    /// Create or update the radial gradient `id` for `region`, fading to `color`.
    fn ensure_radial_gradient(&mut self, id: &str, region: &str, color: &str);
}

/// One recorded scene mutation, replayed by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum SceneOp {
    PrepareRoot {
        remove_attributes: Vec<String>,
    },
    EnsureRadialGradient {
        id: String,
        region: String,
        color: String,
        /// True when the definition does not exist yet and must be appended.
        create: bool,
    },
    SetFill {
        element: String,
        fill: String,
        fill_opacity: f64,
    },
    SetLabelLines {
        element: String,
        lines: Vec<LabelLine>,
    },
    SetDisconnected {
        region: String,
        label: Option<String>,
        name_label: Option<String>,
        shape: Option<String>,
        style: DisconnectedStyle,
    },
}

/// Scene backed by an [`SvgIndex`] that records ops instead of mutating a DOM.
/// Handles are element ids.
#[derive(Debug, Clone, Default)]
pub struct RecordingScene {
    index: SvgIndex,
    region_prefix: String,
    name_prefix: String,
    ops: Vec<SceneOp>,
}

impl RecordingScene {
    pub fn new(index: SvgIndex) -> Self {
        Self::with_prefixes(
            index,
            crate::discovery::REGION_PREFIX,
            crate::discovery::NAME_PREFIX,
        )
    }

    pub fn with_prefixes(index: SvgIndex, region_prefix: &str, name_prefix: &str) -> Self {
        RecordingScene {
            index,
            region_prefix: region_prefix.to_string(),
            name_prefix: name_prefix.to_string(),
            ops: Vec::new(),
        }
    }

    pub fn ops(&self) -> &[SceneOp] {
        &self.ops
    }

    /// Take all ops recorded since the last drain.
    pub fn drain(&mut self) -> Vec<SceneOp> {
        std::mem::take(&mut self.ops)
    }

    pub fn index(&self) -> &SvgIndex {
        &self.index
    }
}

/// Builds recording scenes for one markup document. Gradient definitions created by
/// earlier scenes are remembered, so re-binding the same markup never appends them twice.
#[derive(Debug, Clone, Default)]
pub struct SceneBinder {
    markup: String,
    index: SvgIndex,
    region_prefix: String,
    name_prefix: String,
}

impl SceneBinder {
    pub fn new(region_prefix: &str, name_prefix: &str) -> Self {
        SceneBinder {
            region_prefix: region_prefix.to_string(),
            name_prefix: name_prefix.to_string(),
            ..Default::default()
        }
    }

    /// Switch to `markup`. Returns false (and keeps the gradient record) when unchanged.
    pub fn set_markup(&mut self, markup: &str) -> bool {
        if markup == self.markup {
            return false;
        }
        self.markup = markup.to_string();
        self.index = SvgIndex::parse_with_prefixes(markup, &self.region_prefix, &self.name_prefix);
        true
    }

    pub fn markup(&self) -> &str {
        &self.markup
    }

    /// A fresh scene over the current markup.
    pub fn bind(&self) -> RecordingScene {
        RecordingScene::with_prefixes(self.index.clone(), &self.region_prefix, &self.name_prefix)
    }

    /// Keep the gradients `scene` created. Only valid for a scene bound to the current markup.
    pub fn absorb(&mut self, scene: &RecordingScene) {
        self.index.merge_gradients(scene.index());
    }
}

impl Scene for RecordingScene {
    type Shape = String;
    type Label = String;

    fn prepare_root(&mut self) {
        self.ops.push(SceneOp::PrepareRoot {
            remove_attributes: FIXED_SIZE_ATTRIBUTES.iter().map(|a| a.to_string()).collect(),
        });
    }

    fn find_region_shape(&self, region: &str) -> Option<String> {
        self.index
            .has_shape(region)
            .then(|| format!("{}{}", self.region_prefix, region))
    }

    fn find_region_label(&self, region: &str) -> Option<String> {
        self.index
            .has_value_label(region)
            .then(|| region.to_string())
    }

    fn set_fill(&mut self, shape: &String, fill: &Fill) {
        self.ops.push(SceneOp::SetFill {
            element: shape.clone(),
            fill: fill.attribute(),
            fill_opacity: 1.0,
        });
    }

    fn set_label_lines(&mut self, label: &String, lines: &[LabelLine]) {
        self.ops.push(SceneOp::SetLabelLines {
            element: label.clone(),
            lines: lines.to_vec(),
        });
    }

    fn set_disconnected_state(&mut self, region: &str, style: &DisconnectedStyle) {
        let label = self.find_region_label(region);
        let name_label = self
            .index
            .has_name_label(region)
            .then(|| format!("{}{}", self.name_prefix, region));
        let shape = self.find_region_shape(region);
        self.ops.push(SceneOp::SetDisconnected {
            region: region.to_string(),
            label,
            name_label,
            shape,
            style: style.clone(),
        });
    }

    fn ensure_radial_gradient(&mut self, id: &str, region: &str, color: &str) {
        let create = self.index.record_gradient(id);
        self.ops.push(SceneOp::EnsureRadialGradient {
            id: id.to_string(),
            region: region.to_string(),
            color: color.to_string(),
            create,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = r#"<svg>
        <rect id="room:101"/>
        <text id="name:101"><tspan>Lab</tspan></text>
        <text id="101" x="4"><tspan>--</tspan></text>
        <rect id="room:102"/>
    </svg>"#;

    fn scene() -> RecordingScene {
        RecordingScene::new(SvgIndex::parse(PLAN))
    }

    #[test]
    fn lookups_follow_index() {
        let scene = scene();
        assert_eq!(scene.find_region_shape("101"), Some("room:101".to_string()));
        assert_eq!(scene.find_region_label("101"), Some("101".to_string()));
        assert_eq!(scene.find_region_label("102"), None);
        assert_eq!(scene.find_region_shape("999"), None);
    }

    #[test]
    fn gradient_created_once() {
        let mut scene = scene();
        scene.ensure_radial_gradient("rg-1-101", "101", "#ff0000");
        scene.ensure_radial_gradient("rg-1-101", "101", "#00ff00");
        let ops = scene.drain();
        assert!(matches!(&ops[0], SceneOp::EnsureRadialGradient { create: true, .. }));
        assert!(matches!(&ops[1], SceneOp::EnsureRadialGradient { create: false, .. }));
        assert!(scene.ops().is_empty());
    }

    #[test]
    fn disconnected_op_names_elements() {
        let mut scene = scene();
        scene.set_disconnected_state("101", &DisconnectedStyle::default());
        scene.set_disconnected_state("102", &DisconnectedStyle::default());
        let ops = scene.drain();
        assert_eq!(
            ops[0],
            SceneOp::SetDisconnected {
                region: "101".to_string(),
                label: Some("101".to_string()),
                name_label: Some("name:101".to_string()),
                shape: Some("room:101".to_string()),
                style: DisconnectedStyle::default(),
            }
        );
        assert!(matches!(&ops[1], SceneOp::SetDisconnected { label: None, name_label: None, .. }));
    }

    #[test]
    fn prepare_root_drops_fixed_size() {
        let mut scene = scene();
        scene.prepare_root();
        let json = serde_json::to_string(&scene.drain()).unwrap();
        assert_eq!(
            json,
            r#"[{"op":"PrepareRoot","remove_attributes":["width","height"]}]"#
        );
    }

    #[test]
    fn binder_remembers_created_gradients() {
        let mut binder = SceneBinder::new(crate::discovery::REGION_PREFIX, crate::discovery::NAME_PREFIX);
        assert!(binder.set_markup(PLAN));

        let mut first = binder.bind();
        first.ensure_radial_gradient("rg-1-101", "101", "#ff0000");
        binder.absorb(&first);

        let mut second = binder.bind();
        second.ensure_radial_gradient("rg-1-101", "101", "#ff0000");
        assert!(matches!(
            &second.drain()[0],
            SceneOp::EnsureRadialGradient { create: false, .. }
        ));
    }

    #[test]
    fn binder_forgets_gradients_on_new_markup() {
        let mut binder = SceneBinder::new(crate::discovery::REGION_PREFIX, crate::discovery::NAME_PREFIX);
        binder.set_markup(PLAN);
        let mut first = binder.bind();
        first.ensure_radial_gradient("rg-1-101", "101", "#ff0000");
        binder.absorb(&first);

        assert!(!binder.set_markup(PLAN));
        assert!(binder.set_markup(&PLAN.replace("room:102", "room:103")));
        let mut next = binder.bind();
        next.ensure_radial_gradient("rg-1-101", "101", "#ff0000");
        assert!(matches!(
            &next.drain()[0],
            SceneOp::EnsureRadialGradient { create: true, .. }
        ));
    }

    #[test]
    fn ops_serialize_with_tag() {
        let mut scene = scene();
        scene.set_fill(
            &"room:101".to_string(),
            &Fill::Solid {
                color: "#ff0000".to_string(),
            },
        );
        let json = serde_json::to_string(&scene.drain()).unwrap();
        assert_eq!(
            json,
            r##"[{"op":"SetFill","element":"room:101","fill":"#ff0000","fill_opacity":1.0}]"##
        );
    }
}
