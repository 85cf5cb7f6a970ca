// Region discovery over sanitized SVG markup.
// Regions are elements whose id carries the region prefix (`room:101`). Value labels use the
// bare region name as id, name labels use the name prefix (`name:101`).

use std::collections::HashSet;

use log::{debug, warn};

use crate::error::EngineError;
use crate::types::Region;

pub const REGION_PREFIX: &str = "room:";
pub const NAME_PREFIX: &str = "name:";

/// Region names declared in `markup`, prefix stripped, in document order.
/// Malformed markup yields an empty list.
pub fn discover_regions(markup: &str) -> Vec<String> {
    discover_regions_with_prefix(markup, REGION_PREFIX)
}

pub fn discover_regions_with_prefix(markup: &str, prefix: &str) -> Vec<String> {
    match try_discover_regions(markup, prefix) {
        Ok(names) => names,
        Err(err) => {
            warn!("region discovery skipped: {}", err);
            Vec::new()
        }
    }
}

/// Strict variant of [`discover_regions_with_prefix`].
pub fn try_discover_regions(markup: &str, prefix: &str) -> Result<Vec<String>, EngineError> {
    if markup.trim().is_empty() {
        return Ok(Vec::new());
    }
    let doc = parse_markup(markup)?;
    let names = doc
        .descendants()
        .filter(|n| n.is_element())
        .filter_map(|n| n.attribute("id"))
        .filter_map(|id| id.strip_prefix(prefix))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();
    Ok(names)
}

/// Editors commonly emit a `<!DOCTYPE svg ...>` line, so DTDs are allowed.
fn parse_markup(markup: &str) -> Result<roxmltree::Document<'_>, roxmltree::Error> {
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    };
    roxmltree::Document::parse_with_options(markup, options)
}

/// Merge newly discovered names into the persistent region set.
/// Existing regions keep their animated state; new names start at `default_quality`.
/// Returns how many regions were added.
pub fn reconcile_regions(
    regions: &mut Vec<Region>,
    discovered: &[String],
    default_quality: f64,
) -> usize {
    let mut known: HashSet<String> = regions.iter().map(|r| r.name.clone()).collect();
    let mut added = 0;
    for name in discovered {
        if known.insert(name.clone()) {
            regions.push(Region::new(name.clone(), default_quality));
            added += 1;
        }
    }
    if added > 0 {
        debug!("reconciled {} new region(s), {} total", added, regions.len());
    }
    added
}

/// Addressable elements of one markup document.
/// Lets scenes without a live DOM answer shape/label lookups.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SvgIndex {
    shapes: HashSet<String>,
    value_labels: HashSet<String>,
    name_labels: HashSet<String>,
    gradients: HashSet<String>,
}

impl SvgIndex {
    /// Index `markup` using the default prefixes. Malformed markup gives an empty index.
    pub fn parse(markup: &str) -> Self {
        Self::parse_with_prefixes(markup, REGION_PREFIX, NAME_PREFIX)
    }

    pub fn parse_with_prefixes(markup: &str, region_prefix: &str, name_prefix: &str) -> Self {
        if markup.trim().is_empty() {
            return SvgIndex::default();
        }
        let doc = match parse_markup(markup) {
            Ok(doc) => doc,
            Err(err) => {
                warn!("svg index skipped: {}", err);
                return SvgIndex::default();
            }
        };

        let mut index = SvgIndex::default();
        let mut ids = Vec::new();
        for node in doc.descendants().filter(|n| n.is_element()) {
            let Some(id) = node.attribute("id") else {
                continue;
            };
            if node.tag_name().name() == "radialGradient" {
                index.gradients.insert(id.to_string());
            }
            ids.push(id);
        }

        for id in &ids {
            if let Some(name) = id.strip_prefix(region_prefix).filter(|n| !n.is_empty()) {
                index.shapes.insert(name.to_string());
            } else if let Some(name) = id.strip_prefix(name_prefix).filter(|n| !n.is_empty()) {
                index.name_labels.insert(name.to_string());
            }
        }
        // A value label is any element whose id is exactly a region name.
        for id in &ids {
            if index.shapes.contains(*id) {
                index.value_labels.insert(id.to_string());
            }
        }
        index
    }

    pub fn has_shape(&self, region: &str) -> bool {
        self.shapes.contains(region)
    }

    pub fn has_value_label(&self, region: &str) -> bool {
        self.value_labels.contains(region)
    }

    pub fn has_name_label(&self, region: &str) -> bool {
        self.name_labels.contains(region)
    }

    pub fn has_gradient(&self, id: &str) -> bool {
        self.gradients.contains(id)
    }

    pub(crate) fn record_gradient(&mut self, id: &str) -> bool {
        self.gradients.insert(id.to_string())
    }

    /// Take over the gradient definitions `other` has seen or created.
    pub(crate) fn merge_gradients(&mut self, other: &SvgIndex) {
        self.gradients.extend(other.gradients.iter().cloned());
    }
}
