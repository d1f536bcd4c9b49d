//! Writes release metadata back into an extracted package manifest.

use crate::bundler::{
    error::{Error, ErrorExt, Result},
    settings::RuntimeCpu,
    utils::fs::write_atomic,
};
use std::path::Path;
use xmltree::{Element, EmitterConfig, XMLNode};

/// Element recording the resolved package architecture.
pub const MACHINE_ARCHITECTURE_ELEMENT: &str = "machineArchitecture";

/// Element recording the runtimes the application requires.
pub const RUNTIME_DEPENDENCIES_ELEMENT: &str = "runtimeDependencies";

/// Stamps the resolved architecture and required runtime ids into the
/// manifest at `manifest_path`, replacing any previous values.
///
/// An unknown architecture is not written.
pub fn stamp_release_metadata(
    manifest_path: &Path,
    architecture: RuntimeCpu,
    runtime_dependencies: &[String],
) -> Result<()> {
    let content = std::fs::read(manifest_path).fs_context("reading manifest", manifest_path)?;
    let mut document = Element::parse(content.as_slice()).map_err(|e| {
        Error::format(format!(
            "package manifest `{}` is not valid XML: {e}",
            manifest_path.display()
        ))
    })?;

    let Some(metadata) = document.get_mut_child("metadata") else {
        return Err(Error::format("missing metadata element"));
    };

    metadata.children.retain(|node| {
        !matches!(node, XMLNode::Element(e)
            if e.name == MACHINE_ARCHITECTURE_ELEMENT || e.name == RUNTIME_DEPENDENCIES_ELEMENT)
    });

    if architecture != RuntimeCpu::Unknown {
        metadata.children.push(XMLNode::Element(text_element(
            MACHINE_ARCHITECTURE_ELEMENT,
            &architecture.to_string(),
        )));
    }
    if !runtime_dependencies.is_empty() {
        metadata.children.push(XMLNode::Element(text_element(
            RUNTIME_DEPENDENCIES_ELEMENT,
            &runtime_dependencies.join(","),
        )));
    }

    let mut out = Vec::new();
    document.write_with_config(&mut out, EmitterConfig::new().perform_indent(true))?;
    write_atomic(manifest_path, &out)
}

fn text_element(name: &str, text: &str) -> Element {
    let mut element = Element::new(name);
    element.children.push(XMLNode::Text(text.to_string()));
    element
}
