//! Package manifest (`.nuspec`) parsing.

use super::{
    framework::FrameworkName,
    version::{VersionRange, parse_version},
};
use crate::bundler::error::{Error, Result};
use semver::Version;
use std::{collections::BTreeSet, io::Read};
use url::Url;
use xmltree::{Element, XMLNode};

/// Metadata read from a package manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageMetadata {
    /// Package id.
    pub id: String,
    /// Package version.
    pub version: Version,
    /// Authors, in declaration order.
    pub authors: Vec<String>,
    /// Display title.
    pub title: Option<String>,
    /// One-line summary.
    pub summary: Option<String>,
    /// Long description.
    pub description: Option<String>,
    /// Copyright notice.
    pub copyright: Option<String>,
    /// Locale of the package content.
    pub language: Option<String>,
    /// Release notes for this version.
    pub release_notes: Option<String>,
    /// Project homepage.
    pub project_url: Option<Url>,
    /// Icon location, used when the package ships no icon of its own.
    pub icon_url: Option<Url>,
    /// Framework assemblies the package references.
    pub framework_assemblies: Vec<FrameworkAssemblyReference>,
    /// Dependency declarations.
    pub dependency_sets: Vec<DependencySet>,
}

/// A reference to an assembly shipped with a target framework.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameworkAssemblyReference {
    /// Assembly name, e.g. `System.Net.Http`.
    pub assembly_name: String,
    /// Frameworks the reference applies to. Empty means all.
    pub supported_frameworks: BTreeSet<FrameworkName>,
}

/// Dependencies that apply to one target framework (or to all, when ungrouped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySet {
    /// `None` for the ungrouped style.
    pub target_framework: Option<FrameworkName>,
    /// Dependencies in declaration order.
    pub dependencies: Vec<Dependency>,
}

/// A dependency on another package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Package id depended upon.
    pub id: String,
    /// Accepted versions, `None` for any.
    pub version_range: Option<VersionRange>,
}

impl PackageMetadata {
    /// Full display name, `"{id} {version}"`.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.id, self.version)
    }

    /// Parses a manifest document.
    pub fn parse<R: Read>(reader: R) -> Result<Self> {
        let document = Element::parse(reader)
            .map_err(|e| Error::format(format!("package manifest is not valid XML: {e}")))?;
        Self::from_document(&document)
    }

    /// Reads metadata from an already-parsed manifest document.
    pub fn from_document(document: &Element) -> Result<Self> {
        let metadata = child_elements(document, "metadata")
            .next()
            .ok_or_else(|| Error::format("missing metadata element"))?;

        let mut fields = ManifestFields::default();
        for element in metadata.children.iter().filter_map(as_element) {
            read_metadata_value(&mut fields, element)?;
        }
        fields.finish()
    }
}

#[derive(Default)]
struct ManifestFields {
    id: Option<String>,
    version: Option<Version>,
    authors: Vec<String>,
    title: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    copyright: Option<String>,
    language: Option<String>,
    release_notes: Option<String>,
    project_url: Option<Url>,
    icon_url: Option<Url>,
    framework_assemblies: Vec<FrameworkAssemblyReference>,
    dependency_sets: Vec<DependencySet>,
}

impl ManifestFields {
    fn finish(self) -> Result<PackageMetadata> {
        let id = self
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::format("manifest is missing required element <id>"))?;
        let version = self
            .version
            .ok_or_else(|| Error::format("manifest is missing required element <version>"))?;

        Ok(PackageMetadata {
            id,
            version,
            authors: self.authors,
            title: self.title,
            summary: self.summary,
            description: self.description,
            copyright: self.copyright,
            language: self.language,
            release_notes: self.release_notes,
            project_url: self.project_url,
            icon_url: self.icon_url,
            framework_assemblies: self.framework_assemblies,
            dependency_sets: self.dependency_sets,
        })
    }
}

fn read_metadata_value(fields: &mut ManifestFields, element: &Element) -> Result<()> {
    let value = element_text(element);
    match element.name.as_str() {
        "id" => fields.id = Some(value),
        "version" => fields.version = Some(parse_version(&value)?),
        "authors" => {
            fields.authors = value
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(String::from)
                .collect();
        }
        "projectUrl" => fields.project_url = parse_url("projectUrl", &value)?,
        "iconUrl" => fields.icon_url = parse_url("iconUrl", &value)?,
        "description" => fields.description = non_empty(value),
        "summary" => fields.summary = non_empty(value),
        "releaseNotes" => fields.release_notes = non_empty(value),
        "copyright" => fields.copyright = non_empty(value),
        "language" => fields.language = non_empty(value),
        "title" => fields.title = non_empty(value),
        "dependencies" => fields.dependency_sets = read_dependency_sets(element)?,
        "frameworkAssemblies" => {
            fields.framework_assemblies = read_framework_assemblies(element);
        }
        other => log::trace!("Ignoring manifest element <{other}>"),
    }
    Ok(())
}

fn read_dependency_sets(element: &Element) -> Result<Vec<DependencySet>> {
    let has_direct = child_elements(element, "dependency").next().is_some();
    let has_groups = child_elements(element, "group").next().is_some();

    if has_direct && has_groups {
        return Err(Error::format(
            "mixed dependency declaration styles: <dependencies> contains both <dependency> and <group> elements",
        ));
    }

    if has_direct {
        return Ok(vec![DependencySet {
            target_framework: None,
            dependencies: read_dependencies(element)?,
        }]);
    }

    child_elements(element, "group")
        .map(|group| {
            Ok(DependencySet {
                target_framework: group
                    .attributes
                    .get("targetFramework")
                    .and_then(|fx| FrameworkName::parse(fx)),
                dependencies: read_dependencies(group)?,
            })
        })
        .collect()
}

/// Dependencies without a usable `id` are skipped.
fn read_dependencies(container: &Element) -> Result<Vec<Dependency>> {
    let mut dependencies = Vec::new();
    for element in child_elements(container, "dependency") {
        let Some(id) = element
            .attributes
            .get("id")
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
        else {
            log::debug!("Skipping <dependency> without an id");
            continue;
        };

        let version_range = match element.attributes.get("version").map(|v| v.trim()) {
            Some(range) if !range.is_empty() => Some(VersionRange::parse(range).map_err(
                |e| Error::format(format!("dependency `{id}` has an invalid version: {e}")),
            )?),
            _ => None,
        };

        dependencies.push(Dependency {
            id: id.to_string(),
            version_range,
        });
    }
    Ok(dependencies)
}

fn read_framework_assemblies(element: &Element) -> Vec<FrameworkAssemblyReference> {
    child_elements(element, "frameworkAssembly")
        .filter_map(|assembly| {
            let name = assembly
                .attributes
                .get("assemblyName")
                .map(|n| n.trim())
                .filter(|n| !n.is_empty())?;

            let supported_frameworks = assembly
                .attributes
                .get("targetFramework")
                .map(|list| list.split(',').filter_map(FrameworkName::parse).collect())
                .unwrap_or_default();

            Some(FrameworkAssemblyReference {
                assembly_name: name.to_string(),
                supported_frameworks,
            })
        })
        .collect()
}

fn parse_url(field: &str, value: &str) -> Result<Option<Url>> {
    if value.is_empty() {
        return Ok(None);
    }
    Url::parse(value)
        .map(Some)
        .map_err(|e| Error::format(format!("<{field}> `{value}` is not an absolute URL: {e}")))
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

fn element_text(element: &Element) -> String {
    element
        .get_text()
        .map(|text| text.trim().to_string())
        .unwrap_or_default()
}

fn as_element(node: &XMLNode) -> Option<&Element> {
    match node {
        XMLNode::Element(element) => Some(element),
        _ => None,
    }
}

/// Child elements matching `name`, ignoring namespaces.
pub(crate) fn child_elements<'a>(
    element: &'a Element,
    name: &'a str,
) -> impl Iterator<Item = &'a Element> + 'a {
    element
        .children
        .iter()
        .filter_map(as_element)
        .filter(move |child| child.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(metadata: &str) -> Result<PackageMetadata> {
        let xml = format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://schemas.microsoft.com/packaging/2010/07/nuspec.xsd">
  <metadata>{metadata}</metadata>
</package>"#
        );
        PackageMetadata::parse(xml.as_bytes())
    }

    #[test]
    fn reads_basic_fields() {
        let meta = parse(
            "<id>Foo</id><version>1.0</version><authors> Ann , Bob,, </authors>
             <title>Foo App</title><description>Does foo</description>
             <projectUrl>https://example.com/foo</projectUrl><owners>ignored</owners>",
        )
        .unwrap();
        assert_eq!(meta.id, "Foo");
        assert_eq!(meta.version, Version::new(1, 0, 0));
        assert_eq!(meta.authors, vec!["Ann", "Bob"]);
        assert_eq!(meta.title.as_deref(), Some("Foo App"));
        assert_eq!(meta.description.as_deref(), Some("Does foo"));
        assert_eq!(
            meta.project_url.as_ref().map(Url::as_str),
            Some("https://example.com/foo")
        );
        assert!(meta.summary.is_none());
        assert_eq!(meta.full_name(), "Foo 1.0.0");
    }

    #[test]
    fn ungrouped_dependencies_form_one_set() {
        let meta = parse(
            r#"<id>Foo</id><version>1.0.0</version>
               <dependencies><dependency id="Bar" version="2.0.0" /></dependencies>"#,
        )
        .unwrap();
        assert_eq!(meta.dependency_sets.len(), 1);
        let set = &meta.dependency_sets[0];
        assert!(set.target_framework.is_none());
        assert_eq!(set.dependencies.len(), 1);
        assert_eq!(set.dependencies[0].id, "Bar");
        assert_eq!(
            set.dependencies[0].version_range,
            Some(VersionRange::at_least(Version::new(2, 0, 0)))
        );
    }

    #[test]
    fn grouped_dependencies_keep_frameworks() {
        let meta = parse(
            r#"<id>Foo</id><version>1.0.0</version>
               <dependencies>
                 <group targetFramework="net45"><dependency id="A" /></group>
                 <group targetFramework="netstandard2.0">
                   <dependency id="B" version="[1.0,2.0)" />
                 </group>
               </dependencies>"#,
        )
        .unwrap();
        assert_eq!(meta.dependency_sets.len(), 2);
        assert_eq!(
            meta.dependency_sets[0].target_framework,
            FrameworkName::parse("net45")
        );
        assert!(meta.dependency_sets[0].dependencies[0].version_range.is_none());
        assert_eq!(meta.dependency_sets[1].dependencies[0].id, "B");
    }

    #[test]
    fn mixed_dependency_styles_fail() {
        let err = parse(
            r#"<id>Foo</id><version>1.0.0</version>
               <dependencies>
                 <dependency id="Bar" version="2.0.0" />
                 <group targetFramework="net45"><dependency id="Baz" /></group>
               </dependencies>"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Format(ref m) if m.contains("mixed dependency")));
    }

    #[test]
    fn dependencies_without_id_are_skipped() {
        let meta = parse(
            r#"<id>Foo</id><version>1.0.0</version>
               <dependencies>
                 <dependency version="1.0" />
                 <dependency id="Bar" version="2.0.0" />
                 <dependency id="  " />
               </dependencies>"#,
        )
        .unwrap();
        assert_eq!(meta.dependency_sets.len(), 1);
        let ids: Vec<&str> = meta.dependency_sets[0]
            .dependencies
            .iter()
            .map(|d| d.id.as_str())
            .collect();
        assert_eq!(ids, vec!["Bar"]);
    }

    #[test]
    fn framework_assemblies_skip_unnamed() {
        let meta = parse(
            r#"<id>Foo</id><version>1.0.0</version>
               <frameworkAssemblies>
                 <frameworkAssembly assemblyName="System.Net.Http" targetFramework="net45, net40, bogus" />
                 <frameworkAssembly targetFramework="net45" />
                 <frameworkAssembly assemblyName="  " />
               </frameworkAssemblies>"#,
        )
        .unwrap();
        assert_eq!(meta.framework_assemblies.len(), 1);
        let reference = &meta.framework_assemblies[0];
        assert_eq!(reference.assembly_name, "System.Net.Http");
        assert_eq!(reference.supported_frameworks.len(), 2);
    }

    #[test]
    fn missing_metadata_or_required_fields() {
        let err = PackageMetadata::parse("<package><files /></package>".as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Format(ref m) if m == "missing metadata element"));

        assert!(parse("<version>1.0.0</version>").is_err());
        assert!(parse("<id>Foo</id>").is_err());
        assert!(parse("<id>Foo</id><version>not-a-version</version>").is_err());
        assert!(parse("<id>Foo</id><version>1.0</version><iconUrl>icon.png</iconUrl>").is_err());
    }
}
