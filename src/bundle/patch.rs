//! Re-iconing bundled executables.
//!
//! Resource editors cannot safely rewrite an image with payloads appended,
//! so the bundle is taken apart, the bare host is patched, and the bundle is
//! regenerated from the extracted files.

use super::{
    extract::BundleFile,
    header::find_marker,
    writer::{BundleOptions, collect_file_specs, generate_bundle},
};
use crate::bundler::{
    collaborators::ResourceEditor,
    error::{Context, Error, ErrorExt, Result},
    utils::fs::write_atomic,
};
use std::path::Path;

/// Whether `path` is a host with files bundled into it.
pub fn is_single_file_bundle(path: &Path) -> Result<bool> {
    let bytes = std::fs::read(path).fs_context("reading executable", path)?;
    Ok(find_marker(&bytes).is_some_and(|m| m.is_bundled()))
}

/// Writes a copy of the bundle at `source` to `destination` with its host
/// icon replaced by `icon`.
///
/// `source` and `destination` may be the same path.
pub fn update_bundle_icon(
    source: &Path,
    destination: &Path,
    icon: &Path,
    editor: &dyn ResourceEditor,
) -> Result<()> {
    let work = tempfile::tempdir().fs_context("creating temp directory", std::env::temp_dir())?;
    let content_dir = work.path().join("content");
    let host_path = work.path().join("host.exe");

    let bundle = BundleFile::open(source).with_context(|| {
        format!("{} is not a single-file bundle", source.display())
    })?;
    log::info!("Extracting {} bundled files", bundle.header().entries.len());
    bundle.extract_all(&content_dir)?;

    let mut host = bundle.bytes()[..bundle.host_len()].to_vec();
    let slot = bundle.marker().slot_offset;
    if slot + 8 > host.len() {
        return Err(Error::format(format!(
            "bundle marker of {} lies outside its host image",
            source.display()
        )));
    }
    host[slot..slot + 8].fill(0);
    drop(bundle);
    std::fs::write(&host_path, &host).fs_context("writing host image", &host_path)?;

    log::info!("Patching icon of {}", source.display());
    editor.set_icon(&host_path, icon)?;
    let host = std::fs::read(&host_path).fs_context("reading patched host", &host_path)?;

    log::info!("Re-packing {}", destination.display());
    let specs = collect_file_specs(&content_dir, &[])?;
    let bytes = generate_bundle(&host, &specs, BundleOptions::default())?;
    write_atomic(destination, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::header::BUNDLE_SIGNATURE;
    use std::sync::Mutex;

    /// Appends the icon bytes to the host, as a stand-in for a resource edit.
    #[derive(Default)]
    struct AppendingEditor {
        calls: Mutex<Vec<String>>,
    }

    impl ResourceEditor for AppendingEditor {
        fn set_icon(&self, exe: &Path, icon: &Path) -> Result<()> {
            let mut bytes = std::fs::read(exe)?;
            bytes.extend(std::fs::read(icon)?);
            std::fs::write(exe, bytes)?;
            self.calls.lock().unwrap().push(exe.display().to_string());
            Ok(())
        }

        fn copy_resources(&self, _from: &Path, _to: &Path) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn reicon_preserves_payloads() {
        let dir = tempfile::tempdir().unwrap();
        let content = dir.path().join("content");
        std::fs::create_dir_all(&content).unwrap();
        std::fs::write(content.join("Update.dll"), vec![3u8; 2048]).unwrap();
        std::fs::write(content.join("Update.runtimeconfig.json"), "{}").unwrap();

        let mut host = b"MZ host".to_vec();
        host.extend_from_slice(&0i64.to_le_bytes());
        host.extend_from_slice(&BUNDLE_SIGNATURE);
        let specs = collect_file_specs(&content, &[]).unwrap();
        let original = generate_bundle(&host, &specs, BundleOptions::default()).unwrap();
        let source = dir.path().join("Update.exe");
        std::fs::write(&source, &original).unwrap();
        assert!(is_single_file_bundle(&source).unwrap());

        let icon = dir.path().join("setup.ico");
        std::fs::write(&icon, b"ICON").unwrap();
        let editor = AppendingEditor::default();
        let dest = dir.path().join("out").join("Update.exe");
        update_bundle_icon(&source, &dest, &icon, &editor).unwrap();
        assert_eq!(editor.calls.lock().unwrap().len(), 1);

        let patched = BundleFile::open(&dest).unwrap();
        let host_part = &patched.bytes()[..patched.host_len()];
        assert!(host_part.windows(4).any(|w| w == b"ICON"));
        let dll = patched.header().entry("Update.dll").unwrap();
        assert_eq!(patched.read(dll).unwrap().as_ref(), vec![3u8; 2048].as_slice());
        assert!(patched.header().entry("Update.runtimeconfig.json").is_some());
    }

    #[test]
    fn plain_executables_are_not_bundles() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("plain.exe");
        std::fs::write(&exe, b"MZ nothing here").unwrap();
        assert!(!is_single_file_bundle(&exe).unwrap());
        let err = update_bundle_icon(&exe, &exe, &exe, &AppendingEditor::default()).unwrap_err();
        assert!(err.is_rejection());
    }
}
