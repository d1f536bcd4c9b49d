//! Content post-processing of a validated package.
//!
//! Runs between validation and repacking: resolves and stamps the package
//! architecture, creates launcher stubs, signs binaries, drops the updater
//! into the framework folder and places icons.

use super::{
    signing::{run_bounded, sign_tree},
    validation::ValidatedPackage,
};
use crate::{
    bundler::{
        Error, Result,
        collaborators::{Collaborators, ResourceEditor},
        error::ErrorExt,
        settings::{ArchitectureResolution, Settings, resolve_architecture},
        utils::fs::{RetryPolicy, copy_file, retry_io, write_atomic},
    },
    metadata::{PackageMetadata, stamp_release_metadata},
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use url::Url;

/// Suffix of launcher stub file stems.
pub const STUB_SUFFIX: &str = "_ExecutionStub";

/// Name of the application icon inside the framework folder.
pub const APP_ICON_NAME: &str = "app.ico";

/// Name of the setup icon at the package root.
pub const SETUP_ICON_NAME: &str = "setup.ico";

/// Stem of the splash image at the package root.
pub const SPLASH_IMAGE_STEM: &str = "splashimage";

/// What content processing did to a package.
#[derive(Clone, Debug)]
pub struct ContentReport {
    pub architecture: ArchitectureResolution,
    /// Stubs that were written successfully.
    pub stubs: Vec<PathBuf>,
    /// Number of binaries signed.
    pub signed: usize,
    /// Where the application icon ended up, if any.
    pub app_icon: Option<PathBuf>,
}

/// Post-processes a validated package in place.
///
/// `updater` is the already prepared and signed updater executable; it is
/// copied in after signing so it is not signed twice.
pub async fn process_content(
    package: &ValidatedPackage,
    metadata: &PackageMetadata,
    settings: &Settings,
    collaborators: &Collaborators,
    updater: Option<&Path>,
) -> Result<ContentReport> {
    let mut machines = Vec::new();
    for exe in &package.aware_executables {
        if let Some(code) = collaborators.inspector.machine(exe)? {
            machines.push(code);
        }
    }
    let architecture = resolve_architecture(machines);
    for warning in &architecture.warnings {
        log::warn!("{}: {warning}", metadata.full_name());
    }
    log::info!(
        "{} architecture: {}",
        metadata.full_name(),
        architecture.architecture
    );
    stamp_release_metadata(
        &package.manifest_path,
        architecture.architecture,
        settings.required_frameworks(),
    )?;

    let stubs = create_stubs(package, settings, collaborators).await?;

    let signed = match &collaborators.signer {
        Some(signer) => sign_tree(Arc::clone(signer), &package.root, settings.worker_count()).await?,
        None => {
            log::debug!("No signer configured, binaries are left unsigned");
            0
        }
    };

    if let Some(updater) = updater {
        let target = package.lib_dir.join(settings.updater_name());
        log::debug!("Adding updater as {}", target.display());
        copy_file(updater, &target, settings.retry()).await?;
    }

    let app_icon = resolve_app_icon(package, metadata, settings, collaborators).await?;
    copy_root_images(package, settings).await?;

    Ok(ContentReport {
        architecture,
        stubs,
        signed,
        app_icon,
    })
}

/// Top-level windowed executables that get a launcher stub.
///
/// The list is materialized before any stub exists, so stubs never get stubs.
pub fn stub_targets(
    package: &ValidatedPackage,
    updater_name: &str,
    collaborators: &Collaborators,
) -> Result<Vec<PathBuf>> {
    let mut targets = Vec::new();
    for entry in std::fs::read_dir(&package.lib_dir).fs_context("listing directory", &package.lib_dir)? {
        let path = entry.fs_context("listing directory", &package.lib_dir)?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let lower = name.to_ascii_lowercase();
        if !path.is_file()
            || !lower.ends_with(".exe")
            || lower == updater_name.to_ascii_lowercase()
            || lower.contains(&STUB_SUFFIX.to_ascii_lowercase())
        {
            continue;
        }
        if collaborators.inspector.is_windowed(&path)? {
            targets.push(path);
        }
    }
    targets.sort();
    Ok(targets)
}

/// `<stem>_ExecutionStub.exe` next to `exe`.
pub fn stub_path(exe: &Path) -> PathBuf {
    let stem = exe
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    exe.with_file_name(format!("{stem}{STUB_SUFFIX}.exe"))
}

async fn create_stubs(
    package: &ValidatedPackage,
    settings: &Settings,
    collaborators: &Collaborators,
) -> Result<Vec<PathBuf>> {
    let Some(template) = settings.stub_template() else {
        log::debug!("No stub template configured, skipping launcher stubs");
        return Ok(Vec::new());
    };
    let targets = stub_targets(package, settings.updater_name(), collaborators)?;
    if targets.is_empty() {
        return Ok(Vec::new());
    }

    let template = template.to_path_buf();
    let editor = collaborators.resource_editor.clone();
    let retry = settings.retry();
    let outcomes = run_bounded(targets, settings.worker_count(), move |exe| {
        create_stub(exe, &template, editor.as_deref(), retry)
    })
    .await?;

    let mut stubs = Vec::new();
    for (exe, outcome) in outcomes {
        match outcome {
            Ok(()) => stubs.push(stub_path(&exe)),
            Err(e) => log::warn!("Failed to create launcher stub for {}: {e}", exe.display()),
        }
    }
    Ok(stubs)
}

fn create_stub(
    exe: &Path,
    template: &Path,
    editor: Option<&dyn ResourceEditor>,
    retry: RetryPolicy,
) -> Result<()> {
    let stub = stub_path(exe);
    retry_io(retry, "writing launcher stub", &stub, || std::fs::copy(template, &stub))?;
    match editor {
        Some(editor) => editor.copy_resources(exe, &stub),
        None => {
            log::debug!("No resource editor, {} keeps template resources", stub.display());
            Ok(())
        }
    }
}

async fn resolve_app_icon(
    package: &ValidatedPackage,
    metadata: &PackageMetadata,
    settings: &Settings,
    collaborators: &Collaborators,
) -> Result<Option<PathBuf>> {
    let target = package.lib_dir.join(APP_ICON_NAME);

    if let Some(explicit) = settings.app_icon() {
        copy_file(explicit, &target, settings.retry()).await?;
        return Ok(Some(target));
    }
    if target.is_file() {
        log::debug!("Using bundled {}", target.display());
        return Ok(Some(target));
    }
    let Some(url) = metadata.icon_url.clone() else {
        return Ok(None);
    };

    let downloader = Arc::clone(&collaborators.downloader);
    let converter = Arc::clone(&collaborators.icon_converter);
    let destination = target.clone();
    let fetched = tokio::task::spawn_blocking(move || -> Result<()> {
        let bytes = downloader.download(&url)?;
        let icon = if is_ico_url(&url) {
            bytes
        } else {
            converter.convert(&bytes)?
        };
        write_atomic(&destination, &icon)
    })
    .await
    .map_err(|e| Error::GenericError(format!("icon task panicked: {e}")))?;

    match fetched {
        Ok(()) => Ok(Some(target)),
        Err(e) => {
            log::warn!("Could not fetch application icon for {}: {e}", metadata.full_name());
            Ok(None)
        }
    }
}

fn is_ico_url(url: &Url) -> bool {
    url.path().to_ascii_lowercase().ends_with(".ico")
}

async fn copy_root_images(package: &ValidatedPackage, settings: &Settings) -> Result<()> {
    if let Some(icon) = settings.setup_icon().or(settings.app_icon()) {
        copy_file(icon, &package.root.join(SETUP_ICON_NAME), settings.retry()).await?;
    }
    if let Some(splash) = settings.splash_image() {
        let name = match splash.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{SPLASH_IMAGE_STEM}.{ext}"),
            None => SPLASH_IMAGE_STEM.to_string(),
        };
        copy_file(splash, &package.root.join(name), settings.retry()).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::{
        collaborators::{BinaryInspector, Downloader, IconConverter, Signer},
        settings::{RuntimeCpu, SettingsBuilder},
    };
    use std::sync::Mutex;

    /// Files starting with "gui" are windowed; every image reports x64.
    struct FakeInspector;

    impl BinaryInspector for FakeInspector {
        fn machine(&self, _path: &Path) -> Result<Option<u16>> {
            Ok(Some(RuntimeCpu::MACHINE_AMD64))
        }
        fn is_windowed(&self, path: &Path) -> Result<bool> {
            Ok(std::fs::read(path)?.starts_with(b"gui"))
        }
        fn is_update_aware(&self, _path: &Path) -> Result<bool> {
            Ok(true)
        }
    }

    #[derive(Default)]
    struct RecordingSigner(Mutex<Vec<PathBuf>>);

    impl Signer for RecordingSigner {
        fn sign(&self, path: &Path) -> Result<()> {
            self.0.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    struct StaticDownloader(Option<Vec<u8>>);

    impl Downloader for StaticDownloader {
        fn download(&self, url: &Url) -> Result<Vec<u8>> {
            self.0
                .clone()
                .ok_or_else(|| Error::collaborator("test downloader", format!("{url} unreachable")))
        }
    }

    struct TaggingConverter;

    impl IconConverter for TaggingConverter {
        fn convert(&self, image: &[u8]) -> Result<Vec<u8>> {
            Ok([b"ico:".as_slice(), image].concat())
        }
    }

    fn collaborators(signer: Arc<RecordingSigner>, download: Option<&[u8]>) -> Collaborators {
        Collaborators {
            inspector: Arc::new(FakeInspector),
            signer: Some(signer),
            icon_converter: Arc::new(TaggingConverter),
            downloader: Arc::new(StaticDownloader(download.map(<[u8]>::to_vec))),
            resource_editor: None,
            delta_builder: None,
        }
    }

    const NUSPEC: &str = "<package><metadata><id>App</id><version>1.0.0</version>\
        <iconUrl>https://example.com/icon.png</iconUrl></metadata></package>";

    fn package(dir: &Path) -> (ValidatedPackage, PackageMetadata) {
        let lib = dir.join("lib").join("net6.0");
        std::fs::create_dir_all(&lib).unwrap();
        let manifest_path = dir.join("App.nuspec");
        std::fs::write(&manifest_path, NUSPEC).unwrap();
        std::fs::write(lib.join("App.exe"), "gui app").unwrap();
        std::fs::write(lib.join("Tool.exe"), "console").unwrap();
        std::fs::write(lib.join("Squirrel.exe"), "gui updater").unwrap();
        std::fs::write(lib.join("App.dll"), "library").unwrap();
        let metadata = PackageMetadata::parse(NUSPEC.as_bytes()).unwrap();
        (
            ValidatedPackage {
                root: dir.to_path_buf(),
                manifest_path,
                lib_dir: lib.clone(),
                aware_executables: vec![lib.join("App.exe")],
            },
            metadata,
        )
    }

    #[tokio::test]
    async fn processes_package_content() {
        let work = tempfile::tempdir().unwrap();
        let inputs = tempfile::tempdir().unwrap();
        let stub = inputs.path().join("stub.exe");
        let updater = inputs.path().join("Update.exe");
        let splash = inputs.path().join("splash.gif");
        std::fs::write(&stub, "stub").unwrap();
        std::fs::write(&updater, "updater").unwrap();
        std::fs::write(&splash, "gif").unwrap();

        let (validated, metadata) = package(work.path());
        let settings = SettingsBuilder::new()
            .release_dir(work.path())
            .stub_template(&stub)
            .splash_image(&splash)
            .required_frameworks(vec!["net6".into()])
            .worker_count(2)
            .build()
            .unwrap();
        let signer = Arc::new(RecordingSigner::default());
        let collab = collaborators(signer.clone(), Some(b"png"));

        let report = process_content(&validated, &metadata, &settings, &collab, Some(&updater))
            .await
            .unwrap();

        assert_eq!(report.architecture.architecture, RuntimeCpu::X64);
        let stamped = std::fs::read_to_string(&validated.manifest_path).unwrap();
        assert!(stamped.contains("<machineArchitecture>x64</machineArchitecture>"));
        assert!(stamped.contains("<runtimeDependencies>net6</runtimeDependencies>"));

        assert_eq!(report.stubs, vec![validated.lib_dir.join("App_ExecutionStub.exe")]);
        assert!(!validated.lib_dir.join("Squirrel_ExecutionStub.exe").exists());
        assert!(!validated.lib_dir.join("Tool_ExecutionStub.exe").exists());

        // App.exe, App.dll, Squirrel.exe, Tool.exe and the stub; the updater is copied afterwards.
        assert_eq!(report.signed, 5);
        assert_eq!(signer.0.lock().unwrap().len(), 5);
        assert_eq!(
            std::fs::read(validated.lib_dir.join("Squirrel.exe")).unwrap(),
            b"updater"
        );

        let icon = report.app_icon.unwrap();
        assert_eq!(std::fs::read(icon).unwrap(), b"ico:png");
        assert!(work.path().join("splashimage.gif").is_file());
    }

    #[tokio::test]
    async fn icon_download_failure_is_not_fatal() {
        let work = tempfile::tempdir().unwrap();
        let (validated, metadata) = package(work.path());
        let settings = SettingsBuilder::new()
            .release_dir(work.path())
            .build()
            .unwrap();
        let collab = collaborators(Arc::new(RecordingSigner::default()), None);

        let report = process_content(&validated, &metadata, &settings, &collab, None)
            .await
            .unwrap();
        assert!(report.app_icon.is_none());
        assert!(report.stubs.is_empty());
    }

    #[tokio::test]
    async fn bundled_icon_wins_over_url() {
        let work = tempfile::tempdir().unwrap();
        let (validated, metadata) = package(work.path());
        std::fs::write(validated.lib_dir.join(APP_ICON_NAME), "bundled").unwrap();
        let settings = SettingsBuilder::new()
            .release_dir(work.path())
            .build()
            .unwrap();
        let collab = collaborators(Arc::new(RecordingSigner::default()), Some(b"png"));

        let report = process_content(&validated, &metadata, &settings, &collab, None)
            .await
            .unwrap();
        assert_eq!(std::fs::read(report.app_icon.unwrap()).unwrap(), b"bundled");
    }

    #[test]
    fn stub_names() {
        assert_eq!(
            stub_path(Path::new("lib/net6.0/App.exe")),
            PathBuf::from("lib/net6.0/App_ExecutionStub.exe")
        );
        assert!(is_ico_url(&Url::parse("https://x.test/a/Icon.ICO").unwrap()));
        assert!(!is_ico_url(&Url::parse("https://x.test/a/icon.png?x=.ico").unwrap()));
    }
}
