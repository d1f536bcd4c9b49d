//! Bounded worker pool for per-file work, and binary signing on top of it.
//!
//! Signing and stub creation touch disjoint files, so they run concurrently
//! on blocking threads with at most `workers` in flight.

use crate::{
    bail,
    bundler::{Error, Result, collaborators::Signer},
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{sync::Semaphore, task::JoinSet};

/// Extensions treated as PE images.
pub const PE_EXTENSIONS: [&str; 3] = ["exe", "dll", "node"];

/// Outcome of one file processed by [`run_bounded`].
pub type FileOutcome = (PathBuf, Result<()>);

/// Runs `op` on every path with at most `workers` running at once.
///
/// Outcomes come back sorted by path regardless of completion order.
pub async fn run_bounded<F>(paths: Vec<PathBuf>, workers: usize, op: F) -> Result<Vec<FileOutcome>>
where
    F: Fn(&Path) -> Result<()> + Send + Sync + 'static,
{
    let op = Arc::new(op);
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut set = JoinSet::new();

    for path in paths {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| Error::GenericError(format!("worker pool closed: {e}")))?;
        let op = Arc::clone(&op);
        set.spawn_blocking(move || {
            let _permit = permit;
            let outcome = op(&path);
            (path, outcome)
        });
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => bail!("worker task panicked: {e}"),
        }
    }
    outcomes.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(outcomes)
}

/// Whether a file name looks like a PE image.
pub fn is_pe_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| PE_EXTENSIONS.iter().any(|pe| ext.eq_ignore_ascii_case(pe)))
}

/// PE images below `root`, sorted.
pub fn collect_pe_images(root: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in walkdir::WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if entry.file_type().is_file() && is_pe_image(entry.path()) {
            images.push(entry.into_path());
        }
    }
    images.sort();
    Ok(images)
}

/// Signs every PE image below `root`.
///
/// All files are attempted; the first failure in path order is returned.
pub async fn sign_tree(signer: Arc<dyn Signer>, root: &Path, workers: usize) -> Result<usize> {
    let images = collect_pe_images(root)?;
    let count = images.len();
    if count == 0 {
        return Ok(0);
    }
    log::info!("Signing {count} binaries with {workers} workers");

    let outcomes = run_bounded(images, workers, move |path| signer.sign(path)).await?;
    let mut first_error = None;
    for (path, outcome) in outcomes {
        if let Err(e) = outcome {
            log::error!("Signing {} failed: {e}", path.display());
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(count),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_exceeds_worker_bound() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let paths: Vec<PathBuf> = (0..12).map(|i| PathBuf::from(format!("f{i:02}.dll"))).collect();

        let (r, p) = (running.clone(), peak.clone());
        let outcomes = run_bounded(paths, 3, move |_| {
            let now = r.fetch_add(1, Ordering::SeqCst) + 1;
            p.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            r.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(outcomes.len(), 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(outcomes[0].0, PathBuf::from("f00.dll"));
    }

    #[derive(Default)]
    struct RecordingSigner {
        signed: Mutex<Vec<PathBuf>>,
    }

    impl Signer for RecordingSigner {
        fn sign(&self, path: &Path) -> Result<()> {
            self.signed.lock().unwrap().push(path.to_path_buf());
            if path.ends_with("bad.dll") {
                return Err(Error::collaborator("test signer", "refused"));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn signs_only_pe_images() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("lib").join("net6.0");
        std::fs::create_dir_all(&lib).unwrap();
        for name in ["App.exe", "App.dll", "addon.NODE", "readme.txt", "App.pdb"] {
            std::fs::write(lib.join(name), "x").unwrap();
        }
        let signer = Arc::new(RecordingSigner::default());
        let count = sign_tree(signer.clone(), dir.path(), 2).await.unwrap();
        assert_eq!(count, 3);
        assert_eq!(signer.signed.lock().unwrap().len(), 3);

        std::fs::write(lib.join("bad.dll"), "x").unwrap();
        let err = sign_tree(signer, dir.path(), 2).await.unwrap_err();
        assert!(matches!(err, Error::Collaborator { .. }));
    }
}
