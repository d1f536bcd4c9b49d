//! Fixture helpers shared by the integration tests.

#![allow(dead_code)]

use std::{
    io::Write,
    path::{Path, PathBuf},
};
use zip::{ZipWriter, write::SimpleFileOptions};

/// Bytes that make the default inspector treat an executable as update-aware.
pub const AWARE_EXE: &[u8] = b"MZ fake image <assembly><SquirrelAwareVersion>1</SquirrelAwareVersion></assembly>";

pub fn nuspec(id: &str, version: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?>\n<package><metadata><id>{id}</id><version>{version}</version>\
         <authors>Test Author</authors><description>fixture</description></metadata></package>"
    )
}

/// Writes `{dir}/{id}.{version}.nupkg` holding a manifest plus `files`.
pub fn write_package(dir: &Path, id: &str, version: &str, files: &[(&str, &[u8])]) -> PathBuf {
    let path = dir.join(format!("{id}.{version}.nupkg"));
    let mut zip = ZipWriter::new(std::fs::File::create(&path).unwrap());
    let options = SimpleFileOptions::default();

    zip.start_file(format!("{id}.nuspec"), options).unwrap();
    zip.write_all(nuspec(id, version).as_bytes()).unwrap();
    zip.start_file("[Content_Types].xml", options).unwrap();
    zip.write_all(b"<Types/>").unwrap();
    for (name, data) in files {
        zip.start_file(*name, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
    path
}

/// A releasable package with one update-aware executable.
pub fn aware_package(dir: &Path, id: &str, version: &str) -> PathBuf {
    let exe = format!("lib/net6.0/{id}.exe");
    write_package(
        dir,
        id,
        version,
        &[
            (exe.as_str(), AWARE_EXE),
            ("lib/net6.0/Library.dll", b"library".as_slice()),
        ],
    )
}
