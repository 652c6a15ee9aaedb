use std::env::consts::{DLL_EXTENSION, DLL_PREFIX};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Build `fixtures/teste` once per test run and return the path of the library
pub fn fixture_library() -> &'static Path {
    static LIBRARY: OnceLock<PathBuf> = OnceLock::new();

    LIBRARY.get_or_init(|| {
        let manifest = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("fixtures")
            .join("teste")
            .join("Cargo.toml");
        let target_dir = Path::new(env!("CARGO_TARGET_TMPDIR")).join("fixtures");

        let status = Command::new(env!("CARGO"))
            .args(["build", "--quiet", "--offline", "--manifest-path"])
            .arg(&manifest)
            .arg("--target-dir")
            .arg(&target_dir)
            .status()
            .expect("failed to run cargo");
        assert!(status.success(), "building the fixture library failed");

        target_dir.join("debug").join(format!(
            "{}archload_fixture_teste.{}",
            DLL_PREFIX, DLL_EXTENSION
        ))
    })
}

/// File name the fixture library gets inside archives
pub fn library_entry(dir: &str) -> String {
    let name = format!("libteste.{}", DLL_EXTENSION);
    if dir.is_empty() {
        name
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Write a zip archive holding the fixture library under `library_dir`,
/// plus `servico.txt` when a descriptor is given
pub fn write_archive(
    dir: &Path,
    name: &str,
    library_dir: &str,
    descriptor: Option<&str>,
) -> PathBuf {
    let library = fs::read(fixture_library()).expect("fixture library missing");

    let path = dir.join(name);
    let mut zip = ZipWriter::new(File::create(&path).unwrap());
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    if let Some(descriptor) = descriptor {
        zip.start_file("servico.txt", options).unwrap();
        zip.write_all(descriptor.as_bytes()).unwrap();
    }

    zip.start_file(library_entry(library_dir), options).unwrap();
    zip.write_all(&library).unwrap();

    zip.finish().unwrap();
    path
}
