use crate::error::{Error, PostProcessError};
use crate::extraction::*;
use std::path::Path;
use tempfile::TempDir;

/// Create a valid ZIP archive containing the given files
fn create_zip_archive(archive_path: &Path, files: &[(&str, &[u8])]) {
    let file = std::fs::File::create(archive_path).unwrap();
    let mut writer = ::zip::ZipWriter::new(file);
    let options =
        ::zip::write::FileOptions::default().compression_method(::zip::CompressionMethod::Deflated);
    for (name, content) in files {
        writer.start_file(*name, options).unwrap();
        std::io::Write::write_all(&mut writer, content).unwrap();
    }
    writer.finish().unwrap();
}

#[test]
fn extracts_all_entries_with_nested_directories() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("game.zip");
    create_zip_archive(
        &archive,
        &[
            ("game.sfc", b"rom bytes"),
            ("docs/readme.txt", b"manual"),
        ],
    );

    let dest = temp.path().join("out");
    let files = ZipExtractor::extract(&archive, &dest).unwrap();

    assert_eq!(files.len(), 2);
    assert_eq!(std::fs::read(dest.join("game.sfc")).unwrap(), b"rom bytes");
    assert_eq!(std::fs::read(dest.join("docs/readme.txt")).unwrap(), b"manual");
    // Archive is not removed by the extractor itself
    assert!(archive.exists());
}

#[test]
fn directory_entries_are_created_but_not_listed() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("dirs.zip");
    {
        let file = std::fs::File::create(&archive).unwrap();
        let mut writer = ::zip::ZipWriter::new(file);
        writer
            .add_directory("saves/", ::zip::write::FileOptions::default())
            .unwrap();
        writer.finish().unwrap();
    }

    let files = ZipExtractor::extract(&archive, temp.path()).unwrap();
    assert!(files.is_empty());
    assert!(temp.path().join("saves").is_dir());
}

#[test]
fn corrupt_archive_reports_extraction_failure() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("broken.zip");
    std::fs::write(&archive, b"this is not a zip file").unwrap();

    let result = ZipExtractor::extract(&archive, temp.path());
    match result {
        Err(Error::PostProcess(PostProcessError::ExtractionFailed { archive: a, reason })) => {
            assert_eq!(a, archive);
            assert!(reason.contains("failed to read ZIP archive"));
        }
        other => panic!("expected ExtractionFailed, got {:?}", other),
    }
}

#[test]
fn missing_archive_is_an_io_error() {
    let temp = TempDir::new().unwrap();
    let result = ZipExtractor::extract(&temp.path().join("absent.zip"), temp.path());
    assert!(matches!(result, Err(Error::Io(_))));
}

#[tokio::test]
async fn extract_archive_runs_on_blocking_pool() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("async.zip");
    create_zip_archive(&archive, &[("a.bin", &[7u8; 4096])]);

    let files = extract_archive(&archive, temp.path()).await.unwrap();
    assert_eq!(files, vec![temp.path().join("a.bin")]);
    assert_eq!(std::fs::read(temp.path().join("a.bin")).unwrap().len(), 4096);
}
