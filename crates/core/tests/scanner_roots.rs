//! Kept in its own test binary: it changes the process working directory.

use rndsnd_core::catalog::{CatalogStore, SqliteCatalog};
use rndsnd_core::classifier::TaggingSettings;
use rndsnd_core::codec::{AudioCodec, SymphoniaCodec};
use rndsnd_core::scanner::{ScanOptions, Scanner};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const RATE: u32 = 8_000;

fn write_tone(path: &Path, seconds: f32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..(seconds * RATE as f32) as usize {
        let s = (i as f32 * 330.0 * std::f32::consts::TAU / RATE as f32).sin() * 0.3;
        writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

#[tokio::test]
async fn relative_and_absolute_roots_share_catalog_keys() {
    let temp = tempfile::tempdir().unwrap();
    let lib = temp.path().join("lib");
    fs::create_dir_all(&lib).unwrap();
    write_tone(&lib.join("a.wav"), 1.0);

    let pool = storage::connect(&temp.path().join("catalog.db").to_string_lossy())
        .await
        .unwrap();
    storage::migrate(&pool).await.unwrap();
    let catalog = Arc::new(SqliteCatalog::new(pool));
    let codec: Arc<dyn AudioCodec> = Arc::new(SymphoniaCodec::new(RATE));
    let scanner = Scanner::new(
        catalog.clone(),
        codec,
        None,
        ScanOptions {
            excludes: vec![],
            prune_missing: false,
            tagging: TaggingSettings::default(),
        },
    );
    let cancel = CancellationToken::new();

    std::env::set_current_dir(temp.path()).unwrap();
    let relative = scanner.scan(Path::new("lib"), &cancel).await.unwrap();
    assert_eq!(relative.files_newly_indexed, 1);

    let cwd = std::env::current_dir().unwrap();
    let absolute = scanner.scan(&cwd.join("lib"), &cancel).await.unwrap();
    assert_eq!(absolute.files_newly_indexed, 0);
    assert_eq!(absolute.files_unchanged, 1);

    let paths = catalog.all_paths().await.unwrap();
    assert_eq!(paths, vec![cwd.join("lib").join("a.wav").to_string_lossy().into_owned()]);
    assert!(Path::new(&paths[0]).is_absolute());
}
