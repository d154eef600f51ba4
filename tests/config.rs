use assert_matches::assert_matches;

use cuffbase::config::ConfigLoader;
use cuffbase::domain::TrackKind;
use cuffbase::error::CuffError;

#[test]
fn resolve_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cuffbase.json");
    std::fs::write(
        &path,
        r#"{
            "database": "/tmp/worms.sqlite",
            "species": "D.melanogaster",
            "exclude": ["cds", "isoforms"],
            "genome_build": "dm6",
            "batch_size": 500
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.database.as_deref().map(|p| p.as_str()), Some("/tmp/worms.sqlite"));
    assert_eq!(resolved.species, "D.melanogaster");
    assert_eq!(resolved.library, "RNA-Seq");
    assert_eq!(resolved.exclude, vec![TrackKind::Cds, TrackKind::Isoform]);
    assert_eq!(resolved.genome_build.as_deref(), Some("dm6"));
    assert_eq!(resolved.batch_size, 500);
}

#[test]
fn explicit_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");
    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(CuffError::ConfigRead(_))
    );
}

#[test]
fn invalid_json_and_batch_size_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let broken = dir.path().join("broken.json");
    std::fs::write(&broken, "{ not json").unwrap();
    assert_matches!(
        ConfigLoader::resolve(broken.to_str()),
        Err(CuffError::ConfigParse(_))
    );

    let zero = dir.path().join("zero.json");
    std::fs::write(&zero, r#"{"batch_size": 0}"#).unwrap();
    assert_matches!(
        ConfigLoader::resolve(zero.to_str()),
        Err(CuffError::ConfigParse(_))
    );
}
