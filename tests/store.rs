use assert_matches::assert_matches;

use cuffbase::domain::{ExperimentId, TrackKind};
use cuffbase::error::CuffError;
use cuffbase::keys::synth_key;
use cuffbase::record::Record;
use cuffbase::schema::Entity;
use cuffbase::store::{NewExperiment, Store};

fn new_experiment(title: &str) -> NewExperiment {
    NewExperiment {
        title: title.to_string(),
        species: "C.elegans".to_string(),
        library: "RNA-Seq".to_string(),
        description: Some("heat shock time course".to_string()),
        run_date: None,
        analysis_date: None,
    }
}

#[test]
fn sample_indices_are_per_experiment() {
    let mut store = Store::open_in_memory().unwrap();
    let writer = store.writer().unwrap();
    let first = writer.create_experiment(&new_experiment("first")).unwrap();
    let second = writer.create_experiment(&new_experiment("second")).unwrap();
    for name in ["ctrl", "heat", "recovery"] {
        writer.register_sample(first, name).unwrap();
    }
    assert_eq!(
        writer.register_sample(first, "heat").unwrap(),
        synth_key("heat", first)
    );
    writer.register_sample(second, "ctrl").unwrap();
    writer.activate(first).unwrap();
    writer.activate(second).unwrap();
    writer.commit().unwrap();

    let indices: Vec<(String, i64)> = store
        .samples(first)
        .unwrap()
        .into_iter()
        .map(|sample| (sample.name, sample.index))
        .collect();
    assert_eq!(
        indices,
        vec![
            ("ctrl".to_string(), 1),
            ("heat".to_string(), 2),
            ("recovery".to_string(), 3),
        ]
    );
    let other = store.samples(second).unwrap();
    assert_eq!(other.len(), 1);
    assert_eq!(other[0].index, 1);
    assert_eq!(other[0].key, synth_key("ctrl", second));
}

#[test]
fn duplicate_natural_id_is_integrity_error() {
    let mut store = Store::open_in_memory().unwrap();
    let writer = store.writer().unwrap();
    let id = writer.create_experiment(&new_experiment("dupes")).unwrap();
    let gene = Record::new()
        .with("track_pk", synth_key("XLOC_001", id))
        .with("gene_id", "XLOC_001");
    assert_matches!(
        writer.bulk_insert(Entity::Track(TrackKind::Gene), id, &[gene.clone(), gene]),
        Err(CuffError::Integrity { .. })
    );
}

#[test]
fn delete_cascades_to_owned_rows() {
    let mut store = Store::open_in_memory().unwrap();
    let writer = store.writer().unwrap();
    let id = writer.create_experiment(&new_experiment("cascade")).unwrap();
    writer.insert_run_info(id, "version", "2.2.1").unwrap();
    let sample = writer.register_sample(id, "ctrl").unwrap();
    let gene = synth_key("XLOC_001", id);
    writer
        .bulk_insert(
            Entity::Track(TrackKind::Gene),
            id,
            &[Record::new()
                .with("track_pk", gene.as_str())
                .with("gene_id", "XLOC_001")],
        )
        .unwrap();
    writer
        .bulk_insert(
            Entity::Data(TrackKind::Gene),
            id,
            &[Record::new()
                .with("gene_pk", gene.as_str())
                .with("sample_pk", sample.as_str())
                .with("fpkm", 3.5)],
        )
        .unwrap();
    writer.activate(id).unwrap();
    writer.commit().unwrap();

    assert_eq!(store.experiments().unwrap().len(), 1);
    assert_eq!(store.count(Entity::Data(TrackKind::Gene), id).unwrap(), 1);

    store.delete_experiment(id).unwrap();
    assert!(store.experiments().unwrap().is_empty());
    for entity in [
        Entity::RunInfo,
        Entity::Sample,
        Entity::Track(TrackKind::Gene),
        Entity::Data(TrackKind::Gene),
    ] {
        assert_eq!(store.count(entity, id).unwrap(), 0);
    }
}

#[test]
fn missing_experiment_is_reported() {
    let mut store = Store::open_in_memory().unwrap();
    assert_matches!(
        store.delete_experiment(ExperimentId::new(99)),
        Err(CuffError::ExperimentNotFound(99))
    );
    assert_matches!(
        store.experiment(ExperimentId::new(99)),
        Err(CuffError::ExperimentNotFound(99))
    );
}

#[test]
fn database_file_is_created() {
    let dir = tempfile::tempdir().unwrap();
    let path = camino::Utf8PathBuf::from_path_buf(dir.path().join("nested").join("cuffbase.sqlite"))
        .unwrap();
    let store = Store::open(&path).unwrap();
    assert_eq!(store.path(), Some(path.as_path()));
    assert!(path.exists());
}
