use assert_matches::assert_matches;

use cuffbase::domain::{ExperimentId, TrackKind};
use cuffbase::error::CuffError;
use cuffbase::keys::synth_key;
use cuffbase::query::{Filter, Lookup, Ordering, Query};
use cuffbase::record::Record;
use cuffbase::schema::Entity;
use cuffbase::store::{NewExperiment, Store};

const GENES: [(&str, &str, f64, &str); 4] = [
    ("XLOC_001", "unc-54", 12.5, "OK"),
    ("XLOC_002", "let-7", 0.0, "LOWDATA"),
    ("XLOC_003", "lin-4", 3.25, "OK"),
    ("XLOC_004", "UNC-22", 40.0, "HIDATA"),
];

/// Two experiments with the same genes; only the first has FPKM rows.
fn seeded_store() -> (Store, ExperimentId, ExperimentId) {
    let mut store = Store::open_in_memory().unwrap();
    let writer = store.writer().unwrap();
    let mut ids = Vec::new();
    for title in ["first", "second"] {
        let id = writer
            .create_experiment(&NewExperiment {
                title: title.to_string(),
                species: "C.elegans".to_string(),
                library: "RNA-Seq".to_string(),
                description: None,
                run_date: None,
                analysis_date: None,
            })
            .unwrap();
        let tracks: Vec<Record> = GENES
            .iter()
            .map(|(gene, name, _, _)| {
                Record::new()
                    .with("track_pk", synth_key(gene, id))
                    .with("gene_id", *gene)
                    .with("gene_short_name", *name)
            })
            .collect();
        writer
            .bulk_insert(Entity::Track(TrackKind::Gene), id, &tracks)
            .unwrap();
        writer.activate(id).unwrap();
        ids.push(id);
    }

    let first = ids[0];
    let sample = writer.register_sample(first, "ctrl").unwrap();
    let data: Vec<Record> = GENES
        .iter()
        .map(|(gene, _, fpkm, status)| {
            Record::new()
                .with("gene_pk", synth_key(gene, first))
                .with("sample_pk", sample.as_str())
                .with("fpkm", *fpkm)
                .with("status", *status)
        })
        .collect();
    writer
        .bulk_insert(Entity::Data(TrackKind::Gene), first, &data)
        .unwrap();
    writer.commit().unwrap();
    (store, ids[0], ids[1])
}

fn gene_ids(rows: &[Record]) -> Vec<&str> {
    rows.iter().filter_map(|row| row.get_str("gene_id")).collect()
}

#[test]
fn queries_are_scoped_to_one_experiment() {
    let (store, first, second) = seeded_store();
    let query = Query::new(Entity::Track(TrackKind::Gene), second);
    let rows = store.query(&query).unwrap();
    assert_eq!(rows.len(), 4);
    assert!(rows.iter().all(|row| row.get_i64("experiment_id") == Some(second.get())));

    let data = store
        .query(&Query::new(Entity::Data(TrackKind::Gene), second))
        .unwrap();
    assert!(data.is_empty());
    assert_eq!(
        store
            .query(&Query::new(Entity::Data(TrackKind::Gene), first))
            .unwrap()
            .len(),
        4
    );
}

#[test]
fn text_lookups() {
    let (store, first, _) = seeded_store();
    let run = |filter: &str| {
        let query = Query::new(Entity::Track(TrackKind::Gene), first)
            .filter(filter.parse::<Filter>().unwrap())
            .order_by("gene_id".parse::<Ordering>().unwrap());
        store.query(&query).unwrap()
    };

    assert_eq!(gene_ids(&run("gene_short_name=unc")), vec!["XLOC_001", "XLOC_004"]);
    assert_eq!(gene_ids(&run("gene_short_name__iexact=unc-22")), vec!["XLOC_004"]);
    assert_eq!(gene_ids(&run("gene_short_name__exact=unc-22")), Vec::<&str>::new());
    assert_eq!(gene_ids(&run("gene_id__istartswith=xloc_00")).len(), 4);
    assert_eq!(gene_ids(&run("gene_short_name__iendswith=-4")), vec!["XLOC_003"]);
    assert_eq!(gene_ids(&run("gene_short_name__iregex=^L")), vec!["XLOC_002", "XLOC_003"]);
    assert_eq!(
        gene_ids(&run("gene_short_name__iregex=^UNC-[0-9]+$")),
        vec!["XLOC_001", "XLOC_004"]
    );
    assert_eq!(gene_ids(&run("gene_id__in=XLOC_002,XLOC_004")), vec!["XLOC_002", "XLOC_004"]);
    assert_eq!(gene_ids(&run("locus__isnull=true")).len(), 4);
}

#[test]
fn numeric_lookups_and_ordering() {
    let (store, first, _) = seeded_store();
    let base = || Query::new(Entity::Data(TrackKind::Gene), first);

    let expressed = store
        .query(
            &base()
                .filter(Filter::new("fpkm", Lookup::Gt, "1"))
                .order_by("-fpkm".parse().unwrap()),
        )
        .unwrap();
    let fpkm: Vec<f64> = expressed.iter().filter_map(|row| row.get_f64("fpkm")).collect();
    assert_eq!(fpkm, vec![40.0, 12.5, 3.25]);

    let ranged = store
        .query(&base().filter("fpkm__range=3,13".parse().unwrap()))
        .unwrap();
    assert_eq!(ranged.len(), 2);

    let page = store
        .query(
            &base()
                .order_by("fpkm".parse().unwrap())
                .limit(2)
                .offset(1),
        )
        .unwrap();
    let fpkm: Vec<f64> = page.iter().filter_map(|row| row.get_f64("fpkm")).collect();
    assert_eq!(fpkm, vec![3.25, 12.5]);

    let skipped = store
        .query(&base().order_by("fpkm".parse().unwrap()).offset(3))
        .unwrap();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].get_str("status"), Some("HIDATA"));
}

#[test]
fn invalid_queries_are_rejected() {
    let (store, first, _) = seeded_store();
    let unknown = Query::new(Entity::Track(TrackKind::Gene), first)
        .filter(Filter::new("fpkm", Lookup::Exact, "1"));
    assert_matches!(store.query(&unknown), Err(CuffError::UnknownField { .. }));

    let bad_number = Query::new(Entity::Data(TrackKind::Gene), first)
        .filter(Filter::new("fpkm", Lookup::Lt, "high"));
    assert_matches!(store.query(&bad_number), Err(CuffError::InvalidLookup(_)));

    let bad_regex = Query::new(Entity::Track(TrackKind::Gene), first)
        .filter(Filter::new("gene_id", Lookup::IRegex, "(unclosed"));
    assert_matches!(store.query(&bad_regex), Err(CuffError::InvalidLookup(_)));

    assert_matches!(
        "fpkm__near=1".parse::<Filter>(),
        Err(CuffError::InvalidLookup(_))
    );
}
