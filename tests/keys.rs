use assert_matches::assert_matches;

use cuffbase::domain::ExperimentId;
use cuffbase::error::CuffError;
use cuffbase::keys::{split_key, synth_key, synth_replicate_key, try_synth_key};

#[test]
fn keys_are_deterministic() {
    let exp = ExperimentId::new(12);
    assert_eq!(synth_key("XLOC_000001", exp), synth_key("XLOC_000001", exp));
    assert_eq!(synth_key("XLOC_000001", exp), "XLOC_000001-exp-12");
}

#[test]
fn keys_separate_experiments_and_ids() {
    let a = ExperimentId::new(1);
    let b = ExperimentId::new(2);
    assert_ne!(synth_key("TSS10", a), synth_key("TSS10", b));
    assert_ne!(synth_key("TSS10", a), synth_key("TSS11", a));
    assert_ne!(synth_replicate_key("ctrl", 0, a), synth_replicate_key("ctrl", 1, a));
}

#[test]
fn keys_split_back_into_parts() {
    let exp = ExperimentId::new(5);
    let key = synth_replicate_key("heat_shock", 2, exp);
    assert_eq!(key, "heat_shock_2-exp-5");
    assert_eq!(split_key(&key), Some(("heat_shock_2", exp)));
    assert_eq!(split_key("no separator"), None);
}

#[test]
fn unusable_ids_are_rejected() {
    let exp = ExperimentId::new(1);
    assert_matches!(try_synth_key("-", exp), Err(CuffError::InvalidIdentifier(_)));
    assert_matches!(try_synth_key("  ", exp), Err(CuffError::InvalidIdentifier(_)));
    assert_matches!(
        try_synth_key("a-exp-3", exp),
        Err(CuffError::InvalidIdentifier(_))
    );
    assert_eq!(try_synth_key(" P1 ", exp).unwrap(), "P1-exp-1");
}
