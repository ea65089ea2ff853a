use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use kira_bids::entities::{self, ConverterName, EntitySet};
use kira_bids::error::BidsError;

#[test]
fn parse_then_build_restores_path() {
    let path = Utf8Path::new("/ds/sub-01/ses-2/func/sub-01_ses-2_task-nback_run-3_echo-1_bold.nii.gz");
    let (set, directory) = entities::parse(path);
    assert_eq!(directory, Utf8PathBuf::from("/ds/sub-01/ses-2/func"));
    assert_eq!(set.get("task"), Some("nback"));
    assert_eq!(set.get("echo"), Some("1"));
    assert_eq!(set.suffix(), Some("bold"));
    assert_eq!(set.extension(), ".nii.gz");
    assert_eq!(entities::build(&set, &directory), path.to_path_buf());
}

#[test]
fn build_orders_entities_canonically() {
    let set = EntitySet::from_stub("acq-mb8_task-rest_bold")
        .with("part", "mag")
        .with("run", "2")
        .with("sub", "01")
        .with_extension(".json");
    assert_eq!(
        entities::build(&set, Utf8Path::new("func")),
        Utf8PathBuf::from("func/sub-01_task-rest_acq-mb8_run-2_part-mag_bold.json")
    );
}

#[test]
fn stub_without_entities_is_a_suffix() {
    let set = EntitySet::from_stub("T1w");
    assert!(set.is_empty());
    assert_eq!(set.suffix(), Some("T1w"));
    assert_eq!(set.clone().with("sub", "01").file_name(), "sub-01_T1w");
}

#[test]
fn removed_keys_are_not_written() {
    let mut set = EntitySet::from_stub("sub-01_task-rest_run-1_echo-2_bold");
    assert_eq!(set.remove("echo").as_deref(), Some("2"));
    assert_eq!(set.remove("echo"), None);
    assert_eq!(set.stem(), "sub-01_task-rest_run-1_bold");
}

#[test]
fn converter_name_fields() {
    let name = ConverterName::parse(Utf8Path::new("/work/sub-01/Doe--BOLD_REST--EP--s005.nii.gz")).unwrap();
    assert_eq!(name.subject, "Doe");
    assert_eq!(name.description, "BOLD_REST");
    assert_eq!(name.sequence, "EP");
    assert_eq!(name.series, 5);
    assert_eq!(name.series_prefix, "s");
    assert_eq!(name.suffix, "");
    assert_eq!(name.echo_number(), None);
    assert!(!name.is_phase());
    assert_eq!(
        name.sibling(6, "ph", ".json"),
        Utf8PathBuf::from("/work/sub-01/Doe--BOLD_REST--EP--s6_ph.json")
    );
}

#[test]
fn converter_name_rejects_other_layouts() {
    let err = ConverterName::parse(Utf8Path::new("sub-01_T1w.nii.gz")).unwrap_err();
    assert_matches!(err, BidsError::InvalidConverterName(_));
    let err = ConverterName::parse(Utf8Path::new("Doe--T1--GR_IR--abc.nii")).unwrap_err();
    assert_matches!(err, BidsError::InvalidConverterName(_));
}

#[test]
fn sidecar_path_for_image() {
    assert_eq!(
        entities::image_to_sidecar(Utf8Path::new("/w/Doe--T1--GR_IR--3.nii.gz")),
        Utf8PathBuf::from("/w/Doe--T1--GR_IR--3.json")
    );
}

#[test]
fn unknown_keys_alone_stay_in_the_suffix() {
    let (set, _) = entities::parse(Utf8Path::new("ce-gad_T1w.nii.gz"));
    assert!(set.is_empty());
    assert_eq!(set.suffix(), Some("ce-gad_T1w"));
    assert_eq!(set.extension(), ".nii.gz");

    let stub = EntitySet::from_stub("ce-gad_T1w").with("sub", "01");
    assert_eq!(stub.file_name(), "sub-01_ce-gad_T1w");
    assert_ne!(
        EntitySet::from_stub("ce-gad_T1w").stem(),
        EntitySet::from_stub("ce-pre_T1w").stem()
    );
}
