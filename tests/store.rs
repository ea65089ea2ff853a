use camino::Utf8PathBuf;

use kira_bids::fs_util::WriteAction;
use kira_bids::store::{DatasetStore, PARTICIPANTS_HEADER};

fn store(dir: &tempfile::TempDir) -> DatasetStore {
    DatasetStore::new(Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap())
}

#[test]
fn layout_paths() {
    let store = DatasetStore::new("/data/study");
    assert!(store.translator_path().ends_with("code/Protocol_Translator.json"));
    assert!(store.dicom_dir("01", Some("pre")).ends_with("sourcedata/01/pre"));
    assert!(store.conversion_dir("01", None).ends_with("work/sub-01"));
    assert!(store.subject_dir("01").ends_with("sub-01"));
}

#[test]
fn layout_templates_are_preserved() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    let written = store.ensure_layout(false).unwrap();
    assert!(written.iter().all(|(_, action)| *action == WriteAction::Created));
    assert!(store.work_dir().is_dir());
    assert!(store.derivatives_dir().is_dir());
    assert_eq!(
        std::fs::read_to_string(store.root().join(".bidsignore")).unwrap(),
        "work/\n"
    );

    std::fs::write(store.root().join("README"), "curated").unwrap();
    let written = store.ensure_layout(false).unwrap();
    assert!(written.iter().all(|(_, action)| *action == WriteAction::Preserved));
    assert_eq!(std::fs::read_to_string(store.root().join("README")).unwrap(), "curated");

    let description: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(store.root().join("dataset_description.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(description["BIDSVersion"], "1.2");
}

#[test]
fn participants_are_appended_once() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    assert!(store.add_participant_record("01", Some("034Y"), Some("F")).unwrap());
    assert!(store.add_participant_record("02", None, None).unwrap());
    assert!(!store.add_participant_record("01", Some("035Y"), Some("F")).unwrap());

    let content = std::fs::read_to_string(store.participants_path()).unwrap();
    assert_eq!(
        content,
        format!("{PARTICIPANTS_HEADER}sub-01\t34\tF\tcontrol\nsub-02\tN/A\tN/A\tcontrol\n")
    );
}

#[test]
fn sessions_are_listed_from_sourcedata() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    std::fs::create_dir_all(store.dicom_dir("01", Some("2"))).unwrap();
    std::fs::create_dir_all(store.dicom_dir("01", Some("1"))).unwrap();
    std::fs::create_dir_all(store.dicom_dir("02", None)).unwrap();
    assert_eq!(store.source_subjects().unwrap(), vec!["01", "02"]);
    assert_eq!(store.source_sessions("01").unwrap(), vec!["1", "2"]);
}

#[test]
fn conversion_dir_cleanup() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    let conversion = store.conversion_dir("01", Some("1"));
    std::fs::create_dir_all(&conversion).unwrap();
    std::fs::write(conversion.join("Doe--T1--GR_IR--2.nii"), b"nifti").unwrap();

    assert!(store.clean_conversion_dir("01", Some("1")).unwrap());
    assert!(!conversion.exists());
    assert!(!store.clean_conversion_dir("01", Some("1")).unwrap());
}
