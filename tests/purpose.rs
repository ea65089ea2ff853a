use camino::{Utf8Path, Utf8PathBuf};
use serde_json::{Value, json};

use kira_bids::domain::{KeyFlags, Purpose};
use kira_bids::entities::EntitySet;
use kira_bids::purpose::{self, GreLayout, SeriesTarget};
use kira_bids::series::SeriesRecord;
use kira_bids::sidecar::Sidecar;

fn utf8_dir(dir: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
}

fn write_series(dir: &Utf8Path, stem: &str, meta: Value) -> Utf8PathBuf {
    let image = dir.join(format!("{stem}.nii.gz"));
    std::fs::write(&image, b"nifti").unwrap();
    std::fs::write(dir.join(format!("{stem}.json")), serde_json::to_vec(&meta).unwrap()).unwrap();
    image
}

fn target<'a>(record: &'a SeriesRecord, purpose: Purpose, stub: &str, out: &Utf8Path) -> SeriesTarget<'a> {
    let entities = EntitySet::from_stub(stub)
        .with("sub", "01")
        .with_extension(".nii.gz");
    SeriesTarget {
        record,
        directory: out.join(purpose.as_str()),
        purpose,
        entities,
        intended_for: None,
    }
}

#[test]
fn gre_phase_difference_fieldmap() {
    let work = tempfile::tempdir().unwrap();
    let work = utf8_dir(&work);
    let bids = tempfile::tempdir().unwrap();
    let bids = utf8_dir(&bids);

    let mag1 = write_series(&work, "Doe--GRE_FIELD--GR--10_e1", json!({"EchoTime": 0.00492, "EchoNumber": 1}));
    let mag2 = write_series(&work, "Doe--GRE_FIELD--GR--10_e2", json!({"EchoTime": 0.00738, "EchoNumber": 2}));
    let phase = write_series(
        &work,
        "Doe--GRE_FIELD--GR--11_e2_ph",
        json!({"EchoTime": 0.00738, "EchoNumber": 2, "ImageType": ["ORIGINAL", "PRIMARY", "P", "ND"]}),
    );

    for image in [&mag1, &mag2, &phase] {
        let record = SeriesRecord::load(image, "01", None).unwrap();
        assert_eq!(purpose::detect_gre_layout(&record.converter), GreLayout::PhaseDifference);
        let plan = purpose::plan(target(&record, Purpose::Fmap, "phasediff", &bids), KeyFlags::default());
        plan.write(false).unwrap();
    }

    let fmap = bids.join("fmap");
    assert!(fmap.join("sub-01_magnitude1.nii.gz").is_file());
    assert!(fmap.join("sub-01_magnitude2.nii.gz").is_file());
    assert!(!fmap.join("sub-01_magnitude1.json").exists());
    assert!(!fmap.join("sub-01_magnitude2.json").exists());
    assert!(fmap.join("sub-01_phasediff.nii.gz").is_file());

    let meta = Sidecar::read(&fmap.join("sub-01_phasediff.json")).unwrap();
    let te1 = meta.get("EchoTime1").and_then(Value::as_f64).unwrap();
    let te2 = meta.get("EchoTime2").and_then(Value::as_f64).unwrap();
    assert!(te1 < te2);
}

#[test]
fn gre_without_phase_series_is_unmatched() {
    let work = tempfile::tempdir().unwrap();
    let work = utf8_dir(&work);
    let bids = tempfile::tempdir().unwrap();
    let bids = utf8_dir(&bids);

    let image = write_series(&work, "Doe--GRE_FIELD--GR--10_e1", json!({"EchoTime": 0.00492}));
    let record = SeriesRecord::load(&image, "01", None).unwrap();
    assert_eq!(purpose::detect_gre_layout(&record.converter), GreLayout::Unmatched);

    let mut fieldmap = target(&record, Purpose::Fmap, "magnitude1", &bids);
    fieldmap.intended_for = Some(vec!["func/sub-01_task-rest_bold.nii.gz".to_string()]);
    purpose::plan(fieldmap, KeyFlags::default()).write(false).unwrap();

    assert!(bids.join("fmap/sub-01_magnitude1.nii.gz").is_file());
    let meta = Sidecar::read(&bids.join("fmap/sub-01_magnitude1.json")).unwrap();
    assert_eq!(meta.get("EchoTime"), Some(&json!(0.00492)));
    assert!(meta.get("EchoTime1").is_none());
    assert_eq!(
        meta.intended_for(),
        Some(vec!["func/sub-01_task-rest_bold.nii.gz".to_string()])
    );
}

#[test]
fn gre_with_phase_per_echo_tags_magnitudes_and_phases() {
    let work = tempfile::tempdir().unwrap();
    let work = utf8_dir(&work);
    let bids = tempfile::tempdir().unwrap();
    let bids = utf8_dir(&bids);

    let images = [
        write_series(&work, "Doe--GRE_FIELD--GR--10_e1", json!({"EchoTime": 0.00492, "EchoNumber": 1})),
        write_series(&work, "Doe--GRE_FIELD--GR--10_e2", json!({"EchoTime": 0.00738, "EchoNumber": 2})),
        write_series(&work, "Doe--GRE_FIELD--GR--11_e1_ph", json!({"EchoTime": 0.00492, "EchoNumber": 1})),
        write_series(&work, "Doe--GRE_FIELD--GR--11_e2_ph", json!({"EchoTime": 0.00738, "EchoNumber": 2})),
    ];
    for image in &images {
        let record = SeriesRecord::load(image, "01", None).unwrap();
        assert_eq!(purpose::detect_gre_layout(&record.converter), GreLayout::SeparatePhases);
        purpose::plan(target(&record, Purpose::Fmap, "phasediff", &bids), KeyFlags::default())
            .write(false)
            .unwrap();
    }

    let fmap = bids.join("fmap");
    for echo in [1, 2] {
        assert!(fmap.join(format!("sub-01_magnitude{echo}.nii.gz")).is_file());
        assert!(!fmap.join(format!("sub-01_magnitude{echo}.json")).exists());
        assert!(fmap.join(format!("sub-01_phase{echo}.nii.gz")).is_file());
        assert!(fmap.join(format!("sub-01_phase{echo}.json")).is_file());
    }
    assert!(!fmap.join("sub-01_phasediff.nii.gz").exists());
    let meta = Sidecar::read(&fmap.join("sub-01_phase2.json")).unwrap();
    assert_eq!(meta.get("EchoTime"), Some(&json!(0.00738)));
}

#[test]
fn phase_reconstructions_get_part_phase() {
    let work = tempfile::tempdir().unwrap();
    let work = utf8_dir(&work);
    let bids = tempfile::tempdir().unwrap();
    let bids = utf8_dir(&bids);
    let flags = KeyFlags {
        echo: false,
        part: true,
        recon: false,
    };

    let bold = write_series(&work, "Doe--CPLX_BOLD--EP--5_ph", json!({}));
    let record = SeriesRecord::load(&bold, "01", None).unwrap();
    purpose::plan(target(&record, Purpose::Func, "task-rest_bold", &bids), flags)
        .write(false)
        .unwrap();
    assert!(bids.join("func/sub-01_task-rest_part-phase_bold.nii.gz").is_file());
    assert!(bids.join("func/sub-01_task-rest_part-phase_bold.json").is_file());
    assert!(bids.join("func/sub-01_task-rest_events.tsv").is_file());

    let epi = write_series(&work, "Doe--SE_AP--EP--7_ph", json!({}));
    let record = SeriesRecord::load(&epi, "01", None).unwrap();
    purpose::plan(target(&record, Purpose::Fmap, "dir-AP_epi", &bids), flags)
        .write(false)
        .unwrap();
    assert!(bids.join("fmap/sub-01_dir-AP_part-phase_epi.nii.gz").is_file());
}

#[test]
fn bold_gets_task_name_echo_and_events() {
    let work = tempfile::tempdir().unwrap();
    let work = utf8_dir(&work);
    let bids = tempfile::tempdir().unwrap();
    let bids = utf8_dir(&bids);

    let image = write_series(
        &work,
        "Doe--ME_BOLD--EP--4_e2",
        json!({"EchoNumber": 2, "SeriesDescription": "ME_BOLD"}),
    );
    let record = SeriesRecord::load(&image, "01", None).unwrap();
    let flags = KeyFlags {
        echo: true,
        part: true,
        recon: false,
    };
    let plan = purpose::plan(target(&record, Purpose::Func, "task-rest_bold", &bids), flags);
    plan.write(false).unwrap();

    let func = bids.join("func");
    assert!(func.join("sub-01_task-rest_echo-2_part-mag_bold.nii.gz").is_file());
    let meta = Sidecar::read(&func.join("sub-01_task-rest_echo-2_part-mag_bold.json")).unwrap();
    assert_eq!(meta.get("TaskName"), Some(&json!("rest")));
    let events = std::fs::read_to_string(func.join("sub-01_task-rest_events.tsv")).unwrap();
    assert_eq!(events, purpose::EVENTS_HEADER);
}

#[test]
fn echo_split_disabled_keeps_stub() {
    let work = tempfile::tempdir().unwrap();
    let work = utf8_dir(&work);
    let bids = tempfile::tempdir().unwrap();
    let bids = utf8_dir(&bids);

    let image = write_series(&work, "Doe--SBREF--EP--3", json!({"EchoNumber": 1}));
    let record = SeriesRecord::load(&image, "01", None).unwrap();
    let plan = purpose::plan(target(&record, Purpose::Func, "task-rest_sbref", &bids), KeyFlags::default());
    let written = plan.write(false).unwrap();

    assert_eq!(written.len(), 2);
    assert!(bids.join("func/sub-01_task-rest_sbref.nii.gz").is_file());
    assert!(!bids.join("func/sub-01_task-rest_events.tsv").exists());
}

#[test]
fn dwi_copies_gradient_tables() {
    let work = tempfile::tempdir().unwrap();
    let work = utf8_dir(&work);
    let bids = tempfile::tempdir().unwrap();
    let bids = utf8_dir(&bids);

    let image = write_series(&work, "Doe--DIFF_64--EP--12", json!({}));
    std::fs::write(work.join("Doe--DIFF_64--EP--12.bval"), "0 1000\n").unwrap();
    std::fs::write(work.join("Doe--DIFF_64--EP--12.bvec"), "0 1\n0 0\n0 0\n").unwrap();
    let record = SeriesRecord::load(&image, "01", None).unwrap();
    let plan = purpose::plan(target(&record, Purpose::Dwi, "acq-b1000_dwi", &bids), KeyFlags::default());
    plan.write(false).unwrap();

    let dwi = bids.join("dwi");
    assert!(dwi.join("sub-01_acq-b1000_dwi.nii.gz").is_file());
    assert!(dwi.join("sub-01_acq-b1000_dwi.json").is_file());
    assert_eq!(
        std::fs::read_to_string(dwi.join("sub-01_acq-b1000_dwi.bval")).unwrap(),
        "0 1000\n"
    );
    assert!(dwi.join("sub-01_acq-b1000_dwi.bvec").is_file());
}

#[test]
fn anat_bias_recon_split() {
    let work = tempfile::tempdir().unwrap();
    let work = utf8_dir(&work);
    let bids = tempfile::tempdir().unwrap();
    let bids = utf8_dir(&bids);

    let image = write_series(
        &work,
        "Doe--MPRAGE--GR_IR--2",
        json!({"ImageType": ["DERIVED", "PRIMARY", "M", "NORM"]}),
    );
    let record = SeriesRecord::load(&image, "01", None).unwrap();
    let flags = KeyFlags {
        echo: false,
        part: false,
        recon: true,
    };
    purpose::plan(target(&record, Purpose::Anat, "T1w", &bids), flags)
        .write(false)
        .unwrap();
    assert!(bids.join("anat/sub-01_rec-norm_T1w.nii.gz").is_file());
}

#[test]
fn existing_outputs_are_preserved_without_overwrite() {
    let work = tempfile::tempdir().unwrap();
    let work = utf8_dir(&work);
    let bids = tempfile::tempdir().unwrap();
    let bids = utf8_dir(&bids);

    let image = write_series(&work, "Doe--MPRAGE--GR_IR--2", json!({}));
    let record = SeriesRecord::load(&image, "01", None).unwrap();
    let anat = bids.join("anat");
    std::fs::create_dir_all(&anat).unwrap();
    std::fs::write(anat.join("sub-01_T1w.nii.gz"), b"curated").unwrap();

    let plan = purpose::plan(target(&record, Purpose::Anat, "T1w", &bids), KeyFlags::default());
    plan.write(false).unwrap();
    assert_eq!(std::fs::read(anat.join("sub-01_T1w.nii.gz")).unwrap(), b"curated");

    plan.write(true).unwrap();
    assert_eq!(std::fs::read(anat.join("sub-01_T1w.nii.gz")).unwrap(), b"nifti");
}
