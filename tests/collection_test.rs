//! End-to-end tests over real fixture run files.

mod common;

use std::collections::HashSet;

use ndarray::{arr2, arr3, Array2};
use tempfile::tempdir;

use common::{control_file, RunFileBuilder};
use trainfile::collection::{DataCollection, Selector, TrainRange};
use trainfile::error::Error;

type TestResult = Result<(), Box<dyn std::error::Error>>;

#[test]
fn multi_file_control_array_concatenates_chronologically() -> TestResult {
    let dir = tempdir()?;
    let file_a = dir.path().join("a.h5");
    let file_b = dir.path().join("b.h5");
    control_file(&file_a, "X", "val", &[100, 101, 102], &[1.0, 2.0, 3.0])?;
    control_file(&file_b, "X", "val", &[103, 104], &[4.0, 5.0])?;

    // Later file first: output order must come from train IDs, not add order.
    let mut run = DataCollection::new();
    run.add_file(&file_b)?;
    run.add_file(&file_a)?;

    assert_eq!(run.train_ids(), &[100, 101, 102, 103, 104]);

    let array = run.get_array::<f64>("X", "val")?;
    assert_eq!(array.train_ids(), &[100, 101, 102, 103, 104]);
    assert_eq!(array.dims(), &["trainId".to_string()]);
    let values: Vec<f64> = array.data().iter().copied().collect();
    assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    Ok(())
}

#[test]
fn overlapping_files_union_train_ids_without_duplicates() -> TestResult {
    let dir = tempdir()?;
    let file_a = dir.path().join("a.h5");
    let file_b = dir.path().join("b.h5");
    control_file(&file_a, "X", "val", &[1, 2, 3], &[1.0, 2.0, 3.0])?;
    control_file(&file_b, "X", "val", &[2, 3, 4], &[2.0, 3.0, 4.0])?;

    let mut run = DataCollection::new();
    run.add_file(&file_a)?;
    run.add_file(&file_b)?;

    assert_eq!(run.train_ids(), &[1, 2, 3, 4]);
    assert!(run.train_ids().windows(2).all(|w| w[0] < w[1]));
    Ok(())
}

#[test]
fn zero_train_id_slots_are_trimmed() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("a.h5");
    control_file(&path, "X", "val", &[10, 11, 0, 0], &[1.0, 2.0])?;

    let run = DataCollection::open_file(&path)?;
    assert_eq!(run.train_ids(), &[10, 11]);
    Ok(())
}

#[test]
fn instrument_expansion_repeats_labels_per_record() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("a.h5");
    let mut builder = RunFileBuilder::create(&path, &[10, 11, 12])?;
    builder.declare("INSTRUMENT/Y:output/image");
    builder.index("Y:output", "image", &[0, 0, 2], &[0, 2, 1])?;
    builder.write_1d("INSTRUMENT/Y:output/image/data", &[7.0f64, 8.0, 9.0])?;
    builder.finish()?;

    let run = DataCollection::open_file(&path)?;
    assert!(run.instrument_sources().contains("Y:output"));

    let array = run.get_array::<f64>("Y:output", "image.data")?;
    // Train 10 contributes nothing, train 11 two records, train 12 one.
    assert_eq!(array.train_ids(), &[11, 11, 12]);
    let values: Vec<f64> = array.data().iter().copied().collect();
    assert_eq!(values, vec![7.0, 8.0, 9.0]);

    // The single-value-per-train contract must reject this group.
    let err = run.get_array_single::<f64>("Y:output", "image.data").unwrap_err();
    assert!(matches!(err, Error::MultipleRecordsPerTrain { .. }));
    Ok(())
}

#[test]
fn counts_derive_from_last_and_status_when_absent() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("a.h5");
    let mut builder = RunFileBuilder::create(&path, &[20, 21])?;
    builder.declare("INSTRUMENT/Y:output/image");
    // Zero status must force a zero count even though first/last suggest one.
    builder.index_last_status("Y:output", "image", &[0, 2], &[1, 2], &[1, 0])?;
    builder.write_1d("INSTRUMENT/Y:output/image/data", &[1.0f64, 2.0])?;
    builder.finish()?;

    let run = DataCollection::open_file(&path)?;
    let array = run.get_array::<f64>("Y:output", "image.data")?;
    assert_eq!(array.train_ids(), &[20, 20]);
    Ok(())
}

#[test]
fn unknown_source_category_is_rejected() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("a.h5");
    let mut builder = RunFileBuilder::create(&path, &[1])?;
    builder.declare("WEIRD/thing");
    builder.finish()?;

    let mut run = DataCollection::new();
    let err = run.add_file(&path).unwrap_err();
    assert!(matches!(err, Error::UnknownCategory(cat) if cat == "WEIRD"));
    Ok(())
}

#[test]
fn select_filters_sources_and_keys_without_mutating() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("a.h5");
    let mut builder = RunFileBuilder::create(&path, &[1, 2])?;
    builder.declare("CONTROL/SA1_XTD2_XGM/XGM/MAIN");
    builder.declare("CONTROL/SA1_XTD2_MONO/MDL/CTRL");
    builder.write_1d(
        "CONTROL/SA1_XTD2_XGM/XGM/MAIN/beamPosition/ixPos/value",
        &[0.1f64, 0.2],
    )?;
    builder.write_1d(
        "CONTROL/SA1_XTD2_XGM/XGM/MAIN/pulseEnergy/value",
        &[5.0f64, 6.0],
    )?;
    builder.write_1d("CONTROL/SA1_XTD2_MONO/MDL/CTRL/angle/value", &[1.0f64, 2.0])?;
    builder.finish()?;

    let run = DataCollection::open_file(&path)?;
    let xgm = run.select_glob("*XGM*", "beamPosition.*")?;

    assert_eq!(xgm.control_sources().len(), 1);
    assert!(xgm.control_sources().contains("SA1_XTD2_XGM/XGM/MAIN"));
    let keys = xgm.keys_for_source("SA1_XTD2_XGM/XGM/MAIN")?;
    assert!(keys.contains("beamPosition.ixPos.value"));
    assert!(!keys.contains("pulseEnergy.value"));

    // The receiver is untouched.
    assert_eq!(run.control_sources().len(), 2);
    assert!(run
        .keys_for_source("SA1_XTD2_XGM/XGM/MAIN")?
        .contains("pulseEnergy.value"));

    // The restriction carries into key validation on the derived collection.
    let err = xgm
        .get_array::<f64>("SA1_XTD2_XGM/XGM/MAIN", "pulseEnergy")
        .unwrap_err();
    assert!(matches!(err, Error::KeyNotFound { .. }));
    Ok(())
}

#[test]
fn control_key_globs_match_value_suffix_insensitively() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("a.h5");
    let mut builder = RunFileBuilder::create(&path, &[1, 2])?;
    builder.declare("CONTROL/SA1_XTD2_XGM/XGM/MAIN");
    builder.write_1d(
        "CONTROL/SA1_XTD2_XGM/XGM/MAIN/beamPosition/ixPos/value",
        &[0.1f64, 0.2],
    )?;
    builder.finish()?;

    let run = DataCollection::open_file(&path)?;
    // The pattern names the bare key; the stored key carries ".value".
    let xgm = run.select_glob("*XGM*", "beamPosition.ixPos")?;
    let keys = xgm.keys_for_source("SA1_XTD2_XGM/XGM/MAIN")?;
    assert!(keys.contains("beamPosition.ixPos.value"));

    // Bare keys also resolve when reading.
    let array = xgm.get_array::<f64>("SA1_XTD2_XGM/XGM/MAIN", "beamPosition.ixPos")?;
    assert_eq!(array.train_ids(), &[1, 2]);
    Ok(())
}

#[test]
fn selector_errors_are_specific() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("a.h5");
    control_file(&path, "X", "val", &[1], &[1.0])?;
    let run = DataCollection::open_file(&path)?;

    let err = run
        .select(&Selector::sources(["NO_SUCH_SOURCE"]))
        .unwrap_err();
    assert!(matches!(err, Error::SourceNotFound(_)));

    let err = run.select_glob("NOPE*", "*").unwrap_err();
    assert!(matches!(err, Error::NoPatternMatch { .. }));

    let err = run.get_array::<f64>("X", "missing").unwrap_err();
    assert!(matches!(err, Error::KeyNotFound { .. }));

    let err = run.get_array::<f64>("NOPE", "val").unwrap_err();
    assert!(matches!(err, Error::SourceNotFound(_)));
    Ok(())
}

#[test]
fn select_trains_by_id_follows_the_asymmetric_policy() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("a.h5");
    control_file(&path, "X", "val", &[55, 56, 58, 60, 61], &[1.0; 5])?;
    let run = DataCollection::open_file(&path)?;

    // Start before the run clamps to the beginning; stop 60 is exclusive.
    let window = run.select_trains(&TrainRange::by_id(50, 60))?;
    assert_eq!(window.train_ids(), &[55, 56, 58]);

    // A stop before the run cannot overlap it backwards.
    let err = run.select_trains(&TrainRange::by_id(0, 10)).unwrap_err();
    assert!(matches!(err, Error::TrainIdBeforeRun { .. }));

    // A start past the end cannot overlap it forwards...
    let err = run.select_trains(&TrainRange::by_id(70, None)).unwrap_err();
    assert!(matches!(err, Error::TrainIdAfterRun { .. }));

    // ...but a stop past the end just clamps.
    let all = run.select_trains(&TrainRange::by_id(None, 70))?;
    assert_eq!(all.train_ids(), run.train_ids());
    Ok(())
}

#[test]
fn select_trains_is_idempotent_and_contiguous() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("a.h5");
    control_file(&path, "X", "val", &[55, 56, 58, 60, 61], &[1.0; 5])?;
    let run = DataCollection::open_file(&path)?;

    let range = TrainRange::by_id(56, 61);
    let once = run.select_trains(&range)?;
    let twice = once.select_trains(&range)?;
    assert_eq!(once.train_ids(), &[56, 58, 60]);
    assert_eq!(once.train_ids(), twice.train_ids());

    // The restriction is a contiguous subsequence of the original list.
    let ids = run.train_ids();
    let start = ids.iter().position(|&t| t == once.train_ids()[0]);
    let window = &ids[start.unwrap()..][..once.train_ids().len()];
    assert_eq!(window, once.train_ids());
    Ok(())
}

#[test]
fn select_trains_by_index_slices_positionally() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("a.h5");
    control_file(&path, "X", "val", &[55, 56, 58, 60, 61], &[1.0; 5])?;
    let run = DataCollection::open_file(&path)?;

    let window = run.select_trains(&TrainRange::by_index(1, 4))?;
    assert_eq!(window.train_ids(), &[56, 58, 60]);

    let strided = run.select_trains(&TrainRange::by_index_step(0, None, 2))?;
    assert_eq!(strided.train_ids(), &[55, 58, 61]);
    Ok(())
}

#[test]
fn select_trains_drops_sources_with_no_overlap() -> TestResult {
    let dir = tempdir()?;
    let file_a = dir.path().join("a.h5");
    let file_b = dir.path().join("b.h5");
    control_file(&file_a, "X", "val", &[1, 2, 3], &[1.0, 2.0, 3.0])?;
    control_file(&file_b, "Z", "val", &[10, 11], &[10.0, 11.0])?;

    let mut run = DataCollection::new();
    run.add_file(&file_a)?;
    run.add_file(&file_b)?;

    let early = run.select_trains(&TrainRange::by_id(1, 5))?;
    assert_eq!(early.train_ids(), &[1, 2, 3]);
    assert!(early.control_sources().contains("X"));
    // Z has no trains left and is gone, not merely hidden.
    assert!(!early.control_sources().contains("Z"));
    let err = early.get_array::<f64>("Z", "val").unwrap_err();
    assert!(matches!(err, Error::SourceNotFound(_)));
    Ok(())
}

#[test]
fn trains_with_require_all_skips_incomplete_trains() -> TestResult {
    let dir = tempdir()?;
    let file_a = dir.path().join("a.h5");
    let file_b = dir.path().join("b.h5");
    control_file(&file_a, "X", "val", &[1, 2], &[1.0, 2.0])?;
    control_file(&file_b, "Z", "val", &[5, 6], &[5.0, 6.0])?;

    let mut run = DataCollection::new();
    run.add_file(&file_a)?;
    run.add_file(&file_b)?;

    // Every train is missing one of the two sources.
    let strict: Vec<_> = run.trains(None, None, true)?.collect::<Result<_, _>>()?;
    assert!(strict.is_empty());

    // Without require_all, missing sources yield empty entries.
    let lax: Vec<_> = run.trains(None, None, false)?.collect::<Result<_, _>>()?;
    assert_eq!(lax.len(), 4);
    let (first_id, first_data) = &lax[0];
    assert_eq!(*first_id, 1);
    let x = first_data.get("X").expect("X entry");
    let x_val = x.get("val").expect("val for train 1");
    assert_eq!(
        x_val.as_float().expect("float data").iter().copied().collect::<Vec<_>>(),
        vec![1.0]
    );
    assert!(first_data.get("Z").expect("Z entry").is_empty());
    Ok(())
}

#[test]
fn train_iteration_crosses_file_boundaries() -> TestResult {
    let dir = tempdir()?;
    let file_a = dir.path().join("a.h5");
    let file_b = dir.path().join("b.h5");
    control_file(&file_a, "X", "val", &[100, 101], &[1.0, 2.0])?;
    control_file(&file_b, "X", "val", &[102, 103], &[3.0, 4.0])?;

    let mut run = DataCollection::new();
    run.add_file(&file_a)?;
    run.add_file(&file_b)?;

    let mut seen = Vec::new();
    for train in run.trains(None, None, false)? {
        let (train_id, data) = train?;
        let value = data["X"]["val"]
            .as_float()
            .expect("float data")
            .iter()
            .copied()
            .next()
            .expect("one value");
        seen.push((train_id, value));
    }
    assert_eq!(
        seen,
        vec![(100, 1.0), (101, 2.0), (102, 3.0), (103, 4.0)]
    );
    Ok(())
}

#[test]
fn train_from_id_reads_control_and_instrument_records() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("a.h5");
    let mut builder = RunFileBuilder::create(&path, &[7, 8, 9])?;
    builder.declare("CONTROL/X");
    builder.write_1d("CONTROL/X/val/value", &[0.5f64, 1.5, 2.5])?;
    builder.declare("INSTRUMENT/Y:output/image");
    builder.index("Y:output", "image", &[0, 1, 3], &[1, 2, 0])?;
    builder.write_1d("INSTRUMENT/Y:output/image/data", &[10.0f64, 20.0, 30.0])?;
    builder.finish()?;

    let run = DataCollection::open_file(&path)?;

    let (train_id, data) = run.train_from_id(8, None)?;
    assert_eq!(train_id, 8);
    // Control: one squeezed scalar.
    let control = data["X"]["val.value"].as_float().expect("float");
    assert_eq!(control.ndim(), 0);
    assert_eq!(control.iter().copied().collect::<Vec<_>>(), vec![1.5]);
    // Instrument: two records keep their leading axis.
    let block = data["Y:output"]["image.data"].as_float().expect("float");
    assert_eq!(block.shape(), &[2]);
    assert_eq!(block.iter().copied().collect::<Vec<_>>(), vec![20.0, 30.0]);

    // Train 9 has a zero count: the instrument key is omitted entirely.
    let (_, data) = run.train_from_id(9, None)?;
    assert!(!data["Y:output"].contains_key("image.data"));

    // train_from_index resolves through the train-ID list.
    let (train_id, _) = run.train_from_index(0, None)?;
    assert_eq!(train_id, 7);
    Ok(())
}

#[test]
fn get_series_builds_compound_index_for_pulse_resolved_data() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("a.h5");
    let mut builder = RunFileBuilder::create(&path, &[7, 8])?;
    builder.declare("INSTRUMENT/Y:output/image");
    builder.index("Y:output", "image", &[0, 2], &[2, 1])?;
    let data: Array2<f64> = arr2(&[[1.0], [2.0], [3.0]]);
    builder.write_2d("INSTRUMENT/Y:output/image/data", &data)?;
    let pulses: Array2<u64> = arr2(&[[0], [1], [0]]);
    builder.write_2d("INSTRUMENT/Y:output/image/pulseId", &pulses)?;
    builder.finish()?;

    let run = DataCollection::open_file(&path)?;
    let series = run.get_series::<f64>("Y:output", "image.data")?;

    assert_eq!(series.name(), "Y:output/image.data");
    assert_eq!(series.values(), &[1.0, 2.0, 3.0]);
    match series.index() {
        trainfile::collection::SeriesIndex::TrainPulse(pairs) => {
            assert_eq!(pairs, &[(7, 0), (7, 1), (8, 0)]);
        }
        other => panic!("expected a compound index, got {:?}", other),
    }
    Ok(())
}

#[test]
fn get_dataframe_aligns_columns_on_the_index_union() -> TestResult {
    let dir = tempdir()?;
    let file_a = dir.path().join("a.h5");
    let file_b = dir.path().join("b.h5");
    control_file(&file_a, "X", "v", &[1, 2], &[1.0, 2.0])?;
    control_file(&file_b, "Z", "v", &[2, 3], &[20.0, 30.0])?;

    let mut run = DataCollection::new();
    run.add_file(&file_a)?;
    run.add_file(&file_b)?;

    let frame = run.get_dataframe(None)?;
    assert_eq!(frame.num_rows(), 3);
    assert_eq!(frame.num_columns(), 2);
    assert_eq!(
        frame.index(),
        &[(1, None), (2, None), (3, None)]
    );

    let x = frame.column("X/v").expect("X/v column");
    assert_eq!(&x[..2], &[1.0, 2.0]);
    assert!(x[2].is_nan());

    let z = frame.column("Z/v").expect("Z/v column");
    assert!(z[0].is_nan());
    assert_eq!(&z[1..], &[20.0, 30.0]);
    Ok(())
}

#[test]
fn get_dataframe_skips_timestamp_keys() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("a.h5");
    let mut builder = RunFileBuilder::create(&path, &[1, 2])?;
    builder.declare("CONTROL/X");
    builder.write_1d("CONTROL/X/val/value", &[1.0f64, 2.0])?;
    builder.write_1d("CONTROL/X/val/timestamp", &[100.0f64, 200.0])?;
    builder.finish()?;

    let run = DataCollection::open_file(&path)?;
    let frame = run.get_dataframe(None)?;
    let names: HashSet<&str> = frame.columns().map(|(name, _)| name).collect();
    assert_eq!(names, HashSet::from(["X/val"]));
    Ok(())
}

#[test]
fn detector_info_aggregates_image_counts() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("a.h5");
    let mut builder = RunFileBuilder::create(&path, &[100, 101, 102])?;
    builder.declare("INSTRUMENT/FXE_DET_LPD1M-1/DET/0CH0:xtdf/image");
    builder.index("FXE_DET_LPD1M-1/DET/0CH0:xtdf", "image", &[0, 1, 3], &[1, 2, 0])?;
    let frames = arr3(&[[[1.0f32; 4]; 4], [[2.0; 4]; 4], [[3.0; 4]; 4]]);
    builder.write_3d("INSTRUMENT/FXE_DET_LPD1M-1/DET/0CH0:xtdf/image/data", &frames)?;
    builder.finish()?;

    let run = DataCollection::open_file(&path)?;
    let info = run.detector_info("FXE_DET_LPD1M-1/DET/0CH0:xtdf")?;
    assert_eq!(info.dims, vec![4, 4]);
    assert_eq!(info.frames_per_train, 2);
    assert_eq!(info.total_frames, 3);
    Ok(())
}

#[test]
fn summary_reports_trains_detectors_and_sources() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("a.h5");
    let mut builder = RunFileBuilder::create(&path, &[100, 101, 102])?;
    builder.declare("CONTROL/SA1_XTD2_XGM/XGM/MAIN");
    builder.write_1d("CONTROL/SA1_XTD2_XGM/XGM/MAIN/pulseEnergy/value", &[1.0f64; 3])?;
    builder.declare("INSTRUMENT/FXE_DET_LPD1M-1/DET/0CH0:xtdf/image");
    builder.index("FXE_DET_LPD1M-1/DET/0CH0:xtdf", "image", &[0, 1, 3], &[1, 2, 0])?;
    let frames = arr3(&[[[0.0f32; 4]; 4], [[0.0; 4]; 4], [[0.0; 4]; 4]]);
    builder.write_3d("INSTRUMENT/FXE_DET_LPD1M-1/DET/0CH0:xtdf/image/data", &frames)?;
    builder.finish()?;

    let run = DataCollection::open_file(&path)?;
    let summary = run.summary()?;

    assert_eq!(summary.train_count, 3);
    assert_eq!(summary.first_train_id, Some(100));
    assert_eq!(summary.last_train_id, Some(102));
    assert_eq!(summary.detector_module_count, 1);
    assert_eq!(summary.detector_name, "FXE_DET_LPD1M-1");
    assert_eq!(summary.control_sources, vec!["SA1_XTD2_XGM/XGM/MAIN"]);
    assert!(summary.instrument_sources.is_empty());

    let text = summary.to_string();
    assert!(text.contains("# of trains:    3"));
    assert!(text.contains("1 detector modules (FXE_DET_LPD1M-1)"));
    assert!(text.contains("4 x 4 pixels"));
    Ok(())
}

#[test]
fn open_run_loads_every_h5_file_in_a_directory() -> TestResult {
    let dir = tempdir()?;
    control_file(&dir.path().join("r01.h5"), "X", "val", &[1, 2], &[1.0, 2.0])?;
    control_file(&dir.path().join("r02.h5"), "X", "val", &[3], &[3.0])?;
    std::fs::write(dir.path().join("notes.txt"), "not a run file")?;

    let run = DataCollection::open_run(dir.path())?;
    assert_eq!(run.train_ids(), &[1, 2, 3]);
    assert_eq!(run.files().len(), 2);
    Ok(())
}

#[test]
fn chained_selects_compose_like_one_combined_selector() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("a.h5");
    let mut builder = RunFileBuilder::create(&path, &[1])?;
    builder.declare("CONTROL/X");
    builder.declare("CONTROL/Z");
    builder.write_1d("CONTROL/X/a/value", &[1.0f64])?;
    builder.write_1d("CONTROL/X/b/value", &[2.0f64])?;
    builder.write_1d("CONTROL/Z/c/value", &[3.0f64])?;
    builder.finish()?;

    let run = DataCollection::open_file(&path)?;
    let chained = run.select_glob("X", "*")?.select_glob("X", "a.*")?;
    let direct = run.select_glob("X", "a.*")?;

    assert_eq!(chained.control_sources(), direct.control_sources());
    assert_eq!(chained.train_ids(), direct.train_ids());
    assert_eq!(chained.keys_for_source("X")?, direct.keys_for_source("X")?);
    Ok(())
}

#[test]
fn selecting_by_pairs_restricts_to_exact_keys() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("a.h5");
    let mut builder = RunFileBuilder::create(&path, &[1])?;
    builder.declare("CONTROL/X");
    builder.write_1d("CONTROL/X/a/value", &[1.0f64])?;
    builder.write_1d("CONTROL/X/b/value", &[2.0f64])?;
    builder.finish()?;

    let run = DataCollection::open_file(&path)?;
    let picked = run.select(&Selector::pairs([("X", "a.value")]))?;
    let keys = picked.keys_for_source("X")?;
    assert!(keys.contains("a.value"));
    assert!(!keys.contains("b.value"));
    Ok(())
}
