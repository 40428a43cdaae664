use microspot_reader::activity::{ActivityTable, Chromatogram, Feature, FeatureChromatograms, FeatureTable};
use microspot_reader::pipeline::{PipelineConfig, annotate_activity};
use microspot_reader::settings::Settings;
use microspot_reader::{Spot, SpotList};
use serde_json::json;

const COLUMNS: u32 = 12;

/// Acquisition position of a well when spotting runs serpentine.
fn serpentine_position(row: u32, col: u32) -> usize {
    let offset = if row % 2 == 1 { col - 1 } else { COLUMNS - col };
    ((row - 1) * COLUMNS + offset) as usize
}

fn gaussian(t: f64, centre: f64, width: f64) -> f64 {
    (-0.5 * ((t - centre) / width).powi(2)).exp()
}

/// Four spotted rows, activity eluting at the eleventh spot. Rows are
/// stored out of order, as a merge of two plates would be.
fn spot_lists() -> Vec<SpotList> {
    let mut lower = SpotList::default();
    let mut upper = SpotList::default();
    for row in 1..=4 {
        for col in 1..=COLUMNS {
            let position = serpentine_position(row, col);
            let mut spot = Spot::detected(col as f64 * 40.0, row as f64 * 40.0, 12);
            spot.set_index(row, col);
            let noise = 0.05 * (((position * 7) % 5) as f64 - 2.0);
            spot.intensity = Some(1.0 + noise + 8.0 * gaussian(position as f64, 10.0, 1.0));
            spot.raw_intensity = spot.intensity;
            if row > 2 { upper.push(spot) } else { lower.push(spot) }
        }
    }
    vec![upper, lower]
}

fn prepared_table() -> ActivityTable {
    let dir = tempfile::tempdir().unwrap();
    let mut spots = SpotList::default();
    let mut paths = Vec::new();
    for (i, list) in spot_lists().into_iter().enumerate() {
        let path = dir.path().join(format!("plate_{i}.csv"));
        list.write_csv_path(&path).unwrap();
        paths.push(path);
    }
    spots.extend_from(paths.iter().map(|p| SpotList::read_csv_path(p).unwrap()));
    assert_eq!(spots.len(), 48);

    assert_eq!(spots.remove_rows(&["d"]).unwrap(), 12);
    spots.sort(true, false).unwrap();
    let mut table = ActivityTable::from_spot_list(&spots).unwrap();
    table.assign_retention_times(0.0, 350.0).unwrap();

    let path = dir.path().join("activity.csv");
    table.write_csv_path(&path).unwrap();
    let restored = ActivityTable::read_csv_path(&path).unwrap();
    assert_eq!(restored, table);
    restored
}

fn feature(id: &str, rt: f64, start: f64, end: f64) -> Feature {
    Feature {
        id: id.to_string(),
        mz: 412.2,
        rt,
        rt_start: start,
        rt_end: end,
    }
}

fn ms_inputs() -> (FeatureTable, FeatureChromatograms) {
    let features = FeatureTable::from(vec![
        feature("near", 102.0, 80.0, 125.0),
        feature("far", 110.0, 95.0, 130.0),
    ]);
    let mut chromatograms = FeatureChromatograms::default();
    for (id, apex) in [("near", 102.0), ("far", 110.0)] {
        chromatograms.insert(
            id,
            Chromatogram::new((0..700).map(|i| {
                let t = i as f64 * 0.5;
                (t, 2e5 * gaussian(t, apex, 10.0))
            })),
        );
    }
    (features, chromatograms)
}

#[test]
fn serpentine_table_orders_acquisition() {
    let table = prepared_table();
    let records = table.records();
    assert_eq!(records.len(), 36);
    assert_eq!((records[11].row_name.as_str(), records[11].column), ("a", Some(12)));
    assert_eq!((records[12].row_name.as_str(), records[12].column), ("b", Some(12)));
    assert_eq!(table.retention_times().unwrap()[10], 100.0);
}

#[test]
fn activity_peak_links_the_coeluting_feature() {
    let table = prepared_table();
    let (features, chromatograms) = ms_inputs();
    let config = PipelineConfig::default()
        .merged(&json!({"annotator": {"rt_correlation": {"window_s": 5}}}))
        .unwrap();

    let detection = annotate_activity(&table, &features, &chromatograms, &config).unwrap();
    assert_eq!(detection.peaks.len(), 1);
    let peak = &detection.peaks[0];
    assert_eq!(peak.index, 10);
    assert_eq!(peak.retention_time, 100.0);
    assert!(peak.start_idx <= peak.index && peak.index <= peak.end_idx);
    assert!(peak.start_rt <= peak.retention_time && peak.retention_time <= peak.end_rt);
    assert!(peak.auc > 0.0);

    assert_eq!(peak.correlated_feature_ids, vec!["near"]);
    assert_eq!(peak.correlation_coeff_features.len(), 1);
    assert!(peak.correlation_coeff_features[0] > 0.8, "r = {}", peak.correlation_coeff_features[0]);
}

#[test]
fn bias_shifts_the_retention_window() {
    let table = prepared_table();
    let (features, chromatograms) = ms_inputs();
    let config = PipelineConfig::default()
        .merged(&json!({"annotator": {"rt_correlation": {"window_s": 3, "bias_s": 9}}}))
        .unwrap();
    let detection = annotate_activity(&table, &features, &chromatograms, &config).unwrap();
    assert_eq!(detection.peaks[0].correlated_feature_ids, vec!["far"]);
}
