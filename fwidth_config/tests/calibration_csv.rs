use std::fs::File;
use std::io::Write;

use fwidth_config::{Calibration, CalibrationRow, load_calibration_csv};
use rstest::rstest;
use tempfile::tempdir;

fn row(reading: f64, diameter: f64) -> CalibrationRow {
    CalibrationRow { reading, diameter }
}

#[rstest]
fn two_point_fit_is_exact() {
    let c = Calibration::from_rows(vec![row(1.0, 1.5), row(2.0, 2.0)]).unwrap();
    assert!((c.gain_mm_per_unit - 0.5).abs() < 1e-9);
    assert!((c.offset_mm - 1.0).abs() < 1e-9);
    assert!((c.apply(1.5) - 1.75).abs() < 1e-9);
}

#[rstest]
fn decreasing_readings_fit_negative_gain() {
    // hall output falls as the bearing is pushed away by thicker filament
    let c = Calibration::from_rows(vec![row(3.0, 1.5), row(2.0, 2.0), row(1.0, 2.5)]).unwrap();
    assert!((c.gain_mm_per_unit + 0.5).abs() < 1e-9);
    assert!((c.offset_mm - 3.0).abs() < 1e-9);
}

#[rstest]
fn outlier_is_rejected_by_refit() {
    // y = x exactly, except one wild point
    let rows = vec![
        row(1.0, 1.0),
        row(1.2, 1.2),
        row(1.4, 1.4),
        row(1.6, 1.6),
        row(1.8, 1.8),
        row(2.0, 2.0),
        row(2.2, 2.2),
        row(2.4, 2.4),
        row(2.6, 2.6),
        row(2.8, 4.0),
    ];
    let c = Calibration::from_rows(rows).unwrap();
    assert!((c.gain_mm_per_unit - 1.0).abs() < 1e-6, "gain {}", c.gain_mm_per_unit);
    assert!(c.offset_mm.abs() < 1e-6, "offset {}", c.offset_mm);
}

#[rstest]
#[case(vec![row(1.0, 1.5)], "at least two rows")]
#[case(vec![row(1.0, 1.5), row(1.0, 2.0)], "duplicate readings")]
#[case(vec![row(1.0, 1.5), row(2.0, 2.0), row(1.5, 1.7)], "monotonic")]
#[case(vec![row(1.0, 1.75), row(2.0, 1.75)], "zero slope")]
fn rejects_bad_rows(#[case] rows: Vec<CalibrationRow>, #[case] needle: &str) {
    let err = Calibration::from_rows(rows).expect_err("should fail");
    assert!(format!("{err}").contains(needle), "got: {err}");
}

#[rstest]
fn loads_csv_with_strict_headers() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cal.csv");
    let mut f = File::create(&path).unwrap();
    writeln!(f, "reading,diameter").unwrap();
    writeln!(f, "1.0, 1.5").unwrap();
    writeln!(f, "2.0, 2.0").unwrap();
    drop(f);

    let c = load_calibration_csv(&path).unwrap();
    assert!((c.gain_mm_per_unit - 0.5).abs() < 1e-9);
}

#[rstest]
fn rejects_wrong_headers() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cal.csv");
    let mut f = File::create(&path).unwrap();
    writeln!(f, "raw,mm").unwrap();
    writeln!(f, "1.0,1.5").unwrap();
    drop(f);

    let err = load_calibration_csv(&path).expect_err("bad headers");
    assert!(format!("{err}").contains("must have headers 'reading,diameter'"));
}

#[rstest]
fn reports_bad_row_number() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cal.csv");
    let mut f = File::create(&path).unwrap();
    writeln!(f, "reading,diameter").unwrap();
    writeln!(f, "1.0,1.5").unwrap();
    writeln!(f, "x,2.0").unwrap();
    drop(f);

    let err = load_calibration_csv(&path).expect_err("bad row");
    assert!(format!("{err}").contains("invalid CSV row 3"));
}
