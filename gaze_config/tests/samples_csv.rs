use std::fs::File;
use std::io::Write;

use gaze_config::{load_samples_csv, load_trace_csv};
use rstest::rstest;
use tempfile::tempdir;

fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut f = File::create(&path).unwrap();
    f.write_all(body.as_bytes()).unwrap();
    path
}

#[rstest]
fn loads_samples_with_exact_headers() {
    let dir = tempdir().unwrap();
    let path = write(
        &dir,
        "samples.csv",
        "nx,ny,x,y\n0.1,0.1,0,0\n0.9,0.1,1919,0\n0.5, 0.5 ,960,540\n",
    );
    let rows = load_samples_csv(&path).expect("load");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2].x, 960.0);
    assert_eq!(rows[2].ny, 0.5);
}

#[rstest]
#[case("raw,grams\n1,2\n")]
#[case("nx,ny,x\n0.1,0.1,0\n")]
#[case("x,y,nx,ny\n0,0,0.1,0.1\n")]
fn rejects_wrong_headers(#[case] body: &str) {
    let dir = tempdir().unwrap();
    let path = write(&dir, "bad.csv", body);
    let err = load_samples_csv(&path).expect_err("header mismatch");
    assert!(
        format!("{err}")
            .to_lowercase()
            .contains("calibration csv must have headers 'nx,ny,x,y'")
    );
}

#[rstest]
fn reports_row_number_of_bad_value() {
    let dir = tempdir().unwrap();
    let path = write(&dir, "bad.csv", "nx,ny,x,y\n0.1,0.1,0,0\n0.2,abc,5,5\n");
    let err = load_samples_csv(&path).expect_err("bad row");
    assert!(format!("{err}").contains("invalid CSV row 3"));
}

#[rstest]
fn rejects_non_finite_sample() {
    let dir = tempdir().unwrap();
    let path = write(&dir, "nan.csv", "nx,ny,x,y\nNaN,0.1,0,0\n");
    let err = load_samples_csv(&path).expect_err("non-finite");
    assert!(format!("{err}").contains("non-finite"));
}

#[rstest]
fn missing_file_is_an_error() {
    let dir = tempdir().unwrap();
    let err = load_samples_csv(&dir.path().join("nope.csv")).expect_err("missing");
    assert!(format!("{err}").contains("open calibration CSV"));
}

#[rstest]
fn trace_blank_cells_mean_no_feature() {
    let dir = tempdir().unwrap();
    let path = write(&dir, "trace.csv", "nx,ny\n0.4,0.5\n,\n0.41,0.52\n");
    let rows = load_trace_csv(&path).expect("load trace");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].feature(), Some((0.4, 0.5)));
    assert_eq!(rows[1].feature(), None);
    assert_eq!(rows[2].feature(), Some((0.41, 0.52)));
}

#[rstest]
fn trace_requires_headers() {
    let dir = tempdir().unwrap();
    let path = write(&dir, "trace.csv", "a,b\n0.4,0.5\n");
    let err = load_trace_csv(&path).expect_err("header mismatch");
    assert!(format!("{err}").contains("trace CSV must have headers 'nx,ny'"));
}
