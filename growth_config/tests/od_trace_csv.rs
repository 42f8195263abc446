use growth_config::load_od_trace_csv;
use std::fs;
use tempfile::tempdir;

#[test]
fn loads_well_formed_trace() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("trace.csv");
    fs::write(&path, "time_s,od\n0,0.41\n60, 0.415\n120,0.42\n").unwrap();
    let rows = load_od_trace_csv(&path).expect("trace loads");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1].time_s, 60);
    assert!((rows[1].od - 0.415).abs() < 1e-12);
}

#[test]
fn rejects_wrong_headers() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("trace.csv");
    fs::write(&path, "t,value\n0,0.41\n").unwrap();
    let err = load_od_trace_csv(&path).unwrap_err();
    assert!(err.to_string().contains("headers 'time_s,od'"));
}

#[test]
fn rejects_non_increasing_time() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("trace.csv");
    fs::write(&path, "time_s,od\n0,0.41\n60,0.42\n60,0.43\n").unwrap();
    let err = load_od_trace_csv(&path).unwrap_err();
    assert!(err.to_string().contains("strictly increasing"));
}

#[test]
fn rejects_empty_trace_and_bad_rows() {
    let dir = tempdir().unwrap();
    let empty = dir.path().join("empty.csv");
    fs::write(&empty, "time_s,od\n").unwrap();
    assert!(load_od_trace_csv(&empty).is_err());

    let bad = dir.path().join("bad.csv");
    fs::write(&bad, "time_s,od\n0,abc\n").unwrap();
    let err = load_od_trace_csv(&bad).unwrap_err();
    assert!(err.to_string().contains("invalid CSV row 2"));
}
