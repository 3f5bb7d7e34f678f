//! Dry runs must account for exactly the bytes a real run writes.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use vlsv_par::prelude::*;

fn attrs(n: &str, mesh: &str) -> Attributes {
    BTreeMap::from([
        ("name".to_string(), n.to_string()),
        ("mesh".to_string(), mesh.to_string()),
    ])
}

/// Three arrays per rank; returns (bytes_written, footer xml) on the
/// coordinator.
fn write_pass(
    w: &mut Writer<ThreadGroup>,
    path: &Path,
    group: &ThreadGroup,
    presize: Option<u64>,
) -> Option<(u64, String)> {
    let rank = group.rank();
    let ids: Vec<u64> = (0..(rank as u64 + 1) * 10).collect();
    let coords: Vec<f64> = vec![rank as f64; 3 * (rank + 2)];
    let time = [42.0f64];

    w.open(path, group).unwrap();
    if let Some(size) = presize {
        w.set_size(size).unwrap();
    }
    w.write_slice("MESH", &attrs("cells", "grid"), 1, &ids).unwrap();
    w.write_slice("VARIABLE", &attrs("coords", "grid"), 3, &coords)
        .unwrap();
    let local_time: &[f64] = if rank == 0 { &time } else { &[] };
    w.write_slice("PARAMETER", &attrs("time", "grid"), 1, local_time)
        .unwrap();
    let footer = w.footer().map(FooterIndex::to_xml);
    w.close().unwrap();
    footer.map(|xml| (w.bytes_written(), xml))
}

#[test]
fn dry_run_matches_real_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sized.vlsv");

    let dry = ThreadGroup::run(3, |group| {
        let mut w: Writer<ThreadGroup> = Writer::new(WriterConfig::default());
        w.start_dry_run().unwrap();
        let out = write_pass(&mut w, &path, &group, None);
        w.end_dry_run().unwrap();
        out
    });
    assert!(!path.exists());
    let (dry_bytes, dry_footer) = dry[0].clone().unwrap();

    let real = ThreadGroup::run(3, |group| {
        let mut w: Writer<ThreadGroup> = Writer::new(WriterConfig::default());
        write_pass(&mut w, &path, &group, Some(dry_bytes))
    });
    let (real_bytes, real_footer) = real[0].clone().unwrap();

    assert_eq!(dry_bytes, real_bytes);
    assert_eq!(dry_footer, real_footer);
    assert_eq!(fs::metadata(&path).unwrap().len(), real_bytes);

    let layout = FileLayout::read(&path).unwrap();
    let names: Vec<&str> = layout
        .footer
        .records()
        .iter()
        .map(|r| r.attribute("name").unwrap())
        .collect();
    assert_eq!(names, vec!["cells", "coords", "time"]);
    let time = FileLayout::read_array(&path, layout.footer.find("PARAMETER", "time").unwrap())
        .unwrap();
    assert_eq!(time, 42.0f64.to_ne_bytes());
}

#[test]
fn set_size_presizes_before_payload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("presized.vlsv");
    ThreadGroup::run(2, |group| {
        let mut w: Writer<ThreadGroup> = Writer::new(WriterConfig::default());
        w.open(&path, &group).unwrap();
        w.set_size(4096).unwrap();
        group.barrier();
        assert_eq!(fs::metadata(&path).unwrap().len(), 4096);
        w.close().unwrap();
    });
    // The footer follows the payload, not the pre-sized end.
    let layout = FileLayout::read(&path).unwrap();
    assert_eq!(layout.header.footer_offset, 16);
    assert!(layout.footer.is_empty());
    assert_eq!(fs::metadata(&path).unwrap().len(), 4096);
}
