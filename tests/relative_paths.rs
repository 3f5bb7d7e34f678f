//! Relative file names resolve against the working directory at `open`.
//! Both tests change the process-wide cwd, so they run one at a time.

use serial_test::serial;
use std::collections::BTreeMap;
use std::env;
use vlsv_par::prelude::*;

struct CwdGuard(std::path::PathBuf);

impl CwdGuard {
    fn enter(dir: &std::path::Path) -> Self {
        let old = env::current_dir().unwrap();
        env::set_current_dir(dir).unwrap();
        CwdGuard(old)
    }
}

impl Drop for CwdGuard {
    fn drop(&mut self) {
        let _ = env::set_current_dir(&self.0);
    }
}

#[test]
#[serial]
fn relative_name_lands_in_cwd() {
    let dir = tempfile::tempdir().unwrap();
    let _cwd = CwdGuard::enter(dir.path());

    ThreadGroup::run(2, |group| {
        let mut w: Writer<ThreadGroup> = Writer::new(WriterConfig::default());
        w.open("rel.vlsv", &group).unwrap();
        let attrs = BTreeMap::from([("name".to_string(), "r".to_string())]);
        w.write_slice("VARIABLE", &attrs, 1, &[group.rank() as i16]).unwrap();
        w.close().unwrap();
    });

    let layout = FileLayout::read(dir.path().join("rel.vlsv")).unwrap();
    assert_eq!(layout.footer.records()[0].array_size().unwrap(), 2);
}

#[test]
#[serial]
fn reopening_same_relative_name_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let _cwd = CwdGuard::enter(dir.path());

    let mut w: Writer<SoloGroup> = Writer::new(WriterConfig::default());
    w.open("same.vlsv", &SoloGroup).unwrap();
    let attrs = BTreeMap::from([("name".to_string(), "x".to_string())]);
    w.write_slice("VARIABLE", &attrs, 1, &[7u8]).unwrap();
    w.open("same.vlsv", &SoloGroup).unwrap();
    assert_eq!(w.running_offset(), 17);
    w.close().unwrap();
    assert_eq!(FileLayout::read("same.vlsv").unwrap().footer.len(), 1);
}
