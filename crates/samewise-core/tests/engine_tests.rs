use std::fs;
use std::path::Path;
use std::sync::Arc;

use samewise_core::{AppConfig, DupeEngine, DupeReport, Error, HashStore, SilentReporter, SqliteStore};
use tempfile::tempdir;

fn config_for(root: &Path) -> AppConfig {
    AppConfig {
        root_paths: vec![root.to_string_lossy().into_owned()],
        ..AppConfig::default()
    }
}

fn engine_for(root: &Path) -> DupeEngine {
    let store: Arc<dyn HashStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
    DupeEngine::with_store(config_for(root), store)
}

async fn run(engine: &DupeEngine) -> DupeReport {
    engine.find_duplicates(Arc::new(SilentReporter)).await.unwrap()
}

fn canonical(path: &Path) -> String {
    fs::canonicalize(path).unwrap().to_string_lossy().into_owned()
}

fn group_paths(report: &DupeReport) -> Vec<Vec<String>> {
    report
        .groups
        .iter()
        .map(|g| g.members.iter().map(|m| m.path.clone()).collect())
        .collect()
}

#[tokio::test]
async fn identical_files_form_one_group() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    fs::create_dir(&root).unwrap();
    fs::write(root.join("a.bin"), vec![0u8; 10_000]).unwrap();
    fs::write(root.join("b.bin"), vec![0u8; 10_000]).unwrap();

    let report = run(&engine_for(&root)).await;

    assert_eq!(report.groups.len(), 1);
    let group = &report.groups[0];
    assert_eq!(group.data_length, 10_000);
    assert_eq!(group.wasted_bytes, 10_000);
    let mut expected = vec![canonical(&root.join("a.bin")), canonical(&root.join("b.bin"))];
    expected.sort();
    assert_eq!(group_paths(&report)[0], expected);
}

#[tokio::test]
async fn tail_difference_never_enters_the_candidate_set() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    fs::create_dir(&root).unwrap();

    // Identical except for the very last byte: the tail window of the first
    // round already separates them.
    let a = vec![0u8; 100_000];
    let mut b = vec![0u8; 100_000];
    b[99_999] = 1;
    fs::write(root.join("a.bin"), &a).unwrap();
    fs::write(root.join("b.bin"), &b).unwrap();

    let report = run(&engine_for(&root)).await;
    assert!(report.groups.is_empty());
    assert_eq!(report.candidate_groups, 0);
}

#[tokio::test]
async fn middle_difference_never_enters_the_candidate_set() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    fs::create_dir(&root).unwrap();

    // One byte at offset 500 000 differs; the centre window of the first
    // round ([495904, 504096) at segment 8192) covers it.
    let a = vec![0u8; 1_000_000];
    let mut b = vec![0u8; 1_000_000];
    b[500_000] = 1;
    fs::write(root.join("a.bin"), &a).unwrap();
    fs::write(root.join("b.bin"), &b).unwrap();

    let report = run(&engine_for(&root)).await;
    assert!(report.groups.is_empty());
}

#[tokio::test]
async fn duplicate_directories_group_regardless_of_filenames() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    fs::create_dir_all(root.join("d1")).unwrap();
    fs::create_dir_all(root.join("d2")).unwrap();

    // Same contents under different names: directory fingerprints depend
    // only on the child fingerprint multiset.
    let content_x = vec![0xAAu8; 50_000];
    let content_y = vec![0xBBu8; 60_000];
    fs::write(root.join("d1/m.bin"), &content_x).unwrap();
    fs::write(root.join("d1/n.bin"), &content_y).unwrap();
    fs::write(root.join("d2/p.bin"), &content_x).unwrap();
    fs::write(root.join("d2/q.bin"), &content_y).unwrap();

    let report = run(&engine_for(&root)).await;

    // Three groups: the two directories, the x-content pair, the y-content
    // pair. Ordered by wasted bytes descending.
    assert_eq!(report.groups.len(), 3);
    assert_eq!(report.groups[0].data_length, 110_000);
    assert!(report.groups[0].members.iter().all(|m| m.is_directory));
    assert_eq!(report.groups[1].data_length, 60_000);
    assert_eq!(report.groups[2].data_length, 50_000);

    let dirs: Vec<String> = report.groups[0]
        .members
        .iter()
        .map(|m| m.path.clone())
        .collect();
    let mut expected = vec![canonical(&root.join("d1")), canonical(&root.join("d2"))];
    expected.sort();
    assert_eq!(dirs, expected);
}

#[tokio::test]
async fn second_run_reads_nothing_and_reports_the_same_groups() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    fs::create_dir(&root).unwrap();
    fs::write(root.join("a.bin"), vec![7u8; 200_000]).unwrap();
    fs::write(root.join("b.bin"), vec![7u8; 200_000]).unwrap();
    fs::write(root.join("c.bin"), vec![9u8; 100_000]).unwrap();

    let db_dir = tempdir().unwrap();
    let mut config = config_for(&root);
    config.cache_path = db_dir
        .path()
        .join("cache.db")
        .to_string_lossy()
        .into_owned();

    let first = DupeEngine::open(config.clone()).unwrap();
    let report1 = run(&first).await;
    assert_eq!(report1.groups.len(), 1);
    let (read1, to_read1) = first.counters().snapshot();
    assert!(to_read1 > 0);
    assert!(read1 > 0);
    drop(first);

    // Everything is cached: the second run schedules zero bytes of file I/O.
    let second = DupeEngine::open(config).unwrap();
    let report2 = run(&second).await;
    assert_eq!(second.counters().snapshot(), (0, 0));

    assert_eq!(group_paths(&report1), group_paths(&report2));
    assert_eq!(report1.total_wasted_bytes, report2.total_wasted_bytes);
}

#[tokio::test]
async fn unreadable_file_does_not_poison_its_directory() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    fs::create_dir_all(root.join("d")).unwrap();
    fs::write(root.join("d/ok.bin"), vec![1u8; 40_000]).unwrap();
    fs::write(root.join("d/ok_copy.bin"), vec![1u8; 40_000]).unwrap();
    fs::write(root.join("d/secret.bin"), vec![2u8; 40_000]).unwrap();
    fs::set_permissions(root.join("d/secret.bin"), fs::Permissions::from_mode(0o000)).unwrap();

    // A privileged process can open the file anyway; nothing to test then.
    if fs::File::open(root.join("d/secret.bin")).is_ok() {
        return;
    }

    let engine = engine_for(&root);
    let report = engine.find_duplicates(Arc::new(SilentReporter)).await.unwrap();

    assert_eq!(report.groups.len(), 1);
    for group in &report.groups {
        for member in &group.members {
            assert!(!member.path.contains("secret"));
        }
    }

    // The directory aggregate covers only the readable children.
    let d_record = engine.hash_path(&root.join("d"), 8192).await.unwrap();
    assert_eq!(d_record.data_length, 80_000);
}

#[tokio::test]
async fn configured_ignore_patterns_exclude_subtrees() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    fs::create_dir_all(root.join("skipme")).unwrap();
    fs::write(root.join("skipme/a.bin"), vec![3u8; 50_000]).unwrap();
    fs::write(root.join("skipme/b.bin"), vec![3u8; 50_000]).unwrap();
    fs::write(root.join("c.bin"), vec![4u8; 50_000]).unwrap();

    let store: Arc<dyn HashStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
    let mut config = config_for(&root);
    config.ignore_patterns = vec!["**/skipme/**".to_string()];
    let engine = DupeEngine::with_store(config, store);

    let report = run(&engine).await;
    assert!(report.groups.is_empty());
}

#[tokio::test]
async fn empty_files_are_exact_duplicates() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    fs::create_dir(&root).unwrap();
    fs::write(root.join("e1"), b"").unwrap();
    fs::write(root.join("e2"), b"").unwrap();

    let report = run(&engine_for(&root)).await;
    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups[0].data_length, 0);
    assert_eq!(report.groups[0].wasted_bytes, 0);
}

#[tokio::test]
async fn cancelled_engine_reports_cancelled() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    fs::create_dir(&root).unwrap();
    fs::write(root.join("a.bin"), vec![0u8; 1_000]).unwrap();

    let engine = engine_for(&root);
    engine
        .cancel_token()
        .store(true, std::sync::atomic::Ordering::Relaxed);

    let result = engine.find_duplicates(Arc::new(SilentReporter)).await;
    assert!(matches!(result, Err(Error::Cancelled)));
}

#[tokio::test]
async fn overlapping_roots_are_scanned_once() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    fs::create_dir_all(root.join("sub")).unwrap();
    fs::write(root.join("sub/a.bin"), vec![5u8; 30_000]).unwrap();
    fs::write(root.join("sub/b.bin"), vec![5u8; 30_000]).unwrap();

    let store: Arc<dyn HashStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
    let mut config = config_for(&root);
    config
        .root_paths
        .push(root.join("sub").to_string_lossy().into_owned());
    let engine = DupeEngine::with_store(config, store);

    let report = run(&engine).await;
    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups[0].members.len(), 2);
}
