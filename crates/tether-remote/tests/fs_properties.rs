//! Filesystem properties, with a local shell standing in for the device

mod common;

use std::sync::Arc;

use common::ScriptedExecutor;
use tempfile::TempDir;
use tether_exec::LocalExecutor;
use tether_remote::{CommandDispatcher, RemoteFs, escape};

fn loopback() -> (TempDir, RemoteFs) {
    let dir = tempfile::tempdir().unwrap();
    let fs = RemoteFs::new(CommandDispatcher::new(Arc::new(LocalExecutor::new())));
    (dir, fs)
}

fn path_in(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).display().to_string()
}

async fn names(fs: &RemoteFs, path: &str) -> Vec<String> {
    fs.dir_list(path, false)
        .await
        .unwrap()
        .into_iter()
        .flatten()
        .collect()
}

#[tokio::test]
async fn test_file_create_exists_delete() {
    let (dir, fs) = loopback();
    let file = path_in(&dir, "notes.txt");

    assert!(!fs.file_exists(&file).await.unwrap());
    fs.file_create(&file).await.unwrap();
    assert!(fs.file_exists(&file).await.unwrap());

    // second create is a no-op
    fs.file_create(&file).await.unwrap();

    fs.file_delete(&file).await.unwrap();
    assert!(!fs.file_exists(&file).await.unwrap());

    // deleting again is a no-op
    fs.file_delete(&file).await.unwrap();
}

#[tokio::test]
async fn test_dir_create_exists_delete() {
    let (dir, fs) = loopback();
    let sub = path_in(&dir, "cache dir");

    assert!(!fs.dir_exists(&sub).await.unwrap());
    fs.dir_create(&sub).await.unwrap();
    fs.dir_create(&sub).await.unwrap();
    assert!(fs.dir_exists(&sub).await.unwrap());
    assert!(!fs.file_exists(&sub).await.unwrap());

    fs.dir_delete(&sub, false).await.unwrap();
    assert!(!fs.dir_exists(&sub).await.unwrap());

    fs.dir_delete(&sub, true).await.unwrap();
}

#[tokio::test]
async fn test_list_missing_dir_is_empty() {
    let (dir, fs) = loopback();
    let missing = path_in(&dir, "never-created");

    assert!(fs.dir_list(&missing, false).await.unwrap().is_none());
    assert!(fs.dir_list(&missing, true).await.unwrap().is_none());
    assert!(names(&fs, &missing).await.is_empty());
}

#[tokio::test]
async fn test_reset_from_any_state() {
    let (dir, fs) = loopback();
    let target = path_in(&dir, "workdir");

    // missing
    fs.dir_reset(&target).await.unwrap();
    assert!(fs.dir_exists(&target).await.unwrap());
    assert!(names(&fs, &target).await.is_empty());

    // non-empty
    fs.file_create(&format!("{target}/a")).await.unwrap();
    fs.dir_create(&format!("{target}/nested")).await.unwrap();
    fs.file_create(&format!("{target}/nested/b")).await.unwrap();
    assert_eq!(names(&fs, &target).await.len(), 2);
    fs.dir_reset(&target).await.unwrap();
    assert!(fs.dir_exists(&target).await.unwrap());
    assert!(names(&fs, &target).await.is_empty());

    // already empty
    fs.dir_reset(&target).await.unwrap();
    assert!(names(&fs, &target).await.is_empty());
}

#[tokio::test]
async fn test_pre_escaped_name_round_trip() {
    let (dir, fs) = loopback();
    let raw = path_in(&dir, "O'Brien File.txt");
    let token = escape(&raw);

    fs.file_create(&token).await.unwrap();
    assert!(fs.file_exists(&token).await.unwrap());
    assert!(fs.file_exists(&raw).await.unwrap());

    let listing = names(&fs, &dir.path().display().to_string()).await;
    assert_eq!(listing, vec!["O'Brien File.txt".to_string()]);
}

#[tokio::test]
async fn test_recursive_listing_includes_nested() {
    let (dir, fs) = loopback();
    let root = dir.path().display().to_string();
    fs.dir_create(&format!("{root}/sub")).await.unwrap();
    fs.file_create(&format!("{root}/sub/deep.db")).await.unwrap();

    let entries: Vec<String> = fs
        .dir_list(&root, true)
        .await
        .unwrap()
        .unwrap()
        .collect();
    assert!(entries.contains(&"deep.db".to_string()));
    assert!(entries.contains(&".".to_string()));
}

#[tokio::test]
async fn test_copy_and_move() {
    let (dir, fs) = loopback();
    let src = path_in(&dir, "src file");
    let copy = path_in(&dir, "copy file");
    let moved = path_in(&dir, "moved file");

    fs.write_file(&src, "payload").await.unwrap();
    fs.file_copy(&src, &copy).await.unwrap();
    fs.file_move(&copy, &moved).await.unwrap();

    assert!(fs.file_exists(&src).await.unwrap());
    assert!(!fs.file_exists(&copy).await.unwrap());
    assert_eq!(fs.read_file(&moved, None).await.unwrap(), "payload");
}

#[tokio::test]
async fn test_failed_mutation_is_an_error() {
    let (dir, fs) = loopback();
    let orphan = path_in(&dir, "missing-parent/child");
    assert!(fs.dir_create(&orphan).await.is_err());
}

#[tokio::test]
async fn test_hyphen_paths_are_operands() {
    let executor = Arc::new(ScriptedExecutor::new().reply("if [ -f ./-rf ]", "yes"));
    let fs = RemoteFs::new(CommandDispatcher::new(executor.clone()));

    fs.file_delete("-rf").await.unwrap();
    fs.file_copy("-a", "--target").await.unwrap();
    fs.dir_delete("-x y", true).await.unwrap();

    assert_eq!(
        executor.recorded(),
        vec![
            "if [ -f ./-rf ]; then echo \"yes\"; else echo \"no\"; fi",
            "rm ./-rf 2> /dev/null",
            "cp ./-a ./--target",
            "rm -rf './-x y' 2> /dev/null",
        ]
    );
}

#[tokio::test]
async fn test_command_text() {
    let executor = Arc::new(
        ScriptedExecutor::new()
            .reply("if [ -d /var/mobile ]", "yes")
            .reply("ls", "Documents\nLibrary\n"),
    );
    let fs = RemoteFs::new(CommandDispatcher::new(executor.clone()));

    let entries: Vec<String> = fs
        .dir_list("/var/mobile", false)
        .await
        .unwrap()
        .unwrap()
        .collect();
    assert_eq!(entries, vec!["Documents", "Library"]);

    fs.file_create("/tmp/a b").await.unwrap();
    fs.dir_delete("/tmp/gone", true).await.unwrap();
    fs.write_file("/tmp/w", "say \"hi\"").await.unwrap();

    assert_eq!(
        executor.recorded(),
        vec![
            "if [ -d /var/mobile ]; then echo \"yes\"; else echo \"no\"; fi",
            "ls  /var/mobile",
            "if [ -f '/tmp/a b' ]; then echo \"yes\"; else echo \"no\"; fi",
            "touch '/tmp/a b'",
            "rm -rf /tmp/gone 2> /dev/null",
            "echo \"say \\\"hi\\\"\" > /tmp/w",
        ]
    );
}
