#![allow(dead_code)]

use ledgerkv::{FlushPolicy, Store};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct TestEnv {
    // Keeps the directory alive for the duration of the test.
    pub _dir: TempDir,
    pub path: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.wal");
        Self { _dir: dir, path }
    }

    pub fn open(&self, policy: FlushPolicy) -> Store<Value> {
        Store::open(&self.path, policy).unwrap()
    }

    pub fn contents(&self) -> String {
        read_log(&self.path)
    }

    pub fn record_count(&self) -> usize {
        self.contents().lines().count()
    }
}

pub fn read_log(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_default()
}
