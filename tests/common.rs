//! tests/common.rs
//! Common constants and helpers shared across test files

use std::fs;
use std::path::{Path, PathBuf};

/// 32-byte key used by every integration test
#[allow(dead_code)] // Used across multiple test files
pub const TEST_KEY: &[u8; 32] = b"0123456789abcdef0123456789abcdef";

#[allow(dead_code)] // Used across multiple test files
pub const HELLO: &[u8] = b"hello world";

/// Write `contents` to `dir/name` and return the path
#[allow(dead_code)] // Used across multiple test files
pub fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

/// `count` files named `f{i}.txt` with distinct contents
#[allow(dead_code)] // Used across multiple test files
pub fn write_files(dir: &Path, count: usize) -> Vec<(PathBuf, Vec<u8>)> {
    (0..count)
        .map(|i| {
            let contents = format!("file number {i} ").repeat(i + 1).into_bytes();
            (write_file(dir, &format!("f{i}.txt"), &contents), contents)
        })
        .collect()
}
