#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use tempfile::{TempDir, tempdir};

pub const RAW_HEADER: &str = concat!(
    "customer_id,store_name,transaction_date,aisle,product_name,quantity,",
    "unit_price,total_amount,discount_amount,final_amount,loyalty_points",
);

/// A small raw export exercising duplicates, fills, and every repair flag.
pub const SAMPLE_ROWS: &[&str] = &[
    "101,North,01-01-2024,Dairy,Milk,2,1.50,3.00,0,3.00,3",
    "101,North,01-01-2024,Dairy,Milk,2,1.50,3.00,0,3.00,3",
    "102,South,02-01-2024,Bakery,Bread,3,10.00,30.00,40.00,0.00,5",
    "103,,03-01-2024,,Eggs,1,,4.00,,4.00,1",
    "104,North,04-01-2024,Produce,Apples,5,9.40,47.00,0,47.00,-5",
    "101,South,15-02-2024,Dairy,Cheese,1,6.25,6.25,0.25,6.00,6",
];

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.file(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Writes a raw export with the standard header followed by `rows`.
    pub fn write_raw(&self, name: &str, rows: &[&str]) -> PathBuf {
        let mut contents = format!("{RAW_HEADER}\n");
        for row in rows {
            contents.push_str(row);
            contents.push('\n');
        }
        self.write(name, &contents)
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.file(name)).expect("read workspace file")
    }
}

pub fn bin() -> Command {
    Command::cargo_bin("pos-cleaner").expect("binary exists")
}

pub fn arg(path: &Path) -> &str {
    path.to_str().expect("utf-8 path")
}

/// Runs `clean` on the sample export, leaving `clean.csv` and `clean.idx` behind.
pub fn clean_sample(workspace: &TestWorkspace) -> PathBuf {
    let raw = workspace.write_raw("raw.csv", SAMPLE_ROWS);
    let output = workspace.file("clean.csv");
    let index = workspace.file("clean.idx");
    bin()
        .args(["clean", "-i", arg(&raw), "-o", arg(&output), "--index", arg(&index)])
        .assert()
        .success();
    output
}
