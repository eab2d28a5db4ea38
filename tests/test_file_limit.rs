// Copyright 2024 FastLabs Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fs;
use std::io::Write;

use logforth_loader::append::RotatingFileWriter;
use logforth_loader::retention::Retention;
use logforth_loader::rotation::Rotation;
use tempfile::TempDir;

#[test]
fn test_file_count_limit() {
    let temp_dir = TempDir::new().expect("failed to create a temporary directory");
    let max_files = 10;
    let max_size = 100;

    let mut writer = RotatingFileWriter::builder(temp_dir.path().join("test_prefix.log"))
        .rotation(Some(Rotation::size(max_size)))
        .retention(Some(Retention::Files(max_files)))
        .build()
        .unwrap();

    // every entry is larger than the limit, so each write after the first rotates
    for i in 0..50 {
        let data = format!("Log entry {}: {}\n", i, "A".repeat(100));
        writer.write_all(data.as_bytes()).unwrap();
        writer.flush().unwrap();
    }

    let files = fs::read_dir(temp_dir.path())
        .unwrap()
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let filename = entry.file_name().to_str()?.to_string();
            filename.starts_with("test_prefix").then_some(filename)
        })
        .collect::<Vec<_>>();

    // the active file plus the retained archives
    assert_eq!(
        files.len(),
        max_files + 1,
        "Expected {} files, but found {}: {:?}",
        max_files + 1,
        files.len(),
        files
    );

    let current = fs::read_to_string(temp_dir.path().join("test_prefix.log")).unwrap();
    assert!(current.starts_with("Log entry 49:"), "{current}");
}
