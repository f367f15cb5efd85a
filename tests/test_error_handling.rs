/// Error handling tests for malformed and invalid inputs
///
/// Every failure must surface as an error and leave no composite file behind
/// that could pass for a complete one.
mod test_utils;

use anyhow::Result;
use std::fs;
use std::io::Cursor;
use std::process::Command;
use tempfile::TempDir;

use hic_compact::chrom_pairs::ChromosomePairIndex;
use hic_compact::codec::DeflateCodec;
use hic_compact::config::CompactionConfig;
use hic_compact::genome::GenomeCatalog;
use hic_compact::pair_source::MergedNoDupsSource;
use hic_compact::pipeline;
use hic_compact::positional_index::{ByteRange, PositionalIndex};
use hic_compact::CompactError;
use test_utils::{catalog, write_pair_file, Contact};

#[test]
fn test_positional_index_needs_four_fields() {
    let err = PositionalIndex::from_reader(Cursor::new("1-1,0,0,10\n1-2,0,10\n")).unwrap_err();
    assert!(matches!(err, CompactError::Format(_)), "got {err}");
    assert!(err.to_string().contains("line 2"));
}

#[test]
fn test_positional_index_numbers() {
    let err = PositionalIndex::from_reader(Cursor::new("1-1,0,abc,10\n")).unwrap_err();
    assert!(matches!(err, CompactError::Format(_)));
}

#[test]
fn test_unknown_names() {
    let genome = catalog(&[("1", 100)]);
    assert!(matches!(genome.index_of("chrZ"), Err(CompactError::NotFound(_))));
    let pairs = ChromosomePairIndex::new(&genome);
    assert!(matches!(pairs.id_of("1-Z"), Err(CompactError::NotFound(_))));
}

#[test]
fn test_invalid_configuration() {
    let genome = catalog(&[("1", 100)]);
    let dir = TempDir::new().unwrap();
    let source = MergedNoDupsSource::new(dir.path().join("none.txt"), &genome);
    let output = dir.path().join("out.hic");

    let bad = [
        CompactionConfig {
            threads: 0,
            ..CompactionConfig::default()
        },
        CompactionConfig {
            bp_resolutions: Vec::new(),
            ..CompactionConfig::default()
        },
        CompactionConfig {
            bp_resolutions: vec![0],
            ..CompactionConfig::default()
        },
        CompactionConfig {
            block_capacity: 0,
            ..CompactionConfig::default()
        },
        CompactionConfig {
            frag_resolutions: vec![1],
            ..CompactionConfig::default()
        },
    ];
    for config in &bad {
        let result = pipeline::run(
            config,
            &genome,
            &PositionalIndex::new(),
            &source,
            &DeflateCodec::default(),
            &output,
            dir.path(),
        );
        assert!(matches!(result, Err(CompactError::Config(_))), "{config:?} accepted");
    }
    assert!(!output.exists());
}

#[test]
fn test_malformed_pair_line_aborts() {
    let dir = TempDir::new().unwrap();
    let genome = catalog(&[("1", 1000), ("2", 1000)]);
    let contacts: Vec<Contact> = (0..40).map(|i| Contact::new("1", i * 10, "2", i * 5)).collect();
    let (pairs, _, mut index) = write_pair_file(dir.path(), &genome, &contacts, 8);

    // A chunk pointing into the middle of a line splits its fields
    index.push("1-1", ByteRange::new(3, 20));
    let output = dir.path().join("out.hic");
    let source = MergedNoDupsSource::new(&pairs, &genome);
    let config = CompactionConfig {
        threads: 3,
        bp_resolutions: vec![100],
        ..CompactionConfig::default()
    };

    let result = pipeline::run(&config, &genome, &index, &source, &DeflateCodec::default(), &output, dir.path());
    assert!(
        matches!(result, Err(CompactError::Format(_))),
        "expected a format error, got {result:?}"
    );
    assert!(!output.exists());
}

#[test]
fn test_missing_pair_file() {
    let dir = TempDir::new().unwrap();
    let genome = catalog(&[("1", 1000)]);
    let mut index = PositionalIndex::new();
    index.push("1-1", ByteRange::new(0, 10));
    let source = MergedNoDupsSource::new(dir.path().join("missing.txt"), &genome);
    let config = CompactionConfig {
        threads: 2,
        bp_resolutions: vec![100],
        ..CompactionConfig::default()
    };

    let result = pipeline::run(
        &config,
        &genome,
        &index,
        &source,
        &DeflateCodec::default(),
        &dir.path().join("out.hic"),
        dir.path(),
    );
    assert!(matches!(result, Err(CompactError::Io(_))));
}

#[test]
fn test_chrom_sizes_format() -> Result<()> {
    let dir = TempDir::new()?;
    let sizes = dir.path().join("genome.sizes");
    fs::write(&sizes, "chr1\t1000\nchr2 notanumber\n")?;
    assert!(matches!(
        GenomeCatalog::from_chrom_sizes(&sizes),
        Err(CompactError::Format(_))
    ));
    Ok(())
}

/// The binary reports the failing input and exits non-zero
#[test]
fn test_cli_reports_malformed_index() -> Result<()> {
    let dir = TempDir::new()?;
    let sizes = dir.path().join("genome.sizes");
    let pairs = dir.path().join("pairs.txt");
    let index = dir.path().join("pairs.index");
    let output = dir.path().join("out.hic");
    fs::write(&sizes, "1\t1000\n")?;
    fs::write(&pairs, "0 1 10 0 16 1 20 1\n")?;
    fs::write(&index, "1-1,0,0\n")?;

    let result = Command::new(env!("CARGO_BIN_EXE_hic-compact"))
        .arg(&pairs)
        .arg(&output)
        .arg("--genome")
        .arg(&sizes)
        .arg("--index")
        .arg(&index)
        .arg("--quiet")
        .output()?;

    assert!(!result.status.success(), "malformed index should fail");
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("positional index"), "got: {stderr}");
    assert!(!output.exists());
    Ok(())
}

#[test]
fn test_cli_compacts_small_input() -> Result<()> {
    let dir = TempDir::new()?;
    let sizes = dir.path().join("genome.sizes");
    let pairs = dir.path().join("pairs.txt");
    let index = dir.path().join("pairs.index");
    let output = dir.path().join("out.hic");
    fs::write(&sizes, "1\t1000\n2\t500\n")?;
    let line = "0 1 10 0 16 1 20 1\n";
    fs::write(&pairs, line)?;
    fs::write(&index, format!("1-1,0,0,{}\n", line.len()))?;

    let result = Command::new(env!("CARGO_BIN_EXE_hic-compact"))
        .arg(&pairs)
        .arg(&output)
        .args(["-g", sizes.to_str().unwrap()])
        .args(["-i", index.to_str().unwrap()])
        .args(["-r", "100,10", "-t", "2", "--tmp-dir", dir.path().to_str().unwrap()])
        .output()?;

    assert!(result.status.success(), "{}", String::from_utf8_lossy(&result.stderr));
    assert!(output.exists());
    Ok(())
}
