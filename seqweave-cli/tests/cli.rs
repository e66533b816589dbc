use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const GENOME: &str = "GCACGAAACTTGTTGGCCCAGTGTGAATCGTAGGCTACTA";

fn seqweave(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_seqweave"))
        .current_dir(dir)
        .args(args)
        .arg("--quiet")
        .output()
        .expect("failed to run seqweave")
}

fn write(dir: &TempDir, name: &str, content: &str) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path.display().to_string()
}

#[test]
fn test_align_writes_fasta_rows() {
    let dir = TempDir::new().unwrap();
    let a = write(&dir, "a.fa", ">a\nGATTACA\n");
    let b = write(&dir, "b.fa", ">b\nGATCACA\n");
    let output = seqweave(dir.path(), &["align", "--global", &a, &b]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let text = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with(">a 1-7 score="));
    assert_eq!(lines[1], "GATTACA");
    assert_eq!(lines[3], "GATCACA");
}

#[test]
fn test_mum_json_output() {
    let dir = TempDir::new().unwrap();
    let reference = write(&dir, "ref.fa", ">ref\nAAAGATCG\n");
    let query = write(&dir, "qry.fa", ">q\nGATCGAAA\n");
    let out = dir.path().join("mums.json");
    let output = seqweave(
        dir.path(),
        &["mum", &reference, &query, "-l", "4", "--format", "json", "-o", out.to_str().unwrap()],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    let anchors = value["q"]["ref"].as_array().unwrap();
    assert_eq!(anchors.len(), 1);
    assert_eq!(anchors[0]["reference_start"], 3);
    assert_eq!(anchors[0]["length"], 5);
}

#[test]
fn test_nucmer_uses_every_reference() {
    let dir = TempDir::new().unwrap();
    let reference = write(
        &dir,
        "ref.fa",
        &format!(">chr1\n{}\n>chr2\n{}\n", &GENOME[..20], &GENOME[20..]),
    );
    let query = write(&dir, "qry.fa", &format!(">q\n{}\n", &GENOME[22..38]));
    let output = seqweave(dir.path(), &["nucmer", &reference, &query, "-l", "8"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let text = String::from_utf8(output.stdout).unwrap();
    let headers: Vec<&str> = text.lines().filter(|l| l.starts_with('>')).collect();
    assert_eq!(headers.len(), 2);
    assert!(headers[0].starts_with(">chr2 1-20 "));
    assert!(headers[1].starts_with(">q 1-16 "));
}

#[test]
fn test_assemble_with_config_file() {
    let dir = TempDir::new().unwrap();
    let mut reads = String::new();
    for (i, start) in (0..=GENOME.len() - 16).step_by(2).enumerate() {
        reads.push_str(&format!(">read{}\n{}\n", i, &GENOME[start..start + 16]));
    }
    let reads = write(&dir, "reads.fa", &reads);
    write(&dir, "seqweave.toml", "[assembly]\nkmer_length = 7\n");

    let output = seqweave(dir.path(), &["assemble", &reads]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let text = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], ">contig_1");
    assert_eq!(lines[1].len(), GENOME.len());
}

#[test]
fn test_init_config_refuses_to_overwrite() {
    let dir = TempDir::new().unwrap();
    let output = seqweave(dir.path(), &["init-config"]);
    assert!(output.status.success());
    let written = std::fs::read_to_string(dir.path().join("seqweave.toml")).unwrap();
    assert!(written.contains("[assembly]"));
    assert!(written.contains("[nucmer.scoring]"));

    let output = seqweave(dir.path(), &["init-config"]);
    assert!(!output.status.success());
}

#[test]
fn test_bad_input_fails() {
    let dir = TempDir::new().unwrap();
    let reads = write(&dir, "reads.fa", ">p\nMKVLE\n");
    let output = seqweave(dir.path(), &["assemble", &reads]);
    assert!(!output.status.success());
}
