use assert_cmd::prelude::*; // Add methods on commands
use predicates::prelude::*;
use std::path::{Path,PathBuf};
use std::process::Command; // Run programs
use tempfile;
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

/// name of the decoded output for a given input name
fn decoded_name(name: &str) -> String {
    let path = Path::new(name);
    let mut ans = path.file_stem().unwrap().to_string_lossy().to_string();
    ans.push_str("_dec");
    if let Some(ext) = path.extension() {
        ans.push('.');
        ans.push_str(&ext.to_string_lossy());
    }
    ans
}

/// encode then decode in a temp dir, returning the decoded path
fn round_trip(code: &str,name: &str,content: &[u8],dir: &tempfile::TempDir) -> Result<PathBuf,Box<dyn std::error::Error>> {
    let in_path = dir.path().join(name);
    std::fs::write(&in_path,content)?;
    let mut cmd = Command::cargo_bin("entropycoder")?;
    cmd.arg(code)
        .arg("encode")
        .arg(&in_path)
        .assert()
        .success();
    let enc_path = dir.path().join([name,".enc"].concat());
    let mut cmd = Command::cargo_bin("entropycoder")?;
    cmd.arg(code)
        .arg("decode")
        .arg(&enc_path)
        .assert()
        .success();
    Ok(dir.path().join(decoded_name(name)))
}

fn lossless_test(code: &str,name: &str,content: &[u8]) -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let out_path = round_trip(code,name,content,&temp_dir)?;
    match std::fs::read(out_path) {
        Ok(v) => {
            assert_eq!(v,content);
        },
        _ => panic!("unable to compare output with input")
    }
    Ok(())
}

const SAMPLE_TEXT: &[u8] = "What, has this thing appear'd again to-night?\n\
We do it wrong, being so majestical,\n\
To offer it the show of violence.\n".as_bytes();

fn sample_pgm() -> Vec<u8> {
    let mut image = entropycoder::pgm::Image::new(16,16);
    for y in 0..16 {
        for x in 0..16 {
            image.set(y,x,((x * 9 + y * 5) % 256) as i32);
        }
    }
    entropycoder::pgm::write_pgm(&image)
}

#[test]
fn huffman_round_trip() -> STDRESULT {
    lossless_test("huffman","sample.txt",SAMPLE_TEXT)
}

#[test]
fn rice_round_trip() -> STDRESULT {
    lossless_test("rice","sample.txt",SAMPLE_TEXT)
}

#[test]
fn arithmetic_round_trip() -> STDRESULT {
    lossless_test("arithmetic","sample.txt",SAMPLE_TEXT)
}

#[test]
fn sfe_round_trip() -> STDRESULT {
    // the closed-form coder only handles short messages
    lossless_test("sfe","short.txt",b"banana band")
}

#[test]
fn predictive_round_trip() -> STDRESULT {
    lossless_test("predictive","sample.pgm",&sample_pgm())
}

#[test]
fn transform_is_close() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let content = sample_pgm();
    let out_path = round_trip("transform","sample.pgm",&content,&temp_dir)?;
    let restored = entropycoder::pgm::read_pgm(&std::fs::read(out_path)?)?;
    let original = entropycoder::pgm::read_pgm(&content)?;
    assert_eq!(restored.width,original.width);
    assert_eq!(restored.height,original.height);
    Ok(())
}

#[test]
fn refuses_to_overwrite() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = temp_dir.path().join("sample.txt");
    std::fs::write(&in_path,SAMPLE_TEXT)?;
    let mut cmd = Command::cargo_bin("entropycoder")?;
    cmd.arg("huffman").arg("encode").arg(&in_path).assert().success();
    let mut cmd = Command::cargo_bin("entropycoder")?;
    cmd.arg("huffman")
        .arg("encode")
        .arg(&in_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    Ok(())
}

#[test]
fn rejects_wrong_extension() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = temp_dir.path().join("sample.txt");
    std::fs::write(&in_path,SAMPLE_TEXT)?;
    let mut cmd = Command::cargo_bin("entropycoder")?;
    cmd.arg("huffman")
        .arg("decode")
        .arg(&in_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains(".enc"));
    Ok(())
}
