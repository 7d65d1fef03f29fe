use std::io::Write as _;

use super::*;

fn scratch(name: &str) -> PathBuf {
    let dir = PathBuf::from("target")
        .join("unit_fsio")
        .join(format!("{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

#[test]
fn creates_missing_parents_and_writes() {
    let path = scratch("nested").join("a").join("b.txt");
    replace_atomically(&path, |w| {
        w.write_all(b"hello")?;
        Ok(())
    })
    .unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    assert!(!temp_sibling(&path).exists());
}

#[test]
fn failed_write_keeps_the_previous_file() {
    let dir = scratch("failed");
    let path = dir.join("keep.txt");
    replace_atomically(&path, |w| {
        w.write_all(b"v1")?;
        Ok(())
    })
    .unwrap();

    let err = replace_atomically(&path, |w| {
        w.write_all(b"half")?;
        anyhow::bail!("encoder gave up")
    })
    .unwrap_err();
    assert!(err.to_string().contains("encoder gave up"), "{err}");
    assert_eq!(std::fs::read(&path).unwrap(), b"v1");
    assert!(!temp_sibling(&path).exists());
}

#[test]
fn unwritable_parent_is_an_error() {
    let dir = scratch("blocked");
    std::fs::create_dir_all(&dir).unwrap();
    let blocker = dir.join("file");
    std::fs::write(&blocker, b"x").unwrap();

    assert!(ensure_parent_dir(&blocker.join("out.gif")).is_err());
    assert!(replace_atomically(&blocker.join("out.gif"), |_| Ok(())).is_err());
    ensure_parent_dir(Path::new("bare.txt")).unwrap();
}

#[test]
fn temp_sibling_is_hidden_next_to_the_target() {
    let tmp = temp_sibling(Path::new("out/morph.gif"));
    assert_eq!(tmp.parent(), Some(Path::new("out")));
    let name = tmp.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with(".morph.gif.tmp-"), "{name}");
}
