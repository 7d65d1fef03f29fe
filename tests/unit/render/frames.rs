use super::*;

fn scratch(name: &str) -> FrameDirectory {
    let root = PathBuf::from("target")
        .join("unit_frames")
        .join(format!("{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&root);
    FrameDirectory::new(root)
}

fn tiny(v: u8) -> FrameRGBA {
    FrameRGBA {
        width: 2,
        height: 1,
        data: vec![v, v, v, 255, 255, 255, 255, 255],
        premultiplied: true,
    }
}

#[test]
fn names_parse_strictly() {
    assert_eq!(parse_frame_name("0.png"), Some(0));
    assert_eq!(parse_frame_name("239.png"), Some(239));
    assert_eq!(parse_frame_name("007.png"), None);
    assert_eq!(parse_frame_name(".3.png.tmp"), None);
    assert_eq!(parse_frame_name("a.png"), None);
    assert_eq!(parse_frame_name("3.jpg"), None);
    assert_eq!(parse_marker_name("worker-4.done"), Some(4));
    assert_eq!(parse_marker_name("worker-.done"), None);
    assert!(is_temp_name(".3.png.tmp"));
    assert!(is_temp_name(".worker-2.done.tmp"));
    assert!(!is_temp_name(".gitignore"));
    assert!(!is_temp_name(".notes.tmp"));
}

#[test]
fn frames_and_markers_are_listed() {
    let dir = scratch("listing");
    dir.prepare().unwrap();
    for g in [4, 0, 2] {
        dir.write_frame(g, &tiny(g as u8)).unwrap();
    }
    dir.mark_worker_done(0, 3).unwrap();
    dir.mark_worker_done(5, 0).unwrap();

    assert_eq!(dir.list_frames().unwrap().into_iter().collect::<Vec<_>>(), vec![0, 2, 4]);
    let markers = dir.completed_workers().unwrap();
    assert_eq!(markers.get(&0), Some(&3));
    assert_eq!(markers.get(&5), Some(&0));
    assert_eq!(markers.len(), 2);

    let back = dir.read_frame(2).unwrap();
    assert_eq!(back.data, tiny(2).data);
    assert!(!dir.root().join(".2.png.tmp").exists());
}

#[test]
fn prepare_clears_only_run_artifacts() {
    let dir = scratch("prepare");
    dir.prepare().unwrap();
    dir.write_frame(1, &tiny(0)).unwrap();
    dir.mark_worker_done(1, 1).unwrap();
    std::fs::write(dir.root().join(".9.png.tmp"), b"partial").unwrap();
    std::fs::write(dir.root().join("notes.txt"), b"keep me").unwrap();

    dir.prepare().unwrap();
    assert!(dir.list_frames().unwrap().is_empty());
    assert!(dir.completed_workers().unwrap().is_empty());
    assert!(!dir.root().join(".9.png.tmp").exists());
    assert!(dir.root().join("notes.txt").exists());

    dir.remove().unwrap();
    assert!(!dir.root().exists());
    dir.remove().unwrap();
}

#[test]
fn prepare_keeps_unrelated_dotfiles() {
    let dir = scratch("dotfiles");
    dir.prepare().unwrap();
    std::fs::write(dir.root().join(".gitignore"), b"*\n").unwrap();
    std::fs::write(dir.root().join(".env"), b"A=1\n").unwrap();
    std::fs::write(dir.root().join(".worker-3.done.tmp"), b"7").unwrap();

    dir.prepare().unwrap();
    assert!(dir.root().join(".gitignore").exists());
    assert!(dir.root().join(".env").exists());
    assert!(!dir.root().join(".worker-3.done.tmp").exists());
}
