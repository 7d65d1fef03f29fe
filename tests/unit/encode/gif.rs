use std::fs::File;
use std::io::BufReader;

use image::AnimationDecoder as _;
use image::codecs::gif::GifDecoder;

use super::*;
use crate::foundation::core::Fps;

fn solid(v: u8) -> FrameRGBA {
    FrameRGBA {
        width: 4,
        height: 2,
        data: [v, v, v, 255].repeat(8),
        premultiplied: true,
    }
}

fn cfg() -> SinkConfig {
    SinkConfig {
        width: 4,
        height: 2,
        fps: Fps { num: 25, den: 1 },
    }
}

#[test]
fn writes_every_pushed_frame() {
    std::fs::create_dir_all("target/unit_gif").unwrap();
    let path = PathBuf::from(format!("target/unit_gif/three-{}.gif", std::process::id()));
    let mut sink = GifSink::new(GifSinkOpts::new(&path));
    sink.begin(cfg()).unwrap();
    for (i, v) in [0u8, 128, 255].into_iter().enumerate() {
        sink.push_frame(i as u64, &solid(v)).unwrap();
    }
    sink.end().unwrap();

    let decoder = GifDecoder::new(BufReader::new(File::open(&path).unwrap())).unwrap();
    let frames = decoder.into_frames().collect_frames().unwrap();
    assert_eq!(frames.len(), 3);
    let (numer, denom) = frames[0].delay().numer_denom_ms();
    assert_eq!(numer / denom, 40);
    assert_eq!(frames[2].buffer().dimensions(), (4, 2));
    let _ = std::fs::remove_file(&path);
}

#[test]
fn rejects_out_of_order_and_unstarted_use() {
    std::fs::create_dir_all("target/unit_gif").unwrap();
    let path = PathBuf::from(format!("target/unit_gif/order-{}.gif", std::process::id()));
    let mut sink = GifSink::new(GifSinkOpts::new(&path));
    assert!(sink.push_frame(0, &solid(0)).is_err());

    sink.begin(cfg()).unwrap();
    sink.push_frame(5, &solid(0)).unwrap();
    assert!(sink.push_frame(5, &solid(0)).is_err());
    assert!(sink.push_frame(6, &FrameRGBA { width: 1, ..solid(0) }).is_err());
    sink.end().unwrap();
    assert!(sink.end().is_err());
    let _ = std::fs::remove_file(&path);
}

#[test]
fn unwritable_output_fails_at_end_without_leaving_a_file() {
    let dir = PathBuf::from(format!("target/unit_gif/blocked-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let blocker = dir.join("not-a-dir");
    std::fs::write(&blocker, b"x").unwrap();
    let path = blocker.join("morph.gif");

    let mut sink = GifSink::new(GifSinkOpts::new(&path));
    sink.begin(cfg()).unwrap();
    sink.push_frame(0, &solid(10)).unwrap();
    assert!(sink.end().is_err());
    assert!(!path.exists());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn replaces_an_existing_animation_in_one_step() {
    let dir = PathBuf::from(format!("target/unit_gif/replace-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    let path = dir.join("morph.gif");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(&path, b"stale").unwrap();

    let mut sink = GifSink::new(GifSinkOpts::new(&path));
    sink.begin(cfg()).unwrap();
    sink.push_frame(0, &solid(200)).unwrap();
    // nothing is written before the trailer exists
    assert_eq!(std::fs::read(&path).unwrap(), b"stale");
    sink.end().unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert!(bytes.starts_with(b"GIF89a"));
    assert_eq!(bytes.last(), Some(&0x3B));
    let names: Vec<_> = std::fs::read_dir(&dir)
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(names.len(), 1, "{names:?}");
    let _ = std::fs::remove_dir_all(&dir);
}
