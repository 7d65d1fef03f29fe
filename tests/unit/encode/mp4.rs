use super::*;
use crate::foundation::core::Fps;

fn ffmpeg_available() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}

fn paper(width: u32, height: u32) -> FrameRGBA {
    FrameRGBA {
        width,
        height,
        data: [250, 240, 230, 255].repeat((width * height) as usize),
        premultiplied: true,
    }
}

#[test]
fn opaque_frames_lose_their_alpha() {
    let src = [1u8, 2, 3, 255, 4, 5, 6, 255];
    let mut dst = [0u8; 6];
    opaque_rgb(&mut dst, &src).unwrap();
    assert_eq!(dst, [1, 2, 3, 4, 5, 6]);
}

#[test]
fn translucent_frames_are_rejected() {
    let src = [1u8, 2, 3, 255, 4, 5, 6, 128];
    let mut dst = [0u8; 6];
    let err = opaque_rgb(&mut dst, &src).unwrap_err();
    assert!(err.to_string().contains("pixel 1"), "{err}");

    let mut short = [0u8; 3];
    assert!(opaque_rgb(&mut short, &src).is_err());
}

#[test]
fn odd_canvases_are_padded_with_paper() {
    assert_eq!(
        pad_filter([255, 16, 0, 255]),
        "pad=ceil(iw/2)*2:ceil(ih/2)*2:color=0xFF1000"
    );
}

#[test]
fn frames_before_begin_are_rejected() {
    let mut sink = Mp4Sink::new(Mp4SinkOpts::new("target/unit_mp4/never.mp4"));
    assert!(sink.push_frame(0, &paper(2, 2)).is_err());
    assert!(sink.end().is_err());

    let mut opts = Mp4SinkOpts::new("target/unit_mp4/never.mp4");
    opts.crf = 60;
    let err = Mp4Sink::new(opts)
        .begin(SinkConfig {
            width: 2,
            height: 2,
            fps: Fps { num: 10, den: 1 },
        })
        .unwrap_err();
    assert!(err.to_string().contains("crf"), "{err}");
}

#[test]
fn odd_canvas_encodes_and_lands_atomically() {
    if !ffmpeg_available() {
        return;
    }
    let dir = PathBuf::from(format!("target/unit_mp4/odd-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    let path = dir.join("loop.mp4");

    let mut sink = Mp4Sink::new(Mp4SinkOpts::new(&path));
    sink.begin(SinkConfig {
        width: 15,
        height: 9,
        fps: Fps { num: 10, den: 1 },
    })
    .unwrap();
    for i in 0..5 {
        sink.push_frame(i, &paper(15, 9)).unwrap();
    }
    assert!(!path.exists());
    sink.end().unwrap();

    assert!(std::fs::metadata(&path).unwrap().len() > 0);
    let names: Vec<_> = std::fs::read_dir(&dir)
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(names.len(), 1, "{names:?}");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn dropping_an_unfinished_sink_leaves_nothing_behind() {
    if !ffmpeg_available() {
        return;
    }
    let dir = PathBuf::from(format!("target/unit_mp4/drop-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    let path = dir.join("loop.mp4");

    let mut sink = Mp4Sink::new(Mp4SinkOpts::new(&path));
    sink.begin(SinkConfig {
        width: 4,
        height: 4,
        fps: Fps { num: 10, den: 1 },
    })
    .unwrap();
    sink.push_frame(0, &paper(4, 4)).unwrap();
    drop(sink);

    let left = std::fs::read_dir(&dir).unwrap().count();
    assert_eq!(left, 0);
    let _ = std::fs::remove_dir_all(&dir);
}
