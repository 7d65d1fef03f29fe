use std::path::PathBuf;

use super::*;
use crate::foundation::core::{Canvas, FrameLayout, Point};
use crate::render::raster::ScatterStyle;
use crate::sampling::cloud::PointCloud;
use crate::store::archive::close_cycle;
use crate::transport::plan::TransportPlan;

fn cycle() -> Cycle {
    let field = Canvas::new(4, 4).unwrap();
    let a = PointCloud::new(vec![Point::new(0.5, 0.5), Point::new(3.5, 3.5)]);
    let b = PointCloud::new(vec![Point::new(3.5, 0.5), Point::new(0.5, 3.5)]);
    close_cycle(field, vec![a, b], vec![TransportPlan::from_assignment(&[0, 1]).unwrap()]).unwrap()
}

fn raster() -> ScatterRasterizer {
    ScatterRasterizer::new(
        Canvas::new(8, 8).unwrap(),
        Canvas::new(4, 4).unwrap(),
        ScatterStyle {
            radius: 1.0,
            ink_rgba: [0, 0, 0, 255],
            paper_rgba: [255, 255, 255, 255],
        },
    )
    .unwrap()
}

fn frame_dir(name: &str) -> FrameDirectory {
    let root = PathBuf::from("target")
        .join("unit_worker")
        .join(format!("{name}-{}", std::process::id()));
    let dir = FrameDirectory::new(root);
    dir.prepare().unwrap();
    dir
}

#[test]
fn workers_together_write_every_frame() {
    let cycle = cycle();
    let layout = FrameLayout::new(2, 3).unwrap();
    let frames = frame_dir("all");
    let interp = FrameInterpolator::new(None, 3).unwrap();

    for share in WorkPartition::all(layout, 4).unwrap() {
        let worker = RenderWorker {
            cycle: &cycle,
            interp,
            share,
            frames: &frames,
        };
        let written = worker.run(&mut raster()).unwrap();
        assert_eq!(written, share.len());
    }

    assert_eq!(frames.list_frames().unwrap().len(), 6);
    let markers = frames.completed_workers().unwrap();
    assert_eq!(markers.len(), 4);
    assert_eq!(markers.values().sum::<u64>(), 6);
}

#[test]
fn transition_count_must_match_layout() {
    let cycle = cycle();
    let layout = FrameLayout::new(3, 2).unwrap();
    let frames = frame_dir("mismatch");
    let worker = RenderWorker {
        cycle: &cycle,
        interp: FrameInterpolator::new(None, 2).unwrap(),
        share: WorkPartition::new(layout, 1, 0).unwrap(),
        frames: &frames,
    };
    let err = worker.run(&mut raster()).unwrap_err();
    assert!(matches!(err, MorphError::MalformedArchive(_)));
    assert!(frames.completed_workers().unwrap().is_empty());
}
