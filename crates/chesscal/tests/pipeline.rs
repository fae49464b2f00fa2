mod common;

use chesscal::calib::CalibError;
use chesscal::{
    open_source, CancelToken, ConfigError, Controller, Frame, FrameSource, PipelineConfig,
    PipelineError, PipelineState, PlanarEstimator, SolveError, SourceConfig, SourceError,
};
use common::*;
use nalgebra::Point2;
use std::path::Path;

fn config(target_count: usize, params_path: &Path) -> PipelineConfig {
    PipelineConfig {
        target_count,
        scale_factor: 1.0,
        min_interval_secs: 1.0,
        params_path: params_path.to_path_buf(),
        max_read_failures: 2,
        ..PipelineConfig::default()
    }
}

fn controller(
    cfg: &PipelineConfig,
    script: Vec<Option<Vec<Point2<f32>>>>,
    cancel: CancelToken,
) -> Controller<ScriptedDetector, PlanarEstimator> {
    Controller::new(
        cfg,
        ScriptedDetector::new(script),
        PlanarEstimator::default(),
        cancel,
    )
    .unwrap()
}

fn all_views() -> Vec<Option<Vec<Point2<f32>>>> {
    poses().iter().map(|p| Some(board_corners(p))).collect()
}

#[test]
fn single_clean_frame_fills_accumulator_and_starts_solving() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(1, &dir.path().join("intrinsics.json"));
    let mut ctl = controller(&cfg, all_views(), CancelToken::new());
    let mut preview = RecordingPreview::default();

    ctl.process_frame(&blank_frame(0.0), &mut preview);

    assert_eq!(1, ctl.accumulator().len());
    assert!(ctl.accumulator().is_full());
    assert_eq!(PipelineState::Solving, ctl.state());
    assert_eq!(
        vec![(PipelineState::Acquiring, PipelineState::Solving)],
        preview.transitions
    );
}

#[test]
fn same_pose_twice_within_interval_is_debounced() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(5, &dir.path().join("intrinsics.json"));
    let corners = board_corners(&poses()[0]);
    let mut ctl = controller(
        &cfg,
        vec![Some(corners.clone()), Some(corners)],
        CancelToken::new(),
    );
    let mut preview = RecordingPreview::default();

    ctl.process_frame(&blank_frame(3.0), &mut preview);
    ctl.process_frame(&blank_frame(3.2), &mut preview);

    assert_eq!(1, ctl.accumulator().len());
    assert_eq!(PipelineState::Acquiring, ctl.state());
    assert_eq!(2, preview.acquiring);
    assert_eq!(1, preview.accepted);
}

#[test]
fn accepted_observations_are_spaced_by_the_interval() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(50, &dir.path().join("intrinsics.json"));
    let corners = board_corners(&poses()[0]);
    let mut ctl = controller(&cfg, vec![Some(corners); 40], CancelToken::new());
    let mut preview = RecordingPreview::default();

    for k in 0..40 {
        ctl.process_frame(&blank_frame(k as f64 * 0.3), &mut preview);
    }
    // Accepted at 0.0, 1.2, 2.4, ... 10.8.
    assert_eq!(10, ctl.accumulator().len());
    let last = ctl.accumulator().last_accepted().unwrap();
    assert!((last - 10.8).abs() < 1e-9, "last accepted at {last}");
}

#[test]
fn too_few_views_abort_without_writing_parameters() {
    let dir = tempfile::tempdir().unwrap();
    let params_path = dir.path().join("intrinsics.json");
    let cfg = config(2, &params_path);
    let mut ctl = controller(&cfg, all_views(), CancelToken::new());
    let mut source = ScriptedSource::frames([0.0, 2.0, 4.0, 6.0]);
    let mut preview = RecordingPreview::default();

    let outcome = ctl.run(&mut source, &mut preview);

    assert_eq!(PipelineState::Aborted, outcome.final_state);
    assert!(!outcome.is_success());
    assert!(matches!(
        outcome.abort_reason,
        Some(PipelineError::Solve(SolveError::EstimationDidNotConverge(
            CalibError::NotEnoughViews { got: 2, need: 3 }
        )))
    ));
    assert!(!params_path.exists());
    assert!(ctl.accumulator().is_empty());
    // No frame is pulled once the run aborted.
    assert_eq!(2, source.reads);
}

#[test]
fn identical_poses_abort_without_writing_parameters() {
    let dir = tempfile::tempdir().unwrap();
    let params_path = dir.path().join("intrinsics.json");
    let cfg = config(4, &params_path);
    let corners = board_corners(&poses()[2]);
    let mut ctl = controller(&cfg, vec![Some(corners); 4], CancelToken::new());
    let mut source = ScriptedSource::frames([0.0, 2.0, 4.0, 6.0]);

    let outcome = ctl.run(&mut source, &mut RecordingPreview::default());

    assert_eq!(PipelineState::Aborted, outcome.final_state);
    assert!(matches!(
        outcome.abort_reason,
        Some(PipelineError::Solve(SolveError::EstimationDidNotConverge(
            CalibError::DegenerateViews
        )))
    ));
    assert!(!params_path.exists());
}

#[test]
fn full_run_calibrates_then_rectifies_until_stream_ends() {
    let dir = tempfile::tempdir().unwrap();
    let params_path = dir.path().join("intrinsics.json");
    let cfg = config(5, &params_path);
    // One miss between views, then three frames to rectify.
    let mut script = vec![None];
    script.extend(all_views());
    let mut ctl = controller(&cfg, script, CancelToken::new());
    let mut source = ScriptedSource::frames([0.0, 0.5, 2.0, 4.0, 6.0, 8.0, 10.0, 10.1, 10.2]);
    let mut preview = RecordingPreview::default();

    let outcome = ctl.run(&mut source, &mut preview);

    assert!(outcome.is_success(), "{:?}", outcome.abort_reason);
    assert_eq!(PipelineState::Rectifying, outcome.final_state);
    assert_eq!(9, outcome.frames_processed);
    assert_eq!(5, outcome.observations);
    assert!(params_path.exists());
    assert_eq!(
        vec![
            (PipelineState::Acquiring, PipelineState::Solving),
            (PipelineState::Solving, PipelineState::Rectifying),
        ],
        preview.transitions
    );
    assert_eq!(3, preview.rectified.len());
    assert_eq!(10.2, preview.rectified[2].timestamp);
    // The map is released once the stream is done.
    assert!(ctl.map().is_none());

    let params = outcome.params.unwrap();
    let (k, d) = truth();
    let fitted = params.intrinsics();
    assert_eq!(IMAGE_SIZE, params.image_size);
    assert!((fitted.fx - k.fx).abs() < 1.0, "fx={}", fitted.fx);
    assert!((fitted.fy - k.fy).abs() < 1.0, "fy={}", fitted.fy);
    assert_eq!(k.cx, fitted.cx);
    assert_eq!(k.cy, fitted.cy);
    assert!((params.distortion.k1 - d.k1).abs() < 5e-3);
    assert_eq!(0.0, params.distortion.p1);
    assert_eq!(0.0, params.distortion.p2);
    assert!(params.rms < 0.01);

    let stored = chesscal::load_parameters(&params_path).unwrap();
    assert_eq!(stored, params);
}

#[test]
fn cancellation_while_acquiring_discards_observations() {
    let dir = tempfile::tempdir().unwrap();
    let params_path = dir.path().join("intrinsics.json");
    let cfg = config(5, &params_path);
    let cancel = CancelToken::new();
    let mut ctl = controller(&cfg, all_views(), cancel.clone());

    struct CancelAfter<S> {
        inner: S,
        after: usize,
        served: usize,
        cancel: CancelToken,
    }
    impl<S: FrameSource> FrameSource for CancelAfter<S> {
        fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
            self.served += 1;
            if self.served == self.after {
                self.cancel.cancel();
            }
            self.inner.next_frame()
        }
    }

    let mut source = CancelAfter {
        inner: ScriptedSource::frames([0.0, 2.0, 4.0, 6.0, 8.0]),
        after: 2,
        served: 0,
        cancel,
    };
    let outcome = ctl.run(&mut source, &mut RecordingPreview::default());

    assert_eq!(PipelineState::Aborted, outcome.final_state);
    assert!(matches!(outcome.abort_reason, Some(PipelineError::Cancelled)));
    assert_eq!(2, outcome.frames_processed);
    assert!(ctl.accumulator().is_empty());
    assert!(!params_path.exists());
}

#[test]
fn cancellation_while_rectifying_is_a_success() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(5, &dir.path().join("intrinsics.json"));
    let cancel = CancelToken::new();
    let mut ctl = controller(&cfg, all_views(), cancel.clone());
    let mut preview = RecordingPreview::default();

    for (k, t) in [0.0, 2.0, 4.0, 6.0, 8.0].into_iter().enumerate() {
        ctl.process_frame(&blank_frame(t), &mut preview);
        assert_eq!(k + 1, ctl.accumulator().len());
    }
    ctl.solve(&mut preview);
    assert_eq!(PipelineState::Rectifying, ctl.state());
    assert!(ctl.map().is_some());

    cancel.cancel();
    let outcome = ctl.run(&mut ScriptedSource::frames([9.0, 10.0]), &mut preview);
    assert!(outcome.is_success());
    assert!(preview.rectified.is_empty());
    assert!(ctl.map().is_none());
}

#[test]
fn stream_ending_before_target_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(5, &dir.path().join("intrinsics.json"));
    let mut ctl = controller(&cfg, all_views(), CancelToken::new());

    let outcome = ctl.run(
        &mut ScriptedSource::frames([0.0, 2.0]),
        &mut RecordingPreview::default(),
    );

    assert_eq!(PipelineState::Aborted, outcome.final_state);
    assert!(matches!(
        outcome.abort_reason,
        Some(PipelineError::SourceExhausted {
            collected: 2,
            target: 5
        })
    ));
}

#[test]
fn transient_read_failures_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(2, &dir.path().join("intrinsics.json"));
    let corners = board_corners(&poses()[0]);
    let mut ctl = controller(&cfg, vec![Some(corners.clone()), Some(corners)], CancelToken::new());
    let mut source = ScriptedSource::new([
        Ok(blank_frame(0.0)),
        Err("dropped packet".to_string()),
        Err("dropped packet".to_string()),
        Ok(blank_frame(2.0)),
    ]);

    let outcome = ctl.run(&mut source, &mut RecordingPreview::default());
    // Both frames around the failures were accepted; two views are then too
    // few to solve.
    assert_eq!(2, outcome.observations);
    assert_eq!(4, source.reads);
}

#[test]
fn persistent_read_failures_end_the_stream() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(5, &dir.path().join("intrinsics.json"));
    let mut ctl = controller(&cfg, all_views(), CancelToken::new());
    let mut source = ScriptedSource::new(
        (0..10).map(|_| Err::<Frame, _>("device unplugged".to_string())),
    );

    let outcome = ctl.run(&mut source, &mut RecordingPreview::default());

    assert_eq!(PipelineState::Aborted, outcome.final_state);
    assert!(matches!(
        outcome.abort_reason,
        Some(PipelineError::SourceExhausted { collected: 0, .. })
    ));
    // max_read_failures = 2: the third failure in a row ends the run.
    assert_eq!(3, source.reads);
}

#[test]
fn unwritable_parameter_path_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let params_path = dir.path().join("missing/intrinsics.json");
    let cfg = config(5, &params_path);
    let mut ctl = controller(&cfg, all_views(), CancelToken::new());

    let outcome = ctl.run(
        &mut ScriptedSource::frames([0.0, 2.0, 4.0, 6.0, 8.0, 9.0]),
        &mut RecordingPreview::default(),
    );

    assert_eq!(PipelineState::Aborted, outcome.final_state);
    assert!(matches!(
        outcome.abort_reason,
        Some(PipelineError::Store(chesscal::StoreError::StoreWrite { .. }))
    ));
    assert!(outcome.params.is_none());
}

#[test]
fn invalid_config_is_rejected_before_running() {
    let cfg = PipelineConfig {
        scale_factor: 2.0,
        ..PipelineConfig::default()
    };
    let err = Controller::new(
        &cfg,
        ScriptedDetector::new(Vec::new()),
        PlanarEstimator::default(),
        CancelToken::new(),
    )
    .err();
    assert!(matches!(
        err,
        Some(PipelineError::Config(ConfigError::ScaleFactor(s))) if s == 2.0
    ));
}

#[test]
fn missing_image_directory_fails_to_open() {
    let dir = tempfile::tempdir().unwrap();
    let source = SourceConfig::Images {
        dir: dir.path().join("absent"),
        frame_interval_secs: 1.0,
    };
    assert!(matches!(
        open_source(&source).err(),
        Some(PipelineError::Source(SourceError::Open { .. }))
    ));
}
