//! End-to-end checks: ingestion, buffer, worker, estimator and sinks wired
//! together the way the CLI wires them.

use std::f64::consts::FRAC_PI_2;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use headpose_middleware::{
    FnSink, Ingestor, MarkerSelection, PointBuffer, PoseBus, PoseSink, Topic,
};
use headpose_runtime::{CycleOutcome, EstimatorConfig, PoseEstimator, PoseWorker};
use headpose_types::{EventPayload, MarkerBatch, MarkerPoint, PoseError, PoseEstimate, RawFrame};
use nalgebra::{UnitQuaternion, Vector3};

fn unit_square() -> Vec<MarkerPoint> {
    vec![
        MarkerPoint::new(0.0, 0.0, 0.0),
        MarkerPoint::new(1.0, 0.0, 0.0),
        MarkerPoint::new(1.0, 1.0, 0.0),
        MarkerPoint::new(0.0, 1.0, 0.0),
    ]
}

fn batch(points: Vec<MarkerPoint>, sequence: u64) -> MarkerBatch {
    let b = MarkerBatch::new(points, 4).unwrap();
    let at = b.captured_at();
    b.stamped(sequence, at)
}

fn calibrated_estimator() -> PoseEstimator {
    let mut est = PoseEstimator::new(&EstimatorConfig::default()).unwrap();
    est.process(&batch(unit_square(), 1)).unwrap();
    est
}

#[derive(Debug, Clone, PartialEq)]
enum Seen {
    Calibrated(u64),
    Pose(u64),
    Skipped(u64),
}

struct Recorder(Arc<Mutex<Vec<Seen>>>);

impl PoseSink for Recorder {
    fn emit(&mut self, pose: &PoseEstimate) -> Result<(), PoseError> {
        self.0.lock().unwrap().push(Seen::Pose(pose.sequence));
        Ok(())
    }

    fn calibrated(&mut self, sequence: u64, _centroid: &Vector3<f64>) {
        self.0.lock().unwrap().push(Seen::Calibrated(sequence));
    }

    fn skipped(&mut self, sequence: u64, _reason: &PoseError) {
        self.0.lock().unwrap().push(Seen::Skipped(sequence));
    }
}

fn wait_for(mut pred: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if pred() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    false
}

#[test]
fn unchanged_cluster_reports_zero_rotation() {
    let est = calibrated_estimator();
    let pose = est.estimate(&batch(unit_square(), 2)).unwrap();

    assert_relative_eq!(pose.roll, 0.0, epsilon = 1e-9);
    assert_relative_eq!(pose.pitch, 0.0, epsilon = 1e-9);
    assert_relative_eq!(pose.yaw, 0.0, epsilon = 1e-9);
    assert_relative_eq!(pose.translation, Vector3::new(0.5, 0.5, 0.0), epsilon = 1e-12);
    assert_eq!(pose.sequence, 2);
}

#[test]
fn quarter_turn_about_z_with_shift() {
    let est = calibrated_estimator();
    // Unit square turned 90 degrees about Z, then moved by (1, 0, 0).
    let turned = vec![
        MarkerPoint::new(1.0, 0.0, 0.0),
        MarkerPoint::new(1.0, 1.0, 0.0),
        MarkerPoint::new(0.0, 1.0, 0.0),
        MarkerPoint::new(0.0, 0.0, 0.0),
    ];
    let pose = est.estimate(&batch(turned, 2)).unwrap();

    let half = FRAC_PI_2 / 2.0;
    let q = pose.rotation.into_inner();
    assert_relative_eq!(q.w, half.cos(), epsilon = 1e-9);
    assert_relative_eq!(q.i, 0.0, epsilon = 1e-9);
    assert_relative_eq!(q.j, 0.0, epsilon = 1e-9);
    assert_relative_eq!(q.k, half.sin(), epsilon = 1e-9);
    assert_relative_eq!(pose.yaw, FRAC_PI_2, epsilon = 1e-6);
    assert_relative_eq!(pose.translation, Vector3::new(0.5, 0.5, 0.0), epsilon = 1e-12);
}

#[test]
fn arbitrary_rigid_motion_is_recovered() {
    let reference: Vec<Vector3<f64>> = vec![
        Vector3::new(0.00, 0.10, 1.60),
        Vector3::new(-0.08, 0.02, 1.52),
        Vector3::new(0.00, 0.06, 1.40),
        Vector3::new(0.08, 0.02, 1.52),
    ];
    let rot = UnitQuaternion::from_euler_angles(0.3, -0.2, 0.7);
    let shift = Vector3::new(0.05, -0.02, 0.10);
    let moved: Vec<MarkerPoint> = reference
        .iter()
        .map(|p| MarkerPoint::from(rot * p + shift))
        .collect();

    let mut est = PoseEstimator::new(&EstimatorConfig::default()).unwrap();
    est.process(&batch(reference.iter().map(|p| MarkerPoint::from(*p)).collect(), 1))
        .unwrap();
    let pose = est.estimate(&batch(moved.clone(), 2)).unwrap();

    assert_relative_eq!(pose.rotation.angle_to(&rot), 0.0, epsilon = 1e-6);
    assert_relative_eq!(pose.roll, 0.3, epsilon = 1e-6);
    assert_relative_eq!(pose.pitch, -0.2, epsilon = 1e-6);
    assert_relative_eq!(pose.yaw, 0.7, epsilon = 1e-6);
    let expected_centroid = moved.iter().map(|p| p.to_vector()).sum::<Vector3<f64>>() / 4.0;
    assert_relative_eq!(pose.translation, expected_centroid, epsilon = 1e-12);
}

#[test]
fn collapsed_cluster_is_degenerate_not_nan() {
    let est = calibrated_estimator();
    let collapsed = vec![MarkerPoint::new(0.4, 0.4, 0.4); 4];
    match est.estimate(&batch(collapsed, 2)) {
        Err(PoseError::DegeneratePose(_)) => {}
        other => panic!("expected DegeneratePose, got {other:?}"),
    }
}

#[test]
fn estimate_before_calibration_is_refused() {
    let est = PoseEstimator::new(&EstimatorConfig::default()).unwrap();
    assert_eq!(
        est.estimate(&batch(unit_square(), 1)),
        Err(PoseError::NotCalibrated)
    );
}

#[test]
fn poses_are_independent_of_history() {
    let mut est = calibrated_estimator();
    let turned = vec![
        MarkerPoint::new(1.0, 0.0, 0.0),
        MarkerPoint::new(1.0, 1.0, 0.0),
        MarkerPoint::new(0.0, 1.0, 0.0),
        MarkerPoint::new(0.0, 0.0, 0.0),
    ];
    let direct = est.estimate(&batch(turned.clone(), 5)).unwrap();

    for seq in 2..5 {
        let _ = est.process(&batch(unit_square(), seq));
    }
    let _ = est.process(&batch(vec![MarkerPoint::new(0.0, 0.0, 0.0); 4], 5));
    let after = match est.process(&batch(turned, 5)).unwrap() {
        CycleOutcome::Pose(p) => p,
        other => panic!("expected pose, got {other:?}"),
    };
    assert_eq!(direct.rotation, after.rotation);
    assert_eq!(direct.translation, after.translation);
}

#[test]
fn worker_only_sees_latest_submission() {
    let buffer = Arc::new(PointBuffer::new());
    let ingestor = Ingestor::new(Arc::clone(&buffer), MarkerSelection::default());

    // Two submissions before the worker ever looks at the buffer.
    let first = ingestor.submit_points(unit_square()).unwrap();
    let second = ingestor
        .submit_points(
            unit_square()
                .into_iter()
                .map(|p| MarkerPoint::new(p.x + 1.0, p.y, p.z))
                .collect(),
        )
        .unwrap();
    assert_eq!(buffer.stats().coalesced, 1);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let worker = PoseWorker::spawn(
        EstimatorConfig::default(),
        ingestor.clone(),
        Recorder(Arc::clone(&seen)),
    )
    .unwrap();

    assert!(wait_for(|| worker.stats().processed == 1));
    let stats = worker.shutdown().unwrap();

    assert_eq!(stats.processed, 1);
    assert_eq!(*seen.lock().unwrap(), vec![Seen::Calibrated(second)]);
    assert!(!seen.lock().unwrap().contains(&Seen::Calibrated(first)));
}

#[test]
fn emitted_sequence_is_a_subsequence_of_submissions() {
    let ingestor = Ingestor::new(Arc::new(PointBuffer::new()), MarkerSelection::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let worker = PoseWorker::spawn(
        EstimatorConfig::default(),
        ingestor.clone(),
        Recorder(Arc::clone(&seen)),
    )
    .unwrap();

    let mut last = 0;
    for i in 0..200 {
        let rot = UnitQuaternion::from_euler_angles(0.0, 0.0, i as f64 * 0.01);
        let points = unit_square()
            .into_iter()
            .map(|p| MarkerPoint::from(rot * p.to_vector()))
            .collect();
        last = last.max(ingestor.submit_frame(&RawFrame::new(points)).unwrap());
    }
    assert!(wait_for(|| {
        seen.lock()
            .unwrap()
            .last()
            .is_some_and(|s| matches!(s, Seen::Pose(seq) | Seen::Calibrated(seq) if *seq == last))
    }));
    worker.shutdown().unwrap();

    let seen = seen.lock().unwrap();
    let sequences: Vec<u64> = seen
        .iter()
        .map(|s| match s {
            Seen::Calibrated(n) | Seen::Pose(n) | Seen::Skipped(n) => *n,
        })
        .collect();
    assert!(sequences.windows(2).all(|w| w[0] < w[1]), "{sequences:?}");
    assert!(matches!(seen.first(), Some(Seen::Calibrated(_))));
    assert!(!seen.iter().any(|s| matches!(s, Seen::Skipped(_))));
}

#[test]
fn bus_subscriber_receives_worker_output() {
    let ingestor = Ingestor::new(Arc::new(PointBuffer::new()), MarkerSelection::default());
    let bus = PoseBus::default();
    let mut poses = bus.subscribe_to(Topic::Pose);
    let mut diagnostics = bus.subscribe_to(Topic::Diagnostics);

    let worker = PoseWorker::spawn(EstimatorConfig::default(), ingestor.clone(), bus.clone())
        .unwrap();

    ingestor.submit_points(unit_square()).unwrap();
    assert!(wait_for(|| worker.stats().calibrated));
    let seq = ingestor.submit_points(unit_square()).unwrap();
    assert!(wait_for(|| worker.stats().emitted == 1));
    worker.shutdown().unwrap();

    let calibration = diagnostics.try_recv().unwrap();
    assert!(matches!(
        calibration.payload,
        EventPayload::Calibrated { sequence: 1, .. }
    ));
    match poses.try_recv().unwrap().payload {
        EventPayload::Pose(p) => assert_eq!(p.sequence, seq),
        other => panic!("unexpected payload {other:?}"),
    }
}

#[test]
fn closure_sink_gets_formatted_pose_line() {
    let ingestor = Ingestor::new(Arc::new(PointBuffer::new()), MarkerSelection::default());
    let (tx, rx) = mpsc::channel();
    let worker = PoseWorker::spawn(
        EstimatorConfig::default(),
        ingestor.clone(),
        FnSink(move |p: &PoseEstimate| {
            let _ = tx.send(p.to_string());
        }),
    )
    .unwrap();

    ingestor.submit_points(unit_square()).unwrap();
    assert!(wait_for(|| worker.stats().calibrated));
    ingestor.submit_points(unit_square()).unwrap();

    let line = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    worker.shutdown().unwrap();

    let fields: Vec<(&str, &str)> = line
        .split(" | ")
        .map(|field| field.split_once(": ").unwrap())
        .collect();
    let names: Vec<&str> = fields.iter().map(|(n, _)| *n).collect();
    assert_eq!(names, ["x", "y", "z", "roll", "pitch", "yaw"]);

    let expected = [0.5, 0.5, 0.0, 0.0, 0.0, 0.0];
    for ((_, text), want) in fields.iter().zip(expected) {
        assert_eq!(text.split_once('.').unwrap().1.len(), 3, "{line}");
        let value: f64 = text.parse().unwrap();
        assert_relative_eq!(value, want, epsilon = 1e-3);
    }
}
