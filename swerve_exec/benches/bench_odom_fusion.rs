//! # Odometry Fusion Benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use swerve_lib::{
    drivetrain::SwerveKinematics,
    loc::Pose,
    odometry::{fuse, OdometrySample, PoseEstimator, SwerveOdometry},
};

/// Samples per module in one drivetrain cycle, a few missed cycles at 250 Hz.
const NUM_SAMPLES: usize = 20;

fn odom_fusion_benchmark(c: &mut Criterion) {
    // ---- Build dummy samples ----

    // Arcing drive, the rear right module missing its last sample
    let mut samples: [Vec<OdometrySample>; 4] = Default::default();
    for (m, module_samples) in samples.iter_mut().enumerate() {
        let count = if m == 3 { NUM_SAMPLES - 1 } else { NUM_SAMPLES };

        for i in 0..count {
            module_samples.push(OdometrySample {
                drive_distance_m: 0.004 * (i + 1) as f64 * (1.0 + 0.05 * m as f64),
                steer_heading_rad: 0.01 * i as f64,
                timestamp_s: 0.004 * i as f64,
            });
        }
    }

    let kinematics = SwerveKinematics::new([
        [0.2825, 0.3075],
        [0.2825, -0.3075],
        [-0.2825, 0.3075],
        [-0.2825, -0.3075],
    ])
    .unwrap();

    // ---- Benchmarks ----

    let refs = [
        samples[0].as_slice(),
        samples[1].as_slice(),
        samples[2].as_slice(),
        samples[3].as_slice(),
    ];

    c.bench_function("fuse", |b| b.iter(|| fuse(black_box(&refs))));

    c.bench_function("fuse_and_integrate", |b| {
        b.iter(|| {
            let mut odom = SwerveOdometry::new(kinematics.clone(), Pose::default());
            for snapshot in fuse(black_box(&refs)).iter() {
                odom.update(snapshot);
            }
            odom.current_pose()
        })
    });
}

criterion_group!(benches, odom_fusion_benchmark);
criterion_main!(benches);
