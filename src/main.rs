//! Example run of the MFR network
//!
//! Two radars watch two aircraft and one self-screening jammer for 20
//! simulated seconds; the command post fuses their tracks every reporting
//! interval. Set `RUST_LOG=mfrnet=debug` to follow the correlation decisions.

use mfrnet::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

const RUN_TICKS: u64 = 20 * TICKS_PER_SECOND;

fn radar(id: u32, x: f64, auto_track: bool) -> Result<SensorTracker, FusionError> {
    let config = SensorConfig {
        id: SensorId(id),
        position: [x, 0.0, 0.0],
        frame: FrameAngles::pointing(
            15.0, // Mount height (m)
            0.0,  // Facing north
            0.1,  // Face elevation (rad)
        ),
        max_range: 80_000.0,
        cone_half_angle: 1.0,
        sigma: [25.0, 1e-3, 1e-3],
        report_every_ticks: TICKS_PER_SECOND,
        jammer_range: 40_000.0,
        overload_g: 5.0,
        auto_track,
    };
    Ok(SensorTracker::new(Sensor::new(config)?))
}

fn main() -> Result<(), FusionError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("MFRNET: multi-radar track fusion");
    println!("================================\n");

    let mut trackers = vec![radar(1, -10_000.0, true)?, radar(2, 10_000.0, false)?];
    // Small azimuth misalignment on the second mount.
    trackers[1].sensor_mut().inject_alignment_error([3e-4, 0.0, 0.0]);

    let targets = [
        Target::new(TargetId(1), [-3_000.0, 3_000.0, 40_000.0], [0.0, 0.0, -200.0]),
        Target::new(TargetId(2), [5_000.0, 5_000.0, 50_000.0], [-150.0, 0.0, -100.0]),
        Target::jammer(TargetId(3), [0.0, 6_000.0, 45_000.0], [50.0, 0.0, -150.0]),
    ];

    let mut array = MultiSensorTrackArray::new(FusionConfig::default())?;
    let mut rng = StdRng::seed_from_u64(42);

    for tick in (0..=RUN_TICKS).map(Tick) {
        let mut reported = false;
        for tracker in &mut trackers {
            let report = tracker.cycle(&targets, tick, &mut rng);
            for target in report.lost {
                array.drop_source(SourceKey::new(tracker.id(), target));
            }
            reported |= !report.traces.is_empty();
            array.ingest_all(report.traces);
        }
        if !reported {
            continue;
        }

        let summary = array.cycle(tick);
        if tick.0 % (5 * TICKS_PER_SECOND) == 0 {
            println!(
                "t = {:>5.1} s: {} fused track(s), created {}, attached {}, merged {}",
                tick.seconds(),
                summary.tracks,
                summary.created,
                summary.attached,
                summary.merged
            );
        }
    }

    println!("\nFinal fused picture:");
    let end = Tick(RUN_TICKS);
    for track in array.tracks() {
        let sources: Vec<String> = array
            .members(track)
            .iter()
            .map(|s| format!("{}{}", s.key(), if s.bearing_only { " (bearing)" } else { "" }))
            .collect();
        let p = track.position.as_svector();
        let sigma = track.covariance.trace().sqrt();
        println!(
            "  #{} at ({:>9.1}, {:>7.1}, {:>9.1}) m, σ ≈ {:>6.1} m, from {}",
            track.number(),
            p.x,
            p.y,
            p.z,
            sigma,
            sources.join(", ")
        );
    }

    println!("\nGround truth:");
    for target in &targets {
        let p = target.position_at(end);
        let p = p.as_svector();
        println!(
            "  {}{} at ({:>9.1}, {:>7.1}, {:>9.1}) m",
            target.id,
            if target.jammer { " (jammer)" } else { "" },
            p.x,
            p.y,
            p.z
        );
    }

    let rows = array.registration_rows(end);
    println!("\n{} registration row(s) at t = {} s", rows.len(), end.seconds());
    Ok(())
}
