use crate::Args;
use anyhow::{Context, Result};
use petalsonic_stream::device::PlaybackDevice;
use petalsonic_stream::{
    CpalDevice, EmitterDesc, EmitterId, FileStreamProvider, MemoryStreamProvider, OfflineDevice,
    PetalSonicAudioListener, Pose, StreamDesc, StreamProvider, SteamAudioBackend,
    StreamingScheduler, TickReport, Vec3,
};
use std::f32::consts::TAU;
use std::time::{Duration, Instant};

const TONE_REFERENCE: &str = "generated-tone";
const TONE_FREQUENCY: f32 = 440.0;
/// Host frame interval
const TICK_INTERVAL: Duration = Duration::from_millis(20);
/// Time for one full orbit around the listener
const ORBIT_SECONDS: f32 = 8.0;

type Scheduler<D> = StreamingScheduler<SteamAudioBackend, D>;

pub fn run(args: &Args) -> Result<()> {
    let (provider, reference) = source_provider(args)?;

    let mut desc = StreamDesc::new().target_queue_depth(args.queue_depth);
    if let Some(hrtf) = &args.hrtf {
        desc = desc.hrtf_path(hrtf.clone());
    }
    let emitter_desc = EmitterDesc::new(reference)
        .sample_rate(args.sample_rate)
        .frame_size(args.frame_size);

    let backend = SteamAudioBackend::new()?;

    if args.offline {
        let scheduler = StreamingScheduler::new(desc, backend, OfflineDevice::new(), provider)?;
        run_offline(scheduler, emitter_desc, args)
    } else {
        let device = CpalDevice::new(args.sample_rate)?;
        let scheduler = StreamingScheduler::new(desc, backend, device, provider)?;
        run_realtime(scheduler, emitter_desc, args)
    }
}

fn source_provider(args: &Args) -> Result<(Box<dyn StreamProvider>, String)> {
    match &args.source {
        Some(path) => {
            let file_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .with_context(|| format!("invalid source path: {}", path.display()))?;
            let root = path.parent().map(|p| p.to_path_buf()).unwrap_or_default();
            log::info!("Streaming {}", path.display());
            Ok((
                Box::new(FileStreamProvider::new(root)),
                file_name.to_string(),
            ))
        }
        None => {
            let tone: Vec<f32> = (0..args.sample_rate)
                .map(|i| {
                    let t = i as f32 / args.sample_rate as f32;
                    0.5 * (TAU * TONE_FREQUENCY * t).sin()
                })
                .collect();

            let mut provider = MemoryStreamProvider::new();
            provider.insert_samples(TONE_REFERENCE, &tone);
            log::info!("No source given, streaming a {} Hz tone", TONE_FREQUENCY);
            Ok((Box::new(provider), TONE_REFERENCE.to_string()))
        }
    }
}

fn run_realtime(mut scheduler: Scheduler<CpalDevice>, desc: EmitterDesc, args: &Args) -> Result<()> {
    let emitter = scheduler.add_emitter(desc, orbit_pose(0.0, args.radius))?;
    let listener = PetalSonicAudioListener::default();
    let duration = Duration::from_secs_f32(args.seconds.max(0.0));

    let start = Instant::now();
    let mut next_status = 0.0;
    while start.elapsed() < duration {
        let t = start.elapsed().as_secs_f32();
        step(&mut scheduler, emitter, &listener, t, args.radius)?;

        if t >= next_status {
            log_status(&scheduler, emitter, t);
            next_status += 1.0;
        }
        std::thread::sleep(TICK_INTERVAL);
    }

    scheduler.remove_emitter(emitter)?;
    Ok(())
}

/// Runs on simulated time: the device plays one buffer every `frame_size / sample_rate`
/// seconds.
fn run_offline(mut scheduler: Scheduler<OfflineDevice>, desc: EmitterDesc, args: &Args) -> Result<()> {
    let buffer_seconds = desc.frame_size as f32 / desc.sample_rate as f32;
    let emitter = scheduler.add_emitter(desc, orbit_pose(0.0, args.radius))?;
    let listener = PetalSonicAudioListener::default();

    let tick_seconds = TICK_INTERVAL.as_secs_f32();
    let ticks = (args.seconds.max(0.0) / tick_seconds).ceil() as usize;
    let mut played_until = 0.0;
    let mut submitted = 0;
    let mut peak = 0.0f32;
    let mut next_status = 0.0;

    for tick in 0..ticks {
        let t = tick as f32 * tick_seconds;
        while played_until + buffer_seconds <= t {
            scheduler.device_mut().consume_all(1);
            played_until += buffer_seconds;
        }

        submitted += step(&mut scheduler, emitter, &listener, t, args.radius)?.buffers_submitted;
        peak = scheduler
            .device_mut()
            .take_submissions()
            .iter()
            .fold(peak, |peak, record| peak.max(record.peak));

        if t >= next_status {
            log_status(&scheduler, emitter, t);
            next_status += 1.0;
        }
    }

    log::info!(
        "Offline run finished: {} ticks, {} buffers submitted, peak {:.3}",
        ticks,
        submitted,
        peak
    );

    scheduler.remove_emitter(emitter)?;
    Ok(())
}

fn step<D: PlaybackDevice>(
    scheduler: &mut Scheduler<D>,
    emitter: EmitterId,
    listener: &PetalSonicAudioListener,
    t: f32,
    radius: f32,
) -> Result<TickReport> {
    scheduler.set_emitter_pose(emitter, orbit_pose(t, radius))?;
    let report = scheduler.tick(listener);

    for event in scheduler.poll_events() {
        if event.is_error() {
            log::warn!("{:?}", event);
        } else {
            log::debug!("{:?}", event);
        }
    }
    Ok(report)
}

fn log_status<D: PlaybackDevice>(scheduler: &Scheduler<D>, emitter: EmitterId, t: f32) {
    let Some(emitter) = scheduler.emitter(emitter) else {
        return;
    };
    let queue = emitter.queue_state();
    log::info!(
        "t={:>5.1}s  emitter at {:.2?}  stream {:.2}s / {:.2}s  queued {} processed {}",
        t,
        emitter.pose().position,
        emitter.current_stream_position().as_secs_f32(),
        emitter.total_stream_duration().as_secs_f32(),
        queue.queued,
        queue.processed
    );
}

/// Starts straight ahead of the listener and circles clockwise seen from above.
fn orbit_pose(t: f32, radius: f32) -> Pose {
    let angle = TAU * t / ORBIT_SECONDS;
    Pose::from_position(Vec3::new(
        radius * angle.sin(),
        0.0,
        -radius * angle.cos(),
    ))
}
