//! Tick-driven streaming scheduler.

use crate::config::{EmitterDesc, StreamDesc};
use crate::device::PlaybackDevice;
use crate::emitter::{Emitter, EmitterId, EmitterResource};
use crate::error::{PetalSonicError, Result};
use crate::events::PetalSonicEvent;
use crate::math::Pose;
use crate::queue::{PlayOutcome, PlaybackQueue};
use crate::source::{AudioSource, StreamProvider};
use crate::spatial::{SpatialBackend, SpatialProcessor};
use crossbeam_channel::{Receiver, Sender};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Represents the listener (the "ears") every emitter is spatialized against.
///
/// The listener is passed into each [`StreamingScheduler::tick`], so updating it always
/// completes before any emitter reads it in that tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct PetalSonicAudioListener {
    pub(crate) pose: Pose,
}

impl PetalSonicAudioListener {
    pub fn new(pose: Pose) -> Self {
        Self { pose }
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
    }
}

/// Summary of one [`StreamingScheduler::tick`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Emitters whose refill completed without error
    pub emitters_processed: usize,
    /// Emitters whose work was cut short by an error this tick
    pub emitters_skipped: usize,
    pub buffers_submitted: usize,
    pub elapsed: Duration,
}

/// Keeps every active emitter's device queue topped up.
///
/// The host calls [`tick`](Self::tick) once per frame. For each emitter the scheduler reads
/// the device's queued/processed counts, produces `target_depth - queued + processed` frames
/// (source read, spatialization, interleave), submits them, and restarts the voice if it is
/// not playing.
///
/// Adding and removing emitters takes `&mut self`, as does `tick`, so an emitter can never be
/// torn down while one of its frames is in flight.
pub struct StreamingScheduler<B: SpatialBackend, D: PlaybackDevice> {
    // Emitters hold handles created by the processor's backend; dropped first
    emitters: BTreeMap<EmitterId, Emitter<B>>,
    processor: SpatialProcessor<B>,
    device: D,
    provider: Box<dyn StreamProvider>,
    desc: StreamDesc,
    next_emitter_id: u64,
    event_sender: Sender<PetalSonicEvent>,
    event_receiver: Receiver<PetalSonicEvent>,
}

impl<B: SpatialBackend, D: PlaybackDevice> StreamingScheduler<B, D> {
    /// Create a new scheduler
    ///
    /// # Arguments
    /// * `desc` - Queue depth and HRTF selection shared by every emitter
    /// * `backend` - Binaural / direct-effect implementation
    /// * `device` - Output device
    /// * `provider` - Resolves emitter source references into streams
    pub fn new(
        desc: StreamDesc,
        backend: B,
        device: D,
        provider: impl StreamProvider + 'static,
    ) -> Result<Self> {
        desc.validate()?;

        let (event_sender, event_receiver) = crossbeam_channel::unbounded();
        let processor = SpatialProcessor::new(backend, desc.hrtf_path.clone());

        log::info!(
            "Streaming scheduler created (target queue depth: {})",
            desc.target_queue_depth
        );

        Ok(Self {
            emitters: BTreeMap::new(),
            processor,
            device,
            provider: Box::new(provider),
            desc,
            next_emitter_id: 0,
            event_sender,
            event_receiver,
        })
    }

    /// Activates an emitter: validates `desc`, opens its source, creates its spatialization
    /// resources and its device voice.
    ///
    /// # Errors
    ///
    /// - [`PetalSonicError::Configuration`] for an invalid descriptor; nothing is allocated
    /// - [`PetalSonicError::ResourceUnavailable`] if the source cannot be opened or measured
    /// - [`PetalSonicError::Spatialization`] / [`PetalSonicError::Device`] if a handle cannot
    ///   be created; whatever was created is released
    ///
    /// A failed activation leaves every other emitter untouched.
    pub fn add_emitter(&mut self, desc: EmitterDesc, pose: Pose) -> Result<EmitterId> {
        desc.validate()?;

        let reference = desc.source.as_deref().unwrap_or_default();
        let stream = self.provider.open(reference)?;
        let source = AudioSource::new(stream, desc.sample_rate)?;

        let mut resource = EmitterResource::new();
        resource.activate(&mut self.processor, &desc)?;

        let queue = PlaybackQueue::new(&mut self.device, self.desc.target_queue_depth)?;

        let id = EmitterId(self.next_emitter_id);
        self.next_emitter_id += 1;

        log::info!(
            "{} activated (source: {}, {:.2}s at {} Hz)",
            id,
            reference,
            source.total_duration().as_secs_f32(),
            desc.sample_rate
        );

        self.emitters.insert(
            id,
            Emitter {
                id,
                desc,
                pose,
                source,
                resource,
                queue,
            },
        );
        self.send_event(PetalSonicEvent::EmitterActivated { emitter_id: id });

        Ok(id)
    }

    /// Deactivates an emitter, releasing its device voice and spatialization resources.
    pub fn remove_emitter(&mut self, id: EmitterId) -> Result<()> {
        let emitter = self
            .emitters
            .remove(&id)
            .ok_or(PetalSonicError::UnknownEmitter(id))?;
        self.deactivate(emitter);
        Ok(())
    }

    pub fn emitter(&self, id: EmitterId) -> Option<&Emitter<B>> {
        self.emitters.get(&id)
    }

    pub fn emitter_mut(&mut self, id: EmitterId) -> Option<&mut Emitter<B>> {
        self.emitters.get_mut(&id)
    }

    /// Active emitter ids in activation order.
    pub fn emitter_ids(&self) -> Vec<EmitterId> {
        self.emitters.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.emitters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emitters.is_empty()
    }

    /// Moves an emitter. Takes effect on the next tick.
    pub fn set_emitter_pose(&mut self, id: EmitterId, pose: Pose) -> Result<()> {
        let emitter = self
            .emitters
            .get_mut(&id)
            .ok_or(PetalSonicError::UnknownEmitter(id))?;
        emitter.set_pose(pose);
        Ok(())
    }

    /// Refills every active emitter's queue against `listener`.
    ///
    /// Errors never abort the tick: they are logged, reported as events, and the affected
    /// emitter is retried on the next tick with freshly queried device counts.
    pub fn tick(&mut self, listener: &PetalSonicAudioListener) -> TickReport {
        let start = Instant::now();
        let mut report = TickReport::default();

        // Errors raised outside any emitter's batch (e.g. by the output stream)
        if let Some(error) = self.device.take_error() {
            log::warn!("Output device error: {}", error);
            self.send_event(PetalSonicEvent::DeviceError {
                emitter_id: None,
                error,
            });
        }

        let target_depth = self.desc.target_queue_depth;
        for emitter in self.emitters.values_mut() {
            let mut refill = Refill {
                processor: &mut self.processor,
                device: &mut self.device,
                events: &self.event_sender,
                listener: &listener.pose,
                target_depth,
                submitted: 0,
            };
            let result = refill.run(emitter);
            report.buffers_submitted += refill.submitted;

            match result {
                Ok(()) => report.emitters_processed += 1,
                Err(e) => {
                    log::warn!("{}: refill skipped this tick: {}", emitter.id, e);
                    report.emitters_skipped += 1;
                }
            }
        }

        report.elapsed = start.elapsed();
        report
    }

    /// Drains pending events without blocking.
    pub fn poll_events(&self) -> Vec<PetalSonicEvent> {
        self.event_receiver.try_iter().collect()
    }

    pub fn desc(&self) -> &StreamDesc {
        &self.desc
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn processor(&self) -> &SpatialProcessor<B> {
        &self.processor
    }

    /// Deactivates every emitter.
    pub fn shutdown(&mut self) {
        let emitters = std::mem::take(&mut self.emitters);
        if !emitters.is_empty() {
            log::info!("Shutting down {} emitter(s)", emitters.len());
        }
        for emitter in emitters.into_values() {
            self.deactivate(emitter);
        }
    }

    fn deactivate(&mut self, emitter: Emitter<B>) {
        let Emitter {
            id,
            queue,
            mut resource,
            ..
        } = emitter;

        queue.release(&mut self.device);
        resource.dispose();

        log::info!("{} deactivated", id);
        self.send_event(PetalSonicEvent::EmitterDeactivated { emitter_id: id });
    }

    fn send_event(&self, event: PetalSonicEvent) {
        // The receiver lives as long as the scheduler, so this cannot fail
        let _ = self.event_sender.send(event);
    }
}

impl<B: SpatialBackend, D: PlaybackDevice> Drop for StreamingScheduler<B, D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// One emitter's refill for one tick.
struct Refill<'a, B: SpatialBackend, D: PlaybackDevice> {
    processor: &'a mut SpatialProcessor<B>,
    device: &'a mut D,
    events: &'a Sender<PetalSonicEvent>,
    listener: &'a Pose,
    target_depth: usize,
    submitted: usize,
}

impl<B: SpatialBackend, D: PlaybackDevice> Refill<'_, B, D> {
    fn run(&mut self, emitter: &mut Emitter<B>) -> Result<()> {
        let id = emitter.id;
        let mut state = emitter.queue.query(&*self.device);
        let mut deficit = state.deficit(self.target_depth);
        let mut production_error = None;

        while deficit > 0 {
            let Some(buffer) = emitter.queue.acquire_slot(&mut *self.device, &mut state) else {
                break;
            };

            match self.produce_frame(emitter) {
                Ok(()) => {
                    let handles = emitter.resource.handles_mut()?;
                    emitter.queue.submit(
                        &mut *self.device,
                        buffer,
                        &handles.interleave_buf,
                        emitter.desc.sample_rate,
                        &mut state,
                    );
                    self.submitted += 1;
                    deficit -= 1;
                }
                Err(e) => {
                    emitter.queue.release_slot(buffer);
                    production_error = Some(e);
                    break;
                }
            }
        }

        self.check_device(id)?;

        if self.submitted > 0 {
            log::debug!(
                "{}: submitted {} buffer(s), {} pending",
                id,
                self.submitted,
                state.pending()
            );
        }

        if emitter.queue.ensure_playing(&mut *self.device) == PlayOutcome::Restarted {
            log::warn!("{}: buffer underrun, playback restarted", id);
            self.send(PetalSonicEvent::BufferUnderrun { emitter_id: id });
        }
        self.check_device(id)?;

        match production_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Reads and spatializes one frame into the emitter's interleave buffer.
    fn produce_frame(&mut self, emitter: &mut Emitter<B>) -> Result<()> {
        let id = emitter.id;

        let read = emitter
            .resource
            .input_frame_mut()
            .and_then(|frame| emitter.source.read_frame(frame));
        match read {
            Ok(0) => {}
            Ok(_) => self.send(PetalSonicEvent::SourceLooped { emitter_id: id }),
            Err(e) => {
                self.send(PetalSonicEvent::StreamError {
                    emitter_id: id,
                    error: e.to_string(),
                });
                return Err(e);
            }
        }

        if let Err(e) =
            self.processor
                .process_frame(&mut emitter.resource, emitter.pose.position, self.listener)
        {
            self.send(PetalSonicEvent::SpatializationError {
                emitter_id: id,
                error: e.to_string(),
            });
            return Err(e);
        }

        Ok(())
    }

    fn check_device(&mut self, id: EmitterId) -> Result<()> {
        match self.device.take_error() {
            Some(error) => {
                self.send(PetalSonicEvent::DeviceError {
                    emitter_id: Some(id),
                    error: error.clone(),
                });
                Err(PetalSonicError::Device(error))
            }
            None => Ok(()),
        }
    }

    fn send(&self, event: PetalSonicEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{OfflineDevice, VoiceState};
    use crate::math::Vec3;
    use crate::source::MemoryStreamProvider;
    use crate::test_support::TestBackend;

    const ONE_SECOND: usize = 44100;

    fn provider_with(reference: &str, samples: &[f32]) -> MemoryStreamProvider {
        let mut provider = MemoryStreamProvider::new();
        provider.insert_samples(reference, samples);
        provider
    }

    fn scheduler(
        provider: MemoryStreamProvider,
        backend: TestBackend,
    ) -> StreamingScheduler<TestBackend, OfflineDevice> {
        StreamingScheduler::new(StreamDesc::default(), backend, OfflineDevice::new(), provider)
            .unwrap()
    }

    fn voice_of(
        scheduler: &StreamingScheduler<TestBackend, OfflineDevice>,
        id: EmitterId,
    ) -> crate::device::VoiceId {
        scheduler.emitter(id).unwrap().queue.voice()
    }

    #[test]
    fn test_twenty_ticks_of_silence() {
        let _ = env_logger::builder().is_test(true).try_init();

        let provider = provider_with("silence", &vec![0.0; ONE_SECOND]);
        let mut scheduler = scheduler(provider, TestBackend::new());
        let id = scheduler
            .add_emitter(
                EmitterDesc::new("silence").sample_rate(44100).frame_size(4096),
                Pose::from_position(Vec3::new(2.0, 0.0, 0.0)),
            )
            .unwrap();
        let listener = PetalSonicAudioListener::default();
        let voice = voice_of(&scheduler, id);

        for tick in 0..20 {
            let report = scheduler.tick(&listener);
            assert_eq!(report.emitters_skipped, 0);
            if tick == 0 {
                assert_eq!(report.buffers_submitted, 4);
                assert_eq!(
                    scheduler.device().voice_state(voice),
                    VoiceState::Playing
                );
            }

            let queued = scheduler.device().buffers_queued(voice);
            assert!(queued >= 1 && queued <= 4);

            // The device plays one buffer per tick
            scheduler.device_mut().consume(voice, 1);
        }

        let submissions = scheduler.device().submissions();
        assert!(submissions.len() >= 20);
        for record in submissions {
            assert_eq!(record.len, 8192);
            assert_eq!(record.sample_rate, 44100);
            assert_eq!(record.peak, 0.0);
        }
        assert_eq!(
            scheduler.emitter(id).unwrap().queue_state().queued,
            4
        );
    }

    #[test]
    fn test_queue_stays_at_depth_without_consumption() {
        let provider = provider_with("tone", &[0.5; 1024]);
        let mut scheduler = scheduler(provider, TestBackend::new());
        scheduler
            .add_emitter(EmitterDesc::new("tone").frame_size(256), Pose::default())
            .unwrap();
        let listener = PetalSonicAudioListener::default();

        assert_eq!(scheduler.tick(&listener).buffers_submitted, 4);
        assert_eq!(scheduler.tick(&listener).buffers_submitted, 0);
        assert_eq!(scheduler.device().submissions().len(), 4);
    }

    #[test]
    fn test_source_loop_reported() {
        // 300 samples, 256 per frame: the second frame wraps
        let provider = provider_with("short", &[0.1; 300]);
        let mut scheduler = scheduler(provider, TestBackend::new());
        let id = scheduler
            .add_emitter(EmitterDesc::new("short").frame_size(256), Pose::default())
            .unwrap();

        scheduler.tick(&PetalSonicAudioListener::default());
        let events = scheduler.poll_events();
        assert!(events.contains(&PetalSonicEvent::EmitterActivated { emitter_id: id }));
        assert!(events.contains(&PetalSonicEvent::SourceLooped { emitter_id: id }));
    }

    #[test]
    fn test_missing_source_is_configuration_error() {
        let backend = TestBackend::new();
        let state = backend.state();
        let mut scheduler = scheduler(MemoryStreamProvider::new(), backend);

        let err = scheduler
            .add_emitter(EmitterDesc::default(), Pose::default())
            .unwrap_err();
        assert!(matches!(err, PetalSonicError::Configuration(_)));
        assert!(scheduler.is_empty());
        assert_eq!(state.borrow().hrtf_created, 0);
        assert!(scheduler.device().voices().is_empty());
    }

    #[test]
    fn test_unavailable_source_does_not_affect_other_emitters() {
        let provider = provider_with("present", &[0.2; 2048]);
        let mut scheduler = scheduler(provider, TestBackend::new());
        let good = scheduler
            .add_emitter(EmitterDesc::new("present").frame_size(512), Pose::default())
            .unwrap();

        let err = scheduler
            .add_emitter(EmitterDesc::new("missing").frame_size(512), Pose::default())
            .unwrap_err();
        assert!(matches!(err, PetalSonicError::ResourceUnavailable(_)));
        assert_eq!(scheduler.emitter_ids(), vec![good]);

        let report = scheduler.tick(&PetalSonicAudioListener::default());
        assert_eq!(report.emitters_processed, 1);
        assert_eq!(report.buffers_submitted, 4);
    }

    #[test]
    fn test_device_error_skips_tick_and_recovers() {
        let provider = provider_with("tone", &[0.5; 1024]);
        let mut scheduler = scheduler(provider, TestBackend::new());
        let id = scheduler
            .add_emitter(EmitterDesc::new("tone").frame_size(128), Pose::default())
            .unwrap();
        let listener = PetalSonicAudioListener::default();
        let voice = voice_of(&scheduler, id);
        scheduler.poll_events();

        scheduler.tick(&listener);
        scheduler.device_mut().consume(voice, 2);

        // Raised between ticks, as by the output stream
        scheduler.device_mut().inject_error("device hiccup");
        let report = scheduler.tick(&listener);
        assert_eq!(report.emitters_skipped, 0);
        let events = scheduler.poll_events();
        assert!(events.iter().any(|e| matches!(
            e,
            PetalSonicEvent::DeviceError { emitter_id: None, .. }
        )));

        // Counts are re-queried, so the next tick finds the queue full again
        assert_eq!(scheduler.device().buffers_queued(voice), 4);
        assert_eq!(scheduler.tick(&listener).buffers_submitted, 0);
    }

    #[test]
    fn test_device_error_during_refill_skips_emitter() {
        let provider = provider_with("tone", &[0.5; 1024]);
        let mut scheduler = scheduler(provider, TestBackend::new());
        let id = scheduler
            .add_emitter(EmitterDesc::new("tone").frame_size(128), Pose::default())
            .unwrap();
        let listener = PetalSonicAudioListener::default();
        let voice = voice_of(&scheduler, id);

        scheduler.tick(&listener);
        scheduler.device_mut().consume(voice, 1);
        scheduler.poll_events();

        scheduler.device_mut().inject_error_on_queue("queue rejected");
        let report = scheduler.tick(&listener);
        assert_eq!(report.emitters_skipped, 1);
        assert_eq!(report.buffers_submitted, 1);
        assert!(scheduler.poll_events().iter().any(|e| matches!(
            e,
            PetalSonicEvent::DeviceError { emitter_id: Some(emitter), .. } if *emitter == id
        )));

        // Next tick works from the device's real counts
        let report = scheduler.tick(&listener);
        assert_eq!(report.emitters_skipped, 0);
        assert_eq!(report.buffers_submitted, 0);
        assert_eq!(scheduler.device().buffers_queued(voice), 4);
    }

    #[test]
    fn test_spatialization_failure_submits_nothing() {
        let provider = provider_with("tone", &[0.5; 1024]);
        let backend = TestBackend::new();
        let state = backend.state();
        let mut scheduler = scheduler(provider, backend);
        let id = scheduler
            .add_emitter(EmitterDesc::new("tone").frame_size(128), Pose::default())
            .unwrap();
        let listener = PetalSonicAudioListener::default();

        state.borrow_mut().fail_binaural = true;
        let report = scheduler.tick(&listener);
        assert_eq!(report.buffers_submitted, 0);
        assert_eq!(report.emitters_skipped, 1);
        assert!(scheduler.device().submissions().is_empty());
        assert!(scheduler.poll_events().iter().any(|e| matches!(
            e,
            PetalSonicEvent::SpatializationError { .. }
        )));

        // Deficit left unresolved; filled on the next tick
        state.borrow_mut().fail_binaural = false;
        let report = scheduler.tick(&listener);
        assert_eq!(report.buffers_submitted, 4);
        let voice = voice_of(&scheduler, id);
        assert_eq!(scheduler.device().buffers_queued(voice), 4);
    }

    #[test]
    fn test_underrun_restarts_playback() {
        let provider = provider_with("tone", &[0.5; 1024]);
        let mut scheduler = scheduler(provider, TestBackend::new());
        let id = scheduler
            .add_emitter(EmitterDesc::new("tone").frame_size(128), Pose::default())
            .unwrap();
        let listener = PetalSonicAudioListener::default();
        let voice = voice_of(&scheduler, id);

        scheduler.tick(&listener);
        scheduler.device_mut().consume(voice, 4);
        assert_eq!(scheduler.device().voice_state(voice), VoiceState::Stopped);
        scheduler.poll_events();

        let report = scheduler.tick(&listener);
        assert_eq!(report.buffers_submitted, 4);
        assert_eq!(scheduler.device().voice_state(voice), VoiceState::Playing);
        assert_eq!(
            scheduler.poll_events(),
            vec![PetalSonicEvent::BufferUnderrun { emitter_id: id }]
        );
    }

    #[test]
    fn test_listener_orientation_reaches_output() {
        let provider = provider_with("tone", &[1.0; 256]);
        let mut scheduler = scheduler(provider, TestBackend::new());
        // Inside the minimum distance, to the listener's right
        scheduler
            .add_emitter(
                EmitterDesc::new("tone").frame_size(64),
                Pose::from_position(Vec3::new(0.05, 0.0, 0.0)),
            )
            .unwrap();

        scheduler.tick(&PetalSonicAudioListener::default());
        let mut out = vec![0.0; 8];
        scheduler.device_mut().render(&mut out, 2);
        assert_eq!(out, vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_remove_emitter_releases_everything() {
        let provider = provider_with("tone", &[0.5; 1024]);
        let backend = TestBackend::new();
        let state = backend.state();
        let mut scheduler = scheduler(provider, backend);
        let id = scheduler
            .add_emitter(EmitterDesc::new("tone").frame_size(128), Pose::default())
            .unwrap();
        scheduler.tick(&PetalSonicAudioListener::default());

        scheduler.remove_emitter(id).unwrap();
        assert!(scheduler.is_empty());
        assert!(scheduler.device().voices().is_empty());
        assert!(matches!(
            scheduler.remove_emitter(id),
            Err(PetalSonicError::UnknownEmitter(_))
        ));

        let state = state.borrow();
        assert_eq!(state.hrtf_released, 1);
        assert_eq!(state.binaural_released, 1);
        assert_eq!(state.direct_released, 1);
    }

    #[test]
    fn test_drop_deactivates_all_emitters() {
        let provider = provider_with("tone", &[0.5; 1024]);
        let backend = TestBackend::new();
        let state = backend.state();
        {
            let mut scheduler = scheduler(provider, backend);
            for _ in 0..3 {
                scheduler
                    .add_emitter(EmitterDesc::new("tone").frame_size(128), Pose::default())
                    .unwrap();
            }
        }
        assert_eq!(state.borrow().hrtf_released, 3);
    }

    #[test]
    fn test_set_pose_unknown_emitter() {
        let mut scheduler = scheduler(MemoryStreamProvider::new(), TestBackend::new());
        assert!(
            scheduler
                .set_emitter_pose(EmitterId(7), Pose::default())
                .is_err()
        );
    }
}
