//! Deterministic [`SpatialBackend`] for unit tests.
//!
//! Geometry uses the reference `glam` math. The binaural stage is a linear pan on the
//! direction's x component, scaled by the HRTF volume. The direct stage multiplies by the
//! attenuation. Every handle
//! records its creation and release so tests can check lifecycle ordering.

use crate::error::{PetalSonicError, Result};
use crate::math::{Pose, Vec3};
use crate::spatial::{
    BinauralParams, DistanceAttenuationModel, FrameSettings, HrtfConfig, SpatialBackend,
    relative_direction,
};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Default)]
pub struct TestBackendState {
    pub hrtf_created: usize,
    pub hrtf_released: usize,
    pub binaural_created: usize,
    pub binaural_released: usize,
    pub direct_created: usize,
    pub direct_released: usize,
    pub binaural_applied: usize,
    pub direct_applied: usize,
    pub release_order: Vec<&'static str>,
    pub call_log: Vec<&'static str>,
    pub last_attenuation: f32,
    pub fail_binaural: bool,
    pub fail_create_direct: bool,
}

type SharedState = Rc<RefCell<TestBackendState>>;

pub struct TestHrtf {
    pub volume: f32,
    state: SharedState,
}

impl Drop for TestHrtf {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.hrtf_released += 1;
        state.release_order.push("hrtf");
    }
}

pub struct TestBinaural {
    state: SharedState,
}

impl Drop for TestBinaural {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.binaural_released += 1;
        state.release_order.push("binaural");
    }
}

pub struct TestDirect {
    state: SharedState,
}

impl Drop for TestDirect {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.direct_released += 1;
        state.release_order.push("direct");
    }
}

#[derive(Default)]
pub struct TestBackend {
    state: SharedState,
}

impl TestBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SharedState {
        Rc::clone(&self.state)
    }
}

impl SpatialBackend for TestBackend {
    type Hrtf = TestHrtf;
    type BinauralEffect = TestBinaural;
    type DirectEffect = TestDirect;

    fn relative_direction(&self, emitter: Vec3, listener: &Pose) -> Vec3 {
        self.state.borrow_mut().call_log.push("relative_direction");
        relative_direction(emitter, listener)
    }

    fn distance_attenuation(
        &self,
        emitter: Vec3,
        listener: Vec3,
        model: &DistanceAttenuationModel,
    ) -> f32 {
        self.state.borrow_mut().call_log.push("distance_attenuation");
        model.evaluate(emitter, listener)
    }

    fn create_hrtf(&mut self, _settings: &FrameSettings, config: &HrtfConfig) -> Result<TestHrtf> {
        self.state.borrow_mut().hrtf_created += 1;
        Ok(TestHrtf {
            volume: config.volume,
            state: self.state(),
        })
    }

    fn create_binaural_effect(
        &mut self,
        _settings: &FrameSettings,
        _hrtf: &TestHrtf,
    ) -> Result<TestBinaural> {
        self.state.borrow_mut().binaural_created += 1;
        Ok(TestBinaural {
            state: self.state(),
        })
    }

    fn create_direct_effect(
        &mut self,
        _settings: &FrameSettings,
        _num_channels: usize,
    ) -> Result<TestDirect> {
        let mut state = self.state.borrow_mut();
        if state.fail_create_direct {
            return Err(PetalSonicError::Spatialization(
                "direct effect creation failed".to_string(),
            ));
        }
        state.direct_created += 1;
        drop(state);
        Ok(TestDirect {
            state: self.state(),
        })
    }

    fn apply_binaural(
        &mut self,
        _effect: &mut TestBinaural,
        params: &BinauralParams<'_, TestHrtf>,
        input: &[f32],
        output: &mut [f32],
    ) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.fail_binaural {
            return Err(PetalSonicError::Spatialization(
                "binaural effect failed".to_string(),
            ));
        }
        state.binaural_applied += 1;
        state.call_log.push("binaural");

        let pan = params.direction.x.clamp(-1.0, 1.0);
        let left_gain = (1.0 - pan) * 0.5 * params.hrtf.volume;
        let right_gain = (1.0 + pan) * 0.5 * params.hrtf.volume;

        let (left, right) = output.split_at_mut(input.len());
        for ((l, r), sample) in left.iter_mut().zip(right.iter_mut()).zip(input) {
            *l = sample * left_gain;
            *r = sample * right_gain;
        }
        Ok(())
    }

    fn apply_direct(
        &mut self,
        _effect: &mut TestDirect,
        distance_attenuation: f32,
        frame: &mut [f32],
        _num_channels: usize,
    ) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.direct_applied += 1;
        state.call_log.push("direct");
        state.last_attenuation = distance_attenuation;

        for sample in frame.iter_mut() {
            *sample *= distance_attenuation;
        }
        Ok(())
    }
}
