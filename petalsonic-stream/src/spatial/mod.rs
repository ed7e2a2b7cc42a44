// Spatial audio module
//
// Binaural rendering and distance attenuation for streamed emitters. The pipeline in
// `processor` is written against the `SpatialBackend` trait; `steam_audio` provides the
// Steam Audio implementation.

mod attenuation;
mod backend;
mod hrtf;
mod processor;
mod steam_audio;

// Public API
pub use attenuation::{DistanceAttenuationModel, relative_direction};
pub use backend::{
    BinauralParams, FrameSettings, HrtfConfig, HrtfInterpolation, HrtfNormalization,
    SpatialBackend, interleave_planar,
};
pub use processor::{STEREO_CHANNELS, SpatialProcessor};
pub use steam_audio::SteamAudioBackend;
