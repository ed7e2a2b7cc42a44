use super::backend::{HrtfConfig, HrtfNormalization};
use crate::error::{PetalSonicError, Result};
use audionimbus::{AudioSettings, Context, Hrtf, HrtfSettings, Sofa, VolumeNormalization};

fn volume_normalization(normalization: HrtfNormalization) -> VolumeNormalization {
    match normalization {
        HrtfNormalization::None => VolumeNormalization::None,
        HrtfNormalization::RootMeanSquared => VolumeNormalization::RootMeanSquared,
    }
}

/// Creates an HRTF from `config`, loading the SOFA file when one is set.
pub fn create_hrtf(
    context: &Context,
    audio_settings: &AudioSettings,
    config: &HrtfConfig,
) -> Result<Hrtf> {
    match config.sofa_path.as_deref() {
        Some(path) => create_hrtf_from_file(context, audio_settings, config, path),
        None => create_default_hrtf(context, audio_settings, config),
    }
}

/// Steam Audio's built-in HRTF at the configured volume.
fn create_default_hrtf(
    context: &Context,
    audio_settings: &AudioSettings,
    config: &HrtfConfig,
) -> Result<Hrtf> {
    let hrtf = Hrtf::try_new(
        context,
        audio_settings,
        &HrtfSettings {
            volume: config.volume,
            volume_normalization: volume_normalization(config.normalization),
            sofa_information: None,
            ..Default::default()
        },
    )
    .map_err(|e| PetalSonicError::Spatialization(format!("Failed to create HRTF: {}", e)))?;

    log::debug!("Created default HRTF (volume: {})", config.volume);
    Ok(hrtf)
}

fn create_hrtf_from_file(
    context: &Context,
    audio_settings: &AudioSettings,
    config: &HrtfConfig,
    sofa_path: &str,
) -> Result<Hrtf> {
    let hrtf_data = std::fs::read(sofa_path).map_err(|e| {
        PetalSonicError::ResourceUnavailable(format!(
            "Failed to read HRTF file {}: {}",
            sofa_path, e
        ))
    })?;

    let hrtf = Hrtf::try_new(
        context,
        audio_settings,
        &HrtfSettings {
            volume: config.volume,
            volume_normalization: volume_normalization(config.normalization),
            sofa_information: Some(Sofa::Buffer(hrtf_data)),
            ..Default::default()
        },
    )
    .map_err(|e| {
        PetalSonicError::Spatialization(format!("Failed to create HRTF from file: {}", e))
    })?;

    log::debug!("Created HRTF from file: {}", sofa_path);
    Ok(hrtf)
}
