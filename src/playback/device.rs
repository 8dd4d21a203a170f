//! Output device discovery and stream setup.

use crate::error::{PrevisitError, Result};
use cpal::traits::{DeviceTrait, HostTrait};
use rodio::{OutputStream, OutputStreamHandle};

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// ALSA and JACK print probing noise to fd 2 while cpal enumerates backends.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2.
/// Safe as long as no other thread is concurrently manipulating fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Quiet JACK/ALSA/PipeWire diagnostics before the first device probe.
///
/// Modifies environment variables, so it must run while the process is
/// still single-threaded (`main` calls it before building the runtime).
pub fn suppress_audio_warnings() {
    // SAFETY: only called from `main` before any other thread exists
    unsafe {
        std::env::set_var("JACK_NO_START_SERVER", "1");
        std::env::set_var("JACK_NO_AUDIO_RESERVATION", "1");
        std::env::set_var("PIPEWIRE_DEBUG", "0");
        std::env::set_var("ALSA_DEBUG", "0");
        std::env::set_var("PW_LOG", "0");
    }
}

const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

/// Device names not worth offering for speech playback.
const FILTERED_PATTERNS: &[&str] = &["surround", "front:", "rear:", "center:", "side:", "S/PDIF"];

fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES
        .iter()
        .any(|pref| lower.contains(&pref.to_lowercase()))
}

/// Output devices, preferred ones marked with "\[recommended\]".
pub fn list_output_devices() -> Result<Vec<String>> {
    let devices = with_suppressed_stderr(|| cpal::default_host().output_devices());
    let devices = devices.map_err(|e| PrevisitError::AudioPlayback {
        message: format!("Failed to enumerate output devices: {e}"),
    })?;

    let mut names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            if should_filter_device(&name) {
                continue;
            }
            if is_preferred_device(&name) {
                names.push(format!("{name} [recommended]"));
            } else {
                names.push(name);
            }
        }
    }
    Ok(names)
}

/// Find an output device by exact name. A trailing " \[recommended\]" marker
/// (as printed by `previsit devices`) is accepted.
pub fn find_output_device(name: &str) -> Result<cpal::Device> {
    let wanted = name.trim_end_matches(" [recommended]");
    with_suppressed_stderr(|| {
        let devices = cpal::default_host()
            .output_devices()
            .map_err(|e| PrevisitError::AudioPlayback {
                message: format!("Failed to enumerate output devices: {e}"),
            })?;
        for device in devices {
            if let Ok(device_name) = device.name()
                && device_name == wanted
            {
                return Ok(device);
            }
        }
        Err(PrevisitError::AudioDeviceNotFound {
            device: wanted.to_string(),
        })
    })
}

/// Open an output stream on the named device, or the system default.
///
/// The returned `OutputStream` must stay alive (and on this thread) for as
/// long as anything plays through the handle.
pub fn open_output_stream(device: Option<&str>) -> Result<(OutputStream, OutputStreamHandle)> {
    let opened = match device {
        Some(name) => {
            let device = find_output_device(name)?;
            with_suppressed_stderr(|| OutputStream::try_from_device(&device))
        }
        None => with_suppressed_stderr(OutputStream::try_default),
    };
    opened.map_err(|e| match device {
        Some(name) => PrevisitError::AudioPlayback {
            message: format!("Failed to open output device '{name}': {e}"),
        },
        None => PrevisitError::AudioDeviceNotFound {
            device: format!("default ({e})"),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_multichannel_outputs() {
        assert!(should_filter_device("surround51:CARD=PCH"));
        assert!(should_filter_device("front:CARD=PCH,DEV=0"));
        assert!(should_filter_device("iec958 S/PDIF"));
        assert!(!should_filter_device("pipewire"));
        assert!(!should_filter_device("HDMI Output"));
        assert!(!should_filter_device("Built-in Audio"));
    }

    #[test]
    fn prefers_sound_servers() {
        assert!(is_preferred_device("PipeWire"));
        assert!(is_preferred_device("pulse"));
        assert!(!is_preferred_device("hw:0,0"));
        assert!(!is_preferred_device("default"));
    }

    #[test]
    fn unknown_device_is_reported() {
        match find_output_device("NonExistentDevice12345 [recommended]") {
            Err(PrevisitError::AudioDeviceNotFound { device }) => {
                assert_eq!(device, "NonExistentDevice12345");
            }
            // hosts without any backend fail enumeration instead
            Err(PrevisitError::AudioPlayback { .. }) => {}
            other => panic!("expected a lookup failure, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn lists_at_least_one_output() {
        let devices = list_output_devices().unwrap();
        assert!(!devices.is_empty());
    }
}
