use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of resolutions a job may request, ordered from highest to
/// lowest — this is also the order renditions appear in the master playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    #[serde(rename = "1080p")]
    R1080p,
    #[serde(rename = "720p")]
    R720p,
    #[serde(rename = "480p")]
    R480p,
    #[serde(rename = "360p")]
    R360p,
    #[serde(rename = "240p")]
    R240p,
}

impl Resolution {
    pub const ALL: [Resolution; 5] = [
        Resolution::R1080p,
        Resolution::R720p,
        Resolution::R480p,
        Resolution::R360p,
        Resolution::R240p,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::R1080p => "1080p",
            Resolution::R720p => "720p",
            Resolution::R480p => "480p",
            Resolution::R360p => "360p",
            Resolution::R240p => "240p",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Resolution> {
        match s {
            "1080p" => Some(Resolution::R1080p),
            "720p" => Some(Resolution::R720p),
            "480p" => Some(Resolution::R480p),
            "360p" => Some(Resolution::R360p),
            "240p" => Some(Resolution::R240p),
            _ => None,
        }
    }

    pub fn profile(&self) -> &'static Profile {
        match self {
            Resolution::R1080p => &PROFILE_1080P,
            Resolution::R720p => &PROFILE_720P,
            Resolution::R480p => &PROFILE_480P,
            Resolution::R360p => &PROFILE_360P,
            Resolution::R240p => &PROFILE_240P,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum H264Profile {
    Baseline,
    Main,
    High,
}

impl H264Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            H264Profile::Baseline => "baseline",
            H264Profile::Main => "main",
            H264Profile::High => "high",
        }
    }
}

/// One row of the fixed resolution/profile table the encoder driver targets.
#[derive(Debug, Clone, Copy)]
pub struct Profile {
    pub name: Resolution,
    pub width: u32,
    pub height: u32,
    pub video_kbps: u32,
    pub audio_kbps: u32,
    pub h264_profile: H264Profile,
    pub h264_level: &'static str,
    pub codecs: &'static str,
}

impl Profile {
    pub fn bandwidth_bps(&self) -> u64 {
        (self.video_kbps as u64 + self.audio_kbps as u64) * 1000
    }

    pub fn maxrate_kbps(&self) -> u32 {
        self.video_kbps
    }

    pub fn bufsize_kbps(&self) -> u32 {
        self.video_kbps * 2
    }
}

pub static PROFILE_1080P: Profile = Profile {
    name: Resolution::R1080p,
    width: 1920,
    height: 1080,
    video_kbps: 6593,
    audio_kbps: 192,
    h264_profile: H264Profile::High,
    h264_level: "4.0",
    codecs: "avc1.640028,mp4a.40.5",
};

pub static PROFILE_720P: Profile = Profile {
    name: Resolution::R720p,
    width: 1280,
    height: 720,
    video_kbps: 2766,
    audio_kbps: 128,
    h264_profile: H264Profile::High,
    h264_level: "4.0",
    codecs: "avc1.640028,mp4a.40.5",
};

pub static PROFILE_480P: Profile = Profile {
    name: Resolution::R480p,
    width: 854,
    height: 480,
    video_kbps: 1395,
    audio_kbps: 128,
    h264_profile: H264Profile::Main,
    h264_level: "3.1",
    codecs: "avc1.42001f,mp4a.40.5",
};

pub static PROFILE_360P: Profile = Profile {
    name: Resolution::R360p,
    width: 640,
    height: 360,
    video_kbps: 1038,
    audio_kbps: 96,
    h264_profile: H264Profile::Main,
    h264_level: "3.1",
    codecs: "avc1.4d001f,mp4a.40.5",
};

pub static PROFILE_240P: Profile = Profile {
    name: Resolution::R240p,
    width: 426,
    height: 240,
    video_kbps: 400,
    audio_kbps: 64,
    h264_profile: H264Profile::Baseline,
    h264_level: "3.0",
    codecs: "avc1.42001e,mp4a.40.5",
};

/// Filters `requested` down to resolutions that do not exceed `source_height`,
/// preserving the requested order (spec: no-upscale invariant).
pub fn valid_resolutions(requested: &[Resolution], source_height: u32) -> Vec<Resolution> {
    requested
        .iter()
        .copied()
        .filter(|r| r.profile().height <= source_height)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_str_round_trips() {
        for r in Resolution::ALL {
            assert_eq!(Resolution::from_str_loose(r.as_str()), Some(r));
        }
    }

    #[test]
    fn profile_bandwidth_matches_spec() {
        assert_eq!(PROFILE_1080P.bandwidth_bps(), (6593 + 192) * 1000);
        assert_eq!(PROFILE_240P.bandwidth_bps(), (400 + 64) * 1000);
    }

    #[test]
    fn no_upscale_filters_by_height() {
        let requested = vec![Resolution::R1080p, Resolution::R720p, Resolution::R240p];
        let valid = valid_resolutions(&requested, 640);
        assert_eq!(valid, vec![Resolution::R240p]);
    }

    #[test]
    fn no_upscale_preserves_requested_order() {
        let requested = vec![Resolution::R480p, Resolution::R720p, Resolution::R240p];
        let valid = valid_resolutions(&requested, 1080);
        assert_eq!(
            valid,
            vec![Resolution::R480p, Resolution::R720p, Resolution::R240p]
        );
    }
}
