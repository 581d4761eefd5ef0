//! Codec preferences and their upstream flavor codes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which upstream protocol serves a codec.
///
/// The family fixes both the variant query and the decryption key slot, so a
/// run picks it once up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecFamily {
    /// Stream-info lookup; keys carried as inline key-system headers.
    Modern,
    /// Web playback asset list; keys named by the stream playlist.
    Legacy,
}

/// Requested audio encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SongCodec {
    #[default]
    Aac,
    AacHe,
    Alac,
    Atmos,
    AacLegacy,
    AacHeLegacy,
}

impl SongCodec {
    pub const ALL: [SongCodec; 6] = [
        SongCodec::Aac,
        SongCodec::AacHe,
        SongCodec::Alac,
        SongCodec::Atmos,
        SongCodec::AacLegacy,
        SongCodec::AacHeLegacy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aac => "aac",
            Self::AacHe => "aac-he",
            Self::Alac => "alac",
            Self::Atmos => "atmos",
            Self::AacLegacy => "aac-legacy",
            Self::AacHeLegacy => "aac-he-legacy",
        }
    }

    /// Upstream flavor code of the variant carrying this codec.
    pub fn flavor(&self) -> &'static str {
        match self {
            Self::Aac => "audio-stereo-256",
            Self::AacHe => "audio-HE-stereo-64",
            Self::Alac => "audio-alac-stereo",
            Self::Atmos => "audio-atmos-2768",
            Self::AacLegacy => "28:ctrp256",
            Self::AacHeLegacy => "32:ctrp64",
        }
    }

    pub fn family(&self) -> CodecFamily {
        match self {
            Self::AacLegacy | Self::AacHeLegacy => CodecFamily::Legacy,
            _ => CodecFamily::Modern,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Aac => "AAC 256kbps",
            Self::AacHe => "AAC-HE 64kbps",
            Self::Alac => "ALAC (Lossless)",
            Self::Atmos => "Dolby Atmos",
            Self::AacLegacy => "AAC 256kbps (Legacy)",
            Self::AacHeLegacy => "AAC-HE 64kbps (Legacy)",
        }
    }

    /// Extension of the final container, including the dot. Every codec is
    /// remuxed into an MPEG-4 audio file.
    pub fn file_extension(&self) -> &'static str {
        ".m4a"
    }
}

impl fmt::Display for SongCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SongCodec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<_> = Self::ALL.iter().map(|c| c.as_str()).collect();
                format!("unknown codec '{s}', expected one of: {}", known.join(", "))
            })
    }
}
