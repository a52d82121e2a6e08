//! Encoding profiles.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// How the merged output is encoded.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MergeProfile {
    /// Stream copy. Fast, but every input must share container and codecs.
    #[default]
    #[strum(to_string = "fast_copy", serialize = "fast", serialize = "copy")]
    FastCopy,
    /// Re-encode to H.264/AAC at a fixed quality target.
    #[strum(to_string = "compatible", serialize = "small")]
    Compatible,
}

impl MergeProfile {
    /// Encoder arguments placed between the inputs and the output.
    pub fn args(self) -> &'static [&'static str] {
        match self {
            Self::FastCopy => &["-c", "copy", "-movflags", "+faststart"],
            Self::Compatible => &[
                "-c:v",
                "libx264",
                "-preset",
                "veryfast",
                "-crf",
                "23",
                "-pix_fmt",
                "yuv420p",
                "-c:a",
                "aac",
                "-b:a",
                "160k",
                "-movflags",
                "+faststart",
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_names() {
        assert_eq!(MergeProfile::FastCopy.to_string(), "fast_copy");
        assert_eq!("small".parse::<MergeProfile>().unwrap(), MergeProfile::Compatible);
        assert_eq!("copy".parse::<MergeProfile>().unwrap(), MergeProfile::FastCopy);
        assert!("h265".parse::<MergeProfile>().is_err());
    }

    #[test]
    fn test_fast_copy_never_reencodes() {
        assert!(MergeProfile::FastCopy.args().windows(2).any(|w| w == ["-c", "copy"]));
        assert!(MergeProfile::Compatible.args().contains(&"libx264"));
    }
}
