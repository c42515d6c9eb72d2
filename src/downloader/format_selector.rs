// FormatSelector - one encoding per resolution
//
// Converts the raw encodings reported by the extractor into the choice list
// presented to the requester:
// - Audio-only encodings are dropped
// - Encodings above the resolution ceiling are dropped
// - Per height, the encoding with the highest size+bitrate score wins
// - Output is ordered by height, highest first; unknown height (0) sorts last

use std::collections::BTreeMap;

use super::models::EncodingCandidate;

/// Default resolution ceiling
pub const DEFAULT_MAX_HEIGHT: u32 = 1080;

/// Format selector with a resolution ceiling
#[derive(Debug, Clone, Copy)]
pub struct FormatSelector {
    max_height: u32,
}

impl FormatSelector {
    pub fn new(max_height: u32) -> Self {
        Self { max_height }
    }

    pub fn max_height(&self) -> u32 {
        self.max_height
    }

    /// Deduplicate by height, keeping the best-scored candidate of each bucket
    pub fn select(&self, candidates: &[EncodingCandidate]) -> Vec<EncodingCandidate> {
        let mut by_height: BTreeMap<u32, &EncodingCandidate> = BTreeMap::new();

        for candidate in candidates {
            if !candidate.has_video || candidate.height > self.max_height {
                continue;
            }

            match by_height.get(&candidate.height) {
                // Ties keep the first one seen
                Some(current) if candidate.score() <= current.score() => {}
                _ => {
                    by_height.insert(candidate.height, candidate);
                }
            }
        }

        by_height.into_values().rev().cloned().collect()
    }
}

impl Default for FormatSelector {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HEIGHT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_video_format(id: &str, height: u32, size: u64, tbr: f64) -> EncodingCandidate {
        EncodingCandidate {
            format_id: id.to_string(),
            height,
            estimated_size_bytes: size,
            bitrate_kbps: tbr,
            has_video: true,
            ext: "mp4".to_string(),
            format_note: None,
        }
    }

    fn make_audio_format(id: &str, size: u64) -> EncodingCandidate {
        EncodingCandidate {
            format_id: id.to_string(),
            height: 0,
            estimated_size_bytes: size,
            bitrate_kbps: 128.0,
            has_video: false,
            ext: "m4a".to_string(),
            format_note: Some("audio only".to_string()),
        }
    }

    fn ids(selected: &[EncodingCandidate]) -> Vec<&str> {
        selected.iter().map(|c| c.format_id.as_str()).collect()
    }

    #[test]
    fn test_one_per_height_descending() {
        let formats = vec![
            make_video_format("360a", 360, 10_000_000, 0.0),
            make_video_format("720a", 720, 50_000_000, 0.0),
            make_video_format("1080a", 1080, 100_000_000, 0.0),
            make_video_format("720b", 720, 60_000_000, 0.0),
            make_video_format("360b", 360, 9_000_000, 0.0),
        ];

        let selected = FormatSelector::default().select(&formats);

        assert_eq!(ids(&selected), vec!["1080a", "720b", "360a"]);
        let heights: Vec<u32> = selected.iter().map(|c| c.height).collect();
        assert!(heights.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn test_audio_only_never_selected() {
        let formats = vec![
            make_audio_format("140", 5_000_000_000),
            make_video_format("480", 480, 25_000_000, 0.0),
        ];

        let selected = FormatSelector::default().select(&formats);

        assert_eq!(ids(&selected), vec!["480"]);
    }

    #[test]
    fn test_ceiling_excludes_higher_resolutions() {
        let formats = vec![
            make_video_format("2160", 2160, 900_000_000, 0.0),
            make_video_format("1440", 1440, 500_000_000, 0.0),
            make_video_format("1080", 1080, 100_000_000, 0.0),
        ];

        assert_eq!(ids(&FormatSelector::default().select(&formats)), vec!["1080"]);
        assert_eq!(
            ids(&FormatSelector::new(1440).select(&formats)),
            vec!["1440", "1080"]
        );
    }

    #[test]
    fn test_bitrate_breaks_unknown_size() {
        let formats = vec![
            make_video_format("low", 720, 0, 1500.0),
            make_video_format("high", 720, 0, 2500.0),
        ];

        assert_eq!(ids(&FormatSelector::default().select(&formats)), vec!["high"]);
    }

    #[test]
    fn test_equal_score_keeps_first_seen() {
        let formats = vec![
            make_video_format("first", 720, 1_000, 1.0),
            make_video_format("second", 720, 1_000, 1.0),
        ];

        assert_eq!(ids(&FormatSelector::default().select(&formats)), vec!["first"]);
    }

    #[test]
    fn test_unknown_height_sorts_last() {
        let formats = vec![
            make_video_format("unknown", 0, 999_999_999, 0.0),
            make_video_format("240", 240, 1_000, 0.0),
        ];

        assert_eq!(
            ids(&FormatSelector::default().select(&formats)),
            vec!["240", "unknown"]
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(FormatSelector::default().select(&[]).is_empty());
    }
}
