use serde::{Deserialize, Serialize};

/// Clip lengths the video service accepts at 1080p/25fps.
pub const VALID_CLIP_SECS: [u32; 8] = [6, 8, 10, 12, 14, 16, 18, 20];

/// Named style presets and their prompt expansions. "Custom" is handled by
/// passing free text straight through `expand_style`.
pub const STYLE_PRESETS: &[(&str, &str)] = &[
    (
        "Cinematic Stock Footage",
        "cinematic stock footage, professional quality, smooth camera movements",
    ),
    (
        "Nature Documentary",
        "nature documentary style, BBC Earth quality, wildlife and landscapes",
    ),
    (
        "News/Corporate",
        "professional news broadcast style, clean and modern, corporate aesthetic",
    ),
    (
        "Artistic/Abstract",
        "artistic abstract visuals, creative color grading, experimental cinematography",
    ),
    (
        "Vintage/Retro",
        "vintage film aesthetic, warm colors, nostalgic mood, film grain",
    ),
    (
        "Tech/Futuristic",
        "futuristic technology aesthetic, sleek and modern, digital effects",
    ),
];

/// One planned scene: the text-to-video prompt and its target length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub index: usize,
    pub prompt: String,
    pub duration_secs: u32,
}

/// Ordered storyboard for a job. Clip order in the final video always
/// equals scene order here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenePlan {
    pub scenes: Vec<Scene>,
}

impl ScenePlan {
    pub fn new(scenes: Vec<Scene>) -> Self {
        Self { scenes }
    }

    /// Collapse the plan to a single scene, e.g. when the caller supplies a
    /// prompt override instead of a transcript.
    pub fn single(prompt: String, audio_secs: f64) -> Self {
        Self {
            scenes: vec![Scene {
                index: 0,
                prompt,
                duration_secs: snap_duration(audio_secs.round() as u32),
            }],
        }
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn total_secs(&self) -> u32 {
        self.scenes.iter().map(|s| s.duration_secs).sum()
    }
}

/// How many clips to request for a given audio length: roughly one per
/// twelve seconds, clamped to a workable range.
pub fn clip_count_for(audio_secs: f64) -> usize {
    ((audio_secs / 12.0) as usize).clamp(4, 20)
}

/// Snap an arbitrary duration to the nearest value the video service
/// accepts.
pub fn snap_duration(secs: u32) -> u32 {
    let mut best = VALID_CLIP_SECS[0];
    for candidate in VALID_CLIP_SECS {
        if candidate.abs_diff(secs) < best.abs_diff(secs) {
            best = candidate;
        }
    }
    best
}

/// Models wrap JSON answers in markdown fences more often than not.
pub fn strip_code_fences(text: &str) -> &str {
    text.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Expand a style preset name to its full prompt text. Unknown names are
/// treated as free-text style descriptions; optional notes are appended.
pub fn expand_style(style: &str, notes: Option<&str>) -> String {
    let base = STYLE_PRESETS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(style))
        .map(|(_, expansion)| *expansion)
        .unwrap_or(style);

    match notes {
        Some(notes) if !notes.trim().is_empty() => format!("{base}, {notes}"),
        _ => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snap_picks_nearest_valid_duration() {
        assert_eq!(snap_duration(0), 6);
        assert_eq!(snap_duration(7), 6);
        assert_eq!(snap_duration(9), 8);
        assert_eq!(snap_duration(11), 10);
        assert_eq!(snap_duration(20), 20);
        assert_eq!(snap_duration(300), 20);
    }

    #[test]
    fn clip_count_is_clamped() {
        assert_eq!(clip_count_for(10.0), 4);
        assert_eq!(clip_count_for(120.0), 10);
        assert_eq!(clip_count_for(3600.0), 20);
    }

    #[test]
    fn fences_are_stripped() {
        assert_eq!(strip_code_fences("```json\n[1,2]\n```"), "[1,2]");
        assert_eq!(strip_code_fences("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fences("  [1]  "), "[1]");
    }

    #[test]
    fn presets_expand_and_free_text_passes_through() {
        let expanded = expand_style("Vintage/Retro", None);
        assert!(expanded.contains("film grain"));

        let custom = expand_style("underwater ocean documentary", Some("blue tones"));
        assert_eq!(custom, "underwater ocean documentary, blue tones");
    }

    #[test]
    fn single_scene_plan_covers_the_audio() {
        let plan = ScenePlan::single("a quiet street".into(), 9.6);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.scenes[0].duration_secs, 10);
    }
}
