//! Display helpers

use crate::types::LevelSelection;

/// `m:ss` below an hour, `h:mm:ss` above. Unknown or negative times read `0:00`.
pub fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "0:00".to_string();
    }
    let total = seconds.floor() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

/// Menu label for a quality level of `height` pixels
pub fn level_label(selection: LevelSelection, height: Option<u32>) -> String {
    match (selection, height) {
        (LevelSelection::Auto, _) => "Auto".to_string(),
        (LevelSelection::Pinned(_), Some(height)) if height > 0 => format!("{}p", height),
        (LevelSelection::Pinned(index), _) => format!("Level {}", index + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0.0), "0:00");
        assert_eq!(format_time(65.9), "1:05");
        assert_eq!(format_time(3599.0), "59:59");
        assert_eq!(format_time(3725.0), "1:02:05");
        assert_eq!(format_time(f64::NAN), "0:00");
        assert_eq!(format_time(-4.0), "0:00");
    }

    #[test]
    fn test_level_label() {
        assert_eq!(level_label(LevelSelection::Auto, Some(1080)), "Auto");
        assert_eq!(level_label(LevelSelection::Pinned(2), Some(720)), "720p");
        assert_eq!(level_label(LevelSelection::Pinned(0), None), "Level 1");
    }
}
