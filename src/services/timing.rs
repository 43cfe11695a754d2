use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct WordTiming {
    pub word: String,
    /// Offset from utterance start at which the word is highlighted.
    pub at: Duration,
    pub duration: Duration,
}

/// Estimates when each whitespace-separated word of `text` starts being spoken.
///
/// Speech engines rarely report word boundaries, so highlights are simulated: every word
/// gets `max(chars * base * 0.1, base * 0.3)` where `base = 1000ms / speed`. The first word
/// fires half-way into its own duration and every later word after the cumulative duration
/// of the words before it.
pub fn estimate_word_timings(text: &str, speed: f32) -> Vec<WordTiming> {
    let speed = if speed.is_finite() && speed > 0.0 {
        speed as f64
    } else {
        1.0
    };
    let base_ms = 1000.0 / speed;

    let mut timings = Vec::new();
    let mut offset_ms = 0.0;
    for (i, word) in text.split_whitespace().enumerate() {
        let chars = word.chars().count() as f64;
        let duration_ms = (chars * base_ms * 0.1).max(base_ms * 0.3);
        if i == 0 {
            offset_ms = duration_ms * 0.5;
        }
        timings.push(WordTiming {
            word: word.to_string(),
            at: from_millis_f64(offset_ms),
            duration: from_millis_f64(duration_ms),
        });
        offset_ms += duration_ms;
    }
    timings
}

fn from_millis_f64(ms: f64) -> Duration {
    Duration::from_micros((ms * 1000.0).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_count_matches_whitespace_tokens() {
        let text = "  Shalom   olam\tmah\nnishma  ";
        let timings = estimate_word_timings(text, 1.0);
        assert_eq!(timings.len(), text.split_whitespace().count());
        assert_eq!(timings[0].word, "Shalom");
        assert_eq!(timings[3].word, "nishma");
        assert!(estimate_word_timings("   ", 1.0).is_empty());
    }

    #[test]
    fn test_offsets_are_cumulative() {
        // "hi" hits the 0.3 floor (300ms), "elephant" is 8 chars (800ms).
        let timings = estimate_word_timings("hi elephant ok", 1.0);
        assert_eq!(timings[0].duration, Duration::from_millis(300));
        assert_eq!(timings[1].duration, Duration::from_millis(800));
        assert_eq!(timings[0].at, Duration::from_millis(150));
        assert_eq!(timings[1].at, Duration::from_millis(450));
        assert_eq!(timings[2].at, Duration::from_millis(1250));

        for pair in timings.windows(2) {
            assert!(pair[0].at < pair[1].at);
        }
    }

    #[test]
    fn test_faster_speed_never_lengthens_durations() {
        let text = "a quick brown fox jumps";
        let slow = estimate_word_timings(text, 1.0);
        let fast = estimate_word_timings(text, 2.0);
        for (s, f) in slow.iter().zip(&fast) {
            assert!(f.duration < s.duration);
            assert!(f.at <= s.at);
        }
    }

    #[test]
    fn test_invalid_speed_falls_back_to_normal() {
        let normal = estimate_word_timings("hello world", 1.0);
        assert_eq!(estimate_word_timings("hello world", 0.0), normal);
        assert_eq!(estimate_word_timings("hello world", -3.0), normal);
        assert_eq!(estimate_word_timings("hello world", f32::NAN), normal);
    }
}
