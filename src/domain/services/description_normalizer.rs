//! Cleanup and acceptance of scraped description text

const BULLETS: [char; 4] = ['•', '·', '▪', '●'];
const ELLIPSIS: &str = "...";

/// Normalizes raw strategy output and enforces the length window.
///
/// Lines are cleaned independently: bullets and dash runs become spaces,
/// whitespace collapses, and lines shorter than `min_line_length` are
/// discarded as navigation or metadata. Surviving lines are joined with a
/// single space and truncated to `max_length` characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptionNormalizer {
    min_length: usize,
    max_length: usize,
    min_line_length: usize,
}

impl Default for DescriptionNormalizer {
    fn default() -> Self {
        Self::new(50, 2000, 20)
    }
}

impl DescriptionNormalizer {
    pub const fn new(min_length: usize, max_length: usize, min_line_length: usize) -> Self {
        Self {
            min_length,
            max_length,
            min_line_length,
        }
    }

    pub const fn min_length(&self) -> usize {
        self.min_length
    }

    pub fn normalize(&self, raw: &str) -> String {
        let kept: Vec<String> = raw
            .lines()
            .map(clean_line)
            .filter(|line| line.chars().count() >= self.min_line_length)
            .collect();

        truncate_chars(&kept.join(" "), self.max_length)
    }

    /// Normalized text if it is long enough to be accepted
    pub fn accept(&self, raw: &str) -> Option<String> {
        let text = self.normalize(raw);
        (text.chars().count() >= self.min_length).then_some(text)
    }
}

fn clean_line(line: &str) -> String {
    let chars: Vec<char> = line
        .chars()
        .map(|c| if BULLETS.contains(&c) { ' ' } else { c })
        .collect();

    let mut out = String::with_capacity(line.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '-' {
            // a run of two or more dashes, possibly separated by spaces
            let mut dashes = 1;
            let mut end = i + 1;
            let mut j = i + 1;
            while j < chars.len() && (chars[j] == '-' || chars[j].is_whitespace()) {
                if chars[j] == '-' {
                    dashes += 1;
                    end = j + 1;
                }
                j += 1;
            }
            if dashes >= 2 {
                out.push(' ');
                i = end;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        return text.to_string();
    }

    let keep = max_length.saturating_sub(ELLIPSIS.len());
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}
