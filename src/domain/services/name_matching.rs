//! Product name matching helpers used by the description import

/// Lowercase ASCII slug, folding common Latin accents (`"Écran 4K"` -> `"ecran-4k"`)
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for c in input.chars().flat_map(char::to_lowercase) {
        let folded = fold_accent(c);
        if folded.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(folded);
        } else if c == '\'' || c == '’' {
            // apostrophes join words rather than split them
        } else {
            pending_dash = true;
        }
    }

    slug
}

const fn fold_accent(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        _ => c,
    }
}

/// Normalized Levenshtein similarity in `[0.0, 1.0]`
pub fn string_similarity(s1: &str, s2: &str) -> f64 {
    let len1 = s1.chars().count();
    let len2 = s2.chars().count();

    if len1 == 0 && len2 == 0 {
        return 1.0;
    }
    if len1 == 0 || len2 == 0 {
        return 0.0;
    }

    #[allow(clippy::cast_precision_loss)]
    let (distance, max_len) = (levenshtein_distance(s1, s2) as f64, len1.max(len2) as f64);

    1.0 - (distance / max_len)
}

fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();

    // two-row variant of the classic matrix
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Samsung Galaxy A15 128Go", "samsung-galaxy-a15-128go")]
    #[case("  Écran PC 27\" — Full HD  ", "ecran-pc-27-full-hd")]
    #[case("L'Oréal Élvive", "loreal-elvive")]
    #[case("---", "")]
    fn slugifies(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(slugify(input), expected);
    }

    #[test]
    fn similarity_bounds() {
        assert!((string_similarity("", "") - 1.0).abs() < f64::EPSILON);
        assert!(string_similarity("abc", "").abs() < f64::EPSILON);
        assert!((string_similarity("iphone 15", "iphone 15") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn similarity_tolerates_small_edits() {
        let sim = string_similarity("samsung galaxy a15", "samsung galaxy a15 ");
        assert!(sim > 0.9);
        assert!(string_similarity("hp laserjet", "dell xps 13") < 0.5);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
    }
}
