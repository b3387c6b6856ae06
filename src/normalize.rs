use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Normalize a word into its lookup key: lowercase, NFD-decompose and drop
/// combining marks so that accented and unaccented spellings collide.
/// Base letters are never removed.
pub fn normalize(s: &str) -> String {
    // Lowercase first. Some uppercase letters lowercase into a base letter plus
    // a combining mark (İ -> i + U+0307), which the decomposition pass then strips.
    s.to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: &[&str] = &[
        "",
        "casa",
        "CASA",
        "cása",
        "Çà et là",
        "İstanbul",
        "Ångström",
        "straße",
        "øre",
        "puellae",
        "ÆTHER",
        "ὁδός",
        "Mосква́",
        "a\u{0301}\u{0301}",
        "日本語",
    ];

    #[test]
    fn test_case_and_diacritics_collide() {
        assert_eq!(normalize("CASA"), "casa");
        assert_eq!(normalize("cása"), "casa");
        assert_eq!(normalize("CÁSA"), "casa");
        assert_eq!(normalize("naïve"), "naive");
        assert_eq!(normalize("ὁδός"), "οδος");
    }

    #[test]
    fn test_idempotent() {
        for s in SAMPLES {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", s);
        }
    }

    #[test]
    fn test_keeps_base_letters() {
        // Letters without a canonical decomposition stay as they are.
        assert_eq!(normalize("øre"), "øre");
        assert_eq!(normalize("straße"), "straße");
        assert_eq!(normalize("日本語"), "日本語");
        assert_eq!(normalize("İstanbul"), "istanbul");

        for s in SAMPLES {
            let base = s.chars().filter(|c| c.is_alphabetic()).count();
            assert_eq!(
                normalize(s).chars().filter(|c| c.is_alphabetic()).count() > 0,
                base > 0,
                "letters lost for {:?}",
                s
            );
        }
    }
}
