//! Pure text-normalization helpers used by index extractors. Ported from
//! `storage/index.py`'s `Indexing` class.

use crate::stored_object::StoredObject;

/// Collapses runs of whitespace to a single space, lowercases, and trims.
pub fn normalize(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut last_was_space = false;
    for ch in value.trim().chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.extend(ch.to_lowercase());
            last_was_space = false;
        }
    }
    out
}

/// Strips common Latin diacritics by folding to their unaccented ASCII
/// base letter. Narrower than the original's full Unicode NFKD
/// decomposition, but covers the Western-European range the rest of the
/// corpus's text ever indexes.
pub fn no_accents(value: &str) -> String {
    value
        .chars()
        .map(|ch| match ch {
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => 'a',
            'è' | 'é' | 'ê' | 'ë' | 'È' | 'É' | 'Ê' | 'Ë' => 'e',
            'ì' | 'í' | 'î' | 'ï' | 'Ì' | 'Í' | 'Î' | 'Ï' => 'i',
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' => 'o',
            'ù' | 'ú' | 'û' | 'ü' | 'Ù' | 'Ú' | 'Û' | 'Ü' => 'u',
            'ñ' | 'Ñ' => 'n',
            'ç' | 'Ç' => 'c',
            'ý' | 'ÿ' | 'Ý' => 'y',
            other => other,
        })
        .collect()
}

fn is_alphanumeric_ascii(ch: char) -> bool {
    ch.is_ascii_alphanumeric()
}

/// Normalizes `value` into a single index keyword: accent-folds it,
/// replaces runs of non-alphanumeric characters with spaces, then
/// collapses whitespace.
pub fn keyword(value: &str) -> String {
    let folded = no_accents(value);
    let spaced: String = folded
        .chars()
        .map(|ch| if is_alphanumeric_ascii(ch) { ch } else { ' ' })
        .collect();
    normalize(&spaced)
}

/// Splits `values` on whitespace, keywordizes each token, and returns the
/// distinct tokens at least `min_length` characters long.
pub fn keywords(values: &[&str], min_length: usize) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    for value in values {
        for word in value.split_whitespace() {
            let word = keyword(word);
            if word.len() >= min_length {
                seen.insert(word);
            }
        }
    }
    seen.into_iter().collect()
}

/// Splits `value` on `separator` and returns every growing prefix path:
/// `paths("a/b/c", "/")` -> `["a", "a/b", "a/b/c"]`.
pub fn paths(value: &str, separator: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current: Option<String> = None;
    for segment in value.split(separator) {
        if segment.is_empty() {
            continue;
        }
        current = Some(match current {
            Some(prefix) => format!("{prefix}{separator}{segment}"),
            None => segment.to_string(),
        });
        result.push(current.clone().unwrap());
    }
    result
}

/// The extractor used by `Indexing.UpdateTime`: the object's overall
/// modification timestamp, as a sortable string key.
pub fn update_time(object: &dyn StoredObject) -> String {
    format!("{:020}", object.updates().overall())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_whitespace_and_lowercases() {
        assert_eq!(normalize("  Hello   World  "), "hello world");
    }

    #[test]
    fn no_accents_folds_common_latin_diacritics() {
        assert_eq!(no_accents("Café déjà vu"), "Cafe deja vu");
    }

    #[test]
    fn keyword_strips_punctuation_and_folds_case() {
        assert_eq!(keyword("Hello, World!"), "hello world");
    }

    #[test]
    fn keywords_drops_short_tokens_and_dedupes() {
        let result = keywords(&["the cat sat on the mat"], 3);
        assert!(result.contains(&"cat".to_string()));
        assert!(result.contains(&"sat".to_string()));
        assert!(!result.contains(&"the".to_string()));
    }

    #[test]
    fn paths_returns_growing_prefixes() {
        assert_eq!(
            paths("a/b/c", "/"),
            vec!["a".to_string(), "a/b".to_string(), "a/b/c".to_string()]
        );
    }

    #[test]
    fn update_time_is_a_zero_padded_sortable_timestamp() {
        use crate::updates::Updates;

        let updates = Updates::new();
        updates.touch("title");
        let first = updates.overall();

        #[derive(Debug)]
        struct Dummy(Updates);
        impl StoredObject for Dummy {
            fn oid(&self) -> &str {
                "dummy"
            }
            fn type_name(&self) -> &'static str {
                "test.Dummy"
            }
            fn updates(&self) -> &Updates {
                &self.0
            }
            fn export(&self, _depth: i32) -> serde_json::Value {
                serde_json::Value::Null
            }
            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
        }

        let object = Dummy(updates);
        let key = update_time(&object);
        assert_eq!(key.len(), 20);
        assert_eq!(key, format!("{:020}", first));
    }
}
