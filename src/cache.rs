//! Thread-local compilation cache for replacement regexes.
//!
//! Every enabled plugin's rules are compiled once per thread rather than once
//! per module they are tried against. Cache is capped at 256 entries; when
//! full it is cleared and rebuilt on demand.

use regex::Regex;
use std::cell::RefCell;
use std::collections::HashMap;

const MAX_CACHE_ENTRIES: usize = 256;

thread_local! {
    // Keyed by the canonicalized pattern source (after `\i` expansion).
    static REGEX_CACHE: RefCell<HashMap<String, Regex>> = RefCell::new(HashMap::new());
}

/// Get a compiled regex from cache, or compile and cache it.
///
/// `Regex` clones share the compiled program, so handing out clones is cheap.
pub fn get_or_compile_regex(pattern: &str) -> Result<Regex, regex::Error> {
    REGEX_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();

        if let Some(re) = cache.get(pattern) {
            return Ok(re.clone());
        }

        if cache.len() >= MAX_CACHE_ENTRIES {
            cache.clear();
        }

        let compiled = Regex::new(pattern)?;
        cache.insert(pattern.to_string(), compiled.clone());
        Ok(compiled)
    })
}

/// Clear the regex cache (mainly for testing).
pub fn clear_cache() {
    REGEX_CACHE.with(|cache| cache.borrow_mut().clear());
}

/// Number of cached patterns on this thread.
pub fn cache_size() -> usize {
    REGEX_CACHE.with(|cache| cache.borrow().len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_hit_does_not_grow() {
        clear_cache();
        get_or_compile_regex("a+b").unwrap();
        get_or_compile_regex("a+b").unwrap();
        assert_eq!(cache_size(), 1);
    }

    #[test]
    fn test_invalid_pattern_is_not_cached() {
        clear_cache();
        assert!(get_or_compile_regex("(unclosed").is_err());
        assert_eq!(cache_size(), 0);
    }
}
