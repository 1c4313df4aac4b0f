//! SQL text normalization.
//!
//! Matching never parses SQL. The only two things the engine needs from the
//! raw text are a canonical spelling (so that formatting differences between
//! the registered query and the executed one do not matter) and the number of
//! bind placeholders that precede a given offset (so that a fragment's own
//! parameters can be lined up with the call's parameter list).

use crate::PlaceholderStyle;

/// Collapse every run of whitespace into a single space and trim both ends.
pub(crate) fn normalize_sql(text: &str) -> String {
    regex!(r"\s+").replace_all(text.trim(), " ").into_owned()
}

/// Count the bind placeholders in `text[..end]`.
///
/// ```text
/// "select * from t where a = ? and b = ?"
///                                  ^ end
/// Question -> 1
/// ```
pub(crate) fn placeholders_before(text: &str, end: usize, style: PlaceholderStyle) -> usize {
    let Some(head) = text.get(..end) else {
        return 0;
    };
    let re = match style {
        PlaceholderStyle::Question => regex!(r"\?"),
        PlaceholderStyle::Dollar => regex!(r"\$\d+"),
        PlaceholderStyle::Any => regex!(r"\?|\$\d+"),
    };
    re.find_iter(head).count()
}
