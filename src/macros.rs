macro_rules! regex {
    ($pat:literal) => {{
        static RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($pat).unwrap());
        &*RE
    }};
}

/// Build a positional parameter list.
///
/// Each element goes through [`json!`](crate::json), so anything that
/// serializes is accepted.
///
/// ```
/// use querymock::{Value, params};
///
/// let p: Vec<Value> = params![1, "alice", Value::Null];
/// assert_eq!(p.len(), 3);
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::Value>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![ $($crate::json!($value)),+ ]
    };
}
