/// Creates an ad-hoc [`Error`](crate::Error) from a format string.
#[macro_export]
macro_rules! err {
    ( $($arg:tt)* ) => {
        $crate::Error::from_args(format_args!($($arg)*))
    };
}

/// Builds a [`ValueRecord`](crate::ValueRecord) literal.
///
/// Values are converted with `Value::from`, so nested `record!` and plain
/// primitives both work:
///
/// ```
/// use keyper_core::{record, Value};
///
/// let post = record! {
///     "id" => 1,
///     "author" => record! { "name" => "ada" },
/// };
/// assert_eq!(post.get("id"), Some(&Value::I64(1)));
/// ```
#[macro_export]
macro_rules! record {
    () => { $crate::ValueRecord::new() };
    ( $( $name:expr => $value:expr ),+ $(,)? ) => {{
        let mut record = $crate::ValueRecord::new();
        $( record.insert($name, $crate::Value::from($value)); )+
        record
    }};
}
