//! Config parsing helper shared by the server and client binaries' optional
//! secondary config blobs (mode parameters, protocol knobs) layered on top
//! of `clap`-derived top-level flags.

/// Parses an optional TOML string into `$ty`, falling back to
/// `<$ty>::default()` when `$config_str` is `None`. `$ty` must derive
/// `Default` and `Deserialize` with `#[serde(default)]` on the struct so a
/// partial table only overrides the fields it names.
///
/// The trailing field list (as in `parsed_config!(s => T; a, b, c)`) is not
/// consulted by the merge itself — `#[serde(default)]` already does that —
/// it exists so a call site can document, next to the macro invocation,
/// exactly which keys it expects to find.
#[macro_export]
macro_rules! parsed_config {
    ($config_str:expr => $ty:ty $(; $($field:ident),+ $(,)?)?) => {{
        (|| -> Result<$ty, $crate::error::TriageError> {
            match $config_str {
                None => Ok(<$ty as ::std::default::Default>::default()),
                Some(s) => ::toml::from_str::<$ty>(s).map_err(|e| {
                    $crate::error::TriageError::Internal(format!(
                        "invalid config string: {e}"
                    ))
                }),
            }
        })()
    }};
}

#[cfg(test)]
mod tests {
    use crate::parsed_config;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    #[serde(default)]
    struct Knobs {
        retries: u32,
        label: String,
    }

    impl Default for Knobs {
        fn default() -> Self {
            Knobs {
                retries: 3,
                label: "default".into(),
            }
        }
    }

    #[test]
    fn none_yields_default() {
        let parsed = parsed_config!(None => Knobs; retries, label).unwrap();
        assert_eq!(parsed, Knobs::default());
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let parsed =
            parsed_config!(Some("retries = 9") => Knobs; retries).unwrap();
        assert_eq!(
            parsed,
            Knobs {
                retries: 9,
                label: "default".into(),
            }
        );
    }

    #[test]
    fn malformed_string_is_an_error() {
        assert!(parsed_config!(Some("not = [valid") => Knobs).is_err());
    }
}
