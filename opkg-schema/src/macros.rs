//! Internal macros for opkg-schema

/// Declares a "strongly typed string": a newtype wrapping `String` (plus a
/// matching unsized `*Ref` wrapping `str`), so that e.g. a package name and
/// a platform id can't be silently swapped even though both are "just
/// strings" underneath. Covers only the traits opkg actually needs (`new`,
/// `as_str`, `Display`, `Serialize`/`Deserialize`, ordering, hashing).
macro_rules! declare_strongly_typed_string {
    ($(#[$attr:meta])* pub struct $name:ident => &$refname:ident;) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        #[doc = concat!("Borrowed form of [`", stringify!($name), "`].")]
        #[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $refname(str);

        impl $name {
            #[doc = concat!("Construct a new `", stringify!($name), "` from any string-like value.")]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow this value as a plain string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl $refname {
            /// Borrow this value as a plain string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            #[doc = concat!("Wrap a `&str` as a `&", stringify!($refname), "` without allocating.")]
            pub fn from_str(value: &str) -> &Self {
                // SAFETY: repr(transparent) newtype over str
                unsafe { &*(value as *const str as *const Self) }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::fmt::Display for $refname {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::borrow::Borrow<$refname> for $name {
            fn borrow(&self) -> &$refname {
                $refname::from_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl<T: Into<String>> From<T> for $name {
            fn from(value: T) -> Self {
                Self::new(value)
            }
        }

        impl schemars::JsonSchema for $name {
            fn schema_name() -> String {
                stringify!($name).to_owned()
            }
            fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
                String::json_schema(gen)
            }
        }
    };
}

pub(crate) use declare_strongly_typed_string;
