//! Declarative helpers for single-byte enumerated operands

/// Declares a `#[repr(u8)]` enum whose variants map one-to-one onto wire bytes.
///
/// Generates `TryFrom<u8>` (failing with [`ParseError::InvalidValue`]),
/// `From<Self> for u8`, a `name()` accessor and a `Display` impl using that name.
///
/// [`ParseError::InvalidValue`]: crate::ParseError::InvalidValue
macro_rules! byte_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident = $value:literal => $label:literal,
            )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[repr(u8)]
        $vis enum $name {
            $(
                $(#[$vmeta])*
                $variant = $value,
            )+
        }

        impl $name {
            /// Human-readable name
            pub fn name(&self) -> &'static str {
                match self {
                    $( $name::$variant => $label, )+
                }
            }

            /// Wire value
            pub fn as_u8(self) -> u8 {
                self as u8
            }
        }

        impl TryFrom<u8> for $name {
            type Error = $crate::ParseError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $value => Ok($name::$variant), )+
                    _ => Err($crate::ParseError::InvalidValue {
                        kind: stringify!($name),
                        value,
                    }),
                }
            }
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> u8 {
                value as u8
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

/// Like [`byte_enum!`], but every byte maps to a value: bytes missing from
/// the table become the catch-all variant named after `unknown`, which
/// carries the byte so it can be written back unchanged.
///
/// `TryFrom<u8>` still fails for unlisted bytes; `from_u8` never does.
macro_rules! open_byte_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident = $value:literal => $label:literal,
            )+
        }
        unknown $unknown:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        $vis enum $name {
            $(
                $(#[$vmeta])*
                $variant,
            )+
            /// Byte not listed above
            $unknown(u8),
        }

        impl $name {
            /// Human-readable name
            pub fn name(&self) -> &'static str {
                match self {
                    $( $name::$variant => $label, )+
                    $name::$unknown(_) => "unknown",
                }
            }

            /// Wire value
            pub fn as_u8(self) -> u8 {
                match self {
                    $( $name::$variant => $value, )+
                    $name::$unknown(value) => value,
                }
            }

            /// Map any byte, keeping unlisted ones in the catch-all variant
            pub fn from_u8(value: u8) -> Self {
                match value {
                    $( $value => $name::$variant, )+
                    other => $name::$unknown(other),
                }
            }

            /// Whether the byte is listed
            pub fn is_known(&self) -> bool {
                !matches!(self, $name::$unknown(_))
            }
        }

        impl TryFrom<u8> for $name {
            type Error = $crate::ParseError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match $name::from_u8(value) {
                    $name::$unknown(value) => Err($crate::ParseError::InvalidValue {
                        kind: stringify!($name),
                        value,
                    }),
                    known => Ok(known),
                }
            }
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> u8 {
                value.as_u8()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $name::$unknown(value) => write!(f, "unknown (0x{:02x})", value),
                    known => f.write_str(known.name()),
                }
            }
        }
    };
}

pub(crate) use byte_enum;
pub(crate) use open_byte_enum;
