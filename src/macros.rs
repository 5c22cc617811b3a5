/// Declare a `u32` newtype that can only hold values within an inclusive
/// range. Construction goes through `new` / `TryFrom`, which reject
/// out-of-range values with a [`ParameterError`](crate::params::ParameterError).
macro_rules! bounded_parameter {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident in $min:literal ..= $max:literal, default $default:literal;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        $vis struct $name(u32);

        impl $name {
            pub const MIN: Self = Self($min);
            pub const MAX: Self = Self($max);

            pub fn new(value: u32) -> ::std::result::Result<Self, crate::params::ParameterError> {
                if ($min..=$max).contains(&value) {
                    Ok(Self(value))
                } else {
                    Err(crate::params::ParameterError {
                        parameter: stringify!($name),
                        value,
                        min: $min,
                        max: $max,
                    })
                }
            }

            pub const fn get(self) -> u32 {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self($default)
            }
        }

        impl TryFrom<u32> for $name {
            type Error = crate::params::ParameterError;

            fn try_from(value: u32) -> ::std::result::Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for u32 {
            fn from(value: $name) -> u32 {
                value.0
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                ::std::fmt::Display::fmt(&self.0, f)
            }
        }
    };
}
