//! Log macros: `defmt` on target, the `log` facade everywhere else.
#![allow(unused_imports)]

cfg_if::cfg_if! {
    if #[cfg(feature = "defmt")] {
        pub(crate) use defmt::{debug, error, info, trace, warn};
    } else {
        pub(crate) use log::{debug, error, info, trace, warn};
    }
}
