//! Wire types. Everything profpack reads or writes is encoded with prost.

pub mod pprofs {
    include!("perftools.profiles.rs");
}

pub mod profpack {
    include!("profpack.rs");
}
