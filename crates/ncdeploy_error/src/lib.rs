#[cfg(feature = "io")]
pub mod io;
