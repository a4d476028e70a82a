mod process;
mod service;
mod rollout;
mod proxy;
mod certificate;
mod template;

pub use process::*;
pub use service::*;
pub use rollout::*;
pub use proxy::*;
pub use certificate::*;
pub use template::*;

#[cfg(test)]
pub(crate) use certificate::tests::gen_test_cert;
