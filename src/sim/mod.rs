pub mod config;
pub mod top;

pub use config::{Config, Fp, NetzpConfig};
pub use top::NetzpTop;
