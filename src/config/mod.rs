//! Configuration: non-secret settings from `.healthguard.toml` plus
//! environment overrides, and secret material from the environment only.

pub mod secrets;
pub mod settings;

pub use secrets::SecretMaterial;
pub use settings::Settings;
