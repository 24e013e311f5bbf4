//! Tools for running a local network of SBA consensus provisioners.
mod config;


pub use config::{
    decode_json, encode_json, AppConfig, BehaviorConfig, ProvisionerConfig, TimeoutsConfig,
};
