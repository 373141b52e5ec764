//! Engine configuration loaded from residue.toml.
//!
//! Every field has a default, so an absent file yields a usable config.

pub mod parser;
pub mod paths;
pub mod schema;
pub mod store;

pub use parser::{parse_residue_toml, parse_residue_toml_str, to_toml};
pub use paths::{default_config_path, default_run_dir, default_search_roots};
pub use schema::{
    DiscoveryConfig, RemovalConfig, ResidueConfig, RunLogConfig, SelectionConfig,
};
pub use store::ConfigStore;
