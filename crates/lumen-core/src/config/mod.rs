//! Presenter configuration
//!
//! Tunables for the sample pool, the scheduler's timing policy and the
//! event bus, stored as YAML:
//!
//! ```ignore
//! use lumen_core::config::{load_config, default_config_path, PresenterConfig};
//!
//! let config: PresenterConfig = load_config(&default_config_path("presenter.yaml"));
//! config.validate()?;
//! ```

mod io;
mod paths;
mod presenter;

pub use io::{load_config, save_config};
pub use paths::{default_config_dir, default_config_path};
pub use presenter::{EventConfig, PoolConfig, PresenterConfig, SchedulerConfig};
