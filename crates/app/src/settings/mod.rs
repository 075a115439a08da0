pub mod state;

pub use state::{ProviderSettings, SettingsError, SettingsStore};
