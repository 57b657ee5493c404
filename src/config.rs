use std::env;

/// Environment variable that routes uploads through BAR memory
/// (host-visible device memory) instead of host memory.
pub const USE_BAR_MEMORY_VAR: &str = "LINEAR_SUBALLOC_USE_BAR_MEMORY";

/// Runtime switches, read from the environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Config {
    pub use_bar_memory: bool,
}

impl Config {
    pub fn from_env() -> Self {
        let use_bar_memory = env::var(USE_BAR_MEMORY_VAR)
            .map(|value| parse_flag(&value))
            .unwrap_or(false);

        Self { use_bar_memory }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}
