use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::Level;

/// Output format for the stdout log layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Build an `EnvFilter` directive string from a default level plus
/// per-module overrides, e.g. `info,huddle_server=debug`.
pub fn filter_directives(default: Level, module_levels: &[(String, Level)]) -> String {
    let mut filter = default.to_string().to_lowercase();
    for (module, level) in module_levels {
        filter.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
    }
    filter
}

/// Parse a `module=level` override, e.g. `huddle_server=debug`.
pub fn parse_module_level(s: &str) -> Result<(String, Level), String> {
    let (module, level) = s
        .split_once('=')
        .ok_or_else(|| format!("expected module=level, got: {s}"))?;
    let module = module.trim();
    if module.is_empty() {
        return Err(format!("missing module name in: {s}"));
    }
    let level = level
        .trim()
        .parse::<Level>()
        .map_err(|_| format!("unknown log level: {}", level.trim()))?;
    Ok((module.to_string(), level))
}
