//! # Output Configuration
//!
//! Controls how the `grip` binary decorates what it prints: colour and
//! symbols when the terminal supports them, plain bracketed tags otherwise.
//!
//! The following flags and environment variables are respected:
//! - `--color=never|always|auto`
//! - `NO_COLOR` disables colours when set (any value)
//! - `CLICOLOR=0` disables colours
//! - `CLICOLOR_FORCE=1` forces colours even without a TTY
//! - `TERM=dumb` disables colours
//!
//! ```rust,ignore
//! let out = OutputConfig::from_env_and_flag("auto");
//! println!("{} core", ancestry_marker(&out, Some(AncestryState::Behind)));
//! ```

use console::style;

use crate::workflow::AncestryState;

/// Whether colours and symbols should be used in output.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub use_color: bool,
}

impl OutputConfig {
    /// Decide from the `--color` flag value, detecting support for `auto`.
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_ascii_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => color_from_env(
                |key| std::env::var(key).ok(),
                console::Term::stdout().features().colors_supported(),
            ),
        };
        Self { use_color }
    }

    #[cfg(test)]
    pub fn with_color() -> Self {
        Self { use_color: true }
    }

    #[cfg(test)]
    pub fn without_color() -> Self {
        Self { use_color: false }
    }
}

/// Colour decision for `--color=auto`. `NO_COLOR` wins over everything,
/// `CLICOLOR_FORCE` over the terminal check.
fn color_from_env(var: impl Fn(&str) -> Option<String>, terminal_supports: bool) -> bool {
    if var("NO_COLOR").is_some() || var("CLICOLOR").as_deref() == Some("0") {
        return false;
    }
    match var("CLICOLOR_FORCE") {
        Some(force) if !force.is_empty() && force != "0" => return true,
        _ => {}
    }
    var("TERM").as_deref() != Some("dumb") && terminal_supports
}

/// The symbol when colours are enabled, otherwise the plain tag.
pub fn emoji<'a>(config: &OutputConfig, emoji_str: &'a str, plain: &'a str) -> &'a str {
    if config.use_color {
        emoji_str
    } else {
        plain
    }
}

/// A short coloured marker for a repository's ancestry. `None` means the
/// state is unknown, e.g. the repository is not checked out.
pub fn ancestry_marker(config: &OutputConfig, state: Option<AncestryState>) -> String {
    let (symbol, plain) = match state {
        Some(AncestryState::Equal) => ("✓", "[OK]"),
        Some(AncestryState::Ahead) => ("↑", "[AHEAD]"),
        Some(AncestryState::Behind) => ("↓", "[BEHIND]"),
        Some(AncestryState::Diverged) => ("⇅", "[DIVERGED]"),
        None => ("?", "[?]"),
    };
    if !config.use_color {
        return plain.to_string();
    }
    let styled = match state {
        Some(AncestryState::Equal) => style(symbol).green(),
        Some(AncestryState::Ahead) | Some(AncestryState::Behind) => style(symbol).yellow(),
        Some(AncestryState::Diverged) => style(symbol).red(),
        None => style(symbol).dim(),
    };
    styled.force_styling(true).to_string()
}
