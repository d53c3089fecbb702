//! Command implementations

pub mod apps;
pub mod env;
pub mod logs;
pub mod run;
pub mod stack;

use std::io::IsTerminal;

use dialoguer::Confirm;

use crate::error::Result;

/// Ask the operator to confirm; non-interactive sessions answer "no"
pub fn confirm_action(message: &str, default: bool) -> Result<bool> {
    if !std::io::stdin().is_terminal() {
        eprintln!("Warning: {} Use --yes to skip confirmation.", message);
        return Ok(false);
    }

    Ok(Confirm::new()
        .with_prompt(message)
        .default(default)
        .interact()?)
}
