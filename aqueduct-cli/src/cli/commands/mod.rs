pub mod gather;
pub mod sync;

use dialoguer::Confirm;
use is_terminal::IsTerminal;

/// Ask a yes/no question; a non-interactive session always answers no
pub fn confirm(prompt: &str) -> bool {
    if !std::io::stdin().is_terminal() || !std::io::stdout().is_terminal() {
        log::warn!("Not on a terminal; declining: {}", prompt);
        return false;
    }
    Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .unwrap_or(false)
}
