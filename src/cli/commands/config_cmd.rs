//! Configuration display.

use console::style;

use crate::config::Settings;

pub fn cmd_config(settings: &Settings) -> anyhow::Result<()> {
    print!("{}", settings);
    if settings.active_model().is_none() {
        eprintln!(
            "\n{} No active model. Add a [[models]] entry or set INSPO_MODEL_ID.",
            style("!").yellow()
        );
    }
    Ok(())
}
