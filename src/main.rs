//! Builds PSSG node-graph fonts from MTSDF glyph atlases and checks the
//! generated glyph coordinates against the game's own font.

use pssgfont::core;

fn main() {
    core::platform::init_panic_handling();
    let cli_args = core::platform::get_cli_args();
    match core::run_app(cli_args) {
        Ok(()) => {}
        Err(error) => core::platform::handle_error(error),
    }
}
