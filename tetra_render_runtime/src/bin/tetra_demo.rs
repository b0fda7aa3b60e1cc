//! tetra-demo: render a spinning cube
//!
//! Usage: tetra-demo [--backend vulkan|d3d12|d3d11|opengl] [--frames N] [--headless]
//!                   [--vertex FILE --fragment FILE]
//!
//! Opens a window on the backend's native driver. `--headless` runs the
//! scripted resize/minimize sequence on the recording drivers instead.

use std::process::ExitCode;
use tetra_render_runtime::{run_demo, run_windowed_demo, DemoOptions};

fn main() -> ExitCode {
    let options = match DemoOptions::from_args(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(e) => {
            tetra_render::render_error!("tetra::demo", "{}", e);
            return ExitCode::from(2);
        }
    };

    let result = if options.headless { run_demo(&options) } else { run_windowed_demo(&options) };
    match result {
        Ok(summary) if summary.failed_commands == 0 => ExitCode::SUCCESS,
        Ok(summary) => {
            tetra_render::render_error!("tetra::demo", "{} commands failed", summary.failed_commands);
            ExitCode::FAILURE
        }
        Err(e) => {
            tetra_render::render_error!("tetra::demo", "{}", e);
            ExitCode::FAILURE
        }
    }
}
