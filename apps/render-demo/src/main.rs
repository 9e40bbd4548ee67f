use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use cartograph_core::Map;
use cartograph_io::{load_map, LoadOptions};
use cartograph_renderer::{render_to_file_with, RenderOptions};

#[derive(Parser)]
#[command(name = "render-demo")]
#[command(about = "Load an XML stylesheet, zoom to all layers and render it to an image")]
struct Args {
    /// Stylesheet to load
    #[arg(default_value = "test.xml")]
    stylesheet: PathBuf,

    /// Output image; the format follows the extension
    #[arg(default_value = "test.png")]
    output: PathBuf,

    #[arg(long, default_value_t = 600)]
    width: u32,

    #[arg(long, default_value_t = 300)]
    height: u32,

    /// Fail on unknown stylesheet elements and attributes
    #[arg(long)]
    strict: bool,

    /// Multiplier for line widths and symbol sizes
    #[arg(long, default_value_t = 1.0)]
    scale_factor: f64,
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut map = Map::new(args.width, args.height);
    let options = LoadOptions {
        strict: args.strict,
        ..Default::default()
    };
    load_map(&mut map, &args.stylesheet, &options)?;
    map.zoom_all()?;
    let render_options = RenderOptions {
        scale_factor: args.scale_factor,
        ..Default::default()
    };
    render_to_file_with(&map, &args.output, &render_options)?;
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    match run(&args) {
        Ok(()) => {
            println!("rendered image to '{}'", args.output.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
