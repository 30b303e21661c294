// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::process;

use inkboard_geom::Color;
use inkboard_model::loader::{load_from_svg, LoadOptions};

const HELP: &str = "\
inkboard - render and resave whiteboard SVG documents

USAGE:
    inkboard render <in.svg> <out.png> [OPTIONS]
    inkboard resave <in.svg> <out.svg> [OPTIONS]

OPTIONS:
    -h, --help                  Prints this help
        --zoom FACTOR           Scale the output image [default: 1]
        --background COLOR      Fill color behind the document
                                (any CSS color) [default: transparent]
        --sanitize              Drop attributes the loader did not
                                recognize (resave only)
        --quiet                 Do not warn about malformed content
";

/// Malformed content degrades with `log` warnings; print them to
/// stderr so the CLI surfaces what a host application would log.
struct StderrLogger;

static STDERR_LOGGER: StderrLogger = StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::Level::Warn
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            eprintln!("Warning ({}): {}", record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

#[derive(Debug)]
struct Args {
    command: String,
    input: std::path::PathBuf,
    output: std::path::PathBuf,
    zoom: f64,
    background: Option<Color>,
    sanitize: bool,
}

fn parse_args() -> Result<Args, pico_args::Error> {
    let mut input = pico_args::Arguments::from_env();

    if input.contains(["-h", "--help"]) {
        print!("{}", HELP);
        process::exit(0);
    }

    if !input.contains("--quiet") {
        if log::set_logger(&STDERR_LOGGER).is_ok() {
            log::set_max_level(log::LevelFilter::Warn);
        }
    }

    let background = match input.opt_value_from_str::<_, String>("--background")? {
        Some(text) => match Color::from_string(&text) {
            Ok(color) => Some(color),
            Err(e) => {
                eprintln!("Error: {}.", e);
                process::exit(1);
            }
        },
        None => None,
    };

    let args = Args {
        zoom: input.opt_value_from_str("--zoom")?.unwrap_or(1.0),
        sanitize: input.contains("--sanitize"),
        background,
        command: input.free_from_str()?,
        input: input.free_from_str()?,
        output: input.free_from_str()?,
    };

    let remaining = input.finish();
    if !remaining.is_empty() {
        eprintln!("Error: unexpected arguments {:?}.", remaining);
        process::exit(1);
    }

    Ok(args)
}

fn main() {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}.", e);
            eprintln!("{}", HELP);
            process::exit(1);
        }
    };

    let text = match std::fs::read_to_string(&args.input) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Error: failed to read {:?}: {}.", args.input, e);
            process::exit(1);
        }
    };

    let image = match load_from_svg(&text, &LoadOptions::default()) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("Error: {}.", e);
            process::exit(1);
        }
    };

    match args.command.as_str() {
        "render" => render(&args, &image),
        "resave" => resave(&args, &image),
        other => {
            eprintln!("Error: unknown command '{}'.", other);
            eprintln!("{}", HELP);
            process::exit(1);
        }
    }
}

fn render(args: &Args, image: &inkboard_model::EditorImage) {
    if !(args.zoom.is_finite() && args.zoom > 0.0) {
        eprintln!("Error: --zoom must be positive.");
        process::exit(1);
    }

    let rect = image.import_export_rect();
    let width = (rect.w * args.zoom).ceil().max(1.0) as u32;
    let height = (rect.h * args.zoom).ceil().max(1.0) as u32;

    let pixmap = match inkboard::render_to_pixmap(image, width, height, args.background) {
        Some(pixmap) => pixmap,
        None => {
            eprintln!("Error: failed to allocate a {}x{} surface.", width, height);
            process::exit(1);
        }
    };

    if let Err(e) = pixmap.save_png(&args.output) {
        eprintln!("Error: failed to write {:?}: {}.", args.output, e);
        process::exit(1);
    }
}

fn resave(args: &Args, image: &inkboard_model::EditorImage) {
    let svg = inkboard::render_to_svg_string(
        image,
        &inkboard::SvgExportOptions {
            sanitize: args.sanitize,
        },
    );

    if let Err(e) = std::fs::write(&args.output, svg) {
        eprintln!("Error: failed to write {:?}: {}.", args.output, e);
        process::exit(1);
    }
}
