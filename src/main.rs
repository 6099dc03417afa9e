mod batch;
mod config;
mod decode;
mod server;
mod transform;
mod watcher;

use std::path::PathBuf;
use std::process::ExitCode;

use config::AppConfig;
use transform::CanvasGeometry;

const USAGE: &str = "\
canvas-resizer — fit images onto a fixed canvas and export JPEGs

Usage:
  canvas-resizer serve [--port N] [geometry flags]
  canvas-resizer batch [--input DIR] [--output DIR] [--watch] [geometry flags]

Geometry flags:
  --width N    canvas width in px    (default 1080)
  --height N   canvas height in px   (default 1350)
  --vpad N     vertical padding px   (default 32)
  --hpad N     horizontal padding px (default 114)

Other flags:
  --save       persist the resolved settings to the config file

Flags fall back to values in the config file, then to the defaults above.
";

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    };

    let config = AppConfig::load();
    let options = match Options::parse(rest, &config) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error: {e}\n\n{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    if options.save {
        match options.to_config().save() {
            Ok(()) => {
                if let Some(path) = AppConfig::config_path() {
                    println!("💾 Saved config to {}", path.display());
                }
            }
            Err(e) => eprintln!("⚠ Failed to save config: {e}"),
        }
    }

    match command.as_str() {
        "serve" => run_serve(options).await,
        "batch" => run_batch(options),
        "help" | "--help" | "-h" => {
            println!("{USAGE}");
            ExitCode::SUCCESS
        }
        other => {
            eprintln!("Error: unknown command {other:?}\n\n{USAGE}");
            ExitCode::FAILURE
        }
    }
}

async fn run_serve(options: Options) -> ExitCode {
    if let Err(e) = server::serve(options.port, options.geometry).await {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn run_batch(options: Options) -> ExitCode {
    let Some(input) = options.input else {
        eprintln!("Error: no input folder (use --input or set input_dir in the config file)");
        return ExitCode::FAILURE;
    };
    let Some(output) = options.output else {
        eprintln!("Error: no output folder (use --output or set output_dir in the config file)");
        return ExitCode::FAILURE;
    };

    let summary = match batch::process_folder(&input, &output, &options.geometry) {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    println!(
        "🎉 Done: {} processed, {} failed, {} skipped",
        summary.processed, summary.failed, summary.skipped
    );

    if options.watch {
        if let Err(e) = watcher::watch_folder(&input, &output, &options.geometry) {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    }
    ExitCode::SUCCESS
}

#[derive(Debug, Clone)]
struct Options {
    geometry: CanvasGeometry,
    port: u16,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    watch: bool,
    save: bool,
}

impl Options {
    fn parse(args: &[String], config: &AppConfig) -> Result<Self, String> {
        let mut options = Self {
            geometry: config.geometry,
            port: config.port,
            input: config.input_dir.clone(),
            output: config.output_dir.clone(),
            watch: false,
            save: false,
        };

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--watch" => options.watch = true,
                "--save" => options.save = true,
                "--port" => options.port = parse_number(flag_value(iter.next(), arg)?, arg)?,
                "--input" => options.input = Some(PathBuf::from(flag_value(iter.next(), arg)?)),
                "--output" => options.output = Some(PathBuf::from(flag_value(iter.next(), arg)?)),
                "--width" => {
                    options.geometry.canvas_width =
                        parse_number(flag_value(iter.next(), arg)?, arg)?
                }
                "--height" => {
                    options.geometry.canvas_height =
                        parse_number(flag_value(iter.next(), arg)?, arg)?
                }
                "--vpad" => {
                    options.geometry.vertical_padding =
                        parse_number(flag_value(iter.next(), arg)?, arg)?
                }
                "--hpad" => {
                    options.geometry.horizontal_padding =
                        parse_number(flag_value(iter.next(), arg)?, arg)?
                }
                other => return Err(format!("unknown flag {other:?}")),
            }
        }

        Ok(options)
    }

    /// The resolved settings in config-file form, for `--save`.
    fn to_config(&self) -> AppConfig {
        AppConfig {
            geometry: self.geometry,
            input_dir: self.input.clone(),
            output_dir: self.output.clone(),
            port: self.port,
        }
    }
}

fn flag_value<'a>(value: Option<&'a String>, flag: &str) -> Result<&'a str, String> {
    value
        .map(String::as_str)
        .ok_or_else(|| format!("{flag} needs a value"))
}

fn parse_number<T: std::str::FromStr>(value: &str, flag: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("{flag} needs a number, got {value:?}"))
}
