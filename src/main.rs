use clap::{Parser, Subcommand};
use pixgraph::batch::{self, ConvertJob};
use pixgraph::state::{Quality, Rect, SaveFormat, Size, StateType};
use pixgraph::{Registry, config, output, router};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pixgraph")]
#[command(about = "Convert images by routing them through codec backends")]
#[command(long_about = "\
Convert images by routing them through codec backends

Every image representation (an encoded file, a decoded raster, a stack of
animation frames, a raw pixel buffer) is a node in a graph. Backends add
nodes and weighted conversion edges. An operation runs on the current
representation when it can; otherwise the image is converted along the
cheapest path to the nearest representation that implements it.

Backends (registration order, also the tie-break order):

  files    jpeg-file, png-file, gif-file, bmp-file
  buffer   rgb-buffer, rgba-buffer
  raster   raster      (image crate, still images)
  frames   frames      (GIF and APNG animation frames)
  png      png-image   (png crate)

Run 'pixgraph graph' to see the live graph and 'pixgraph gen-config' to
generate a documented pixgraph.toml.")]
#[command(version)]
struct Cli {
    /// Config file, merged over the stock defaults when present
    #[arg(long, default_value = "pixgraph.toml", global = true)]
    config: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert image files to another format
    Convert(ConvertArgs),
    /// Print the registered states, conversion edges and excluded backends
    Graph {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Show the cheapest conversion path between two state types
    Path { from: String, to: String },
    /// Print a stock pixgraph.toml with all options documented
    GenConfig,
}

#[derive(clap::Args)]
struct ConvertArgs {
    /// Input image files
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output format: jpeg, png, gif or bmp
    #[arg(long, short)]
    format: SaveFormat,

    /// Resize to WIDTHxHEIGHT (after cropping)
    #[arg(long)]
    resize: Option<Size>,

    /// Crop to LEFT,TOP,RIGHT,BOTTOM
    #[arg(long)]
    crop: Option<Rect>,

    /// JPEG quality 1-100 (defaults to encoding.jpeg_quality)
    #[arg(long)]
    quality: Option<u32>,

    /// Output directory (defaults to each input's directory)
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = config::load_config(&cli.config)?;

    match cli.command {
        Command::Convert(args) => {
            let registry = Registry::from_config(&config);
            init_thread_pool(&config.processing);
            let job = ConvertJob {
                format: args.format,
                crop: args.crop,
                resize: args.resize,
                quality: Quality::new(args.quality.unwrap_or(config.encoding.jpeg_quality)),
                out_dir: args.out_dir,
            };
            let results = batch::convert_all(&registry, &args.inputs, &job);
            for (input, result) in args.inputs.iter().zip(&results) {
                output::print_convert_result(input, result);
            }
            let failed = results.iter().filter(|r| r.is_err()).count();
            println!(
                "{}",
                output::format_convert_summary(results.len() - failed, failed)
            );
            if failed > 0 {
                return Err(format!("{failed} conversion(s) failed").into());
            }
        }
        Command::Graph { json } => {
            let registry = Registry::from_config(&config);
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&output::graph_json(&registry))?
                );
            } else {
                output::print_graph(&registry);
            }
        }
        Command::Path { from, to } => {
            let registry = Registry::from_config(&config);
            let from = parse_state(&registry, &from)?;
            let to = parse_state(&registry, &to)?;
            output::print_path(&router::find_path(&registry, from, to)?);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// `-v` flags pick the default level; `RUST_LOG` still wins when set.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the number of available CPU cores.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

/// Look up a state type by name among the registered ones.
fn parse_state(registry: &Registry, name: &str) -> Result<StateType, String> {
    registry
        .state_types()
        .into_iter()
        .find(|s| s.name() == name)
        .ok_or_else(|| {
            let known: Vec<_> = registry.state_types().iter().map(|s| s.name()).collect();
            format!("unknown state type '{name}' (known: {})", known.join(", "))
        })
}
