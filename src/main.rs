use clap::{Parser, Subcommand};
use dynamic_asset_gen::config::{self, CONFIG_FILENAME, GeneratorConfig};
use dynamic_asset_gen::export;
use dynamic_asset_gen::output;
use dynamic_asset_gen::pack::{DirectoryPack, GeneratedPack, PackResources, PrePackRepository};
use dynamic_asset_gen::types::PackType;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;

/// Pack stack flags shared by every command that plans.
#[derive(clap::Args, Clone)]
struct PackArgs {
    /// Pack directory; repeat for a stack. Later packs override earlier ones.
    #[arg(long = "pack", required = true)]
    packs: Vec<PathBuf>,
}

#[derive(Parser)]
#[command(name = "dynamic-asset-gen")]
#[command(about = "Generate derived textures and tag files for layered resource packs")]
#[command(long_about = "\
Generate derived textures and tag files for layered resource packs

Packs are directories. Source documents live next to ordinary resources:

  my_pack/
  ├── assets/
  │   └── mymod/
  │       ├── dynamic_asset_generator/       # texture documents (*.json)
  │       │   └── copper_ore.json
  │       └── textures/block/stone.png       # inputs
  └── data/
      └── mymod/
          └── dynamic_asset_generator/       # tag documents (*.json)
              └── ores.json

A texture document:

  {\"type\": \"texture\", \"output_location\": \"mymod:block/copper_ore\",
   \"input\": {\"type\": \"overlay\", \"inputs\": [
      {\"type\": \"file\", \"path\": \"minecraft:block/stone\"},
      {\"type\": \"file\", \"path\": \"mymod:block/copper_overlay\"}]}}

produces mymod:textures/block/copper_ore.png.

Run 'dynamic-asset-gen gen-config' to generate a documented config file.")]
#[command(version)]
struct Cli {
    /// Config file (missing means defaults)
    #[arg(long, default_value = CONFIG_FILENAME, global = true)]
    config: PathBuf,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Produce every generated resource and write it to a directory
    Generate {
        #[command(flatten)]
        packs: PackArgs,
        /// Output directory, laid out like a pack
        #[arg(long, default_value = "generated")]
        out: PathBuf,
        /// Disable both caches for this run
        #[arg(long)]
        no_cache: bool,
    },
    /// Plan only and report configuration errors
    Check(PackArgs),
    /// List every identifier the generated pack exposes
    List(PackArgs),
    /// Print a stock config file with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Generate {
            packs,
            out,
            no_cache,
        } => {
            let mut config = config::load_config(&cli.config)?;
            if no_cache {
                config.cache_assets = false;
                config.cache_data = false;
            }
            init_thread_pool(&config.processing);
            let (_repository, generated) = build_stack(&packs, &config);

            let (tx, rx) = std::sync::mpsc::channel();
            let shown_out = out.clone();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_export_event(&event, &shown_out) {
                        println!("{}", line);
                    }
                }
            });
            let summary = export::export(&generated, &out, Some(tx))?;
            printer
                .join()
                .map_err(|_| "output thread panicked".to_string())?;
            println!();
            output::print_export_summary(&summary);
            if summary.failed > 0 {
                return Err(format!("{} resources could not be written", summary.failed).into());
            }
        }
        Command::Check(packs) => {
            let config = config::load_config(&cli.config)?;
            let (_repository, generated) = build_stack(&packs, &config);
            let assets = generated.planner(PackType::Assets).registry();
            let data = generated.planner(PackType::Data).registry();
            output::print_check_output(&[(PackType::Assets, &*assets), (PackType::Data, &*data)]);
            let errors = assets.errors().len() + data.errors().len();
            if errors > 0 {
                return Err(format!("{errors} configuration errors").into());
            }
            println!("==> Sources are valid");
        }
        Command::List(packs) => {
            let config = config::load_config(&cli.config)?;
            let (_repository, generated) = build_stack(&packs, &config);
            let listing: Vec<_> = PackType::ALL
                .into_iter()
                .map(|pack_type| {
                    let ids = generated.planner(pack_type).all_identifiers();
                    (pack_type, ids.into_iter().collect())
                })
                .collect();
            output::print_list_output(&listing);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout stays the command's output.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores. The user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

/// Publish the directory packs (highest priority first) with the generated
/// pack on top.
fn build_stack(
    args: &PackArgs,
    config: &GeneratorConfig,
) -> (Arc<PrePackRepository>, Arc<GeneratedPack>) {
    let repository = Arc::new(PrePackRepository::new());
    let generated = Arc::new(GeneratedPack::from_config(repository.clone(), config));
    let mut stack: Vec<Arc<dyn PackResources>> = vec![generated.clone() as Arc<dyn PackResources>];
    stack.extend(
        args.packs
            .iter()
            .rev()
            .map(|dir| Arc::new(DirectoryPack::new(dir)) as Arc<dyn PackResources>),
    );
    repository.publish(stack);
    (repository, generated)
}
