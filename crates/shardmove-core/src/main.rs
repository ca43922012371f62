use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use shardmove_core::{run_simulation, MigrationConfig, SimulationOptions};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn cli() -> Command {
    Command::new("shardmove")
        .version(shardmove_core::VERSION)
        .about("Live migration of project data onto a sharded cluster")
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .help("Path to a TOML configuration file"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand(
            Command::new("simulate")
                .about("Migrate a generated project between in-memory stores")
                .arg(
                    Arg::new("project")
                        .long("project")
                        .default_value("demo-project")
                        .help("Project id to migrate"),
                )
                .arg(
                    Arg::new("pipelines")
                        .long("pipelines")
                        .default_value("12")
                        .value_parser(value_parser!(usize))
                        .help("Number of pipelines in the project"),
                )
                .arg(
                    Arg::new("shards")
                        .long("shards")
                        .default_value("3")
                        .value_parser(value_parser!(usize))
                        .help("Number of target shards"),
                )
                .arg(
                    Arg::new("rows")
                        .long("rows")
                        .default_value("7")
                        .value_parser(value_parser!(usize))
                        .help("Rows per domain"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for shard selection"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(Command::new("print-config").about("Print the effective configuration"))
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<MigrationConfig> {
    match matches.get_one::<String>("config") {
        Some(path) => MigrationConfig::load(path).with_context(|| format!("loading {path}")),
        None => Ok(MigrationConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));
    let config = load_config(&matches)?;

    match matches.subcommand() {
        Some(("simulate", args)) => {
            let options = SimulationOptions {
                project_id: args
                    .get_one::<String>("project")
                    .cloned()
                    .unwrap_or_default(),
                pipelines: args.get_one::<usize>("pipelines").copied().unwrap_or_default(),
                shards: args.get_one::<usize>("shards").copied().unwrap_or_default(),
                rows_per_domain: args.get_one::<usize>("rows").copied().unwrap_or_default(),
                seed: args.get_one::<u64>("seed").copied(),
            };

            let report = run_simulation(config, &options)
                .await
                .context("simulation failed")?;

            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.generate_text());
            }

            if report.committed_data_source.is_none() {
                std::process::exit(1);
            }
        }
        Some(("print-config", _)) => {
            print!("{}", config.to_toml_string()?);
        }
        _ => {
            cli().print_help()?;
        }
    }

    Ok(())
}
