use anyhow::Result;
use clap::Parser;
use clap::Subcommand;
use factory_bridge_cli::ConfigArgs;
use factory_bridge_cli::inspect_cmd;
use factory_bridge_cli::inspect_cmd::LabelArgs;
use factory_bridge_cli::inspect_cmd::TopicArgs;
use factory_bridge_cli::replay_cmd;
use factory_bridge_cli::replay_cmd::ReplayArgs;
use factory_bridge_cli::run_cmd;
use factory_bridge_cli::setup_tracing;

/// Bridges Factorio device snapshots into a Mobius (oneM2M) resource tree
/// over MQTT.
#[derive(Debug, Parser)]
#[command(name = "factory-bridge", version)]
struct Cli {
    #[clap(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the bridge until Ctrl-C.
    Run,

    /// Relay a single snapshot file and print the relay report as JSON.
    Replay(ReplayArgs),

    /// Print the effective configuration as TOML.
    Config,

    /// Check whether an inbound topic would be accepted.
    Topic(TopicArgs),

    /// Show the label, discriminator and allow-list decision for an entity.
    Label(LabelArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    setup_tracing();
    let config = cli.config.load()?;

    match cli.command {
        Command::Run => run_cmd::run(config).await?,
        Command::Replay(args) => {
            let report = replay_cmd::run(config, args).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Config => print!("{}", inspect_cmd::render_config(&config)?),
        Command::Topic(args) => match inspect_cmd::check_topic(&config, &args)? {
            Ok(parsed) => println!("{}", serde_json::to_string_pretty(&parsed)?),
            Err(reason) => {
                eprintln!("rejected: {reason}");
                std::process::exit(1);
            }
        },
        Command::Label(args) => {
            let description = inspect_cmd::describe_label(&config, &args)?;
            println!("{}", serde_json::to_string_pretty(&description)?);
        }
    }
    Ok(())
}
