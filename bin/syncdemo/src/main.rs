mod layout;
mod scenarios;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

fn main() -> anyhow::Result<()> {
    let commander = layout::register(scenarios::register(
        clap::Command::new("syncdemo")
            .about("Runs worker coordination scenarios over the foundation_sync primitives")
            .arg(
                clap::Arg::new("config")
                    .short('c')
                    .long("config")
                    .global(true)
                    .action(clap::ArgAction::Set)
                    .value_parser(clap::value_parser!(std::path::PathBuf)),
            )
            .arg(
                clap::Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .global(true)
                    .action(clap::ArgAction::SetTrue),
            )
            .arg_required_else_help(true),
    ));

    let matches = commander.get_matches();

    let level = if matches.get_flag("verbose") {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_thread_names(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match matches.subcommand() {
        Some(("layout", arguments)) => layout::run(arguments)?,
        Some((name, arguments)) => scenarios::run(name, arguments)?,
        None => {}
    }

    Ok(())
}
