use anyhow::Context;
use foundation_workers::scenarios::{run_bounded, run_dispatch_ack, run_rendezvous};
use foundation_workers::{EventLog, ScenarioReport};
use sync_config::DemoConfig;

const SCENARIOS: [(&str, &str); 4] = [
    ("dispatch", "dispatches a command to every worker and waits for all acknowledgments"),
    ("rendezvous", "walks every worker through a sequence of shared meeting points"),
    ("bounded", "lets more workers than permits compete for a limiter"),
    ("all", "runs every scenario in turn"),
];

pub fn register(mut command: clap::Command) -> clap::Command {
    for (name, about) in SCENARIOS {
        command = command.subcommand(
            clap::Command::new(name).about(about).arg(
                clap::Arg::new("workers")
                    .short('w')
                    .long("workers")
                    .action(clap::ArgAction::Set)
                    .value_parser(clap::value_parser!(usize)),
            ),
        );
    }
    command
}

fn load_config(args: &clap::ArgMatches) -> anyhow::Result<DemoConfig> {
    let mut config = match args.get_one::<std::path::PathBuf>("config") {
        Some(path) => DemoConfig::from_path(path.clone())
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => DemoConfig::default(),
    };

    if let Some(workers) = args.get_one::<usize>("workers") {
        config = config.with_workers(*workers);
        config.validate().context("applying --workers")?;
    }
    Ok(config)
}

pub fn run(name: &str, args: &clap::ArgMatches) -> anyhow::Result<()> {
    let config = load_config(args)?;
    let log = EventLog::new();

    let mut reports: Vec<ScenarioReport> = Vec::new();
    if matches!(name, "dispatch" | "all") {
        reports.push(run_dispatch_ack(&config.dispatch, &log)?.into());
    }
    if matches!(name, "rendezvous" | "all") {
        reports.push(run_rendezvous(&config.rendezvous, &log)?.into());
    }
    if matches!(name, "bounded" | "all") {
        reports.push(run_bounded(&config.bounded, &log)?.into());
    }
    if reports.is_empty() {
        anyhow::bail!("unknown scenario {name}");
    }

    tracing::debug!("{} events recorded", log.len());
    for report in &reports {
        println!("{report}");
    }

    if let Some(failed) = reports.iter().find(|report| !report.passed()) {
        anyhow::bail!("{} did not hold its guarantee", failed.title());
    }
    Ok(())
}
