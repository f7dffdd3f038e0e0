use foundation_layout::{describe_layout, DescribeLayout};

/// A value mixing every primitive width, so the report shows reordering
/// and padding.
#[derive(Debug, Default)]
struct Model {
    flag: bool,
    byte: u8,
    letter: char,
    short: i16,
    int: i32,
    float: f32,
    double: f64,
    long: i64,
    label: String,
}

describe_layout!(Model {
    flag,
    byte,
    letter,
    short,
    int,
    float,
    double,
    long,
    label,
});

pub fn register(command: clap::Command) -> clap::Command {
    command.subcommand(
        clap::Command::new("layout")
            .about("prints the field offsets and sizes of a sample value")
            .arg(
                clap::Arg::new("json")
                    .long("json")
                    .action(clap::ArgAction::SetTrue),
            ),
    )
}

pub fn run(args: &clap::ArgMatches) -> anyhow::Result<()> {
    let model = Model {
        label: "sample".to_owned(),
        ..Model::default()
    };
    tracing::debug!("describing {:?}", model);

    let layout = model.describe_layout();
    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&layout)?);
    } else {
        println!("{layout}");
    }
    Ok(())
}
