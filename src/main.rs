use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::process;

use oxidiff::loader::Inputs;
use oxidiff::selection::IgnoreSpec;
use oxidiff::settings::DiffSettings;
use oxidiff::{describe_plan, diff};

fn input_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("old")
                .long("old")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("Snapshot of the current schema"),
        )
        .arg(
            Arg::new("new")
                .long("new")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("Snapshot of the desired schema"),
        )
        .arg(
            Arg::new("dependencies")
                .short('d')
                .long("dependencies")
                .value_parser(value_parser!(PathBuf))
                .help("JSON file with additional dependencies for either side"),
        )
        .arg(
            Arg::new("settings")
                .short('s')
                .long("settings")
                .value_parser(value_parser!(PathBuf))
                .help("JSON settings file; command line options take precedence"),
        )
        .arg(
            Arg::new("select")
                .long("select")
                .action(ArgAction::Append)
                .help("Only migrate objects whose qualified name matches this wildcard"),
        )
        .arg(
            Arg::new("ignore")
                .long("ignore")
                .action(ArgAction::Append)
                .help("Skip objects whose qualified name matches this wildcard"),
        )
        .arg(
            Arg::new("pre")
                .long("pre")
                .action(ArgAction::Append)
                .value_parser(value_parser!(PathBuf))
                .help("SQL file or directory emitted before the migration"),
        )
        .arg(
            Arg::new("post")
                .long("post")
                .action(ArgAction::Append)
                .value_parser(value_parser!(PathBuf))
                .help("SQL file or directory emitted after the migration"),
        )
        .arg(
            Arg::new("no-transaction")
                .long("no-transaction")
                .action(ArgAction::SetTrue)
                .help("Do not wrap the script in a transaction"),
        )
}

fn build_cli() -> Command {
    Command::new("oxidiff")
        .about("Oxidiff: schema snapshot differ and migration script generator")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            input_args(
                Command::new("diff")
                    .about("Write the script that migrates the old snapshot to the new one"),
            )
            .arg(
                Arg::new("output")
                    .short('o')
                    .long("output")
                    .value_parser(value_parser!(PathBuf))
                    .help("Write the script to this file instead of stdout"),
            ),
        )
        .subcommand(input_args(
            Command::new("plan").about("List the ordered migration actions without SQL"),
        ))
}

fn inputs(matches: &ArgMatches) -> Option<Inputs> {
    Some(Inputs {
        old: matches.get_one::<PathBuf>("old")?.clone(),
        new: matches.get_one::<PathBuf>("new")?.clone(),
        dependencies: matches.get_one::<PathBuf>("dependencies").cloned(),
    })
}

/// Settings file values, overridden by whatever was given on the command line.
fn settings(matches: &ArgMatches) -> oxidiff::Result<DiffSettings> {
    let mut settings = match matches.get_one::<PathBuf>("settings") {
        Some(path) => DiffSettings::from_file(path)?,
        None => DiffSettings::default(),
    };
    if let Some(select) = matches.get_many::<String>("select") {
        settings.select = select.cloned().collect();
    }
    if let Some(ignore) = matches.get_many::<String>("ignore") {
        settings.ignore.extend(ignore.map(|pattern| IgnoreSpec {
            pattern: pattern.clone(),
            kinds: Vec::new(),
        }));
    }
    if let Some(pre) = matches.get_many::<PathBuf>("pre") {
        settings.pre = pre.cloned().collect();
    }
    if let Some(post) = matches.get_many::<PathBuf>("post") {
        settings.post = post.cloned().collect();
    }
    if matches.get_flag("no-transaction") {
        settings.transaction = false;
    }
    Ok(settings)
}

async fn run(matches: ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    match matches.subcommand() {
        Some(("diff", sub_matches)) => {
            let inputs = inputs(sub_matches).ok_or("missing snapshot paths")?;
            let script = diff(&inputs, &settings(sub_matches)?).await?;
            match sub_matches.get_one::<PathBuf>("output") {
                Some(path) => {
                    tokio::fs::write(path, script).await?;
                    log::info!("script written to {}", path.display());
                }
                None => print!("{}", script),
            }
        }
        Some(("plan", sub_matches)) => {
            let inputs = inputs(sub_matches).ok_or("missing snapshot paths")?;
            print!("{}", describe_plan(&inputs, &settings(sub_matches)?).await?);
        }
        _ => unreachable!(),
    }
    Ok(())
}

/// Oxidiff: schema snapshot differ and migration script generator
///
/// Compares two JSON snapshots of a PostgreSQL, MS SQL or ClickHouse schema and writes the DDL
/// script that turns the old schema into the new one, ordered so that every object is created
/// after what it depends on and dropped before it.
///
/// ```sh
/// oxidiff diff --old prod.json --new dev.json --select 'public.*' -o migration.sql
/// oxidiff plan --old prod.json --new dev.json
/// ```
#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let matches = build_cli().get_matches();

    if let Err(e) = run(matches).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    #[test]
    fn test_cli_diff() {
        let cmd = build_cli();

        let matches = cmd.try_get_matches_from(vec![
            "oxidiff",
            "diff",
            "--old",
            "prod.json",
            "--new",
            "dev.json",
            "-d",
            "deps.json",
            "-o",
            "out.sql",
        ]);

        assert!(matches.is_ok());
        let matches = matches.unwrap();
        assert_eq!(matches.subcommand_name(), Some("diff"));
        let sub_matches = matches.subcommand_matches("diff").unwrap();
        let inputs = inputs(sub_matches).unwrap();
        assert_eq!(inputs.old, PathBuf::from("prod.json"));
        assert_eq!(inputs.new, PathBuf::from("dev.json"));
        assert_eq!(inputs.dependencies, Some(PathBuf::from("deps.json")));
        assert_eq!(
            sub_matches.get_one::<PathBuf>("output").unwrap(),
            &PathBuf::from("out.sql")
        );
    }

    #[test]
    fn test_cli_plan_requires_snapshots() {
        let cmd = build_cli();

        let matches = cmd.try_get_matches_from(vec!["oxidiff", "plan", "--old", "prod.json"]);

        assert!(matches.is_err());
    }

    #[test]
    fn test_cli_plan_has_no_output() {
        let cmd = build_cli();

        let matches = cmd.try_get_matches_from(vec![
            "oxidiff", "plan", "--old", "a.json", "--new", "b.json", "-o", "out.sql",
        ]);

        assert!(matches.is_err());
    }

    #[test]
    fn test_cli_overrides_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{ "select": ["audit.*"], "ignore": [{ "pattern": "*.tmp" }], "transaction": true }"#,
        )
        .unwrap();

        let matches = build_cli()
            .try_get_matches_from([
                OsString::from("oxidiff"),
                "diff".into(),
                "--old".into(),
                "a.json".into(),
                "--new".into(),
                "b.json".into(),
                "-s".into(),
                path.into_os_string(),
                "--select".into(),
                "public.*".into(),
                "--select".into(),
                "sales.*".into(),
                "--ignore".into(),
                "public.old_*".into(),
                "--no-transaction".into(),
            ])
            .unwrap();
        let settings = settings(matches.subcommand_matches("diff").unwrap()).unwrap();

        assert_eq!(settings.select, vec!["public.*", "sales.*"]);
        let patterns: Vec<_> = settings.ignore.iter().map(|i| i.pattern.as_str()).collect();
        assert_eq!(patterns, vec!["*.tmp", "public.old_*"]);
        assert!(!settings.transaction);
    }

    #[test]
    fn test_cli_without_settings_file() {
        let matches = build_cli()
            .try_get_matches_from(vec!["oxidiff", "plan", "--old", "a.json", "--new", "b.json"])
            .unwrap();
        let settings = settings(matches.subcommand_matches("plan").unwrap()).unwrap();
        assert_eq!(settings, DiffSettings::default());
    }
}
