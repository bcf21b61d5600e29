use std::path::PathBuf;
use std::process::ExitCode;
use clap::{
    Arg, ArgAction, ArgMatches, Command, crate_version, crate_authors,
    value_parser,
};
use tracing_subscriber::{fmt, EnvFilter};
use engravemap::{ConvertOptions, MapConfig, run_convert, run_select};

const DEFAULT_CONFIG_PATH: &str = "engravemap.toml";


enum Action {
    Convert {
        project: String,
        options: ConvertOptions,
    },
    Select {
        project: String,
        suffix: String,
    },
}

struct Config {
    config: PathBuf,
    action: Action,
}

impl Config {
    fn get() -> Self {
        let mut matches = Self::get_matches();
        let config = matches.remove_one::<PathBuf>("config").unwrap_or_else(|| {
            PathBuf::from(DEFAULT_CONFIG_PATH)
        });
        let action = match matches.remove_subcommand() {
            Some((name, matches)) if name == "select" => {
                Self::select(matches)
            }
            Some((_, matches)) => Self::convert(matches),
            None => unreachable!("subcommand required"),
        };
        Config { config, action }
    }

    fn get_matches() -> ArgMatches {
        let project = Arg::new("project")
            .value_name("PROJECT")
            .help("the project to process")
            .required(true)
            .action(ArgAction::Set);
        let suffix = Arg::new("suffix")
            .long("suffix")
            .value_name("SUFFIX")
            .help("appended to the project name for the output directory")
            .default_value("")
            .action(ArgAction::Set);

        Command::new("engravemap")
            .version(crate_version!())
            .author(crate_authors!())
            .about("converts OSM exports into SVG drawings for laser cutting")
            .subcommand_required(true)
            .arg(Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("the configuration file")
                .global(true)
                .action(ArgAction::Set)
            )
            .subcommand(Command::new("convert")
                .about("produces the drawing and scale bar of a project")
                .arg(project.clone())
                .arg(suffix.clone())
                .arg(Arg::new("names")
                    .long("names")
                    .help("also produce the name listing and name maps")
                    .action(ArgAction::SetTrue)
                )
                .arg(Arg::new("print-names")
                    .long("print-names")
                    .help("log all extracted names")
                    .action(ArgAction::SetTrue)
                )
            )
            .subcommand(Command::new("select")
                .about("applies a curated name listing")
                .arg(project)
                .arg(suffix)
            )
            .get_matches()
    }

    fn convert(mut matches: ArgMatches) -> Action {
        Action::Convert {
            project: matches.remove_one("project").unwrap_or_default(),
            options: ConvertOptions {
                names: matches.get_flag("names"),
                suffix: matches.remove_one("suffix").unwrap_or_default(),
                print_names: matches.get_flag("print-names"),
            },
        }
    }

    fn select(mut matches: ArgMatches) -> Action {
        Action::Select {
            project: matches.remove_one("project").unwrap_or_default(),
            suffix: matches.remove_one("suffix").unwrap_or_default(),
        }
    }

    fn run(self) -> ExitCode {
        let map = match MapConfig::load(&self.config) {
            Ok(map) => map,
            Err(err) => {
                tracing::error!("failed to load configuration: {}", err);
                return ExitCode::FAILURE
            }
        };
        let res = match self.action {
            Action::Convert { project, options } => {
                run_convert(&map, &project, &options)
            }
            Action::Select { project, suffix } => {
                run_select(&map, &project, &suffix)
            }
        };
        match res {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                tracing::error!("{}", err);
                ExitCode::FAILURE
            }
        }
    }
}

fn main() -> ExitCode {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .with_target(false)
        .init();

    Config::get().run()
}
