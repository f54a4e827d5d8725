use crate::CLAP_STYLING;
use clap::{arg, command};
use url::Url;

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("sitecheck")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("sitecheck")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .subcommand_required(false)
        .subcommand(
            command!("check")
                .about(
                    "Crawl a site from one or more seed URLs and fail on runtime errors \
                and broken links.",
                )
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(false)
                        .help("A seed URL to start the crawl from (repeatable)")
                        .value_parser(clap::value_parser!(Url))
                        .action(clap::ArgAction::Append)
                        .conflicts_with("urls-file"),
                )
                .arg(
                    arg!(-U --"urls-file" <PATH>)
                        .required(false)
                        .help("Path to a newline-delimited file of seed URLs")
                        .value_parser(clap::value_parser!(std::path::PathBuf))
                        .conflicts_with("url"),
                )
                .arg(
                    arg!(--"timeout-ms" <MILLIS>)
                        .required(false)
                        .help("Per-navigation timeout in milliseconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("30000"),
                )
                .arg(
                    arg!(-f --"follow" <MODE>)
                        .required(false)
                        .help("Which discovered links to validate beyond the seeds")
                        .value_parser(["none", "local", "remote", "both"])
                        .default_value("local"),
                )
                .arg(
                    arg!(--"identity" <POLICY>)
                        .required(false)
                        .help(
                            "URL identity policy: 'href' keeps query/fragment variants \
                        distinct, 'origin-path' folds them together",
                        )
                        .value_parser(["href", "origin-path"])
                        .default_value("href"),
                )
                .arg(
                    arg!(-e --"expect" <PATH>)
                        .required(false)
                        .help("Path to a JSON file of expected-error rules")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save the JSON report to a file (default: print to stdout)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                ),
        )
}
