use crate::CLAP_STYLING;
use clap::{arg, command};
use std::net::SocketAddr;
use std::path::PathBuf;

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("sitelens")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("sitelens")
        .about("Technology stack and security posture analysis for websites")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress the banner and the colored summary").global(true))
        .arg(
            arg!(-c --"config" <PATH>)
                .required(false)
                .global(true)
                .help("JSON configuration file")
                .value_parser(clap::value_parser!(String)),
        )
        .arg(
            arg!(--"timeout" <MS>)
                .required(false)
                .global(true)
                .help("Capture timeout in milliseconds")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            arg!(--"max-contexts" <NUM>)
                .required(false)
                .global(true)
                .help("Upper bound on concurrent rendering contexts")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            arg!(-e --"engine" <ENGINE>)
                .required(false)
                .global(true)
                .help("Rendering engine")
                .value_parser(["chrome", "http"]),
        )
        .arg(
            arg!(--"no-whois" "Skip the domain registration lookup")
                .global(true)
                .action(clap::ArgAction::SetTrue),
        )
        .subcommand_required(false)
        .subcommand(
            command!("analyze")
                .about("Capture a page and print its analysis report as JSON")
                .arg(
                    arg!(<URL>)
                        .required(true)
                        .help("Target URL; https:// is assumed when no scheme is given"),
                )
                .arg(
                    arg!(-p --"pretty" "Pretty-print the JSON report")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Write the report to a file instead of stdout")
                        .value_parser(clap::value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            command!("classify")
                .about("Classify and score a saved page snapshot without network access")
                .arg(
                    arg!(<SNAPSHOT>)
                        .required(true)
                        .help("Path to a snapshot JSON file")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-p --"pretty" "Pretty-print the JSON report")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .subcommand(
            command!("serve")
                .about("Serve the analysis pipeline over HTTP")
                .arg(
                    arg!(-b --"bind" <ADDR>)
                        .required(false)
                        .help("Address to listen on")
                        .value_parser(clap::value_parser!(SocketAddr))
                        .default_value("127.0.0.1:3000"),
                ),
        )
}
