use colored::Colorize;
use sitelens::commands::command_argument_builder;
use sitelens::handlers::{handle_analyze, handle_classify, handle_serve, init_logging, print_banner};

#[tokio::main]
async fn main() {
    let matches = command_argument_builder().get_matches();
    let quiet = matches.get_flag("quiet")
        || matches
            .subcommand()
            .is_some_and(|(_, sub_matches)| sub_matches.get_flag("quiet"));

    init_logging(quiet);
    if !quiet {
        print_banner();
    }

    let result = match matches.subcommand() {
        Some(("analyze", sub_matches)) => handle_analyze(sub_matches).await,
        Some(("classify", sub_matches)) => handle_classify(sub_matches),
        Some(("serve", sub_matches)) => handle_serve(sub_matches).await,
        Some(_) => unreachable!("clap should ensure we don't get here"),
        None => {
            let _ = command_argument_builder().print_help();
            return;
        }
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}
