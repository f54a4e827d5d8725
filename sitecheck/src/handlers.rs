use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use sitecheck_core::rules::load_rules;
use sitecheck_core::{Aggregator, ExpectedErrorRule, IdentityPolicy, RunOutcome};
use sitecheck_crawler::{
    cancel_on_ctrl_c, BrowserEngine, CancelToken, EngineGuard, FollowLinks, HttpEngine,
    TestOptions, Tester,
};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;
use url::Url;

// Helper functions for the check handler

/// Load seed URLs from either a file or the repeated --url arguments
pub fn load_urls_from_source(urls: &[Url], urls_file: Option<&PathBuf>) -> Result<Vec<String>, String> {
    if let Some(urls_file_path) = urls_file {
        load_urls_from_file(urls_file_path)
    } else if !urls.is_empty() {
        Ok(urls.iter().map(|u| u.as_str().to_string()).collect())
    } else {
        Err("Either --url or --urls-file must be provided".to_string())
    }
}

/// Load and parse URLs from a file
pub fn load_urls_from_file(path: &PathBuf) -> Result<Vec<String>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read URLs file {}: {}", path.display(), e))?;

    let urls: Vec<String> = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| parse_url_line(line.trim()))
        .collect();

    if urls.is_empty() {
        return Err(format!("No valid URLs found in {}", path.display()));
    }

    Ok(urls)
}

/// Parse a single line as a URL, trying to add http:// if needed
pub fn parse_url_line(line: &str) -> Option<String> {
    // Try to parse as-is
    if Url::parse(line).is_ok() {
        return Some(line.to_string());
    }

    // Try adding http://
    let with_scheme = format!("http://{}", line);
    if Url::parse(&with_scheme).is_ok() {
        return Some(with_scheme);
    }

    eprintln!("⚠️  Skipping invalid URL '{}'", line);
    None
}

/// Load and compile an expected-error rule file
pub fn load_rules_from_file(path: &PathBuf) -> Result<Vec<ExpectedErrorRule>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read rules file {}: {}", path.display(), e))?;
    load_rules(&content).map_err(|e| format!("Invalid rules file {}: {}", path.display(), e))
}

pub async fn handle_check(sub_matches: &ArgMatches, quiet: bool) {
    // Initialize tracing for logging
    tracing_subscriber::fmt::init();

    let urls: Vec<Url> = sub_matches
        .get_many::<Url>("url")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    let urls_file = sub_matches.get_one::<PathBuf>("urls-file");
    let timeout_ms = *sub_matches.get_one::<u64>("timeout-ms").unwrap_or(&30_000);
    let follow = sub_matches
        .get_one::<String>("follow")
        .map(String::as_str)
        .unwrap_or("local");
    let identity = sub_matches
        .get_one::<String>("identity")
        .map(String::as_str)
        .unwrap_or("href");
    let expect_file = sub_matches.get_one::<PathBuf>("expect");
    let output = sub_matches.get_one::<PathBuf>("output");

    // Load seed URLs from source
    let raw_urls = match load_urls_from_source(&urls, urls_file) {
        Ok(urls) => urls,
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e);
            std::process::exit(2);
        }
    };
    let mut seeds = Vec::new();
    for raw in &raw_urls {
        match Url::parse(raw) {
            Ok(url) => seeds.push(url),
            Err(e) => {
                eprintln!("{} Invalid URL '{}': {}", "✗".red().bold(), raw, e);
                std::process::exit(2);
            }
        }
    }

    // Clap restricts the value sets, so these cannot fail in practice.
    let Some(follow_links) = FollowLinks::from_name(follow) else {
        eprintln!("{} Unknown follow mode: {}", "✗".red().bold(), follow);
        std::process::exit(2);
    };
    let Some(identity) = IdentityPolicy::from_name(identity) else {
        eprintln!("{} Unknown identity policy: {}", "✗".red().bold(), identity);
        std::process::exit(2);
    };

    let rules = match expect_file {
        Some(path) => match load_rules_from_file(path) {
            Ok(rules) => rules,
            Err(e) => {
                eprintln!("{} {}", "✗".red().bold(), e);
                std::process::exit(2);
            }
        },
        None => Vec::new(),
    };

    let options = TestOptions {
        timeout: Duration::from_millis(timeout_ms),
        follow_links,
        identity,
    };

    let cancel = CancelToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let (tx, rx) = mpsc::unbounded_channel();
    let collector = tokio::spawn(Aggregator::new(rules).collect(rx));

    let mut engine = match HttpEngine::new(options.timeout) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("{} Failed to start engine: {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };
    let mut page = match engine.new_page().await {
        Ok(page) => page,
        Err(e) => {
            eprintln!("{} Failed to open page: {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };
    let mut guard = EngineGuard::new(engine);

    let tester = match Tester::new(options, tx, cancel) {
        Ok(tester) => tester,
        Err(e) => {
            eprintln!("{} Failed to set up crawl: {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };

    let spinner = (!quiet).then(|| {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap(),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message(format!("Checking {} seed URL(s)...", seeds.len()));
        pb
    });

    let run_result = tester.run(&mut page, &seeds).await;

    if let Some(pb) = &spinner {
        pb.finish_and_clear();
    }
    if let Err(e) = guard.shutdown().await {
        eprintln!("{} Engine shutdown failed: {}", "⚠".yellow().bold(), e);
    }
    if let Err(e) = run_result {
        eprintln!("{} Crawl failed: {}", "✗".red().bold(), e);
        std::process::exit(1);
    }

    let outcome = match collector.await {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("{} Report collection failed: {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };

    let report = outcome.report();
    match &outcome {
        RunOutcome::Completed(_) if report.num_errors == 0 => {
            println!(
                "{} All {} page(s) passed",
                "✓".green().bold(),
                report.pages.len()
            );
        }
        RunOutcome::Completed(_) => {
            println!(
                "{} {} error(s) across {} page(s)",
                "✗".red().bold(),
                report.num_errors,
                report.pages.len()
            );
        }
        RunOutcome::Cancelled(_) => {
            println!(
                "{} Run cancelled; partial results cover {} page(s)",
                "⚠".yellow().bold(),
                report.pages.len()
            );
        }
    }

    let json = match report.to_json() {
        Ok(json) => json,
        Err(e) => {
            eprintln!("{} Failed to serialize report: {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };
    match output {
        Some(path) => {
            if let Err(e) = fs::write(path, &json) {
                eprintln!(
                    "{} Failed to write report to {}: {}",
                    "✗".red().bold(),
                    path.display(),
                    e
                );
                std::process::exit(1);
            }
            info!("report written to {}", path.display());
        }
        None => println!("{}", json),
    }

    let code = match &outcome {
        RunOutcome::Cancelled(_) => 130,
        RunOutcome::Completed(_) if report.num_errors > 0 => 1,
        RunOutcome::Completed(_) => 0,
    };
    if code != 0 {
        std::process::exit(code);
    }
}
