//! Command-line interface definitions for Mediekompas.
//!
//! Flags override the values loaded from the YAML configuration file. Tokens
//! can also be provided via environment variables.

use clap::Parser;
use std::path::PathBuf;

/// Fetch Danish news outlets, export the articles and score them for bias.
///
/// # Examples
///
/// ```sh
/// # All built-in outlets, rule-only if the models cannot be reached
/// mediekompas --export-path ./out/articles.json --rule-only
///
/// # Two outlets, three articles each, with a stats report
/// mediekompas -s dr,information -l 3 -e ./out/articles.json -r ./out/report.json
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to config.yaml file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Outlet ids to fetch (comma separated); all registered outlets when omitted
    #[arg(short, long, value_delimiter = ',')]
    pub sources: Vec<String>,

    /// Maximum articles per outlet
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Outlets fetched at the same time
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Destination of the JSON export of fetched articles
    #[arg(short, long)]
    pub export_path: PathBuf,

    /// Optional destination of the aggregated per-outlet report
    #[arg(short, long)]
    pub report_path: Option<PathBuf>,

    /// Score with the lexicon only when the classifier/NER models are unavailable
    #[arg(long)]
    pub rule_only: bool,

    /// Browserless API token
    #[arg(long, env = "BROWSERLESS_TOKEN")]
    pub browserless_token: Option<String>,

    /// Inference API token for the classifier and NER models
    #[arg(long, env = "INFERENCE_API_TOKEN")]
    pub inference_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(&[
            "mediekompas",
            "--export-path",
            "./out/articles.json",
            "--sources",
            "dr,tv2",
            "--limit",
            "3",
        ]);

        assert_eq!(cli.export_path, PathBuf::from("./out/articles.json"));
        assert_eq!(cli.sources, vec!["dr", "tv2"]);
        assert_eq!(cli.limit, Some(3));
        assert!(!cli.rule_only);
        assert!(cli.report_path.is_none());
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from(&[
            "mediekompas",
            "-e",
            "/tmp/a.json",
            "-r",
            "/tmp/r.json",
            "-c",
            "conf.yaml",
            "--rule-only",
        ]);

        assert_eq!(cli.export_path, PathBuf::from("/tmp/a.json"));
        assert_eq!(cli.report_path, Some(PathBuf::from("/tmp/r.json")));
        assert_eq!(cli.config, Some(PathBuf::from("conf.yaml")));
        assert!(cli.sources.is_empty());
        assert!(cli.rule_only);
    }

    #[test]
    fn test_export_path_is_required() {
        assert!(Cli::try_parse_from(&["mediekompas", "--limit", "2"]).is_err());
    }
}
