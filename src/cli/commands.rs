//! CLI definition using clap.
//!
//! A single command: classify one input file for one domain, resuming from
//! a checkpoint when one exists.

use clap::Parser;
use std::path::PathBuf;

use cs_classify::domain::Domain;

/// cs-classify - batch classification of customer-service inquiries with an LLM
#[derive(Parser, Debug)]
#[command(name = "cs-classify")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Inquiry domain (air, air2, package)
    #[arg(short, long)]
    pub domain: Domain,

    /// Input records (.json or .jsonl)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Category table (.json or .jsonl)
    #[arg(short = 'k', long)]
    pub categories: PathBuf,

    /// Output file (.json or .jsonl); defaults to <input-stem>_result_<timestamp>.jsonl
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Optional config file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for checkpoint files (overrides config)
    #[arg(long)]
    pub checkpoint_dir: Option<PathBuf>,

    /// Ignore and remove any existing checkpoint before starting
    #[arg(long)]
    pub fresh: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Write logs to stderr instead of the log file
    #[arg(long)]
    pub log_stderr: bool,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_required_args() {
        let cli = Cli::try_parse_from([
            "cs-classify",
            "--domain",
            "air",
            "--input",
            "in.jsonl",
            "--categories",
            "cats.json",
        ])
        .unwrap();
        assert_eq!(cli.domain, Domain::Air);
        assert_eq!(cli.input, PathBuf::from("in.jsonl"));
        assert_eq!(cli.categories, PathBuf::from("cats.json"));
        assert!(cli.output.is_none());
        assert!(!cli.fresh);
        assert!(!cli.is_verbose());
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::try_parse_from([
            "cs-classify",
            "-d",
            "package",
            "-i",
            "in.json",
            "-k",
            "cats.jsonl",
            "-o",
            "out.json",
            "-c",
            "cfg.yml",
            "-v",
        ])
        .unwrap();
        assert_eq!(cli.domain, Domain::Package);
        assert_eq!(cli.output, Some(PathBuf::from("out.json")));
        assert_eq!(cli.config, Some(PathBuf::from("cfg.yml")));
        assert!(cli.is_verbose());
    }

    #[test]
    fn test_cli_resume_flags() {
        let cli = Cli::try_parse_from([
            "cs-classify",
            "-d",
            "air2",
            "-i",
            "in.json",
            "-k",
            "cats.json",
            "--checkpoint-dir",
            "/tmp/ckpt",
            "--fresh",
            "--log-stderr",
        ])
        .unwrap();
        assert_eq!(cli.checkpoint_dir, Some(PathBuf::from("/tmp/ckpt")));
        assert!(cli.fresh);
        assert!(cli.log_stderr);
    }

    #[test]
    fn test_unknown_domain_rejected() {
        let result = Cli::try_parse_from(["cs-classify", "-d", "rail", "-i", "a.json", "-k", "b.json"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_input_rejected() {
        let result = Cli::try_parse_from(["cs-classify", "-d", "air", "-k", "b.json"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_help_works() {
        Cli::command().debug_assert();
    }
}
