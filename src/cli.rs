use clap::{ArgAction, Parser};
use std::path::PathBuf;

use crate::config::MirrorConfig;

#[derive(Parser, Debug)]
#[command(
    name = "website-mirror",
    about = "A CLI utility to mirror a web page and its assets for offline browsing",
    version,
    long_about = "Downloads a page together with every stylesheet, script, image and font it references, then rewrites all references so the copy works offline without contacting the original site."
)]
pub struct MirrorCommand {
    /// The URL of the page to mirror
    #[arg(required = true)]
    pub url: String,

    /// Output directory for the mirrored page
    #[arg(short, long, default_value = "./mirrored_site")]
    pub output_dir: PathBuf,

    /// JSON file with mirror settings; flags below override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Pause between requests in milliseconds
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Timeout for requests in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// User agent string to use for requests
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Print the run summary as JSON when done
    #[arg(long)]
    pub summary_json: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl MirrorCommand {
    /// Applies command-line overrides on top of `base`.
    pub fn apply_to(&self, mut base: MirrorConfig) -> MirrorConfig {
        if let Some(delay_ms) = self.delay_ms {
            base.delay_ms = delay_ms;
        }
        if let Some(timeout) = self.timeout {
            base.timeout_secs = timeout;
        }
        if let Some(user_agent) = &self.user_agent {
            base.user_agent = user_agent.clone();
        }
        base
    }

    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_args() {
        let args = MirrorCommand::try_parse_from(["website-mirror", "https://example.com", "-o", "./output"]).unwrap();

        assert_eq!(args.url, "https://example.com");
        assert_eq!(args.output_dir, PathBuf::from("./output"));
        assert_eq!(args.config, None);
        assert!(!args.summary_json);
        assert_eq!(args.log_level(), "warn");
    }

    #[test]
    fn test_default_output_dir() {
        let args = MirrorCommand::try_parse_from(["website-mirror", "https://example.com"]).unwrap();
        assert_eq!(args.output_dir, PathBuf::from("./mirrored_site"));
    }

    #[test]
    fn test_overrides_apply_on_top_of_config() {
        let args = MirrorCommand::try_parse_from([
            "website-mirror",
            "https://example.com",
            "--delay-ms",
            "0",
            "--user-agent",
            "TestAgent/2.0",
            "-vv",
        ])
        .unwrap();

        let config = args.apply_to(MirrorConfig::default());
        assert_eq!(config.delay_ms, 0);
        assert_eq!(config.user_agent, "TestAgent/2.0");
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(args.log_level(), "debug");
    }

    #[test]
    fn test_parse_missing_url() {
        let result = MirrorCommand::try_parse_from(["website-mirror", "-o", "./output"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_invalid_delay() {
        let result = MirrorCommand::try_parse_from(["website-mirror", "https://example.com", "--delay-ms", "soon"]);
        assert!(result.is_err());
    }
}
