//! Root CLI parser.

use clap::Parser;

use crate::commands::Commands;

/// Inference dispatch for a co-located model engine.
#[derive(Debug, Parser)]
#[command(name = "infergate")]
#[command(about = "Forward, stream and batch requests to a local inference engine")]
#[command(version)]
pub struct Cli {
    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Commands;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parser_builds() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_args() {
        let cli = Cli::parse_from([
            "infergate",
            "-v",
            "serve",
            "--listen",
            "127.0.0.1:9000",
            "--set",
            "user_port=6000",
            "--set",
            "wrap_response=false",
            "--prewarm",
        ]);
        assert!(cli.verbose);
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.listen, "127.0.0.1:9000");
        assert_eq!(args.set, vec!["user_port=6000", "wrap_response=false"]);
        assert!(args.prewarm);
    }

    #[test]
    fn test_batch_args() {
        let cli = Cli::parse_from([
            "infergate",
            "batch",
            "job.json",
            "--engine-url",
            "http://localhost:7000",
            "--no-progress-bar",
        ]);
        let Commands::Batch(args) = cli.command else {
            panic!("expected batch");
        };
        assert_eq!(args.job.to_str(), Some("job.json"));
        assert_eq!(args.engine_url, "http://localhost:7000");
        assert!(args.no_progress_bar);
        assert!(args.progress_file.is_none());
    }
}
