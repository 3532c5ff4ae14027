//! Command line interface.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "ctxwatch")]
#[command(about = "Watch a project and publish change context for AI assistants", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Project root to watch
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Configuration file (default: <root>/.ctxwatch/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Run the pipeline once for this path and exit
    #[arg(long, value_name = "PATH")]
    pub once: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["ctxwatch"]).unwrap();
        assert_eq!(cli.root, PathBuf::from("."));
        assert_eq!(cli.config, None);
        assert_eq!(cli.log_level, "info");
        assert_eq!(cli.once, None);
    }

    #[test]
    fn all_flags() {
        let cli = Cli::try_parse_from([
            "ctxwatch",
            "--root",
            "/work/app",
            "--config",
            "ctx.toml",
            "--log-level",
            "debug",
            "--once",
            "src/main.ts",
        ])
        .unwrap();
        assert_eq!(cli.root, PathBuf::from("/work/app"));
        assert_eq!(cli.config, Some(PathBuf::from("ctx.toml")));
        assert_eq!(cli.log_level, "debug");
        assert_eq!(cli.once, Some(PathBuf::from("src/main.ts")));
    }

    #[test]
    fn rejects_unknown_flag() {
        assert!(Cli::try_parse_from(["ctxwatch", "--watch-all"]).is_err());
    }
}
