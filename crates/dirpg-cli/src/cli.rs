use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "dirpg",
    about = "Directory core over a JSON entry store",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Default log filter; `RUST_LOG` takes precedence.
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Validate a server configuration file
    CheckConfig(CheckConfigArgs),
    /// Compile an LDAP filter into a store predicate
    CompileFilter(CompileFilterArgs),
    /// Parse and normalize a distinguished name
    ParseDn(ParseDnArgs),
    /// List or show schema definitions
    Schema(SchemaArgs),
}

#[derive(Args)]
pub struct CheckConfigArgs {
    pub path: PathBuf,
}

#[derive(Args)]
pub struct CompileFilterArgs {
    pub filter: String,
    /// Configuration supplying custom schema and the predicate column.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub column: Option<String>,
}

#[derive(Args)]
pub struct ParseDnArgs {
    pub dn: String,
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct SchemaArgs {
    /// Attribute type or object class to show; lists everything when absent.
    pub name: Option<String>,
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Only list object classes.
    #[arg(long, conflicts_with = "attributes")]
    pub classes: bool,
    /// Only list attribute types.
    #[arg(long)]
    pub attributes: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_check_config() {
        let cli = Cli::try_parse_from(["dirpg", "check-config", "dirpg.toml"]).unwrap();
        if let Command::CheckConfig(args) = cli.command {
            assert_eq!(args.path, PathBuf::from("dirpg.toml"));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_compile_filter() {
        let cli = Cli::try_parse_from([
            "dirpg", "compile-filter", "(cn=foo)", "--column", "attrs",
        ])
        .unwrap();
        if let Command::CompileFilter(args) = cli.command {
            assert_eq!(args.filter, "(cn=foo)");
            assert_eq!(args.column.as_deref(), Some("attrs"));
            assert!(args.config.is_none());
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_dn_with_config() {
        let cli = Cli::try_parse_from(["dirpg", "parse-dn", "cn=a,dc=b", "-c", "x.toml"]).unwrap();
        if let Command::ParseDn(args) = cli.command {
            assert_eq!(args.dn, "cn=a,dc=b");
            assert_eq!(args.config, Some(PathBuf::from("x.toml")));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn schema_flags_conflict() {
        assert!(Cli::try_parse_from(["dirpg", "schema", "--classes", "--attributes"]).is_err());
        let cli = Cli::try_parse_from(["dirpg", "schema", "cn"]).unwrap();
        if let Command::Schema(args) = cli.command {
            assert_eq!(args.name.as_deref(), Some("cn"));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::try_parse_from([
            "dirpg", "--format", "json", "--log-level", "debug", "schema",
        ])
        .unwrap();
        assert!(matches!(cli.format, OutputFormat::Json));
        assert_eq!(cli.log_level, "debug");
    }
}
