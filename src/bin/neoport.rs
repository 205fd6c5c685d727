//! neoport CLI - dump, import, transfer and direct-transfer commands
//!
//! Usage:
//!   neoport dump --source-host db1 --output default
//!   neoport import --target-host db2 --input latest
//!   neoport transfer --source-host db1 --target-host db2
//!   neoport direct --source-host db1 --target-host db2
//!
//! All failures abort with a non-zero exit status and a message naming
//! the phase that failed.

use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::Local;
use clap::{ArgAction, Args, Parser, Subcommand};

use neoport::{
    default_dump_file_name, direct_transfer, dump, latest_dump_file, replay, transfer,
    ConnectionSettings, DirectOptions, DumpOptions, Progress,
};

#[derive(Parser)]
#[command(name = "neoport", version, about = "Dump, import and transfer graph databases")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Dump all nodes and relations from a source database into a script
    Dump(DumpArgs),
    /// Import a dumped script into a target database
    Import(ImportArgs),
    /// Clone one database into another through a script
    Transfer(TransferArgs),
    /// Clone one database into another without an intermediate script
    Direct(DirectArgs),
}

#[derive(Args)]
struct SourceArgs {
    /// Source server hostname
    #[arg(long, default_value = "localhost")]
    source_host: String,
    /// Source server port
    #[arg(long, default_value_t = 7474)]
    source_port: u16,
    /// Source server username
    #[arg(long, default_value = "neo4j")]
    source_user: String,
    /// Source server password
    #[arg(long, default_value = "neo4j")]
    source_password: String,
}

impl SourceArgs {
    fn settings(&self) -> ConnectionSettings {
        ConnectionSettings::new(
            &self.source_host,
            self.source_port,
            &self.source_user,
            &self.source_password,
        )
    }
}

#[derive(Args)]
struct TargetArgs {
    /// Target server hostname
    #[arg(long, default_value = "localhost")]
    target_host: String,
    /// Target server port
    #[arg(long, default_value_t = 7474)]
    target_port: u16,
    /// Target server username
    #[arg(long, default_value = "neo4j")]
    target_user: String,
    /// Target server password
    #[arg(long, default_value = "neo4j")]
    target_password: String,
}

impl TargetArgs {
    fn settings(&self) -> ConnectionSettings {
        ConnectionSettings::new(
            &self.target_host,
            self.target_port,
            &self.target_user,
            &self.target_password,
        )
    }
}

#[derive(Args)]
struct ScriptArgs {
    /// Number of nodes and relations to read per window
    #[arg(long, default_value_t = 300)]
    read_batch_size: usize,
    /// Number of nodes written per statement
    #[arg(long, default_value_t = 150)]
    node_batch_size: usize,
    /// Number of relations written per statement
    #[arg(long, default_value_t = 25)]
    relation_batch_size: usize,
    /// Comma separated relation properties to drop
    /// (e.g. creationDate,modificationDate)
    #[arg(long)]
    ignore_relation_properties: Option<String>,
    /// Remove all target nodes and relations before importing
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    clean: bool,
    /// Wrap the created statements in BEGIN/COMMIT markers
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    transactional: bool,
    /// Temporary label indexing imported nodes by source id; removed
    /// after the import
    #[arg(long, default_value = "_ilb")]
    import_label: String,
    /// Temporary property key holding the source id; removed after the
    /// import
    #[arg(long, default_value = "_iid")]
    import_id_key: String,
}

impl ScriptArgs {
    fn dump_options(&self) -> DumpOptions {
        DumpOptions {
            import_label: self.import_label.clone(),
            import_id_key: self.import_id_key.clone(),
            read_batch_size: self.read_batch_size,
            node_batch_size: self.node_batch_size,
            relation_batch_size: self.relation_batch_size,
            clean: self.clean,
            transactional: self.transactional,
            ignored_relation_properties: split_csv(self.ignore_relation_properties.as_deref()),
        }
    }
}

#[derive(Args)]
struct DumpArgs {
    #[command(flatten)]
    source: SourceArgs,
    #[command(flatten)]
    script: ScriptArgs,
    /// Output filename; `default` derives dump-[host]-[yyyyMMdd]-[hhmmss].cypher;
    /// stdout when unset
    #[arg(long)]
    output: Option<String>,
}

#[derive(Args)]
struct ImportArgs {
    #[command(flatten)]
    target: TargetArgs,
    /// Input filename; `latest` picks the newest dump-*.cypher in the
    /// working directory; stdin when unset
    #[arg(long)]
    input: Option<String>,
}

#[derive(Args)]
struct TransferArgs {
    #[command(flatten)]
    source: SourceArgs,
    #[command(flatten)]
    target: TargetArgs,
    #[command(flatten)]
    script: ScriptArgs,
    /// Keep the intermediate script at this path; in-memory when unset
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct DirectArgs {
    #[command(flatten)]
    source: SourceArgs,
    #[command(flatten)]
    target: TargetArgs,
    /// Number of nodes and relations to read per window
    #[arg(long, default_value_t = 300)]
    read_batch_size: usize,
    /// Number of nodes created per statement
    #[arg(long, default_value_t = 100)]
    node_batch_size: usize,
    /// Number of relations created per batch call
    #[arg(long, default_value_t = 150)]
    relation_batch_size: usize,
    /// Comma separated relation properties to drop
    #[arg(long)]
    ignore_relation_properties: Option<String>,
}

fn split_csv(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

fn run_dump(args: DumpArgs) -> anyhow::Result<()> {
    let settings = args.source.settings();
    let client = settings.open().context("connecting to source")?;
    let options = args.script.dump_options();
    let output = match args.output.as_deref() {
        Some("default") => {
            let name = default_dump_file_name(&settings.host, Local::now());
            eprintln!("Using default output file: {name}");
            Some(PathBuf::from(name))
        }
        Some(path) => Some(PathBuf::from(path)),
        None => None,
    };
    match output {
        Some(path) => {
            let file = std::fs::File::create(&path)
                .with_context(|| format!("creating {}", path.display()))?;
            let mut out = BufWriter::new(file);
            dump(&client, &settings.address(), &options, &mut out, &mut Progress::stderr())?;
        }
        None => {
            // script and report comments share stdout; Stdout's internal
            // lock keeps the interleaving in call order
            let mut progress = Progress::to_writer(Box::new(io::stdout()), true);
            dump(&client, &settings.address(), &options, &mut io::stdout(), &mut progress)?;
        }
    }
    Ok(())
}

fn run_import(args: ImportArgs) -> anyhow::Result<()> {
    let settings = args.target.settings();
    let client = settings.open().context("connecting to target")?;
    let mut progress = Progress::stderr();
    progress.info(&format!("Target: {}", settings.address()));
    progress.separator();
    let executed = match args.input.as_deref() {
        Some("latest") => {
            let Some(path) = latest_dump_file(Path::new("."))? else {
                bail!("no dump-*.cypher file found in the working directory");
            };
            progress.info(&format!("Using latest dump: {}", path.display()));
            let file = std::fs::File::open(&path)
                .with_context(|| format!("opening {}", path.display()))?;
            replay(&client, BufReader::new(file), &mut progress)?
        }
        Some(path) => {
            let file =
                std::fs::File::open(path).with_context(|| format!("opening {path}"))?;
            replay(&client, BufReader::new(file), &mut progress)?
        }
        None => replay(&client, io::stdin().lock(), &mut progress)?,
    };
    progress.info(&format!("Executed {executed} statements"));
    Ok(())
}

fn run_transfer(args: TransferArgs) -> anyhow::Result<()> {
    let source_settings = args.source.settings();
    let target_settings = args.target.settings();
    let source = source_settings.open().context("connecting to source")?;
    let target = target_settings.open().context("connecting to target")?;
    let options = args.script.dump_options();
    let executed = transfer(
        &source,
        &source_settings.address(),
        &target,
        &target_settings.address(),
        &options,
        args.output.as_deref(),
        &mut Progress::stderr(),
    )?;
    eprintln!("Executed {executed} statements");
    Ok(())
}

fn run_direct(args: DirectArgs) -> anyhow::Result<()> {
    let source_settings = args.source.settings();
    let target_settings = args.target.settings();
    let source = source_settings.open().context("connecting to source")?;
    let target = target_settings.open().context("connecting to target")?;
    let options = DirectOptions {
        read_batch_size: args.read_batch_size,
        node_batch_size: args.node_batch_size,
        relation_batch_size: args.relation_batch_size,
        ignored_relation_properties: split_csv(args.ignore_relation_properties.as_deref()),
    };
    direct_transfer(
        &source,
        &source_settings.address(),
        &target,
        &target_settings.address(),
        &options,
        &mut Progress::stderr(),
    )?;
    Ok(())
}

fn run() -> anyhow::Result<()> {
    match Cli::parse().command {
        Command::Dump(args) => run_dump(args),
        Command::Import(args) => run_import(args),
        Command::Transfer(args) => run_transfer(args),
        Command::Direct(args) => run_direct(args),
    }
}

fn main() {
    tracing_subscriber::fmt().with_writer(io::stderr).init();
    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_csv() {
        assert_eq!(split_csv(None), Vec::<String>::new());
        assert_eq!(split_csv(Some("")), Vec::<String>::new());
        assert_eq!(
            split_csv(Some("a,b, c ,")),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn test_cli_parses_defaults() {
        let cli = Cli::try_parse_from(["neoport", "dump"]).unwrap();
        let Command::Dump(args) = cli.command else {
            panic!("expected dump");
        };
        assert_eq!(args.source.source_host, "localhost");
        assert_eq!(args.script.node_batch_size, 150);
        assert!(args.script.clean);
        assert!(!args.script.transactional);
    }

    #[test]
    fn test_cli_parses_direct_defaults() {
        let cli = Cli::try_parse_from([
            "neoport",
            "direct",
            "--source-host",
            "a",
            "--target-host",
            "b",
            "--clean",
        ]);
        // direct has no --clean option
        assert!(cli.is_err());

        let cli = Cli::try_parse_from(["neoport", "direct"]).unwrap();
        let Command::Direct(args) = cli.command else {
            panic!("expected direct");
        };
        assert_eq!(args.node_batch_size, 100);
        assert_eq!(args.relation_batch_size, 150);
    }

    #[test]
    fn test_cli_boolean_options_take_values() {
        let cli =
            Cli::try_parse_from(["neoport", "dump", "--clean", "false", "--transactional", "true"])
                .unwrap();
        let Command::Dump(args) = cli.command else {
            panic!("expected dump");
        };
        assert!(!args.script.clean);
        assert!(args.script.transactional);
    }
}
