mod output;
mod telemetry;

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dialprobe_core::config::Config;
use dialprobe_core::model::request::CheckRequest;
use dialprobe_probe::export::{ExportConfig, OtlpExporter};
use dialprobe_probe::handler::Handler;
use tokio::io::AsyncReadExt;

use crate::output::print_outcome;
use crate::telemetry::{init_cli_tracing, init_serve_tracing, shutdown_tracing};

#[derive(Parser, Debug)]
#[command(name = "dialprobe")]
#[command(about = "Dial a TCP endpoint once and publish its state and latency")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    metrics_endpoint: Option<String>,

    #[arg(long, global = true, help = "grpc or http/protobuf")]
    metrics_protocol: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Run one check from flags")]
    Check {
        #[arg(long)]
        name: String,
        #[arg(long)]
        environment: String,
        #[arg(long)]
        ip: String,
        #[arg(long)]
        port: String,
    },
    #[command(about = "Run one check from a JSON event (stdin when --event is absent)")]
    Invoke {
        #[arg(long)]
        event: Option<String>,
    },
    #[command(about = "Host invocations over HTTP at POST /invoke")]
    Serve {
        #[arg(long, help = "host:port to listen on, e.g. localhost:9000")]
        listen: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(cli.metrics_endpoint, cli.metrics_protocol)?;

    match cli.command {
        Commands::Check {
            name,
            environment,
            ip,
            port,
        } => {
            init_cli_tracing();
            run_once(&cfg, CheckRequest::new(name, environment, ip, port), cli.json).await
        }
        Commands::Invoke { event } => {
            init_cli_tracing();
            let raw = match event {
                Some(raw) => raw,
                None => read_stdin().await?,
            };
            let req = CheckRequest::from_json(&raw)?;
            run_once(&cfg, req, cli.json).await
        }
        Commands::Serve { listen } => {
            init_serve_tracing();
            let addr = listen.unwrap_or_else(|| cfg.listen_addr.clone());
            let res = run_serve(&cfg, &addr).await;
            shutdown_tracing();
            res
        }
    }
}

fn load_config(
    metrics_endpoint: Option<String>,
    metrics_protocol: Option<String>,
) -> anyhow::Result<Config> {
    let mut cfg = Config::load().context("load config")?;
    if let Some(v) = metrics_endpoint {
        cfg.metrics_endpoint = v;
    }
    if let Some(v) = metrics_protocol {
        cfg.metrics_protocol = v;
    }
    Ok(cfg)
}

fn build_handler(cfg: &Config) -> anyhow::Result<Handler<OtlpExporter>> {
    let export = ExportConfig::from_config(cfg)?;
    let exporter = OtlpExporter::new(&export).context("build metrics exporter")?;
    Ok(Handler::new(exporter))
}

async fn run_once(cfg: &Config, req: CheckRequest, json: bool) -> anyhow::Result<()> {
    let handler = build_handler(cfg)?;
    let outcome = handler
        .check(&req)
        .await
        .with_context(|| format!("check {} failed", req.name))?;
    print_outcome(&outcome, json)
}

async fn run_serve(cfg: &Config, addr: &str) -> anyhow::Result<()> {
    let handler = Arc::new(build_handler(cfg)?);

    eprintln!("dialprobe serve");
    eprintln!("  invoke: http://{addr}/invoke");
    eprintln!(
        "  metrics: {} ({})",
        cfg.metrics_endpoint, cfg.metrics_protocol
    );

    tokio::select! {
        res = dialprobe_probe::server::run_invoke_server(handler, addr) => {
            res?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
        }
    }
    Ok(())
}

async fn read_stdin() -> anyhow::Result<String> {
    let mut raw = String::new();
    tokio::io::stdin()
        .read_to_string(&mut raw)
        .await
        .context("read invocation event from stdin")?;
    Ok(raw)
}
