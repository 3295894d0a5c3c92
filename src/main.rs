use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use repo_sight::cli::{Cli, Commands};
use repo_sight::config::{Config, ConfigService};
use repo_sight::doctor;
use repo_sight::error::{self, PipelineError};
use repo_sight::models::development::DevelopmentRequest;
use repo_sight::models::generation::{GeneratedImplementation, Specification};
use repo_sight::models::request::{Command, SightRequest};
use repo_sight::models::testing::TestGenerationRequest;
use repo_sight::service::{AppService, DEFAULT_RANK_LIMIT};
use repo_sight::session;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        println!("{}", error::envelope(&e));
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn serialize_output(value: &impl serde::Serialize, pretty: bool) -> Result<String> {
    if pretty {
        Ok(serde_json::to_string_pretty(value)?)
    } else {
        Ok(serde_json::to_string(value)?)
    }
}

fn print_output(value: &impl serde::Serialize, pretty: bool) -> Result<()> {
    println!("{}", serialize_output(value, pretty)?);
    Ok(())
}

fn read_implementation(path: &Path) -> Result<GeneratedImplementation> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        PipelineError::invalid_request(format!("Cannot read {}: {e}", path.display()))
    })?;
    let implementation = serde_json::from_str(&content).map_err(|e| {
        PipelineError::invalid_request(format!("Invalid change set in {}: {e}", path.display()))
    })?;
    Ok(implementation)
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

fn run(cli: Cli) -> Result<()> {
    let pretty = cli.pretty;

    let config = ConfigService::load(cli.config.as_deref())?;
    let config_path = cli.config.clone().unwrap_or_else(ConfigService::default_path);

    if cli.debug || config.debug {
        repo_sight::logger::init(&config)?;
    }

    // Commands that never need the model backend
    match &cli.command {
        Commands::Init { path } => {
            let target = path.clone().unwrap_or_else(ConfigService::default_path);
            ConfigService::generate_at(&target)?;
            eprintln!("Configuration file created at: {}", target.display());
            return Ok(());
        }
        Commands::Doctor => {
            return print_output(&doctor::run_doctor(&config, &config_path), pretty);
        }
        _ => {}
    }

    let service = AppService::from_config(&config, cli.offline)?;
    let rt = tokio::runtime::Runtime::new()?;

    match cli.command {
        Commands::Analyze {
            repository,
            refresh,
        } => {
            let analysis = rt.block_on(service.analyze(&repository, refresh))?;
            print_output(&*analysis, pretty)
        }
        Commands::Rank {
            repository,
            query,
            limit,
        } => {
            let ranked = rt.block_on(service.rank(&repository, &query, limit))?;
            print_output(&ranked, pretty)
        }
        Commands::Bug {
            repository,
            description,
            steps,
            priority,
        } => {
            let analysis =
                rt.block_on(service.analyze_bug(&repository, &description, steps, priority))?;
            print_output(&analysis, pretty)
        }
        Commands::Generate {
            repository,
            description,
            title,
            kind,
            no_follow_patterns,
            optimize_for,
            stream,
        } => {
            let spec = Specification::from_description(&description, title, kind);
            let options = service.generation_options(Some(!no_follow_patterns), optimize_for);
            let generated = if stream {
                rt.block_on(generate_streaming(&service, &repository, &spec, &options))?
            } else {
                rt.block_on(service.generate(&repository, &spec, &options))?
            };
            print_output(&generated, pretty)
        }
        Commands::Tests {
            repository,
            implementation,
        } => {
            let req = TestGenerationRequest::new(repository, read_implementation(&implementation)?);
            let tests = rt.block_on(service.generate_tests(&req))?;
            print_output(&tests, pretty)
        }
        Commands::Develop {
            repository,
            requirement,
            kind,
            tests,
            threshold,
            optimize_for,
        } => {
            let req = DevelopmentRequest {
                repository_id: repository,
                requirement,
                kind,
                include_tests: tests,
                quality_threshold: threshold,
                optimize_for: optimize_for.unwrap_or_default(),
            };
            let result = rt.block_on(service.develop(&req))?;
            print_output(&result, pretty)
        }
        Commands::Session => {
            let service = service.sandbox_from_env()?;
            session::run_session(|req| {
                rt.block_on(handle_request(&service, &config, &config_path, req))
            })
        }
        Commands::Mcp => cmd_mcp(&rt, service, config, config_path),
        Commands::Init { .. } | Commands::Doctor => unreachable!("handled above"),
    }
}

/// Streams accepted model text to stderr; the JSON result still goes to stdout.
async fn generate_streaming(
    service: &AppService,
    repository: &str,
    spec: &Specification,
    options: &repo_sight::models::generation::GenerationOptions,
) -> Result<repo_sight::models::generation::GeneratedCode> {
    use std::io::Write;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    let printer = tokio::spawn(async move {
        let mut stderr = std::io::stderr();
        while let Some(chunk) = rx.recv().await {
            let _ = stderr.write_all(chunk.as_bytes());
            let _ = stderr.flush();
        }
        let _ = stderr.write_all(b"\n");
    });
    let result = service
        .generate_streaming(repository, spec, options, tx)
        .await;
    let _ = printer.await;
    result
}

fn cmd_mcp(
    rt: &tokio::runtime::Runtime,
    service: AppService,
    config: Config,
    config_path: PathBuf,
) -> Result<()> {
    use rmcp::ServiceExt;

    let service = match std::env::current_dir() {
        Ok(cwd) => service.sandboxed(cwd)?,
        Err(_) => service,
    };
    rt.block_on(async {
        let server =
            repo_sight::mcp::RepoSightServer::new(Arc::new(service), config, config_path);
        let transport = rmcp::transport::io::stdio();
        let running = server
            .serve(transport)
            .await
            .map_err(|e| anyhow::anyhow!("MCP server initialization failed: {e}"))?;
        running
            .waiting()
            .await
            .map_err(|e| anyhow::anyhow!("MCP server error: {e}"))?;
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Session handler
// ---------------------------------------------------------------------------

async fn handle_request(
    service: &AppService,
    config: &Config,
    config_path: &Path,
    req: SightRequest,
) -> Result<serde_json::Value> {
    let description = req.description.clone().unwrap_or_default();
    match req.command {
        Command::Analyze => {
            let analysis = service.analyze(&req.repository, req.refresh).await?;
            Ok(serde_json::to_value(&*analysis)?)
        }
        Command::Rank => {
            let query = req.query.as_deref().unwrap_or("");
            let limit = req.limit.unwrap_or(DEFAULT_RANK_LIMIT);
            Ok(serde_json::to_value(service.rank(&req.repository, query, limit).await?)?)
        }
        Command::Bug => {
            let analysis = service
                .analyze_bug(
                    &req.repository,
                    &description,
                    req.steps,
                    req.priority.unwrap_or_default(),
                )
                .await?;
            Ok(serde_json::to_value(analysis)?)
        }
        Command::Generate => {
            let spec = Specification::from_description(
                &description,
                req.title,
                req.kind.unwrap_or_default(),
            );
            let options = service.generation_options(req.follow_patterns, req.optimize_for);
            Ok(serde_json::to_value(
                service.generate(&req.repository, &spec, &options).await?,
            )?)
        }
        Command::Tests => {
            let Some(implementation) = req.implementation else {
                anyhow::bail!(PipelineError::invalid_request(
                    "tests requires an implementation change set"
                ));
            };
            let tests = service
                .generate_tests(&TestGenerationRequest::new(req.repository, implementation))
                .await?;
            Ok(serde_json::to_value(tests)?)
        }
        Command::Develop => {
            let dev = DevelopmentRequest {
                repository_id: req.repository,
                requirement: description,
                kind: req.kind.unwrap_or_default(),
                include_tests: req.include_tests,
                quality_threshold: req.quality_threshold,
                optimize_for: req.optimize_for.unwrap_or_default(),
            };
            Ok(serde_json::to_value(service.develop(&dev).await?)?)
        }
        Command::Doctor => Ok(serde_json::to_value(doctor::run_doctor(config, config_path))?),
    }
}
