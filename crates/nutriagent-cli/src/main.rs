use clap::{Parser, Subcommand};
use nutriagent_agent::{Orchestrator, OrchestratorConfig};
use nutriagent_builtins::{
    register_builtins, ArtifactBackend, FoodDataSource, InMemoryArtifactBackend, KeywordEngine,
    MemoryFoodData, NutritionService, UsdaFoodData, DEFAULT_CACHE_CAPACITY,
};
use nutriagent_gateway::{GatewayServer, DEFAULT_ALLOWED_ORIGINS};
use nutriagent_session::{MemorySessionStore, SessionStore, DEFAULT_SESSION_CAPACITY};
use nutriagent_tools::ToolRegistry;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nutriagent", about = "NutriAgent — nutrition assistant chat service")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "nutriagent.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Manage tools
    Tools {
        #[command(subcommand)]
        action: ToolsAction,
    },
}

#[derive(Subcommand)]
enum ToolsAction {
    /// List registered tools
    List,
}

#[derive(Deserialize, Default)]
struct NutriagentConfig {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    agent: OrchestratorConfig,
    #[serde(default)]
    sessions: SessionsConfig,
    #[serde(default)]
    food_data: FoodDataConfig,
}

#[derive(Deserialize)]
struct ServerConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_allowed_origins")]
    allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

#[derive(Deserialize)]
struct SessionsConfig {
    #[serde(default = "default_session_capacity")]
    capacity: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            capacity: default_session_capacity(),
        }
    }
}

#[derive(Deserialize)]
struct FoodDataConfig {
    /// USDA FoodData Central API key. Falls back to $USDA_API_KEY; when
    /// neither is set, the bundled in-memory food table is used.
    #[serde(default)]
    usda_api_key: Option<String>,
    #[serde(default = "default_cache_capacity")]
    cache_capacity: usize,
}

impl Default for FoodDataConfig {
    fn default() -> Self {
        Self {
            usda_api_key: None,
            cache_capacity: default_cache_capacity(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_allowed_origins() -> Vec<String> {
    DEFAULT_ALLOWED_ORIGINS
        .iter()
        .map(|origin| (*origin).to_string())
        .collect()
}
fn default_session_capacity() -> usize {
    DEFAULT_SESSION_CAPACITY
}
fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config).await?;

    match cli.command {
        Commands::Serve { host, port } => serve(config, host, port).await,
        Commands::Tools { action } => match action {
            ToolsAction::List => list_tools(&config),
        },
    }
}

async fn load_config(path: &Path) -> anyhow::Result<NutriagentConfig> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => {
            let config = toml::from_str(&raw).map_err(|e| {
                anyhow::anyhow!("Invalid config file '{}': {}", path.display(), e)
            })?;
            info!(config = %path.display(), "Loaded config file");
            Ok(config)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(config = %path.display(), "No config file found, using defaults");
            Ok(NutriagentConfig::default())
        }
        Err(e) => Err(anyhow::anyhow!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        )),
    }
}

fn food_source(config: &FoodDataConfig) -> Arc<dyn FoodDataSource> {
    let api_key = config
        .usda_api_key
        .clone()
        .or_else(|| std::env::var("USDA_API_KEY").ok());

    match api_key {
        Some(key) if !key.trim().is_empty() => {
            info!("Using USDA FoodData Central");
            Arc::new(UsdaFoodData::new(key))
        }
        _ => {
            info!("No USDA API key configured, using the bundled food table");
            Arc::new(MemoryFoodData::new())
        }
    }
}

fn build_registry(
    config: &FoodDataConfig,
    artifacts: Arc<dyn ArtifactBackend>,
) -> anyhow::Result<ToolRegistry> {
    let service = Arc::new(NutritionService::with_cache_capacity(
        food_source(config),
        config.cache_capacity,
    ));
    let mut registry = ToolRegistry::new();
    register_builtins(&mut registry, service, artifacts)?;
    Ok(registry)
}

async fn serve(
    config: NutriagentConfig,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let host = host.unwrap_or(config.server.host);
    let port = port.unwrap_or(config.server.port);

    let artifacts: Arc<dyn ArtifactBackend> = Arc::new(InMemoryArtifactBackend::new());
    let registry = build_registry(&config.food_data, Arc::clone(&artifacts))?;
    info!(count = registry.tool_count(), "Built-in tools registered");

    let tools = Arc::new(registry);
    let sessions: Arc<dyn SessionStore> =
        Arc::new(MemorySessionStore::with_capacity(config.sessions.capacity));
    let orchestrator = Orchestrator::new(
        Arc::new(KeywordEngine::new()),
        Arc::clone(&tools),
        Arc::clone(&sessions),
        config.agent,
    );

    let app = GatewayServer::build_with_origins(
        orchestrator,
        sessions,
        tools,
        artifacts,
        &config.server.allowed_origins,
    );

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("NutriAgent gateway listening on {addr}");
    axum::serve(listener, app).await?;

    Ok(())
}

fn list_tools(config: &NutriagentConfig) -> anyhow::Result<()> {
    let artifacts: Arc<dyn ArtifactBackend> = Arc::new(InMemoryArtifactBackend::new());
    let registry = build_registry(&config.food_data, artifacts)?;

    let mut descriptors = registry.descriptors();
    descriptors.sort_by(|a, b| a.name.cmp(&b.name));

    println!("Registered tools:");
    for tool in &descriptors {
        println!("  {} — {}", tool.name, tool.description);
    }
    println!("\nTotal: {} tool(s)", descriptors.len());

    Ok(())
}
